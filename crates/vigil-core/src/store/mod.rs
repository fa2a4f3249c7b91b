//! Snapshot Store - append-only, hash-chained storage for collected data
//!
//! Layout under the data directory:
//! - `snapshots/<content_hash>.json`: content-addressed payload files
//! - `chain.json`: the ordered chain index (metadata only)
//!
//! Every snapshot links to its predecessor through
//! `content_hash = blake3(payload_bytes || previous_hash)`, so any byte of
//! retroactive tampering breaks recomputation. Payload reads go through the
//! seal gate; the chain index (counts, never content) is readable in every
//! seal state.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;

use crate::error::{Result, VigilError};
use crate::seal::SealGate;
use crate::types::{Blake3Hash, SnapshotPayload, TaskActivity, Timestamp};

/// One immutable, hash-chained capture of collected tasks and comments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub sequence_number: u64,
    pub collected_at: Timestamp,
    pub content_hash: Blake3Hash,
    pub previous_hash: Blake3Hash,
    pub payload: SnapshotPayload,
}

/// Chain index entry: everything about a snapshot except its content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainEntry {
    pub sequence_number: u64,
    pub collected_at: Timestamp,
    pub content_hash: Blake3Hash,
    pub previous_hash: Blake3Hash,
    pub task_count: usize,
    pub comment_count: usize,
    /// Count-only activity projection, exempt from the seal
    pub activity: Vec<TaskActivity>,
}

/// Aggregate counts for status reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub snapshots: u64,
    pub first_collected_at: Option<Timestamp>,
    pub last_collected_at: Option<Timestamp>,
    pub latest_task_count: usize,
    pub latest_comment_count: usize,
}

/// Append-only snapshot store with single-writer discipline.
pub struct SnapshotStore {
    snapshot_dir: PathBuf,
    index_path: PathBuf,
    gate: Arc<SealGate>,
    index: RwLock<Vec<ChainEntry>>,
    // one append in flight at a time; contention is CollectionInProgress
    writer: Mutex<()>,
}

impl SnapshotStore {
    /// Open (or create) the store under `data_dir`.
    pub async fn open(data_dir: impl Into<PathBuf>, gate: Arc<SealGate>) -> Result<Self> {
        let data_dir = data_dir.into();
        let snapshot_dir = data_dir.join("snapshots");
        tokio::fs::create_dir_all(&snapshot_dir).await?;

        let index_path = data_dir.join("chain.json");
        let index = if index_path.exists() {
            let content = tokio::fs::read_to_string(&index_path).await?;
            serde_json::from_str(&content)?
        } else {
            Vec::new()
        };

        Ok(Self {
            snapshot_dir,
            index_path,
            gate,
            index: RwLock::new(index),
            writer: Mutex::new(()),
        })
    }

    /// Number of chained snapshots.
    pub fn len(&self) -> u64 {
        self.index.read().unwrap().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().unwrap().is_empty()
    }

    /// The full chain index. Metadata only, readable in any seal state.
    pub fn chain_index(&self) -> Vec<ChainEntry> {
        self.index.read().unwrap().clone()
    }

    /// Index entry for one snapshot.
    pub fn entry(&self, sequence_number: u64) -> Result<ChainEntry> {
        self.index
            .read()
            .unwrap()
            .get(sequence_number as usize)
            .cloned()
            .ok_or_else(|| VigilError::NotFound(format!("snapshot {}", sequence_number)))
    }

    /// Activity projection from the most recent snapshot.
    pub fn latest_activity(&self) -> Vec<TaskActivity> {
        self.index
            .read()
            .unwrap()
            .last()
            .map(|entry| entry.activity.clone())
            .unwrap_or_default()
    }

    pub fn stats(&self) -> StoreStats {
        let index = self.index.read().unwrap();
        StoreStats {
            snapshots: index.len() as u64,
            first_collected_at: index.first().map(|e| e.collected_at),
            last_collected_at: index.last().map(|e| e.collected_at),
            latest_task_count: index.last().map(|e| e.task_count).unwrap_or(0),
            latest_comment_count: index.last().map(|e| e.comment_count).unwrap_or(0),
        }
    }

    /// Append one snapshot to the chain.
    ///
    /// Serialized: a second in-flight append is rejected with
    /// `CollectionInProgress` rather than queued, so the caller can retry
    /// on its own schedule.
    pub async fn append(
        &self,
        payload: SnapshotPayload,
        collected_at: Timestamp,
    ) -> Result<Snapshot> {
        let _guard = self
            .writer
            .try_lock()
            .map_err(|_| VigilError::CollectionInProgress)?;

        let (sequence_number, previous_hash) = {
            let index = self.index.read().unwrap();
            let previous = index
                .last()
                .map(|entry| entry.content_hash)
                .unwrap_or_else(Blake3Hash::empty);
            (index.len() as u64, previous)
        };

        let payload_bytes = payload.canonical_bytes()?;
        let content_hash = link_hash(&payload_bytes, &previous_hash);

        let path = self.payload_path(&content_hash);
        tokio::fs::write(&path, &payload_bytes).await?;

        let entry = ChainEntry {
            sequence_number,
            collected_at,
            content_hash,
            previous_hash,
            task_count: payload.task_count(),
            comment_count: payload.comment_count(),
            activity: payload.activities(),
        };

        {
            let mut index = self.index.write().unwrap();
            index.push(entry);
        }
        self.persist_index().await?;

        tracing::info!(
            sequence_number,
            content_hash = %content_hash,
            tasks = payload.task_count(),
            comments = payload.comment_count(),
            "snapshot appended"
        );

        Ok(Snapshot {
            sequence_number,
            collected_at,
            content_hash,
            previous_hash,
            payload,
        })
    }

    /// Fetch one snapshot including its content.
    ///
    /// Fails with `SealedAccessDenied` unless the seal gate is unlocked;
    /// the check lives here so no caller path can bypass it.
    pub async fn get(&self, sequence_number: u64) -> Result<Snapshot> {
        let entry = self.entry(sequence_number)?;
        self.load_snapshot(entry).await
    }

    /// Fetch one snapshot by its content hash.
    pub async fn get_by_hash(&self, hash: &Blake3Hash) -> Result<Snapshot> {
        let entry = self
            .index
            .read()
            .unwrap()
            .iter()
            .find(|entry| entry.content_hash == *hash)
            .cloned()
            .ok_or_else(|| VigilError::NotFound(format!("snapshot {}", hash)))?;
        self.load_snapshot(entry).await
    }

    async fn load_snapshot(&self, entry: ChainEntry) -> Result<Snapshot> {
        if !self.gate.content_reads_allowed() {
            tracing::warn!(
                sequence_number = entry.sequence_number,
                state = %self.gate.state(),
                "content read denied before unlock"
            );
            return Err(VigilError::SealedAccessDenied);
        }

        let bytes = self.read_payload_bytes(&entry).await?;
        let payload: SnapshotPayload = serde_json::from_slice(&bytes)?;
        Ok(Snapshot {
            sequence_number: entry.sequence_number,
            collected_at: entry.collected_at,
            content_hash: entry.content_hash,
            previous_hash: entry.previous_hash,
            payload,
        })
    }

    /// Recompute every link in `[from, to)` and report whether each matches
    /// its stored hash. Internal recomputation only; exposes no content.
    pub async fn verify_chain(&self, from: u64, to: u64) -> Result<bool> {
        let entries: Vec<ChainEntry> = {
            let index = self.index.read().unwrap();
            if to as usize > index.len() || from > to {
                return Ok(false);
            }
            index[from as usize..to as usize].to_vec()
        };

        for entry in entries {
            let expected_previous = if entry.sequence_number == 0 {
                Blake3Hash::empty()
            } else {
                self.entry(entry.sequence_number - 1)?.content_hash
            };
            if entry.previous_hash != expected_previous {
                return Ok(false);
            }

            let bytes = match self.read_payload_bytes(&entry).await {
                Ok(bytes) => bytes,
                // A vanished payload file is tampering, not an IO fault.
                Err(VigilError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Ok(false)
                }
                Err(e) => return Err(e),
            };
            if link_hash(&bytes, &entry.previous_hash) != entry.content_hash {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Chain hash over the first `prefix_len` snapshots: blake3 of their
    /// content hashes in order. This is the value a seal record commits to.
    pub fn chain_hash(&self, prefix_len: u64) -> Result<Blake3Hash> {
        let index = self.index.read().unwrap();
        if prefix_len as usize > index.len() {
            return Err(VigilError::NotFound(format!(
                "chain prefix of length {}",
                prefix_len
            )));
        }

        let mut hasher = blake3::Hasher::new();
        for entry in index.iter().take(prefix_len as usize) {
            hasher.update(entry.content_hash.as_bytes());
        }
        Ok(Blake3Hash::from(hasher.finalize()))
    }

    pub(crate) async fn read_payload_bytes(&self, entry: &ChainEntry) -> Result<Vec<u8>> {
        let path = self.payload_path(&entry.content_hash);
        Ok(tokio::fs::read(&path).await?)
    }

    fn payload_path(&self, hash: &Blake3Hash) -> PathBuf {
        self.snapshot_dir.join(format!("{}.json", hash.to_hex()))
    }

    async fn persist_index(&self) -> Result<()> {
        let content = {
            let index = self.index.read().unwrap();
            serde_json::to_string_pretty(&*index)?
        };
        tokio::fs::write(&self.index_path, content).await?;
        Ok(())
    }
}

impl std::fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStore")
            .field("snapshots", &self.len())
            .field("index_path", &self.index_path)
            .finish()
    }
}

fn link_hash(payload_bytes: &[u8], previous_hash: &Blake3Hash) -> Blake3Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(payload_bytes);
    hasher.update(previous_hash.as_bytes());
    Blake3Hash::from(hasher.finalize())
}
