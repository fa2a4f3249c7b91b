//! Seal Manager - the time-lock over collected content
//!
//! The seal is the mechanism that makes the blind period credible: once a
//! seal record exists, snapshot content and the frozen protocol registry are
//! unreadable until the committed unlock time has passed AND the hash chain
//! recomputes to the value recorded at seal time.
//!
//! The seal record itself is an ed25519-signed attestation, so editing any
//! of its fields after the fact is detectable at unlock.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;

use crate::error::{Result, VigilError};
use crate::protocol::ProtocolRegistry;
use crate::store::SnapshotStore;
use crate::types::{Blake3Hash, Timestamp};

/// Seal lifecycle state. Transitions are one-way:
/// `Collecting -> Sealed -> Unlocked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SealState {
    Collecting,
    Sealed,
    Unlocked,
}

impl fmt::Display for SealState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SealState::Collecting => "collecting",
            SealState::Sealed => "sealed",
            SealState::Unlocked => "unlocked",
        };
        write!(f, "{}", label)
    }
}

/// Shared gate consulted on every content read path.
///
/// The store and the protocol registry each hold a clone, so the access
/// check lives where the data lives rather than in caller convention.
#[derive(Debug)]
pub struct SealGate {
    state: RwLock<SealState>,
}

impl SealGate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(SealState::Collecting),
        })
    }

    pub fn state(&self) -> SealState {
        *self.state.read().unwrap()
    }

    /// True only after a verified unlock.
    pub fn content_reads_allowed(&self) -> bool {
        self.state() == SealState::Unlocked
    }

    pub(crate) fn set(&self, state: SealState) {
        *self.state.write().unwrap() = state;
    }
}

/// Signature scheme identifier written into every seal record
const SEAL_SCHEME: &str = "ed25519-blake3-seal-v1";

/// The pre-commitment created by `seal()`. Created exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealRecord {
    pub created_at: Timestamp,
    pub target_unlock_at: Timestamp,
    /// Chain hash over every snapshot existing at seal time
    pub chain_hash_at_seal: Blake3Hash,
    /// Length of the sealed prefix
    pub sealed_snapshot_count: u64,
    /// Freeze hash of the protocol registry at seal time
    pub protocol_freeze_hash: Blake3Hash,
    pub signer_public_key: String,
    pub signature: String,
    pub signature_scheme: String,
}

impl SealRecord {
    /// Issue a signed seal record with a fresh signing key.
    pub fn issue(
        created_at: Timestamp,
        target_unlock_at: Timestamp,
        chain_hash_at_seal: Blake3Hash,
        sealed_snapshot_count: u64,
        protocol_freeze_hash: Blake3Hash,
    ) -> Self {
        let mut secret_key = [0u8; 32];
        OsRng.fill_bytes(&mut secret_key);
        let signing_key = SigningKey::from_bytes(&secret_key);

        let mut record = Self {
            created_at,
            target_unlock_at,
            chain_hash_at_seal,
            sealed_snapshot_count,
            protocol_freeze_hash,
            signer_public_key: hex::encode(signing_key.verifying_key().to_bytes()),
            signature: String::new(),
            signature_scheme: SEAL_SCHEME.to_string(),
        };

        let signature = signing_key.sign(&record.signing_payload());
        record.signature = hex::encode(signature.to_bytes());
        record
    }

    /// Verify the record's signature over its own fields.
    pub fn verify(&self) -> bool {
        let public_key_bytes = match hex::decode(&self.signer_public_key) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        let public_key_array: [u8; 32] = match public_key_bytes.try_into() {
            Ok(arr) => arr,
            Err(_) => return false,
        };
        let verifying_key = match VerifyingKey::from_bytes(&public_key_array) {
            Ok(key) => key,
            Err(_) => return false,
        };

        let signature_bytes = match hex::decode(&self.signature) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        let signature = match Signature::from_slice(&signature_bytes) {
            Ok(sig) => sig,
            Err(_) => return false,
        };

        verifying_key
            .verify(&self.signing_payload(), &signature)
            .is_ok()
    }

    fn signing_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(256);
        payload.extend_from_slice(&self.created_at.timestamp_millis().to_le_bytes());
        payload.extend_from_slice(&self.target_unlock_at.timestamp_millis().to_le_bytes());
        payload.extend_from_slice(self.chain_hash_at_seal.to_hex().as_bytes());
        payload.extend_from_slice(&self.sealed_snapshot_count.to_le_bytes());
        payload.extend_from_slice(self.protocol_freeze_hash.to_hex().as_bytes());
        payload.extend_from_slice(self.signature_scheme.as_bytes());
        payload
    }
}

/// Result of a successful unlock. Repeated calls return the same value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnlockOutcome {
    pub unlocked_at: Timestamp,
    pub sealed_snapshots: u64,
    pub chain_hash: Blake3Hash,
}

/// Gates read/analysis access to the snapshot store and the protocol
/// registry until the committed unlock time, with integrity verification.
pub struct SealManager {
    seal_path: PathBuf,
    unlock_path: PathBuf,
    store: Arc<SnapshotStore>,
    registry: Arc<ProtocolRegistry>,
    gate: Arc<SealGate>,
    record: RwLock<Option<SealRecord>>,
    outcome: RwLock<Option<UnlockOutcome>>,
    // serializes the unlock transition so exactly one caller wins a race
    transition: Mutex<()>,
}

impl SealManager {
    /// Open the manager over an existing data directory, restoring state
    /// from `seal.json` / `unlock.json` if present.
    pub async fn open(
        data_dir: impl Into<PathBuf>,
        store: Arc<SnapshotStore>,
        registry: Arc<ProtocolRegistry>,
        gate: Arc<SealGate>,
    ) -> Result<Self> {
        let data_dir = data_dir.into();
        let manager = Self {
            seal_path: data_dir.join("seal.json"),
            unlock_path: data_dir.join("unlock.json"),
            store,
            registry,
            gate,
            record: RwLock::new(None),
            outcome: RwLock::new(None),
            transition: Mutex::new(()),
        };

        if manager.seal_path.exists() {
            let content = tokio::fs::read_to_string(&manager.seal_path).await?;
            let record: SealRecord = serde_json::from_str(&content)?;
            *manager.record.write().unwrap() = Some(record.clone());
            manager.gate.set(SealState::Sealed);

            // A persisted unlock marker only counts if the seal record
            // still verifies; otherwise the system stays sealed.
            if manager.unlock_path.exists() && record.verify() {
                let content = tokio::fs::read_to_string(&manager.unlock_path).await?;
                let outcome: UnlockOutcome = serde_json::from_str(&content)?;
                *manager.outcome.write().unwrap() = Some(outcome);
                manager.gate.set(SealState::Unlocked);
            }
        }

        Ok(manager)
    }

    pub fn state(&self) -> SealState {
        self.gate.state()
    }

    pub fn record(&self) -> Option<SealRecord> {
        self.record.read().unwrap().clone()
    }

    /// Seconds left until the unlock target, if sealed and still early.
    pub fn remaining_secs(&self, now: Timestamp) -> Option<i64> {
        let record = self.record.read().unwrap();
        record.as_ref().and_then(|r| {
            let remaining = (r.target_unlock_at - now).num_seconds();
            (remaining > 0).then_some(remaining)
        })
    }

    /// Create the seal record and start the blind period.
    ///
    /// Freezes the protocol registry, records the chain hash over every
    /// snapshot existing right now, and transitions to `Sealed`. Fails with
    /// `AlreadySealed` if a seal record exists.
    pub async fn seal(&self, target_unlock_at: Timestamp, now: Timestamp) -> Result<SealRecord> {
        let _guard = self.transition.lock().await;
        if self.record.read().unwrap().is_some() || self.seal_path.exists() {
            return Err(VigilError::AlreadySealed);
        }

        let freeze_hash = self.registry.freeze().await?;
        let sealed_count = self.store.len();
        let chain_hash = self.store.chain_hash(sealed_count)?;

        let record = SealRecord::issue(now, target_unlock_at, chain_hash, sealed_count, freeze_hash);
        let content = serde_json::to_string_pretty(&record)?;
        tokio::fs::write(&self.seal_path, content).await?;

        *self.record.write().unwrap() = Some(record.clone());
        self.gate.set(SealState::Sealed);

        tracing::info!(
            target_unlock_at = %target_unlock_at,
            sealed_snapshots = sealed_count,
            chain_hash = %chain_hash,
            "seal record created, blind period started"
        );
        Ok(record)
    }

    /// Attempt the one-way transition to `Unlocked`.
    ///
    /// Early calls fail with `TooEarly` and have no side effects, any number
    /// of times. At or after the target time the sealed chain prefix is
    /// re-verified; a mismatch is a fatal `IntegrityViolation` and the
    /// system stays sealed. Racing callers at the target time are
    /// serialized: the first performs the transition, the rest observe the
    /// same success outcome.
    pub async fn attempt_unlock(&self, now: Timestamp) -> Result<UnlockOutcome> {
        if self.gate.state() == SealState::Unlocked {
            return self.stored_outcome();
        }

        let record = self.record().ok_or(VigilError::NotSealed)?;

        if now < record.target_unlock_at {
            let remaining_secs = (record.target_unlock_at - now).num_seconds();
            return Err(VigilError::TooEarly { remaining_secs });
        }

        let _guard = self.transition.lock().await;
        // A racing caller may have completed the transition while this one
        // waited on the lock.
        if self.gate.state() == SealState::Unlocked {
            return self.stored_outcome();
        }

        if !record.verify() {
            tracing::error!("seal record signature does not verify");
            return Err(VigilError::IntegrityViolation {
                expected: format!("valid {} signature", record.signature_scheme),
                actual: "signature verification failed".to_string(),
            });
        }

        if self.store.len() < record.sealed_snapshot_count {
            tracing::error!(
                sealed = record.sealed_snapshot_count,
                present = self.store.len(),
                "sealed chain prefix has been truncated"
            );
            return Err(VigilError::IntegrityViolation {
                expected: format!("{} sealed snapshots", record.sealed_snapshot_count),
                actual: format!("{} snapshots on disk", self.store.len()),
            });
        }

        let recomputed = self.store.chain_hash(record.sealed_snapshot_count)?;
        if recomputed != record.chain_hash_at_seal {
            tracing::error!(
                expected = %record.chain_hash_at_seal,
                actual = %recomputed,
                "chain hash mismatch over the sealed prefix"
            );
            return Err(VigilError::IntegrityViolation {
                expected: record.chain_hash_at_seal.to_hex(),
                actual: recomputed.to_hex(),
            });
        }

        // Every link, including post-seal appends, must still recompute
        // from the payload bytes on disk.
        if !self.store.verify_chain(0, self.store.len()).await? {
            return Err(VigilError::IntegrityViolation {
                expected: "self-consistent hash chain".to_string(),
                actual: "stored link hashes do not recompute".to_string(),
            });
        }

        let registry_hash = self.registry.current_content_hash().await?;
        if registry_hash != record.protocol_freeze_hash {
            tracing::error!(
                expected = %record.protocol_freeze_hash,
                actual = %registry_hash,
                "protocol registry changed during the blind period"
            );
            return Err(VigilError::IntegrityViolation {
                expected: record.protocol_freeze_hash.to_hex(),
                actual: registry_hash.to_hex(),
            });
        }

        let outcome = UnlockOutcome {
            unlocked_at: now,
            sealed_snapshots: record.sealed_snapshot_count,
            chain_hash: record.chain_hash_at_seal,
        };
        let content = serde_json::to_string_pretty(&outcome)?;
        tokio::fs::write(&self.unlock_path, content).await?;

        *self.outcome.write().unwrap() = Some(outcome.clone());
        self.gate.set(SealState::Unlocked);

        tracing::info!(
            unlocked_at = %now,
            sealed_snapshots = outcome.sealed_snapshots,
            "seal verified, content unlocked"
        );
        Ok(outcome)
    }

    fn stored_outcome(&self) -> Result<UnlockOutcome> {
        self.outcome
            .read()
            .unwrap()
            .clone()
            .ok_or_else(|| VigilError::NotFound("unlock outcome".to_string()))
    }
}

impl fmt::Debug for SealManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SealManager")
            .field("state", &self.gate.state())
            .field("seal_path", &self.seal_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::now;
    use chrono::Duration;

    fn sample_record(target: Timestamp) -> SealRecord {
        SealRecord::issue(
            now(),
            target,
            Blake3Hash::from(blake3::hash(b"chain")),
            3,
            Blake3Hash::from(blake3::hash(b"protocols")),
        )
    }

    #[test]
    fn test_seal_record_verifies() {
        let record = sample_record(now() + Duration::days(30));
        assert!(record.verify());
    }

    #[test]
    fn test_seal_record_fails_on_tampered_target() {
        let mut record = sample_record(now() + Duration::days(30));
        // Moving the unlock date earlier must break the signature.
        record.target_unlock_at = record.target_unlock_at - Duration::days(29);
        assert!(!record.verify());
    }

    #[test]
    fn test_seal_record_fails_on_tampered_chain_hash() {
        let mut record = sample_record(now() + Duration::days(30));
        record.chain_hash_at_seal = Blake3Hash::from(blake3::hash(b"forged"));
        assert!(!record.verify());
    }

    #[test]
    fn test_gate_starts_collecting() {
        let gate = SealGate::new();
        assert_eq!(gate.state(), SealState::Collecting);
        assert!(!gate.content_reads_allowed());

        gate.set(SealState::Unlocked);
        assert!(gate.content_reads_allowed());
    }
}
