//! Core types for Vigil
//!
//! This module defines the fundamental types used across Vigil:
//! - Timestamps
//! - Hashes
//! - The collected data model (tasks, comments, snapshot payloads)
//! - The count-only activity projection used during the blind period

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;

/// Timestamp type alias
pub type Timestamp = DateTime<Utc>;

/// Create a timestamp for the current moment
pub fn now() -> Timestamp {
    Utc::now()
}

/// Blake3 hash wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Blake3Hash([u8; 32]);

impl Blake3Hash {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn empty() -> Self {
        Self([0u8; 32])
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> std::result::Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl From<blake3::Hash> for Blake3Hash {
    fn from(hash: blake3::Hash) -> Self {
        Self(*hash.as_bytes())
    }
}

impl fmt::Display for Blake3Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Lifecycle status of a collected task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    InProgress,
    Done,
}

impl TaskStatus {
    /// Parse the status strings the ClawBoard API emits.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(TaskStatus::Open),
            "in_progress" | "in-progress" => Some(TaskStatus::InProgress),
            "done" | "completed" | "closed" => Some(TaskStatus::Done),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskStatus::Open => "open",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
        };
        write!(f, "{}", label)
    }
}

/// One collected ClawBoard task.
///
/// Immutable once stored in a snapshot; later snapshots may carry updated
/// counts for the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,
    pub title: String,
    pub tags: Vec<String>,
    pub upvote_count: u32,
    pub comment_count: u32,
    /// Deliverables attached to the task (pull requests)
    pub pr_count: u32,
    /// Deliverables that were merged/completed
    pub merged_pr_count: u32,
    pub status: TaskStatus,
    /// Authoring agent, when the API reports one
    pub agent: Option<String>,
    pub created_at: Timestamp,
}

impl Task {
    /// Project the task down to its count-only activity record.
    ///
    /// The projection carries no titles, tags, or bodies and is the only
    /// view of a task that crosses the seal boundary before unlock.
    pub fn activity(&self) -> TaskActivity {
        TaskActivity {
            task_id: self.id,
            created_at: self.created_at,
            status: self.status,
            comment_count: self.comment_count,
            pr_count: self.pr_count,
            merged_pr_count: self.merged_pr_count,
            agent: self.agent.clone(),
        }
    }
}

/// One collected comment. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: u64,
    pub task_id: u64,
    pub author: String,
    pub body: String,
    pub created_at: Timestamp,
}

/// Count-only metadata projection of a task.
///
/// Reveals activity volume, never semantic content, so it is readable in
/// every seal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskActivity {
    pub task_id: u64,
    pub created_at: Timestamp,
    pub status: TaskStatus,
    pub comment_count: u32,
    pub pr_count: u32,
    pub merged_pr_count: u32,
    pub agent: Option<String>,
}

impl TaskActivity {
    /// Deliverable count used by the structural engine.
    pub fn deliverable_count(&self) -> u32 {
        self.pr_count
    }

    /// Age of the task in whole days at `at`.
    pub fn age_days(&self, at: Timestamp) -> i64 {
        (at - self.created_at).num_days()
    }
}

/// The content of one snapshot: everything collected in a single pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotPayload {
    pub tasks: Vec<Task>,
    pub comments: Vec<Comment>,
}

impl SnapshotPayload {
    pub fn new(tasks: Vec<Task>, comments: Vec<Comment>) -> Self {
        Self { tasks, comments }
    }

    /// Canonical byte serialization of the payload.
    ///
    /// These exact bytes are what gets hashed into the chain and written to
    /// disk, so hashing and storage can never disagree.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn comment_count(&self) -> usize {
        self.comments.len()
    }

    /// Activity projections for every task in the payload.
    pub fn activities(&self) -> Vec<TaskActivity> {
        self.tasks.iter().map(Task::activity).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_task() -> Task {
        Task {
            id: 42,
            title: "Implement gossip mesh".to_string(),
            tags: vec!["networking".to_string()],
            upvote_count: 3,
            comment_count: 7,
            pr_count: 2,
            merged_pr_count: 1,
            status: TaskStatus::InProgress,
            agent: Some("echo".to_string()),
            created_at: now(),
        }
    }

    #[test]
    fn test_hash_hex_roundtrip() {
        let hash = Blake3Hash::from(blake3::hash(b"payload"));
        let hex = hash.to_hex();
        assert_eq!(Blake3Hash::from_hex(&hex).unwrap(), hash);
    }

    #[test]
    fn test_empty_hash_is_zeroes() {
        assert_eq!(Blake3Hash::empty().to_hex(), "0".repeat(64));
    }

    #[test]
    fn test_activity_projection_drops_semantic_fields() {
        let task = sample_task();
        let activity = task.activity();

        assert_eq!(activity.task_id, 42);
        assert_eq!(activity.comment_count, 7);
        assert_eq!(activity.deliverable_count(), 2);

        // The serialized projection must never leak the title or tags.
        let json = serde_json::to_string(&activity).unwrap();
        assert!(!json.contains("gossip"));
        assert!(!json.contains("networking"));
    }

    #[test]
    fn test_canonical_bytes_deterministic() {
        let payload = SnapshotPayload::new(vec![sample_task()], Vec::new());
        assert_eq!(
            payload.canonical_bytes().unwrap(),
            payload.canonical_bytes().unwrap()
        );
    }

    #[test]
    fn test_status_parse_aliases() {
        assert_eq!(TaskStatus::parse("in-progress"), Some(TaskStatus::InProgress));
        assert_eq!(TaskStatus::parse("completed"), Some(TaskStatus::Done));
        assert_eq!(TaskStatus::parse("weird"), None);
    }
}
