//! Blind Collector - gathers discourse data without analyzing it
//!
//! One collection pass lists recent tasks, fetches details and comments per
//! task, validates everything at the boundary, and appends a single
//! snapshot. A failing item is skipped and logged; it never aborts the rest
//! of the batch.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::error::Result;
use crate::source::DiscourseSource;
use crate::store::{Snapshot, SnapshotStore};
use crate::types::{Comment, SnapshotPayload, Task};

/// One skipped item and why
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftFailure {
    pub task_id: u64,
    pub reason: String,
}

/// What one collection pass accomplished
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionReport {
    pub snapshot_sequence: u64,
    pub tasks_stored: usize,
    pub comments_stored: usize,
    pub comments_skipped: usize,
    pub soft_failures: Vec<SoftFailure>,
}

/// Periodic single-writer collection task.
pub struct Collector<S: DiscourseSource> {
    source: S,
    store: Arc<SnapshotStore>,
    clock: Arc<dyn Clock>,
    limit: usize,
}

impl<S: DiscourseSource> Collector<S> {
    pub fn new(source: S, store: Arc<SnapshotStore>, clock: Arc<dyn Clock>, limit: usize) -> Self {
        Self {
            source,
            store,
            clock,
            limit,
        }
    }

    /// Perform one collection pass and append one snapshot.
    ///
    /// Listing failure is fatal for the pass; everything per-item is a
    /// `SoftFailure`. The append itself is serialized by the store, so a
    /// racing pass observes `CollectionInProgress`.
    pub async fn collect_once(&self) -> Result<(Snapshot, CollectionReport)> {
        let summaries = self.source.list_tasks(self.limit).await?;
        tracing::info!(listed = summaries.len(), "fetching task details");

        let mut tasks: Vec<Task> = Vec::with_capacity(summaries.len());
        let mut comments: Vec<Comment> = Vec::new();
        let mut comments_skipped = 0usize;
        let mut soft_failures: Vec<SoftFailure> = Vec::new();

        for summary in summaries {
            let detail = match self.source.get_task_detail(summary.id).await {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    soft_failures.push(self.skip(summary.id, "null detail response"));
                    continue;
                }
                Err(e) => {
                    soft_failures.push(self.skip(summary.id, &e.to_string()));
                    continue;
                }
            };

            let task = match detail.validate() {
                Ok(task) => task,
                Err(reason) => {
                    soft_failures.push(self.skip(summary.id, &reason));
                    continue;
                }
            };

            let raw_comments = match self.source.list_comments(task.id).await {
                Ok(raw) => raw,
                Err(e) => {
                    soft_failures.push(self.skip(summary.id, &e.to_string()));
                    continue;
                }
            };

            for raw in raw_comments {
                match raw.validate() {
                    Ok(comment) => comments.push(comment),
                    Err(reason) => {
                        tracing::warn!(task_id = task.id, reason, "skipping malformed comment");
                        comments_skipped += 1;
                    }
                }
            }

            tasks.push(task);
        }

        let payload = SnapshotPayload::new(tasks, comments);
        let report_tasks = payload.task_count();
        let report_comments = payload.comment_count();
        let snapshot = self.store.append(payload, self.clock.now()).await?;

        let report = CollectionReport {
            snapshot_sequence: snapshot.sequence_number,
            tasks_stored: report_tasks,
            comments_stored: report_comments,
            comments_skipped,
            soft_failures,
        };
        tracing::info!(
            sequence = report.snapshot_sequence,
            tasks = report.tasks_stored,
            comments = report.comments_stored,
            skipped = report.soft_failures.len(),
            "collection pass complete"
        );
        Ok((snapshot, report))
    }

    /// Run collection passes forever at a fixed interval.
    ///
    /// A pass that fails (including `CollectionInProgress`) is logged and
    /// the schedule continues; the blind period must not end early because
    /// one pull failed.
    pub async fn run_every(&self, interval: Duration) -> Result<()> {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(e) = self.collect_once().await {
                tracing::warn!(error = %e, "scheduled collection pass failed");
            }
        }
    }

    fn skip(&self, task_id: u64, reason: &str) -> SoftFailure {
        tracing::warn!(task_id, reason, "skipping task");
        SoftFailure {
            task_id,
            reason: reason.to_string(),
        }
    }
}

impl<S: DiscourseSource> std::fmt::Debug for Collector<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector").field("limit", &self.limit).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::seal::SealGate;
    use crate::source::{RawComment, RawTask, TaskSummary};
    use crate::types::now;
    use async_trait::async_trait;
    use std::collections::HashSet;

    /// Stub source: tasks 1..=n, with a configurable set of ids that
    /// return a null detail.
    struct StubSource {
        task_ids: Vec<u64>,
        null_ids: HashSet<u64>,
    }

    #[async_trait]
    impl DiscourseSource for StubSource {
        async fn list_tasks(&self, limit: usize) -> Result<Vec<TaskSummary>> {
            Ok(self
                .task_ids
                .iter()
                .take(limit)
                .map(|&id| TaskSummary { id, title: None })
                .collect())
        }

        async fn get_task_detail(&self, id: u64) -> Result<Option<RawTask>> {
            if self.null_ids.contains(&id) {
                return Ok(None);
            }
            Ok(Some(RawTask {
                id: Some(id),
                title: Some(format!("task {}", id)),
                comment_count: Some(1),
                created_at: Some("2026-01-10T08:00:00Z".to_string()),
                ..Default::default()
            }))
        }

        async fn list_comments(&self, task_id: u64) -> Result<Vec<RawComment>> {
            Ok(vec![RawComment {
                id: Some(task_id * 100),
                task_id: Some(task_id),
                author: Some("echo".to_string()),
                body: Some("on it".to_string()),
                created_at: Some("2026-01-11T08:00:00Z".to_string()),
            }])
        }
    }

    #[tokio::test]
    async fn test_null_details_skip_without_aborting_batch() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            SnapshotStore::open(dir.path(), SealGate::new()).await.unwrap(),
        );
        let source = StubSource {
            task_ids: (1..=20).collect(),
            null_ids: [3, 9, 17].into_iter().collect(),
        };
        let clock = Arc::new(ManualClock::new(now()));
        let collector = Collector::new(source, store.clone(), clock, 100);

        let (snapshot, report) = collector.collect_once().await.unwrap();

        assert_eq!(report.tasks_stored, 17);
        assert_eq!(report.soft_failures.len(), 3);
        assert_eq!(snapshot.payload.task_count(), 17);
        assert!(report
            .soft_failures
            .iter()
            .all(|f| f.reason.contains("null detail")));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_limit_respected() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            SnapshotStore::open(dir.path(), SealGate::new()).await.unwrap(),
        );
        let source = StubSource {
            task_ids: (1..=50).collect(),
            null_ids: HashSet::new(),
        };
        let clock = Arc::new(ManualClock::new(now()));
        let collector = Collector::new(source, store, clock, 5);

        let (_, report) = collector.collect_once().await.unwrap();
        assert_eq!(report.tasks_stored, 5);
        assert_eq!(report.comments_stored, 5);
    }
}
