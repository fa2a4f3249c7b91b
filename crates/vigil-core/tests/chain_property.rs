//! Property test: chain verification over arbitrary append sequences
//!
//! For any sequence of appended snapshots the full chain verifies, and
//! flipping any single payload byte breaks it.

use proptest::prelude::*;
use std::sync::Arc;

use vigil_core::seal::SealGate;
use vigil_core::store::SnapshotStore;
use vigil_core::types::{now, Comment, SnapshotPayload, Task, TaskStatus};

fn task(id: u64, comments: u32) -> Task {
    Task {
        id,
        title: format!("generated task {}", id),
        tags: Vec::new(),
        upvote_count: 0,
        comment_count: comments,
        pr_count: 0,
        merged_pr_count: 0,
        status: TaskStatus::Open,
        agent: None,
        created_at: now(),
    }
}

fn comment(id: u64, task_id: u64, body_seed: u8) -> Comment {
    Comment {
        id,
        task_id,
        author: "gen".to_string(),
        body: format!("generated body {}", body_seed),
        created_at: now(),
    }
}

/// A snapshot description: task count and one byte of comment variety.
fn snapshot_strategy() -> impl Strategy<Value = (u8, u8)> {
    (0u8..4, any::<u8>())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn chain_verifies_and_tampering_breaks_it(
        snapshots in proptest::collection::vec(snapshot_strategy(), 1..5),
        victim_index in any::<prop::sample::Index>(),
        flip_bit in 0u8..8,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let store = Arc::new(
                SnapshotStore::open(dir.path(), SealGate::new()).await.unwrap(),
            );

            for (i, (task_count, seed)) in snapshots.iter().enumerate() {
                let tasks: Vec<Task> = (0..*task_count)
                    .map(|t| task(i as u64 * 10 + u64::from(t), u32::from(*seed)))
                    .collect();
                let comments: Vec<Comment> = tasks
                    .iter()
                    .map(|t| comment(t.id * 100, t.id, *seed))
                    .collect();
                store
                    .append(SnapshotPayload::new(tasks, comments), now())
                    .await
                    .unwrap();
            }

            let n = store.len();
            prop_assert!(store.verify_chain(0, n).await.unwrap());

            // Flip one bit of one stored payload.
            let victim = victim_index.index(n as usize) as u64;
            let entry = store.entry(victim).unwrap();
            let path = dir
                .path()
                .join("snapshots")
                .join(format!("{}.json", entry.content_hash.to_hex()));
            let mut bytes = std::fs::read(&path).unwrap();
            let byte_index = bytes.len() / 2;
            bytes[byte_index] ^= 1 << flip_bit;
            std::fs::write(&path, &bytes).unwrap();

            prop_assert!(!store.verify_chain(0, n).await.unwrap());
            Ok(())
        })?;
    }
}
