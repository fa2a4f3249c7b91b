//! Temporal dynamics metric
//!
//! Tracks concept-set drift across the ordered snapshot sequence: the
//! Jaccard distance between the vocabulary of consecutive snapshots. A
//! stable project hovers near zero drift; a pivot spikes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::analysis::embedding::{extract_concepts, jaccard};
use crate::store::Snapshot;
use crate::types::Timestamp;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftStep {
    pub from_sequence: u64,
    pub to_sequence: u64,
    pub to_collected_at: Timestamp,
    pub jaccard: f64,
    /// 1 - jaccard
    pub drift: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicsResult {
    pub steps: Vec<DriftStep>,
    pub mean_drift: f64,
    pub max_drift: f64,
}

fn snapshot_concepts(snapshot: &Snapshot) -> BTreeSet<String> {
    let mut concepts = BTreeSet::new();
    for task in &snapshot.payload.tasks {
        concepts.extend(extract_concepts(&task.title));
        for tag in &task.tags {
            concepts.extend(extract_concepts(tag));
        }
    }
    for comment in &snapshot.payload.comments {
        concepts.extend(extract_concepts(&comment.body));
    }
    concepts
}

/// Compute drift over consecutive snapshots, in chain order.
pub fn compute(snapshots: &[Snapshot]) -> DynamicsResult {
    let concept_sets: Vec<(u64, Timestamp, BTreeSet<String>)> = snapshots
        .iter()
        .map(|s| (s.sequence_number, s.collected_at, snapshot_concepts(s)))
        .collect();

    let steps: Vec<DriftStep> = concept_sets
        .windows(2)
        .map(|pair| {
            let (from_seq, _, from_set) = &pair[0];
            let (to_seq, to_at, to_set) = &pair[1];
            let similarity = jaccard(from_set, to_set);
            DriftStep {
                from_sequence: *from_seq,
                to_sequence: *to_seq,
                to_collected_at: *to_at,
                jaccard: similarity,
                drift: 1.0 - similarity,
            }
        })
        .collect();

    let mean_drift = if steps.is_empty() {
        0.0
    } else {
        steps.iter().map(|s| s.drift).sum::<f64>() / steps.len() as f64
    };
    let max_drift = steps.iter().map(|s| s.drift).fold(0.0, f64::max);

    DynamicsResult {
        steps,
        mean_drift,
        max_drift,
    }
}
