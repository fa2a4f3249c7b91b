//! Conceptual synthesis metric
//!
//! Finds concepts that surface in two or more otherwise-unrelated tasks:
//! the same idea being reached from different directions is the signal
//! here, so tasks that broadly discuss the same topic are excluded by a
//! concept-overlap threshold.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::analysis::embedding::{extract_concepts, jaccard};
use crate::types::{Comment, Task};

/// One concept bridging unrelated tasks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossPollination {
    pub concept: String,
    /// Tasks the concept appears in, at least one unrelated pair among them
    pub task_ids: Vec<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisResult {
    pub cross_pollinations: Vec<CrossPollination>,
    pub concepts_considered: usize,
}

/// Per-task concept sets from title, tags and the comment thread.
fn task_concepts(tasks: &[Task], comments: &[Comment]) -> BTreeMap<u64, BTreeSet<String>> {
    let mut by_task: BTreeMap<u64, BTreeSet<String>> = BTreeMap::new();

    for task in tasks {
        let mut text = task.title.clone();
        for tag in &task.tags {
            text.push(' ');
            text.push_str(tag);
        }
        by_task.insert(task.id, extract_concepts(&text));
    }
    for comment in comments {
        if let Some(set) = by_task.get_mut(&comment.task_id) {
            set.extend(extract_concepts(&comment.body));
        }
    }

    by_task
}

/// Compute cross-pollination pairs.
///
/// Two tasks are "related" when the Jaccard overlap of their concept sets
/// reaches `relatedness_jaccard`; a concept only counts as synthesis when
/// it connects at least one unrelated pair.
pub fn compute(
    tasks: &[Task],
    comments: &[Comment],
    relatedness_jaccard: f64,
) -> SynthesisResult {
    let by_task = task_concepts(tasks, comments);

    // concept -> tasks containing it
    let mut concept_tasks: BTreeMap<&str, Vec<u64>> = BTreeMap::new();
    for (task_id, concepts) in &by_task {
        for concept in concepts {
            concept_tasks.entry(concept).or_default().push(*task_id);
        }
    }

    let concepts_considered = concept_tasks.len();
    let mut cross_pollinations = Vec::new();

    for (concept, task_ids) in concept_tasks {
        if task_ids.len() < 2 {
            continue;
        }

        let has_unrelated_pair = task_ids.iter().enumerate().any(|(i, a)| {
            task_ids[i + 1..].iter().any(|b| {
                jaccard(&by_task[a], &by_task[b]) < relatedness_jaccard
            })
        });

        if has_unrelated_pair {
            cross_pollinations.push(CrossPollination {
                concept: concept.to_string(),
                task_ids,
            });
        }
    }

    SynthesisResult {
        cross_pollinations,
        concepts_considered,
    }
}
