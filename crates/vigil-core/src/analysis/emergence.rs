//! Collaborative emergence metric
//!
//! Looks for conceptual connections that exist only at the thread level in
//! multi-author discussions: a pair of concepts that co-occur somewhere in
//! the thread while no single comment contains both. A lone keyword always
//! lives inside some one comment, so the pair is the smallest unit that can
//! genuinely emerge from the exchange rather than from one head.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::analysis::embedding::extract_concepts;
use crate::types::Comment;

/// An emergent concept connection within one task's thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergentPair {
    pub concept_a: String,
    pub concept_b: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEmergence {
    pub task_id: u64,
    pub author_count: usize,
    pub emergent_pair_count: usize,
    /// A few example pairs, lexicographically first
    pub examples: Vec<EmergentPair>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergenceResult {
    pub multi_author_tasks: usize,
    pub total_emergent_pairs: usize,
    pub per_task: Vec<TaskEmergence>,
}

const EXAMPLE_LIMIT: usize = 5;

/// Compute emergent concept pairs over every multi-author thread.
///
/// `max_concepts_per_task` bounds the per-thread concept vocabulary (most
/// frequent first) so the pair space stays tractable.
pub fn compute(comments: &[Comment], max_concepts_per_task: usize) -> EmergenceResult {
    let mut by_task: BTreeMap<u64, Vec<&Comment>> = BTreeMap::new();
    for comment in comments {
        by_task.entry(comment.task_id).or_default().push(comment);
    }

    let mut per_task = Vec::new();
    let mut total_emergent_pairs = 0usize;
    let mut multi_author_tasks = 0usize;

    for (task_id, thread) in by_task {
        let authors: BTreeSet<&str> = thread.iter().map(|c| c.author.as_str()).collect();
        if authors.len() < 2 {
            continue;
        }
        multi_author_tasks += 1;

        // Concept set per comment, and thread-level frequencies.
        let comment_sets: Vec<BTreeSet<String>> = thread
            .iter()
            .map(|c| extract_concepts(&c.body))
            .collect();
        let mut frequency: BTreeMap<&str, usize> = BTreeMap::new();
        for set in &comment_sets {
            for concept in set {
                *frequency.entry(concept).or_insert(0) += 1;
            }
        }

        let mut vocabulary: Vec<&str> = frequency.keys().copied().collect();
        vocabulary.sort_by(|a, b| frequency[b].cmp(&frequency[a]).then(a.cmp(b)));
        vocabulary.truncate(max_concepts_per_task);

        let mut pairs = Vec::new();
        for (i, a) in vocabulary.iter().enumerate() {
            for b in &vocabulary[i + 1..] {
                let co_resident = comment_sets
                    .iter()
                    .any(|set| set.contains(*a) && set.contains(*b));
                if !co_resident {
                    pairs.push(EmergentPair {
                        concept_a: (*a.min(b)).to_string(),
                        concept_b: (*a.max(b)).to_string(),
                    });
                }
            }
        }
        pairs.sort_by(|x, y| (&x.concept_a, &x.concept_b).cmp(&(&y.concept_a, &y.concept_b)));

        total_emergent_pairs += pairs.len();
        let emergent_pair_count = pairs.len();
        pairs.truncate(EXAMPLE_LIMIT);

        per_task.push(TaskEmergence {
            task_id,
            author_count: authors.len(),
            emergent_pair_count,
            examples: pairs,
        });
    }

    EmergenceResult {
        multi_author_tasks,
        total_emergent_pairs,
        per_task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::now;

    fn comment(id: u64, task_id: u64, author: &str, body: &str) -> Comment {
        Comment {
            id,
            task_id,
            author: author.to_string(),
            body: body.to_string(),
            created_at: now(),
        }
    }

    #[test]
    fn test_pair_across_authors_emerges() {
        // "lattice" and "gossip" never share a comment.
        let comments = vec![
            comment(1, 1, "ada", "try a lattice"),
            comment(2, 1, "grace", "use gossip"),
        ];

        let result = compute(&comments, 25);
        assert_eq!(result.multi_author_tasks, 1);
        let task = &result.per_task[0];
        assert_eq!(task.author_count, 2);
        assert!(task.examples.contains(&EmergentPair {
            concept_a: "gossip".to_string(),
            concept_b: "lattice".to_string(),
        }));
    }

    #[test]
    fn test_pair_inside_one_comment_does_not_emerge() {
        let comments = vec![
            comment(1, 1, "ada", "lattice with gossip convergence"),
            comment(2, 1, "grace", "sounds right"),
        ];

        let result = compute(&comments, 25);
        let task = &result.per_task[0];
        assert!(!task.examples.iter().any(|p| {
            p.concept_a == "gossip" && p.concept_b == "lattice"
        }));
    }

    #[test]
    fn test_single_author_threads_skipped() {
        let comments = vec![
            comment(1, 1, "ada", "first idea about caching"),
            comment(2, 1, "ada", "second idea about eviction"),
        ];

        let result = compute(&comments, 25);
        assert_eq!(result.multi_author_tasks, 0);
        assert!(result.per_task.is_empty());
    }

    #[test]
    fn test_vocabulary_cap_bounds_pairs() {
        let comments = vec![
            comment(1, 1, "ada", "alpha beta gamma delta epsilon"),
            comment(2, 1, "grace", "zeta theta iota kappa lambda"),
        ];

        let capped = compute(&comments, 4);
        // 4 concepts -> at most 6 pairs.
        assert!(capped.total_emergent_pairs <= 6);
    }
}
