//! Semantic novelty metric
//!
//! Distance of each comment from a baseline centroid of formulaic, expected
//! phrasing. High distance means the discourse left the beaten track.

use serde::{Deserialize, Serialize};

use crate::analysis::embedding::{centroid, cosine_similarity, EmbeddingProvider};
use crate::types::{Comment, Timestamp};

/// Novelty band, highest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoveltyBand {
    Pioneer,
    Explorer,
    Iterator,
    Variant,
    Echo,
}

impl NoveltyBand {
    /// Band cutoffs follow the original scoring scale.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            NoveltyBand::Pioneer
        } else if score >= 0.6 {
            NoveltyBand::Explorer
        } else if score >= 0.4 {
            NoveltyBand::Iterator
        } else if score >= 0.2 {
            NoveltyBand::Variant
        } else {
            NoveltyBand::Echo
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskNovelty {
    pub task_id: u64,
    pub comment_count: usize,
    pub mean_distance: f64,
    pub band: NoveltyBand,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowNovelty {
    pub window_start: Timestamp,
    pub comment_count: usize,
    pub mean_distance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoveltyResult {
    pub overall_mean: f64,
    pub per_task: Vec<TaskNovelty>,
    pub per_window: Vec<WindowNovelty>,
}

/// Compute semantic novelty over every comment in the corpus.
pub fn compute(
    comments: &[Comment],
    provider: &dyn EmbeddingProvider,
    baseline_phrases: &[String],
    window_days: i64,
) -> NoveltyResult {
    let baseline_vectors: Vec<Vec<f32>> = baseline_phrases
        .iter()
        .map(|phrase| provider.embed(phrase))
        .collect();
    let baseline = centroid(&baseline_vectors, provider.dimension());

    // distance = 1 - cosine; clamped into [0, 1] for banding
    let scored: Vec<(&Comment, f64)> = comments
        .iter()
        .map(|comment| {
            let embedding = provider.embed(&comment.body);
            let distance = f64::from(1.0 - cosine_similarity(&embedding, &baseline));
            (comment, distance.clamp(0.0, 1.0))
        })
        .collect();

    let overall_mean = mean(scored.iter().map(|(_, d)| *d));

    // Per-task aggregation
    let mut task_ids: Vec<u64> = scored.iter().map(|(c, _)| c.task_id).collect();
    task_ids.sort_unstable();
    task_ids.dedup();

    let per_task: Vec<TaskNovelty> = task_ids
        .into_iter()
        .map(|task_id| {
            let distances: Vec<f64> = scored
                .iter()
                .filter(|(c, _)| c.task_id == task_id)
                .map(|(_, d)| *d)
                .collect();
            let mean_distance = mean(distances.iter().copied());
            TaskNovelty {
                task_id,
                comment_count: distances.len(),
                mean_distance,
                band: NoveltyBand::from_score(mean_distance),
            }
        })
        .collect();

    // Per-window aggregation from the earliest comment onward
    let per_window = match scored.iter().map(|(c, _)| c.created_at).min() {
        Some(origin) if window_days > 0 => {
            let mut windows: Vec<(i64, Vec<f64>)> = Vec::new();
            for (comment, distance) in &scored {
                let index = (comment.created_at - origin).num_days() / window_days;
                match windows.iter_mut().find(|(i, _)| *i == index) {
                    Some((_, bucket)) => bucket.push(*distance),
                    None => windows.push((index, vec![*distance])),
                }
            }
            windows.sort_by_key(|(index, _)| *index);
            windows
                .into_iter()
                .map(|(index, distances)| WindowNovelty {
                    window_start: origin + chrono::Duration::days(index * window_days),
                    comment_count: distances.len(),
                    mean_distance: mean(distances.iter().copied()),
                })
                .collect()
        }
        _ => Vec::new(),
    };

    NoveltyResult {
        overall_mean,
        per_task,
        per_window,
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
