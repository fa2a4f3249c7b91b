//! Surprise metric
//!
//! Scores each comment against a baseline language-model distribution and
//! flags outliers. The model is a black-box collaborator behind a trait;
//! the default is a unigram cross-entropy model built from the baseline
//! corpus, deterministic across re-runs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::Comment;

/// Black-box scoring collaborator: higher means more surprising.
pub trait SurpriseModel: Send + Sync {
    fn score(&self, text: &str) -> f64;
}

/// Unigram cross-entropy against a baseline corpus.
///
/// Tokens unseen in the baseline get a smoothed floor probability, so a
/// comment full of vocabulary the baseline never produced scores high.
#[derive(Debug, Clone)]
pub struct UnigramSurpriseModel {
    log_probs: HashMap<String, f64>,
    floor_log_prob: f64,
}

impl UnigramSurpriseModel {
    pub fn from_corpus(baseline: &[String]) -> Self {
        let mut counts: HashMap<String, u64> = HashMap::new();
        let mut total: u64 = 0;
        for text in baseline {
            for token in tokenize(text) {
                *counts.entry(token).or_insert(0) += 1;
                total += 1;
            }
        }

        // Add-one smoothing over the observed vocabulary.
        let vocab = counts.len() as f64;
        let denominator = total as f64 + vocab + 1.0;
        let log_probs = counts
            .into_iter()
            .map(|(token, count)| (token, ((count as f64 + 1.0) / denominator).ln()))
            .collect();

        Self {
            log_probs,
            floor_log_prob: (1.0 / denominator).ln(),
        }
    }
}

impl SurpriseModel for UnigramSurpriseModel {
    /// Mean negative log-probability per token.
    fn score(&self, text: &str) -> f64 {
        let tokens: Vec<String> = tokenize(text).collect();
        if tokens.is_empty() {
            return 0.0;
        }
        let total: f64 = tokens
            .iter()
            .map(|t| -self.log_probs.get(t).copied().unwrap_or(self.floor_log_prob))
            .sum();
        total / tokens.len() as f64
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentSurprise {
    pub comment_id: u64,
    pub task_id: u64,
    pub score: f64,
    pub outlier: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurpriseResult {
    pub threshold: f64,
    pub mean_score: f64,
    pub outlier_count: usize,
    pub per_comment: Vec<CommentSurprise>,
}

/// Score every comment, flagging those above `threshold`.
pub fn compute(comments: &[Comment], model: &dyn SurpriseModel, threshold: f64) -> SurpriseResult {
    let per_comment: Vec<CommentSurprise> = comments
        .iter()
        .map(|comment| {
            let score = model.score(&comment.body);
            CommentSurprise {
                comment_id: comment.id,
                task_id: comment.task_id,
                score,
                outlier: score > threshold,
            }
        })
        .collect();

    let mean_score = if per_comment.is_empty() {
        0.0
    } else {
        per_comment.iter().map(|c| c.score).sum::<f64>() / per_comment.len() as f64
    };
    let outlier_count = per_comment.iter().filter(|c| c.outlier).count();

    SurpriseResult {
        threshold,
        mean_score,
        outlier_count,
        per_comment,
    }
}
