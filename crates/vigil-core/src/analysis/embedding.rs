//! Embedding provider and concept extraction
//!
//! Vector computation is a black-box collaborator behind a trait. The
//! default implementation is a deterministic char-frequency embedder, so a
//! pre-registered metric computes identically on every re-run.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeSet;

/// Black-box text embedding collaborator
pub trait EmbeddingProvider: Send + Sync {
    /// Compute an L2-normalized embedding for `text`
    fn embed(&self, text: &str) -> Vec<f32>;

    fn dimension(&self) -> usize;
}

/// Deterministic character-frequency embedder.
#[derive(Debug, Clone)]
pub struct CharFrequencyEmbedder {
    dimension: usize,
}

impl CharFrequencyEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for CharFrequencyEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

impl EmbeddingProvider for CharFrequencyEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0; self.dimension];

        // Character frequency-based features
        for (i, ch) in text.chars().enumerate() {
            let idx = (ch as usize + i) % self.dimension;
            embedding[idx] += 1.0;
        }

        // Normalize
        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for val in &mut embedding {
                *val /= magnitude;
            }
        }

        embedding
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Compute cosine similarity between two embeddings
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Mean of a set of embeddings. Empty input yields a zero vector.
pub fn centroid(vectors: &[Vec<f32>], dimension: usize) -> Vec<f32> {
    let mut mean = vec![0.0; dimension];
    if vectors.is_empty() {
        return mean;
    }
    for vector in vectors {
        for (slot, value) in mean.iter_mut().zip(vector.iter()) {
            *slot += value;
        }
    }
    let n = vectors.len() as f32;
    for slot in &mut mean {
        *slot /= n;
    }
    mean
}

lazy_static! {
    static ref CODE_BLOCK: Regex = Regex::new(r"(?s)```.*?```").unwrap();
    static ref URL: Regex = Regex::new(r"https?://\S+").unwrap();
    static ref NON_ALPHA: Regex = Regex::new(r"[^a-zA-Z\s]").unwrap();
}

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had", "do",
    "does", "did", "will", "would", "could", "should", "may", "might", "can", "this", "that",
    "these", "those", "it", "its", "you", "your", "we", "our", "they", "their",
];

/// Extract concept terms from text.
///
/// Strips code blocks, URLs and punctuation, lowercases, and keeps words
/// longer than three characters that are not stopwords.
pub fn extract_concepts(text: &str) -> BTreeSet<String> {
    let text = CODE_BLOCK.replace_all(text, " ");
    let text = URL.replace_all(&text, " ");
    let text = NON_ALPHA.replace_all(&text, " ");

    text.to_lowercase()
        .split_whitespace()
        .filter(|w| w.len() > 3 && !STOPWORDS.contains(w))
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity of two concept sets. Both empty counts as identical.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}
