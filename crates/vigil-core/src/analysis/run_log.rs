//! Append-only analysis run log
//!
//! Every pipeline execution appends one immutable record; nothing is ever
//! recomputed in place, so the history of every analysis survives.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::Result;
use crate::protocol::MetricKind;
use crate::types::{Blake3Hash, Timestamp};

/// One metric's output within a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricResult {
    pub metric: MetricKind,
    /// Hash of the individual definition that produced this result
    pub definition_hash: Blake3Hash,
    pub value: serde_json::Value,
}

/// One immutable execution of all registered metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRun {
    pub run_id: Uuid,
    pub executed_at: Timestamp,
    /// Freeze hash of the registry version the run executed against
    pub protocol_definition_hash: Blake3Hash,
    pub results: Vec<MetricResult>,
}

/// JSONL-backed append-only log of analysis runs
#[derive(Debug)]
pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    pub fn open(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: data_dir.into().join("runs.jsonl"),
        }
    }

    /// Append one run
    pub async fn append(&self, run: &AnalysisRun) -> Result<()> {
        let line = serde_json::to_string(run)?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        Ok(())
    }

    /// All recorded runs, oldest first
    pub async fn all_runs(&self) -> Result<Vec<AnalysisRun>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = tokio::fs::read_to_string(&self.path).await?;
        let mut runs = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AnalysisRun>(line) {
                Ok(run) => runs.push(run),
                Err(_) => continue, // Skip malformed lines
            }
        }
        Ok(runs)
    }
}
