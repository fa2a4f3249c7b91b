//! Vigil configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, VigilError};

/// Environment variable that overrides the credentials file
pub const API_KEY_ENV: &str = "VIGIL_API_KEY";

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VigilConfig {
    /// Directory holding the snapshot log, seal record, registry and runs
    pub data_dir: PathBuf,

    /// Base URL of the ClawBoard API
    pub api_base: String,

    /// Credentials file holding `{"api_key": "..."}`
    pub credentials_path: PathBuf,

    /// Maximum tasks fetched per collection pass
    pub collect_limit: usize,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,

    /// Retry policy for transient fetch failures
    pub retry: RetrySettings,

    /// Structural classification thresholds
    pub thresholds: Thresholds,

    /// Semantic analysis settings
    pub analysis: AnalysisSettings,
}

impl Default for VigilConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".vigil"),
            api_base: "https://clawboard.io/api/v1".to_string(),
            credentials_path: PathBuf::from("~/.config/clawboard/echo-credentials.json"),
            collect_limit: 100,
            request_timeout_secs: 10,
            retry: RetrySettings::default(),
            thresholds: Thresholds::default(),
            analysis: AnalysisSettings::default(),
        }
    }
}

impl VigilConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the data directory
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Set the API base URL
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    /// Set the per-pass task limit
    pub fn with_collect_limit(mut self, limit: usize) -> Self {
        self.collect_limit = limit;
        self
    }

    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Resolve the ClawBoard API key.
    ///
    /// Order: `VIGIL_API_KEY` environment variable (a `.env` file is
    /// honoured), then the credentials file.
    pub fn api_key(&self) -> Result<String> {
        dotenvy::dotenv().ok();
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.is_empty() {
                return Ok(key);
            }
        }

        let path = expand_home(&self.credentials_path);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            VigilError::InvalidRecord(format!(
                "credentials file '{}' unreadable: {}",
                path.display(),
                e
            ))
        })?;
        let creds: CredentialsFile = serde_json::from_str(&content)?;
        Ok(creds.api_key)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CredentialsFile {
    api_key: String,
}

/// Retry policy for transient fetch failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Attempts after the first failure
    pub max_retries: u32,

    /// Base backoff delay, doubled per attempt
    pub backoff_base_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 500,
        }
    }
}

/// Thresholds for the structural classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thresholds {
    /// A task younger than this with no comments is NEW
    pub fresh_age_days: i64,

    /// Comment floor for the THEORY category
    pub theory_comment_min: u32,

    /// Age floor (days) for the THEORY category
    pub theory_age_days: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            fresh_age_days: 2,
            theory_comment_min: 10,
            theory_age_days: 14,
        }
    }
}

/// Settings consumed by the semantic analysis pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSettings {
    /// Window length for per-window novelty aggregation and drift
    pub window_days: i64,

    /// Comments scoring above this are flagged as surprise outliers
    pub surprise_threshold: f64,

    /// Two tasks sharing at least this Jaccard overlap count as related
    pub relatedness_jaccard: f64,

    /// Concepts kept per task when pairing (bounds the pair space)
    pub max_concepts_per_task: usize,

    /// Baseline corpus of formulaic, expected phrasing
    pub baseline_phrases: Vec<String>,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            window_days: 7,
            surprise_threshold: 8.0,
            relatedness_jaccard: 0.2,
            max_concepts_per_task: 25,
            baseline_phrases: vec![
                "thanks for the update, looking good".to_string(),
                "i will take a look at this today".to_string(),
                "opened a pull request for this task".to_string(),
                "bumping this, any progress here".to_string(),
                "merged, closing this out".to_string(),
                "added a comment with more details".to_string(),
                "can you rebase onto the latest main".to_string(),
                "tests are passing now".to_string(),
            ],
        }
    }
}

fn expand_home(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = VigilConfig::default();
        assert_eq!(config.api_base, "https://clawboard.io/api/v1");
        assert_eq!(config.collect_limit, 100);
        assert!(config.retry.max_retries > 0);
        assert!(!config.analysis.baseline_phrases.is_empty());
    }

    #[test]
    fn test_config_builder() {
        let config = VigilConfig::new()
            .with_data_dir("/tmp/vigil-test")
            .with_api_base("http://localhost:9999/api/v1")
            .with_collect_limit(10);

        assert_eq!(config.data_dir, PathBuf::from("/tmp/vigil-test"));
        assert_eq!(config.api_base, "http://localhost:9999/api/v1");
        assert_eq!(config.collect_limit, 10);
    }

    #[test]
    fn test_config_serialization() {
        let config = VigilConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: VigilConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.api_base, parsed.api_base);
        assert_eq!(config.thresholds.theory_comment_min, parsed.thresholds.theory_comment_min);
    }

    #[test]
    fn test_expand_home() {
        std::env::set_var("HOME", "/home/claw");
        let expanded = expand_home(Path::new("~/.config/clawboard/echo-credentials.json"));
        assert_eq!(
            expanded,
            PathBuf::from("/home/claw/.config/clawboard/echo-credentials.json")
        );

        let absolute = expand_home(Path::new("/etc/creds.json"));
        assert_eq!(absolute, PathBuf::from("/etc/creds.json"));
    }
}
