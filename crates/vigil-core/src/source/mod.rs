//! Data Source Adapter - the boundary to the ClawBoard API
//!
//! The wire schemas here are deliberately loose: every field is optional,
//! and validation at this boundary converts a response into a typed record
//! or a typed rejection reason. Nothing downstream ever touches an
//! unchecked field.
//!
//! A `Null` detail response is an expected failure mode (permissions, rate
//! limits, API drift) and surfaces as `Ok(None)`, never as an error.

use async_trait::async_trait;
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{RetrySettings, VigilConfig};
use crate::error::{Result, VigilError};
use crate::types::{Comment, Task, TaskStatus, Timestamp};

/// Entry from the task listing endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: u64,
    #[serde(default)]
    pub title: Option<String>,
}

/// Loosely-typed task detail as the API returns it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTask {
    pub id: Option<u64>,
    pub title: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    pub upvote_count: Option<u32>,
    pub comment_count: Option<u32>,
    pub pr_count: Option<u32>,
    pub merged_pr_count: Option<u32>,
    pub status: Option<String>,
    pub agent: Option<RawAgent>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawAgent {
    pub name: Option<String>,
}

/// Loosely-typed comment as the API returns it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawComment {
    pub id: Option<u64>,
    pub task_id: Option<u64>,
    pub author: Option<String>,
    pub body: Option<String>,
    pub created_at: Option<String>,
}

impl RawTask {
    /// Validate into a typed task, or explain why the record is unusable.
    pub fn validate(self) -> std::result::Result<Task, String> {
        let id = self.id.ok_or("task id missing")?;
        let title = self.title.ok_or("task title missing")?;
        let created_at = parse_timestamp(self.created_at.as_deref())
            .ok_or("task created_at missing or unparseable")?;
        let status = self
            .status
            .as_deref()
            .and_then(TaskStatus::parse)
            .unwrap_or(TaskStatus::Open);

        Ok(Task {
            id,
            title,
            tags: self.tags.unwrap_or_default(),
            upvote_count: self.upvote_count.unwrap_or(0),
            comment_count: self.comment_count.unwrap_or(0),
            pr_count: self.pr_count.unwrap_or(0),
            merged_pr_count: self.merged_pr_count.unwrap_or(0),
            status,
            agent: self.agent.and_then(|a| a.name),
            created_at,
        })
    }
}

impl RawComment {
    /// Validate into a typed comment, or explain why it is unusable.
    pub fn validate(self) -> std::result::Result<Comment, String> {
        let id = self.id.ok_or("comment id missing")?;
        let task_id = self.task_id.ok_or("comment task_id missing")?;
        let body = self.body.ok_or("comment body missing")?;
        let created_at = parse_timestamp(self.created_at.as_deref())
            .ok_or("comment created_at missing or unparseable")?;

        Ok(Comment {
            id,
            task_id,
            author: self.author.unwrap_or_else(|| "unknown".to_string()),
            body,
            created_at,
        })
    }
}

fn parse_timestamp(raw: Option<&str>) -> Option<Timestamp> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&chrono::Utc))
}

/// Source of discourse data. Implemented by the HTTP client in production
/// and by stubs in tests.
#[async_trait]
pub trait DiscourseSource: Send + Sync {
    async fn list_tasks(&self, limit: usize) -> Result<Vec<TaskSummary>>;

    /// `Ok(None)` is the recognized soft-failure mode: the item exists in
    /// the listing but its detail is not retrievable right now.
    async fn get_task_detail(&self, id: u64) -> Result<Option<RawTask>>;

    async fn list_comments(&self, task_id: u64) -> Result<Vec<RawComment>>;
}

// Response envelopes, matching the ClawBoard API shape.

#[derive(Debug, Deserialize)]
struct TasksEnvelope {
    #[serde(default)]
    tasks: Vec<TaskSummary>,
}

#[derive(Debug, Deserialize)]
struct TaskEnvelope {
    task: Option<RawTask>,
}

#[derive(Debug, Deserialize)]
struct CommentsEnvelope {
    #[serde(default)]
    comments: Vec<RawComment>,
}

/// HTTP client for the ClawBoard API.
pub struct ClawBoardClient {
    client: reqwest::Client,
    base: String,
    api_key: Option<String>,
    retry: RetrySettings,
}

impl ClawBoardClient {
    pub fn new(config: &VigilConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| VigilError::Network {
                message: e.to_string(),
                attempts: 0,
            })?;

        Ok(Self {
            client,
            base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key().ok(),
            retry: config.retry.clone(),
        })
    }

    /// GET with exponential-backoff retries on transient failures.
    ///
    /// Non-transient HTTP statuses are returned to the caller, which knows
    /// whether (say) a 404 means "skip this item" or "fail".
    async fn get_with_retry(&self, url: &str) -> Result<reqwest::Response> {
        let mut attempt: u32 = 0;
        loop {
            let mut request = self.client.get(url);
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }

            let outcome = request.send().await;
            let retriable = match &outcome {
                Ok(response) => {
                    let status = response.status();
                    status.is_server_error() || status.as_u16() == 429
                }
                Err(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            };

            if !retriable {
                // Unwrap is safe: non-retriable implies Ok above.
                return outcome.map_err(|e| VigilError::Network {
                    message: e.to_string(),
                    attempts: attempt + 1,
                });
            }

            if attempt >= self.retry.max_retries {
                let message = match outcome {
                    Ok(response) => format!("{} from {}", response.status(), url),
                    Err(e) => e.to_string(),
                };
                return Err(VigilError::Network {
                    message,
                    attempts: attempt + 1,
                });
            }

            let delay = self.retry.backoff_base_ms * 2u64.pow(attempt);
            tracing::warn!(url, attempt, delay_ms = delay, "transient fetch failure, backing off");
            tokio::time::sleep(Duration::from_millis(delay)).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl DiscourseSource for ClawBoardClient {
    async fn list_tasks(&self, limit: usize) -> Result<Vec<TaskSummary>> {
        let url = format!("{}/tasks?limit={}&sort=recent", self.base, limit);
        let response = self.get_with_retry(&url).await?;
        if !response.status().is_success() {
            return Err(VigilError::Network {
                message: format!("{} from task listing", response.status()),
                attempts: 1,
            });
        }
        let envelope: TasksEnvelope = response.json().await.map_err(|e| {
            VigilError::InvalidRecord(format!("task listing body: {}", e))
        })?;
        Ok(envelope.tasks)
    }

    async fn get_task_detail(&self, id: u64) -> Result<Option<RawTask>> {
        let url = format!("{}/tasks/{}", self.base, id);
        let response = self.get_with_retry(&url).await?;
        let status = response.status();

        // Missing/forbidden items are the documented soft-failure mode.
        if status.as_u16() == 404 || status.as_u16() == 403 {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(VigilError::Network {
                message: format!("{} from task {}", status, id),
                attempts: 1,
            });
        }

        let envelope: TaskEnvelope = response.json().await.map_err(|e| {
            VigilError::InvalidRecord(format!("task {} body: {}", id, e))
        })?;
        Ok(envelope.task)
    }

    async fn list_comments(&self, task_id: u64) -> Result<Vec<RawComment>> {
        let url = format!("{}/tasks/{}/comments", self.base, task_id);
        let response = self.get_with_retry(&url).await?;
        if !response.status().is_success() {
            return Err(VigilError::Network {
                message: format!("{} from comments of task {}", response.status(), task_id),
                attempts: 1,
            });
        }
        let envelope: CommentsEnvelope = response.json().await.map_err(|e| {
            VigilError::InvalidRecord(format!("comments of task {}: {}", task_id, e))
        })?;
        Ok(envelope.comments)
    }
}

impl std::fmt::Debug for ClawBoardClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClawBoardClient")
            .field("base", &self.base)
            .field("authenticated", &self.api_key.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_task_validates_with_defaults() {
        let raw = RawTask {
            id: Some(7),
            title: Some("Build the mesh".to_string()),
            created_at: Some("2026-01-15T09:30:00Z".to_string()),
            status: Some("in-progress".to_string()),
            ..Default::default()
        };

        let task = raw.validate().unwrap();
        assert_eq!(task.id, 7);
        assert_eq!(task.comment_count, 0);
        assert_eq!(task.status, TaskStatus::InProgress);
        assert!(task.agent.is_none());
    }

    #[test]
    fn test_raw_task_missing_id_rejected() {
        let raw = RawTask {
            title: Some("no id".to_string()),
            created_at: Some("2026-01-15T09:30:00Z".to_string()),
            ..Default::default()
        };
        assert!(raw.validate().unwrap_err().contains("id"));
    }

    #[test]
    fn test_raw_task_bad_timestamp_rejected() {
        let raw = RawTask {
            id: Some(1),
            title: Some("t".to_string()),
            created_at: Some("yesterday".to_string()),
            ..Default::default()
        };
        assert!(raw.validate().unwrap_err().contains("created_at"));
    }

    #[test]
    fn test_raw_comment_validates() {
        let raw = RawComment {
            id: Some(3),
            task_id: Some(7),
            author: None,
            body: Some("interesting approach".to_string()),
            created_at: Some("2026-01-16T10:00:00+00:00".to_string()),
        };

        let comment = raw.validate().unwrap();
        assert_eq!(comment.task_id, 7);
        assert_eq!(comment.author, "unknown");
    }

    #[test]
    fn test_envelope_tolerates_missing_lists() {
        let envelope: TasksEnvelope = serde_json::from_str("{}").unwrap();
        assert!(envelope.tasks.is_empty());

        let envelope: TaskEnvelope = serde_json::from_str(r#"{"task": null}"#).unwrap();
        assert!(envelope.task.is_none());
    }
}
