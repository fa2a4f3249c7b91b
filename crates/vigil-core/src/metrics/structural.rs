//! Talk-to-code ratio engine
//!
//! Measures discourse vs delivery per task from metadata counts alone:
//! comments on one side, deliverables (PRs) on the other. Never consults a
//! title or a body.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::config::Thresholds;
use crate::types::{TaskActivity, Timestamp};

/// Discourse/delivery category of a task.
///
/// Declared in priority order: when several definitions match, the earlier
/// variant wins (SHIPPED > BUILDING > ALL_TALK > THEORY > NEW).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// At least one deliverable merged
    Shipped,
    /// Deliverables exist but none merged yet
    Building,
    /// Discourse without delivery
    AllTalk,
    /// Long-lived, discussion-heavy, zero deliverables
    Theory,
    /// Little or no activity yet
    New,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Category::Shipped => "SHIPPED",
            Category::Building => "BUILDING",
            Category::AllTalk => "ALL_TALK",
            Category::Theory => "THEORY",
            Category::New => "NEW",
        };
        write!(f, "{}", label)
    }
}

/// Classify one task by its counts.
pub fn classify(activity: &TaskActivity, now: Timestamp, thresholds: &Thresholds) -> Category {
    let deliverables = activity.deliverable_count();
    let comments = activity.comment_count;
    let age = activity.age_days(now);

    if activity.merged_pr_count > 0 {
        return Category::Shipped;
    }
    if deliverables > 0 {
        return Category::Building;
    }
    if comments >= thresholds.theory_comment_min && age >= thresholds.theory_age_days {
        return Category::Theory;
    }
    if comments > 0 {
        return Category::AllTalk;
    }
    Category::New
}

/// Comments per deliverable; a task with no deliverables divides by one.
pub fn ratio(activity: &TaskActivity) -> f64 {
    f64::from(activity.comment_count) / f64::from(activity.deliverable_count().max(1))
}

/// One ranked report row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRow {
    pub task_id: u64,
    pub agent: Option<String>,
    pub comment_count: u32,
    pub deliverable_count: u32,
    pub merged_count: u32,
    pub ratio: f64,
    pub category: Category,
}

/// Aggregate talk-to-code report over the latest snapshot's activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuralReport {
    pub generated_at: Timestamp,
    pub total_tasks: usize,
    pub total_comments: u64,
    pub total_deliverables: u64,
    /// Aggregate comments per deliverable
    pub overall_ratio: f64,
    pub tasks_with_deliverables: usize,
    pub category_counts: BTreeMap<Category, usize>,
    /// Rows ranked by ratio, most discourse-heavy first
    pub rows: Vec<TaskRow>,
    pub insights: Vec<String>,
}

impl StructuralReport {
    pub fn build(activities: &[TaskActivity], now: Timestamp, thresholds: &Thresholds) -> Self {
        let mut rows: Vec<TaskRow> = activities
            .iter()
            .map(|activity| TaskRow {
                task_id: activity.task_id,
                agent: activity.agent.clone(),
                comment_count: activity.comment_count,
                deliverable_count: activity.deliverable_count(),
                merged_count: activity.merged_pr_count,
                ratio: ratio(activity),
                category: classify(activity, now, thresholds),
            })
            .collect();
        rows.sort_by(|a, b| {
            b.ratio
                .partial_cmp(&a.ratio)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.task_id.cmp(&b.task_id))
        });

        let total_comments: u64 = rows.iter().map(|r| u64::from(r.comment_count)).sum();
        let total_deliverables: u64 = rows.iter().map(|r| u64::from(r.deliverable_count)).sum();
        let tasks_with_deliverables = rows.iter().filter(|r| r.deliverable_count > 0).count();

        let mut category_counts: BTreeMap<Category, usize> = BTreeMap::new();
        for row in &rows {
            *category_counts.entry(row.category).or_insert(0) += 1;
        }

        let insights = build_insights(&rows);

        Self {
            generated_at: now,
            total_tasks: rows.len(),
            total_comments,
            total_deliverables,
            overall_ratio: total_comments as f64 / (total_deliverables.max(1)) as f64,
            tasks_with_deliverables,
            category_counts,
            rows,
            insights,
        }
    }
}

fn build_insights(rows: &[TaskRow]) -> Vec<String> {
    let mut insights = Vec::new();

    let all_talk: Vec<&TaskRow> = rows
        .iter()
        .filter(|r| r.deliverable_count == 0 && r.comment_count > 0)
        .collect();
    if !all_talk.is_empty() {
        insights.push(format!(
            "{} tasks have comments but no deliverables (discourse without delivery)",
            all_talk.len()
        ));
    }

    let architecture_heavy = rows
        .iter()
        .filter(|r| r.deliverable_count > 0 && r.ratio > 5.0)
        .count();
    if architecture_heavy > 0 {
        insights.push(format!(
            "{} tasks run above a 5:1 talk-to-code ratio (architecture-heavy)",
            architecture_heavy
        ));
    }

    if let Some(worst) = all_talk.iter().max_by_key(|r| r.comment_count) {
        insights.push(format!(
            "most discourse-heavy: task #{} ({} comments, 0 deliverables)",
            worst.task_id, worst.comment_count
        ));
    }

    if let Some(best) = rows
        .iter()
        .filter(|r| r.deliverable_count > 0)
        .min_by(|a, b| {
            a.ratio
                .partial_cmp(&b.ratio)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    {
        insights.push(format!(
            "highest code-to-talk: task #{} ({} deliverables, {} comments)",
            best.task_id, best.deliverable_count, best.comment_count
        ));
    }

    insights
}
