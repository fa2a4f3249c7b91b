//! Terminal rendering for the structural talk-to-code report

use colored::Colorize;
use vigil_core::metrics::{Category, StructuralReport};

const BAR_WIDTH: usize = 20;
const RANKED_LIMIT: usize = 30;

/// Simple unicode bar scaled against `max_value`.
pub fn bar(value: u64, max_value: u64, width: usize) -> String {
    if max_value == 0 {
        return "░".repeat(width);
    }
    let filled = ((value as f64 / max_value as f64) * width as f64) as usize;
    let filled = filled.min(width);
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

// Pad before coloring: escape codes would otherwise skew column widths.
fn category_label(category: Category) -> String {
    let padded = format!("{:<9}", category.to_string());
    match category {
        Category::Shipped => padded.green(),
        Category::Building => padded.cyan(),
        Category::AllTalk => padded.yellow(),
        Category::Theory => padded.magenta(),
        Category::New => padded.dimmed(),
    }
    .to_string()
}

/// Render the full report the way the live analyzer prints it.
pub fn render_structural(report: &StructuralReport) -> String {
    let mut out = String::new();
    let rule = "=".repeat(80);

    out.push_str(&format!("\n{}\n", rule));
    out.push_str("TALK-TO-CODE RATIO ANALYSIS\n");
    out.push_str(&format!("{}\n\n", rule));

    out.push_str("AGGREGATE METRICS\n");
    out.push_str(&format!("  Tasks analyzed: {}\n", report.total_tasks));
    out.push_str(&format!("  Total comments: {}\n", report.total_comments));
    out.push_str(&format!(
        "  Total deliverables: {}\n",
        report.total_deliverables
    ));
    out.push_str(&format!(
        "  Talk-to-code ratio: {:.1}\n",
        report.overall_ratio
    ));
    if report.total_tasks > 0 {
        out.push_str(&format!(
            "  Tasks with deliverables: {}/{} ({:.0}%)\n",
            report.tasks_with_deliverables,
            report.total_tasks,
            report.tasks_with_deliverables as f64 / report.total_tasks as f64 * 100.0
        ));
    }
    for (category, count) in &report.category_counts {
        out.push_str(&format!("  {:<9} {}\n", format!("{}:", category), count));
    }
    out.push('\n');

    out.push_str("TASKS RANKED BY DISCOURSE/DELIVERY RATIO\n");
    out.push_str(&format!(
        "{:<8} {:<9} {:<12} {:>4} {:>4} {:>7}  {}\n",
        "ID", "TYPE", "AGENT", "C", "PR", "RATIO", "COMMENTS"
    ));
    out.push_str(&format!("{}\n", "-".repeat(80)));

    let max_comments = report
        .rows
        .iter()
        .map(|r| u64::from(r.comment_count))
        .max()
        .unwrap_or(0);
    for row in report.rows.iter().take(RANKED_LIMIT) {
        out.push_str(&format!(
            "#{:<7} {} {:<12} {:>4} {:>4} {:>7.1}  {}\n",
            row.task_id,
            category_label(row.category),
            row.agent.as_deref().unwrap_or("-"),
            row.comment_count,
            row.deliverable_count,
            row.ratio,
            bar(u64::from(row.comment_count), max_comments, BAR_WIDTH),
        ));
    }

    if !report.insights.is_empty() {
        out.push_str("\nINSIGHTS\n");
        for insight in &report.insights {
            out.push_str(&format!("  • {}\n", insight));
        }
    }

    out.push_str(&format!("\n{}\n", rule));
    out
}

/// Human-readable remaining duration, largest units first.
pub fn format_remaining(total_secs: i64) -> String {
    let days = total_secs / 86_400;
    let hours = (total_secs % 86_400) / 3_600;
    let minutes = (total_secs % 3_600) / 60;
    let seconds = total_secs % 60;
    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else {
        format!("{}m {}s", minutes, seconds)
    }
}
