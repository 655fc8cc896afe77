//! Plain, table and JSON renderings of tasks.

use habit_core::clock::format_timestamp;
use habit_core::config::Palette;
use habit_core::consistency::{ConsistencyMetrics, ConsistencySummary, evaluate};
use habit_core::error::AppError;
use habit_core::model::Task;
use habit_core::progress::contribution;
use habit_core::task_api::OutlineRow;
use serde_json::{Value, json};
use tabled::settings::Style;
use tabled::{Table, Tabled};
use time::OffsetDateTime;
use time::macros::format_description;

const TITLE_WIDTH: usize = 48;

#[derive(Tabled)]
struct TaskRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Pri")]
    priority: String,
    #[tabled(rename = "Due")]
    due: String,
    #[tabled(rename = "Progress")]
    progress: String,
    #[tabled(rename = "Repeats")]
    repeats: String,
}

/// Short local form used in tables, e.g. `2026-01-02 07:00`.
pub fn short_time(at: OffsetDateTime) -> String {
    at.format(format_description!("[year]-[month]-[day] [hour]:[minute]"))
        .unwrap_or_else(|_| at.to_string())
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars - 3).collect();
        format!("{head}...")
    }
}

pub fn cadence_label(task: &Task) -> String {
    match task.recurrence() {
        None => "-".to_string(),
        Some(config) if config.interval == 1 => {
            format!("{} (streak {})", config.frequency.as_str(), config.streak)
        }
        Some(config) => format!(
            "every {} {} (streak {})",
            config.interval,
            config.frequency.as_str(),
            config.streak
        ),
    }
}

pub fn task_table(rows: &[OutlineRow<'_>], palette: &Palette, now: OffsetDateTime) -> String {
    let table_rows: Vec<TaskRow> = rows
        .iter()
        .map(|row| {
            let task = row.task;
            let value = contribution(task, now);
            let indent = "  ".repeat(row.depth);
            let mut title = format!("{indent}{}", truncate(&task.title, TITLE_WIDTH));
            if task.generated {
                title.push_str(" *");
            }
            TaskRow {
                id: palette.mutedize(&task.id),
                title,
                status: task.status.as_str().to_string(),
                priority: task.priority.as_str().to_string(),
                due: short_time(task.due_at),
                progress: palette.score(value, &format!("{value:.0}%")),
                repeats: cadence_label(task),
            }
        })
        .collect();

    let mut table = Table::new(table_rows);
    table.with(Style::rounded());
    table.to_string()
}

pub fn task_detail(
    task: &Task,
    metrics: &ConsistencyMetrics,
    palette: &Palette,
    now: OffsetDateTime,
) -> String {
    let mut lines = vec![
        format!("{} ({})", palette.accentize(&task.title), task.id),
        format!("status: {} | priority: {}", task.status.as_str(), task.priority.as_str()),
        format!("due: {}", short_time(task.due_at)),
    ];
    if !task.description.is_empty() {
        lines.push(format!("description: {}", task.description));
    }
    if let Some(parent_id) = &task.parent_id {
        lines.push(format!("parent: {parent_id}"));
    }
    if !task.sub_task_ids.is_empty() {
        lines.push(format!("subtasks: {}", task.sub_task_ids.join(", ")));
    }
    if let Some(explanation) = &task.overdue_explanation {
        lines.push(format!("overdue because: {explanation}"));
    }

    match task.recurrence() {
        Some(config) => {
            lines.push(format!("repeats: {}", cadence_label(task)));
            if let Some(end_at) = config.end_at {
                lines.push(format!("until: {}", short_time(end_at)));
            }
            let score = format!("{:.0}%", metrics.score);
            lines.push(format!(
                "consistency: {} ({} done, {} missed, {} expected)",
                palette.score(metrics.score, &score),
                metrics.actual,
                metrics.missed,
                metrics.expected
            ));
        }
        None => {
            let value = contribution(task, now);
            lines.push(format!(
                "progress: {}",
                palette.score(value, &format!("{value:.0}%"))
            ));
        }
    }
    if !task.completion_history.is_empty() {
        let logged: Vec<String> = task
            .completion_history
            .iter()
            .map(|record| {
                let mark = if record.was_successful { "done" } else { "missed" };
                format!("  {} {mark}", short_time(record.completed_at))
            })
            .collect();
        lines.push(format!("history:\n{}", logged.join("\n")));
    }
    lines.join("\n")
}

pub fn summary_line(summary: &ConsistencySummary, palette: &Palette) -> String {
    let percentage = format!("{:.0}%", summary.percentage);
    format!(
        "consistency: {} ({} done, {} missed, {} expected)",
        palette.score(summary.percentage, &percentage),
        summary.successful,
        summary.missed,
        summary.expected
    )
}

/// JSON form of a task with its live consistency metrics.
pub fn task_json(task: &Task, now: OffsetDateTime) -> Result<Value, AppError> {
    let mut value = serde_json::to_value(task)?;
    if let Value::Object(map) = &mut value {
        map.insert(
            "consistency".to_string(),
            serde_json::to_value(evaluate(task, now))?,
        );
        map.insert("evaluated_at".to_string(), json!(format_timestamp(now)?));
    }
    Ok(value)
}

pub fn tasks_json<'a, I>(tasks: I, now: OffsetDateTime) -> Result<Value, AppError>
where
    I: IntoIterator<Item = &'a Task>,
{
    let payload = tasks
        .into_iter()
        .map(|task| task_json(task, now))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::Array(payload))
}
