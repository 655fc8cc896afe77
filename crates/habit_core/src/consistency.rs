//! Consistency scoring for recurring tasks.
//!
//! Metrics are derived on every read from the recurrence settings, the
//! completion history and a reference instant. Nothing here is persisted.

use crate::cycle::count_elapsed_cycles;
use crate::model::{Cadence, Task};
use serde::Serialize;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ConsistencyMetrics {
    /// Successful share of expected cycles, 0 to 100.
    pub score: f64,
    /// Successful records counted against the expected cycles.
    pub actual: u64,
    /// Missed records counted against the expected cycles.
    pub missed: u64,
    /// Cycles due between the recurrence start and the horizon, including the
    /// cycle currently in progress.
    pub expected: u64,
    /// The recurrence end date has been reached.
    pub is_finished: bool,
    /// Raw history length, unbounded.
    pub total_attempts_logged: u64,
}

impl ConsistencyMetrics {
    /// Whether the current period can still take a new history record.
    pub fn has_room_in_period(&self) -> bool {
        self.total_attempts_logged < self.expected
    }
}

pub fn evaluate(task: &Task, now: OffsetDateTime) -> ConsistencyMetrics {
    let recurrence = match &task.cadence {
        Cadence::OneOff => return ConsistencyMetrics::default(),
        Cadence::Recurring(config) => config,
    };

    let start = recurrence.start_at.unwrap_or(task.created_at);
    let (horizon, is_finished) = match recurrence.end_at {
        Some(end_at) if now >= end_at => (end_at, true),
        _ => (now, false),
    };

    let expected = if start <= horizon {
        count_elapsed_cycles(start, horizon, recurrence.frequency, recurrence.interval)
            .saturating_add(1)
            .max(1)
    } else {
        0
    };

    let mut actual = 0u64;
    let mut missed = 0u64;
    for record in &task.completion_history {
        if actual + missed >= expected {
            break;
        }
        if record.was_successful {
            actual += 1;
        } else {
            missed += 1;
        }
    }

    let score = if expected > 0 {
        (actual as f64 / expected as f64 * 100.0).min(100.0)
    } else {
        0.0
    };

    ConsistencyMetrics {
        score,
        actual,
        missed,
        expected,
        is_finished,
        total_attempts_logged: task.completion_history.len() as u64,
    }
}

/// Totals over every recurring task, as shown on the overview.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ConsistencySummary {
    pub successful: u64,
    pub missed: u64,
    pub expected: u64,
    pub percentage: f64,
}

pub fn summarize<'a, I>(tasks: I, now: OffsetDateTime) -> ConsistencySummary
where
    I: IntoIterator<Item = &'a Task>,
{
    let mut summary = ConsistencySummary::default();
    for task in tasks {
        if !task.is_recurring() {
            continue;
        }
        let metrics = evaluate(task, now);
        summary.successful += metrics.actual;
        summary.missed += metrics.missed;
        summary.expected += metrics.expected;
    }

    summary.percentage = if summary.expected > 0 {
        (summary.successful as f64 / summary.expected as f64 * 100.0).min(100.0)
    } else {
        0.0
    };
    summary
}
