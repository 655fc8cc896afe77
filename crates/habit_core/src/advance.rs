use crate::consistency::evaluate;
use crate::cycle::advance_due_date;
use crate::error::AppError;
use crate::model::{Cadence, CompletionRecord, Task, TaskStatus};
use time::OffsetDateTime;
use tracing::info;

/// Records the outcome of the current cycle of a recurring task and moves it
/// to the next cycle, or concludes the recurrence once the end date is passed.
///
/// Only the first outcome per elapsed period is written to the history. Later
/// calls in a fully logged period still move the due date forward.
pub fn advance(task: &Task, was_successful: bool, now: OffsetDateTime) -> Result<Task, AppError> {
    let recurrence = match &task.cadence {
        Cadence::OneOff => {
            return Err(AppError::invalid_input(format!(
                "task {} is not recurring",
                task.id
            )));
        }
        Cadence::Recurring(config) => config,
    };

    let before = evaluate(task, now);
    let mut next = task.clone();
    if before.has_room_in_period() {
        next.completion_history.push(CompletionRecord {
            completed_at: now,
            was_successful,
        });
    }

    let next_due = advance_due_date(task.due_at, recurrence.frequency, recurrence.interval);

    let mut updated = recurrence.clone();
    if was_successful {
        updated.streak = updated.streak.saturating_add(1);
    } else if before.actual < before.expected {
        updated.streak = 0;
    }
    next.due_at = next_due;
    next.cadence = Cadence::Recurring(updated.clone());
    let after = evaluate(&next, now);
    updated.streak = updated
        .streak
        .min(u32::try_from(after.actual).unwrap_or(u32::MAX));

    next.updated_at = now;
    let concluded = updated
        .end_at
        .is_some_and(|end_at| next_due > end_at || before.is_finished);
    if concluded {
        info!(task_id = %task.id, history = next.completion_history.len(), "recurrence concluded");
        next.cadence = Cadence::OneOff;
        next.status = TaskStatus::Completed;
        next.completion_percentage = 100;
        next.due_at = task.due_at;
    } else {
        info!(task_id = %task.id, streak = updated.streak, was_successful, "cycle advanced");
        next.cadence = Cadence::Recurring(updated);
        next.status = TaskStatus::Todo;
        next.completion_percentage = 0;
    }

    Ok(next)
}
