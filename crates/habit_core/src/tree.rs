//! Transactions over a task collection snapshot.
//!
//! [`apply`] takes the current snapshot and one [`Operation`] and returns a
//! new snapshot with every affected ancestor recomputed. The input snapshot
//! is never modified, so a failed operation leaves nothing half applied.

use crate::advance::advance;
use crate::error::AppError;
use crate::generate::{RecurrenceDraft, TaskDraft};
use crate::model::{
    Cadence, Frequency, Priority, RecurrenceConfig, Task, TaskCollection, TaskStatus,
};
use crate::progress::recompute_ancestors;
use std::collections::HashSet;
use time::{Duration, OffsetDateTime};
use tracing::info;

const GOAL_TITLE_LIMIT: usize = 50;
const GOAL_HORIZON_DAYS: i64 = 7;
pub const GOAL_MARKER: &str = "is_goal";

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Create {
        draft: TaskDraft,
        parent_id: Option<String>,
    },
    Edit {
        id: String,
        patch: TaskPatch,
    },
    Delete {
        id: String,
    },
    SetStatus {
        id: String,
        status: TaskStatus,
    },
    SetProgress {
        id: String,
        percentage: u8,
    },
    RecordOutcome {
        id: String,
        was_successful: bool,
    },
    PlanGoal {
        goal: String,
        drafts: Vec<TaskDraft>,
    },
    AttachSubtasks {
        parent_id: String,
        drafts: Vec<TaskDraft>,
    },
    Remediate {
        id: String,
        reason: String,
        drafts: Vec<TaskDraft>,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Edit { .. } => "edit",
            Self::Delete { .. } => "delete",
            Self::SetStatus { .. } => "set_status",
            Self::SetProgress { .. } => "set_progress",
            Self::RecordOutcome { .. } => "record_outcome",
            Self::PlanGoal { .. } => "plan_goal",
            Self::AttachSubtasks { .. } => "attach_subtasks",
            Self::Remediate { .. } => "remediate",
        }
    }
}

/// Fields to change on an existing task. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub due_at: Option<OffsetDateTime>,
    pub cadence: Option<CadencePatch>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CadencePatch {
    OneOff,
    Recurring(RecurrencePatch),
}

/// Recurrence settings for an edit. On a recurring task `None` keeps the
/// current value; on a plain task it takes the creation default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrencePatch {
    pub frequency: Frequency,
    pub interval: Option<u32>,
    pub start_at: Option<OffsetDateTime>,
    pub end_at: Option<OffsetDateTime>,
}

impl RecurrencePatch {
    fn onto(&self, existing: &RecurrenceConfig) -> RecurrenceDraft {
        RecurrenceDraft {
            frequency: self.frequency,
            interval: self.interval.unwrap_or(existing.interval),
            start_at: self.start_at.or(existing.start_at),
            end_at: self.end_at.or(existing.end_at),
        }
    }

    fn fresh(&self) -> RecurrenceDraft {
        RecurrenceDraft {
            frequency: self.frequency,
            interval: self.interval.unwrap_or(1),
            start_at: self.start_at,
            end_at: self.end_at,
        }
    }
}

/// Result of a transaction. `touched` lists the ids the operation created,
/// changed or removed, in that order of appearance.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub tasks: TaskCollection,
    pub touched: Vec<String>,
}

pub fn apply(
    collection: &TaskCollection,
    operation: Operation,
    now: OffsetDateTime,
) -> Result<Applied, AppError> {
    let name = operation.name();
    let applied = match operation {
        Operation::Create { draft, parent_id } => create(collection, draft, parent_id, now),
        Operation::Edit { id, patch } => edit(collection, &id, patch, now),
        Operation::Delete { id } => delete(collection, &id, now),
        Operation::SetStatus { id, status } => set_status(collection, &id, status, now),
        Operation::SetProgress { id, percentage } => {
            set_progress(collection, &id, percentage, now)
        }
        Operation::RecordOutcome { id, was_successful } => {
            record_outcome(collection, &id, was_successful, now)
        }
        Operation::PlanGoal { goal, drafts } => plan_goal(collection, &goal, drafts, now),
        Operation::AttachSubtasks { parent_id, drafts } => {
            attach_subtasks(collection, &parent_id, drafts, now)
        }
        Operation::Remediate { id, reason, drafts } => {
            remediate(collection, &id, &reason, drafts, now)
        }
    }?;
    info!(operation = name, touched = applied.touched.len(), "operation applied");
    Ok(applied)
}

fn trimmed_id(id: &str) -> Result<&str, AppError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(AppError::invalid_input("id is required"));
    }
    Ok(trimmed)
}

fn require<'a>(collection: &'a TaskCollection, id: &str) -> Result<&'a Task, AppError> {
    collection
        .get(trimmed_id(id)?)
        .ok_or_else(|| AppError::invalid_input(format!("task not found: {}", id.trim())))
}

fn require_title(title: &str) -> Result<String, AppError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(AppError::invalid_input("title is required"));
    }
    Ok(trimmed.to_string())
}

fn recurrence_from_draft(
    draft: &RecurrenceDraft,
    streak: u32,
    fallback_start: OffsetDateTime,
) -> Result<RecurrenceConfig, AppError> {
    if draft.interval == 0 {
        return Err(AppError::invalid_input("interval must be at least 1"));
    }
    Ok(RecurrenceConfig {
        frequency: draft.frequency,
        interval: draft.interval,
        streak,
        start_at: Some(draft.start_at.unwrap_or(fallback_start)),
        end_at: draft.end_at,
    })
}

/// Builds a new task from `draft` and links it under `parent_id`.
fn insert_task(
    next: &mut TaskCollection,
    draft: TaskDraft,
    parent_id: Option<&str>,
    generated: bool,
    now: OffsetDateTime,
) -> Result<String, AppError> {
    let title = require_title(&draft.title)?;
    let parent_due = match parent_id {
        Some(parent_id) => Some(require(next, parent_id)?.due_at),
        None => None,
    };
    let cadence = match &draft.recurrence {
        Some(recurrence) => Cadence::Recurring(recurrence_from_draft(recurrence, 0, now)?),
        None => Cadence::OneOff,
    };

    let id = next.next_id(now);
    next.push(Task {
        id: id.clone(),
        title,
        description: draft.description.trim().to_string(),
        status: TaskStatus::Todo,
        priority: draft.priority,
        due_at: draft.due_at.or(parent_due).unwrap_or(now),
        created_at: now,
        updated_at: now,
        parent_id: parent_id.map(str::to_string),
        sub_task_ids: Vec::new(),
        completion_percentage: 0,
        cadence,
        completion_history: Vec::new(),
        metadata: draft.metadata,
        overdue_explanation: None,
        generated,
    });

    if let Some(parent) = parent_id.and_then(|parent_id| next.get_mut(parent_id)) {
        parent.sub_task_ids.push(id.clone());
        parent.updated_at = now;
    }
    Ok(id)
}

fn with_ancestors(
    next: TaskCollection,
    parent_id: Option<&str>,
    now: OffsetDateTime,
) -> Result<TaskCollection, AppError> {
    match parent_id {
        Some(parent_id) => recompute_ancestors(&next, parent_id, now),
        None => Ok(next),
    }
}

fn create(
    collection: &TaskCollection,
    draft: TaskDraft,
    parent_id: Option<String>,
    now: OffsetDateTime,
) -> Result<Applied, AppError> {
    let parent_id = parent_id.as_deref().map(trimmed_id).transpose()?;
    let mut next = collection.clone();
    let id = insert_task(&mut next, draft, parent_id, false, now)?;
    Ok(Applied {
        tasks: with_ancestors(next, parent_id, now)?,
        touched: vec![id],
    })
}

fn edit(
    collection: &TaskCollection,
    id: &str,
    patch: TaskPatch,
    now: OffsetDateTime,
) -> Result<Applied, AppError> {
    let current = require(collection, id)?;
    let mut task = current.clone();

    if let Some(title) = &patch.title {
        task.title = require_title(title)?;
    }
    if let Some(description) = patch.description {
        task.description = description.trim().to_string();
    }
    if let Some(priority) = patch.priority {
        task.priority = priority;
    }
    if let Some(due_at) = patch.due_at {
        task.due_at = due_at;
    }
    match patch.cadence {
        None => {}
        Some(CadencePatch::OneOff) => task.cadence = Cadence::OneOff,
        Some(CadencePatch::Recurring(change)) => {
            task.cadence = match &current.cadence {
                Cadence::Recurring(existing) => Cadence::Recurring(recurrence_from_draft(
                    &change.onto(existing),
                    existing.streak,
                    current.created_at,
                )?),
                Cadence::OneOff if current.recurrence_concluded() => {
                    return Err(AppError::invalid_input(
                        "recurrence has concluded; task cannot recur again",
                    ));
                }
                Cadence::OneOff => {
                    task.status = TaskStatus::Todo;
                    task.completion_percentage = 0;
                    Cadence::Recurring(recurrence_from_draft(&change.fresh(), 0, now)?)
                }
            };
        }
    }
    task.updated_at = now;

    let parent_id = task.parent_id.clone();
    let task_id = task.id.clone();
    let mut next = collection.clone();
    if let Some(slot) = next.get_mut(&task_id) {
        *slot = task;
    }
    Ok(Applied {
        tasks: with_ancestors(next, parent_id.as_deref(), now)?,
        touched: vec![task_id],
    })
}

fn delete(
    collection: &TaskCollection,
    id: &str,
    now: OffsetDateTime,
) -> Result<Applied, AppError> {
    let target = require(collection, id)?;
    let parent_id = target.parent_id.clone();

    let mut removed = vec![target.id.clone()];
    let mut seen: HashSet<String> = removed.iter().cloned().collect();
    let mut cursor = 0;
    while cursor < removed.len() {
        let current = removed[cursor].clone();
        for task in collection.iter() {
            if task.parent_id.as_deref() == Some(current.as_str()) && seen.insert(task.id.clone())
            {
                removed.push(task.id.clone());
            }
        }
        cursor += 1;
    }

    let mut next = collection.clone();
    next.retain(|task| !seen.contains(&task.id));
    if let Some(parent) = parent_id.as_deref().and_then(|parent_id| next.get_mut(parent_id)) {
        parent.sub_task_ids.retain(|child_id| !seen.contains(child_id));
        parent.updated_at = now;
    }

    Ok(Applied {
        tasks: with_ancestors(next, parent_id.as_deref(), now)?,
        touched: removed,
    })
}

fn set_status(
    collection: &TaskCollection,
    id: &str,
    status: TaskStatus,
    now: OffsetDateTime,
) -> Result<Applied, AppError> {
    let current = require(collection, id)?;
    if current.is_recurring() {
        return Err(AppError::invalid_input(
            "recurring tasks change status by recording an outcome",
        ));
    }

    let mut task = current.clone();
    task.status = status;
    if status == TaskStatus::Completed {
        task.completion_percentage = 100;
    }
    task.updated_at = now;
    replace_and_recompute(collection, task, now)
}

fn set_progress(
    collection: &TaskCollection,
    id: &str,
    percentage: u8,
    now: OffsetDateTime,
) -> Result<Applied, AppError> {
    if percentage > 100 {
        return Err(AppError::invalid_input("percentage must be between 0 and 100"));
    }
    let current = require(collection, id)?;
    if current.is_recurring() {
        return Err(AppError::invalid_input(
            "recurring tasks are scored from their completion history",
        ));
    }

    let mut task = current.clone();
    task.completion_percentage = percentage;
    if percentage == 100 {
        task.status = TaskStatus::Completed;
    } else if task.status == TaskStatus::Completed {
        task.status = TaskStatus::Todo;
    }
    task.updated_at = now;
    replace_and_recompute(collection, task, now)
}

fn record_outcome(
    collection: &TaskCollection,
    id: &str,
    was_successful: bool,
    now: OffsetDateTime,
) -> Result<Applied, AppError> {
    let current = require(collection, id)?;
    let task = advance(current, was_successful, now)?;
    replace_and_recompute(collection, task, now)
}

fn replace_and_recompute(
    collection: &TaskCollection,
    task: Task,
    now: OffsetDateTime,
) -> Result<Applied, AppError> {
    let task_id = task.id.clone();
    let parent_id = task.parent_id.clone();
    let mut next = collection.clone();
    if let Some(slot) = next.get_mut(&task_id) {
        *slot = task;
    }
    Ok(Applied {
        tasks: with_ancestors(next, parent_id.as_deref(), now)?,
        touched: vec![task_id],
    })
}

fn goal_title(goal: &str) -> String {
    if goal.chars().count() > GOAL_TITLE_LIMIT {
        let head: String = goal.chars().take(GOAL_TITLE_LIMIT - 3).collect();
        format!("{}...", head.trim_end())
    } else {
        goal.to_string()
    }
}

fn plan_goal(
    collection: &TaskCollection,
    goal: &str,
    drafts: Vec<TaskDraft>,
    now: OffsetDateTime,
) -> Result<Applied, AppError> {
    let goal = require_title(goal)?;
    let mut root = TaskDraft::titled(goal_title(&goal));
    root.description = goal;
    root.priority = Priority::High;
    root.due_at = Some(now + Duration::days(GOAL_HORIZON_DAYS));
    root.metadata
        .insert(GOAL_MARKER.to_string(), serde_json::Value::Bool(true));

    let mut next = collection.clone();
    let root_id = insert_task(&mut next, root, None, false, now)?;
    let mut touched = vec![root_id.clone()];
    for draft in drafts {
        touched.push(insert_task(&mut next, draft, Some(&root_id), true, now)?);
    }

    Ok(Applied {
        tasks: recompute_ancestors(&next, &root_id, now)?,
        touched,
    })
}

fn attach_subtasks(
    collection: &TaskCollection,
    parent_id: &str,
    drafts: Vec<TaskDraft>,
    now: OffsetDateTime,
) -> Result<Applied, AppError> {
    let parent_id = require(collection, parent_id)?.id.clone();
    let mut next = collection.clone();
    let mut touched = Vec::with_capacity(drafts.len());
    for draft in drafts {
        touched.push(insert_task(&mut next, draft, Some(&parent_id), true, now)?);
    }

    Ok(Applied {
        tasks: recompute_ancestors(&next, &parent_id, now)?,
        touched,
    })
}

/// A draft titled exactly like the missed task extends its due date; every
/// other draft becomes a plain child. A recurring task then records a miss.
fn remediate(
    collection: &TaskCollection,
    id: &str,
    reason: &str,
    drafts: Vec<TaskDraft>,
    now: OffsetDateTime,
) -> Result<Applied, AppError> {
    let original = require(collection, id)?.clone();
    let mut next = collection.clone();
    let mut touched = vec![original.id.clone()];

    let (extensions, solutions): (Vec<TaskDraft>, Vec<TaskDraft>) = drafts
        .into_iter()
        .partition(|draft| draft.title == original.title);

    let extension = extensions.iter().find_map(|draft| draft.due_at);
    if let (false, Some(due_at)) = (original.is_recurring(), extension) {
        if let Some(task) = next.get_mut(&original.id) {
            task.due_at = due_at;
            task.overdue_explanation = Some(reason.trim().to_string());
            task.status = TaskStatus::Todo;
            task.updated_at = now;
        }
    }

    for mut draft in solutions {
        draft.recurrence = None;
        draft.metadata.clear();
        touched.push(insert_task(&mut next, draft, Some(&original.id), true, now)?);
    }
    let has_children = next
        .get(&original.id)
        .is_some_and(|task| !task.sub_task_ids.is_empty());
    if has_children {
        next = recompute_ancestors(&next, &original.id, now)?;
    }

    if original.is_recurring() {
        let advanced = advance(require(&next, &original.id)?, false, now)?;
        next = replace_and_recompute(&next, advanced, now)?.tasks;
    }

    Ok(Applied {
        tasks: next,
        touched,
    })
}
