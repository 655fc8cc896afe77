use crate::consistency::{ConsistencyMetrics, ConsistencySummary, evaluate, summarize};
use crate::error::AppError;
use crate::generate::{RequestSite, RequestTicket, RequestTracker, TaskDraft, TaskGenerator};
use crate::model::{Task, TaskCollection, TaskStatus};
use crate::notice::{Notice, NoticeBoard};
use crate::storage::TaskStore;
use crate::tree::{Applied, Operation, TaskPatch, apply};
use std::collections::HashSet;
use time::OffsetDateTime;
use tracing::{info, warn};

/// One line of a depth-first walk over the task forest.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlineRow<'a> {
    pub depth: usize,
    pub task: &'a Task,
}

/// A generator request registered with the service. Pass it to
/// [`TaskService::fetch`] and then [`TaskService::resolve`].
#[derive(Debug)]
pub struct PendingRequest {
    ticket: RequestTicket,
    kind: RequestKind,
}

impl PendingRequest {
    pub fn site(&self) -> &RequestSite {
        self.ticket.site()
    }
}

#[derive(Debug)]
enum RequestKind {
    Goal(String),
    Subtasks { parent: Task, instruction: String },
    Reassess { task: Task, reason: String },
}

/// Owns the current snapshot and runs every mutation as
/// apply, then save, then replace. Failures raise a notice and leave the
/// snapshot and the store as they were.
pub struct TaskService {
    tasks: TaskCollection,
    store: Box<dyn TaskStore>,
    generator: Box<dyn TaskGenerator>,
    notices: NoticeBoard,
    requests: RequestTracker,
}

impl TaskService {
    pub fn open(
        store: Box<dyn TaskStore>,
        generator: Box<dyn TaskGenerator>,
        notices: NoticeBoard,
    ) -> Result<Self, AppError> {
        let tasks = TaskCollection::new(store.load()?);
        Ok(Self {
            tasks,
            store,
            generator,
            notices,
            requests: RequestTracker::new(),
        })
    }

    pub fn tasks(&self) -> &TaskCollection {
        &self.tasks
    }

    pub fn task(&self, id: &str) -> Result<&Task, AppError> {
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(AppError::invalid_input("id is required"));
        }
        self.tasks
            .get(trimmed)
            .ok_or_else(|| AppError::invalid_input(format!("task not found: {trimmed}")))
    }

    pub fn consistency(
        &self,
        id: &str,
        now: OffsetDateTime,
    ) -> Result<ConsistencyMetrics, AppError> {
        Ok(evaluate(self.task(id)?, now))
    }

    pub fn summary(&self, now: OffsetDateTime) -> ConsistencySummary {
        summarize(self.tasks.iter(), now)
    }

    pub fn roots(&self) -> impl Iterator<Item = &Task> {
        self.tasks.roots()
    }

    pub fn children(&self, id: &str) -> Result<Vec<&Task>, AppError> {
        let parent = self.task(id)?;
        Ok(self.tasks.children(parent).collect())
    }

    /// Roots in collection order, each followed by its descendants in
    /// `sub_task_ids` order. A task reachable twice is listed once.
    pub fn outline(&self) -> Vec<OutlineRow<'_>> {
        let mut rows = Vec::with_capacity(self.tasks.len());
        let mut seen = HashSet::new();
        let mut stack: Vec<(usize, &Task)> = self.tasks.roots().map(|task| (0, task)).collect();
        stack.reverse();

        while let Some((depth, task)) = stack.pop() {
            if !seen.insert(task.id.as_str()) {
                continue;
            }
            rows.push(OutlineRow { depth, task });
            let children: Vec<&Task> = self.tasks.children(task).collect();
            stack.extend(children.into_iter().rev().map(|child| (depth + 1, child)));
        }
        rows
    }

    pub fn notice(&self, now: OffsetDateTime) -> Option<&Notice> {
        self.notices.current(now)
    }

    pub fn abandon(&mut self, site: &RequestSite) {
        self.requests.abandon(site);
    }

    /// Applies `operation` and persists the result. Returns the tasks the
    /// operation touched; removed tasks are returned as they were.
    pub fn execute(
        &mut self,
        operation: Operation,
        now: OffsetDateTime,
    ) -> Result<Vec<Task>, AppError> {
        match self.commit(operation, now) {
            Ok(touched) => Ok(touched),
            Err(err) => {
                self.notices.raise_error(&err, now);
                Err(err)
            }
        }
    }

    fn commit(
        &mut self,
        operation: Operation,
        now: OffsetDateTime,
    ) -> Result<Vec<Task>, AppError> {
        let Applied { tasks, touched } = apply(&self.tasks, operation, now)?;
        self.store.save(tasks.as_slice())?;

        let previous = std::mem::replace(&mut self.tasks, tasks);
        Ok(touched
            .iter()
            .filter_map(|id| self.tasks.get(id).or_else(|| previous.get(id)))
            .cloned()
            .collect())
    }

    pub fn create(
        &mut self,
        draft: TaskDraft,
        parent_id: Option<String>,
        now: OffsetDateTime,
    ) -> Result<Task, AppError> {
        let touched = self.execute(Operation::Create { draft, parent_id }, now)?;
        first(touched)
    }

    pub fn edit(
        &mut self,
        id: &str,
        patch: TaskPatch,
        now: OffsetDateTime,
    ) -> Result<Task, AppError> {
        let operation = Operation::Edit {
            id: id.to_string(),
            patch,
        };
        first(self.execute(operation, now)?)
    }

    /// Deletes the task and its descendants, returning everything removed.
    pub fn delete(&mut self, id: &str, now: OffsetDateTime) -> Result<Vec<Task>, AppError> {
        self.execute(Operation::Delete { id: id.to_string() }, now)
    }

    pub fn set_status(
        &mut self,
        id: &str,
        status: TaskStatus,
        now: OffsetDateTime,
    ) -> Result<Task, AppError> {
        let operation = Operation::SetStatus {
            id: id.to_string(),
            status,
        };
        first(self.execute(operation, now)?)
    }

    pub fn set_progress(
        &mut self,
        id: &str,
        percentage: u8,
        now: OffsetDateTime,
    ) -> Result<Task, AppError> {
        let operation = Operation::SetProgress {
            id: id.to_string(),
            percentage,
        };
        first(self.execute(operation, now)?)
    }

    pub fn record_outcome(
        &mut self,
        id: &str,
        was_successful: bool,
        now: OffsetDateTime,
    ) -> Result<Task, AppError> {
        let operation = Operation::RecordOutcome {
            id: id.to_string(),
            was_successful,
        };
        first(self.execute(operation, now)?)
    }

    /// Asks the generator to break `goal` down and files the result under a
    /// new goal task. The goal task comes first in the returned list.
    pub fn plan_goal(&mut self, goal: &str, now: OffsetDateTime) -> Result<Vec<Task>, AppError> {
        let pending = self.begin_plan(goal, now)?;
        let proposals = self.fetch(&pending);
        self.resolve(pending, proposals, now)
    }

    pub fn break_down(
        &mut self,
        parent_id: &str,
        instruction: &str,
        now: OffsetDateTime,
    ) -> Result<Vec<Task>, AppError> {
        let pending = self.begin_breakdown(parent_id, instruction, now)?;
        let proposals = self.fetch(&pending);
        self.resolve(pending, proposals, now)
    }

    /// Remediation for a missed task. The missed task comes first in the
    /// returned list, followed by any new child tasks.
    pub fn reassess(
        &mut self,
        id: &str,
        reason: &str,
        now: OffsetDateTime,
    ) -> Result<Vec<Task>, AppError> {
        let pending = self.begin_reassess(id, reason, now)?;
        let proposals = self.fetch(&pending);
        self.resolve(pending, proposals, now)
    }

    pub fn begin_plan(
        &mut self,
        goal: &str,
        now: OffsetDateTime,
    ) -> Result<PendingRequest, AppError> {
        let goal = goal.trim();
        if goal.is_empty() {
            let err = AppError::invalid_input("goal is required");
            self.notices.raise_error(&err, now);
            return Err(err);
        }
        self.begin(RequestSite::Goal, RequestKind::Goal(goal.to_string()), now)
    }

    pub fn begin_breakdown(
        &mut self,
        parent_id: &str,
        instruction: &str,
        now: OffsetDateTime,
    ) -> Result<PendingRequest, AppError> {
        let parent = self.lookup(parent_id, now)?;
        let site = RequestSite::Subtasks(parent.id.clone());
        let kind = RequestKind::Subtasks {
            parent,
            instruction: instruction.trim().to_string(),
        };
        self.begin(site, kind, now)
    }

    pub fn begin_reassess(
        &mut self,
        id: &str,
        reason: &str,
        now: OffsetDateTime,
    ) -> Result<PendingRequest, AppError> {
        let task = self.lookup(id, now)?;
        let site = RequestSite::Reassess(task.id.clone());
        let kind = RequestKind::Reassess {
            task,
            reason: reason.to_string(),
        };
        self.begin(site, kind, now)
    }

    /// Whether a live request for `site` is waiting to be resolved.
    pub fn is_pending(&self, site: &RequestSite) -> bool {
        self.requests.is_in_flight(site)
    }

    /// Runs the generator call for `pending`. Leaves the snapshot alone.
    pub fn fetch(&self, pending: &PendingRequest) -> Result<Vec<TaskDraft>, AppError> {
        match &pending.kind {
            RequestKind::Goal(goal) => self.generator.generate(goal),
            RequestKind::Subtasks {
                parent,
                instruction,
            } => self.generator.generate_subtasks(parent, instruction),
            RequestKind::Reassess { task, reason } => self.generator.reassess(task, reason.trim()),
        }
    }

    /// Closes `pending` and files its proposals. A request abandoned while
    /// pending resolves to an empty list and changes nothing.
    pub fn resolve(
        &mut self,
        pending: PendingRequest,
        proposals: Result<Vec<TaskDraft>, AppError>,
        now: OffsetDateTime,
    ) -> Result<Vec<Task>, AppError> {
        let PendingRequest { ticket, kind } = pending;
        let site = ticket.site().clone();
        if !self.requests.finish(ticket) {
            info!(site = %site, "discarding proposals for abandoned request");
            return Ok(Vec::new());
        }

        let drafts = match proposals {
            Ok(drafts) => drafts,
            Err(err) => {
                warn!(site = %site, error = %err, "generator request failed");
                self.notices.raise_error(&err, now);
                return Err(err);
            }
        };
        info!(site = %site, drafts = drafts.len(), "generator proposals received");

        let operation = match kind {
            RequestKind::Goal(goal) => Operation::PlanGoal { goal, drafts },
            RequestKind::Subtasks { parent, .. } => Operation::AttachSubtasks {
                parent_id: parent.id,
                drafts,
            },
            RequestKind::Reassess { task, reason } => Operation::Remediate {
                id: task.id,
                reason,
                drafts,
            },
        };
        self.execute(operation, now)
    }

    fn begin(
        &mut self,
        site: RequestSite,
        kind: RequestKind,
        now: OffsetDateTime,
    ) -> Result<PendingRequest, AppError> {
        match self.requests.begin(site) {
            Ok(ticket) => Ok(PendingRequest { ticket, kind }),
            Err(err) => {
                self.notices.raise_error(&err, now);
                Err(err)
            }
        }
    }

    fn lookup(&mut self, id: &str, now: OffsetDateTime) -> Result<Task, AppError> {
        match self.task(id) {
            Ok(task) => Ok(task.clone()),
            Err(err) => {
                self.notices.raise_error(&err, now);
                Err(err)
            }
        }
    }
}

fn first(touched: Vec<Task>) -> Result<Task, AppError> {
    touched
        .into_iter()
        .next()
        .ok_or_else(|| AppError::invalid_data("operation touched no task"))
}
