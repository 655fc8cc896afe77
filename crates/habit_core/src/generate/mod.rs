//! Task generation collaborators.
//!
//! A generator turns free text into task drafts. The tree layer consumes the
//! drafts; nothing here touches the task collection.

mod draft;
mod file;
mod request;

pub use draft::{RecurrenceDraft, TaskDraft, parse_drafts};
pub use file::{FileGenerator, PROPOSALS_PATH_ENV};
pub use request::{RequestSite, RequestTicket, RequestTracker};

use crate::error::AppError;
use crate::model::Task;
use std::path::PathBuf;

pub trait TaskGenerator {
    /// Breaks a goal down into top-level drafts.
    fn generate(&self, goal: &str) -> Result<Vec<TaskDraft>, AppError>;

    fn generate_subtasks(&self, parent: &Task, instruction: &str)
    -> Result<Vec<TaskDraft>, AppError>;

    /// Proposes remediation for a missed task. A draft titled exactly like
    /// `task` asks for a due date extension.
    fn reassess(&self, task: &Task, reason: &str) -> Result<Vec<TaskDraft>, AppError>;
}

/// Stands in when no generator is configured. Every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableGenerator;

impl UnavailableGenerator {
    fn unavailable() -> AppError {
        AppError::generation(format!(
            "no task generator configured; set {PROPOSALS_PATH_ENV}"
        ))
    }
}

impl TaskGenerator for UnavailableGenerator {
    fn generate(&self, _goal: &str) -> Result<Vec<TaskDraft>, AppError> {
        Err(Self::unavailable())
    }

    fn generate_subtasks(
        &self,
        _parent: &Task,
        _instruction: &str,
    ) -> Result<Vec<TaskDraft>, AppError> {
        Err(Self::unavailable())
    }

    fn reassess(&self, _task: &Task, _reason: &str) -> Result<Vec<TaskDraft>, AppError> {
        Err(Self::unavailable())
    }
}

pub fn generator_from_env() -> Box<dyn TaskGenerator> {
    match std::env::var_os(PROPOSALS_PATH_ENV) {
        Some(path) if !path.is_empty() => Box::new(FileGenerator::new(PathBuf::from(path))),
        _ => Box::new(UnavailableGenerator),
    }
}
