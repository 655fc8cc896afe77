use super::draft::validate_drafts;
use super::{TaskDraft, TaskGenerator};
use crate::error::AppError;
use crate::model::Task;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

pub const PROPOSALS_PATH_ENV: &str = "HABIT_PROPOSALS_PATH";

/// Serves drafts from a proposals file with one section per request kind:
///
/// ```json
/// { "plan": [...], "breakdown": [...], "reassess": [...] }
/// ```
///
/// The file is read on every call, so it can be edited between requests.
#[derive(Debug, Clone)]
pub struct FileGenerator {
    path: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
struct ProposalFile {
    #[serde(default)]
    plan: Option<Vec<TaskDraft>>,
    #[serde(default)]
    breakdown: Option<Vec<TaskDraft>>,
    #[serde(default)]
    reassess: Option<Vec<TaskDraft>>,
}

impl FileGenerator {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn section<F>(&self, name: &str, pick: F) -> Result<Vec<TaskDraft>, AppError>
    where
        F: FnOnce(ProposalFile) -> Option<Vec<TaskDraft>>,
    {
        let contents = fs::read_to_string(&self.path).map_err(|err| {
            AppError::generation(format!(
                "cannot read proposals {}: {err}",
                self.path.display()
            ))
        })?;
        let file: ProposalFile = serde_json::from_str(&contents).map_err(|err| {
            AppError::generation(format!(
                "malformed proposals {}: {err}",
                self.path.display()
            ))
        })?;
        let drafts = pick(file)
            .ok_or_else(|| AppError::generation(format!("no {name} proposals available")))?;
        debug!(section = name, count = drafts.len(), "loaded proposals");
        validate_drafts(drafts)
    }
}

impl TaskGenerator for FileGenerator {
    fn generate(&self, _goal: &str) -> Result<Vec<TaskDraft>, AppError> {
        self.section("plan", |file| file.plan)
    }

    fn generate_subtasks(
        &self,
        _parent: &Task,
        _instruction: &str,
    ) -> Result<Vec<TaskDraft>, AppError> {
        self.section("breakdown", |file| file.breakdown)
    }

    fn reassess(&self, _task: &Task, _reason: &str) -> Result<Vec<TaskDraft>, AppError> {
        self.section("reassess", |file| file.reassess)
    }
}
