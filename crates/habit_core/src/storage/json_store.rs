use super::TaskStore;
use crate::error::AppError;
use crate::model::Task;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const SCHEMA_VERSION: u32 = 1;
pub const STORE_PATH_ENV: &str = "HABIT_STORE_PATH";
const STORE_FILE_NAME: &str = "tasks.json";

#[derive(Debug, Serialize, Deserialize)]
struct StoredTasks {
    schema_version: u32,
    tasks: Vec<Task>,
}

pub fn store_path() -> Result<PathBuf, AppError> {
    if let Ok(path) = std::env::var(STORE_PATH_ENV)
        && !path.trim().is_empty()
    {
        return Ok(PathBuf::from(path));
    }

    if cfg!(windows) {
        let appdata =
            std::env::var("APPDATA").map_err(|_| AppError::invalid_data("APPDATA is not set"))?;
        Ok(PathBuf::from(appdata).join("habit").join(STORE_FILE_NAME))
    } else {
        let home = std::env::var("HOME").map_err(|_| AppError::invalid_data("HOME is not set"))?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join("habit")
            .join(STORE_FILE_NAME))
    }
}

/// Task list kept as one pretty-printed JSON document.
#[derive(Debug, Clone)]
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn from_env() -> Result<Self, AppError> {
        Ok(Self::new(store_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TaskStore for JsonStore {
    fn load(&self) -> Result<Vec<Task>, AppError> {
        load_tasks(&self.path)
    }

    fn save(&self, tasks: &[Task]) -> Result<(), AppError> {
        save_tasks(&self.path, tasks)
    }
}

pub fn load_tasks(path: &Path) -> Result<Vec<Task>, AppError> {
    if !path.exists() {
        debug!(path = %path.display(), "store missing, starting empty");
        return Ok(Vec::new());
    }

    let content = std::fs::read_to_string(path)?;
    let stored: StoredTasks = serde_json::from_str(&content)?;
    if stored.schema_version != SCHEMA_VERSION {
        return Err(AppError::invalid_data(format!(
            "unsupported schema_version {}",
            stored.schema_version
        )));
    }

    validate_links(&stored.tasks)?;
    debug!(path = %path.display(), count = stored.tasks.len(), "store loaded");
    Ok(stored.tasks)
}

pub fn save_tasks(path: &Path, tasks: &[Task]) -> Result<(), AppError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let stored = StoredTasks {
        schema_version: SCHEMA_VERSION,
        tasks: tasks.to_vec(),
    };
    let content = serde_json::to_string_pretty(&stored)?;
    std::fs::write(path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let permissions = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, permissions)?;
    }

    debug!(path = %path.display(), count = tasks.len(), "store saved");
    Ok(())
}

fn validate_links(tasks: &[Task]) -> Result<(), AppError> {
    let mut ids = HashSet::with_capacity(tasks.len());
    for task in tasks {
        if !ids.insert(task.id.as_str()) {
            return Err(AppError::invalid_data(format!("duplicate task id {}", task.id)));
        }
    }

    for task in tasks {
        if let Some(parent_id) = task.parent_id.as_deref()
            && !ids.contains(parent_id)
        {
            return Err(AppError::invalid_data(format!(
                "task {} references missing parent {parent_id}",
                task.id
            )));
        }
        if let Some(child_id) = task
            .sub_task_ids
            .iter()
            .find(|child_id| !ids.contains(child_id.as_str()))
        {
            return Err(AppError::invalid_data(format!(
                "task {} references missing subtask {child_id}",
                task.id
            )));
        }
        if task.completion_percentage > 100 {
            return Err(AppError::invalid_data(format!(
                "task {} has completion_percentage above 100",
                task.id
            )));
        }
    }
    Ok(())
}
