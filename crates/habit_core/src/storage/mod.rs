pub mod json_store;

pub use json_store::{JsonStore, SCHEMA_VERSION, STORE_PATH_ENV, store_path};

use crate::error::AppError;
use crate::model::Task;

/// Persistence boundary for the whole task list.
pub trait TaskStore {
    fn load(&self) -> Result<Vec<Task>, AppError>;
    fn save(&self, tasks: &[Task]) -> Result<(), AppError>;
}
