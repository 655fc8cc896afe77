mod collection;
mod task;

pub use collection::TaskCollection;
pub use task::{
    Cadence, CompletionRecord, Frequency, Priority, RecurrenceConfig, Task, TaskMetadata,
    TaskStatus,
};
