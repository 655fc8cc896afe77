use crate::model::Task;
use time::OffsetDateTime;

/// Ordered snapshot of every task. Mutations happen on a copy inside a
/// transaction and the result replaces the previous snapshot as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskCollection {
    tasks: Vec<Task>,
}

impl TaskCollection {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    pub fn as_slice(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn roots(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|task| task.parent_id.is_none())
    }

    /// Children in `sub_task_ids` order. Ids without a matching task are skipped.
    pub fn children<'a>(&'a self, task: &'a Task) -> impl Iterator<Item = &'a Task> {
        task.sub_task_ids
            .iter()
            .filter_map(move |child_id| self.get(child_id))
    }

    pub fn next_id(&self, now: OffsetDateTime) -> String {
        let mut stamp = now.unix_timestamp_nanos();
        loop {
            let candidate = format!("task-{stamp}");
            if !self.contains(&candidate) {
                return candidate;
            }
            stamp += 1;
        }
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|task| task.id == id)
    }

    pub(crate) fn push(&mut self, task: Task) {
        self.tasks.push(task);
    }

    pub(crate) fn retain<F: FnMut(&Task) -> bool>(&mut self, keep: F) {
        self.tasks.retain(keep);
    }
}
