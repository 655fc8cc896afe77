use crate::consistency::evaluate;
use crate::error::AppError;
use crate::model::{Cadence, Task, TaskCollection};
use std::collections::HashSet;
use time::OffsetDateTime;
use tracing::debug;

/// Value a task contributes to its parent's minimum.
pub fn contribution(task: &Task, now: OffsetDateTime) -> f64 {
    match &task.cadence {
        Cadence::Recurring(_) => evaluate(task, now).score,
        Cadence::OneOff => f64::from(task.completion_percentage),
    }
}

/// Floor of the minimum over the resolvable children, 100 when there are none.
pub fn aggregate(collection: &TaskCollection, parent: &Task, now: OffsetDateTime) -> u8 {
    let lowest = collection
        .children(parent)
        .map(|child| contribution(child, now))
        .fold(None, |lowest: Option<f64>, value| {
            Some(lowest.map_or(value, |current| current.min(value)))
        });

    match lowest {
        Some(value) => value.floor().clamp(0.0, 100.0) as u8,
        None => 100,
    }
}

/// Recomputes `start_parent_id` and walks up through its ancestors until a
/// level's stored percentage is unchanged or a root is reached.
pub fn recompute_ancestors(
    collection: &TaskCollection,
    start_parent_id: &str,
    now: OffsetDateTime,
) -> Result<TaskCollection, AppError> {
    let mut next = collection.clone();
    let mut visited = HashSet::new();
    let mut pending = vec![start_parent_id.to_string()];

    while let Some(parent_id) = pending.pop() {
        if !visited.insert(parent_id.clone()) {
            return Err(AppError::invalid_data(format!(
                "cycle detected at task {parent_id}"
            )));
        }

        let Some(parent) = next.get(&parent_id) else {
            debug!(task_id = %parent_id, "skipping progress update for missing task");
            continue;
        };
        let value = aggregate(&next, parent, now);
        if value == parent.completion_percentage {
            continue;
        }

        let grandparent = parent.parent_id.clone();
        if let Some(parent) = next.get_mut(&parent_id) {
            debug!(
                task_id = %parent_id,
                from = parent.completion_percentage,
                to = value,
                "progress updated"
            );
            parent.completion_percentage = value;
        }
        if let Some(grandparent) = grandparent {
            pending.push(grandparent);
        }
    }

    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::{aggregate, recompute_ancestors};
    use crate::consistency::tests::{T0, daily_task, plain_task, record};
    use crate::model::{Task, TaskCollection};
    use time::Duration;

    fn link(parent: &mut Task, child: &mut Task) {
        parent.sub_task_ids.push(child.id.clone());
        child.parent_id = Some(parent.id.clone());
    }

    fn percentage(collection: &TaskCollection, id: &str) -> u8 {
        collection.get(id).unwrap().completion_percentage
    }

    #[test]
    fn parent_takes_minimum_of_recurring_and_plain_children() {
        let mut parent = plain_task("p", 0);
        let mut habit = daily_task("h");
        // 3 successes out of 5 expected cycles scores 60.
        for hour in 0..3 {
            habit.completion_history
                .push(record(T0 + Duration::hours(hour), true));
        }
        let mut plain = plain_task("c", 90);
        link(&mut parent, &mut habit);
        link(&mut parent, &mut plain);
        let collection = TaskCollection::new(vec![parent, habit, plain]);

        let now = T0 + Duration::days(4) + Duration::hours(1);
        let next = recompute_ancestors(&collection, "p", now).unwrap();
        assert_eq!(percentage(&next, "p"), 60);
    }

    #[test]
    fn childless_parent_is_complete() {
        let collection = TaskCollection::new(vec![plain_task("p", 40)]);
        let next = recompute_ancestors(&collection, "p", T0).unwrap();
        assert_eq!(percentage(&next, "p"), 100);
    }

    #[test]
    fn dangling_child_ids_are_skipped() {
        let mut parent = plain_task("p", 0);
        parent.sub_task_ids.push("gone".to_string());
        let collection = TaskCollection::new(vec![parent]);
        let parent = collection.get("p").unwrap();
        assert_eq!(aggregate(&collection, parent, T0), 100);
    }

    #[test]
    fn change_propagates_to_root() {
        let mut root = plain_task("r", 100);
        let mut middle = plain_task("m", 100);
        let mut leaf = plain_task("l", 20);
        let mut sibling = plain_task("s", 100);
        link(&mut root, &mut middle);
        link(&mut root, &mut sibling);
        link(&mut middle, &mut leaf);
        let collection = TaskCollection::new(vec![root, middle, leaf, sibling]);

        let next = recompute_ancestors(&collection, "m", T0).unwrap();
        assert_eq!(percentage(&next, "m"), 20);
        assert_eq!(percentage(&next, "r"), 20);
        assert_eq!(percentage(&collection, "r"), 100);
    }

    #[test]
    fn unchanged_level_stops_the_walk() {
        let mut root = plain_task("r", 55);
        let mut middle = plain_task("m", 30);
        let mut leaf = plain_task("l", 30);
        link(&mut root, &mut middle);
        link(&mut middle, &mut leaf);
        let collection = TaskCollection::new(vec![root, middle, leaf]);

        let next = recompute_ancestors(&collection, "m", T0).unwrap();
        assert_eq!(percentage(&next, "r"), 55);
    }

    #[test]
    fn missing_parent_is_a_no_op() {
        let collection = TaskCollection::new(vec![plain_task("a", 10)]);
        let next = recompute_ancestors(&collection, "ghost", T0).unwrap();
        assert_eq!(next, collection);
    }

    #[test]
    fn recompute_is_idempotent() {
        let mut parent = plain_task("p", 0);
        let mut child = plain_task("c", 45);
        link(&mut parent, &mut child);
        let collection = TaskCollection::new(vec![parent, child]);

        let once = recompute_ancestors(&collection, "p", T0).unwrap();
        let twice = recompute_ancestors(&once, "p", T0).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn cyclic_parent_links_are_rejected() {
        let mut a = plain_task("a", 0);
        let mut b = plain_task("b", 0);
        let mut leaf = plain_task("leaf", 50);
        link(&mut a, &mut b);
        link(&mut b, &mut leaf);
        a.parent_id = Some("b".to_string());
        let collection = TaskCollection::new(vec![a, b, leaf]);

        let err = recompute_ancestors(&collection, "b", T0).unwrap_err();
        assert_eq!(err.code(), "invalid_data");
    }
}
