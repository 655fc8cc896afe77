use crate::error::AppError;
use crate::model::{Frequency, Priority, TaskMetadata};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Proposed task as returned by a generator, before it is placed in the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, alias = "dueDate", with = "time::serde::rfc3339::option")]
    pub due_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub recurrence: Option<RecurrenceDraft>,
    #[serde(default)]
    pub metadata: TaskMetadata,
}

impl TaskDraft {
    pub fn titled<T: Into<String>>(title: T) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            priority: Priority::default(),
            due_at: None,
            recurrence: None,
            metadata: TaskMetadata::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceDraft {
    pub frequency: Frequency,
    #[serde(default = "default_interval")]
    pub interval: u32,
    #[serde(default, alias = "startDate", with = "time::serde::rfc3339::option")]
    pub start_at: Option<OffsetDateTime>,
    #[serde(default, alias = "endDate", with = "time::serde::rfc3339::option")]
    pub end_at: Option<OffsetDateTime>,
}

fn default_interval() -> u32 {
    1
}

/// Parses and validates raw generator output: a JSON array of drafts.
pub fn parse_drafts(raw: &str) -> Result<Vec<TaskDraft>, AppError> {
    let drafts: Vec<TaskDraft> = serde_json::from_str(raw)?;
    validate_drafts(drafts)
}

pub(crate) fn validate_drafts(drafts: Vec<TaskDraft>) -> Result<Vec<TaskDraft>, AppError> {
    for (index, draft) in drafts.iter().enumerate() {
        if draft.title.trim().is_empty() {
            return Err(AppError::invalid_data(format!(
                "draft {index} has a blank title"
            )));
        }
        if draft
            .recurrence
            .as_ref()
            .is_some_and(|recurrence| recurrence.interval == 0)
        {
            return Err(AppError::invalid_data(format!(
                "draft {index} has a zero recurrence interval"
            )));
        }
    }
    Ok(drafts)
}

#[cfg(test)]
mod tests {
    use super::parse_drafts;
    use crate::model::{Frequency, Priority};
    use time::macros::datetime;

    #[test]
    fn parses_camel_case_generator_output() {
        let raw = r#"[
            {
                "title": "Morning run",
                "description": "20 minutes",
                "priority": "high",
                "dueDate": "2026-01-02T07:00:00Z",
                "recurrence": {"frequency": "daily", "interval": 2, "startDate": "2026-01-01T07:00:00Z"},
                "metadata": {"location": "park"}
            },
            {"title": "Buy shoes"}
        ]"#;

        let drafts = parse_drafts(raw).unwrap();
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].priority, Priority::High);
        assert_eq!(drafts[0].due_at, Some(datetime!(2026-01-02 07:00 UTC)));
        let recurrence = drafts[0].recurrence.as_ref().unwrap();
        assert_eq!(recurrence.frequency, Frequency::Daily);
        assert_eq!(recurrence.interval, 2);
        assert_eq!(recurrence.start_at, Some(datetime!(2026-01-01 07:00 UTC)));
        assert_eq!(drafts[0].metadata["location"], "park");
        assert_eq!(drafts[1].priority, Priority::Medium);
        assert!(drafts[1].recurrence.is_none());
    }

    #[test]
    fn missing_interval_defaults_to_one() {
        let drafts = parse_drafts(r#"[{"title": "Read", "recurrence": {"frequency": "weekly"}}]"#)
            .unwrap();
        assert_eq!(drafts[0].recurrence.as_ref().unwrap().interval, 1);
    }

    #[test]
    fn rejects_invalid_drafts() {
        for raw in [
            r#"[{"title": "   "}]"#,
            r#"[{"title": "Read", "recurrence": {"frequency": "daily", "interval": 0}}]"#,
            r#"[{"title": "Read", "priority": "urgent"}]"#,
            r#"[{"title": "Read", "recurrence": {"frequency": "fortnightly"}}]"#,
            r#"[{"title": "Read", "dueDate": "tomorrow"}]"#,
            r#"{"title": "Read"}"#,
        ] {
            let err = parse_drafts(raw).unwrap_err();
            assert_eq!(err.code(), "invalid_data", "{raw}");
        }
    }
}
