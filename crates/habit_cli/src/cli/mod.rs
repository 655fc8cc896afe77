use clap::{Args, Parser, Subcommand, ValueEnum};
use habit_core::config::ConfigOverrides;
use habit_core::model::{Frequency, Priority, TaskStatus};

#[derive(Parser, Debug)]
#[command(
    name = "habit",
    author,
    version,
    about = "Track habits and goals with consistency scores",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Output JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Override configuration values (format KEY=VALUE)
    #[arg(long = "config-override", value_name = "KEY=VALUE", global = true)]
    pub config_override: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Add a task, optionally under a parent or as a recurring habit
    ///
    /// Example: habit add "Read 20 pages" --every daily
    /// Example: habit add "Buy shoes" --parent task-1 --due 2026-01-10
    Add {
        title: String,
        #[command(flatten)]
        details: TaskDetails,
        /// Parent task id
        #[arg(long, value_name = "ID")]
        parent: Option<String>,
        #[command(flatten)]
        repeat: RepeatArgs,
    },
    /// Edit a task's fields or its recurrence
    ///
    /// Example: habit edit task-1 --title "Read 30 pages" --interval 2 --every daily
    /// Example: habit edit task-1 --once
    Edit {
        id: String,
        /// New title
        #[arg(long)]
        title: Option<String>,
        #[command(flatten)]
        details: TaskDetails,
        #[command(flatten)]
        repeat: RepeatArgs,
        /// Stop repeating the task
        #[arg(long, conflicts_with = "every")]
        once: bool,
    },
    /// Delete a task and everything below it
    ///
    /// Example: habit delete task-1
    Delete { id: String },
    /// Show a task with its consistency metrics
    ///
    /// Example: habit show task-1
    Show { id: String },
    /// List tasks
    ///
    /// Example: habit list
    /// Example: habit list flat
    List {
        #[arg(value_enum, default_value_t = ListView::Tree)]
        view: ListView,
    },
    /// Set the completion percentage of a plain task
    ///
    /// Example: habit progress task-1 60
    Progress {
        id: String,
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        percentage: u8,
    },
    /// Set the status of a plain task
    ///
    /// Example: habit status task-1 in-progress
    Status {
        id: String,
        #[arg(value_parser = parse_status)]
        status: TaskStatus,
    },
    /// Record a successful cycle of a recurring task
    ///
    /// Example: habit check task-1
    Check { id: String },
    /// Record a missed cycle of a recurring task
    ///
    /// Example: habit miss task-1
    Miss { id: String },
    /// Turn a goal into generated tasks
    ///
    /// Example: habit plan "Sleep eight hours a night"
    Plan { goal: String },
    /// Generate subtasks under an existing task
    ///
    /// Example: habit breakdown task-1 "smaller weekly steps"
    Breakdown { id: String, instruction: String },
    /// Ask for remediation of a missed task
    ///
    /// Example: habit reassess task-1 "travelled all week"
    Reassess { id: String, reason: String },
    /// Show consistency totals over all habits
    ///
    /// Example: habit summary
    Summary,
}

#[derive(Args, Debug, Default, Clone)]
pub struct TaskDetails {
    /// Longer description
    #[arg(long)]
    pub description: Option<String>,
    /// Priority: low, medium or high
    #[arg(long, value_parser = parse_priority)]
    pub priority: Option<Priority>,
    /// Due date (RFC3339, YYYY-MM-DD HH:MM[:SS] or YYYY-MM-DD)
    #[arg(long, value_name = "DATETIME")]
    pub due: Option<String>,
}

#[derive(Args, Debug, Default, Clone)]
pub struct RepeatArgs {
    /// Repeat frequency: minutely, hourly, daily, weekly, monthly or yearly
    #[arg(long, value_name = "FREQUENCY", value_parser = parse_frequency)]
    pub every: Option<Frequency>,
    /// Units of the frequency between cycles
    #[arg(long, requires = "every")]
    pub interval: Option<u32>,
    /// First cycle (defaults to now)
    #[arg(long, value_name = "DATETIME", requires = "every")]
    pub start: Option<String>,
    /// Last day of the recurrence
    #[arg(long, value_name = "DATETIME", requires = "every")]
    pub until: Option<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListView {
    /// Indented by parent
    Tree,
    /// One row per task
    Flat,
}

fn parse_priority(raw: &str) -> Result<Priority, String> {
    Priority::parse(raw).ok_or_else(|| format!("unknown priority '{raw}'"))
}

fn parse_frequency(raw: &str) -> Result<Frequency, String> {
    Frequency::parse(raw).ok_or_else(|| format!("unknown frequency '{raw}'"))
}

fn parse_status(raw: &str) -> Result<TaskStatus, String> {
    TaskStatus::parse(raw).ok_or_else(|| format!("unknown status '{raw}'"))
}

/// Flag name used to identify config override arguments by the runtime.
pub const CONFIG_OVERRIDE_FLAG: &str = "--config-override";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOverrideTarget {
    Theme,
    Alias(String),
    NoticeSeconds,
    LogLevel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedConfigOverride {
    pub target: ConfigOverrideTarget,
    pub value: String,
}

/// Parse a raw `KEY=VALUE` override string into a structured target.
pub fn parse_config_override(raw: &str) -> Result<ParsedConfigOverride, String> {
    let (key_raw, value_raw) = raw
        .trim()
        .split_once('=')
        .ok_or_else(|| "override must be in KEY=VALUE format".to_string())?;

    let value = value_raw.trim().to_string();
    let (field, remainder) = key_raw
        .split_once('.')
        .map(|(field, rest)| (field.trim(), Some(rest.trim())))
        .unwrap_or((key_raw.trim(), None));

    let canonical_field =
        canonicalize_flag_name(field).ok_or_else(|| "override key cannot be empty".to_string())?;

    let scalar = |target: ConfigOverrideTarget| {
        if remainder.is_some() {
            Err(format!("{canonical_field} override cannot have subfields"))
        } else {
            Ok(ParsedConfigOverride {
                target,
                value: value.clone(),
            })
        }
    };

    match canonical_field.as_str() {
        "theme" => scalar(ConfigOverrideTarget::Theme),
        "notice_seconds" => scalar(ConfigOverrideTarget::NoticeSeconds),
        "log_level" => scalar(ConfigOverrideTarget::LogLevel),
        "aliases" | "alias" => {
            let alias_name = remainder
                .filter(|segment| !segment.is_empty())
                .ok_or_else(|| "aliases override requires an alias name".to_string())?;
            Ok(ParsedConfigOverride {
                target: ConfigOverrideTarget::Alias(alias_name.to_string()),
                value,
            })
        }
        other => Err(format!("unknown config field '{other}'")),
    }
}

/// Folds every `--config-override` value into one set of overrides. Later
/// values win.
pub fn collect_overrides(raw: &[String]) -> Result<ConfigOverrides, String> {
    let mut overrides = ConfigOverrides::default();
    for entry in raw {
        let parsed = parse_config_override(entry)?;
        match parsed.target {
            ConfigOverrideTarget::Theme => overrides.theme = Some(parsed.value),
            ConfigOverrideTarget::Alias(name) => {
                overrides.aliases.insert(name, parsed.value);
            }
            ConfigOverrideTarget::NoticeSeconds => {
                let seconds = parsed.value.parse::<u64>().map_err(|_| {
                    format!("notice_seconds must be a whole number, got '{}'", parsed.value)
                })?;
                overrides.notice_seconds = Some(seconds);
            }
            ConfigOverrideTarget::LogLevel => overrides.log_level = Some(parsed.value),
        }
    }
    Ok(overrides)
}

fn canonicalize_flag_name(name: &str) -> Option<String> {
    let mut cleaned = String::new();
    let mut previous_underscore = false;

    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            cleaned.push(ch.to_ascii_lowercase());
            previous_underscore = false;
        } else if !previous_underscore && !cleaned.is_empty() {
            cleaned.push('_');
            previous_underscore = true;
        }
    }

    let trimmed = cleaned.trim_matches('_');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Cli, Command, ConfigOverrideTarget, ListView, collect_overrides, parse_config_override,
    };
    use clap::Parser;
    use habit_core::model::{Frequency, TaskStatus};

    #[test]
    fn parse_config_override_canonicalizes_field_names() {
        let parsed = parse_config_override(" Notice-Seconds = 30 ").unwrap();
        assert_eq!(parsed.target, ConfigOverrideTarget::NoticeSeconds);
        assert_eq!(parsed.value, "30");

        let parsed = parse_config_override("THEME=Noir").unwrap();
        assert_eq!(parsed.target, ConfigOverrideTarget::Theme);
    }

    #[test]
    fn parse_config_override_rejects_bad_keys() {
        let err = parse_config_override("aliases. = foo").unwrap_err();
        assert!(err.contains("aliases override requires an alias name"));

        let err = parse_config_override("unknown.field=value").unwrap_err();
        assert!(err.contains("unknown config field"));

        let err = parse_config_override("log_level.extra=debug").unwrap_err();
        assert!(err.contains("cannot have subfields"));

        let err = parse_config_override("aliasesls").unwrap_err();
        assert!(err.contains("KEY=VALUE"));
    }

    #[test]
    fn collect_overrides_merges_in_order() {
        let raw = vec![
            "aliases. ok = check".to_string(),
            "log_level=info".to_string(),
            "log_level=debug".to_string(),
            "notice_seconds=5".to_string(),
        ];
        let overrides = collect_overrides(&raw).unwrap();
        assert_eq!(overrides.aliases.get("ok").map(String::as_str), Some("check"));
        assert_eq!(overrides.log_level.as_deref(), Some("debug"));
        assert_eq!(overrides.notice_seconds, Some(5));

        let err = collect_overrides(&["notice_seconds=soon".to_string()]).unwrap_err();
        assert!(err.contains("whole number"));
    }

    #[test]
    fn add_parses_recurrence_flags() {
        let cli = Cli::try_parse_from([
            "habit", "add", "Stretch", "--every", "Weekly", "--interval", "2", "--priority", "high",
        ])
        .unwrap();
        match cli.command {
            Command::Add {
                title,
                details,
                repeat,
                parent,
            } => {
                assert_eq!(title, "Stretch");
                assert_eq!(repeat.every, Some(Frequency::Weekly));
                assert_eq!(repeat.interval, Some(2));
                assert!(details.priority.is_some());
                assert!(parent.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn interval_requires_frequency() {
        assert!(Cli::try_parse_from(["habit", "add", "Stretch", "--interval", "2"]).is_err());
    }

    #[test]
    fn status_and_progress_are_validated() {
        let cli = Cli::try_parse_from(["habit", "status", "t1", "in-progress"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Status {
                status: TaskStatus::InProgress,
                ..
            }
        ));
        assert!(Cli::try_parse_from(["habit", "status", "t1", "someday"]).is_err());
        assert!(Cli::try_parse_from(["habit", "progress", "t1", "101"]).is_err());
    }

    #[test]
    fn list_defaults_to_tree() {
        let cli = Cli::try_parse_from(["habit", "list"]).unwrap();
        assert!(matches!(cli.command, Command::List { view: ListView::Tree }));
        let cli = Cli::try_parse_from(["habit", "--json", "list", "flat"]).unwrap();
        assert!(cli.json);
        assert!(matches!(cli.command, Command::List { view: ListView::Flat }));
    }
}
