use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use habit_cli::cli::{
    CONFIG_OVERRIDE_FLAG, Cli, Command, ListView, RepeatArgs, TaskDetails, collect_overrides,
};
use habit_cli::render;
use habit_core::clock::{now_local, parse_timestamp};
use habit_core::config::{Config, DEFAULT_LOG_LEVEL, load_config_with_fallback, merge_overrides};
use habit_core::error::AppError;
use habit_core::generate::{RecurrenceDraft, TaskDraft, generator_from_env};
use habit_core::model::Task;
use habit_core::notice::{Notice, NoticeBoard};
use habit_core::storage::JsonStore;
use habit_core::task_api::{OutlineRow, TaskService};
use habit_core::tree::{CadencePatch, RecurrencePatch, TaskPatch};
use std::io::{self, BufRead};
use time::OffsetDateTime;
use tracing::debug;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "HABIT_LOG";

fn init_logging(config: &Config) {
    let filter = std::env::var(LOG_ENV)
        .ok()
        .and_then(|raw| EnvFilter::try_new(raw).ok())
        .or_else(|| EnvFilter::try_new(config.log_level()).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_LEVEL));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Config file merged with any `--config-override` values found in `args`.
/// Errors are reported and the defaults are used instead.
fn load_config(args: &[String]) -> Config {
    let loaded = load_config_with_fallback();
    if let Some(err) = &loaded.error {
        eprintln!("WARNING: config ignored: {err}");
    }

    match collect_overrides(&override_values(args)) {
        Ok(overrides) => merge_overrides(&loaded.config, &overrides),
        Err(_) => loaded.config,
    }
}

fn override_values(args: &[String]) -> Vec<String> {
    let mut values = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == CONFIG_OVERRIDE_FLAG {
            if let Some(value) = iter.next() {
                values.push(value.clone());
            }
        } else if let Some(value) = arg
            .strip_prefix(CONFIG_OVERRIDE_FLAG)
            .and_then(|rest| rest.strip_prefix('='))
        {
            values.push(value.to_string());
        }
    }
    values
}

/// Replaces the first word with its alias expansion, if one is configured.
fn expand_alias(args: Vec<String>, config: &Config) -> Result<Vec<String>, AppError> {
    let Some(first) = args.first() else {
        return Ok(args);
    };
    let Some(expansion) = config.aliases.get(first) else {
        return Ok(args);
    };

    let mut expanded = split_command_line(expansion)?;
    debug!(alias = %first, expansion = %expansion, "expanding alias");
    expanded.extend(args.into_iter().skip(1));
    Ok(expanded)
}

fn normalize_parse_error(err: clap::Error) -> AppError {
    let rendered = err.to_string();
    let first_line = rendered.lines().next().unwrap_or("invalid command").trim();
    let message = first_line
        .strip_prefix("error: ")
        .unwrap_or(first_line)
        .to_string();
    AppError::invalid_input(message)
}

fn split_command_line(line: &str) -> Result<Vec<String>, AppError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escape = false;

    for ch in line.chars() {
        if escape {
            if ch != '"' && ch != '\\' {
                current.push('\\');
            }
            current.push(ch);
            escape = false;
            continue;
        }

        if in_quotes && ch == '\\' {
            escape = true;
            continue;
        }

        if ch == '"' {
            in_quotes = !in_quotes;
            continue;
        }

        if ch.is_whitespace() && !in_quotes {
            if !current.is_empty() {
                args.push(std::mem::take(&mut current));
            }
            continue;
        }

        current.push(ch);
    }

    if in_quotes {
        return Err(AppError::invalid_input("unterminated quote in command"));
    }

    if !current.is_empty() {
        args.push(current);
    }

    Ok(args)
}

fn print_help() {
    let mut cmd = Cli::command();
    let help = cmd.render_help();
    println!("{help}");
}

fn parse_optional_time(raw: Option<&str>) -> Result<Option<OffsetDateTime>, AppError> {
    raw.map(parse_timestamp).transpose()
}

fn recurrence_draft(repeat: &RepeatArgs) -> Result<Option<RecurrenceDraft>, AppError> {
    let Some(frequency) = repeat.every else {
        return Ok(None);
    };
    Ok(Some(RecurrenceDraft {
        frequency,
        interval: repeat.interval.unwrap_or(1),
        start_at: parse_optional_time(repeat.start.as_deref())?,
        end_at: parse_optional_time(repeat.until.as_deref())?,
    }))
}

fn build_draft(
    title: String,
    details: TaskDetails,
    repeat: &RepeatArgs,
) -> Result<TaskDraft, AppError> {
    let mut draft = TaskDraft::titled(title);
    draft.description = details.description.unwrap_or_default();
    draft.priority = details.priority.unwrap_or_default();
    draft.due_at = parse_optional_time(details.due.as_deref())?;
    draft.recurrence = recurrence_draft(repeat)?;
    Ok(draft)
}

fn build_patch(
    title: Option<String>,
    details: TaskDetails,
    repeat: &RepeatArgs,
    once: bool,
) -> Result<TaskPatch, AppError> {
    let cadence = match repeat.every {
        _ if once => Some(CadencePatch::OneOff),
        None => None,
        Some(frequency) => Some(CadencePatch::Recurring(RecurrencePatch {
            frequency,
            interval: repeat.interval,
            start_at: parse_optional_time(repeat.start.as_deref())?,
            end_at: parse_optional_time(repeat.until.as_deref())?,
        })),
    };
    Ok(TaskPatch {
        title,
        description: details.description,
        priority: details.priority,
        due_at: parse_optional_time(details.due.as_deref())?,
        cadence,
    })
}

struct Output<'a> {
    json: bool,
    config: &'a Config,
    now: OffsetDateTime,
}

impl Output<'_> {
    fn task(&self, verb: &str, task: &Task) -> Result<(), AppError> {
        if self.json {
            println!("{}", render::task_json(task, self.now)?);
        } else {
            println!("{verb} task: {} ({})", task.title, task.id);
        }
        Ok(())
    }

    fn tasks(&self, verb: &str, tasks: &[Task]) -> Result<(), AppError> {
        if self.json {
            println!("{}", render::tasks_json(tasks, self.now)?);
            return Ok(());
        }
        if tasks.is_empty() {
            println!("No tasks {}", verb.to_lowercase());
        }
        for task in tasks {
            println!("{verb} task: {} ({})", task.title, task.id);
        }
        Ok(())
    }

    fn rows(&self, rows: &[OutlineRow<'_>]) -> Result<(), AppError> {
        if self.json {
            println!(
                "{}",
                render::tasks_json(rows.iter().map(|row| row.task), self.now)?
            );
        } else if rows.is_empty() {
            println!("No tasks");
        } else {
            println!(
                "{}",
                render::task_table(rows, &self.config.palette(), self.now)
            );
        }
        Ok(())
    }
}

fn run_command(service: &mut TaskService, cli: Cli, config: &Config) -> Result<(), AppError> {
    let now = now_local();
    let out = Output {
        json: cli.json,
        config,
        now,
    };

    match cli.command {
        Command::Add {
            title,
            details,
            parent,
            repeat,
        } => {
            let draft = build_draft(title, details, &repeat)?;
            let task = service.create(draft, parent, now)?;
            out.task("Added", &task)?;
        }
        Command::Edit {
            id,
            title,
            details,
            repeat,
            once,
        } => {
            let patch = build_patch(title, details, &repeat, once)?;
            let task = service.edit(&id, patch, now)?;
            out.task("Updated", &task)?;
        }
        Command::Delete { id } => {
            let removed = service.delete(&id, now)?;
            out.tasks("Deleted", &removed)?;
        }
        Command::Show { id } => {
            let task = service.task(&id)?;
            if cli.json {
                println!("{}", render::task_json(task, now)?);
            } else {
                let metrics = service.consistency(&id, now)?;
                println!(
                    "{}",
                    render::task_detail(task, &metrics, &config.palette(), now)
                );
            }
        }
        Command::List { view } => {
            let rows = match view {
                ListView::Tree => service.outline(),
                ListView::Flat => service
                    .tasks()
                    .iter()
                    .map(|task| OutlineRow { depth: 0, task })
                    .collect(),
            };
            out.rows(&rows)?;
        }
        Command::Progress { id, percentage } => {
            let task = service.set_progress(&id, percentage, now)?;
            out.task("Updated", &task)?;
        }
        Command::Status { id, status } => {
            let task = service.set_status(&id, status, now)?;
            out.task("Updated", &task)?;
        }
        Command::Check { id } => {
            let task = service.record_outcome(&id, true, now)?;
            out.task("Checked", &task)?;
        }
        Command::Miss { id } => {
            let task = service.record_outcome(&id, false, now)?;
            out.task("Missed", &task)?;
        }
        Command::Plan { goal } => {
            let created = service.plan_goal(&goal, now)?;
            out.tasks("Planned", &created)?;
        }
        Command::Breakdown { id, instruction } => {
            let created = service.break_down(&id, &instruction, now)?;
            out.tasks("Added", &created)?;
        }
        Command::Reassess { id, reason } => {
            let touched = service.reassess(&id, &reason, now)?;
            out.tasks("Reassessed", &touched)?;
        }
        Command::Summary => {
            let summary = service.summary(now);
            if cli.json {
                let payload = serde_json::to_value(summary).map_err(AppError::from)?;
                println!("{payload}");
            } else {
                println!("{}", render::summary_line(&summary, &config.palette()));
            }
        }
    }

    Ok(())
}

/// Parses one command line. `Ok(None)` means clap already printed help or
/// version text and there is nothing to run.
fn parse_args(args: Vec<String>, config: &Config) -> Result<Option<Cli>, AppError> {
    let args = expand_alias(args, config)?;
    let mut argv = Vec::with_capacity(args.len() + 1);
    argv.push("habit".to_string());
    argv.extend(args);
    let cli = match Cli::try_parse_from(argv) {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            err.print().map_err(AppError::from)?;
            return Ok(None);
        }
        Err(err) => return Err(normalize_parse_error(err)),
    };
    collect_overrides(&cli.config_override).map_err(AppError::invalid_input)?;
    Ok(Some(cli))
}

fn open_service(config: &Config) -> Result<TaskService, AppError> {
    let store = JsonStore::from_env()?;
    debug!(path = %store.path().display(), "opening task store");
    TaskService::open(
        Box::new(store),
        generator_from_env(),
        NoticeBoard::new(config.notice_seconds()),
    )
}

/// Passes `notice` through the first time it is seen.
fn unseen_notice<'a>(
    notice: Option<&'a Notice>,
    shown: &mut Option<OffsetDateTime>,
) -> Option<&'a Notice> {
    let notice = notice?;
    if *shown == Some(notice.raised_at) {
        return None;
    }
    *shown = Some(notice.raised_at);
    Some(notice)
}

fn run_interactive(config: &Config) -> Result<(), AppError> {
    let mut service = open_service(config)?;
    let mut input = String::new();
    let stdin = io::stdin();
    let mut stdin_lock = stdin.lock();
    let mut shown = None;

    loop {
        if let Some(notice) = unseen_notice(service.notice(now_local()), &mut shown) {
            eprintln!("NOTICE: {}", notice.message);
        }

        input.clear();
        let bytes = stdin_lock
            .read_line(&mut input)
            .map_err(|err| AppError::io(err.to_string()))?;

        if bytes == 0 {
            break;
        }

        let line = input.trim();
        if line.is_empty() {
            continue;
        }

        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            break;
        }

        if line == "help" || line == "?" {
            print_help();
            continue;
        }

        let args = match split_command_line(line) {
            Ok(args) => args,
            Err(err) => {
                eprintln!("ERROR: {}", err);
                continue;
            }
        };

        if args.is_empty() {
            continue;
        }

        let cli = match parse_args(args, config) {
            Ok(Some(cli)) => cli,
            Ok(None) => continue,
            Err(err) => {
                eprintln!("ERROR: {}", err);
                continue;
            }
        };

        if let Err(err) = run_command(&mut service, cli, config) {
            eprintln!("ERROR: {}", err);
        }
    }

    Ok(())
}

fn run_once(args: Vec<String>, config: &Config) -> Result<(), AppError> {
    let Some(cli) = parse_args(args, config)? else {
        return Ok(());
    };
    let mut service = open_service(config)?;
    run_command(&mut service, cli, config)
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = load_config(&args);
    init_logging(&config);

    let result = if args.is_empty() {
        run_interactive(&config)
    } else {
        run_once(args, &config)
    };

    if let Err(err) = result {
        eprintln!("ERROR: {}", err);
        std::process::exit(1);
    }
}
