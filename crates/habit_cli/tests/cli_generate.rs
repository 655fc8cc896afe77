use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_path(file_name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("habit-{nanos}-{file_name}"))
}

fn habit(store_path: &Path, proposals: Option<&Path>, args: &[&str]) -> Output {
    let mut command = Command::new(env!("CARGO_BIN_EXE_habit"));
    command
        .args(args)
        .env("HABIT_STORE_PATH", store_path)
        .env("HABIT_CONFIG_PATH", temp_path("no-config.json"))
        .env_remove("HABIT_LOG");
    match proposals {
        Some(path) => command.env("HABIT_PROPOSALS_PATH", path),
        None => command.env_remove("HABIT_PROPOSALS_PATH"),
    };
    command.output().expect("failed to run habit")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout json")
}

fn write_proposals(path: &Path, proposals: serde_json::Value) {
    std::fs::write(path, serde_json::to_string_pretty(&proposals).unwrap()).unwrap();
}

#[test]
fn plan_files_generated_tasks_under_a_goal() {
    let store_path = temp_path("cli-plan.json");
    let proposals = temp_path("cli-plan-proposals.json");
    write_proposals(
        &proposals,
        serde_json::json!({
            "plan": [
                {"title": "Run 5k", "recurrence": {"frequency": "weekly"}},
                {"title": "Buy shoes", "priority": "low"}
            ]
        }),
    );

    let created = stdout_json(&habit(
        &store_path,
        Some(&proposals),
        &["--json", "plan", "Get fit enough to run a half marathon by next spring"],
    ));
    let stored: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&store_path).unwrap()).unwrap();
    std::fs::remove_file(&store_path).ok();
    std::fs::remove_file(&proposals).ok();

    let created = created.as_array().expect("created tasks");
    assert_eq!(created.len(), 3);
    let goal = &created[0];
    assert_eq!(goal["title"], "Get fit enough to run a half marathon by next s...");
    assert_eq!(goal["priority"], "high");
    assert_eq!(goal["metadata"]["is_goal"], true);
    assert_eq!(goal["generated"], false);
    assert_eq!(goal["sub_task_ids"].as_array().map(Vec::len), Some(2));

    assert_eq!(created[1]["parent_id"], goal["id"]);
    assert_eq!(created[1]["generated"], true);
    assert_eq!(created[1]["cadence"]["kind"], "recurring");
    assert_eq!(created[2]["priority"], "low");
    assert_eq!(stored["tasks"].as_array().map(Vec::len), Some(3));
}

#[test]
fn breakdown_attaches_generated_children() {
    let store_path = temp_path("cli-breakdown.json");
    let proposals = temp_path("cli-breakdown-proposals.json");
    write_proposals(
        &proposals,
        serde_json::json!({
            "breakdown": [{"title": "Pack kitchen"}, {"title": "Pack books"}]
        }),
    );

    let parent = stdout_json(&habit(&store_path, None, &["--json", "add", "Move house"]));
    let parent_id = parent["id"].as_str().unwrap().to_string();

    let created = stdout_json(&habit(
        &store_path,
        Some(&proposals),
        &["--json", "breakdown", &parent_id, "one room at a time"],
    ));
    let shown = stdout_json(&habit(&store_path, None, &["--json", "show", &parent_id]));
    std::fs::remove_file(&store_path).ok();
    std::fs::remove_file(&proposals).ok();

    let created = created.as_array().expect("created tasks");
    assert_eq!(created.len(), 2);
    assert!(created.iter().all(|task| task["parent_id"] == parent_id.as_str()));
    assert!(created.iter().all(|task| task["generated"] == true));
    assert_eq!(shown["sub_task_ids"].as_array().map(Vec::len), Some(2));
    assert_eq!(shown["completion_percentage"], 0);
}

#[test]
fn reassess_extends_missed_task_and_adds_solutions() {
    let store_path = temp_path("cli-reassess.json");
    let proposals = temp_path("cli-reassess-proposals.json");
    write_proposals(
        &proposals,
        serde_json::json!({
            "reassess": [
                {"title": "Write essay", "dueDate": "2031-01-01T00:00:00Z"},
                {"title": "Outline arguments"}
            ]
        }),
    );

    let added = stdout_json(&habit(
        &store_path,
        None,
        &["--json", "add", "Write essay", "--due", "2020-01-01"],
    ));
    let id = added["id"].as_str().unwrap().to_string();

    let touched = stdout_json(&habit(
        &store_path,
        Some(&proposals),
        &["--json", "reassess", &id, "  was ill  "],
    ));
    std::fs::remove_file(&store_path).ok();
    std::fs::remove_file(&proposals).ok();

    let touched = touched.as_array().expect("touched tasks");
    assert_eq!(touched.len(), 2);
    assert_eq!(touched[0]["id"], id.as_str());
    assert_eq!(touched[0]["overdue_explanation"], "was ill");
    assert_eq!(touched[0]["status"], "todo");
    assert!(
        touched[0]["due_at"]
            .as_str()
            .is_some_and(|due| due.starts_with("2031-") || due.starts_with("2030-12-31"))
    );
    assert_eq!(touched[1]["title"], "Outline arguments");
    assert_eq!(touched[1]["parent_id"], id.as_str());
}

#[test]
fn generation_without_proposals_fails_cleanly() {
    let store_path = temp_path("cli-no-generator.json");

    let output = habit(&store_path, None, &["plan", "Learn Spanish"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ERROR: generation_failed"));
    assert!(!store_path.exists());

    let output = habit(&store_path, None, &["plan", "   "]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("goal is required"));
}

#[test]
fn malformed_proposals_leave_store_untouched() {
    let store_path = temp_path("cli-bad-proposals.json");
    let proposals = temp_path("cli-bad-proposals-file.json");
    write_proposals(&proposals, serde_json::json!({"plan": [{"title": "  "}]}));

    let output = habit(&store_path, Some(&proposals), &["plan", "Learn Spanish"]);
    std::fs::remove_file(&proposals).ok();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ERROR: invalid_data"));
    assert!(!store_path.exists());
}
