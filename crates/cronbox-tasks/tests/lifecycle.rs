//! End-to-end lifecycle tests: create/update/delete/toggle against real
//! SQLite stores, a real scheduler, and a real scripts directory.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rusqlite::Connection;

use cronbox_core::{ExecutionStatus, ScheduleKind, ScriptKind, Task};
use cronbox_scheduler::JobScheduler;
use cronbox_store::{ExecutionStore, SqliteExecutionStore, SqliteTaskStore, TaskStore};
use cronbox_tasks::{TaskError, TaskService, TaskSpec};

struct Harness {
    service: Arc<TaskService>,
    scheduler: Arc<JobScheduler>,
    tasks: Arc<SqliteTaskStore>,
    executions: Arc<SqliteExecutionStore>,
    scripts_dir: tempfile::TempDir,
}

fn harness() -> Harness {
    let tasks = Arc::new(SqliteTaskStore::new(Connection::open_in_memory().unwrap()).unwrap());
    let executions =
        Arc::new(SqliteExecutionStore::new(Connection::open_in_memory().unwrap()).unwrap());
    let scheduler = Arc::new(JobScheduler::new());
    let scripts_dir = tempfile::tempdir().unwrap();

    let dyn_tasks: Arc<dyn TaskStore> = tasks.clone();
    let dyn_executions: Arc<dyn ExecutionStore> = executions.clone();
    let service = Arc::new(TaskService::new(
        dyn_tasks,
        dyn_executions,
        Arc::clone(&scheduler),
        scripts_dir.path(),
    ));

    Harness {
        service,
        scheduler,
        tasks,
        executions,
        scripts_dir,
    }
}

fn spec(name: &str, content: &str) -> TaskSpec {
    TaskSpec {
        name: name.to_string(),
        content: content.to_string(),
        script_kind: ScriptKind::Command,
        schedule_spec: "@every 1h".to_string(),
        schedule_kind: ScheduleKind::Interval,
        fire_at: None,
        enabled: true,
    }
}

fn script_files(dir: &tempfile::TempDir) -> Vec<std::path::PathBuf> {
    let mut files = Vec::new();
    let mut stack = vec![dir.path().to_path_buf()];
    while let Some(current) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&current) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files
}

async fn wait_for<F: Fn() -> bool>(what: &str, deadline: Duration, check: F) {
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("timed out waiting for {what}");
}

// ---------------------------------------------------------------------------
// Round-trip and header behaviour
// ---------------------------------------------------------------------------

#[tokio::test]
async fn script_content_round_trips_for_every_kind() {
    let h = harness();

    for (kind, body) in [
        (ScriptKind::Command, "echo inline"),
        (ScriptKind::Shell, "echo shell-body\n"),
        (ScriptKind::Python, "print('py-body')\n"),
    ] {
        let mut s = spec(&format!("rt-{kind:?}"), body);
        s.script_kind = kind;
        s.enabled = false;
        let task = h.service.create_task(s).await.unwrap();

        let content = h.service.script_content(&task);
        if kind == ScriptKind::Command {
            assert_eq!(content, body);
        } else {
            // Ignoring the generated header, the body equals the input.
            assert!(content.ends_with(body), "content {content:?} must end with {body:?}");
        }
    }
}

#[tokio::test]
async fn updating_with_headered_content_never_doubles_the_header() {
    let h = harness();
    let mut s = spec("headered", "echo hi\n");
    s.script_kind = ScriptKind::Shell;
    s.enabled = false;
    let task = h.service.create_task(s).await.unwrap();

    // Round-trip the full content (header included) through update twice.
    for _ in 0..2 {
        let content = h.service.script_content(&h.service.get_task(&task.id).unwrap());
        assert_eq!(content.matches("# Cronbox task:").count(), 1);

        let mut s = spec("headered", &content);
        s.script_kind = ScriptKind::Shell;
        s.enabled = false;
        h.service.update_task(&task.id, s).await.unwrap();
    }

    let final_content = h.service.script_content(&h.service.get_task(&task.id).unwrap());
    assert_eq!(final_content.matches("# Cronbox task:").count(), 1);
}

// ---------------------------------------------------------------------------
// Validation and rollback atomicity
// ---------------------------------------------------------------------------

#[tokio::test]
async fn expired_one_shot_is_rejected_with_no_side_effects() {
    let h = harness();
    let mut s = spec("expired", "echo never\n");
    s.script_kind = ScriptKind::Shell;
    s.schedule_kind = ScheduleKind::OneShot;
    s.fire_at = Some(Utc::now() - chrono::Duration::seconds(5));

    let err = h.service.create_task(s).await.unwrap_err();
    assert!(matches!(err, TaskError::ScheduleInPast));

    assert!(h.tasks.list_all().unwrap().is_empty(), "no row may remain");
    assert!(script_files(&h.scripts_dir).is_empty(), "no file may remain");
    assert_eq!(h.scheduler.registered_count(), 0, "no trigger may remain");
}

#[tokio::test]
async fn invalid_script_content_is_rejected_before_persisting() {
    let h = harness();
    for bad in ["", "   ", "cat ../secret"] {
        let err = h.service.create_task(spec("bad", bad)).await.unwrap_err();
        assert!(matches!(err, TaskError::InvalidScript(_)), "content {bad:?}");
    }
    assert!(h.tasks.list_all().unwrap().is_empty());
}

#[tokio::test]
async fn registration_failure_rolls_back_row_and_file() {
    let h = harness();
    let mut s = spec("badcron", "echo hi\n");
    s.script_kind = ScriptKind::Shell;
    s.schedule_kind = ScheduleKind::Cron;
    s.schedule_spec = "definitely not cron".to_string();
    s.enabled = true;

    let err = h.service.create_task(s).await.unwrap_err();
    assert!(matches!(err, TaskError::InvalidSpec(_)));

    assert!(h.tasks.list_all().unwrap().is_empty(), "row must be rolled back");
    assert!(
        script_files(&h.scripts_dir).is_empty(),
        "script directory must have no orphaned file"
    );
    assert_eq!(h.scheduler.registered_count(), 0);
}

#[tokio::test]
async fn disabled_task_with_bad_spec_persists_without_a_trigger() {
    // Spec validity only surfaces at registration time; a disabled task with
    // unparseable cron text is stored as-is.
    let h = harness();
    let mut s = spec("dormant", "echo hi");
    s.schedule_kind = ScheduleKind::Cron;
    s.schedule_spec = "not cron either".to_string();
    s.enabled = false;

    let task = h.service.create_task(s).await.unwrap();
    assert!(task.trigger_handle.is_none());
    assert_eq!(h.scheduler.registered_count(), 0);
}

// ---------------------------------------------------------------------------
// Trigger bookkeeping across update / toggle / delete
// ---------------------------------------------------------------------------

#[tokio::test]
async fn update_swaps_the_trigger_registration() {
    let h = harness();
    let task = h.service.create_task(spec("swap", "echo hi")).await.unwrap();
    let old_handle = task.trigger_handle.unwrap();
    assert!(h.scheduler.is_registered(old_handle));

    let mut s = spec("swap", "echo bye");
    s.schedule_spec = "@every 2h".to_string();
    let updated = h.service.update_task(&task.id, s).await.unwrap();
    let new_handle = updated.trigger_handle.unwrap();

    assert_ne!(old_handle, new_handle);
    assert!(!h.scheduler.is_registered(old_handle));
    assert!(h.scheduler.is_registered(new_handle));
    assert_eq!(h.scheduler.registered_count(), 1);
}

#[tokio::test]
async fn toggle_flips_enabled_and_trigger_presence() {
    let h = harness();
    let task = h.service.create_task(spec("toggle", "echo hi")).await.unwrap();
    assert!(task.enabled);
    assert!(task.trigger_handle.is_some());

    let off = h.service.toggle_task(&task.id).await.unwrap();
    assert!(!off.enabled);
    assert!(off.trigger_handle.is_none());
    assert_eq!(h.scheduler.registered_count(), 0);

    let on = h.service.toggle_task(&task.id).await.unwrap();
    assert!(on.enabled);
    assert!(on.trigger_handle.is_some());
    assert_eq!(h.scheduler.registered_count(), 1);

    // Toggling preserves the inline command.
    assert_eq!(on.command, "echo hi");
}

#[tokio::test]
async fn delete_removes_trigger_file_and_row() {
    let h = harness();
    let mut s = spec("doomed", "echo hi\n");
    s.script_kind = ScriptKind::Shell;
    let task = h.service.create_task(s).await.unwrap();
    let handle = task.trigger_handle.unwrap();
    assert_eq!(script_files(&h.scripts_dir).len(), 1);

    h.service.delete_task(&task.id).unwrap();

    assert!(!h.scheduler.is_registered(handle));
    assert!(script_files(&h.scripts_dir).is_empty());
    assert!(matches!(
        h.service.get_task(&task.id),
        Err(TaskError::NotFound { .. })
    ));
}

#[tokio::test]
async fn delete_survives_a_stale_trigger_handle() {
    let h = harness();
    let task = h.service.create_task(spec("stale", "echo hi")).await.unwrap();
    // Simulate a handle that the scheduler no longer knows (e.g. recorded
    // before a crash): remove it out from under the service.
    h.scheduler.unregister(task.trigger_handle.unwrap());

    h.service.delete_task(&task.id).unwrap();
    assert!(h.tasks.list_all().unwrap().is_empty());
}

#[tokio::test]
async fn deleting_a_task_keeps_its_execution_history() {
    let h = harness();
    let task = h.service.create_task(spec("audited", "echo hi")).await.unwrap();
    h.service.fire_task(task.clone()).await;
    assert_eq!(h.service.executions_for_task(&task.id, 0).unwrap().len(), 1);

    h.service.delete_task(&task.id).unwrap();
    assert_eq!(
        h.service.executions_for_task(&task.id, 0).unwrap().len(),
        1,
        "execution rows outlive the task"
    );
}

// ---------------------------------------------------------------------------
// Firing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn firing_an_empty_command_produces_no_execution_record() {
    let h = harness();
    let now = Utc::now();
    let task = Task {
        id: "manual".to_string(),
        name: "empty".to_string(),
        script_kind: ScriptKind::Command,
        command: String::new(),
        script_path: String::new(),
        schedule_spec: "@every 1h".to_string(),
        schedule_kind: ScheduleKind::Interval,
        fire_at: None,
        enabled: true,
        trigger_handle: None,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };

    h.service.fire_task(task).await;
    assert!(h.service.recent_executions(0).unwrap().is_empty());
}

#[tokio::test]
async fn failed_command_is_recorded_as_failed() {
    let h = harness();
    let task = h.service.create_task(spec("failing", "exit 7")).await.unwrap();
    h.service.fire_task(task.clone()).await;

    let executions = h.service.executions_for_task(&task.id, 0).unwrap();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].status, ExecutionStatus::Failed);
    assert_eq!(executions[0].error.as_deref(), Some("exit status 7"));
    assert!(executions[0].completed_at.is_some());
}

#[tokio::test]
async fn interval_task_fires_and_goes_silent_after_delete() {
    let h = harness();
    h.scheduler.start();

    let mut s = spec("ping", "echo hi");
    s.schedule_spec = "@every 1s".to_string();
    let task = h.service.create_task(s).await.unwrap();
    let handle = task.trigger_handle.unwrap();

    // Within about a second an execution with status success and output
    // containing "hi" must appear.
    let executions = Arc::clone(&h.executions);
    let task_id = task.id.clone();
    wait_for("first interval execution", Duration::from_secs(4), || {
        executions
            .list_by_task(&task_id, 0)
            .unwrap()
            .iter()
            .any(|e| e.status == ExecutionStatus::Success && e.output.contains("hi"))
    })
    .await;

    h.service.delete_task(&task.id).unwrap();
    assert!(!h.scheduler.is_registered(handle));

    // No further executions appear after deletion. A fire already in flight
    // at delete time may still land, so let things settle before snapshotting.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let settled = h.executions.list_by_task(&task.id, 0).unwrap().len();
    tokio::time::sleep(Duration::from_millis(1600)).await;
    assert_eq!(h.executions.list_by_task(&task.id, 0).unwrap().len(), settled);

    h.scheduler.stop(Duration::from_secs(2)).await;
}

#[tokio::test]
async fn running_execution_is_observable_while_in_flight() {
    let h = harness();
    h.scheduler.start();

    let mut s = spec("slow", "sleep 2");
    s.schedule_spec = "@every 200ms".to_string();
    let task = h.service.create_task(s).await.unwrap();

    let executions = Arc::clone(&h.executions);
    let task_id = task.id.clone();
    wait_for("running execution", Duration::from_secs(3), || {
        executions
            .list_by_task(&task_id, 0)
            .unwrap()
            .iter()
            .any(|e| e.status == ExecutionStatus::Running && e.completed_at.is_none())
    })
    .await;

    h.service.delete_task(&task.id).unwrap();
    h.scheduler.stop(Duration::from_secs(3)).await;
}

#[tokio::test]
async fn one_shot_fires_once_then_ends_disabled_with_no_trigger() {
    let h = harness();
    h.scheduler.start();

    let mut s = spec("once", "echo once");
    s.schedule_kind = ScheduleKind::OneShot;
    s.schedule_spec = String::new();
    s.fire_at = Some(Utc::now() + chrono::Duration::milliseconds(300));
    let task = h.service.create_task(s).await.unwrap();
    assert!(task.trigger_handle.is_some());

    let tasks = Arc::clone(&h.tasks);
    let task_id = task.id.clone();
    wait_for("one-shot to fire and disable", Duration::from_secs(4), || {
        let current = tasks.get(&task_id).unwrap();
        !current.enabled && current.trigger_handle.is_none()
    })
    .await;

    // Fired exactly once, successfully.
    let executions = h.service.executions_for_task(&task.id, 0).unwrap();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].status, ExecutionStatus::Success);
    assert!(executions[0].output.contains("once"));

    // The trigger unregistered itself; nothing fires again.
    assert_eq!(h.scheduler.registered_count(), 0);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(h.service.executions_for_task(&task.id, 0).unwrap().len(), 1);

    h.scheduler.stop(Duration::from_secs(2)).await;
}

// ---------------------------------------------------------------------------
// Startup reload
// ---------------------------------------------------------------------------

#[tokio::test]
async fn startup_reload_schedules_enabled_tasks_and_disables_expired_one_shots() {
    let h = harness();

    // Rows as a previous process life would have left them: enabled, with
    // stale or missing trigger handles.
    let now = Utc::now();
    let mut interval_task = Task {
        id: "reload-interval".to_string(),
        name: "interval".to_string(),
        script_kind: ScriptKind::Command,
        command: "echo hi".to_string(),
        script_path: String::new(),
        schedule_spec: "@every 1h".to_string(),
        schedule_kind: ScheduleKind::Interval,
        fire_at: None,
        enabled: true,
        trigger_handle: Some(uuid::Uuid::new_v4()),
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };
    h.tasks.insert(&interval_task).unwrap();

    let expired_one_shot = Task {
        id: "reload-expired".to_string(),
        name: "expired".to_string(),
        schedule_kind: ScheduleKind::OneShot,
        schedule_spec: String::new(),
        fire_at: Some(now - chrono::Duration::hours(1)),
        ..interval_task.clone()
    };
    h.tasks.insert(&expired_one_shot).unwrap();

    let mut disabled_task = interval_task.clone();
    disabled_task.id = "reload-disabled".to_string();
    disabled_task.enabled = false;
    disabled_task.trigger_handle = None;
    h.tasks.insert(&disabled_task).unwrap();

    let scheduled = h.service.startup_reload().unwrap();
    assert_eq!(scheduled, 1);
    assert_eq!(h.scheduler.registered_count(), 1);

    interval_task = h.tasks.get("reload-interval").unwrap();
    let handle = interval_task.trigger_handle.expect("fresh handle persisted");
    assert!(h.scheduler.is_registered(handle));

    let expired = h.tasks.get("reload-expired").unwrap();
    assert!(!expired.enabled, "expired one-shot must be disabled");
    assert!(expired.trigger_handle.is_none());
}
