use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{Result, TaskError};
use crate::recorder::ExecutionRecorder;
use crate::script::ScriptMaterializer;
use crate::types::TaskSpec;
use cronbox_core::{ExecutionStats, ScheduleKind, ScriptKind, Task, TaskExecution};
use cronbox_exec::{CommandRunner, RunOutcome};
use cronbox_scheduler::{parse_trigger, JobCallback, JobScheduler, TriggerHandle};
use cronbox_store::{ExecutionStore, TaskStore};

/// The task lifecycle orchestrator.
///
/// Owns the coupling between a task row, its script file, and its live
/// trigger: every lifecycle operation sequences the three with explicit
/// rollback on partial failure, and the scheduler's fire callbacks land in
/// [`fire_task`](Self::fire_task).
///
/// Concurrency: lifecycle calls run on the caller's task and may race a
/// concurrent fire of the same task — a fire already in flight when an
/// update lands may execute either the old or the new version of the task
/// (the callback re-reads the row when it fires, not during execution).
/// Concurrent updates to the same task id must be serialized by the caller;
/// the service does not lock per task.
pub struct TaskService {
    tasks: Arc<dyn TaskStore>,
    executions: Arc<dyn ExecutionStore>,
    scheduler: Arc<JobScheduler>,
    scripts: ScriptMaterializer,
    recorder: ExecutionRecorder,
    runner: CommandRunner,
}

impl TaskService {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        executions: Arc<dyn ExecutionStore>,
        scheduler: Arc<JobScheduler>,
        scripts_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            tasks,
            executions: Arc::clone(&executions),
            scheduler,
            scripts: ScriptMaterializer::new(scripts_dir),
            recorder: ExecutionRecorder::new(executions),
            runner: CommandRunner::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle operations
    // -----------------------------------------------------------------------

    /// Create a task: validate, insert, materialize, register, persist.
    ///
    /// Any failure after the row insert rolls back everything already
    /// committed for this attempt — no partial task is left behind.
    pub async fn create_task(self: &Arc<Self>, spec: TaskSpec) -> Result<Task> {
        self.scripts.validate(&spec.content)?;
        validate_one_shot(&spec)?;

        let now = Utc::now();
        let mut task = Task {
            id: Uuid::new_v4().to_string(),
            name: spec.name.clone(),
            script_kind: spec.script_kind,
            command: String::new(),
            script_path: String::new(),
            schedule_spec: spec.schedule_spec.clone(),
            schedule_kind: spec.schedule_kind,
            fire_at: spec.fire_at,
            enabled: spec.enabled,
            trigger_handle: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        // The row goes in first so the script filename can be derived from a
        // committed id; command and path are still placeholders here.
        self.tasks.insert(&task)?;

        match self
            .scripts
            .materialize(&task.id, &task.name, task.script_kind, &spec.content)
        {
            Ok((script_path, command)) => {
                task.script_path = script_path;
                task.command = command;
            }
            Err(e) => {
                self.discard_row(&task.id);
                return Err(e);
            }
        }

        if task.enabled {
            match self.register_task(&task) {
                Ok(handle) => task.trigger_handle = Some(handle),
                Err(e) => {
                    self.discard_script(&task);
                    self.discard_row(&task.id);
                    return Err(e);
                }
            }
        }

        task.updated_at = Utc::now();
        if let Err(e) = self.tasks.update(&task) {
            if let Some(handle) = task.trigger_handle {
                self.scheduler.unregister(handle);
            }
            self.discard_script(&task);
            self.discard_row(&task.id);
            return Err(TaskError::PersistFailed(e.to_string()));
        }

        info!(task_id = %task.id, name = %task.name, enabled = task.enabled, "task created");
        Ok(task)
    }

    /// Update a task in place: unregister the old trigger, replace the
    /// script file, re-register if still enabled, persist.
    ///
    /// Failure to unregister the old trigger is logged, never aborts the
    /// update. A final-persist failure rolls back the newly registered
    /// trigger.
    pub async fn update_task(self: &Arc<Self>, id: &str, spec: TaskSpec) -> Result<Task> {
        self.scripts.validate(&spec.content)?;
        validate_one_shot(&spec)?;

        let mut task = self.tasks.get(id)?;

        if let Some(handle) = task.trigger_handle.take() {
            if !self.scheduler.unregister(handle) {
                warn!(task_id = %task.id, handle = %handle, "stale trigger handle on update");
            }
        }

        let old_path = task.script_path.clone();
        let (script_path, command) = self.scripts.rematerialize(
            &task.id,
            &spec.name,
            spec.script_kind,
            &spec.content,
            &old_path,
        )?;

        task.name = spec.name;
        task.script_kind = spec.script_kind;
        task.command = command;
        task.script_path = script_path;
        task.schedule_spec = spec.schedule_spec;
        task.schedule_kind = spec.schedule_kind;
        task.fire_at = spec.fire_at;
        task.enabled = spec.enabled;

        if task.enabled {
            let handle = self.register_task(&task)?;
            task.trigger_handle = Some(handle);
        }

        task.updated_at = Utc::now();
        if let Err(e) = self.tasks.update(&task) {
            if let Some(handle) = task.trigger_handle {
                if !self.scheduler.unregister(handle) {
                    warn!(task_id = %task.id, "failed to roll back trigger after persist failure");
                }
            }
            return Err(TaskError::PersistFailed(e.to_string()));
        }

        info!(task_id = %task.id, name = %task.name, enabled = task.enabled, "task updated");
        Ok(task)
    }

    /// Delete a task: unregister its trigger, remove the script file
    /// (failures logged, not fatal), soft-delete the row.
    pub fn delete_task(&self, id: &str) -> Result<()> {
        let task = self.tasks.get(id)?;

        if let Some(handle) = task.trigger_handle {
            // A stale handle (crash between fire and persist) must not wedge
            // deletion; unknown handles are a logged no-op.
            if !self.scheduler.unregister(handle) {
                warn!(task_id = %task.id, handle = %handle, "stale trigger handle on delete");
            }
        }

        if let Err(e) = self.scripts.delete(&task.script_path) {
            warn!(task_id = %task.id, error = %e, "failed to delete script file");
        }

        self.tasks.delete(id)?;
        info!(task_id = %id, "task deleted");
        Ok(())
    }

    /// Flip `enabled` by re-running the update path with the current
    /// content — the same code path as a content-preserving edit, not a
    /// lighter-weight flag write.
    pub async fn toggle_task(self: &Arc<Self>, id: &str) -> Result<Task> {
        let task = self.tasks.get(id)?;
        let content = self.script_content(&task);
        let spec = TaskSpec {
            name: task.name.clone(),
            content,
            script_kind: task.script_kind,
            schedule_spec: task.schedule_spec.clone(),
            schedule_kind: task.schedule_kind,
            fire_at: task.fire_at,
            enabled: !task.enabled,
        };
        self.update_task(id, spec).await
    }

    /// Current editable content of a task: the stored command for inline
    /// tasks, the full script file (header included) otherwise. Read
    /// failures degrade to an empty string with a warning.
    pub fn script_content(&self, task: &Task) -> String {
        if task.script_kind == ScriptKind::Command {
            return task.command.clone();
        }
        match self.scripts.read(&task.script_path) {
            Ok(content) => content,
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "failed to read script content");
                String::new()
            }
        }
    }

    // -----------------------------------------------------------------------
    // Firing
    // -----------------------------------------------------------------------

    /// Execute one fire of `task`: record a running execution, run the
    /// command, record the outcome. One-shot tasks are then forced to
    /// disabled and their own trigger is unregistered as the final step.
    ///
    /// A task whose resolved command is empty is a no-op — no execution
    /// record, no failure.
    pub async fn fire_task(&self, task: Task) {
        if task.command.trim().is_empty() {
            debug!(task_id = %task.id, "task has no command to execute");
            return;
        }

        info!(task_id = %task.id, name = %task.name, "executing task");
        let execution = self.recorder.begin(&task.id);

        match self.runner.run(&task.command).await {
            RunOutcome::Completed(report) => {
                if report.success {
                    info!(
                        task_id = %task.id,
                        duration_ms = report.duration_ms,
                        "task completed successfully"
                    );
                } else {
                    error!(
                        task_id = %task.id,
                        duration_ms = report.duration_ms,
                        error = report.error.as_deref().unwrap_or(""),
                        "task failed"
                    );
                }
                self.recorder.finish(execution, &report);
            }
            // Unreachable in practice (emptiness was checked above), but a
            // skip must not leave the record dangling as running forever.
            RunOutcome::Skipped => {
                debug!(task_id = %task.id, "runner skipped an empty command");
            }
        }

        if task.schedule_kind == ScheduleKind::OneShot {
            self.finalize_one_shot(&task.id);
        }
    }

    /// Re-register every enabled task from the store at process startup.
    ///
    /// Individual failures are logged and skipped, never fatal: an expired
    /// one-shot is disabled and persisted, anything else keeps its row
    /// untouched for the operator to inspect. Returns how many tasks were
    /// scheduled.
    pub fn startup_reload(self: &Arc<Self>) -> Result<usize> {
        let tasks = self.tasks.list_enabled()?;
        let total = tasks.len();
        let mut scheduled = 0;

        for mut task in tasks {
            match self.register_task(&task) {
                Ok(handle) => {
                    task.trigger_handle = Some(handle);
                    task.updated_at = Utc::now();
                    if let Err(e) = self.tasks.update(&task) {
                        warn!(task_id = %task.id, error = %e, "failed to persist trigger handle");
                    }
                    scheduled += 1;
                }
                Err(TaskError::ScheduleInPast) => {
                    info!(task_id = %task.id, name = %task.name, "one-shot fire time has passed; disabling");
                    task.enabled = false;
                    task.trigger_handle = None;
                    task.updated_at = Utc::now();
                    if let Err(e) = self.tasks.update(&task) {
                        warn!(task_id = %task.id, error = %e, "failed to disable expired one-shot task");
                    }
                }
                Err(e) => {
                    warn!(task_id = %task.id, name = %task.name, error = %e, "failed to reschedule task");
                }
            }
        }

        info!(scheduled, total, "startup reload complete");
        Ok(scheduled)
    }

    // -----------------------------------------------------------------------
    // Read side
    // -----------------------------------------------------------------------

    pub fn get_task(&self, id: &str) -> Result<Task> {
        Ok(self.tasks.get(id)?)
    }

    pub fn list_tasks(&self) -> Result<Vec<Task>> {
        Ok(self.tasks.list_all()?)
    }

    /// Executions for one task, most recent first. `limit <= 0` means all.
    pub fn executions_for_task(&self, task_id: &str, limit: i64) -> Result<Vec<TaskExecution>> {
        Ok(self.executions.list_by_task(task_id, limit)?)
    }

    /// Executions across all tasks, most recent first. `limit <= 0` means all.
    pub fn recent_executions(&self, limit: i64) -> Result<Vec<TaskExecution>> {
        Ok(self.executions.list_recent(limit)?)
    }

    pub fn execution_stats(&self) -> Result<ExecutionStats> {
        Ok(self.executions.stats()?)
    }

    /// Fail executions left `running` by a previous process life. Call once
    /// at startup, before the scheduler starts firing.
    pub fn mark_interrupted_on_startup(&self) {
        self.recorder.mark_interrupted_on_startup();
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    /// Parse the task's schedule and register its trigger. The callback
    /// captures only the task id and re-reads the row at fire time, so it
    /// always executes the then-current command.
    fn register_task(self: &Arc<Self>, task: &Task) -> Result<TriggerHandle> {
        let trigger = parse_trigger(
            task.schedule_kind,
            &task.schedule_spec,
            task.fire_at,
            Utc::now(),
        )?;
        let handle = self.scheduler.register(trigger, self.fire_callback(task.id.clone()))?;
        debug!(task_id = %task.id, handle = %handle, "trigger registered for task");
        Ok(handle)
    }

    fn fire_callback(self: &Arc<Self>, task_id: String) -> JobCallback {
        let service = Arc::clone(self);
        Arc::new(move || {
            let service = Arc::clone(&service);
            let task_id = task_id.clone();
            Box::pin(async move {
                match service.tasks.get(&task_id) {
                    Ok(task) => service.fire_task(task).await,
                    Err(e) => debug!(task_id = %task_id, error = %e, "task gone before fire; skipping"),
                }
            })
        })
    }

    /// Terminal transition for a fired one-shot: disabled, handle cleared
    /// and persisted, then the trigger unregisters itself as the last step.
    fn finalize_one_shot(&self, task_id: &str) {
        let mut task = match self.tasks.get(task_id) {
            Ok(task) => task,
            Err(e) => {
                debug!(task_id = %task_id, error = %e, "one-shot task gone before finalization");
                return;
            }
        };

        let handle = task.trigger_handle.take();
        task.enabled = false;
        task.updated_at = Utc::now();
        if let Err(e) = self.tasks.update(&task) {
            warn!(task_id = %task.id, error = %e, "failed to disable completed one-shot task");
        } else {
            info!(task_id = %task.id, name = %task.name, "one-shot task completed and disabled");
        }

        if let Some(handle) = handle {
            self.scheduler.unregister(handle);
        }
    }

    /// Best-effort row rollback during create; failure leaves only a log
    /// line, since the caller is already surfacing the original error.
    fn discard_row(&self, id: &str) {
        if let Err(e) = self.tasks.delete(id) {
            warn!(task_id = %id, error = %e, "failed to roll back task row");
        }
    }

    fn discard_script(&self, task: &Task) {
        if let Err(e) = self.scripts.delete(&task.script_path) {
            warn!(task_id = %task.id, error = %e, "failed to roll back script file");
        }
    }
}

fn validate_one_shot(spec: &TaskSpec) -> Result<()> {
    if spec.schedule_kind != ScheduleKind::OneShot {
        return Ok(());
    }
    let at = spec.fire_at.ok_or_else(|| {
        TaskError::InvalidSpec("one-shot schedule requires a fire time".to_string())
    })?;
    if at <= Utc::now() {
        return Err(TaskError::ScheduleInPast);
    }
    Ok(())
}
