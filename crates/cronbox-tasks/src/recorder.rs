use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use cronbox_core::{ExecutionStatus, TaskExecution};
use cronbox_exec::RunReport;
use cronbox_store::ExecutionStore;

/// Two-phase execution recording.
///
/// Phase one writes a `running` record the instant a trigger fires, so
/// external viewers can see in-flight executions; phase two mutates that
/// same record to a terminal status once the process exits. Neither phase
/// is allowed to block or fail the run itself — observability is
/// best-effort, and a store failure degrades to a log line (a record stuck
/// at `running` is acceptable, not fatal).
pub struct ExecutionRecorder {
    store: Arc<dyn ExecutionStore>,
}

impl ExecutionRecorder {
    pub fn new(store: Arc<dyn ExecutionStore>) -> Self {
        Self { store }
    }

    /// Phase one: persist a fresh `running` record for `task_id`.
    pub fn begin(&self, task_id: &str) -> TaskExecution {
        let execution = TaskExecution {
            id: Uuid::new_v4().to_string(),
            task_id: task_id.to_string(),
            status: ExecutionStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            output: String::new(),
            error: None,
        };

        if let Err(e) = self.store.insert(&execution) {
            warn!(task_id = %task_id, error = %e, "failed to create execution record");
        }
        execution
    }

    /// Phase two: mutate the record to its terminal status.
    pub fn finish(&self, mut execution: TaskExecution, report: &RunReport) -> TaskExecution {
        execution.status = if report.success {
            ExecutionStatus::Success
        } else {
            ExecutionStatus::Failed
        };
        execution.completed_at = Some(Utc::now());
        execution.duration_ms = Some(report.duration_ms);
        execution.output = report.output.clone();
        execution.error = report.error.clone();

        if let Err(e) = self.store.update(&execution) {
            warn!(
                execution_id = %execution.id,
                error = %e,
                "failed to update execution record; it stays marked running"
            );
        }
        execution
    }

    /// Startup sweep: fail every record a previous process life left in
    /// `running`. Keeps crash-interrupted runs visible as failures instead
    /// of eternally-running ghosts.
    pub fn mark_interrupted_on_startup(&self) {
        match self.store.mark_interrupted("interrupted by process restart") {
            Ok(0) => {}
            Ok(count) => info!(count, "marked interrupted executions from previous run"),
            Err(e) => warn!(error = %e, "interrupted-execution sweep failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cronbox_store::SqliteExecutionStore;
    use rusqlite::Connection;

    fn recorder_with_store() -> (ExecutionRecorder, Arc<SqliteExecutionStore>) {
        let store = Arc::new(
            SqliteExecutionStore::new(Connection::open_in_memory().unwrap()).unwrap(),
        );
        let dyn_store: Arc<dyn ExecutionStore> = store.clone();
        (ExecutionRecorder::new(dyn_store), store)
    }

    #[test]
    fn begin_persists_a_running_record() {
        let (recorder, store) = recorder_with_store();
        let execution = recorder.begin("t1");

        let listed = store.list_by_task("t1", 0).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, execution.id);
        assert_eq!(listed[0].status, ExecutionStatus::Running);
        assert!(listed[0].completed_at.is_none());
        assert!(listed[0].duration_ms.is_none());
    }

    #[test]
    fn finish_moves_the_same_record_to_terminal_state() {
        let (recorder, store) = recorder_with_store();
        let execution = recorder.begin("t1");

        let report = RunReport {
            success: false,
            output: "boom\n".to_string(),
            error: Some("exit status 1".to_string()),
            duration_ms: 17,
        };
        let finished = recorder.finish(execution, &report);
        assert_eq!(finished.status, ExecutionStatus::Failed);

        let listed = store.list_by_task("t1", 0).unwrap();
        assert_eq!(listed.len(), 1, "finish must mutate, not append");
        assert_eq!(listed[0].status, ExecutionStatus::Failed);
        assert_eq!(listed[0].output, "boom\n");
        assert_eq!(listed[0].error.as_deref(), Some("exit status 1"));
        assert_eq!(listed[0].duration_ms, Some(17));
    }

    #[test]
    fn startup_sweep_fails_stale_running_records() {
        let (recorder, store) = recorder_with_store();
        recorder.begin("t1");
        recorder.mark_interrupted_on_startup();

        let listed = store.list_by_task("t1", 0).unwrap();
        assert_eq!(listed[0].status, ExecutionStatus::Failed);
        assert_eq!(
            listed[0].error.as_deref(),
            Some("interrupted by process restart")
        );
    }
}
