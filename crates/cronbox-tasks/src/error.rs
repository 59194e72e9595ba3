use thiserror::Error;

use cronbox_scheduler::ScheduleError;
use cronbox_store::StoreError;

/// Orchestrator-level failures, one variant per operator-visible kind.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Script content failed validation (empty, oversized, path traversal).
    #[error("Invalid script content: {0}")]
    InvalidScript(String),

    /// A one-shot fire time at or before now.
    #[error("One-shot fire time must be in the future")]
    ScheduleInPast,

    /// Unparseable cron or interval text.
    #[error("Invalid schedule spec: {0}")]
    InvalidSpec(String),

    #[error("Failed to write script file: {0}")]
    ScriptWriteFailed(String),

    #[error("Failed to delete script file: {0}")]
    ScriptDeleteFailed(String),

    /// Trigger registration rejected by the scheduler.
    #[error("Failed to schedule task: {0}")]
    ScheduleFailed(String),

    /// A store write was rejected.
    #[error("Failed to persist task: {0}")]
    PersistFailed(String),

    #[error("Task not found: {id}")]
    NotFound { id: String },
}

impl From<StoreError> for TaskError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::TaskNotFound { id } => TaskError::NotFound { id },
            other => TaskError::PersistFailed(other.to_string()),
        }
    }
}

impl From<ScheduleError> for TaskError {
    fn from(e: ScheduleError) -> Self {
        match e {
            ScheduleError::Expired(_) => TaskError::ScheduleInPast,
            ScheduleError::InvalidSpec(msg) => TaskError::InvalidSpec(msg),
            ScheduleError::SchedulerStopped => {
                TaskError::ScheduleFailed("scheduler is stopped".to_string())
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, TaskError>;
