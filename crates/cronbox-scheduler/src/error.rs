use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors from schedule parsing and trigger registration.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// The cron/interval text (or missing fire time) cannot be parsed.
    #[error("Invalid schedule spec: {0}")]
    InvalidSpec(String),

    /// A one-shot fire time that is not in the future.
    #[error("One-shot fire time has already passed: {0}")]
    Expired(DateTime<Utc>),

    /// The scheduler has been shut down and accepts no new registrations.
    #[error("Scheduler is stopped")]
    SchedulerStopped,
}

pub type Result<T> = std::result::Result<T, ScheduleError>;
