use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a task's command is provided.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptKind {
    /// An inline shell command stored directly on the task.
    #[default]
    Command,
    /// A bash script materialized to disk and invoked via `/bin/bash`.
    Shell,
    /// A python script materialized to disk and invoked via `python3`.
    Python,
}

impl std::fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScriptKind::Command => "command",
            ScriptKind::Shell => "shell",
            ScriptKind::Python => "python",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ScriptKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "command" => Ok(ScriptKind::Command),
            "shell" => Ok(ScriptKind::Shell),
            "python" => Ok(ScriptKind::Python),
            other => Err(format!("unknown script kind: {other}")),
        }
    }
}

/// Which schedule grammar governs a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleKind {
    /// Standard 5-field cron expression (6-field input is normalized).
    #[default]
    Cron,
    /// Fixed interval written as `@every <duration>`.
    Interval,
    /// Single fire at an absolute UTC instant, then auto-disabled.
    OneShot,
}

impl std::fmt::Display for ScheduleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScheduleKind::Cron => "cron",
            ScheduleKind::Interval => "interval",
            ScheduleKind::OneShot => "one_shot",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ScheduleKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "cron" => Ok(ScheduleKind::Cron),
            "interval" => Ok(ScheduleKind::Interval),
            "one_shot" => Ok(ScheduleKind::OneShot),
            other => Err(format!("unknown schedule kind: {other}")),
        }
    }
}

/// Lifecycle state of one execution record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// The spawned process has not exited yet.
    Running,
    /// Process exited with status zero.
    Success,
    /// Spawn failure or non-zero exit.
    Failed,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "running" => Ok(ExecutionStatus::Running),
            "success" => Ok(ExecutionStatus::Success),
            "failed" => Ok(ExecutionStatus::Failed),
            other => Err(format!("unknown execution status: {other}")),
        }
    }
}

/// A persisted task definition.
///
/// `command` is the resolved shell invocation and is always populated: the
/// raw user text for [`ScriptKind::Command`], or `<interpreter> <path>` for
/// materialized scripts. `trigger_handle` is present exactly when the task
/// is enabled and its most recent scheduling attempt succeeded — the live
/// timer is owned by the scheduler, the row only holds this back-reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// UUID v4 string, primary key.
    pub id: String,
    /// Human-readable label.
    pub name: String,
    pub script_kind: ScriptKind,
    /// Resolved shell invocation, always populated.
    pub command: String,
    /// Path of the materialized script relative to the scripts directory.
    /// Empty iff `script_kind` is `Command`.
    pub script_path: String,
    /// Raw cron or `@every` text. Meaningless for one-shot tasks.
    pub schedule_spec: String,
    pub schedule_kind: ScheduleKind,
    /// Absolute fire instant — required and future-dated iff one-shot.
    pub fire_at: Option<DateTime<Utc>>,
    pub enabled: bool,
    /// Back-reference to the live scheduler registration, if any.
    pub trigger_handle: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker; deleted rows are invisible to queries.
    pub deleted_at: Option<DateTime<Utc>>,
}

/// One recorded run of a task.
///
/// Created with `status = Running` the instant a trigger fires, then mutated
/// once, in place, to a terminal status when the process exits. Rows are
/// never deleted by the engine and may outlive their task (audit trail —
/// `task_id` is a weak reference, not ownership).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecution {
    /// UUID v4 string, primary key.
    pub id: String,
    /// Owning task id; the task row may since have been deleted.
    pub task_id: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    /// Absent while the process is still running.
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall-clock runtime in milliseconds; absent while running.
    pub duration_ms: Option<i64>,
    /// Combined stdout + stderr text.
    pub output: String,
    /// Populated only on failure.
    pub error: Option<String>,
}

/// Aggregate execution counters across all tasks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub total: i64,
    pub success: i64,
    pub failed: i64,
    /// Percentage of successful runs over all runs; 0 when there are none.
    pub success_rate: f64,
}
