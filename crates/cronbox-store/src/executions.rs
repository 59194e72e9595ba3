use std::str::FromStr;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::Connection;
use tracing::warn;

use crate::db::init_db;
use crate::error::{Result, StoreError};
use crate::tasks::parse_timestamp;
use cronbox_core::{ExecutionStats, ExecutionStatus, TaskExecution};

/// Execution-history persistence.
///
/// Rows are written in two phases — inserted as `running` at fire time,
/// updated once to a terminal status — and never deleted by the engine.
/// `mark_interrupted` is the startup sweep that flips rows left `running`
/// by a dead process to `failed`.
pub trait ExecutionStore: Send + Sync {
    fn insert(&self, execution: &TaskExecution) -> Result<()>;
    fn update(&self, execution: &TaskExecution) -> Result<()>;
    /// Executions for one task, most recent first. `limit <= 0` means all.
    fn list_by_task(&self, task_id: &str, limit: i64) -> Result<Vec<TaskExecution>>;
    /// Executions across all tasks, most recent first. `limit <= 0` means all.
    fn list_recent(&self, limit: i64) -> Result<Vec<TaskExecution>>;
    fn stats(&self) -> Result<ExecutionStats>;
    /// Flip every `running` row to `failed` with `reason`; returns how many.
    fn mark_interrupted(&self, reason: &str) -> Result<usize>;
}

const EXECUTION_COLUMNS: &str =
    "id, task_id, status, started_at, completed_at, duration_ms, output, error";

/// SQLite-backed [`ExecutionStore`].
pub struct SqliteExecutionStore {
    conn: Mutex<Connection>,
}

impl SqliteExecutionStore {
    /// Wrap `conn`, initialising the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

// Rows that no longer parse are skipped with a warning rather than
// poisoning the whole listing.
fn collect_executions(rows: Vec<ExecutionRow>) -> Vec<TaskExecution> {
    rows.into_iter()
        .filter_map(|row| match parse_execution(row) {
            Ok(execution) => Some(execution),
            Err(e) => {
                warn!(error = %e, "skipping unparseable execution row");
                None
            }
        })
        .collect()
}

impl ExecutionStore for SqliteExecutionStore {
    fn insert(&self, execution: &TaskExecution) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO task_executions
             (id, task_id, status, started_at, completed_at, duration_ms, output, error)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
            rusqlite::params![
                execution.id,
                execution.task_id,
                execution.status.to_string(),
                execution.started_at.to_rfc3339(),
                execution.completed_at.map(|t| t.to_rfc3339()),
                execution.duration_ms,
                execution.output,
                execution.error,
            ],
        )?;
        Ok(())
    }

    fn update(&self, execution: &TaskExecution) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE task_executions SET
                status = ?2, completed_at = ?3, duration_ms = ?4, output = ?5, error = ?6
             WHERE id = ?1",
            rusqlite::params![
                execution.id,
                execution.status.to_string(),
                execution.completed_at.map(|t| t.to_rfc3339()),
                execution.duration_ms,
                execution.output,
                execution.error,
            ],
        )?;
        if n == 0 {
            return Err(StoreError::ExecutionNotFound {
                id: execution.id.clone(),
            });
        }
        Ok(())
    }

    fn list_by_task(&self, task_id: &str, limit: i64) -> Result<Vec<TaskExecution>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {EXECUTION_COLUMNS} FROM task_executions
             WHERE task_id = ?1 ORDER BY started_at DESC LIMIT ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                rusqlite::params![task_id, effective_limit(limit)],
                execution_row,
            )?
            .collect::<rusqlite::Result<Vec<ExecutionRow>>>()?;
        Ok(collect_executions(rows))
    }

    fn list_recent(&self, limit: i64) -> Result<Vec<TaskExecution>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {EXECUTION_COLUMNS} FROM task_executions
             ORDER BY started_at DESC LIMIT ?1"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params![effective_limit(limit)], execution_row)?
            .collect::<rusqlite::Result<Vec<ExecutionRow>>>()?;
        Ok(collect_executions(rows))
    }

    fn stats(&self) -> Result<ExecutionStats> {
        let conn = self.conn.lock().unwrap();
        let total: i64 =
            conn.query_row("SELECT COUNT(*) FROM task_executions", [], |r| r.get(0))?;
        let success: i64 = conn.query_row(
            "SELECT COUNT(*) FROM task_executions WHERE status = 'success'",
            [],
            |r| r.get(0),
        )?;
        let failed: i64 = conn.query_row(
            "SELECT COUNT(*) FROM task_executions WHERE status = 'failed'",
            [],
            |r| r.get(0),
        )?;

        let success_rate = if total > 0 {
            success as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        Ok(ExecutionStats {
            total,
            success,
            failed,
            success_rate,
        })
    }

    fn mark_interrupted(&self, reason: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let n = conn.execute(
            "UPDATE task_executions SET status = 'failed', completed_at = ?1, error = ?2
             WHERE status = 'running'",
            rusqlite::params![now, reason],
        )?;
        Ok(n)
    }
}

// SQLite treats LIMIT -1 as "no limit".
fn effective_limit(limit: i64) -> i64 {
    if limit > 0 {
        limit
    } else {
        -1
    }
}

type ExecutionRow = (
    String,         // id
    String,         // task_id
    String,         // status
    String,         // started_at
    Option<String>, // completed_at
    Option<i64>,    // duration_ms
    String,         // output
    Option<String>, // error
);

fn execution_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ExecutionRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn parse_execution(row: ExecutionRow) -> Result<TaskExecution> {
    let (id, task_id, status, started_at, completed_at, duration_ms, output, error) = row;
    Ok(TaskExecution {
        id,
        task_id,
        status: ExecutionStatus::from_str(&status).map_err(StoreError::Corrupt)?,
        started_at: parse_timestamp(&started_at)?,
        completed_at: completed_at.as_deref().map(parse_timestamp).transpose()?,
        duration_ms,
        output,
        error,
    })
}
