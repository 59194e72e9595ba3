use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::warn;
use uuid::Uuid;

use crate::db::init_db;
use crate::error::{Result, StoreError};
use cronbox_core::{ScheduleKind, ScriptKind, Task};

/// Task persistence as the engine consumes it.
///
/// `delete` is a soft delete: the row gains a `deleted_at` marker and
/// disappears from every query, but execution history keeps pointing at it.
/// The store never invents identity or timestamps — callers pass complete
/// rows.
pub trait TaskStore: Send + Sync {
    fn insert(&self, task: &Task) -> Result<()>;
    fn get(&self, id: &str) -> Result<Task>;
    fn update(&self, task: &Task) -> Result<()>;
    fn delete(&self, id: &str) -> Result<()>;
    fn list_enabled(&self) -> Result<Vec<Task>>;
    fn list_all(&self) -> Result<Vec<Task>>;
}

const TASK_COLUMNS: &str = "id, name, script_kind, command, script_path, schedule_spec,
     schedule_kind, fire_at, enabled, trigger_handle, created_at, updated_at, deleted_at";

/// SQLite-backed [`TaskStore`].
pub struct SqliteTaskStore {
    conn: Mutex<Connection>,
}

impl SqliteTaskStore {
    /// Wrap `conn`, initialising the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn query_tasks(&self, where_clause: &str) -> Result<Vec<Task>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE {where_clause} ORDER BY created_at"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], task_row)?
            .collect::<rusqlite::Result<Vec<TaskRow>>>()?;

        // Rows that no longer parse (hand-edited database, downgrade) are
        // skipped with a warning rather than poisoning the whole listing.
        Ok(rows
            .into_iter()
            .filter_map(|row| match parse_task(row) {
                Ok(task) => Some(task),
                Err(e) => {
                    warn!(error = %e, "skipping unparseable task row");
                    None
                }
            })
            .collect())
    }
}

impl TaskStore for SqliteTaskStore {
    fn insert(&self, task: &Task) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO tasks
             (id, name, script_kind, command, script_path, schedule_spec,
              schedule_kind, fire_at, enabled, trigger_handle, created_at, updated_at, deleted_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,NULL)",
            rusqlite::params![
                task.id,
                task.name,
                task.script_kind.to_string(),
                task.command,
                task.script_path,
                task.schedule_spec,
                task.schedule_kind.to_string(),
                task.fire_at.map(|t| t.to_rfc3339()),
                task.enabled,
                task.trigger_handle.map(|h| h.to_string()),
                task.created_at.to_rfc3339(),
                task.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Task> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1 AND deleted_at IS NULL"
        );
        let row = conn
            .query_row(&sql, [id], task_row)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::TaskNotFound {
                    id: id.to_string(),
                },
                other => StoreError::Database(other),
            })?;
        parse_task(row)
    }

    fn update(&self, task: &Task) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE tasks SET
                name = ?2, script_kind = ?3, command = ?4, script_path = ?5,
                schedule_spec = ?6, schedule_kind = ?7, fire_at = ?8,
                enabled = ?9, trigger_handle = ?10, updated_at = ?11
             WHERE id = ?1 AND deleted_at IS NULL",
            rusqlite::params![
                task.id,
                task.name,
                task.script_kind.to_string(),
                task.command,
                task.script_path,
                task.schedule_spec,
                task.schedule_kind.to_string(),
                task.fire_at.map(|t| t.to_rfc3339()),
                task.enabled,
                task.trigger_handle.map(|h| h.to_string()),
                task.updated_at.to_rfc3339(),
            ],
        )?;
        if n == 0 {
            return Err(StoreError::TaskNotFound {
                id: task.id.clone(),
            });
        }
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let n = conn.execute(
            "UPDATE tasks SET deleted_at = ?2, updated_at = ?2
             WHERE id = ?1 AND deleted_at IS NULL",
            rusqlite::params![id, now],
        )?;
        if n == 0 {
            return Err(StoreError::TaskNotFound { id: id.to_string() });
        }
        Ok(())
    }

    fn list_enabled(&self) -> Result<Vec<Task>> {
        self.query_tasks("enabled = 1 AND deleted_at IS NULL")
    }

    fn list_all(&self) -> Result<Vec<Task>> {
        self.query_tasks("deleted_at IS NULL")
    }
}

type TaskRow = (
    String,         // id
    String,         // name
    String,         // script_kind
    String,         // command
    String,         // script_path
    String,         // schedule_spec
    String,         // schedule_kind
    Option<String>, // fire_at
    bool,           // enabled
    Option<String>, // trigger_handle
    String,         // created_at
    String,         // updated_at
    Option<String>, // deleted_at
);

fn task_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
        row.get(12)?,
    ))
}

fn parse_task(row: TaskRow) -> Result<Task> {
    let (
        id,
        name,
        script_kind,
        command,
        script_path,
        schedule_spec,
        schedule_kind,
        fire_at,
        enabled,
        trigger_handle,
        created_at,
        updated_at,
        deleted_at,
    ) = row;

    Ok(Task {
        id,
        name,
        script_kind: ScriptKind::from_str(&script_kind).map_err(StoreError::Corrupt)?,
        command,
        script_path,
        schedule_spec,
        schedule_kind: ScheduleKind::from_str(&schedule_kind).map_err(StoreError::Corrupt)?,
        fire_at: fire_at.as_deref().map(parse_timestamp).transpose()?,
        enabled,
        trigger_handle: trigger_handle
            .as_deref()
            .map(|s| Uuid::parse_str(s).map_err(|e| StoreError::Corrupt(e.to_string())))
            .transpose()?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
        deleted_at: deleted_at.as_deref().map(parse_timestamp).transpose()?,
    })
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp '{raw}': {e}")))
}
