use rusqlite::Connection;

use crate::error::Result;

/// Initialise the cronbox schema in `conn`.
///
/// Creates the `tasks` and `task_executions` tables (idempotent) plus the
/// indexes backing the hot queries: enabled-task reload at startup and
/// started-at-ordered history listings.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS tasks (
            id             TEXT    NOT NULL PRIMARY KEY,
            name           TEXT    NOT NULL,
            script_kind    TEXT    NOT NULL DEFAULT 'command',
            command        TEXT    NOT NULL DEFAULT '',  -- resolved shell invocation
            script_path    TEXT    NOT NULL DEFAULT '',  -- relative path, '' for inline commands
            schedule_spec  TEXT    NOT NULL,
            schedule_kind  TEXT    NOT NULL DEFAULT 'cron',
            fire_at        TEXT,               -- ISO-8601, one-shot tasks only
            enabled        INTEGER NOT NULL DEFAULT 1,
            trigger_handle TEXT,               -- UUID of the live registration
            created_at     TEXT    NOT NULL,
            updated_at     TEXT    NOT NULL,
            deleted_at     TEXT                -- soft-delete marker
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_tasks_enabled
            ON tasks (enabled) WHERE deleted_at IS NULL;

        CREATE TABLE IF NOT EXISTS task_executions (
            id           TEXT    NOT NULL PRIMARY KEY,
            task_id      TEXT    NOT NULL,   -- weak reference; task may be deleted
            status       TEXT    NOT NULL DEFAULT 'running',
            started_at   TEXT    NOT NULL,
            completed_at TEXT,               -- NULL while running
            duration_ms  INTEGER,            -- NULL while running
            output       TEXT    NOT NULL DEFAULT '',
            error        TEXT
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_executions_task_started
            ON task_executions (task_id, started_at);
        CREATE INDEX IF NOT EXISTS idx_executions_started
            ON task_executions (started_at);
        ",
    )?;
    Ok(())
}
