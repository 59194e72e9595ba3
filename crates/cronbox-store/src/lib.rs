//! `cronbox-store` — persistence for tasks and execution history.
//!
//! The engine consumes two narrow interfaces, [`TaskStore`] and
//! [`ExecutionStore`]; this crate provides both traits and their SQLite
//! implementations. Rows use rfc3339 TEXT timestamps and STRICT tables.
//! Tasks are soft-deleted (a `deleted_at` marker) so execution rows can
//! outlive their task for auditing; executions are never deleted by the
//! engine at all.

pub mod db;
pub mod error;
pub mod executions;
pub mod tasks;

pub use error::{Result, StoreError};
pub use executions::{ExecutionStore, SqliteExecutionStore};
pub use tasks::{SqliteTaskStore, TaskStore};
