//! `cronbox-tasks` — the task lifecycle orchestrator.
//!
//! [`TaskService`] is the single owner of the coupling between a task row,
//! its materialized script file, and its live trigger registration. Every
//! create/update/delete/toggle sequences the three resources with explicit
//! rollback on partial failure; the scheduler's fire callback lands back
//! here, where the command is executed and its outcome recorded.
//!
//! No other component may create or remove a trigger for a task without
//! going through this crate.

pub mod error;
pub mod recorder;
pub mod script;
pub mod service;
pub mod types;

pub use error::{Result, TaskError};
pub use recorder::ExecutionRecorder;
pub use script::ScriptMaterializer;
pub use service::TaskService;
pub use types::TaskSpec;
