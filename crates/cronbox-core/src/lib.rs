//! `cronbox-core` — shared domain types and configuration.
//!
//! Every other cronbox crate depends on this one. It carries the `Task` and
//! `TaskExecution` records, the small enums they embed, and the TOML + env
//! configuration loader. No I/O beyond reading the config file.

pub mod config;
pub mod error;
pub mod types;

pub use config::CronboxConfig;
pub use error::{CoreError, Result};
pub use types::{
    ExecutionStats, ExecutionStatus, ScheduleKind, ScriptKind, Task, TaskExecution,
};
