//! `cronbox-scheduler` — schedule parsing and the live trigger registry.
//!
//! # Overview
//!
//! [`spec::parse_trigger`] turns a schedule kind + raw spec string into a
//! concrete [`Trigger`]: a one-shot instant, a fixed interval, or a compiled
//! cron expression. [`registry::JobScheduler`] binds triggers to opaque
//! callbacks and fires them on independent Tokio tasks.
//!
//! # Schedule grammar
//!
//! | Input                  | Trigger                                      |
//! |------------------------|----------------------------------------------|
//! | kind = one_shot        | single fire at `fire_at` (must be future)    |
//! | `@every <duration>`    | fixed interval (`250ms`, `10s`, `1h30m`, …)  |
//! | anything else          | cron; 6-field input drops the seconds field  |
//!
//! Cron expressions with a field count other than 5 or 6 are handed to the
//! cron engine unchanged — it is the final validator.
//!
//! This crate knows nothing about task stores or process execution: the
//! callback passed to [`registry::JobScheduler::register`] is an opaque
//! future factory owned by the caller.

pub mod error;
pub mod registry;
pub mod spec;

pub use error::{Result, ScheduleError};
pub use registry::{JobCallback, JobFuture, JobScheduler, TriggerHandle};
pub use spec::{normalize_cron_spec, parse_duration, parse_trigger, Trigger};
