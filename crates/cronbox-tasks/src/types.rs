use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cronbox_core::{ScheduleKind, ScriptKind};

/// Operator intent for creating or updating a task.
///
/// `content` is the inline command text for [`ScriptKind::Command`] or the
/// full script body for the script kinds — the resolved command and script
/// path are derived, never supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub script_kind: ScriptKind,
    #[serde(default)]
    pub schedule_spec: String,
    #[serde(default)]
    pub schedule_kind: ScheduleKind,
    /// Required for one-shot tasks, ignored otherwise.
    #[serde(default)]
    pub fire_at: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}
