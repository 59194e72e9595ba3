use chrono::{DateTime, Utc};
use croner::Cron;
use std::time::Duration;

use crate::error::{Result, ScheduleError};
use cronbox_core::ScheduleKind;

/// A concrete timed trigger, ready to register with the scheduler.
#[derive(Debug)]
pub enum Trigger {
    /// Fire exactly once at an absolute UTC instant.
    OneShot { at: DateTime<Utc> },
    /// Fire repeatedly on a fixed cadence.
    Interval { every: Duration },
    /// Fire on a compiled 5-field cron expression.
    Cron { pattern: Cron, expr: String },
}

impl Trigger {
    pub fn is_one_shot(&self) -> bool {
        matches!(self, Trigger::OneShot { .. })
    }

    /// The first fire instant at or after `now`, or `None` when the trigger
    /// has nothing left to do (a one-shot whose instant already passed, or a
    /// cron expression with no future occurrence).
    pub fn first_fire(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Trigger::OneShot { at } => (*at > now).then_some(*at),
            Trigger::Interval { every } => Some(now + interval_delta(*every)),
            Trigger::Cron { pattern, .. } => pattern.find_next_occurrence(&now, false).ok(),
        }
    }

    /// The fire instant following the one scheduled at `prev`.
    ///
    /// Computed from the previous *scheduled* instant, not from when its
    /// callback finished, so execution time does not shift the cadence. A
    /// callback that overran its slot delays the next fire to `now` instead
    /// of accumulating a backlog of missed slots.
    pub fn next_fire(&self, prev: DateTime<Utc>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Trigger::OneShot { .. } => None,
            Trigger::Interval { every } => {
                let candidate = prev + interval_delta(*every);
                Some(candidate.max(now))
            }
            Trigger::Cron { pattern, .. } => {
                let from = prev.max(now);
                pattern.find_next_occurrence(&from, false).ok()
            }
        }
    }
}

fn interval_delta(every: Duration) -> chrono::Duration {
    chrono::Duration::milliseconds(every.as_millis() as i64)
}

/// Parse a schedule kind + raw spec string into a [`Trigger`].
///
/// Rules:
/// - `one_shot` requires `fire_at`; a fire time at or before `now` is
///   [`ScheduleError::Expired`] — the caller disables the task instead of
///   scheduling it.
/// - A spec starting with the literal token `@every` is a fixed interval;
///   the remainder must be a single duration.
/// - Anything else is treated as cron. Six whitespace-separated fields drop
///   the leading seconds field; five pass through unchanged; any other
///   field count is handed to the cron engine as-is, which rejects it.
pub fn parse_trigger(
    kind: ScheduleKind,
    spec: &str,
    fire_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<Trigger> {
    if kind == ScheduleKind::OneShot {
        let at = fire_at.ok_or_else(|| {
            ScheduleError::InvalidSpec("one-shot schedule requires a fire time".to_string())
        })?;
        if at <= now {
            return Err(ScheduleError::Expired(at));
        }
        return Ok(Trigger::OneShot { at });
    }

    let trimmed = spec.trim();
    if trimmed.starts_with("@every") {
        return Ok(Trigger::Interval {
            every: parse_every(trimmed)?,
        });
    }

    let normalized = normalize_cron_spec(trimmed);
    let pattern = Cron::new(&normalized)
        .parse()
        .map_err(|e| ScheduleError::InvalidSpec(format!("cron expression '{normalized}': {e}")))?;
    Ok(Trigger::Cron {
        pattern,
        expr: normalized,
    })
}

/// Normalize a cron spec to the 5-field form (minute hour dom month dow).
///
/// A 6-field spec is assumed to carry a leading seconds field, which is
/// dropped. Field counts other than 5 or 6 are returned unchanged — the
/// cron engine is the final validator.
pub fn normalize_cron_spec(spec: &str) -> String {
    let parts: Vec<&str> = spec.split_whitespace().collect();
    if parts.len() == 6 {
        return parts[1..].join(" ");
    }
    spec.to_string()
}

/// Parse the `@every <duration>` interval form.
fn parse_every(spec: &str) -> Result<Duration> {
    let parts: Vec<&str> = spec.split_whitespace().collect();
    if parts.len() != 2 || parts[0] != "@every" {
        return Err(ScheduleError::InvalidSpec(format!(
            "invalid interval format: {spec}"
        )));
    }
    parse_duration(parts[1])
}

/// Parse a duration like `250ms`, `10s`, `5m`, `1h30m`, `2d`.
///
/// Integer values with unit suffixes, concatenation allowed. A zero total
/// is rejected — a zero-interval trigger would spin.
pub fn parse_duration(text: &str) -> Result<Duration> {
    let invalid = || ScheduleError::InvalidSpec(format!("invalid duration: {text}"));

    if text.is_empty() {
        return Err(invalid());
    }

    let bytes = text.as_bytes();
    let mut total_ms: u64 = 0;
    let mut i = 0;
    while i < bytes.len() {
        let digits_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == digits_start {
            return Err(invalid());
        }
        let value: u64 = text[digits_start..i].parse().map_err(|_| invalid())?;

        let unit_start = i;
        while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
            i += 1;
        }
        let factor_ms: u64 = match &text[unit_start..i] {
            "ms" => 1,
            "s" => 1_000,
            "m" => 60_000,
            "h" => 3_600_000,
            "d" => 86_400_000,
            _ => return Err(invalid()),
        };

        total_ms = value
            .checked_mul(factor_ms)
            .and_then(|ms| total_ms.checked_add(ms))
            .ok_or_else(invalid)?;
    }

    if total_ms == 0 {
        return Err(invalid());
    }
    Ok(Duration::from_millis(total_ms))
}
