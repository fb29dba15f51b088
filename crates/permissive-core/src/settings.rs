use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::SettingsIssue;

/// Key the break scheduler occupies in a settings document.
pub const BREAK_SETTINGS_KEY: &str = "breakScheduler";

/// Persisted break-scheduler configuration and lifetime statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakSettings {
    pub enabled: bool,
    pub min_break_duration_minutes: u32,
    pub max_break_duration_minutes: u32,
    pub min_run_duration_minutes: u32,
    pub max_run_duration_minutes: u32,
    pub total_breaks_taken: u64,
    pub total_break_time_ms: u64,
}

impl Default for BreakSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            min_break_duration_minutes: 5,
            max_break_duration_minutes: 15,
            min_run_duration_minutes: 60,
            max_run_duration_minutes: 120,
            total_breaks_taken: 0,
            total_break_time_ms: 0,
        }
    }
}

/// Fields taken from a document and the ones that were skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub applied: Vec<String>,
    pub warnings: Vec<SettingsIssue>,
}

impl BreakSettings {
    /// Raises the maximum when the new minimum exceeds it.
    pub fn set_min_break_minutes(&mut self, minutes: i64) {
        self.min_break_duration_minutes = clamp_minutes(minutes);
        if self.min_break_duration_minutes > self.max_break_duration_minutes {
            self.max_break_duration_minutes = self.min_break_duration_minutes;
        }
    }

    /// Never drops below the current minimum.
    pub fn set_max_break_minutes(&mut self, minutes: i64) {
        self.max_break_duration_minutes =
            clamp_minutes(minutes).max(self.min_break_duration_minutes);
    }

    pub fn set_min_run_minutes(&mut self, minutes: i64) {
        self.min_run_duration_minutes = clamp_minutes(minutes);
        if self.min_run_duration_minutes > self.max_run_duration_minutes {
            self.max_run_duration_minutes = self.min_run_duration_minutes;
        }
    }

    pub fn set_max_run_minutes(&mut self, minutes: i64) {
        self.max_run_duration_minutes = clamp_minutes(minutes).max(self.min_run_duration_minutes);
    }

    /// Apply the `breakScheduler` object of a settings document.
    ///
    /// Missing fields keep their current value and mistyped fields are
    /// skipped with a warning, so a damaged document never aborts loading.
    pub fn apply_json(&mut self, document: &Value) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();
        let Some(section) = document.get(BREAK_SETTINGS_KEY) else {
            return outcome;
        };
        let Some(obj) = section.as_object() else {
            outcome.warnings.push(SettingsIssue {
                field: BREAK_SETTINGS_KEY.to_string(),
                message: "expected an object".to_string(),
            });
            return outcome;
        };

        if let Some(v) = field(obj, "enabled", Value::as_bool, &mut outcome) {
            self.enabled = v;
        }
        if let Some(v) = field(obj, "minBreakDurationMinutes", Value::as_i64, &mut outcome) {
            self.set_min_break_minutes(v);
        }
        if let Some(v) = field(obj, "maxBreakDurationMinutes", Value::as_i64, &mut outcome) {
            self.set_max_break_minutes(v);
        }
        if let Some(v) = field(obj, "minRunDurationMinutes", Value::as_i64, &mut outcome) {
            self.set_min_run_minutes(v);
        }
        if let Some(v) = field(obj, "maxRunDurationMinutes", Value::as_i64, &mut outcome) {
            self.set_max_run_minutes(v);
        }
        if let Some(v) = field(obj, "totalBreaksTaken", Value::as_u64, &mut outcome) {
            self.total_breaks_taken = v;
        }
        if let Some(v) = field(obj, "totalBreakTimeMs", Value::as_u64, &mut outcome) {
            self.total_break_time_ms = v;
        }
        outcome
    }

    /// Write these settings into `document` under [`BREAK_SETTINGS_KEY`],
    /// keeping every other top-level key.
    pub fn merge_into(&self, document: Value) -> Value {
        let mut obj = match document {
            Value::Object(obj) => obj,
            _ => Map::new(),
        };
        let section = serde_json::to_value(self).unwrap_or(Value::Null);
        obj.insert(BREAK_SETTINGS_KEY.to_string(), section);
        Value::Object(obj)
    }
}

fn clamp_minutes(minutes: i64) -> u32 {
    minutes.clamp(0, i64::from(u32::MAX)) as u32
}

fn field<T>(
    obj: &Map<String, Value>,
    name: &str,
    read: fn(&Value) -> Option<T>,
    outcome: &mut ApplyOutcome,
) -> Option<T> {
    let raw = obj.get(name)?;
    match read(raw) {
        Some(v) => {
            outcome.applied.push(name.to_string());
            Some(v)
        }
        None => {
            tracing::warn!(field = name, value = %raw, "ignoring malformed break setting");
            outcome.warnings.push(SettingsIssue {
                field: name.to_string(),
                message: format!("unexpected value {raw}"),
            });
            None
        }
    }
}
