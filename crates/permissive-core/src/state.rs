use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The two duty-cycle phases of the break scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakPhase {
    Running,
    OnBreak,
}

/// Point-in-time view of a break scheduler, for status output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakSnapshot {
    pub enabled: bool,
    pub phase: BreakPhase,
    pub status: String,
    pub remaining_run_ms: u64,
    pub remaining_break_ms: u64,
    pub total_breaks_taken: u64,
    pub total_break_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub break_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_break_started: Option<DateTime<Utc>>,
    pub taken_at: DateTime<Utc>,
}
