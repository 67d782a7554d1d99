//! Session lifecycle status and per-iteration reports.

use crate::change::ChangeRecord;
use crate::failure::FailureKind;
use crate::fix::FixMethod;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RepairStatus {
    Running,
    Success,
    Exhausted,
    Fatal,
}

impl RepairStatus {
    pub fn is_terminal(self) -> bool {
        self != RepairStatus::Running
    }

    /// Coarse label exposed on the wire: only a clean run counts as success.
    pub fn final_label(self) -> &'static str {
        match self {
            RepairStatus::Success => "SUCCESS",
            _ => "FAILURE",
        }
    }
}

/// What happened during one sandbox run of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationReport {
    pub iteration: u32,
    pub started_at: DateTime<Utc>,
    pub snapshot_version: u64,
    pub error_type: FailureKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    /// Strategy whose candidate was accepted after this run, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_method: Option<FixMethod>,
    pub accepted: bool,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

/// Full record of a finished session, suitable for persisting as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RepairStatus,
    pub total_iterations: u32,
    pub max_iterations: u32,
    pub original_code: String,
    pub final_code: String,
    pub iterations: Vec<IterationReport>,
    pub changes: Vec<ChangeRecord>,
}
