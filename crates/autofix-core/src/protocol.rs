//! Boundary contracts: the sandbox seam and the Execute / Repair wire shapes.

use crate::change::ChangeRecord;
use crate::failure::ExecutionResult;
use crate::session::{RepairStatus, SessionReport};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

// ═══════════════════════════════════════════════════════════════════════════
//  SANDBOX
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("sandbox unavailable: {0}")]
    Unavailable(String),
    #[error("sandbox I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

pub type SandboxFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ExecutionResult, SandboxError>> + Send + 'a>>;

/// Runs one snapshot in isolation and reports what happened.
///
/// Implementations enforce their own time ceiling: a run that exceeds it must
/// come back as an `ExecutionResult` with `timed_out` set, never hang.
pub trait Sandbox: Send + Sync {
    fn execute<'a>(&'a self, source: &'a str) -> SandboxFuture<'a>;
}

// ═══════════════════════════════════════════════════════════════════════════
//  EXECUTE
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteRequest {
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecuteResponse {
    pub stdout: String,
    pub stderr: String,
    /// `"NONE"` when the program ran cleanly.
    pub error_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub full_error: String,
}

// ═══════════════════════════════════════════════════════════════════════════
//  REPAIR
// ═══════════════════════════════════════════════════════════════════════════

/// Iteration budget as sent by callers: either a JSON number or a numeric string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MaxIterations {
    Count(i64),
    Text(String),
}

impl MaxIterations {
    /// Resolve to a positive budget.
    pub fn resolve(&self) -> Result<u32, String> {
        let value = match self {
            MaxIterations::Count(n) => *n,
            MaxIterations::Text(raw) => raw
                .trim()
                .parse::<i64>()
                .map_err(|_| format!("max_iterations must be a positive integer, got {raw:?}"))?,
        };
        if value <= 0 {
            return Err(format!(
                "max_iterations must be a positive integer, got {value}"
            ));
        }
        Ok(u32::try_from(value).unwrap_or(u32::MAX))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepairRequest {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub max_iterations: Option<MaxIterations>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LastIteration {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParsedError {
    pub last_iteration: LastIteration,
    /// `"SUCCESS"` or `"FAILURE"`.
    pub final_status: String,
    pub status: RepairStatus,
    pub total_iterations: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairResponse {
    pub final_code: String,
    pub changes: Vec<ChangeRecord>,
    pub parsed_error: ParsedError,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_path: Option<String>,
}

impl RepairResponse {
    /// Wire view of a finished session. `last_iteration` mirrors the final sandbox run.
    pub fn from_report(report: &SessionReport, report_path: Option<String>) -> Self {
        let last_iteration = report
            .iterations
            .last()
            .map(|run| LastIteration {
                stdout: run.stdout.clone(),
                stderr: run.stderr.clone(),
            })
            .unwrap_or_default();
        Self {
            final_code: report.final_code.clone(),
            changes: report.changes.clone(),
            parsed_error: ParsedError {
                last_iteration,
                final_status: report.status.final_label().to_string(),
                status: report.status,
                total_iterations: report.total_iterations,
            },
            report_path,
        }
    }
}
