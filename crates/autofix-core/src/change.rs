//! Change records: the audit trail of every accepted fix.

use crate::failure::FailureKind;
use crate::fix::FixMethod;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Removed,
}

/// One added or removed line between two consecutive snapshots.
///
/// Removed lines carry `line_old` (1-based in the earlier snapshot) and the
/// removed text in `old_text`; added lines carry `line_new` (1-based in the
/// later snapshot) and the inserted text in `new_text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub iteration: u32,
    pub fix_method: FixMethod,
    pub error_type: FailureKind,
    pub change_type: ChangeType,
    pub line_old: Option<usize>,
    pub line_new: Option<usize>,
    pub old_text: String,
    pub new_text: String,
    pub reason: String,
}
