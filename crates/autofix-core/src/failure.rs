//! Execution results and the structured failure they classify into.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Output of one sandbox run. Transient: owned by the iteration that produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    /// Process exit code. `None` when the process was killed by a signal.
    pub exit_status: Option<i32>,
    pub duration: Duration,
    /// Set when either captured stream hit the output cap.
    pub truncated: bool,
    pub timed_out: bool,
}

impl ExecutionResult {
    pub fn exited_cleanly(&self) -> bool {
        !self.timed_out && self.exit_status == Some(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    None,
    RuntimeError,
    SyntaxError,
    SemanticMismatch,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::None => "NONE",
            FailureKind::RuntimeError => "RUNTIME_ERROR",
            FailureKind::SyntaxError => "SYNTAX_ERROR",
            FailureKind::SemanticMismatch => "SEMANTIC_MISMATCH",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a snapshot failed, or that it did not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDescriptor {
    pub kind: FailureKind,
    /// Exception class name as reported by the interpreter (e.g. `IndexError`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
    pub message: String,
    /// 1-based line in the snapshot, when the traceback pointed at one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl FailureDescriptor {
    pub fn none() -> Self {
        Self {
            kind: FailureKind::None,
            exception: None,
            message: String::new(),
            line: None,
        }
    }

    pub fn runtime(exception: Option<&str>, message: impl Into<String>, line: Option<usize>) -> Self {
        Self {
            kind: FailureKind::RuntimeError,
            exception: exception.map(str::to_string),
            message: message.into(),
            line,
        }
    }

    pub fn syntax(exception: &str, message: impl Into<String>, line: Option<usize>) -> Self {
        Self {
            kind: FailureKind::SyntaxError,
            exception: Some(exception.to_string()),
            message: message.into(),
            line,
        }
    }

    /// A static finding raised before anything ran.
    pub fn semantic(message: impl Into<String>, line: Option<usize>) -> Self {
        Self {
            kind: FailureKind::SemanticMismatch,
            exception: None,
            message: message.into(),
            line,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.kind != FailureKind::None
    }

    pub fn exception_is(&self, name: &str) -> bool {
        self.exception.as_deref() == Some(name)
    }

    /// One-line human summary, e.g. `IndexError at line 5: list index out of range`.
    pub fn summary(&self) -> String {
        if !self.is_failure() {
            return "no failure".to_string();
        }
        let head = self
            .exception
            .clone()
            .unwrap_or_else(|| self.kind.as_str().to_string());
        match (self.line, self.message.is_empty()) {
            (Some(line), false) => format!("{head} at line {line}: {}", self.message),
            (Some(line), true) => format!("{head} at line {line}"),
            (None, false) => format!("{head}: {}", self.message),
            (None, true) => head,
        }
    }
}
