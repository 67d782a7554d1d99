//! Fix candidates and the strategies that produce them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which strategy produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FixMethod {
    #[serde(rename = "AST")]
    Ast,
    #[serde(rename = "LLM")]
    Llm,
    #[serde(rename = "FORCED_LLM")]
    ForcedLlm,
}

impl FixMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            FixMethod::Ast => "AST",
            FixMethod::Llm => "LLM",
            FixMethod::ForcedLlm => "FORCED_LLM",
        }
    }

    pub fn is_generative(self) -> bool {
        matches!(self, FixMethod::Llm | FixMethod::ForcedLlm)
    }
}

impl fmt::Display for FixMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A localized line-range replacement.
///
/// `start_line` is 1-based. `removed` lines starting there are replaced by
/// `inserted`; `removed == 0` is a pure insertion before `start_line`
/// (`start_line == len + 1` appends).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineEdit {
    pub start_line: usize,
    pub removed: usize,
    pub inserted: Vec<String>,
}

impl LineEdit {
    pub fn replace_line(line: usize, text: impl Into<String>) -> Self {
        Self {
            start_line: line,
            removed: 1,
            inserted: vec![text.into()],
        }
    }

    pub fn insert_before(line: usize, lines: Vec<String>) -> Self {
        Self {
            start_line: line,
            removed: 0,
            inserted: lines,
        }
    }

    /// Apply to `source`. Lines outside the edited range are kept byte-for-byte,
    /// including any `\r`, and the presence of a final newline is preserved.
    /// Returns `None` when the range falls outside the source.
    pub fn apply(&self, source: &str) -> Option<String> {
        let lines: Vec<&str> = source.split_terminator('\n').collect();
        if self.start_line == 0 {
            return None;
        }
        let start = self.start_line - 1;
        let end = start.checked_add(self.removed)?;
        if start > lines.len() || end > lines.len() {
            return None;
        }

        let mut out: Vec<&str> = Vec::with_capacity(lines.len() + self.inserted.len());
        out.extend_from_slice(&lines[..start]);
        out.extend(self.inserted.iter().map(String::as_str));
        out.extend_from_slice(&lines[end..]);

        let mut text = out.join("\n");
        if source.ends_with('\n') || (source.is_empty() && !text.is_empty()) {
            text.push('\n');
        }
        Some(text)
    }
}

/// A proposed new version of the current snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct FixCandidate {
    pub method: FixMethod,
    /// Full proposed source text. Not a snapshot until it is accepted.
    pub proposed: String,
    pub confidence: f32,
    /// Present for structural fixes: the single hunk the rule touched.
    pub edit: Option<LineEdit>,
    /// Short label of what produced the candidate (rule name or model).
    pub rationale: String,
}
