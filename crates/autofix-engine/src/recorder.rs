//! Change recorder: derive the audit trail from two snapshots.
//!
//! Records are never maintained by hand. Every accepted merge is diffed
//! line-by-line against the previous snapshot, so the patch list always
//! matches the snapshot chain.

use autofix_core::{ChangeRecord, ChangeType, FailureKind, FixMethod};
use similar::{ChangeTag, TextDiff};
use std::borrow::Cow;

/// Provenance shared by every record of one accepted change.
#[derive(Debug, Clone, Copy)]
pub struct ChangeContext<'a> {
    pub iteration: u32,
    pub method: FixMethod,
    pub kind: FailureKind,
    /// Rule name for structural fixes, merge mode for generative ones.
    pub detail: &'a str,
    pub line: Option<usize>,
}

impl ChangeContext<'_> {
    fn reason(&self, verb: &str) -> String {
        let mut reason = format!("{verb} by {} ({}) for {}", self.method, self.detail, self.kind);
        if let Some(line) = self.line {
            reason.push_str(&format!(" at line {line}"));
        }
        reason
    }
}

/// One record per added or removed line between `prev` and `next`.
///
/// Line endings and a missing final newline are not changes.
pub fn record(prev: &str, next: &str, ctx: &ChangeContext<'_>) -> Vec<ChangeRecord> {
    let (prev, next) = (terminated(prev), terminated(next));
    let diff = TextDiff::from_lines(prev.as_ref(), next.as_ref());
    let mut records = Vec::new();
    for change in diff.iter_all_changes() {
        let text = strip_terminator(change.value()).to_string();
        let record = match change.tag() {
            ChangeTag::Equal => continue,
            ChangeTag::Delete => ChangeRecord {
                iteration: ctx.iteration,
                fix_method: ctx.method,
                error_type: ctx.kind,
                change_type: ChangeType::Removed,
                line_old: change.old_index().map(|i| i + 1),
                line_new: None,
                old_text: text,
                new_text: String::new(),
                reason: ctx.reason("Removed"),
            },
            ChangeTag::Insert => ChangeRecord {
                iteration: ctx.iteration,
                fix_method: ctx.method,
                error_type: ctx.kind,
                change_type: ChangeType::Added,
                line_old: None,
                line_new: change.new_index().map(|i| i + 1),
                old_text: String::new(),
                new_text: text,
                reason: ctx.reason("Added"),
            },
        };
        records.push(record);
    }
    records
}

fn strip_terminator(line: &str) -> &str {
    line.strip_suffix('\n').unwrap_or(line)
}

/// LF line endings with a final newline on any non-empty text.
fn terminated(text: &str) -> Cow<'_, str> {
    let mut text = if text.contains('\r') {
        Cow::Owned(text.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(text)
    };
    if !text.is_empty() && !text.ends_with('\n') {
        text.to_mut().push('\n');
    }
    text
}

/// Rebuild the later snapshot from the earlier one and the records of a
/// single change. Returns `None` when the records do not fit `prev`.
///
/// The rebuilt text always ends with a newline when it is non-empty.
pub fn apply_records(prev: &str, records: &[ChangeRecord]) -> Option<String> {
    let prev = terminated(prev);
    let old: Vec<&str> = prev.split_terminator('\n').collect();
    let removed: Vec<usize> = records
        .iter()
        .filter(|r| r.change_type == ChangeType::Removed)
        .map(|r| r.line_old)
        .collect::<Option<Vec<_>>>()?;
    let mut added: Vec<(usize, &str)> = records
        .iter()
        .filter(|r| r.change_type == ChangeType::Added)
        .map(|r| r.line_new.map(|n| (n, r.new_text.as_str())))
        .collect::<Option<Vec<_>>>()?;
    added.sort_by_key(|(n, _)| *n);

    if removed.iter().any(|n| *n == 0 || *n > old.len()) {
        return None;
    }
    let mut kept = old
        .iter()
        .enumerate()
        .filter(|(i, _)| !removed.contains(&(i + 1)))
        .map(|(_, l)| *l);

    let total = old.len().checked_sub(removed.len())? + added.len();
    let mut out: Vec<&str> = Vec::with_capacity(total);
    let mut added = added.into_iter().peekable();
    for n in 1..=total {
        match added.peek() {
            Some(&(line, text)) if line == n => {
                out.push(text);
                added.next();
            }
            _ => out.push(kept.next()?),
        }
    }
    if added.next().is_some() || kept.next().is_some() {
        return None;
    }
    if out.is_empty() {
        return Some(String::new());
    }
    let mut text = out.join("\n");
    text.push('\n');
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(line: Option<usize>) -> ChangeContext<'static> {
        ChangeContext {
            iteration: 1,
            method: FixMethod::Ast,
            kind: FailureKind::RuntimeError,
            detail: "bisection-upper-bound",
            line,
        }
    }

    #[test]
    fn replaced_line_yields_removed_then_added() {
        let prev = "lo, hi = 0, len(arr)\nwhile lo <= hi:\n";
        let next = "lo, hi = 0, len(arr) - 1\nwhile lo <= hi:\n";
        let records = record(prev, next, &ctx(Some(5)));
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].change_type, ChangeType::Removed);
        assert_eq!(records[0].line_old, Some(1));
        assert_eq!(records[0].old_text, "lo, hi = 0, len(arr)");
        assert_eq!(
            records[0].reason,
            "Removed by AST (bisection-upper-bound) for RUNTIME_ERROR at line 5"
        );

        assert_eq!(records[1].change_type, ChangeType::Added);
        assert_eq!(records[1].line_new, Some(1));
        assert_eq!(records[1].new_text, "lo, hi = 0, len(arr) - 1");
        assert!(records[1].reason.starts_with("Added by AST"));
    }

    #[test]
    fn reason_omits_missing_line() {
        let records = record("a\n", "b\n", &ctx(None));
        assert_eq!(
            records[0].reason,
            "Removed by AST (bisection-upper-bound) for RUNTIME_ERROR"
        );
    }

    #[test]
    fn identical_snapshots_have_no_records() {
        assert!(record("x = 1\n", "x = 1\n", &ctx(None)).is_empty());
    }

    #[test]
    fn records_reconstruct_the_later_snapshot() {
        let pairs = [
            ("a\nb\nc\n", "a\nB\nc\n"),
            ("a\nb\nc\n", "x\na\nc\nd\ne\n"),
            ("import math\n\ndef f():\n    pass\n", "def f():\n    return 1\n\nprint(f())\n"),
            ("one\n", ""),
            ("", "new\nfile\n"),
        ];
        for (prev, next) in pairs {
            let records = record(prev, next, &ctx(None));
            assert_eq!(
                apply_records(prev, &records).as_deref(),
                Some(next),
                "{prev:?} -> {next:?}"
            );
        }
    }

    #[test]
    fn missing_final_newline_is_not_a_change() {
        let records = record("x = 1\nprint(y)", "x = 2\nprint(y)\n", &ctx(None));
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].change_type, ChangeType::Removed);
        assert_eq!(records[0].line_old, Some(1));
        assert_eq!(records[0].old_text, "x = 1");
        assert_eq!(records[1].change_type, ChangeType::Added);
        assert_eq!(records[1].line_new, Some(1));
        assert_eq!(records[1].new_text, "x = 2");
        assert_eq!(
            apply_records("x = 1\nprint(y)", &records).as_deref(),
            Some("x = 2\nprint(y)\n")
        );

        assert!(record("print(y)", "print(y)\n", &ctx(None)).is_empty());
    }

    #[test]
    fn crlf_endings_are_not_a_change() {
        let records = record("a = 1\r\nb = 2\r\n", "a = 1\nb = 3\n", &ctx(None));
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].old_text, "b = 2");
        assert_eq!(records[1].new_text, "b = 3");
        assert_eq!(records[1].line_new, Some(2));
    }

    #[test]
    fn records_that_do_not_fit_are_refused() {
        let records = record("a\nb\nc\n", "a\nc\n", &ctx(None));
        assert_eq!(apply_records("a\n", &records), None);
    }
}
