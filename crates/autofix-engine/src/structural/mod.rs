//! Structural fixer: deterministic syntax-tree rewrites keyed on the failure.
//!
//! Every rule produces one localized `LineEdit`. A miss is the expected
//! `NoApplicableRule` outcome and hands control to the generative fixer.

mod bounds;
mod imports;
mod punctuation;
mod returns;

use autofix_core::syntax::SourceTree;
use autofix_core::{FailureDescriptor, FailureKind, FixCandidate, FixMethod, LineEdit, Snapshot};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no structural rule applies")]
pub struct NoApplicableRule;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuralRule {
    BisectionUpperBound,
    LoopRangeOverrun,
    FloatIndexDivision,
    MissingReturn,
    UndefinedNameImport,
    MissingColon,
    UnclosedBracket,
    UnmatchedCloser,
}

impl StructuralRule {
    pub const ALL: [StructuralRule; 8] = [
        StructuralRule::BisectionUpperBound,
        StructuralRule::LoopRangeOverrun,
        StructuralRule::FloatIndexDivision,
        StructuralRule::MissingReturn,
        StructuralRule::UndefinedNameImport,
        StructuralRule::MissingColon,
        StructuralRule::UnclosedBracket,
        StructuralRule::UnmatchedCloser,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StructuralRule::BisectionUpperBound => "bisection-upper-bound",
            StructuralRule::LoopRangeOverrun => "loop-range-overrun",
            StructuralRule::FloatIndexDivision => "float-index-division",
            StructuralRule::MissingReturn => "missing-return",
            StructuralRule::UndefinedNameImport => "undefined-name-import",
            StructuralRule::MissingColon => "missing-colon",
            StructuralRule::UnclosedBracket => "unclosed-bracket",
            StructuralRule::UnmatchedCloser => "unmatched-closer",
        }
    }

    /// Whether the failure has the shape this rule targets.
    fn handles(self, failure: &FailureDescriptor) -> bool {
        let message = failure.message.as_str();
        match self {
            StructuralRule::BisectionUpperBound | StructuralRule::LoopRangeOverrun => {
                failure.exception_is("IndexError")
            }
            StructuralRule::FloatIndexDivision => {
                failure.exception_is("TypeError") && message.contains("indices must be integers")
            }
            StructuralRule::MissingReturn => {
                failure.exception_is("TypeError") && message.contains("NoneType")
            }
            StructuralRule::UndefinedNameImport => failure.exception_is("NameError"),
            StructuralRule::MissingColon => failure.kind == FailureKind::SyntaxError,
            StructuralRule::UnclosedBracket => {
                failure.kind == FailureKind::SyntaxError
                    && (message.contains("was never closed") || message.contains("unexpected EOF"))
            }
            StructuralRule::UnmatchedCloser => {
                failure.kind == FailureKind::SyntaxError
                    && (message.contains("unmatched") || message.contains("does not match"))
            }
        }
    }

    fn propose(self, tree: &SourceTree<'_>, failure: &FailureDescriptor) -> Option<LineEdit> {
        match self {
            StructuralRule::BisectionUpperBound => bounds::bisection_upper_bound(tree, failure),
            StructuralRule::LoopRangeOverrun => bounds::loop_range_overrun(tree, failure),
            StructuralRule::FloatIndexDivision => bounds::float_index_division(tree, failure),
            StructuralRule::MissingReturn => returns::missing_return(tree, failure),
            StructuralRule::UndefinedNameImport => imports::undefined_name_import(tree, failure),
            StructuralRule::MissingColon => punctuation::missing_colon(tree, failure),
            StructuralRule::UnclosedBracket => punctuation::unclosed_bracket(tree, failure),
            StructuralRule::UnmatchedCloser => punctuation::unmatched_closer(tree, failure),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StructuralFixer {
    rules: Vec<StructuralRule>,
}

impl Default for StructuralFixer {
    fn default() -> Self {
        Self {
            rules: StructuralRule::ALL.to_vec(),
        }
    }
}

impl StructuralFixer {
    pub fn with_rules(rules: Vec<StructuralRule>) -> Self {
        Self { rules }
    }

    /// First rule that matches the failure and actually changes the source wins.
    pub fn attempt(
        &self,
        snapshot: &Snapshot,
        failure: &FailureDescriptor,
    ) -> Result<FixCandidate, NoApplicableRule> {
        let source = snapshot.source();
        let tree = SourceTree::parse(source).map_err(|_| NoApplicableRule)?;

        for rule in self.rules.iter().copied().filter(|r| r.handles(failure)) {
            let Some(edit) = rule.propose(&tree, failure) else {
                continue;
            };
            let Some(proposed) = edit.apply(source) else {
                debug!(rule = rule.name(), "structural edit fell outside the snapshot");
                continue;
            };
            if proposed == source {
                continue;
            }
            debug!(rule = rule.name(), line = edit.start_line, "structural rule matched");
            return Ok(FixCandidate {
                method: FixMethod::Ast,
                proposed,
                confidence: 1.0,
                edit: Some(edit),
                rationale: rule.name().to_string(),
            });
        }
        Err(NoApplicableRule)
    }
}

/// Replace `source[start..end]` and express the result as an edit of the lines it touches.
pub(crate) fn edit_replacing(
    source: &str,
    start: usize,
    end: usize,
    replacement: &str,
) -> Option<LineEdit> {
    let before = source.get(..start)?;
    let after = source.get(end..)?;
    let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
    let line_end = after.find('\n').map(|i| end + i).unwrap_or(source.len());

    let old = source.get(line_start..line_end)?;
    let new = format!(
        "{}{}{}",
        source.get(line_start..start)?,
        replacement,
        source.get(end..line_end)?
    );
    Some(LineEdit {
        start_line: before[..line_start].matches('\n').count() + 1,
        removed: old.split('\n').count(),
        inserted: new.split('\n').map(str::to_string).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use autofix_core::SnapshotChain;

    fn attempt(source: &str, failure: FailureDescriptor) -> Result<FixCandidate, NoApplicableRule> {
        let chain = SnapshotChain::new(source);
        StructuralFixer::default().attempt(chain.current(), &failure)
    }

    #[test]
    fn binary_search_index_error_adjusts_upper_bound() {
        let source = "def binary_search(arr, target):\n    lo, hi = 0, len(arr)\n    while lo <= hi:\n        mid = (lo + hi) // 2\n        if arr[mid] == target:\n            return mid\n        elif arr[mid] < target:\n            lo = mid + 1\n        else:\n            hi = mid - 1\n    return -1\n\nprint(binary_search([1, 2, 3], 4))\n";
        let failure =
            FailureDescriptor::runtime(Some("IndexError"), "list index out of range", Some(5));
        let candidate = attempt(source, failure).unwrap();

        assert_eq!(candidate.method, FixMethod::Ast);
        assert_eq!(candidate.confidence, 1.0);
        assert_eq!(candidate.rationale, "bisection-upper-bound");
        assert!(candidate.proposed.contains("lo, hi = 0, len(arr) - 1\n"));
        let edit = candidate.edit.unwrap();
        assert_eq!(edit.start_line, 2);
        assert_eq!(edit.removed, 1);
    }

    #[test]
    fn unknown_failure_has_no_rule() {
        let failure = FailureDescriptor::runtime(Some("RecursionError"), "maximum recursion depth exceeded", Some(2));
        assert_eq!(
            attempt("def f(n):\n    return f(n - 1)\n", failure),
            Err(NoApplicableRule)
        );
    }

    #[test]
    fn edit_replacing_covers_whole_lines() {
        let source = "a = 1\nb = len(x)\nc = 3\n";
        let start = source.find("len(x)").unwrap();
        let edit = edit_replacing(source, start, start + 6, "len(x) - 1").unwrap();
        assert_eq!(edit, LineEdit::replace_line(2, "b = len(x) - 1"));
        assert_eq!(edit.apply(source).unwrap(), "a = 1\nb = len(x) - 1\nc = 3\n");
    }
}
