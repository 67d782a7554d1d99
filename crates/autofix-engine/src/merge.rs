//! Merge strategy: reconcile an accepted candidate into the current snapshot.
//!
//! Structural candidates carry a single `LineEdit` and are applied in place.
//! Generative candidates are whole files and go through a line diff: equal
//! regions keep the current snapshot's lines, changed regions take the
//! candidate's lines. Low-similarity candidates replace the file wholesale
//! instead of producing a hybrid.
//!
//! Merge output is not yet a snapshot. The surface pass that follows converts
//! every line ending to LF and trims trailing whitespace outside strings, so
//! kept lines survive with their content but not their original terminators.

use autofix_core::syntax::{Definition, SourceTree};
use autofix_core::FixCandidate;
use similar::{DiffTag, TextDiff};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    LocalizedHunk,
    Spliced,
    DefinitionSplice,
    FullReplacement,
}

impl MergeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            MergeMode::LocalizedHunk => "localized hunk",
            MergeMode::Spliced => "diff splice",
            MergeMode::DefinitionSplice => "definition splice",
            MergeMode::FullReplacement => "full replacement",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub source: String,
    pub mode: MergeMode,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MergeRejection {
    #[error("candidate does not change the snapshot")]
    NoChange,
    #[error("candidate looks truncated ({candidate_lines} of {current_lines} lines)")]
    Truncation {
        candidate_lines: usize,
        current_lines: usize,
    },
    #[error("candidate adds {new_definitions} definitions and {new_imports} imports")]
    Hallucination {
        new_definitions: usize,
        new_imports: usize,
    },
    #[error("edit anchor at line {line} is outside the snapshot")]
    AnchorOutOfRange { line: usize },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergePolicy {
    pub max_new_definitions: usize,
    pub max_new_imports: usize,
    /// Candidates shorter than this share of the current line count are fragments.
    pub fragment_ratio: f32,
    /// Diff similarity at or above which a generative candidate is spliced.
    pub splice_ratio: f32,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            max_new_definitions: 12,
            max_new_imports: 8,
            fragment_ratio: 0.75,
            splice_ratio: 0.5,
        }
    }
}

impl MergePolicy {
    pub fn merge(
        &self,
        current: &str,
        candidate: &FixCandidate,
    ) -> Result<MergeOutcome, MergeRejection> {
        if let Some(edit) = &candidate.edit {
            let source = edit
                .apply(current)
                .ok_or(MergeRejection::AnchorOutOfRange {
                    line: edit.start_line,
                })?;
            if source == current {
                return Err(MergeRejection::NoChange);
            }
            return Ok(MergeOutcome {
                source,
                mode: MergeMode::LocalizedHunk,
            });
        }
        self.merge_whole_file(current, &candidate.proposed)
    }

    fn merge_whole_file(
        &self,
        current: &str,
        proposed: &str,
    ) -> Result<MergeOutcome, MergeRejection> {
        let ours = normalize_lines(current);
        let theirs = normalize_lines(proposed);
        if ours == theirs || theirs.trim().is_empty() {
            return Err(MergeRejection::NoChange);
        }

        let ours_tree = SourceTree::parse(&ours).ok();
        let theirs_tree = SourceTree::parse(&theirs).ok();
        let ours_defs = ours_tree
            .as_ref()
            .map(|t| t.top_level_definitions())
            .unwrap_or_default();
        let theirs_defs = theirs_tree
            .as_ref()
            .map(|t| t.top_level_definitions())
            .unwrap_or_default();

        let known: HashSet<&str> = ours_defs.iter().map(|d| d.name.as_str()).collect();
        let new_definitions = theirs_defs
            .iter()
            .filter(|d| !known.contains(d.name.as_str()))
            .count();
        let known_modules: HashSet<String> = ours_tree
            .as_ref()
            .map(|t| t.imported_modules().into_iter().collect())
            .unwrap_or_default();
        let new_imports = theirs_tree
            .as_ref()
            .map(|t| {
                t.imported_modules()
                    .into_iter()
                    .filter(|m| !known_modules.contains(m))
                    .count()
            })
            .unwrap_or(0);
        if new_definitions > self.max_new_definitions || new_imports > self.max_new_imports {
            return Err(MergeRejection::Hallucination {
                new_definitions,
                new_imports,
            });
        }

        let current_lines = ours.lines().count();
        let candidate_lines = theirs.lines().count();
        if (candidate_lines as f32) < current_lines as f32 * self.fragment_ratio {
            let is_fragment = !theirs_defs.is_empty() && new_definitions == 0;
            if !is_fragment {
                return Err(MergeRejection::Truncation {
                    candidate_lines,
                    current_lines,
                });
            }
            let source = splice_definitions(current, &ours_defs, &theirs, &theirs_defs);
            if normalize_lines(&source) == ours {
                return Err(MergeRejection::NoChange);
            }
            return Ok(MergeOutcome {
                source,
                mode: MergeMode::DefinitionSplice,
            });
        }

        let diff = TextDiff::from_lines(ours.as_str(), theirs.as_str());
        if diff.ratio() < self.splice_ratio {
            return Ok(MergeOutcome {
                source: theirs,
                mode: MergeMode::FullReplacement,
            });
        }

        let raw: Vec<&str> = current.split_terminator('\n').collect();
        let incoming: Vec<&str> = theirs.split_terminator('\n').collect();
        let mut out: Vec<&str> = Vec::with_capacity(incoming.len());
        for op in diff.ops() {
            let (tag, old_range, new_range) = op.as_tag_tuple();
            match tag {
                DiffTag::Equal => out.extend(old_range.filter_map(|i| raw.get(i).copied())),
                DiffTag::Delete => {}
                DiffTag::Insert | DiffTag::Replace => {
                    out.extend(new_range.filter_map(|i| incoming.get(i).copied()))
                }
            }
        }
        Ok(MergeOutcome {
            source: join_lines(&out),
            mode: MergeMode::Spliced,
        })
    }
}

/// CRLF to LF, trailing whitespace trimmed, one final newline.
fn normalize_lines(text: &str) -> String {
    let lines: Vec<&str> = text
        .split_terminator('\n')
        .map(|l| l.trim_end())
        .collect();
    join_lines(&lines)
}

fn join_lines(lines: &[&str]) -> String {
    if lines.is_empty() {
        return String::new();
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Replace each same-named top-level definition of `current` with the
/// fragment's version, leaving every other line untouched.
fn splice_definitions(
    current: &str,
    ours: &[Definition],
    fragment: &str,
    theirs: &[Definition],
) -> String {
    let mut lines: Vec<String> = current
        .split_terminator('\n')
        .map(str::to_string)
        .collect();
    let fragment_lines: Vec<&str> = fragment.split_terminator('\n').collect();

    let mut targets: Vec<(&Definition, &Definition)> = theirs
        .iter()
        .filter_map(|t| ours.iter().find(|o| o.name == t.name).map(|o| (o, t)))
        .collect();
    targets.sort_by(|a, b| b.0.start_line.cmp(&a.0.start_line));

    for (ours, theirs) in targets {
        let Some(replacement) = fragment_lines.get(theirs.start_line - 1..theirs.end_line) else {
            continue;
        };
        if ours.end_line > lines.len() {
            continue;
        }
        lines.splice(
            ours.start_line - 1..ours.end_line,
            replacement.iter().map(|l| l.to_string()),
        );
    }
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    join_lines(&refs)
}
