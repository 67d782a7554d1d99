//! Surface repair: deterministic text normalization applied to every accepted
//! candidate before it reaches the sandbox.
//!
//! The pass never changes program meaning. It removes transport residue
//! (chat tokens, markdown fences, commentary around the code) and layout
//! noise, then checks that the result parses.

use autofix_core::syntax::{self, SourceTree};

/// Special tokens some chat models leak into completions.
const CHAT_TOKENS: &[&str] = &[
    "<|im_start|>",
    "<|im_end|>",
    "<|endoftext|>",
    "<|eot_id|>",
    "<|end|>",
];

const CHAT_ROLES: &[&str] = &["assistant", "user", "system"];

const PYTHON_KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield", "print",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SurfaceRejection {
    #[error("candidate is empty after cleanup")]
    Empty,
    #[error("candidate still has {errors} syntax error(s) (current snapshot has {baseline})")]
    Malformed { errors: usize, baseline: usize },
}

/// Normalize `candidate` and check it is fit to replace `current`.
///
/// A cleaned candidate is accepted when it parses cleanly, or when `current`
/// is itself malformed and the candidate strictly reduces the error count.
pub fn repair(candidate: &str, current: &str) -> Result<String, SurfaceRejection> {
    let cleaned = normalize(candidate);
    if cleaned.trim().is_empty() {
        return Err(SurfaceRejection::Empty);
    }
    let errors = syntax::error_count(&cleaned);
    if errors == 0 {
        return Ok(cleaned);
    }
    let baseline = syntax::error_count(current);
    if baseline > 0 && errors < baseline {
        return Ok(cleaned);
    }
    Err(SurfaceRejection::Malformed { errors, baseline })
}

/// All normalization steps, in order. Idempotent.
pub fn normalize(text: &str) -> String {
    let text = normalize_newlines(text);
    let text = strip_commentary(&text);
    let text = expand_mixed_tabs(&text);
    let text = strip_trailing_whitespace(&text);
    finish_lines(&text)
}

fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Remove chat tokens, fence lines and the prose a model wraps around code.
pub fn strip_commentary(text: &str) -> String {
    let mut resolved: Vec<String> = Vec::new();
    for line in text.split('\n') {
        if line.trim_start().starts_with("```") {
            continue;
        }
        if !CHAT_TOKENS.iter().any(|t| line.contains(t)) {
            resolved.push(line.to_string());
            continue;
        }
        let stripped = CHAT_TOKENS
            .iter()
            .fold(line.to_string(), |acc, token| acc.replace(token, ""));
        let rest = stripped.trim();
        if !rest.is_empty() && !CHAT_ROLES.contains(&rest) {
            resolved.push(stripped);
        }
    }

    strip_prose_edges(&resolved).join("\n")
}

/// Drop leading and trailing prose lines, but only in a combination that
/// leaves the text with no more parse errors than before. Text that already
/// parses is returned whole, so the opening or closing line of a multi-line
/// statement is never taken for a sentence.
fn strip_prose_edges(lines: &[String]) -> &[String] {
    let mut lead = 0;
    for (i, line) in lines.iter().enumerate() {
        if is_prose(line) {
            lead = i + 1;
        } else if !line.trim().is_empty() {
            break;
        }
    }
    let mut trail = lines.len();
    for (i, line) in lines.iter().enumerate().skip(lead).rev() {
        if is_prose(line) {
            trail = i;
        } else if !line.trim().is_empty() {
            break;
        }
    }
    if lead == 0 && trail == lines.len() {
        return lines;
    }

    let errors = |range: &[String]| syntax::error_count(&range.join("\n"));
    let baseline = errors(lines);
    if baseline == 0 {
        return lines;
    }
    [(lead, trail), (lead, lines.len()), (0, trail)]
        .into_iter()
        .map(|(from, to)| &lines[from..to])
        .map(|range| (errors(range), range))
        .filter(|(count, _)| *count <= baseline)
        .min_by_key(|(count, _)| *count)
        .map(|(_, range)| range)
        .unwrap_or(lines)
}

/// A flush-left natural-language sentence that does not parse as Python.
fn is_prose(line: &str) -> bool {
    if line.starts_with(char::is_whitespace) {
        return false;
    }
    let trimmed = line.trim();
    let Some(first) = trimmed.split_whitespace().next() else {
        return false;
    };
    if !first.starts_with(|c: char| c.is_alphabetic()) || PYTHON_KEYWORDS.contains(&first) {
        return false;
    }
    let word = first.trim_end_matches([',', ':', '.', '!']);
    if !word.chars().all(|c| c.is_alphabetic() || c == '\'') {
        return false;
    }
    if trimmed.split_whitespace().count() < 3 && !trimmed.ends_with(':') {
        return false;
    }
    !syntax::is_well_formed(trimmed)
}

/// Lines inside a multi-line string literal whose layout is string content.
///
/// For a literal spanning lines `a..=b`, the trailing text of lines `a..b`
/// and the leading text of lines `a+1..=b` belong to the string.
fn string_interior(text: &str) -> Vec<(usize, usize)> {
    SourceTree::parse(text)
        .map(|tree| tree.multiline_string_lines())
        .unwrap_or_default()
}

fn in_ranges(ranges: &[(usize, usize)], pred: impl Fn(usize, usize) -> bool) -> bool {
    ranges.iter().any(|(a, b)| pred(*a, *b))
}

fn leading_ws(line: &str) -> &str {
    &line[..line.len() - line.trim_start().len()]
}

fn expand_mixed_tabs(text: &str) -> String {
    let strings = string_interior(text);
    let code_lines = || {
        text.split('\n')
            .enumerate()
            .filter(|(idx, _)| !in_ranges(&strings, |a, b| a < idx + 1 && idx + 1 <= b))
            .map(|(_, line)| leading_ws(line))
    };
    let has_tabs = code_lines().any(|ws| ws.contains('\t'));
    let has_spaces = code_lines().any(|ws| ws.contains(' '));
    if !(has_tabs && has_spaces) {
        return text.to_string();
    }

    text.split('\n')
        .enumerate()
        .map(|(idx, line)| {
            let n = idx + 1;
            if in_ranges(&strings, |a, b| a < n && n <= b) {
                return line.to_string();
            }
            let ws = leading_ws(line);
            format!("{}{}", ws.replace('\t', "    "), &line[ws.len()..])
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn strip_trailing_whitespace(text: &str) -> String {
    let strings = string_interior(text);
    text.split('\n')
        .enumerate()
        .map(|(idx, line)| {
            let n = idx + 1;
            if in_ranges(&strings, |a, b| a <= n && n < b) {
                line
            } else {
                line.trim_end()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Drop blank lines at both ends and terminate with exactly one newline.
fn finish_lines(text: &str) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let Some(first) = lines.iter().position(|l| !l.trim().is_empty()) else {
        return String::new();
    };
    let last = lines
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .unwrap_or(first);
    let mut out = lines[first..=last].join("\n");
    out.push('\n');
    out
}
