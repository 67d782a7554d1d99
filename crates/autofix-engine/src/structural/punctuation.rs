//! Punctuation rules for syntax errors: missing colons and unbalanced brackets.

use autofix_core::syntax::SourceTree;
use autofix_core::{FailureDescriptor, LineEdit};

const COMPOUND_KEYWORDS: &[&str] = &[
    "def", "class", "if", "elif", "else", "for", "while", "try", "except", "finally", "with",
    "async",
];

fn closer_for(open: char) -> Option<char> {
    match open {
        '(' => Some(')'),
        '[' => Some(']'),
        '{' => Some('}'),
        _ => None,
    }
}

fn opener_for(close: char) -> Option<char> {
    match close {
        ')' => Some('('),
        ']' => Some('['),
        '}' => Some('{'),
        _ => None,
    }
}

/// Bracket bookkeeping for one line, ignoring string literals and comments.
#[derive(Debug, Default)]
struct LineScan {
    /// Openers still unclosed at end of line, innermost last, with byte offsets.
    open: Vec<(char, usize)>,
    /// First closer with no matching opener on the line: offset and the closer
    /// that would have matched instead, if any.
    stray: Option<(usize, Option<char>)>,
    /// Byte offset where a trailing comment starts.
    comment: Option<usize>,
}

fn scan_line(line: &str) -> LineScan {
    let mut scan = LineScan::default();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (idx, ch) in line.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' => quote = Some(ch),
            '#' => {
                scan.comment = Some(idx);
                break;
            }
            '(' | '[' | '{' => scan.open.push((ch, idx)),
            ')' | ']' | '}' => match scan.open.last() {
                Some((open, _)) if closer_for(*open) == Some(ch) => {
                    scan.open.pop();
                }
                Some((open, _)) => {
                    if scan.stray.is_none() {
                        scan.stray = Some((idx, closer_for(*open)));
                    }
                }
                None => {
                    if scan.stray.is_none() && opener_for(ch).is_some() {
                        scan.stray = Some((idx, None));
                    }
                }
            },
            _ => {}
        }
    }
    scan
}

/// Split a line into its code part and trailing comment (including leading spaces).
fn split_comment(line: &str) -> (&str, &str) {
    match scan_line(line).comment {
        Some(idx) => {
            let code = line[..idx].trim_end();
            (code, &line[code.len()..])
        }
        None => (line.trim_end(), &line[line.trim_end().len()..]),
    }
}

pub(super) fn missing_colon(tree: &SourceTree<'_>, failure: &FailureDescriptor) -> Option<LineEdit> {
    let line = failure.line?;
    let text = tree.line_text(line)?;
    let (code, rest) = split_comment(text);
    let first_word = code
        .trim_start()
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .next()
        .unwrap_or("");
    if !COMPOUND_KEYWORDS.contains(&first_word) || code.ends_with(':') {
        return None;
    }
    if !scan_line(code).open.is_empty() {
        return None;
    }
    Some(LineEdit::replace_line(line, format!("{code}:{rest}")))
}

/// Line holding the earliest opener that is never closed anywhere in the file.
fn first_unclosed_line(source: &str) -> Option<usize> {
    let mut stack: Vec<usize> = Vec::new();
    for (idx, line) in source.split_terminator('\n').enumerate() {
        let scan = scan_line(line);
        let mut closes = 0usize;
        let mut depth = 0usize;
        let code = &line[..scan.comment.unwrap_or(line.len())];
        let mut quote: Option<char> = None;
        for ch in code.chars() {
            if let Some(q) = quote {
                if ch == q {
                    quote = None;
                }
                continue;
            }
            match ch {
                '\'' | '"' => quote = Some(ch),
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => {
                    if depth > 0 {
                        depth -= 1;
                    } else {
                        closes += 1;
                    }
                }
                _ => {}
            }
        }
        for _ in 0..closes {
            stack.pop();
        }
        stack.extend(std::iter::repeat_n(idx + 1, depth));
    }
    stack.first().copied()
}

pub(super) fn unclosed_bracket(tree: &SourceTree<'_>, failure: &FailureDescriptor) -> Option<LineEdit> {
    let reported = failure.line.filter(|line| {
        tree.line_text(*line)
            .is_some_and(|text| !scan_line(text).open.is_empty())
    });
    let line = reported.or_else(|| first_unclosed_line(tree.source()))?;
    let text = tree.line_text(line)?;
    let scan = scan_line(text);
    if scan.open.is_empty() {
        return None;
    }
    let closers: String = scan
        .open
        .iter()
        .rev()
        .filter_map(|(open, _)| closer_for(*open))
        .collect();
    let (code, rest) = split_comment(text);
    // A block header keeps its colon after the closers.
    let fixed = match code.strip_suffix(':') {
        Some(head) if !head.is_empty() => format!("{head}{closers}:{rest}"),
        _ => format!("{code}{closers}{rest}"),
    };
    Some(LineEdit::replace_line(line, fixed))
}

pub(super) fn unmatched_closer(tree: &SourceTree<'_>, failure: &FailureDescriptor) -> Option<LineEdit> {
    let line = failure.line?;
    let text = tree.line_text(line)?;
    let (idx, expected) = scan_line(text).stray?;
    let stray_len = text[idx..].chars().next()?.len_utf8();
    let replacement = expected.map(String::from).unwrap_or_default();
    let fixed = format!("{}{}{}", &text[..idx], replacement, &text[idx + stray_len..]);
    Some(LineEdit::replace_line(line, fixed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use autofix_core::FailureKind;

    fn syntax(message: &str, line: usize) -> FailureDescriptor {
        FailureDescriptor::syntax("SyntaxError", message, Some(line))
    }

    fn fix(
        rule: fn(&SourceTree<'_>, &FailureDescriptor) -> Option<LineEdit>,
        source: &str,
        failure: FailureDescriptor,
    ) -> Option<String> {
        let tree = SourceTree::parse(source).unwrap();
        rule(&tree, &failure).and_then(|e| e.apply(source))
    }

    #[test]
    fn colon_is_appended_before_comment() {
        let out = fix(
            missing_colon,
            "def f(x)  # entry\n    return x\n",
            syntax("expected ':'", 1),
        )
        .unwrap();
        assert_eq!(out, "def f(x):  # entry\n    return x\n");
    }

    #[test]
    fn colon_rule_ignores_plain_statements() {
        assert!(fix(missing_colon, "x = 1 +\n", syntax("invalid syntax", 1)).is_none());
        assert_eq!(syntax("x", 1).kind, FailureKind::SyntaxError);
    }

    #[test]
    fn unclosed_call_is_closed_on_its_line() {
        let out = fix(
            unclosed_bracket,
            "print(max([1, 2, 3]\nx = 1\n",
            syntax("'(' was never closed", 1),
        )
        .unwrap();
        assert_eq!(out, "print(max([1, 2, 3]))\nx = 1\n");
    }

    #[test]
    fn unclosed_header_keeps_colon_last() {
        let out = fix(
            unclosed_bracket,
            "if (x > 1:\n    pass\n",
            syntax("'(' was never closed", 1),
        )
        .unwrap();
        assert_eq!(out, "if (x > 1):\n    pass\n");
    }

    #[test]
    fn eof_error_locates_the_unclosed_line() {
        let out = fix(
            unclosed_bracket,
            "a = 1\nb = foo(a\nc = 2\n",
            syntax("unexpected EOF while parsing", 3),
        )
        .unwrap();
        assert_eq!(out, "a = 1\nb = foo(a)\nc = 2\n");
    }

    #[test]
    fn stray_closer_is_removed_or_swapped() {
        let out = fix(unmatched_closer, "x = (1 + 2))\n", syntax("unmatched ')'", 1)).unwrap();
        assert_eq!(out, "x = (1 + 2)\n");

        let out = fix(
            unmatched_closer,
            "xs = [1, 2)\n",
            syntax("closing parenthesis ')' does not match opening parenthesis '['", 1),
        )
        .unwrap();
        assert_eq!(out, "xs = [1, 2]\n");
    }

    #[test]
    fn brackets_inside_strings_are_ignored() {
        let scan = scan_line("print(\"(\" + ')')  # )");
        assert!(scan.open.is_empty());
        assert!(scan.stray.is_none());
        assert!(scan.comment.is_some());
    }
}
