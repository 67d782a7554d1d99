//! Error classifier: sandbox output to `FailureDescriptor`.
//!
//! Never fails. Anything it cannot recognise becomes a generic runtime error
//! carrying the raw stderr tail, so the loop always has a state to act on.

use autofix_core::{ExecutionResult, FailureDescriptor};
use regex::Regex;
use std::sync::OnceLock;

const SYNTAX_FAMILY: &[&str] = &["SyntaxError", "IndentationError", "TabError"];
const LIBRARY_PATH_MARKERS: &[&str] = &["/lib/python", "site-packages", "<frozen", "\\lib\\"];
const MAX_MESSAGE_CHARS: usize = 500;

fn exception_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?P<name>(?:[A-Za-z_]\w*\.)*[A-Za-z_]\w*(?:Error|Exception|Exit|Interrupt|Iteration|Warning))(?::\s?(?P<msg>.*))?$",
        )
        .ok()
    })
    .as_ref()
}

fn frame_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^\s*File "(?P<path>[^"]+)", line (?P<line>\d+)"#).ok())
        .as_ref()
}

fn log_noise_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\[\d{4}-\d{2}-\d{2}[^\]]*\]\s*\[(?:INFO|DEBUG)\]").ok())
        .as_ref()
}

/// Drop interpreter-side log lines that are not part of the program's own error output.
pub fn clean_stderr(stderr: &str) -> String {
    let Some(noise) = log_noise_re() else {
        return stderr.trim().to_string();
    };
    stderr
        .lines()
        .filter(|line| !noise.is_match(line))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn only_warnings(stderr: &str) -> bool {
    stderr
        .lines()
        .filter(|line| !line.trim().is_empty())
        .all(|line| line.contains("Warning:") || line.starts_with(char::is_whitespace))
}

fn is_library_frame(path: &str) -> bool {
    LIBRARY_PATH_MARKERS.iter().any(|marker| path.contains(marker))
}

/// Line of the innermost frame that belongs to the program rather than the interpreter.
fn failing_line(stderr: &str) -> Option<usize> {
    let re = frame_re()?;
    let mut fallback = None;
    let mut user_line = None;
    for caps in stderr.lines().filter_map(|line| re.captures(line)) {
        let line = caps.name("line").and_then(|m| m.as_str().parse::<usize>().ok());
        let path = caps.name("path").map(|m| m.as_str()).unwrap_or("");
        fallback = line.or(fallback);
        if !is_library_frame(path) {
            user_line = line.or(user_line);
        }
    }
    user_line.or(fallback)
}

/// Last `Name: message` line of a traceback.
fn exception_line(stderr: &str) -> Option<(String, String)> {
    let re = exception_re()?;
    stderr
        .lines()
        .rev()
        .filter(|line| !line.starts_with(char::is_whitespace))
        .find_map(|line| {
            let caps = re.captures(line.trim_end())?;
            let name = caps.name("name")?.as_str().to_string();
            let message = caps
                .name("msg")
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default();
            Some((name, message))
        })
}

fn tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    text.chars().skip(count - max_chars).collect()
}

pub fn classify(result: &ExecutionResult) -> FailureDescriptor {
    let stderr = clean_stderr(&result.stderr);

    if result.timed_out {
        return FailureDescriptor::runtime(
            Some("TimeoutError"),
            format!(
                "execution timed out after {:.1}s",
                result.duration.as_secs_f64()
            ),
            failing_line(&stderr),
        );
    }

    if result.exit_status == Some(0) && (stderr.is_empty() || only_warnings(&stderr)) {
        return FailureDescriptor::none();
    }

    let line = failing_line(&stderr);
    if let Some((name, message)) = exception_line(&stderr) {
        let short = name.rsplit('.').next().unwrap_or(&name).to_string();
        if SYNTAX_FAMILY.contains(&short.as_str()) {
            return FailureDescriptor::syntax(&short, message, line);
        }
        return FailureDescriptor::runtime(Some(&short), message, line);
    }

    if stderr.is_empty() {
        let message = match result.exit_status {
            Some(code) => format!("process exited with status {code}"),
            None => "process terminated by signal".to_string(),
        };
        return FailureDescriptor::runtime(None, message, None);
    }

    FailureDescriptor::runtime(None, tail(&stderr, MAX_MESSAGE_CHARS), line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use autofix_core::FailureKind;
    use std::time::Duration;

    fn failed(stderr: &str) -> ExecutionResult {
        ExecutionResult {
            stderr: stderr.to_string(),
            exit_status: Some(1),
            ..Default::default()
        }
    }

    #[test]
    fn clean_run_is_none() {
        let result = ExecutionResult {
            stdout: "55\n".into(),
            exit_status: Some(0),
            ..Default::default()
        };
        assert_eq!(classify(&result).kind, FailureKind::None);
    }

    #[test]
    fn index_error_uses_innermost_user_frame() {
        let stderr = r#"Traceback (most recent call last):
  File "/tmp/run/main.py", line 12, in <module>
    print(binary_search([1, 2, 3], 4))
  File "/tmp/run/main.py", line 5, in binary_search
    if arr[mid] == target:
       ~~~^^^^^
IndexError: list index out of range
"#;
        let failure = classify(&failed(stderr));
        assert_eq!(failure.kind, FailureKind::RuntimeError);
        assert_eq!(failure.exception.as_deref(), Some("IndexError"));
        assert_eq!(failure.message, "list index out of range");
        assert_eq!(failure.line, Some(5));
    }

    #[test]
    fn library_frames_are_skipped() {
        let stderr = r#"Traceback (most recent call last):
  File "/tmp/run/main.py", line 3, in <module>
    statistics.mean([])
  File "/usr/lib/python3.12/statistics.py", line 430, in mean
    raise StatisticsError('mean requires at least one data point')
statistics.StatisticsError: mean requires at least one data point
"#;
        let failure = classify(&failed(stderr));
        assert_eq!(failure.exception.as_deref(), Some("StatisticsError"));
        assert_eq!(failure.line, Some(3));
    }

    #[test]
    fn syntax_family_maps_to_syntax_error() {
        let stderr = r#"  File "/tmp/run/main.py", line 1
    def f(x)
            ^
SyntaxError: expected ':'
"#;
        let failure = classify(&failed(stderr));
        assert_eq!(failure.kind, FailureKind::SyntaxError);
        assert_eq!(failure.message, "expected ':'");
        assert_eq!(failure.line, Some(1));

        let indent = classify(&failed(
            "  File \"main.py\", line 3\n    return x\nIndentationError: unexpected indent\n",
        ));
        assert_eq!(indent.kind, FailureKind::SyntaxError);
        assert_eq!(indent.exception.as_deref(), Some("IndentationError"));
    }

    #[test]
    fn timeout_is_runtime_error() {
        let result = ExecutionResult {
            timed_out: true,
            duration: Duration::from_secs(6),
            ..Default::default()
        };
        let failure = classify(&result);
        assert_eq!(failure.kind, FailureKind::RuntimeError);
        assert_eq!(failure.exception.as_deref(), Some("TimeoutError"));
    }

    #[test]
    fn unrecognised_output_keeps_raw_message() {
        let failure = classify(&failed("Segmentation fault (core dumped)"));
        assert_eq!(failure.kind, FailureKind::RuntimeError);
        assert!(failure.exception.is_none());
        assert_eq!(failure.message, "Segmentation fault (core dumped)");

        let silent = classify(&ExecutionResult {
            exit_status: Some(3),
            ..Default::default()
        });
        assert_eq!(silent.message, "process exited with status 3");
    }

    #[test]
    fn warnings_and_log_noise_do_not_fail_a_clean_exit() {
        let result = ExecutionResult {
            stderr: "[2024-05-01 10:00:00] [INFO] sandbox ready\n/tmp/run/main.py:2: DeprecationWarning: old api\n  warnings.warn('old api', DeprecationWarning)\n".into(),
            exit_status: Some(0),
            ..Default::default()
        };
        assert_eq!(classify(&result).kind, FailureKind::None);
        assert_eq!(
            clean_stderr("[2024-05-01 10:00:00] [INFO] hello\nboom"),
            "boom"
        );
    }
}
