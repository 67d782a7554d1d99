use std::io::{self, Read};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL_MS: u64 = 20;
const READ_CHUNK: usize = 8 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("failed to start command: {0}")]
    Spawn(#[source] io::Error),
    #[error("failed to wait for command: {0}")]
    Wait(#[source] io::Error),
    #[error("failed to capture {0}")]
    Capture(&'static str),
}

#[derive(Debug)]
pub struct CommandRunResult {
    pub status: Option<ExitStatus>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    pub timed_out: bool,
    /// Set when either stream produced more than `output_cap` bytes.
    pub truncated: bool,
}

impl CommandRunResult {
    pub fn exit_code(&self) -> Option<i32> {
        self.status.and_then(|s| s.code())
    }
}

/// Run `command` to completion or until `timeout`, killing it on expiry.
///
/// Both pipes are drained on reader threads for the whole run, so a chatty
/// child never blocks on a full pipe; only the first `output_cap` bytes of
/// each stream are kept.
pub fn run_command_with_timeout(
    command: &mut Command,
    timeout: Duration,
    output_cap: usize,
) -> Result<CommandRunResult, CommandError> {
    let start = Instant::now();
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(CommandError::Spawn)?;

    let stdout = child.stdout.take().ok_or(CommandError::Capture("stdout"))?;
    let stderr = child.stderr.take().ok_or(CommandError::Capture("stderr"))?;
    let stdout_handle = thread::spawn(move || read_capped(stdout, output_cap));
    let stderr_handle = thread::spawn(move || read_capped(stderr, output_cap));

    let mut timed_out = false;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) => {
                if start.elapsed() >= timeout {
                    timed_out = true;
                    let _ = child.kill();
                    match child.wait() {
                        Ok(status) => break Some(status),
                        Err(_) => break None,
                    }
                }
                thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
            }
            Err(e) => {
                let _ = child.kill();
                return Err(CommandError::Wait(e));
            }
        }
    };
    let duration = start.elapsed();

    let (stdout_bytes, stdout_cut) = stdout_handle.join().unwrap_or_default();
    let (stderr_bytes, stderr_cut) = stderr_handle.join().unwrap_or_default();

    Ok(CommandRunResult {
        status,
        stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
        stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
        duration,
        timed_out,
        truncated: stdout_cut || stderr_cut,
    })
}

fn read_capped(mut reader: impl Read, cap: usize) -> (Vec<u8>, bool) {
    let mut kept = Vec::new();
    let mut cut = false;
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                let room = cap.saturating_sub(kept.len());
                if n > room {
                    cut = true;
                }
                kept.extend_from_slice(&chunk[..n.min(room)]);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    (kept, cut)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_capped_keeps_prefix_and_flags_overflow() {
        let (kept, cut) = read_capped(&b"abcdefgh"[..], 3);
        assert_eq!(kept, b"abc");
        assert!(cut);

        let (kept, cut) = read_capped(&b"ab"[..], 3);
        assert_eq!(kept, b"ab");
        assert!(!cut);
    }

    #[cfg(unix)]
    #[test]
    fn missing_program_is_a_spawn_error() {
        let mut cmd = Command::new("/definitely/not/a/real/binary");
        let err = run_command_with_timeout(&mut cmd, Duration::from_secs(1), 1024).unwrap_err();
        assert!(matches!(err, CommandError::Spawn(_)));
    }

    #[cfg(unix)]
    #[test]
    fn slow_command_is_killed_on_timeout() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "exec sleep 5"]);
        let result =
            run_command_with_timeout(&mut cmd, Duration::from_millis(200), 1024).unwrap();
        assert!(result.timed_out);
        assert!(result.duration < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn output_over_the_cap_is_truncated() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "printf 'xxxxxxxxxxxxxxxxxxxx'; printf 'err' >&2; exit 3"]);
        let result = run_command_with_timeout(&mut cmd, Duration::from_secs(5), 8).unwrap();
        assert_eq!(result.stdout, "xxxxxxxx");
        assert_eq!(result.stderr, "err");
        assert!(result.truncated);
        assert_eq!(result.exit_code(), Some(3));
    }
}
