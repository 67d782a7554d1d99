//! Process-backed sandbox: each snapshot runs as `main.py` in a throwaway
//! directory under the configured interpreter.

use crate::util::{run_command_with_timeout, CommandError};
use autofix_core::{ExecutionResult, Sandbox, SandboxError, SandboxFuture};
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

pub const DEFAULT_INTERPRETER: &str = "python3";
pub const DEFAULT_TIMEOUT_SECS: u64 = 6;
pub const DEFAULT_OUTPUT_CAP: usize = 64 * 1024;
const ENTRY_FILE: &str = "main.py";

#[derive(Debug, Clone)]
pub struct PythonSandbox {
    interpreter: PathBuf,
    timeout: Duration,
    output_cap: usize,
}

impl Default for PythonSandbox {
    fn default() -> Self {
        Self::new(
            DEFAULT_INTERPRETER,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            DEFAULT_OUTPUT_CAP,
        )
    }
}

impl PythonSandbox {
    pub fn new(interpreter: impl Into<PathBuf>, timeout: Duration, output_cap: usize) -> Self {
        Self {
            interpreter: interpreter.into(),
            timeout,
            output_cap,
        }
    }

    pub fn interpreter(&self) -> &std::path::Path {
        &self.interpreter
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn run_blocking(&self, source: &str) -> Result<ExecutionResult, SandboxError> {
        let workdir = tempfile::Builder::new().prefix("autofix-run-").tempdir()?;
        std::fs::write(workdir.path().join(ENTRY_FILE), source)?;

        let mut command = Command::new(&self.interpreter);
        command
            .arg("-I")
            .arg(ENTRY_FILE)
            .current_dir(workdir.path())
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .env("PYTHONIOENCODING", "utf-8");

        let run = run_command_with_timeout(&mut command, self.timeout, self.output_cap)
            .map_err(|err| match err {
                CommandError::Spawn(e) => SandboxError::Unavailable(format!(
                    "cannot start {}: {e}",
                    self.interpreter.display()
                )),
                CommandError::Wait(e) => SandboxError::Io(e),
                other => SandboxError::Unavailable(other.to_string()),
            })?;

        tracing::debug!(
            exit = ?run.exit_code(),
            timed_out = run.timed_out,
            truncated = run.truncated,
            duration_ms = run.duration.as_millis() as u64,
            "sandbox run finished"
        );

        Ok(ExecutionResult {
            exit_status: run.exit_code(),
            stdout: run.stdout,
            stderr: run.stderr,
            duration: run.duration,
            truncated: run.truncated,
            timed_out: run.timed_out,
        })
    }
}

impl Sandbox for PythonSandbox {
    fn execute<'a>(&'a self, source: &'a str) -> SandboxFuture<'a> {
        let sandbox = self.clone();
        let source = source.to_string();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || sandbox.run_blocking(&source))
                .await
                .map_err(|e| SandboxError::Unavailable(format!("sandbox task failed: {e}")))?
        })
    }
}
