//! Session reports persisted as pretty JSON, one file per repair session.

use anyhow::{Context, Result};
use autofix_core::SessionReport;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ReportStore {
    dir: PathBuf,
}

impl ReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_name(report: &SessionReport) -> String {
        format!(
            "repair-{}-{}.json",
            report.started_at.format("%Y%m%dT%H%M%SZ"),
            report.session_id
        )
    }

    /// Write `report` and return the path it landed at.
    pub fn save(&self, report: &SessionReport) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create report directory {}", self.dir.display()))?;
        let path = self.dir.join(Self::file_name(report));
        let content =
            serde_json::to_string_pretty(report).context("Failed to serialize session report")?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        if let Err(err) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(err).with_context(|| format!("Failed to move report to {}", path.display()));
        }
        tracing::info!(path = %path.display(), session = %report.session_id, "saved session report");
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<SessionReport> {
        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse session report {}", path.display()))
    }
}
