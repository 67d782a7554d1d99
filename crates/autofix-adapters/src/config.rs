//! Configuration management for autofix
//!
//! Stores settings in ~/.config/autofix/config.toml. Every field has a
//! default, so a partial or missing file is fine.

use crate::sandbox::{DEFAULT_INTERPRETER, DEFAULT_OUTPUT_CAP, DEFAULT_TIMEOUT_SECS};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const CONFIG_DIR: &str = "autofix";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub sandbox: SandboxConfig,
    pub model: ModelConfig,
    pub server: ServerConfig,
    pub report: ReportConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Budget used when a request carries none and derivation is off.
    pub max_iterations: u32,
    pub derive_budget: bool,
    pub min_derived_iterations: u32,
    pub max_derived_iterations: u32,
    pub lines_per_extra_iteration: usize,
    pub forced_fix_confidence: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            derive_budget: true,
            min_derived_iterations: 3,
            max_derived_iterations: 10,
            lines_per_extra_iteration: 25,
            forced_fix_confidence: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub python: String,
    pub timeout_secs: u64,
    pub output_cap_bytes: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            python: DEFAULT_INTERPRETER.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            output_cap_bytes: DEFAULT_OUTPUT_CAP,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub base_url: String,
    pub model: String,
    /// Never written back to disk; set it in the file by hand or via env.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11434/v1".to_string(),
            model: "qwen2.5-coder:7b-instruct".to_string(),
            api_key: None,
            max_tokens: 2048,
            temperature: 0.0,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            body_limit_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Directory for per-session JSON reports. Unset disables persistence.
    pub dir: Option<PathBuf>,
}

impl Config {
    fn sanitize(&mut self) {
        let engine = &mut self.engine;
        engine.max_iterations = engine.max_iterations.max(1);
        engine.min_derived_iterations = engine.min_derived_iterations.max(1);
        if engine.max_derived_iterations < engine.min_derived_iterations {
            engine.max_derived_iterations = engine.min_derived_iterations;
        }
        engine.lines_per_extra_iteration = engine.lines_per_extra_iteration.max(1);
        engine.forced_fix_confidence = engine.forced_fix_confidence.clamp(0.0, 1.0);

        self.sandbox.timeout_secs = self.sandbox.timeout_secs.max(1);
        self.sandbox.output_cap_bytes = self.sandbox.output_cap_bytes.max(1024);
        self.model.timeout_secs = self.model.timeout_secs.max(1);
        self.model.base_url = self.model.base_url.trim_end_matches('/').to_string();
        if self
            .model
            .api_key
            .as_deref()
            .is_some_and(|k| k.trim().is_empty())
        {
            self.model.api_key = None;
        }
    }

    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join(CONFIG_DIR))
    }

    /// Default config file path
    pub fn default_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join(CONFIG_FILE))
    }

    /// Load from `explicit` or the default location, then apply env overrides.
    pub fn load(explicit: Option<&Path>) -> Self {
        let path = explicit.map(Path::to_path_buf).or_else(Self::default_path);
        let mut config = match path {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.sanitize();
        config
    }

    /// Read one file. Missing yields defaults; unparseable is set aside.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::default();
        };
        match toml::from_str::<Config>(&content) {
            Ok(mut config) => {
                config.sanitize();
                config
            }
            Err(err) => {
                let backup = preserve_corrupt_config(path, &content);
                tracing::warn!(
                    path = %path.display(),
                    backup = ?backup.map(|p| p.display().to_string()),
                    error = %err,
                    "config file is malformed; using defaults"
                );
                Self::default()
            }
        }
    }

    /// Apply `AUTOFIX_*` overrides using `lookup` to read variables.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty("AUTOFIX_MODEL_URL") {
            self.model.base_url = url;
        }
        if let Some(model) = non_empty("AUTOFIX_MODEL") {
            self.model.model = model;
        }
        if let Some(key) = non_empty("AUTOFIX_API_KEY").or_else(|| non_empty("OPENAI_API_KEY")) {
            self.model.api_key = Some(key);
        }
        if let Some(python) = non_empty("AUTOFIX_PYTHON") {
            self.sandbox.python = python;
        }
        if let Some(raw) = non_empty("AUTOFIX_SANDBOX_TIMEOUT_SECS") {
            match raw.trim().parse::<u64>() {
                Ok(secs) => self.sandbox.timeout_secs = secs,
                Err(_) => tracing::warn!(
                    value = %raw,
                    "ignoring AUTOFIX_SANDBOX_TIMEOUT_SECS: not a whole number of seconds"
                ),
            }
        }
    }

    /// Save to the default location.
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::default_path().context("Could not determine config directory")?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let mut sanitized = self.clone();
        sanitized.sanitize();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
        }
        let content = toml::to_string_pretty(&sanitized).context("Failed to serialize config")?;
        write_config_atomic(path, &content)
            .with_context(|| format!("Failed to write config {}", path.display()))
    }

    /// Config file location for display
    pub fn config_location() -> String {
        Self::default_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| format!("~/.config/{CONFIG_DIR}/{CONFIG_FILE}"))
    }
}

fn preserve_corrupt_config(path: &Path, content: &str) -> Option<PathBuf> {
    let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S");
    let file_name = path.file_name()?.to_string_lossy().into_owned();
    let corrupt_path = path.with_file_name(format!("{file_name}.corrupt-{stamp}"));
    if fs::rename(path, &corrupt_path).is_err() && fs::write(&corrupt_path, content).is_err() {
        return None;
    }
    Some(corrupt_path)
}

fn write_config_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    let tmp_path = path.with_extension("toml.tmp");
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp_path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = file.set_permissions(fs::Permissions::from_mode(0o600)) {
            tracing::debug!(error = %e, "failed to restrict config file permissions");
        }
    }

    file.write_all(content.as_bytes())?;
    file.sync_all()?;
    drop(file);

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    Ok(())
}
