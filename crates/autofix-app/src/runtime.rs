//! Wires config into a ready engine and owns report persistence.

use anyhow::{Context, Result};
use autofix_adapters::{Config, PythonSandbox, ReportStore};
use autofix_core::{ExecuteResponse, RepairRequest, RepairResponse};
use autofix_engine::{ChatClient, ChatSettings, EngineError, EngineSettings, RepairEngine};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub struct Runtime {
    engine: RepairEngine,
    reports: Option<ReportStore>,
}

impl Runtime {
    pub fn new(engine: RepairEngine, reports: Option<ReportStore>) -> Self {
        Self { engine, reports }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let sandbox = PythonSandbox::new(
            config.sandbox.python.as_str(),
            Duration::from_secs(config.sandbox.timeout_secs),
            config.sandbox.output_cap_bytes,
        );
        let model = ChatClient::new(chat_settings(config))
            .context("Failed to create model client")?;
        let engine = RepairEngine::new(Arc::new(sandbox), Arc::new(model), engine_settings(config));
        let reports = config.report.dir.clone().map(ReportStore::new);
        Ok(Self::new(engine, reports))
    }

    pub async fn execute(&self, code: &str) -> Result<ExecuteResponse, EngineError> {
        self.engine.execute(code).await
    }

    /// Repair and, when a report directory is configured, persist the session.
    /// A failed save is logged and leaves `report_path` empty.
    pub async fn repair(&self, request: &RepairRequest) -> Result<RepairResponse, EngineError> {
        let report = self.engine.repair(request).await?;
        let report_path = match &self.reports {
            Some(store) => match store.save(&report) {
                Ok(path) => Some(path.display().to_string()),
                Err(err) => {
                    warn!(session = %report.session_id, error = %err, "could not save session report");
                    None
                }
            },
            None => None,
        };
        Ok(RepairResponse::from_report(&report, report_path))
    }
}

pub fn engine_settings(config: &Config) -> EngineSettings {
    let engine = &config.engine;
    EngineSettings {
        max_iterations: engine.max_iterations,
        derive_budget: engine.derive_budget,
        min_derived_iterations: engine.min_derived_iterations,
        max_derived_iterations: engine.max_derived_iterations,
        lines_per_extra_iteration: engine.lines_per_extra_iteration,
        forced_fix_confidence: engine.forced_fix_confidence,
        ..EngineSettings::default()
    }
}

pub fn chat_settings(config: &Config) -> ChatSettings {
    let model = &config.model;
    ChatSettings {
        base_url: model.base_url.clone(),
        model: model.model.clone(),
        api_key: model.api_key.clone(),
        max_tokens: model.max_tokens,
        temperature: model.temperature,
        timeout: Duration::from_secs(model.timeout_secs),
    }
}
