//! Iteration controller.
//!
//! A session moves `INIT -> PRECHECK -> ITERATING -> {SUCCESS | EXHAUSTED | FATAL}`.
//! Each iteration runs the current snapshot, classifies the outcome and tries
//! to produce exactly one accepted change. Sessions share nothing mutable:
//! the engine is borrowed immutably and every session owns its chain.

use crate::classify::classify;
use crate::detect::{DetectorRegistry, Finding};
use crate::error::EngineError;
use crate::llm::{GenerativeFixer, ModelClient};
use crate::merge::{MergeRejection, MergePolicy};
use crate::recorder::{self, ChangeContext};
use crate::settings::EngineSettings;
use crate::strategy::FixStrategy;
use crate::structural::StructuralFixer;
use crate::surface::{self, SurfaceRejection};
use autofix_core::{
    ChangeRecord, ExecuteResponse, FailureDescriptor, FailureKind, FixCandidate, FixMethod,
    IterationReport, RepairRequest, RepairStatus, Sandbox, SessionReport, SnapshotChain,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Consecutive forced attempts without an accepted change before giving up.
pub const MAX_FAILED_FORCED_ATTEMPTS: u32 = 2;

#[derive(Debug, thiserror::Error)]
enum CandidateRejection {
    #[error(transparent)]
    Merge(#[from] MergeRejection),
    #[error(transparent)]
    Surface(#[from] SurfaceRejection),
    #[error("candidate does not change the snapshot after cleanup")]
    Unchanged,
}

/// A candidate that survived merge and surface repair.
struct Accepted {
    source: String,
    method: FixMethod,
    /// Rule name or merge mode, used in change reasons.
    detail: String,
}

/// Mutable state of one repair session.
struct Session {
    id: Uuid,
    started_at: DateTime<Utc>,
    prompt: String,
    budget: u32,
    chain: SnapshotChain,
    changes: Vec<ChangeRecord>,
    runs: Vec<IterationReport>,
    iteration: u32,
    status: RepairStatus,
    force_next: bool,
    failed_forced: u32,
}

impl Session {
    fn new(code: &str, prompt: &str, budget: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            prompt: prompt.to_string(),
            budget,
            chain: SnapshotChain::new(code),
            changes: Vec::new(),
            runs: Vec::new(),
            iteration: 0,
            status: RepairStatus::Running,
            force_next: false,
            failed_forced: 0,
        }
    }

    /// Push the accepted source as the new head and derive its change records.
    fn accept(&mut self, kind: FailureKind, line: Option<usize>, accepted: Accepted) {
        let ctx = ChangeContext {
            iteration: self.iteration,
            method: accepted.method,
            kind,
            detail: &accepted.detail,
            line,
        };
        let (prev, next) = self.chain.advance(accepted.source.as_str());
        let records = recorder::record(prev.source(), next.source(), &ctx);
        info!(
            session = %self.id,
            iteration = self.iteration,
            method = %accepted.method,
            kind = %kind,
            version = next.version(),
            lines_changed = records.len(),
            "fix accepted"
        );
        self.changes.extend(records);

        // Precheck fixes happen before any run; only mark real iterations.
        if let Some(run) = self
            .runs
            .last_mut()
            .filter(|run| run.iteration == self.iteration)
        {
            run.accepted = true;
            run.fix_method = Some(accepted.method);
        }
    }

    fn finish(self) -> SessionReport {
        SessionReport {
            session_id: self.id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            status: self.status,
            total_iterations: self.iteration,
            max_iterations: self.budget,
            original_code: self.chain.original().source().to_string(),
            final_code: self.chain.current().source().to_string(),
            iterations: self.runs,
            changes: self.changes,
        }
    }
}

/// Drives repair sessions. Cheap to share: `&self` methods only.
pub struct RepairEngine {
    sandbox: Arc<dyn Sandbox>,
    structural: StructuralFixer,
    generative: GenerativeFixer,
    detectors: DetectorRegistry,
    merge: MergePolicy,
    settings: EngineSettings,
}

impl RepairEngine {
    pub fn new(
        sandbox: Arc<dyn Sandbox>,
        model: Arc<dyn ModelClient>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            sandbox,
            structural: StructuralFixer::default(),
            generative: GenerativeFixer::new(model),
            detectors: DetectorRegistry::new(settings.forced_fix_confidence),
            merge: settings.merge,
            settings,
        }
    }

    pub fn with_structural(mut self, structural: StructuralFixer) -> Self {
        self.structural = structural;
        self
    }

    pub fn with_detectors(mut self, detectors: DetectorRegistry) -> Self {
        self.detectors = detectors;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Run `code` once and classify the outcome.
    pub async fn execute(&self, code: &str) -> Result<ExecuteResponse, EngineError> {
        if code.trim().is_empty() {
            return Err(EngineError::InvalidRequest("code must not be empty".to_string()));
        }
        let result = self.sandbox.execute(code).await?;
        let failure = classify(&result);
        debug!(kind = %failure.kind, "execute classified");
        Ok(ExecuteResponse {
            stdout: result.stdout,
            stderr: result.stderr,
            error_type: failure.kind.as_str().to_string(),
            full_error: if failure.is_failure() {
                failure.summary()
            } else {
                String::new()
            },
        })
    }

    /// Repair `request.code` until it runs cleanly, the budget is spent, or
    /// the dead-iteration guard gives up.
    pub async fn repair(&self, request: &RepairRequest) -> Result<SessionReport, EngineError> {
        if request.code.trim().is_empty() {
            return Err(EngineError::InvalidRequest("code must not be empty".to_string()));
        }
        let budget = match &request.max_iterations {
            Some(raw) => raw.resolve().map_err(EngineError::InvalidRequest)?,
            None => self.settings.budget_for(&request.code),
        };

        let mut session = Session::new(&request.code, &request.prompt, budget);
        info!(
            session = %session.id,
            budget,
            lines = session.chain.original().line_count(),
            "repair session started"
        );

        self.precheck(&mut session).await?;
        self.iterate(&mut session).await?;

        info!(
            session = %session.id,
            status = ?session.status,
            iterations = session.iteration,
            accepted = session.chain.accepted(),
            "repair session finished"
        );
        Ok(session.finish())
    }

    // ═══════════════════════════════════════════════════════════════════════
    //  PRECHECK
    // ═══════════════════════════════════════════════════════════════════════

    async fn precheck(&self, session: &mut Session) -> Result<(), EngineError> {
        let findings = self.detectors.scan(session.chain.current().source());
        let Some(trigger) = self.detectors.forced_trigger(&findings) else {
            debug!(session = %session.id, findings = findings.len(), "precheck found nothing forcing");
            return Ok(());
        };
        info!(
            session = %session.id,
            iteration = 0,
            detector = trigger.detector,
            confidence = trigger.confidence,
            line = ?trigger.line,
            "logic issue forces a generative fix before the first run"
        );
        let kind = FailureKind::SemanticMismatch;
        let line = trigger.line;

        let accepted = self
            .attempt(session, None, FixStrategy::ForcedGenerative, &findings)
            .await?;
        match accepted {
            Some(accepted) => session.accept(kind, line, accepted),
            None => warn!(session = %session.id, iteration = 0, "forced precheck fix produced nothing usable"),
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    //  ITERATING
    // ═══════════════════════════════════════════════════════════════════════

    async fn iterate(&self, session: &mut Session) -> Result<(), EngineError> {
        while session.status == RepairStatus::Running {
            if session.iteration >= session.budget {
                self.validate_final(session).await?;
                break;
            }
            session.iteration += 1;

            let failure = self.run(session).await?;
            if !failure.is_failure() {
                session.status = RepairStatus::Success;
                break;
            }

            let strategy = FixStrategy::select(&failure, session.force_next);
            let findings = self.detectors.scan(session.chain.current().source());
            match self
                .attempt(session, Some(&failure), strategy, &findings)
                .await?
            {
                Some(accepted) => {
                    session.accept(failure.kind, failure.line, accepted);
                    session.force_next = false;
                    session.failed_forced = 0;
                }
                None => self.dead_iteration(session, strategy),
            }
        }
        Ok(())
    }

    /// Bookkeeping for an iteration that left the snapshot unchanged.
    fn dead_iteration(&self, session: &mut Session, strategy: FixStrategy) {
        if strategy == FixStrategy::ForcedGenerative {
            session.failed_forced += 1;
        }
        warn!(
            session = %session.id,
            iteration = session.iteration,
            method = %strategy.method(),
            failed_forced = session.failed_forced,
            "dead iteration"
        );
        if session.failed_forced >= MAX_FAILED_FORCED_ATTEMPTS {
            session.status = RepairStatus::Fatal;
        } else {
            session.force_next = true;
        }
    }

    /// Once the budget is spent, run the final snapshot if it has not been
    /// run yet so the reported outcome matches the returned code.
    async fn validate_final(&self, session: &mut Session) -> Result<(), EngineError> {
        let current = session.chain.current().version();
        let already_run = session
            .runs
            .last()
            .is_some_and(|run| run.snapshot_version == current);
        let clean = if already_run {
            session
                .runs
                .last()
                .is_some_and(|run| run.error_type == FailureKind::None)
        } else {
            !self.run(session).await?.is_failure()
        };
        session.status = if clean {
            RepairStatus::Success
        } else {
            RepairStatus::Exhausted
        };
        Ok(())
    }

    async fn run(&self, session: &mut Session) -> Result<FailureDescriptor, EngineError> {
        let started_at = Utc::now();
        let snapshot = session.chain.current().clone();
        let result = self.sandbox.execute(snapshot.source()).await?;
        let failure = classify(&result);
        info!(
            session = %session.id,
            iteration = session.iteration,
            version = snapshot.version(),
            kind = %failure.kind,
            exception = ?failure.exception,
            line = ?failure.line,
            timed_out = result.timed_out,
            "sandbox run classified"
        );
        session.runs.push(IterationReport {
            iteration: session.iteration,
            started_at,
            snapshot_version: snapshot.version(),
            error_type: failure.kind,
            exception: failure.exception.clone(),
            line: failure.line,
            fix_method: None,
            accepted: false,
            stdout: result.stdout,
            stderr: result.stderr,
            duration_ms: u64::try_from(result.duration.as_millis()).unwrap_or(u64::MAX),
        });
        Ok(failure)
    }

    // ═══════════════════════════════════════════════════════════════════════
    //  FIX ATTEMPTS
    // ═══════════════════════════════════════════════════════════════════════

    /// Try `strategy` and its fallbacks until one yields an accepted change.
    async fn attempt(
        &self,
        session: &Session,
        failure: Option<&FailureDescriptor>,
        strategy: FixStrategy,
        findings: &[Finding],
    ) -> Result<Option<Accepted>, EngineError> {
        let current = session.chain.current();
        let mut next = Some(strategy);
        while let Some(strategy) = next {
            let method = strategy.method();
            let candidate = match strategy {
                FixStrategy::Structural => match failure {
                    Some(failure) => self.structural.attempt(current, failure).ok(),
                    None => None,
                },
                FixStrategy::Generative | FixStrategy::ForcedGenerative => {
                    self.generative
                        .attempt(current, failure, findings, &session.prompt, method)
                        .await?
                }
            };

            match candidate {
                Some(candidate) => match self.integrate(current.source(), &candidate) {
                    Ok(accepted) => return Ok(Some(accepted)),
                    Err(reason) => debug!(
                        session = %session.id,
                        iteration = session.iteration,
                        method = %method,
                        reason = %reason,
                        "candidate rejected"
                    ),
                },
                None => debug!(
                    session = %session.id,
                    iteration = session.iteration,
                    method = %method,
                    "no candidate"
                ),
            }
            next = strategy.fallback();
        }
        Ok(None)
    }

    /// Merge, then surface-repair. The result differs from `current`.
    fn integrate(
        &self,
        current: &str,
        candidate: &FixCandidate,
    ) -> Result<Accepted, CandidateRejection> {
        let merged = self.merge.merge(current, candidate)?;
        let source = surface::repair(&merged.source, current)?;
        if source == current {
            return Err(CandidateRejection::Unchanged);
        }
        let detail = match candidate.method {
            FixMethod::Ast => candidate.rationale.clone(),
            FixMethod::Llm | FixMethod::ForcedLlm => merged.mode.as_str().to_string(),
        };
        Ok(Accepted {
            source,
            method: candidate.method,
            detail,
        })
    }
}
