//! End-to-end controller scenarios against scripted sandbox and model fakes.
//!
//! No interpreter or network is involved: the sandbox maps source text to a
//! canned `ExecutionResult` and the model replays a queue of replies.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use autofix_core::syntax::is_well_formed;
use autofix_core::{
    ChangeRecord, ExecutionResult, FailureKind, FixMethod, MaxIterations, RepairRequest,
    RepairResponse, RepairStatus, Sandbox, SandboxError, SandboxFuture, SessionReport,
};
use autofix_engine::{
    apply_records, EngineError, EngineSettings, ModelClient, ModelError, ModelFuture,
    RepairEngine,
};

// ============================================================================
// Fakes
// ============================================================================

type Script = Box<dyn Fn(&str) -> Result<ExecutionResult, String> + Send + Sync>;

struct ScriptedSandbox {
    script: Script,
    runs: AtomicUsize,
}

impl ScriptedSandbox {
    fn new(script: impl Fn(&str) -> ExecutionResult + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(move |source| Ok(script(source))),
            runs: AtomicUsize::new(0),
        })
    }

    fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(|_| Err("python3 not found".to_string())),
            runs: AtomicUsize::new(0),
        })
    }

    fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl Sandbox for ScriptedSandbox {
    fn execute<'a>(&'a self, source: &'a str) -> SandboxFuture<'a> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let outcome = (self.script)(source).map_err(SandboxError::Unavailable);
        Box::pin(async move { outcome })
    }
}

struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, ModelError>>>,
    when_empty: Result<String, ModelError>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    fn new(replies: Vec<Result<String, ModelError>>) -> Arc<Self> {
        Self::with_fallback(replies, Err(ModelError::Empty))
    }

    fn with_fallback(
        replies: Vec<Result<String, ModelError>>,
        when_empty: Result<String, ModelError>,
    ) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            when_empty,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ModelClient for ScriptedModel {
    fn complete<'a>(&'a self, _system: &'a str, _user: &'a str) -> ModelFuture<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .replies
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or_else(|| self.when_empty.clone());
        Box::pin(async move { reply })
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn clean(stdout: &str) -> ExecutionResult {
    ExecutionResult {
        stdout: stdout.to_string(),
        exit_status: Some(0),
        duration: Duration::from_millis(5),
        ..ExecutionResult::default()
    }
}

fn traceback(line: usize, exception: &str, message: &str) -> ExecutionResult {
    ExecutionResult {
        stderr: format!(
            "Traceback (most recent call last):\n  File \"/tmp/run/main.py\", line {line}, in <module>\n    ...\n{exception}: {message}\n"
        ),
        exit_status: Some(1),
        duration: Duration::from_millis(5),
        ..ExecutionResult::default()
    }
}

fn request(code: &str, max_iterations: Option<i64>) -> RepairRequest {
    RepairRequest {
        code: code.to_string(),
        prompt: "make it work".to_string(),
        max_iterations: max_iterations.map(MaxIterations::Count),
    }
}

fn fenced(code: &str) -> Result<String, ModelError> {
    Ok(format!("Here is the corrected program:\n```python\n{code}```\n"))
}

fn assert_monotonic(report: &SessionReport) {
    let iterations: Vec<u32> = report.changes.iter().map(|c| c.iteration).collect();
    assert!(iterations.windows(2).all(|w| w[0] <= w[1]), "{iterations:?}");
    assert!(iterations.iter().all(|i| *i <= report.total_iterations));
}

/// Replay every iteration's records on top of the original snapshot.
fn replay(original: &str, changes: &[ChangeRecord]) -> String {
    let mut text = original.to_string();
    let mut start = 0;
    while start < changes.len() {
        let iteration = changes[start].iteration;
        let end = changes[start..]
            .iter()
            .position(|c| c.iteration != iteration)
            .map(|offset| start + offset)
            .unwrap_or(changes.len());
        text = apply_records(&text, &changes[start..end]).expect("records fit the snapshot");
        start = end;
    }
    text
}

const FIB_WITH_BAD_MEMO: &str = "memo = {0: 1, 1: 1}\n\ndef f(n):\n  if n==0: return 0\n  if n==1: return 1\n  return f(n-1)+f(n-2)\n\nprint(f(10))\n";

const BINARY_SEARCH: &str = "def binary_search(arr, target):\n    lo, hi = 0, len(arr)\n    while lo <= hi:\n        mid = (lo + hi) // 2\n        if arr[mid] == target:\n            return mid\n        elif arr[mid] < target:\n            lo = mid + 1\n        else:\n            hi = mid - 1\n    return -1\n\nprint(binary_search([1, 2, 3], 4))\n";

fn binary_search_sandbox() -> Arc<ScriptedSandbox> {
    ScriptedSandbox::new(|source| {
        if source.contains("len(arr) - 1") {
            clean("-1\n")
        } else {
            traceback(5, "IndexError", "list index out of range")
        }
    })
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn fibonacci_memo_is_fixed_before_the_first_run() {
    let sandbox = ScriptedSandbox::new(|source| {
        if source.contains("{0: 0, 1: 1}") {
            clean("55\n")
        } else {
            clean("89\n")
        }
    });
    let fixed = FIB_WITH_BAD_MEMO.replace("{0: 1, 1: 1}", "{0: 0, 1: 1}");
    let model = ScriptedModel::new(vec![fenced(&fixed)]);
    let engine = RepairEngine::new(sandbox.clone(), model.clone(), EngineSettings::default());

    let report = engine.repair(&request(FIB_WITH_BAD_MEMO, Some(5))).await.unwrap();

    assert_eq!(report.status, RepairStatus::Success);
    assert_eq!(report.final_code, fixed);
    assert!(!report.changes.is_empty());
    assert!(report
        .changes
        .iter()
        .all(|c| c.fix_method == FixMethod::ForcedLlm && c.iteration == 0));
    assert!(report
        .changes
        .iter()
        .all(|c| c.error_type == FailureKind::SemanticMismatch));
    assert_eq!(model.calls(), 1);
    assert_eq!(sandbox.runs(), 1);
    assert_eq!(report.iterations[0].stdout, "55\n");

    let response = RepairResponse::from_report(&report, None);
    assert_eq!(response.parsed_error.final_status, "SUCCESS");
    assert_eq!(response.parsed_error.last_iteration.stdout, "55\n");
}

#[tokio::test]
async fn binary_search_index_error_is_fixed_structurally() {
    let sandbox = binary_search_sandbox();
    let model = ScriptedModel::new(Vec::new());
    let engine = RepairEngine::new(sandbox.clone(), model.clone(), EngineSettings::default());

    let report = engine.repair(&request(BINARY_SEARCH, Some(5))).await.unwrap();

    assert_eq!(report.status, RepairStatus::Success);
    assert_eq!(model.calls(), 0, "no model call for a structural fix");
    assert!(report.final_code.contains("lo, hi = 0, len(arr) - 1\n"));

    // One hunk: the bound line replaced in place.
    assert_eq!(report.changes.len(), 2);
    assert!(report
        .changes
        .iter()
        .all(|c| c.fix_method == FixMethod::Ast && c.iteration == 1));
    assert_eq!(report.changes[0].line_old, Some(2));
    assert_eq!(report.changes[1].line_new, Some(2));
    assert!(report.changes[0].reason.contains("bisection-upper-bound"));
    assert!(report.changes[0].reason.ends_with("at line 5"));

    assert_eq!(report.iterations.len(), 2);
    assert!(report.iterations[0].accepted);
    assert_eq!(report.iterations[0].fix_method, Some(FixMethod::Ast));
    assert_eq!(report.iterations[1].error_type, FailureKind::None);
    assert_eq!(replay(BINARY_SEARCH, &report.changes), report.final_code);
}

#[tokio::test]
async fn fix_in_the_last_budgeted_iteration_is_validated() {
    let sandbox = binary_search_sandbox();
    let engine = RepairEngine::new(
        sandbox.clone(),
        ScriptedModel::new(Vec::new()),
        EngineSettings::default(),
    );

    let report = engine.repair(&request(BINARY_SEARCH, Some(1))).await.unwrap();

    assert_eq!(report.status, RepairStatus::Success);
    assert_eq!(report.total_iterations, 1);
    assert_eq!(sandbox.runs(), 2);
    assert_eq!(report.iterations.last().map(|r| r.stdout.as_str()), Some("-1\n"));
}

#[tokio::test]
async fn unfixable_recursion_exhausts_the_budget() {
    let code = "def down(n):\n    return down(n - 1)\n\nprint(down(5))\n";
    let sandbox = ScriptedSandbox::new(|_| {
        traceback(2, "RecursionError", "maximum recursion depth exceeded")
    });
    let attempt = |i: usize| {
        fenced(&format!(
            "def down(n):\n    # attempt {i}\n    return down(n - 1)\n\nprint(down(5))\n"
        ))
    };
    let model = ScriptedModel::new(vec![attempt(1), attempt(2), attempt(3)]);
    let engine = RepairEngine::new(sandbox.clone(), model.clone(), EngineSettings::default());

    let report = engine.repair(&request(code, Some(3))).await.unwrap();

    assert_eq!(report.status, RepairStatus::Exhausted);
    assert_eq!(report.status.final_label(), "FAILURE");
    assert_eq!(report.total_iterations, 3);
    assert!(is_well_formed(&report.final_code));
    assert!(report.final_code.contains("# attempt 3"));
    assert!(!report.changes.is_empty());
    assert!(report.changes.iter().all(|c| c.fix_method == FixMethod::Llm));
    assert_monotonic(&report);
    assert_eq!(replay(code, &report.changes), report.final_code);
    // Three budgeted runs plus the validation run of the last accepted fix.
    assert_eq!(sandbox.runs(), 4);
}

#[tokio::test]
async fn dead_iterations_end_fatal_after_two_forced_attempts() {
    let code = "print(frobnicate(3))\n";
    let sandbox = ScriptedSandbox::new(|_| {
        traceback(1, "NameError", "name 'frobnicate' is not defined")
    });
    // The model keeps echoing the input, which never changes the snapshot.
    let model = ScriptedModel::with_fallback(Vec::new(), fenced(code));
    let engine = RepairEngine::new(sandbox.clone(), model.clone(), EngineSettings::default());

    let report = engine.repair(&request(code, Some(10))).await.unwrap();

    assert_eq!(report.status, RepairStatus::Fatal);
    assert_eq!(report.final_code, code);
    assert!(report.changes.is_empty());
    // One ordinary generative attempt, then two forced ones.
    assert_eq!(report.total_iterations, 3);
    assert_eq!(model.calls(), 3);
    assert!(report.iterations.iter().all(|r| !r.accepted));
}

#[tokio::test]
async fn guard_never_runs_past_the_budget() {
    let code = "print(frobnicate(3))\n";
    let sandbox = ScriptedSandbox::new(|_| {
        traceback(1, "NameError", "name 'frobnicate' is not defined")
    });
    let engine = RepairEngine::new(
        sandbox.clone(),
        ScriptedModel::new(Vec::new()),
        EngineSettings::default(),
    );

    let report = engine.repair(&request(code, Some(2))).await.unwrap();

    assert_eq!(report.status, RepairStatus::Exhausted);
    assert_eq!(report.total_iterations, 2);
    assert_eq!(sandbox.runs(), 2);
}

#[tokio::test]
async fn precheck_and_runtime_fixes_keep_iteration_order() {
    let code = format!("{FIB_WITH_BAD_MEMO}print(sqrt(16))\n");
    let sandbox = ScriptedSandbox::new(|source| {
        if source.contains("sqrt") && !source.contains("import sqrt") {
            traceback(9, "NameError", "name 'sqrt' is not defined")
        } else {
            clean("55\n4.0\n")
        }
    });
    let fixed = code.replace("{0: 1, 1: 1}", "{0: 0, 1: 1}");
    let model = ScriptedModel::new(vec![fenced(&fixed)]);
    let engine = RepairEngine::new(sandbox, model.clone(), EngineSettings::default());

    let report = engine.repair(&request(&code, Some(5))).await.unwrap();

    assert_eq!(report.status, RepairStatus::Success);
    assert!(report.final_code.starts_with("from math import sqrt\n"));
    assert_eq!(model.calls(), 1);
    let methods: Vec<(u32, FixMethod)> = report
        .changes
        .iter()
        .map(|c| (c.iteration, c.fix_method))
        .collect();
    assert_eq!(methods.first(), Some(&(0, FixMethod::ForcedLlm)));
    assert_eq!(methods.last(), Some(&(1, FixMethod::Ast)));
    assert_monotonic(&report);
    assert_eq!(replay(&code, &report.changes), report.final_code);
}

#[tokio::test]
async fn concurrent_sessions_are_independent() {
    let sandbox = binary_search_sandbox();
    let engine = RepairEngine::new(
        sandbox.clone(),
        ScriptedModel::new(Vec::new()),
        EngineSettings::default(),
    );
    let first = request(BINARY_SEARCH, Some(3));
    let second = request(&BINARY_SEARCH.replace("[1, 2, 3], 4", "[5, 6], 9"), Some(3));

    let (a, b) = futures::join!(engine.repair(&first), engine.repair(&second));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_ne!(a.session_id, b.session_id);
    assert_eq!(a.status, RepairStatus::Success);
    assert_eq!(b.status, RepairStatus::Success);
    assert!(b.final_code.contains("[5, 6], 9"));
    assert!(!a.final_code.contains("[5, 6], 9"));
    assert_eq!(sandbox.runs(), 4);
}

// ============================================================================
// Fatal and invalid input
// ============================================================================

#[tokio::test]
async fn missing_interpreter_is_a_sandbox_error() {
    let engine = RepairEngine::new(
        ScriptedSandbox::unavailable(),
        ScriptedModel::new(Vec::new()),
        EngineSettings::default(),
    );
    let err = engine.repair(&request("print(1)\n", None)).await.unwrap_err();
    assert!(matches!(err, EngineError::Sandbox(_)));
}

#[tokio::test]
async fn malformed_model_transport_is_fatal_to_the_caller() {
    let sandbox = ScriptedSandbox::new(|_| traceback(1, "RuntimeError", "boom"));
    let model = ScriptedModel::new(vec![Err(ModelError::MalformedTransport(
        "not json".to_string(),
    ))]);
    let engine = RepairEngine::new(sandbox, model, EngineSettings::default());

    let err = engine.repair(&request("raise RuntimeError('boom')\n", Some(3))).await.unwrap_err();
    assert!(matches!(err, EngineError::ModelTransport(_)));
}

#[tokio::test]
async fn invalid_requests_are_rejected_up_front() {
    let sandbox = binary_search_sandbox();
    let engine = RepairEngine::new(
        sandbox.clone(),
        ScriptedModel::new(Vec::new()),
        EngineSettings::default(),
    );

    let err = engine.repair(&request("   \n", Some(3))).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidRequest(_)));

    let mut bad_budget = request(BINARY_SEARCH, None);
    bad_budget.max_iterations = Some(MaxIterations::Text("lots".to_string()));
    let err = engine.repair(&bad_budget).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidRequest(_)));

    let err = engine.repair(&request(BINARY_SEARCH, Some(0))).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidRequest(_)));
    assert_eq!(sandbox.runs(), 0);
}

#[tokio::test]
async fn omitted_budget_is_derived_from_size() {
    let code = "print(frobnicate(3))\n";
    let sandbox = ScriptedSandbox::new(|_| {
        traceback(1, "NameError", "name 'frobnicate' is not defined")
    });
    let model = ScriptedModel::new(vec![
        fenced("print(frobnicate(4))\n"),
        fenced("print(frobnicate(5))\n"),
        fenced("print(frobnicate(6))\n"),
        fenced("print(frobnicate(7))\n"),
    ]);
    let engine = RepairEngine::new(sandbox, model, EngineSettings::default());

    let report = engine.repair(&request(code, None)).await.unwrap();
    assert_eq!(report.max_iterations, 3);
    assert_eq!(report.total_iterations, 3);
    assert_eq!(report.status, RepairStatus::Exhausted);
}

#[tokio::test]
async fn execute_reports_classified_failure() {
    let engine = RepairEngine::new(
        binary_search_sandbox(),
        ScriptedModel::new(Vec::new()),
        EngineSettings::default(),
    );

    let response = engine.execute(BINARY_SEARCH).await.unwrap();
    assert_eq!(response.error_type, "RUNTIME_ERROR");
    assert!(response.full_error.contains("IndexError"));
    assert!(response.stderr.contains("Traceback"));

    let fixed = BINARY_SEARCH.replace("len(arr)", "len(arr) - 1");
    let response = engine.execute(&fixed).await.unwrap();
    assert_eq!(response.error_type, "NONE");
    assert!(response.full_error.is_empty());
    assert_eq!(response.stdout, "-1\n");
}
