//! Semantic pattern detector.
//!
//! Static, side-effect-free scans for known logic-bug shapes. Each detector
//! looks at the syntax tree only, so the same snapshot always yields the same
//! findings. A finding above the forced-fix threshold on the original snapshot
//! sends the session straight to the generative fixer before anything runs.

pub(crate) mod bisection;
mod hygiene;
mod logic;
mod recursion;
mod traversal;

use autofix_core::syntax::{SourceTree, descendants};
use serde::Serialize;
use tree_sitter::Node;

pub const DEFAULT_FORCED_FIX_CONFIDENCE: f32 = 0.8;

/// One detector hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub detector: &'static str,
    pub confidence: f32,
    pub line: Option<usize>,
    pub message: String,
    /// What a correct version would look like, phrased for the model prompt.
    pub hint: String,
}

impl Finding {
    pub(crate) fn new(
        detector: PatternDetector,
        confidence: f32,
        line: usize,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        Self {
            detector: detector.name(),
            confidence,
            line: Some(line),
            message: message.into(),
            hint: hint.into(),
        }
    }

    pub fn describe(&self) -> String {
        match self.line {
            Some(line) => format!("[{}] line {}: {} ({})", self.detector, line, self.message, self.hint),
            None => format!("[{}] {} ({})", self.detector, self.message, self.hint),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternDetector {
    FibonacciMemoBase,
    TraversalOrder,
    BisectionBounds,
    FactorialBaseCase,
    RecursionWithoutProgress,
    ConstantIndexOutOfRange,
    MutableDefaultArgument,
    UnreachableCode,
    OffByOneIndex,
    BooleanLiteralComparison,
    ShadowedBuiltin,
}

impl PatternDetector {
    pub const ALL: [PatternDetector; 11] = [
        PatternDetector::FibonacciMemoBase,
        PatternDetector::TraversalOrder,
        PatternDetector::BisectionBounds,
        PatternDetector::FactorialBaseCase,
        PatternDetector::RecursionWithoutProgress,
        PatternDetector::ConstantIndexOutOfRange,
        PatternDetector::MutableDefaultArgument,
        PatternDetector::UnreachableCode,
        PatternDetector::OffByOneIndex,
        PatternDetector::BooleanLiteralComparison,
        PatternDetector::ShadowedBuiltin,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PatternDetector::FibonacciMemoBase => "fibonacci-memo-base",
            PatternDetector::TraversalOrder => "traversal-order",
            PatternDetector::BisectionBounds => "bisection-bounds",
            PatternDetector::FactorialBaseCase => "factorial-base-case",
            PatternDetector::RecursionWithoutProgress => "recursion-without-progress",
            PatternDetector::ConstantIndexOutOfRange => "constant-index-out-of-range",
            PatternDetector::MutableDefaultArgument => "mutable-default-argument",
            PatternDetector::UnreachableCode => "unreachable-code",
            PatternDetector::OffByOneIndex => "off-by-one-index",
            PatternDetector::BooleanLiteralComparison => "boolean-literal-comparison",
            PatternDetector::ShadowedBuiltin => "shadowed-builtin",
        }
    }

    pub fn inspect(self, tree: &SourceTree<'_>) -> Vec<Finding> {
        match self {
            PatternDetector::FibonacciMemoBase => recursion::fibonacci_memo_base(tree),
            PatternDetector::TraversalOrder => traversal::traversal_order(tree),
            PatternDetector::BisectionBounds => bisection::bisection_bounds(tree),
            PatternDetector::FactorialBaseCase => recursion::factorial_base_case(tree),
            PatternDetector::RecursionWithoutProgress => recursion::recursion_without_progress(tree),
            PatternDetector::ConstantIndexOutOfRange => hygiene::constant_index_out_of_range(tree),
            PatternDetector::MutableDefaultArgument => hygiene::mutable_default_argument(tree),
            PatternDetector::UnreachableCode => hygiene::unreachable_code(tree),
            PatternDetector::OffByOneIndex => logic::off_by_one_index(tree),
            PatternDetector::BooleanLiteralComparison => logic::boolean_literal_comparison(tree),
            PatternDetector::ShadowedBuiltin => logic::shadowed_builtin(tree),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DetectorRegistry {
    detectors: Vec<PatternDetector>,
    forced_fix_confidence: f32,
}

impl Default for DetectorRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_FORCED_FIX_CONFIDENCE)
    }
}

impl DetectorRegistry {
    pub fn new(forced_fix_confidence: f32) -> Self {
        Self {
            detectors: PatternDetector::ALL.to_vec(),
            forced_fix_confidence,
        }
    }

    pub fn with_detectors(detectors: Vec<PatternDetector>, forced_fix_confidence: f32) -> Self {
        Self {
            detectors,
            forced_fix_confidence,
        }
    }

    pub fn forced_fix_confidence(&self) -> f32 {
        self.forced_fix_confidence
    }

    /// All findings, strongest first. Unparseable input yields none.
    pub fn scan(&self, source: &str) -> Vec<Finding> {
        let Ok(tree) = SourceTree::parse(source) else {
            return Vec::new();
        };
        let mut findings: Vec<Finding> = self
            .detectors
            .iter()
            .flat_map(|detector| detector.inspect(&tree))
            .collect();
        findings.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then(a.line.cmp(&b.line))
                .then(a.detector.cmp(b.detector))
        });
        findings
    }

    /// The finding that justifies skipping straight to a forced fix, if any.
    pub fn forced_trigger<'a>(&self, findings: &'a [Finding]) -> Option<&'a Finding> {
        findings
            .iter()
            .find(|f| f.confidence >= self.forced_fix_confidence)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  SHARED TREE HELPERS
// ═══════════════════════════════════════════════════════════════════════════

/// Source text with all whitespace removed, for shape comparisons.
pub(crate) fn squash(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

pub(crate) fn int_literal(tree: &SourceTree<'_>, node: Node<'_>) -> Option<i64> {
    match node.kind() {
        "integer" => tree.text(node).replace('_', "").parse().ok(),
        "unary_operator" => {
            let operand = node.child_by_field_name("argument")?;
            let value = int_literal(tree, operand)?;
            let op = node.child_by_field_name("operator")?;
            match op.kind() {
                "-" => Some(-value),
                "+" => Some(value),
                _ => None,
            }
        }
        "parenthesized_expression" => int_literal(tree, node.named_child(0)?),
        _ => None,
    }
}

/// Calls inside `scope` whose callee text is exactly one of `names`.
pub(crate) fn calls_to<'t>(tree: &SourceTree<'_>, scope: Node<'t>, names: &[&str]) -> Vec<Node<'t>> {
    descendants(scope)
        .into_iter()
        .filter(|n| n.kind() == "call")
        .filter(|n| {
            let callee = n
                .child_by_field_name("function")
                .map(|f| tree.text(f))
                .unwrap_or("");
            let bare = callee.rsplit('.').next().unwrap_or(callee);
            names.iter().any(|name| callee == *name || (callee.starts_with("self.") && bare == *name))
        })
        .collect()
}

/// Positional argument expressions of a call.
pub(crate) fn call_arguments<'t>(call: Node<'t>) -> Vec<Node<'t>> {
    call.child_by_field_name("arguments")
        .map(autofix_core::syntax::named_children)
        .unwrap_or_default()
        .into_iter()
        .filter(|n| n.kind() != "keyword_argument" && n.kind() != "comment")
        .collect()
}

/// Parameter names of a function in declaration order, `self` excluded.
pub(crate) fn parameter_names<'s>(tree: &SourceTree<'s>, func: Node<'_>) -> Vec<&'s str> {
    let Some(params) = func.child_by_field_name("parameters") else {
        return Vec::new();
    };
    autofix_core::syntax::named_children(params)
        .into_iter()
        .filter_map(|p| match p.kind() {
            "identifier" => Some(tree.text(p)),
            "typed_parameter" => p.named_child(0).map(|n| tree.text(n)),
            "default_parameter" | "typed_default_parameter" => {
                p.child_by_field_name("name").map(|n| tree.text(n))
            }
            _ => None,
        })
        .filter(|name| *name != "self")
        .collect()
}

/// True when `node` sits inside `scope` without crossing another function.
pub(crate) fn directly_within(node: Node<'_>, scope: Node<'_>) -> bool {
    for ancestor in autofix_core::syntax::ancestors(node) {
        if ancestor.id() == scope.id() {
            return true;
        }
        if ancestor.kind() == "function_definition" {
            return false;
        }
    }
    false
}
