//! Low-confidence hygiene checks. They feed the model prompt as context but
//! never force a fix on their own.

use super::{Finding, PatternDetector, int_literal};
use autofix_core::syntax::{SourceTree, line_of, named_children};
use tree_sitter::Node;

const TERMINATORS: &[&str] = &[
    "return_statement",
    "raise_statement",
    "break_statement",
    "continue_statement",
];

pub(super) fn mutable_default_argument(tree: &SourceTree<'_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    for func in tree.functions() {
        let Some(params) = func.child_by_field_name("parameters") else {
            continue;
        };
        for param in named_children(params) {
            if !matches!(param.kind(), "default_parameter" | "typed_default_parameter") {
                continue;
            }
            let Some(value) = param.child_by_field_name("value") else {
                continue;
            };
            if !matches!(value.kind(), "list" | "dictionary" | "set") {
                continue;
            }
            let pname = tree.field_text(param, "name");
            findings.push(Finding::new(
                PatternDetector::MutableDefaultArgument,
                0.4,
                line_of(param),
                format!(
                    "`{}` shares the default `{pname}` across calls",
                    tree.name_of(func)
                ),
                format!("default `{pname}` to None and create it inside the function"),
            ));
        }
    }
    findings
}

fn enclosing_scope(node: Node<'_>) -> Option<usize> {
    autofix_core::syntax::ancestors(node)
        .find(|a| a.kind() == "function_definition")
        .map(|a| a.id())
}

pub(super) fn constant_index_out_of_range(tree: &SourceTree<'_>) -> Vec<Finding> {
    let nodes = tree.nodes();
    let mut findings = Vec::new();

    for assign in nodes.iter().filter(|n| n.kind() == "assignment") {
        let (Some(left), Some(right)) = (
            assign.child_by_field_name("left"),
            assign.child_by_field_name("right"),
        ) else {
            continue;
        };
        if left.kind() != "identifier" || right.kind() != "list" {
            continue;
        }
        let name = tree.text(left);
        let scope = enclosing_scope(*assign);
        let len = named_children(right)
            .into_iter()
            .filter(|n| n.kind() != "comment")
            .count() as i64;

        let mut mutated = false;
        let mut reads = Vec::new();
        for node in nodes.iter().filter(|n| enclosing_scope(**n) == scope) {
            match node.kind() {
                "assignment" | "augmented_assignment" if node.id() != assign.id() => {
                    if node.child_by_field_name("left").map(|l| tree.text(l)) == Some(name) {
                        mutated = true;
                    }
                }
                "call" => {
                    let callee = tree.field_text(*node, "function");
                    if callee.starts_with(&format!("{name}.")) {
                        mutated = true;
                    }
                }
                "subscript" if node.start_byte() > assign.end_byte() => {
                    if tree.field_text(*node, "value") == name {
                        reads.push(*node);
                    }
                }
                _ => {}
            }
        }
        if mutated {
            continue;
        }

        for read in reads {
            let Some(index) = read
                .child_by_field_name("subscript")
                .and_then(|s| int_literal(tree, s))
            else {
                continue;
            };
            if index >= len || index < -len {
                findings.push(Finding::new(
                    PatternDetector::ConstantIndexOutOfRange,
                    0.7,
                    line_of(read),
                    format!("`{name}` has {len} elements but is indexed at {index}"),
                    format!("index `{name}` within 0..{len}"),
                ));
            }
        }
    }
    findings
}

pub(super) fn unreachable_code(tree: &SourceTree<'_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    for block in tree.nodes_of_kind("block") {
        let statements: Vec<Node<'_>> = named_children(block)
            .into_iter()
            .filter(|n| n.kind() != "comment")
            .collect();
        let Some(pos) = statements
            .iter()
            .position(|s| TERMINATORS.contains(&s.kind()))
        else {
            continue;
        };
        if let Some(dead) = statements.get(pos + 1) {
            findings.push(Finding::new(
                PatternDetector::UnreachableCode,
                0.3,
                line_of(*dead),
                format!(
                    "code after `{}` never runs",
                    tree.text(statements[pos]).lines().next().unwrap_or("").trim()
                ),
                "remove it or move it before the early exit",
            ));
        }
    }
    findings
}
