//! Bisection loops: float midpoints and bounds that never move past the midpoint.

use super::{Finding, PatternDetector, directly_within};
use autofix_core::syntax::{SourceTree, descendants, line_of, named_children};
use tree_sitter::Node;

/// A `while lo <op> hi` loop header.
pub(crate) struct BisectionLoop<'t> {
    pub node: Node<'t>,
    pub lower: String,
    pub upper: String,
    pub inclusive: bool,
}

/// Operands and operator of a two-operand comparison, e.g. `lo <= hi`.
pub(crate) fn comparison_parts<'t>(node: Node<'t>) -> Option<(Node<'t>, String, Node<'t>)> {
    let node = if node.kind() == "parenthesized_expression" {
        node.named_child(0)?
    } else {
        node
    };
    if node.kind() != "comparison_operator" {
        return None;
    }
    let operands = named_children(node);
    if operands.len() != 2 {
        return None;
    }
    let mut cursor = node.walk();
    let op = node
        .children(&mut cursor)
        .find(|c| !c.is_named())
        .map(|c| c.kind().to_string())?;
    Some((operands[0], op, operands[1]))
}

pub(crate) fn bisection_loops<'t>(tree: &SourceTree<'_>, scope: Node<'t>) -> Vec<BisectionLoop<'t>> {
    descendants(scope)
        .into_iter()
        .filter(|n| n.kind() == "while_statement")
        .filter_map(|node| {
            let (left, op, right) = comparison_parts(node.child_by_field_name("condition")?)?;
            if left.kind() != "identifier" || right.kind() != "identifier" {
                return None;
            }
            let inclusive = match op.as_str() {
                "<=" => true,
                "<" => false,
                _ => return None,
            };
            Some(BisectionLoop {
                node,
                lower: tree.text(left).to_string(),
                upper: tree.text(right).to_string(),
                inclusive,
            })
        })
        .collect()
}

/// `name = expr` assignments inside `scope` with a single identifier target.
pub(crate) fn simple_assignments<'t>(
    tree: &SourceTree<'_>,
    scope: Node<'t>,
) -> Vec<(String, Node<'t>, Node<'t>)> {
    descendants(scope)
        .into_iter()
        .filter(|n| n.kind() == "assignment")
        .filter_map(|assign| {
            let left = assign.child_by_field_name("left")?;
            let right = assign.child_by_field_name("right")?;
            (left.kind() == "identifier").then(|| (tree.text(left).to_string(), assign, right))
        })
        .collect()
}

fn mentions_identifier(tree: &SourceTree<'_>, node: Node<'_>, name: &str) -> bool {
    descendants(node)
        .into_iter()
        .any(|n| n.kind() == "identifier" && tree.text(n) == name)
}

pub(crate) fn true_division(node: Node<'_>) -> Option<Node<'_>> {
    descendants(node).into_iter().find_map(|n| {
        if n.kind() != "binary_operator" {
            return None;
        }
        n.child_by_field_name("operator").filter(|op| op.kind() == "/")
    })
}

pub(super) fn bisection_bounds(tree: &SourceTree<'_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    for func in tree.functions() {
        let name = tree.name_of(func);
        for lp in bisection_loops(tree, func) {
            if !directly_within(lp.node, func) {
                continue;
            }
            let assignments = simple_assignments(tree, func);
            let Some((mid, mid_assign, mid_value)) = assignments.iter().find(|(_, _, right)| {
                mentions_identifier(tree, *right, &lp.lower)
                    && mentions_identifier(tree, *right, &lp.upper)
            }) else {
                continue;
            };

            if true_division(*mid_value).is_some() {
                findings.push(Finding::new(
                    PatternDetector::BisectionBounds,
                    0.9,
                    line_of(*mid_assign),
                    format!("`{name}` computes `{mid}` with true division, which yields a float index"),
                    "use floor division (//) for the midpoint",
                ));
            }

            for (target, assign, value) in simple_assignments(tree, lp.node) {
                if tree.text(value).trim() != mid {
                    continue;
                }
                if target == lp.lower {
                    findings.push(Finding::new(
                        PatternDetector::BisectionBounds,
                        0.9,
                        line_of(assign),
                        format!("`{name}` sets `{target} = {mid}`, so the search window can stop shrinking"),
                        format!("advance the lower bound with `{target} = {mid} + 1`"),
                    ));
                } else if target == lp.upper && lp.inclusive {
                    findings.push(Finding::new(
                        PatternDetector::BisectionBounds,
                        0.85,
                        line_of(assign),
                        format!(
                            "`{name}` sets `{target} = {mid}` under `{} <= {}`, which can loop forever",
                            lp.lower, lp.upper
                        ),
                        format!("shrink the upper bound with `{target} = {mid} - 1`"),
                    ));
                }
            }
        }
    }
    findings
}
