//! Missing-return rule: a local helper that computes a value but never returns it.

use crate::detect::directly_within;
use autofix_core::syntax::{SourceTree, descendants, end_line_of, line_of, named_children};
use autofix_core::{FailureDescriptor, LineEdit};
use tree_sitter::Node;

/// Name assigned by a statement such as `total = 0` or `total += x`.
fn assigned_name<'s>(tree: &SourceTree<'s>, stmt: Node<'_>) -> Option<&'s str> {
    if stmt.kind() != "expression_statement" {
        return None;
    }
    let inner = stmt.named_child(0)?;
    if !matches!(inner.kind(), "assignment" | "augmented_assignment") {
        return None;
    }
    let left = inner.child_by_field_name("left")?;
    (left.kind() == "identifier").then(|| tree.text(left))
}

/// The value a helper most plausibly meant to return: the last name it
/// assigned at its top level, or the accumulator updated inside its loops.
fn inferred_result<'s>(tree: &SourceTree<'s>, body: Node<'_>) -> Option<&'s str> {
    let statements: Vec<Node<'_>> = named_children(body)
        .into_iter()
        .filter(|n| n.kind() != "comment")
        .collect();

    let top_level: Vec<&str> = statements
        .iter()
        .filter_map(|stmt| assigned_name(tree, *stmt))
        .collect();

    // An accumulator initialised at the top and updated in a later loop.
    for stmt in statements.iter().rev() {
        if !matches!(stmt.kind(), "for_statement" | "while_statement") {
            continue;
        }
        let updated = descendants(*stmt).into_iter().rev().find_map(|n| {
            let name = assigned_name(tree, n)?;
            top_level.contains(&name).then_some(name)
        });
        if updated.is_some() {
            return updated;
        }
    }
    top_level.last().copied()
}

pub(super) fn missing_return(
    tree: &SourceTree<'_>,
    failure: &FailureDescriptor,
) -> Option<LineEdit> {
    let line = failure.line?;
    let called: Vec<&str> = tree
        .nodes()
        .into_iter()
        .filter(|n| n.kind() == "call" && line_of(*n) == line)
        .map(|n| tree.field_text(n, "function"))
        .collect();

    for func in tree.functions() {
        let name = tree.name_of(func);
        if !called.contains(&name) {
            continue;
        }
        let returns = descendants(func)
            .into_iter()
            .any(|n| n.kind() == "return_statement" && directly_within(n, func));
        if returns {
            continue;
        }
        let body = func.child_by_field_name("body")?;
        let first = named_children(body)
            .into_iter()
            .find(|n| n.kind() != "comment")?;
        let result = inferred_result(tree, body)?;
        let indent = tree.indent_of(first);
        return Some(LineEdit::insert_before(
            end_line_of(func) + 1,
            vec![format!("{indent}return {result}")],
        ));
    }
    None
}
