//! Index-bound rules: bisection upper bounds, loop ranges that overrun, and
//! float midpoints used as indices.

use super::edit_replacing;
use crate::detect::{call_arguments, int_literal, squash};
use crate::detect::bisection::{bisection_loops, comparison_parts, simple_assignments, true_division};
use autofix_core::syntax::{SourceTree, ancestors, descendants, line_of, named_children};
use autofix_core::{FailureDescriptor, LineEdit};
use tree_sitter::Node;

fn enclosing_scope<'t>(tree: &'t SourceTree<'_>, node: Node<'t>) -> Node<'t> {
    ancestors(node)
        .find(|a| a.kind() == "function_definition")
        .unwrap_or_else(|| tree.root())
}

fn is_len_call(tree: &SourceTree<'_>, node: Node<'_>) -> bool {
    node.kind() == "call" && tree.field_text(node, "function") == "len"
}

/// The `len(...)` expression last assigned to `name` before `before_byte`.
fn len_initializer<'t>(
    tree: &SourceTree<'_>,
    scope: Node<'t>,
    name: &str,
    before_byte: usize,
) -> Option<Node<'t>> {
    let mut found = None;
    for assign in descendants(scope)
        .into_iter()
        .filter(|n| n.kind() == "assignment" && n.end_byte() <= before_byte)
    {
        let (Some(left), Some(right)) = (
            assign.child_by_field_name("left"),
            assign.child_by_field_name("right"),
        ) else {
            continue;
        };
        let value = match (left.kind(), right.kind()) {
            ("identifier", _) if tree.text(left) == name => Some(right),
            ("pattern_list" | "tuple_pattern", "expression_list" | "tuple") => {
                let targets = named_children(left);
                let values = named_children(right);
                targets
                    .iter()
                    .position(|t| tree.text(*t) == name)
                    .and_then(|idx| values.get(idx).copied())
            }
            _ => None,
        };
        match value {
            Some(v) if is_len_call(tree, v) => found = Some(v),
            // Reassigned to something else; an older len() no longer applies.
            Some(_) => found = None,
            None => {}
        }
    }
    found
}

pub(super) fn bisection_upper_bound(
    tree: &SourceTree<'_>,
    failure: &FailureDescriptor,
) -> Option<LineEdit> {
    let line = failure.line?;
    let scope = enclosing_scope(tree, tree.innermost_enclosing(line, "while_statement")?);
    let lp = bisection_loops(tree, scope)
        .into_iter()
        .filter(|lp| autofix_core::syntax::spans_line(lp.node, line))
        .last()?;
    if !lp.inclusive {
        return None;
    }
    let init = len_initializer(tree, scope, &lp.upper, lp.node.start_byte())?;
    let replacement = format!("{} - 1", tree.text(init));
    edit_replacing(tree.source(), init.start_byte(), init.end_byte(), &replacement)
}

pub(super) fn loop_range_overrun(
    tree: &SourceTree<'_>,
    failure: &FailureDescriptor,
) -> Option<LineEdit> {
    let line = failure.line?;
    if let Some(edit) = for_range_overrun(tree, line) {
        return Some(edit);
    }
    while_len_overrun(tree, line)
}

/// `for i in range(..len(x) + k)` or `range(len(x))` feeding `x[i + 1]`.
fn for_range_overrun(tree: &SourceTree<'_>, line: usize) -> Option<LineEdit> {
    let for_node = tree.innermost_enclosing(line, "for_statement")?;
    let iter = for_node.child_by_field_name("right")?;
    if iter.kind() != "call" || tree.field_text(iter, "function") != "range" {
        return None;
    }
    let args = call_arguments(iter);
    let stop = match args.len() {
        1 => args[0],
        2 | 3 => args[1],
        _ => return None,
    };

    if stop.kind() == "binary_operator" {
        let op = stop.child_by_field_name("operator")?;
        let left = stop.child_by_field_name("left")?;
        let right = stop.child_by_field_name("right")?;
        if op.kind() == "+" && is_len_call(tree, left) && int_literal(tree, right)? > 0 {
            return edit_replacing(
                tree.source(),
                stop.start_byte(),
                stop.end_byte(),
                tree.text(left),
            );
        }
        return None;
    }

    if is_len_call(tree, stop) {
        let target = tree.text(call_arguments(stop).first().copied()?);
        let var = tree.field_text(for_node, "left");
        let failing = squash(tree.line_text(line)?);
        if failing.contains(&format!("{target}[{var}+1]")) {
            let replacement = format!("{} - 1", tree.text(stop));
            return edit_replacing(tree.source(), stop.start_byte(), stop.end_byte(), &replacement);
        }
    }
    None
}

/// `while i <= len(x)` around the failing line.
fn while_len_overrun(tree: &SourceTree<'_>, line: usize) -> Option<LineEdit> {
    let while_node = tree.innermost_enclosing(line, "while_statement")?;
    let condition = while_node.child_by_field_name("condition")?;
    let (_, op, right) = comparison_parts(condition)?;
    if op != "<=" || !is_len_call(tree, right) {
        return None;
    }
    let comparison = if condition.kind() == "parenthesized_expression" {
        condition.named_child(0)?
    } else {
        condition
    };
    let mut cursor = comparison.walk();
    let op_node = comparison
        .children(&mut cursor)
        .find(|c| !c.is_named() && c.kind() == "<=")?;
    edit_replacing(tree.source(), op_node.start_byte(), op_node.end_byte(), "<")
}

pub(super) fn float_index_division(
    tree: &SourceTree<'_>,
    failure: &FailureDescriptor,
) -> Option<LineEdit> {
    let line = failure.line?;
    let on_line: Vec<Node<'_>> = tree
        .nodes()
        .into_iter()
        .filter(|n| n.kind() == "subscript" && line_of(*n) == line)
        .collect();

    // Division written straight into the index: `xs[n / 2]`.
    for sub in &on_line {
        if let Some(op) = sub.child_by_field_name("subscript").and_then(true_division) {
            return edit_replacing(tree.source(), op.start_byte(), op.end_byte(), "//");
        }
    }

    let index_names: Vec<&str> = on_line
        .iter()
        .filter_map(|sub| sub.child_by_field_name("subscript"))
        .filter(|idx| idx.kind() == "identifier")
        .map(|idx| tree.text(idx))
        .collect();
    let scope = enclosing_scope(tree, *on_line.first()?);
    simple_assignments(tree, scope)
        .into_iter()
        .filter(|(target, _, _)| index_names.contains(&target.as_str()))
        .find_map(|(_, _, value)| true_division(value))
        .and_then(|op| edit_replacing(tree.source(), op.start_byte(), op.end_byte(), "//"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_error(line: usize) -> FailureDescriptor {
        FailureDescriptor::runtime(Some("IndexError"), "list index out of range", Some(line))
    }

    fn apply(source: &str, edit: Option<LineEdit>) -> String {
        edit.and_then(|e| e.apply(source)).unwrap()
    }

    #[test]
    fn separate_upper_bound_assignment_is_adjusted() {
        let source = "def search(xs, t):\n    lo = 0\n    hi = len(xs)\n    while lo <= hi:\n        mid = (lo + hi) // 2\n        if xs[mid] < t:\n            lo = mid + 1\n        else:\n            hi = mid - 1\n    return lo\n";
        let tree = SourceTree::parse(source).unwrap();
        let out = apply(source, bisection_upper_bound(&tree, &index_error(6)));
        assert!(out.contains("    hi = len(xs) - 1\n"));
    }

    #[test]
    fn half_open_loop_is_left_alone() {
        let source = "def search(xs, t):\n    lo, hi = 0, len(xs)\n    while lo < hi:\n        mid = (lo + hi) // 2\n        if xs[mid] < t:\n            lo = mid + 1\n        else:\n            hi = mid\n    return lo\n";
        let tree = SourceTree::parse(source).unwrap();
        assert!(bisection_upper_bound(&tree, &index_error(5)).is_none());
    }

    #[test]
    fn range_with_extra_step_is_trimmed() {
        let source = "xs = [1, 2, 3]\nfor i in range(len(xs) + 1):\n    print(xs[i])\n";
        let tree = SourceTree::parse(source).unwrap();
        let out = apply(source, loop_range_overrun(&tree, &index_error(3)));
        assert_eq!(out, "xs = [1, 2, 3]\nfor i in range(len(xs)):\n    print(xs[i])\n");
    }

    #[test]
    fn lookahead_index_shrinks_range() {
        let source = "xs = [3, 1, 2]\nfor i in range(len(xs)):\n    if xs[i] > xs[i + 1]:\n        print(i)\n";
        let tree = SourceTree::parse(source).unwrap();
        let out = apply(source, loop_range_overrun(&tree, &index_error(3)));
        assert!(out.contains("for i in range(len(xs) - 1):"));
    }

    #[test]
    fn inclusive_while_against_len_becomes_strict() {
        let source = "xs = [1, 2]\ni = 0\nwhile i <= len(xs):\n    print(xs[i])\n    i += 1\n";
        let tree = SourceTree::parse(source).unwrap();
        let out = apply(source, loop_range_overrun(&tree, &index_error(4)));
        assert!(out.contains("while i < len(xs):"));
    }

    #[test]
    fn float_midpoint_becomes_floor_division() {
        let source = "def pick(xs):\n    mid = len(xs) / 2\n    return xs[mid]\n";
        let tree = SourceTree::parse(source).unwrap();
        let failure = FailureDescriptor::runtime(
            Some("TypeError"),
            "list indices must be integers or slices, not float",
            Some(3),
        );
        let out = apply(source, float_index_division(&tree, &failure));
        assert!(out.contains("mid = len(xs) // 2"));
    }
}
