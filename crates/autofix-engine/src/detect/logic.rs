//! Suspicious-logic checks that only add context to the model prompt.

use super::{Finding, PatternDetector, int_literal};
use autofix_core::syntax::{SourceTree, ancestors, descendants, line_of, named_children};
use tree_sitter::Node;

const BUILTINS: &[&str] = &[
    "abs", "all", "any", "bool", "dict", "dir", "filter", "float", "format", "hash", "id",
    "input", "int", "iter", "len", "list", "map", "max", "min", "next", "object", "open", "ord",
    "pow", "print", "range", "reversed", "round", "set", "sorted", "str", "sum", "tuple", "type",
    "zip",
];

/// Loop variable of the nearest enclosing `for ... in range(...)`, if any.
fn range_loop_variable<'s>(tree: &SourceTree<'s>, node: Node<'_>) -> Option<&'s str> {
    let for_stmt = ancestors(node).find(|a| a.kind() == "for_statement")?;
    let target = for_stmt.child_by_field_name("left")?;
    let iter = for_stmt.child_by_field_name("right")?;
    if target.kind() != "identifier" || iter.kind() != "call" {
        return None;
    }
    if tree.field_text(iter, "function") != "range" {
        return None;
    }
    Some(tree.text(target))
}

pub(super) fn off_by_one_index(tree: &SourceTree<'_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    for subscript in tree.nodes_of_kind("subscript") {
        let Some(index) = subscript.child_by_field_name("subscript") else {
            continue;
        };
        if index.kind() != "binary_operator" || tree.field_text(index, "operator") != "+" {
            continue;
        }
        let (Some(left), Some(right)) = (
            index.child_by_field_name("left"),
            index.child_by_field_name("right"),
        ) else {
            continue;
        };
        let Some(step) = int_literal(tree, right).filter(|n| *n > 0) else {
            continue;
        };
        let Some(var) = range_loop_variable(tree, subscript) else {
            continue;
        };
        if left.kind() != "identifier" || tree.text(left) != var {
            continue;
        }
        let seq = tree.field_text(subscript, "value");
        findings.push(Finding::new(
            PatternDetector::OffByOneIndex,
            0.4,
            line_of(subscript),
            format!(
                "`{}` reads {step} past `{var}` on the last pass of the loop",
                tree.text(subscript)
            ),
            format!("stop the range {step} early or guard `{var} + {step} < len({seq})`"),
        ));
    }
    findings
}

pub(super) fn boolean_literal_comparison(tree: &SourceTree<'_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    let conditions = tree
        .nodes()
        .into_iter()
        .filter(|n| matches!(n.kind(), "if_statement" | "elif_clause" | "while_statement"))
        .filter_map(|n| n.child_by_field_name("condition"));
    for condition in conditions {
        for compare in descendants(condition)
            .into_iter()
            .filter(|n| n.kind() == "comparison_operator")
        {
            let Some(literal) = named_children(compare)
                .into_iter()
                .find(|n| matches!(n.kind(), "true" | "false"))
            else {
                continue;
            };
            findings.push(Finding::new(
                PatternDetector::BooleanLiteralComparison,
                0.3,
                line_of(compare),
                format!("`{}` compares against `{}`", tree.text(compare), tree.text(literal)),
                "test the value directly (`if x:` or `if not x:`)",
            ));
        }
    }
    findings
}

pub(super) fn shadowed_builtin(tree: &SourceTree<'_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    for assign in tree.nodes_of_kind("assignment") {
        let Some(left) = assign.child_by_field_name("left") else {
            continue;
        };
        let targets = match left.kind() {
            "identifier" => vec![left],
            "pattern_list" | "tuple_pattern" => named_children(left),
            _ => continue,
        };
        for target in targets {
            let name = tree.text(target);
            if target.kind() != "identifier" || !BUILTINS.contains(&name) {
                continue;
            }
            findings.push(Finding::new(
                PatternDetector::ShadowedBuiltin,
                0.3,
                line_of(target),
                format!("assignment to `{name}` hides the builtin"),
                format!("rename the variable so `{name}()` keeps working"),
            ));
        }
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(detector: PatternDetector, source: &str) -> Vec<Finding> {
        let tree = SourceTree::parse(source).unwrap();
        detector.inspect(&tree)
    }

    #[test]
    fn next_element_read_in_full_range_loop() {
        let findings = run(
            PatternDetector::OffByOneIndex,
            "xs = [3, 1, 2]\nfor i in range(len(xs)):\n    if xs[i] > xs[i + 1]:\n        print(i)\n",
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].line, Some(3));
        assert!(findings[0].message.contains("xs[i + 1]"));
    }

    #[test]
    fn index_of_another_variable_is_ignored() {
        let findings = run(
            PatternDetector::OffByOneIndex,
            "for i in range(3):\n    j = i\n    print(xs[j + 1], xs[i - 1])\nprint(xs[k + 1])\n",
        );
        assert!(findings.is_empty());
    }

    #[test]
    fn comparison_to_true_in_condition() {
        let findings = run(
            PatternDetector::BooleanLiteralComparison,
            "done = False\nif done == True:\n    pass\nwhile done is False:\n    done = True\nflag = done == True\n",
        );
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].line, Some(2));
        assert_eq!(findings[1].line, Some(4));
    }

    #[test]
    fn plain_truthiness_is_fine() {
        let findings = run(
            PatternDetector::BooleanLiteralComparison,
            "if done:\n    pass\nwhile not done:\n    done = True\n",
        );
        assert!(findings.is_empty());
    }

    #[test]
    fn builtin_names_assigned_are_reported() {
        let findings = run(
            PatternDetector::ShadowedBuiltin,
            "list = [1, 2]\nsum, total = 0, 0\nlength = len(list)\n",
        );
        let names: Vec<_> = findings.iter().map(|f| (f.line, f.message.clone())).collect();
        assert_eq!(findings.len(), 2, "{names:?}");
        assert_eq!(findings[0].line, Some(1));
        assert!(findings[1].message.contains("`sum`"));
    }

    #[test]
    fn logic_hints_never_force_a_fix() {
        let registry = crate::detect::DetectorRegistry::default();
        let findings = registry.scan(
            "list = [2, 1]\nfor i in range(len(list)):\n    if list[i] == True:\n        print(list[i + 1])\n",
        );
        assert!(findings.iter().any(|f| f.detector == "off-by-one-index"));
        assert!(findings.iter().any(|f| f.detector == "boolean-literal-comparison"));
        assert!(findings.iter().any(|f| f.detector == "shadowed-builtin"));
        assert!(registry.forced_trigger(&findings).is_none());
    }
}
