//! Recursive-function shapes: fibonacci memo seeds, factorial base case,
//! recursion that never shrinks its input.

use super::{
    Finding, PatternDetector, call_arguments, calls_to, directly_within, int_literal,
    parameter_names, squash,
};
use autofix_core::syntax::{SourceTree, descendants, line_of, named_children};
use std::collections::BTreeMap;
use tree_sitter::Node;

const MEMO_NAME_MARKERS: &[&str] = &["memo", "cache"];

fn format_seeds(seeds: &BTreeMap<i64, i64>) -> String {
    let body = seeds
        .iter()
        .map(|(k, v)| format!("{k}: {v}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{{body}}}")
}

fn looks_like_fibonacci(tree: &SourceTree<'_>, func: Node<'_>) -> bool {
    let name = tree.name_of(func);
    if name.to_ascii_lowercase().contains("fib") {
        return true;
    }
    let Some(param) = parameter_names(tree, func).first().copied() else {
        return false;
    };
    let first_args: Vec<String> = calls_to(tree, func, &[name])
        .into_iter()
        .filter_map(|call| call_arguments(call).first().map(|a| squash(tree.text(*a))))
        .collect();
    first_args.contains(&format!("{param}-1")) && first_args.contains(&format!("{param}-2"))
}

/// Base cases of a single-parameter recurrence, e.g. `if n == 0: return 0`.
fn base_cases(tree: &SourceTree<'_>, func: Node<'_>) -> BTreeMap<i64, i64> {
    let mut seeds = BTreeMap::new();
    let Some(param) = parameter_names(tree, func).first().copied() else {
        return seeds;
    };

    for branch in descendants(func)
        .into_iter()
        .filter(|n| n.kind() == "if_statement" && directly_within(*n, func))
    {
        let condition = squash(tree.field_text(branch, "condition"));
        let Some(ret) = branch
            .child_by_field_name("consequence")
            .and_then(|block| named_children(block).into_iter().next())
            .filter(|stmt| stmt.kind() == "return_statement")
        else {
            continue;
        };
        let Some(value_node) = ret.named_child(0) else {
            continue;
        };
        let returns_param = tree.text(value_node).trim() == param;
        let literal = int_literal(tree, value_node);

        if let Some(key) = condition
            .strip_prefix(&format!("{param}=="))
            .and_then(|k| k.parse::<i64>().ok())
        {
            let value = if returns_param { Some(key) } else { literal };
            if let Some(value) = value {
                seeds.insert(key, value);
            }
            continue;
        }

        let covers_zero_and_one = condition == format!("{param}<=1")
            || condition == format!("{param}<2")
            || condition == format!("{param}in(0,1)")
            || condition == format!("{param}in[0,1]");
        if covers_zero_and_one {
            for key in [0, 1] {
                let value = if returns_param { Some(key) } else { literal };
                if let Some(value) = value {
                    seeds.entry(key).or_insert(value);
                }
            }
        }
    }

    seeds.entry(0).or_insert(0);
    seeds.entry(1).or_insert(1);
    seeds
}

/// Integer-keyed dictionary literals that plausibly act as this function's memo.
fn memo_dictionaries<'t>(tree: &'t SourceTree<'_>, func: Node<'t>) -> Vec<Node<'t>> {
    let root = tree.root();
    let referenced: Vec<&str> = descendants(func)
        .into_iter()
        .filter(|n| n.kind() == "identifier")
        .map(|n| tree.text(n))
        .collect();

    descendants(root)
        .into_iter()
        .filter(|n| n.kind() == "dictionary")
        .filter(|dict| {
            let pairs = named_children(*dict)
                .into_iter()
                .filter(|p| p.kind() == "pair")
                .collect::<Vec<_>>();
            !pairs.is_empty()
                && pairs.iter().all(|p| {
                    p.child_by_field_name("key")
                        .and_then(|k| int_literal(tree, k))
                        .is_some()
                })
        })
        .filter(|dict| {
            if autofix_core::syntax::ancestors(*dict).any(|a| a.id() == func.id()) {
                return true;
            }
            let Some(assign) = dict.parent().filter(|p| p.kind() == "assignment") else {
                return false;
            };
            let target = tree.field_text(assign, "left").trim();
            let lower = target.to_ascii_lowercase();
            referenced.contains(&target) || MEMO_NAME_MARKERS.iter().any(|m| lower.contains(m))
        })
        .collect()
}

fn dict_seeds(tree: &SourceTree<'_>, dict: Node<'_>) -> Vec<(i64, i64)> {
    named_children(dict)
        .into_iter()
        .filter(|p| p.kind() == "pair")
        .filter_map(|p| {
            let key = int_literal(tree, p.child_by_field_name("key")?)?;
            let value = int_literal(tree, p.child_by_field_name("value")?)?;
            Some((key, value))
        })
        .collect()
}

pub(super) fn fibonacci_memo_base(tree: &SourceTree<'_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    for func in tree.functions() {
        if !looks_like_fibonacci(tree, func) {
            continue;
        }
        let name = tree.name_of(func);
        let expected = base_cases(tree, func);

        for dict in memo_dictionaries(tree, func) {
            let mismatch = dict_seeds(tree, dict)
                .into_iter()
                .find(|(key, value)| expected.get(key).is_some_and(|e| e != value));
            if let Some((key, value)) = mismatch {
                let want = expected.get(&key).copied().unwrap_or_default();
                findings.push(Finding::new(
                    PatternDetector::FibonacciMemoBase,
                    0.95,
                    line_of(dict),
                    format!(
                        "`{name}` seeds its memo with {key}: {value} but its base case gives {name}({key}) = {want}"
                    ),
                    format!("seed the memo with {}", format_seeds(&expected)),
                ));
            }
        }

        for ret in descendants(func)
            .into_iter()
            .filter(|n| n.kind() == "return_statement" && directly_within(*n, func))
        {
            let Some(value) = ret.named_child(0).filter(|v| v.kind() == "subscript") else {
                continue;
            };
            let constant_key = value
                .child_by_field_name("subscript")
                .and_then(|s| int_literal(tree, s));
            if let Some(key) = constant_key {
                findings.push(Finding::new(
                    PatternDetector::FibonacciMemoBase,
                    0.9,
                    line_of(ret),
                    format!("`{name}` returns the memo entry for the constant {key} instead of its argument"),
                    "return the memo entry keyed by the argument",
                ));
            }
        }
    }
    findings
}

pub(super) fn factorial_base_case(tree: &SourceTree<'_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    for func in tree.functions() {
        let name = tree.name_of(func);
        let lower = name.to_ascii_lowercase();
        if !(lower == "fact" || lower.contains("factorial")) {
            continue;
        }
        let zero_return = descendants(func).into_iter().find(|n| {
            n.kind() == "return_statement"
                && directly_within(*n, func)
                && n.named_child(0).and_then(|v| int_literal(tree, v)) == Some(0)
        });
        if let Some(ret) = zero_return {
            findings.push(Finding::new(
                PatternDetector::FactorialBaseCase,
                0.9,
                line_of(ret),
                format!("`{name}` returns 0 in its base case, which zeroes every product"),
                "the factorial base case returns 1",
            ));
        }
    }
    findings
}

pub(super) fn recursion_without_progress(tree: &SourceTree<'_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    for func in tree.functions() {
        let name = tree.name_of(func);
        let calls: Vec<Node<'_>> = calls_to(tree, func, &[name])
            .into_iter()
            .filter(|c| directly_within(*c, func))
            .collect();
        let Some(first) = calls.first() else {
            continue;
        };
        let params = parameter_names(tree, func);

        let unchanged = calls.iter().all(|call| {
            call_arguments(*call)
                .iter()
                .all(|arg| arg.kind() == "identifier" && params.contains(&tree.text(*arg)))
        });
        let has_branch = descendants(func).into_iter().any(|n| {
            directly_within(n, func)
                && matches!(
                    n.kind(),
                    "if_statement" | "conditional_expression" | "match_statement" | "while_statement"
                )
        });

        let message = if unchanged {
            format!("`{name}` calls itself with its arguments unchanged")
        } else if !has_branch {
            format!("`{name}` recurses on every path and has no base case")
        } else {
            continue;
        };
        findings.push(Finding::new(
            PatternDetector::RecursionWithoutProgress,
            0.6,
            line_of(*first),
            message,
            "add a base case and shrink the argument on each call",
        ));
    }
    findings
}
