//! Tree traversal order: a function named for pre/in/post-order must visit the
//! node at the matching point relative to its left and right recursion.

use super::{Finding, PatternDetector};
use autofix_core::syntax::{SourceTree, descendants, line_of};
use tree_sitter::Node;

const VALUE_ATTRS: &[&str] = &[".val", ".value", ".data", ".key"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Visit,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Order {
    Pre,
    In,
    Post,
}

impl Order {
    fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase().replace('_', "");
        if lower.contains("preorder") {
            Some(Order::Pre)
        } else if lower.contains("inorder") {
            Some(Order::In)
        } else if lower.contains("postorder") {
            Some(Order::Post)
        } else {
            None
        }
    }

    fn from_steps(steps: [Step; 3]) -> Option<Self> {
        match steps {
            [Step::Visit, Step::Left, Step::Right] => Some(Order::Pre),
            [Step::Left, Step::Visit, Step::Right] => Some(Order::In),
            [Step::Left, Step::Right, Step::Visit] => Some(Order::Post),
            _ => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Order::Pre => "pre-order (node, left, right)",
            Order::In => "in-order (left, node, right)",
            Order::Post => "post-order (left, right, node)",
        }
    }
}

fn mentions_value(text: &str) -> bool {
    VALUE_ATTRS.iter().any(|attr| text.contains(attr))
}

/// Names that count as "this traversal recursing": the function itself and
/// any helper defined inside it.
fn recursive_names<'s>(tree: &SourceTree<'s>, func: Node<'_>) -> Vec<&'s str> {
    descendants(func)
        .into_iter()
        .filter(|n| n.kind() == "function_definition")
        .map(|n| tree.name_of(n))
        .collect()
}

fn classify_step(tree: &SourceTree<'_>, node: Node<'_>, names: &[&str]) -> Option<Step> {
    match node.kind() {
        "call" => {
            let callee = node
                .child_by_field_name("function")
                .map(|f| tree.text(f))
                .unwrap_or("");
            let args = node
                .child_by_field_name("arguments")
                .map(|a| tree.text(a))
                .unwrap_or("");
            let bare = callee.rsplit('.').next().unwrap_or(callee);
            if names.contains(&bare) {
                if args.contains(".left") {
                    return Some(Step::Left);
                }
                if args.contains(".right") {
                    return Some(Step::Right);
                }
                return None;
            }
            let visits = callee.ends_with(".append") || callee == "print" || bare == "visit";
            (visits && mentions_value(args)).then_some(Step::Visit)
        }
        "yield" | "list" => {
            let text = tree.text(node);
            let recursive = names.iter().any(|name| text.contains(&format!("{name}(")));
            (!recursive && mentions_value(text)).then_some(Step::Visit)
        }
        _ => None,
    }
}

pub(super) fn traversal_order(tree: &SourceTree<'_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    for func in tree.functions() {
        let name = tree.name_of(func);
        let Some(expected) = Order::from_name(name) else {
            continue;
        };
        // Nested helpers are covered through their enclosing traversal.
        if autofix_core::syntax::ancestors(func)
            .any(|a| a.kind() == "function_definition" && Order::from_name(tree.name_of(a)).is_some())
        {
            continue;
        }
        let names = recursive_names(tree, func);

        let mut first: [Option<usize>; 3] = [None; 3];
        for node in descendants(func).into_iter().skip(1) {
            let Some(step) = classify_step(tree, node, &names) else {
                continue;
            };
            let slot = match step {
                Step::Visit => 0,
                Step::Left => 1,
                Step::Right => 2,
            };
            first[slot].get_or_insert(node.start_byte());
        }
        let [Some(visit), Some(left), Some(right)] = first else {
            continue;
        };

        let mut steps = [(visit, Step::Visit), (left, Step::Left), (right, Step::Right)];
        steps.sort_by_key(|(pos, _)| *pos);
        let actual = Order::from_steps([steps[0].1, steps[1].1, steps[2].1]);
        if actual == Some(expected) {
            continue;
        }

        let observed = actual.map(Order::label).unwrap_or("a non-standard order");
        findings.push(Finding::new(
            PatternDetector::TraversalOrder,
            0.9,
            line_of(func),
            format!("`{name}` visits nodes in {observed}"),
            format!("a function named `{name}` should traverse {}", expected.label()),
        ));
    }
    findings
}
