//! Undefined-name rule: bring in the standard-library module or symbol that
//! the failing name most likely refers to.

use super::edit_replacing;
use autofix_core::syntax::{SourceTree, end_line_of, line_of, named_children};
use autofix_core::{FailureDescriptor, LineEdit};
use regex::Regex;
use std::sync::OnceLock;

const STDLIB_MODULES: &[&str] = &[
    "math", "random", "re", "json", "os", "sys", "time", "itertools", "functools",
    "collections", "heapq", "bisect", "statistics", "string", "datetime", "copy", "operator",
    "typing", "pathlib", "textwrap", "fractions", "decimal", "pprint",
];

const SYMBOL_MODULES: &[(&str, &str)] = &[
    ("sqrt", "math"),
    ("floor", "math"),
    ("ceil", "math"),
    ("pi", "math"),
    ("inf", "math"),
    ("log", "math"),
    ("log2", "math"),
    ("gcd", "math"),
    ("isqrt", "math"),
    ("factorial", "math"),
    ("randint", "random"),
    ("choice", "random"),
    ("shuffle", "random"),
    ("uniform", "random"),
    ("deque", "collections"),
    ("defaultdict", "collections"),
    ("Counter", "collections"),
    ("OrderedDict", "collections"),
    ("namedtuple", "collections"),
    ("heappush", "heapq"),
    ("heappop", "heapq"),
    ("heapify", "heapq"),
    ("bisect_left", "bisect"),
    ("bisect_right", "bisect"),
    ("insort", "bisect"),
    ("reduce", "functools"),
    ("lru_cache", "functools"),
    ("cache", "functools"),
    ("partial", "functools"),
    ("permutations", "itertools"),
    ("combinations", "itertools"),
    ("product", "itertools"),
    ("accumulate", "itertools"),
    ("chain", "itertools"),
    ("mean", "statistics"),
    ("median", "statistics"),
    ("sleep", "time"),
    ("dataclass", "dataclasses"),
    ("Path", "pathlib"),
    ("pprint", "pprint"),
    ("dedent", "textwrap"),
    ("Fraction", "fractions"),
    ("Decimal", "decimal"),
];

fn undefined_name_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"name '(?P<name>[A-Za-z_]\w*)' is not defined").ok())
        .as_ref()
}

/// First line after the module prologue: docstring, comments, `__future__` and imports.
fn import_insertion_line(tree: &SourceTree<'_>) -> usize {
    let mut after = 0;
    for child in named_children(tree.root()) {
        let prologue = match child.kind() {
            "comment" | "future_import_statement" | "import_statement" | "import_from_statement" => true,
            "expression_statement" => child
                .named_child(0)
                .is_some_and(|n| n.kind() == "string" && after == 0),
            _ => false,
        };
        if !prologue {
            break;
        }
        after = end_line_of(child);
    }
    after + 1
}

pub(super) fn undefined_name_import(
    tree: &SourceTree<'_>,
    failure: &FailureDescriptor,
) -> Option<LineEdit> {
    let caps = undefined_name_re()?.captures(&failure.message)?;
    let name = caps.name("name")?.as_str();

    if STDLIB_MODULES.contains(&name) {
        return Some(LineEdit::insert_before(
            import_insertion_line(tree),
            vec![format!("import {name}")],
        ));
    }

    let (_, module) = SYMBOL_MODULES.iter().find(|(symbol, _)| *symbol == name)?;
    let imported = tree.imported_modules();
    if imported.iter().any(|m| m == module) {
        // `import math` is already there; qualify the bare use instead.
        let line = failure.line?;
        let usage = tree.nodes().into_iter().find(|n| {
            n.kind() == "identifier"
                && line_of(*n) == line
                && tree.text(*n) == name
                && n.parent().is_none_or(|p| p.kind() != "attribute")
        })?;
        return edit_replacing(
            tree.source(),
            usage.start_byte(),
            usage.end_byte(),
            &format!("{module}.{name}"),
        );
    }

    Some(LineEdit::insert_before(
        import_insertion_line(tree),
        vec![format!("from {module} import {name}")],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name_error(name: &str, line: usize) -> FailureDescriptor {
        FailureDescriptor::runtime(
            Some("NameError"),
            format!("name '{name}' is not defined"),
            Some(line),
        )
    }

    fn fix(source: &str, failure: FailureDescriptor) -> Option<String> {
        let tree = SourceTree::parse(source).unwrap();
        undefined_name_import(&tree, &failure).and_then(|e| e.apply(source))
    }

    #[test]
    fn symbol_import_goes_after_docstring_and_comments() {
        let source = "\"\"\"Roots.\"\"\"\n# helpers\nprint(sqrt(16))\n";
        assert_eq!(
            fix(source, name_error("sqrt", 3)).unwrap(),
            "\"\"\"Roots.\"\"\"\n# helpers\nfrom math import sqrt\nprint(sqrt(16))\n"
        );
    }

    #[test]
    fn missing_module_is_imported() {
        let source = "print(math.pi)\n";
        assert_eq!(
            fix(source, name_error("math", 1)).unwrap(),
            "import math\nprint(math.pi)\n"
        );
    }

    #[test]
    fn imported_module_qualifies_bare_symbol() {
        let source = "import math\n\nprint(sqrt(2))\n";
        assert_eq!(
            fix(source, name_error("sqrt", 3)).unwrap(),
            "import math\n\nprint(math.sqrt(2))\n"
        );
    }

    #[test]
    fn unknown_names_are_not_guessed() {
        assert!(fix("print(frobnicate(1))\n", name_error("frobnicate", 1)).is_none());
    }
}
