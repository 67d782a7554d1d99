//! Python syntax trees via tree-sitter.

use std::cell::RefCell;
use tree_sitter::{Node, Parser, Tree};

// ═══════════════════════════════════════════════════════════════════════════
//  THREAD-LOCAL PARSER
// ═══════════════════════════════════════════════════════════════════════════
//
// Parsers are reusable across inputs; each worker thread keeps its own.

thread_local! {
    static PYTHON_PARSER: RefCell<Parser> = RefCell::new({
        let mut p = Parser::new();
        // A language mismatch surfaces as a failed parse below.
        let _ = p.set_language(&tree_sitter_python::LANGUAGE.into());
        p
    });
}

fn parse_with_pooled_parser(content: &str) -> anyhow::Result<Tree> {
    PYTHON_PARSER
        .with(|p| p.borrow_mut().parse(content, None))
        .ok_or_else(|| anyhow::anyhow!("Failed to parse Python source"))
}

/// True when `source` parses without error or missing nodes.
pub fn is_well_formed(source: &str) -> bool {
    SourceTree::parse(source)
        .map(|tree| tree.is_well_formed())
        .unwrap_or(false)
}

/// Number of error and missing nodes in the parse of `source`.
pub fn error_count(source: &str) -> usize {
    SourceTree::parse(source)
        .map(|tree| tree.error_count())
        .unwrap_or(usize::MAX)
}

/// 1-based first line of a node.
pub fn line_of(node: Node<'_>) -> usize {
    node.start_position().row + 1
}

/// 1-based last line of a node, ignoring a trailing position at column 0.
pub fn end_line_of(node: Node<'_>) -> usize {
    let start = node.start_position();
    let end = node.end_position();
    if end.column == 0 && end.row > start.row {
        end.row
    } else {
        end.row + 1
    }
}

pub fn spans_line(node: Node<'_>, line: usize) -> bool {
    line_of(node) <= line && line <= end_line_of(node)
}

/// All nodes under `node` (inclusive) in pre-order.
pub fn descendants(node: Node<'_>) -> Vec<Node<'_>> {
    let mut out = Vec::new();
    let mut cursor = node.walk();
    let mut depth = 0usize;
    loop {
        out.push(cursor.node());
        if cursor.goto_first_child() {
            depth += 1;
            continue;
        }
        loop {
            if depth == 0 {
                return out;
            }
            if cursor.goto_next_sibling() {
                break;
            }
            cursor.goto_parent();
            depth -= 1;
        }
    }
}

pub fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

/// Walk parents from `node` (exclusive) up to the root.
pub fn ancestors(node: Node<'_>) -> impl Iterator<Item = Node<'_>> {
    std::iter::successors(node.parent(), |n| n.parent())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionKind {
    Function,
    Class,
}

/// A top-level `def` or `class`, decorators included in its line range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    pub name: String,
    pub kind: DefinitionKind,
    pub start_line: usize,
    pub end_line: usize,
}

/// A parsed source together with the text it was parsed from.
pub struct SourceTree<'s> {
    source: &'s str,
    tree: Tree,
}

impl<'s> SourceTree<'s> {
    pub fn parse(source: &'s str) -> anyhow::Result<Self> {
        let tree = parse_with_pooled_parser(source)?;
        Ok(Self { source, tree })
    }

    pub fn source(&self) -> &'s str {
        self.source
    }

    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn text(&self, node: Node<'_>) -> &'s str {
        self.source
            .get(node.start_byte()..node.end_byte())
            .unwrap_or("")
    }

    pub fn is_well_formed(&self) -> bool {
        !self.root().has_error()
    }

    pub fn error_count(&self) -> usize {
        descendants(self.root())
            .into_iter()
            .filter(|n| n.is_error() || n.is_missing())
            .count()
    }

    /// All nodes in pre-order.
    pub fn nodes(&self) -> Vec<Node<'_>> {
        descendants(self.root())
    }

    pub fn nodes_of_kind(&self, kind: &str) -> Vec<Node<'_>> {
        self.nodes()
            .into_iter()
            .filter(|n| n.kind() == kind)
            .collect()
    }

    pub fn functions(&self) -> Vec<Node<'_>> {
        self.nodes_of_kind("function_definition")
    }

    pub fn field_text(&self, node: Node<'_>, field: &str) -> &'s str {
        node.child_by_field_name(field)
            .map(|n| self.text(n))
            .unwrap_or("")
    }

    /// Name of a `def` or `class` node.
    pub fn name_of(&self, node: Node<'_>) -> &'s str {
        self.field_text(node, "name")
    }

    /// Innermost node of `kind` whose line range contains `line`.
    pub fn innermost_enclosing(&self, line: usize, kind: &str) -> Option<Node<'_>> {
        self.nodes()
            .into_iter()
            .filter(|n| n.kind() == kind && spans_line(*n, line))
            .last()
    }

    /// Text of a 1-based line without its terminator.
    pub fn line_text(&self, line: usize) -> Option<&'s str> {
        line.checked_sub(1)
            .and_then(|idx| self.source.split_terminator('\n').nth(idx))
    }

    /// Leading whitespace of a node's first line.
    pub fn indent_of(&self, node: Node<'_>) -> &'s str {
        let line = self.line_text(line_of(node)).unwrap_or("");
        let trimmed = line.trim_start();
        &line[..line.len() - trimmed.len()]
    }

    pub fn top_level_definitions(&self) -> Vec<Definition> {
        let mut defs = Vec::new();
        for child in named_children(self.root()) {
            let inner = if child.kind() == "decorated_definition" {
                match child.child_by_field_name("definition") {
                    Some(def) => def,
                    None => continue,
                }
            } else {
                child
            };
            let kind = match inner.kind() {
                "function_definition" => DefinitionKind::Function,
                "class_definition" => DefinitionKind::Class,
                _ => continue,
            };
            defs.push(Definition {
                name: self.name_of(inner).to_string(),
                kind,
                start_line: line_of(child),
                end_line: end_line_of(child),
            });
        }
        defs
    }

    /// Module names brought in by top-level `import` / `from ... import`.
    pub fn imported_modules(&self) -> Vec<String> {
        let mut modules = Vec::new();
        for child in named_children(self.root()) {
            match child.kind() {
                "import_statement" => {
                    for name in named_children(child) {
                        let target = if name.kind() == "aliased_import" {
                            name.child_by_field_name("alias").unwrap_or(name)
                        } else {
                            name
                        };
                        modules.push(self.text(target).to_string());
                    }
                }
                "import_from_statement" => {
                    modules.push(self.field_text(child, "module_name").to_string());
                }
                _ => {}
            }
        }
        modules
    }

    /// Multi-line string literals as inclusive 1-based line ranges.
    pub fn multiline_string_lines(&self) -> Vec<(usize, usize)> {
        self.nodes_of_kind("string")
            .into_iter()
            .map(|n| (line_of(n), end_line_of(n)))
            .filter(|(start, end)| end > start)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_detects_errors() {
        assert!(is_well_formed("def f(x):\n    return x\n"));
        assert!(!is_well_formed("def f(x)\n    return x\n"));
        assert!(!is_well_formed("print((1, 2)\n"));
        assert!(error_count("x = (1,\n") > 0);
        assert_eq!(error_count("x = 1\n"), 0);
    }

    #[test]
    fn top_level_definitions_include_decorators() {
        let source = "import math\n\n@cache\ndef f(n):\n    return n\n\nclass A:\n    pass\n";
        let tree = SourceTree::parse(source).unwrap();
        let defs = tree.top_level_definitions();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].name, "f");
        assert_eq!(defs[0].start_line, 3);
        assert_eq!(defs[0].end_line, 5);
        assert_eq!(defs[1].kind, DefinitionKind::Class);
        assert_eq!(tree.imported_modules(), vec!["math".to_string()]);
    }

    #[test]
    fn innermost_enclosing_finds_deepest_match() {
        let source = "def outer():\n    def inner():\n        return 1\n    return inner\n";
        let tree = SourceTree::parse(source).unwrap();
        let node = tree.innermost_enclosing(3, "function_definition").unwrap();
        assert_eq!(tree.name_of(node), "inner");
        let node = tree.innermost_enclosing(4, "function_definition").unwrap();
        assert_eq!(tree.name_of(node), "outer");
        assert_eq!(tree.indent_of(node), "");
    }

    #[test]
    fn line_text_is_one_based() {
        let tree = SourceTree::parse("a = 1\nb = 2\n").unwrap();
        assert_eq!(tree.line_text(2), Some("b = 2"));
        assert_eq!(tree.line_text(0), None);
        assert_eq!(tree.line_text(3), None);
    }
}
