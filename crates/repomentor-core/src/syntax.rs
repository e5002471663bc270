//! Declaration extraction behind a parser capability.
//!
//! The chunker only sees [SourceParser] and the [Declaration] variants it yields;
//! grammars plug in through [parser_for_extension].

use tree_sitter::{Node, Parser};

/// What kind of unit a declaration is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationKind {
    Function,
    AsyncFunction,
    Class,
}

/// A named definition found in a syntax tree. Lines are 1-indexed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub kind: DeclarationKind,
    pub name: String,
    pub start_line: usize,
    /// `None` when the grammar could not resolve where the definition ends.
    pub end_line: Option<usize>,
    /// Line of the first decorator, when the definition is decorated.
    pub decorator_line: Option<usize>,
    /// Number of enclosing declarations (0 for top level).
    pub depth: usize,
}

impl Declaration {
    /// First line of the unit, decorators included.
    pub fn span_start(&self) -> usize {
        self.decorator_line.unwrap_or(self.start_line)
    }
}

/// Turns source text into the declarations it contains, in source order.
pub trait SourceParser {
    fn parse(&self, text: &str) -> Result<Vec<Declaration>, ParseError>;
}

/// Returns the parser for a file extension (without the dot), if one exists.
pub fn parser_for_extension(extension: &str) -> Option<Box<dyn SourceParser>> {
    match extension {
        "py" => Some(Box::new(PythonParser)),
        _ => None,
    }
}

/// Python grammar via tree-sitter.
#[derive(Debug, Default, Clone, Copy)]
pub struct PythonParser;

impl SourceParser for PythonParser {
    fn parse(&self, text: &str) -> Result<Vec<Declaration>, ParseError> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| ParseError::Grammar(e.to_string()))?;
        let tree = parser.parse(text, None).ok_or(ParseError::Aborted)?;
        let root = tree.root_node();
        if root.has_error() {
            let at = first_error_line(&root).unwrap_or(1);
            return Err(ParseError::Syntax { line: at });
        }
        // the grammar still accepts Python 2 statements that Python 3 rejects
        if let Some(at) = legacy_statement_line(&root) {
            return Err(ParseError::Syntax { line: at });
        }

        let mut out = Vec::new();
        collect(&root, text, 0, &mut out);
        Ok(out)
    }
}

fn collect(node: &Node, source: &str, depth: usize, out: &mut Vec<Declaration>) {
    let count = u32::try_from(node.named_child_count()).unwrap_or(u32::MAX);
    for i in 0..count {
        let Some(child) = node.named_child(i) else {
            continue;
        };
        match declaration(&child, node, source, depth) {
            Some(decl) => {
                out.push(decl);
                collect(&child, source, depth + 1, out);
            }
            None => collect(&child, source, depth, out),
        }
    }
}

fn declaration(node: &Node, parent: &Node, source: &str, depth: usize) -> Option<Declaration> {
    let kind = match node.kind() {
        "class_definition" => DeclarationKind::Class,
        "function_definition" if source[node.byte_range()].starts_with("async") => {
            DeclarationKind::AsyncFunction
        }
        "function_definition" => DeclarationKind::Function,
        _ => return None,
    };
    let name = node.child_by_field_name("name")?;
    let decorator_line =
        (parent.kind() == "decorated_definition").then(|| parent.start_position().row + 1);
    Some(Declaration {
        kind,
        name: source[name.byte_range()].to_string(),
        start_line: node.start_position().row + 1,
        end_line: Some(code_end_line(node)),
        decorator_line,
        depth,
    })
}

/// Last line holding code inside `node`. Trailing comments of a block are not code.
fn code_end_line(node: &Node) -> usize {
    let mut last = node.start_position().row;
    let mut cursor = node.walk();
    let mut stack = vec![*node];
    while let Some(n) = stack.pop() {
        if n.kind() == "comment" {
            continue;
        }
        if n.child_count() == 0 {
            last = last.max(n.end_position().row);
            continue;
        }
        stack.extend(n.children(&mut cursor));
    }
    last + 1
}

fn legacy_statement_line(node: &Node) -> Option<usize> {
    if matches!(node.kind(), "print_statement" | "exec_statement") {
        return Some(node.start_position().row + 1);
    }
    let count = u32::try_from(node.named_child_count()).unwrap_or(u32::MAX);
    (0..count)
        .filter_map(|i| node.named_child(i))
        .find_map(|c| legacy_statement_line(&c))
}

fn first_error_line(node: &Node) -> Option<usize> {
    if node.is_error() || node.is_missing() {
        return Some(node.start_position().row + 1);
    }
    let count = u32::try_from(node.child_count()).unwrap_or(u32::MAX);
    (0..count)
        .filter_map(|i| node.child(i))
        .filter(|c| c.has_error())
        .find_map(|c| first_error_line(&c))
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("grammar unavailable: {0}")]
    Grammar(String),
    #[error("parser gave up")]
    Aborted,
    #[error("syntax error near line {line}")]
    Syntax { line: usize },
}
