use crate::error::{Result, SyntaxError};
use crate::language::Language;
use crate::tree::SyntaxTree;
use serde::Serialize;
use tree_sitter::{Node, Parser};

/// How the source text is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Classic script: module declarations are rejected
    Script,
    /// ES module
    Module,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Script => "script",
            SourceKind::Module => "module",
        }
    }
}

/// Top-level statements that are only legal inside a module
const MODULE_ONLY_STATEMENTS: &[&str] = &["import_statement", "export_statement"];

/// Tree-sitter backed parser that rejects trees containing syntax errors
pub struct ScriptParser {
    parser: Parser,
    language: Language,
}

impl ScriptParser {
    /// Create a parser for a language with AST support
    pub fn new(language: Language) -> Result<Self> {
        if !language.supports_ast() {
            return Err(SyntaxError::unsupported_language(language.as_str()));
        }

        let ts_language = language.tree_sitter_language()?;
        let mut parser = Parser::new();
        parser
            .set_language(&ts_language)
            .map_err(|e| SyntaxError::tree_sitter(format!("Failed to set language: {e}")))?;

        Ok(Self { parser, language })
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Parse `source` as the given kind, failing on any syntax error
    pub fn parse(&mut self, source: &str, kind: SourceKind) -> Result<SyntaxTree> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| SyntaxError::parse("Failed to parse source code"))?;

        let root = tree.root_node();
        if root.has_error() {
            let position = first_error(root)
                .map(|node| node.start_position())
                .unwrap_or_else(|| root.start_position());
            return Err(SyntaxError::parse(format!(
                "Unexpected token ({}:{})",
                position.row + 1,
                position.column
            )));
        }

        if kind == SourceKind::Script {
            let mut cursor = root.walk();
            let module_statement = root
                .named_children(&mut cursor)
                .find(|child| MODULE_ONLY_STATEMENTS.contains(&child.kind()));
            if let Some(statement) = module_statement {
                let position = statement.start_position();
                return Err(SyntaxError::parse(format!(
                    "'import' and 'export' may appear only with sourceType: module ({}:{})",
                    position.row + 1,
                    position.column
                )));
            }
        }

        Ok(SyntaxTree::new(tree, source.to_string(), kind))
    }
}

/// Depth-first search for the first error or missing node
fn first_error(root: Node<'_>) -> Option<Node<'_>> {
    let mut cursor = root.walk();
    loop {
        let node = cursor.node();
        if node.is_error() || node.is_missing() {
            return Some(node);
        }
        if node.has_error() && cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return None;
            }
        }
    }
}
