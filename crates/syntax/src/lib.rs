//! # Corpus Syntax
//!
//! Syntax-tree dumps for package source files.
//!
//! ```text
//! Source text
//!     │
//!     ├──> Density check (chars / lines > 200) ──> "minified"
//!     │
//!     ├──> Tree-sitter parse as script
//!     │      └─> on failure: parse as module
//!     │
//!     └──> TreeDump::Parsed(tree) | "unparsed"
//! ```
//!
//! ## Example
//!
//! ```rust
//! use corpus_syntax::{get_ast, TreeDump};
//!
//! let dump = get_ast("var x = 1;\n", ".js");
//! assert!(matches!(dump, TreeDump::Parsed(_)));
//!
//! let json = serde_json::to_string(&get_ast("x".repeat(1000).as_str(), ".js")).unwrap();
//! assert_eq!(json, "\"minified\"");
//! ```

mod dump;
mod error;
mod language;
mod parser;
mod tree;

pub use dump::{get_ast, is_minified, TreeDump, TreeDumper, MINIFIED_DENSITY};
pub use error::{Result, SyntaxError};
pub use language::Language;
pub use parser::{ScriptParser, SourceKind};
pub use tree::{SyntaxTree, MAX_TREE_DEPTH};
