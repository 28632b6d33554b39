use crate::language::Language;
use crate::parser::{ScriptParser, SourceKind};
use crate::tree::{SyntaxTree, MAX_TREE_DEPTH};
use serde::{Serialize, Serializer};

/// Characters-per-line ratio above which a file is treated as minified
pub const MINIFIED_DENSITY: f64 = 200.0;

/// Per-file tree dump value: a parsed tree or one of two sentinels
#[derive(Debug)]
pub enum TreeDump {
    Parsed(SyntaxTree),
    /// Parsing skipped: the file looks generated
    Minified,
    /// No parser, or both parse attempts failed
    Unparsed,
}

impl TreeDump {
    /// Sentinel string for the non-tree variants
    pub fn sentinel(&self) -> Option<&'static str> {
        match self {
            TreeDump::Parsed(_) => None,
            TreeDump::Minified => Some("minified"),
            TreeDump::Unparsed => Some("unparsed"),
        }
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self, TreeDump::Parsed(_))
    }
}

impl Serialize for TreeDump {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TreeDump::Parsed(tree) => tree.serialize(serializer),
            TreeDump::Minified => serializer.serialize_str("minified"),
            TreeDump::Unparsed => serializer.serialize_str("unparsed"),
        }
    }
}

/// Length divided by line count exceeds [`MINIFIED_DENSITY`].
///
/// Length is measured in UTF-16 code units, so a character outside the
/// basic multilingual plane counts twice.
pub fn is_minified(text: &str) -> bool {
    let units = text.encode_utf16().count() as f64;
    let lines = text.split('\n').count() as f64;
    units / lines > MINIFIED_DENSITY
}

/// Produces tree dumps for the files of one extension, reusing a single parser
pub struct TreeDumper {
    language: Language,
    parser: Option<ScriptParser>,
}

impl TreeDumper {
    pub fn for_extension(ext: &str) -> Self {
        let language = Language::from_extension(ext);
        let parser = if language.supports_ast() {
            match ScriptParser::new(language) {
                Ok(parser) => Some(parser),
                Err(err) => {
                    log::warn!("No parser for {}: {err}", language.as_str());
                    None
                }
            }
        } else {
            None
        };
        Self { language, parser }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Parse as a script, then as a module; fall back to a sentinel
    pub fn dump(&mut self, text: &str) -> TreeDump {
        if is_minified(text) {
            return TreeDump::Minified;
        }
        let Some(parser) = self.parser.as_mut() else {
            return TreeDump::Unparsed;
        };
        for kind in [SourceKind::Script, SourceKind::Module] {
            match parser.parse(text, kind) {
                Ok(tree) => {
                    let depth = tree.depth();
                    if depth > MAX_TREE_DEPTH {
                        log::debug!("Tree nesting {depth} exceeds {MAX_TREE_DEPTH}");
                        return TreeDump::Unparsed;
                    }
                    return TreeDump::Parsed(tree);
                }
                Err(err) => log::trace!("Parse as {} failed: {err}", kind.as_str()),
            }
        }
        TreeDump::Unparsed
    }
}

/// One-shot tree dump for a single file
pub fn get_ast(text: &str, ext: &str) -> TreeDump {
    TreeDumper::for_extension(ext).dump(text)
}
