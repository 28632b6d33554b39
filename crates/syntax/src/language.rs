use crate::error::{Result, SyntaxError};

/// Source language of a tracked package member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    JavaScript,
    TypeScript,
    CoffeeScript,
    Unknown,
}

impl Language {
    /// Detect language from a file extension, with or without the leading dot
    pub fn from_extension(ext: &str) -> Self {
        match ext.trim_start_matches('.').to_lowercase().as_str() {
            "js" => Language::JavaScript,
            "ts" => Language::TypeScript,
            "coffee" => Language::CoffeeScript,
            _ => Language::Unknown,
        }
    }

    /// Get language name as string
    pub fn as_str(self) -> &'static str {
        match self {
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::CoffeeScript => "coffeescript",
            Language::Unknown => "unknown",
        }
    }

    /// Check if a parser is available for this language
    pub fn supports_ast(self) -> bool {
        matches!(self, Language::JavaScript)
    }

    /// Get Tree-sitter language instance
    pub fn tree_sitter_language(self) -> Result<tree_sitter::Language> {
        match self {
            Language::JavaScript => Ok(tree_sitter_javascript::LANGUAGE.into()),
            _ => Err(SyntaxError::unsupported_language(self.as_str())),
        }
    }
}
