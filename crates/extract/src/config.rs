use crate::error::{ExtractError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Optional artifact families
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Features {
    /// Emit per-package and aggregated syntax-tree dumps
    pub ast: bool,
}

/// Extraction settings, loaded from TOML and overridable from the environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Repository root holding `current/`, `partials/`, `tmp/` and `out/`
    pub dir: PathBuf,

    /// Base directory for data files such as the exclusion rules
    pub basedir: PathBuf,

    /// Exclusion rule file, relative to `basedir`
    pub excluded: PathBuf,

    /// Archive tool binary
    pub tar: String,

    /// Gzip tree dumps and aggregated totals
    pub compress: bool,

    pub features: Features,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            basedir: PathBuf::from("."),
            excluded: PathBuf::from("data/code.excluded.txt"),
            tar: "tar".to_string(),
            compress: false,
            features: Features::default(),
        }
    }
}

impl ExtractConfig {
    /// Load from a TOML file; a missing file yields the defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(err) => return Err(err.into()),
        };
        Self::from_toml(&text)
            .map_err(|err| ExtractError::InvalidConfig(format!("{}: {err}", path.display())))
    }

    pub fn from_toml(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Apply `CORPUS_DIR`, `CORPUS_COMPRESS` and `CORPUS_FEATURE_AST`
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("CORPUS_DIR").filter(|v| !v.trim().is_empty()) {
            self.dir = PathBuf::from(dir);
        }
        if let Some(flag) = lookup("CORPUS_COMPRESS").and_then(|v| parse_flag(&v)) {
            self.compress = flag;
        }
        if let Some(flag) = lookup("CORPUS_FEATURE_AST").and_then(|v| parse_flag(&v)) {
            self.features.ast = flag;
        }
    }

    /// Path of the exclusion rule file
    pub fn excluded_path(&self) -> PathBuf {
        self.basedir.join(&self.excluded)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.dir.is_dir() {
            return Err(ExtractError::InvalidConfig(format!(
                "root directory does not exist: {}",
                self.dir.display()
            )));
        }
        if self.tar.trim().is_empty() {
            return Err(ExtractError::InvalidConfig(
                "archive tool must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
