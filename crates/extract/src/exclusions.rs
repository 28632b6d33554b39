//! Path exclusion rules.
//!
//! One rule per line. The compiler runs in two stages: every character of
//! the rule body is escaped as a literal, then the wildcard tokens are
//! expanded (`*` matches any run of characters, `?` exactly one).
//!
//! Anchoring follows the first and last character of the rule:
//!
//! | rule edge | effect |
//! |---|---|
//! | `*` | stripped, no anchor |
//! | `/` | kept as a literal, no extra anchor |
//! | anything else | must touch a `/` or the path boundary |
//!
//! So `node_modules` excludes `pkg/node_modules/x.js` but not
//! `pkg/my_node_modules/x.js`, while `*.min.js` excludes any path ending in
//! `.min.js` (the tail is still anchored).

use regex::Regex;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExclusionError {
    #[error("failed to read exclusion rules {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid exclusion rule {rule:?}: {source}")]
    InvalidRule {
        rule: String,
        #[source]
        source: regex::Error,
    },
}

const FRONT_ANCHOR: &str = "(?:/|^)";
const TAIL_ANCHOR: &str = "(?:/|$)";

/// A single compiled rule
#[derive(Debug, Clone)]
pub struct ExclusionRule {
    rule: String,
    regex: Regex,
}

/// Fragment of a rule body after literal escaping
#[derive(Debug, PartialEq, Eq)]
enum Fragment {
    Literal(String),
    AnyRun,
    AnyOne,
}

impl ExclusionRule {
    pub fn compile(rule: &str) -> Result<Self, ExclusionError> {
        let pattern = Self::pattern(rule);
        let regex = Regex::new(&pattern).map_err(|source| ExclusionError::InvalidRule {
            rule: rule.to_string(),
            source,
        })?;
        Ok(Self {
            rule: rule.to_string(),
            regex,
        })
    }

    /// Source text of the rule
    pub fn as_str(&self) -> &str {
        &self.rule
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    fn pattern(rule: &str) -> String {
        let mut body = rule;
        let mut anchor_front = false;
        let mut anchor_tail = false;

        if let Some(rest) = body.strip_prefix('*') {
            body = rest;
        } else if !body.starts_with('/') {
            anchor_front = true;
        }
        if let Some(rest) = body.strip_suffix('*') {
            body = rest;
        } else if !body.ends_with('/') {
            anchor_tail = true;
        }

        let mut pattern = String::new();
        if anchor_front {
            pattern.push_str(FRONT_ANCHOR);
        }
        pattern.push_str(&expand_wildcards(&escape_literals(body)));
        if anchor_tail {
            pattern.push_str(TAIL_ANCHOR);
        }
        pattern
    }
}

fn escape_literals(body: &str) -> Vec<Fragment> {
    let mut fragments = Vec::new();
    let mut literal = String::new();
    for ch in body.chars() {
        let wildcard = match ch {
            '*' => Fragment::AnyRun,
            '?' => Fragment::AnyOne,
            _ => {
                literal.push_str(&regex::escape(ch.encode_utf8(&mut [0; 4])));
                continue;
            }
        };
        if !literal.is_empty() {
            fragments.push(Fragment::Literal(std::mem::take(&mut literal)));
        }
        fragments.push(wildcard);
    }
    if !literal.is_empty() {
        fragments.push(Fragment::Literal(literal));
    }
    fragments
}

fn expand_wildcards(fragments: &[Fragment]) -> String {
    let mut out = String::new();
    for fragment in fragments {
        match fragment {
            Fragment::Literal(text) => out.push_str(text),
            Fragment::AnyRun => out.push_str(".*"),
            Fragment::AnyOne => out.push('.'),
        }
    }
    out
}

/// Ordered set of compiled rules; a path is excluded if any rule matches
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    rules: Vec<ExclusionRule>,
}

impl ExclusionSet {
    /// Compile rule lines, dropping empty ones; the first bad rule fails the set
    pub fn compile<'a>(lines: impl IntoIterator<Item = &'a str>) -> Result<Self, ExclusionError> {
        let rules = lines
            .into_iter()
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .filter(|line| !line.is_empty())
            .map(ExclusionRule::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    pub async fn load(path: &Path) -> Result<Self, ExclusionError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ExclusionError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let set = Self::compile(text.split('\n'))?;
        log::info!(
            "Loaded {} exclusion rules from {}",
            set.len(),
            path.display()
        );
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[ExclusionRule] {
        &self.rules
    }

    pub fn matches(&self, path: &str) -> bool {
        self.rules.iter().any(|rule| rule.is_match(path))
    }

    /// Entries no rule matches, order preserved
    pub fn retain_included<S: AsRef<str>>(&self, entries: &[S]) -> Vec<String> {
        entries
            .iter()
            .map(S::as_ref)
            .filter(|entry| !self.matches(entry))
            .map(str::to_string)
            .collect()
    }
}
