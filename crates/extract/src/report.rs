use serde::{Deserialize, Serialize};

/// Outcome of one orchestrator run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialsReport {
    /// Partials built (or rebuilt) successfully
    pub built: usize,

    /// Packages whose build failed and was discarded
    pub errors: usize,

    /// Partials removed because their archive disappeared
    pub removed: usize,

    /// Packages skipped because a partial already exists
    pub skipped: usize,

    /// `<package>: <error>` for every failed build
    pub failures: Vec<String>,

    /// Time taken in milliseconds
    pub time_ms: u64,
}

impl PartialsReport {
    pub fn add_failure(&mut self, package_id: &str, error: impl std::fmt::Display) {
        self.errors += 1;
        self.failures.push(format!("{package_id}: {error}"));
    }
}

/// Outcome of one totals rebuild
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalsReport {
    /// Entries written to `packages.txt`
    pub packages: usize,

    /// Partials aggregated
    pub partials: usize,

    /// Aggregated artifact file names
    pub artifacts: Vec<String>,

    /// Members in each merged tree dump, keyed by file name
    pub tree_members: std::collections::BTreeMap<String, u64>,

    /// Time taken in milliseconds
    pub time_ms: u64,
}

/// What one partial build produced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialStats {
    /// Entries in `files.txt`
    pub files: usize,

    /// Entries in `slim.files.txt`
    pub slim_files: usize,

    /// Whether `files.txt` was reused instead of listing the archive
    pub reused_listing: bool,

    /// Lines written across all code dumps
    pub code_lines: u64,

    /// Files given a tree dump
    pub tree_files: u64,
}
