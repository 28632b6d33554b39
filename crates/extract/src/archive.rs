use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// Upper bound on captured listing output
pub const MAX_LISTING_BYTES: u64 = 50 * 1024 * 1024;

/// Diagnostics kept from the tool's stderr; anything past this is discarded
const MAX_STDERR_BYTES: u64 = 64 * 1024;

/// Marker entry some archives list for their wrapper directory
const PACKAGE_MARKER: &str = "package";

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} {action} failed for {archive} ({status}): {stderr}")]
    Failed {
        tool: String,
        action: &'static str,
        archive: PathBuf,
        status: String,
        stderr: String,
    },

    #[error("listing of {archive} exceeds {limit} bytes")]
    ListingTooLarge { archive: PathBuf, limit: u64 },

    #[error("Package contains top-level files: {entry}")]
    TopLevelFiles { entry: String },
}

/// Thin wrapper over the external archive tool (GNU tar)
#[derive(Debug, Clone)]
pub struct ArchiveTool {
    program: String,
}

impl Default for ArchiveTool {
    fn default() -> Self {
        Self::new("tar")
    }
}

impl ArchiveTool {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Member paths, sorted, without blanks or the `package` marker
    pub async fn list(&self, archive: &Path) -> Result<Vec<String>, ArchiveError> {
        let mut child = Command::new(&self.program)
            .arg("--list")
            .arg("--warning=no-unknown-keyword")
            .arg("-f")
            .arg(archive)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| self.spawn_error(source))?;

        // Drained on its own task so a chatty tool never blocks on a full pipe
        let stderr = child
            .stderr
            .take()
            .map(|pipe| tokio::spawn(drain_capped(pipe, MAX_STDERR_BYTES)));

        let mut stdout = Vec::new();
        if let Some(pipe) = child.stdout.take() {
            pipe.take(MAX_LISTING_BYTES + 1)
                .read_to_end(&mut stdout)
                .await
                .map_err(|source| self.spawn_error(source))?;
        }
        if stdout.len() as u64 > MAX_LISTING_BYTES {
            return Err(ArchiveError::ListingTooLarge {
                archive: archive.to_path_buf(),
                limit: MAX_LISTING_BYTES,
            });
        }

        let status = child
            .wait()
            .await
            .map_err(|source| self.spawn_error(source))?;
        let stderr = match stderr {
            Some(task) => task
                .await
                .map_err(|err| self.spawn_error(io::Error::other(err)))?
                .map_err(|source| self.spawn_error(source))?,
            None => Vec::new(),
        };
        if !status.success() {
            return Err(self.failed("list", archive, status, &stderr));
        }

        Ok(parse_listing_output(&String::from_utf8_lossy(&stdout)))
    }

    /// Extract members matching `patterns` into `dest`, dropping the
    /// archive's top-level directory from every path
    pub async fn extract(
        &self,
        archive: &Path,
        dest: &Path,
        patterns: &[String],
    ) -> Result<(), ArchiveError> {
        let output = Command::new(&self.program)
            .current_dir(dest)
            .arg("--strip-components=1")
            .arg("--warning=no-unknown-keyword")
            .arg("-xf")
            .arg(archive)
            .arg("--wildcards")
            .args(patterns)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| self.spawn_error(source))?;
        if !output.status.success() {
            return Err(self.failed("extract", archive, output.status, &output.stderr));
        }
        Ok(())
    }

    fn spawn_error(&self, source: io::Error) -> ArchiveError {
        ArchiveError::Spawn {
            tool: self.program.clone(),
            source,
        }
    }

    fn failed(
        &self,
        action: &'static str,
        archive: &Path,
        status: ExitStatus,
        stderr: &[u8],
    ) -> ArchiveError {
        ArchiveError::Failed {
            tool: self.program.clone(),
            action,
            archive: archive.to_path_buf(),
            status: status.to_string(),
            stderr: String::from_utf8_lossy(stderr).trim().to_string(),
        }
    }
}

/// Read up to `cap` bytes, then consume the rest of the stream unseen
async fn drain_capped<R: AsyncRead + Unpin>(pipe: R, cap: u64) -> io::Result<Vec<u8>> {
    let mut kept = Vec::new();
    let mut limited = pipe.take(cap);
    limited.read_to_end(&mut kept).await?;
    tokio::io::copy(&mut limited.into_inner(), &mut tokio::io::sink()).await?;
    Ok(kept)
}

pub fn parse_listing_output(stdout: &str) -> Vec<String> {
    let mut entries: Vec<String> = stdout
        .split('\n')
        .filter(|line| !line.is_empty() && *line != PACKAGE_MARKER)
        .map(str::to_string)
        .collect();
    entries.sort();
    entries
}

/// Every entry must live under a wrapper directory
pub fn validate_single_root<S: AsRef<str>>(entries: &[S]) -> Result<(), ArchiveError> {
    match entries.iter().find(|entry| !entry.as_ref().contains('/')) {
        Some(entry) => Err(ArchiveError::TopLevelFiles {
            entry: entry.as_ref().to_string(),
        }),
        None => Ok(()),
    }
}

/// Replace the wrapper directory with the package identifier
pub fn rebase_entries<S: AsRef<str>>(package_id: &str, entries: &[S]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| {
            let entry = entry.as_ref();
            let relative = entry.split_once('/').map_or(entry, |(_, rest)| rest);
            format!("{package_id}/{relative}")
        })
        .collect()
}
