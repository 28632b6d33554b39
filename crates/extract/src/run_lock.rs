use crate::error::{ExtractError, Result};
use crate::layout::CorpusLayout;
use fs2::FileExt;
use std::fs::{File, OpenOptions};

/// Exclusive advisory lock on the corpus root, held for a whole run.
///
/// Runs share `tmp/` and rewrite `out/`, so a second run against the same
/// root fails fast instead of waiting.
pub struct RunLock {
    file: File,
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

pub async fn acquire_run_lock(layout: &CorpusLayout) -> Result<RunLock> {
    let path = layout.lock_path();
    tokio::task::spawn_blocking(move || -> Result<RunLock> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|err| ExtractError::Other(format!("open lock {}: {err}", path.display())))?;
        if file.try_lock_exclusive().is_err() {
            return Err(ExtractError::Locked(path));
        }
        Ok(RunLock { file })
    })
    .await
    .map_err(|err| ExtractError::Other(format!("join lock task: {err}")))?
}
