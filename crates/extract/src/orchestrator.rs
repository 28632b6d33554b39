use crate::archive::ArchiveTool;
use crate::codec::Compression;
use crate::config::ExtractConfig;
use crate::error::Result;
use crate::exclusions::ExclusionSet;
use crate::layout::{read_dir_names, remove_dir_all, CorpusLayout};
use crate::partial::{BuildOptions, PartialBuilder};
use crate::report::PartialsReport;
use crate::run_lock::acquire_run_lock;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Instant;
use tokio::sync::OnceCell;

/// Progress is logged every this many removals or builds
pub const PROGRESS_EVERY: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    /// Build only packages without a partial
    Missing,
    /// Rebuild every package, reusing cached listings
    Rebuild,
}

/// Drives [`PartialBuilder`] over the current archive set, one package at a time
pub struct PartialsOrchestrator {
    builder: PartialBuilder,
    exclusions_path: PathBuf,
    exclusions: OnceCell<ExclusionSet>,
}

impl PartialsOrchestrator {
    pub fn new(builder: PartialBuilder, exclusions_path: impl Into<PathBuf>) -> Self {
        Self {
            builder,
            exclusions_path: exclusions_path.into(),
            exclusions: OnceCell::new(),
        }
    }

    pub fn from_config(config: &ExtractConfig) -> Result<Self> {
        let layout = CorpusLayout::new(&config.dir)?;
        let options = BuildOptions {
            compression: Compression::from_flag(config.compress),
            tree_dump: config.features.ast,
        };
        let builder = PartialBuilder::new(layout, ArchiveTool::new(config.tar.clone()), options);
        Ok(Self::new(builder, config.excluded_path()))
    }

    /// Use an already compiled rule set instead of the rule file
    pub fn with_exclusions(builder: PartialBuilder, exclusions: ExclusionSet) -> Self {
        Self {
            builder,
            exclusions_path: PathBuf::new(),
            exclusions: OnceCell::new_with(Some(exclusions)),
        }
    }

    /// Loaded on first use and kept for the orchestrator's lifetime
    async fn exclusions(&self) -> Result<&ExclusionSet> {
        let set = self
            .exclusions
            .get_or_try_init(|| ExclusionSet::load(&self.exclusions_path))
            .await?;
        Ok(set)
    }

    /// Remove stale partials, then build missing (or all) partials.
    ///
    /// A failing package is discarded and counted; an unreadable or
    /// malformed exclusion rule file aborts the run.
    pub async fn run(&self, mode: BuildMode, single: Option<&str>) -> Result<PartialsReport> {
        let started = Instant::now();
        let layout = self.builder.layout();
        let _lock = acquire_run_lock(layout).await?;
        let wanted = |package_id: &str| single.map_or(true, |single| single == package_id);

        tokio::fs::create_dir_all(layout.partials_dir()).await?;
        log::info!("Reading packages directory...");
        let current = read_dir_names(&layout.current_dir()).await?;
        log::info!("Reading partials directory...");
        let present = read_dir_names(&layout.partials_dir()).await?;
        let current_set: HashSet<&str> = current.iter().map(String::as_str).collect();
        let mut complete_set: HashSet<&str> = HashSet::new();
        for package_id in &present {
            if layout.partial_is_complete(package_id).await? {
                complete_set.insert(package_id.as_str());
            }
        }

        let mut report = PartialsReport::default();
        for package_id in &present {
            if !wanted(package_id.as_str()) || current_set.contains(package_id.as_str()) {
                continue;
            }
            remove_dir_all(&layout.partial_dir(package_id)).await?;
            report.removed += 1;
            if report.removed % PROGRESS_EVERY == 0 {
                log::info!("Partials: removing {}...", report.removed);
            }
        }
        log::info!("Partials: removed {}.", report.removed);

        let scratch_root = layout.scratch_root();
        remove_dir_all(&scratch_root).await?;
        tokio::fs::create_dir_all(&scratch_root).await?;

        let mut pending = Vec::new();
        for package_id in &current {
            if !wanted(package_id.as_str()) {
                continue;
            }
            if mode == BuildMode::Missing && complete_set.contains(package_id.as_str()) {
                report.skipped += 1;
                continue;
            }
            let partial = layout.partial_dir(package_id);
            if !complete_set.contains(package_id.as_str())
                && tokio::fs::try_exists(&partial).await?
            {
                log::warn!("Partial: {package_id} is incomplete, rebuilding");
                remove_dir_all(&partial).await?;
            }
            pending.push(package_id.as_str());
        }

        for package_id in pending.iter().copied() {
            let exclusions = self.exclusions().await?;
            log::debug!("Partial: building {package_id}");
            match self
                .builder
                .build(package_id, mode == BuildMode::Rebuild, exclusions)
                .await
            {
                Ok(_) => {
                    report.built += 1;
                    if report.built % PROGRESS_EVERY == 0 {
                        log::info!(
                            "Partials: building {} / {}...",
                            report.built,
                            pending.len() - report.errors
                        );
                    }
                }
                Err(err) => {
                    log::error!("Partial: failed {package_id}: {err}");
                    report.add_failure(package_id, &err);
                    remove_dir_all(&layout.partial_dir(package_id)).await?;
                    remove_dir_all(&layout.scratch_dir(package_id)).await?;
                }
            }
        }
        log::info!(
            "Partials: built {}, errors: {}.",
            report.built,
            report.errors
        );

        remove_dir_all(&scratch_root).await?;
        report.time_ms = started.elapsed().as_millis() as u64;
        Ok(report)
    }
}
