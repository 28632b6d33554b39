//! Corpus-wide totals built from the partial directories.
//!
//! ```text
//! partials/a.tgz/slim.code.js.txt ─┐
//! partials/b.tgz/slim.code.js.txt ─┼─ concatenate ─> out/slim.code.js.txt
//! partials/c.tgz/slim.code.js.txt ─┘
//!
//! partials/*/slim.ast.js.json ── splice member lines ─> out/slim.ast.js.json
//! ```
//!
//! Artifacts are streamed; no partial is ever loaded whole.

use crate::codec::{ArtifactReader, ArtifactWriter, Compression};
use crate::config::ExtractConfig;
use crate::error::Result;
use crate::json_writer::{member_line, JsonObjectWriter};
use crate::layout::{
    aggregated_artifacts, read_dir_names, remove_dir_all, tree_dump, CorpusLayout,
    PACKAGES_LISTING, TREE_EXTENSIONS,
};
use crate::orchestrator::PROGRESS_EVERY;
use crate::report::TotalsReport;
use crate::run_lock::acquire_run_lock;
use crate::stream_copy::{copy_bytes, LineReader};
use std::time::Instant;

pub struct TotalsBuilder {
    layout: CorpusLayout,
    compression: Compression,
    tree_dump: bool,
}

impl TotalsBuilder {
    pub fn new(layout: CorpusLayout, compression: Compression, tree_dump: bool) -> Self {
        Self {
            layout,
            compression,
            tree_dump,
        }
    }

    pub fn from_config(config: &ExtractConfig) -> Result<Self> {
        Ok(Self::new(
            CorpusLayout::new(&config.dir)?,
            Compression::from_flag(config.compress),
            config.features.ast,
        ))
    }

    pub fn layout(&self) -> &CorpusLayout {
        &self.layout
    }

    /// Rebuild `out/` from scratch.
    ///
    /// Any unreadable partial aborts the run and leaves `out/` incomplete.
    pub async fn run(&self) -> Result<TotalsReport> {
        let started = Instant::now();
        let _lock = acquire_run_lock(&self.layout).await?;
        let mut report = TotalsReport::default();

        log::info!("Totals: cleaning up...");
        let outdir = self.layout.out_dir();
        remove_dir_all(&outdir).await?;
        tokio::fs::create_dir_all(&outdir).await?;

        log::info!("Totals: building packages list...");
        let mut packages = read_dir_names(&self.layout.current_dir()).await?;
        packages.sort();
        let mut sink = ArtifactWriter::create(outdir.join(PACKAGES_LISTING), Compression::None).await?;
        for package_id in &packages {
            sink.write_str(package_id).await?;
            sink.write_str("\n").await?;
        }
        sink.finish().await?;
        report.packages = packages.len();
        log::info!("Totals: packages.txt complete, {} packages.", report.packages);

        tokio::fs::create_dir_all(self.layout.partials_dir()).await?;
        let mut partials = read_dir_names(&self.layout.partials_dir()).await?;
        partials.sort();
        report.partials = partials.len();
        log::info!("Totals: processing {} partials...", partials.len());

        report.artifacts = self.concatenate(&partials).await?;

        if self.tree_dump {
            for ext in TREE_EXTENSIONS {
                let name = tree_dump(ext);
                let members = self.merge_trees(&name, &partials).await?;
                report.tree_members.insert(name, members);
            }
        }

        report.time_ms = started.elapsed().as_millis() as u64;
        log::info!("Totals: done in {} ms.", report.time_ms);
        Ok(report)
    }

    /// Byte-concatenate every aggregated artifact in partial order
    async fn concatenate(&self, partials: &[String]) -> Result<Vec<String>> {
        let names = aggregated_artifacts();
        let outdir = self.layout.out_dir();
        let mut sinks = Vec::with_capacity(names.len());
        for name in &names {
            sinks.push(ArtifactWriter::create(outdir.join(name), self.compression).await?);
        }

        for (done, package_id) in partials.iter().enumerate() {
            let partial = self.layout.partial_dir(package_id);
            for (name, sink) in names.iter().zip(sinks.iter_mut()) {
                let mut file = tokio::fs::File::open(partial.join(name)).await?;
                copy_bytes(&mut file, sink).await?;
            }
            if (done + 1) % PROGRESS_EVERY == 0 {
                log::info!("Totals: {} / {}...", done + 1, partials.len());
            }
        }

        for mut sink in sinks {
            // gzip readers choke on a member with no payload
            if sink.is_compressed() && sink.bytes_written() == 0 {
                sink.write_str("\n").await?;
            }
            sink.finish().await?;
        }
        Ok(names)
    }

    /// Merge every partial's tree dump `name` into one object
    async fn merge_trees(&self, name: &str, partials: &[String]) -> Result<u64> {
        log::info!("Totals: merging {name}...");
        let mut sink = ArtifactWriter::create(self.layout.out_dir().join(name), self.compression)
            .await?;
        let mut object = JsonObjectWriter::begin(&mut sink).await?;
        for (done, package_id) in partials.iter().enumerate() {
            let path = self.layout.partial_dir(package_id).join(name);
            let mut source = ArtifactReader::open(&path, self.compression).await?;
            let mut lines = LineReader::new(source.reader());
            while let Some(line) = lines.next_text().await? {
                if let Some(member) = member_line(&line) {
                    object.raw_member(member).await?;
                }
            }
            source.finish().await?;
            if (done + 1) % PROGRESS_EVERY == 0 {
                log::info!("Totals: {name} {} / {}...", done + 1, partials.len());
            }
        }
        let members = object.finish().await?;
        sink.finish().await?;
        log::info!("Totals: {name} complete, {members} members.");
        Ok(members)
    }
}
