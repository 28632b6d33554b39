use crate::archive::{rebase_entries, validate_single_root, ArchiveTool};
use crate::codec::{ArtifactWriter, Compression};
use crate::error::Result;
use crate::exclusions::ExclusionSet;
use crate::json_writer::JsonObjectWriter;
use crate::layout::{
    code_dump, files_listing, read_listing, remove_dir_all, slim_files_listing, tree_dump,
    with_extension, write_listing, CorpusLayout, FILES_LISTING, MANIFEST_FILE,
    SLIM_FILES_LISTING, TRACKED_EXTENSIONS, TREE_EXTENSIONS,
};
use crate::report::PartialStats;
use crate::stream_copy::dump_numbered_lines;
use corpus_syntax::TreeDumper;
use std::path::Path;
use tokio::io::BufReader;

/// Settings shared by every partial build of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions {
    /// Applied to tree dumps
    pub compression: Compression,
    pub tree_dump: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            compression: Compression::None,
            tree_dump: false,
        }
    }
}

/// Builds the artifact set of a single package
#[derive(Debug, Clone)]
pub struct PartialBuilder {
    layout: CorpusLayout,
    tool: ArchiveTool,
    options: BuildOptions,
}

impl PartialBuilder {
    pub fn new(layout: CorpusLayout, tool: ArchiveTool, options: BuildOptions) -> Self {
        Self {
            layout,
            tool,
            options,
        }
    }

    pub fn layout(&self) -> &CorpusLayout {
        &self.layout
    }

    /// Build `partials/<package_id>/`.
    ///
    /// With `rebuild`, a previously written `files.txt` stands in for listing
    /// the archive again. `files.txt` is written last and marks the partial
    /// complete; a reused one is taken down for the duration of the build.
    /// The scratch directory is removed before returning whether or not the
    /// build succeeded; the partial directory is left for the caller to
    /// discard on error.
    pub async fn build(
        &self,
        package_id: &str,
        rebuild: bool,
        exclusions: &ExclusionSet,
    ) -> Result<PartialStats> {
        let outdir = self.layout.partial_dir(package_id);
        let mut stats = PartialStats::default();

        let cached = if rebuild {
            self.cached_listing(&outdir).await
        } else {
            None
        };

        tokio::fs::create_dir_all(&outdir).await?;

        let files = match cached {
            Some(files) => {
                stats.reused_listing = true;
                tokio::fs::remove_file(outdir.join(FILES_LISTING)).await?;
                // Refresh per-extension listings so newly tracked extensions
                // are covered without touching the archive.
                write_extension_listings(&outdir, &files, files_listing).await?;
                files
            }
            None => {
                let entries = self
                    .tool
                    .list(&self.layout.archive_path(package_id))
                    .await?;
                validate_single_root(&entries)?;
                let files = rebase_entries(package_id, &entries);
                write_extension_listings(&outdir, &files, files_listing).await?;
                files
            }
        };
        stats.files = files.len();

        let slim = exclusions.retain_included(&files);
        write_listing(&outdir.join(SLIM_FILES_LISTING), &slim).await?;
        write_extension_listings(&outdir, &slim, slim_files_listing).await?;
        stats.slim_files = slim.len();

        let scratch = self.layout.scratch_dir(package_id);
        let outcome = self
            .extract_and_dump(package_id, &outdir, &scratch, &slim, &mut stats)
            .await;
        let cleanup = remove_dir_all(&scratch).await;
        outcome?;
        cleanup?;
        write_listing(&outdir.join(FILES_LISTING), &files).await?;

        log::debug!(
            "Partial {package_id}: {} files, {} slim, {} code lines, {} trees",
            stats.files,
            stats.slim_files,
            stats.code_lines,
            stats.tree_files
        );
        Ok(stats)
    }

    async fn cached_listing(&self, outdir: &Path) -> Option<Vec<String>> {
        let path = outdir.join(FILES_LISTING);
        match read_listing(&path).await {
            Ok(files) => Some(files),
            Err(err) => {
                log::debug!("No reusable listing at {}: {err}", path.display());
                None
            }
        }
    }

    async fn extract_and_dump(
        &self,
        package_id: &str,
        outdir: &Path,
        scratch: &Path,
        slim: &[String],
        stats: &mut PartialStats,
    ) -> Result<()> {
        tokio::fs::create_dir_all(scratch).await?;

        let mut patterns = vec![format!("*/{MANIFEST_FILE}")];
        for ext in TRACKED_EXTENSIONS {
            if slim.iter().any(|entry| entry.ends_with(ext)) {
                patterns.push(format!("*{ext}"));
            }
        }
        self.tool
            .extract(&self.layout.archive_path(package_id), scratch, &patterns)
            .await?;

        let manifest = outdir.join(MANIFEST_FILE);
        if !tokio::fs::try_exists(&manifest).await? {
            tokio::fs::copy(scratch.join(MANIFEST_FILE), &manifest).await?;
        }

        for ext in TRACKED_EXTENSIONS {
            stats.code_lines += self.dump_code(ext, outdir, slim).await?;
        }

        if self.options.tree_dump {
            for ext in TREE_EXTENSIONS {
                stats.tree_files += self.dump_trees(ext, outdir, slim).await?;
            }
        }
        Ok(())
    }

    /// `slim.code<ext>.txt`: numbered source lines of every matching member
    async fn dump_code(&self, ext: &str, outdir: &Path, slim: &[String]) -> Result<u64> {
        let mut sink = ArtifactWriter::create(outdir.join(code_dump(ext)), Compression::None).await?;
        let mut written = 0;
        for entry in with_extension(slim, ext) {
            let file = tokio::fs::File::open(self.layout.scratch_member(entry)).await?;
            let dumped = dump_numbered_lines(BufReader::new(file), entry, &mut sink).await?;
            written += dumped.lines_written;
        }
        sink.finish().await?;
        Ok(written)
    }

    /// `slim.ast<ext>.json`: one member per file, a tree or a sentinel
    async fn dump_trees(&self, ext: &str, outdir: &Path, slim: &[String]) -> Result<u64> {
        let mut sink = ArtifactWriter::create(outdir.join(tree_dump(ext)), self.options.compression)
            .await?;
        let mut dumper = TreeDumper::for_extension(ext);
        let mut object = JsonObjectWriter::begin(&mut sink).await?;
        for entry in with_extension(slim, ext) {
            let bytes = tokio::fs::read(self.layout.scratch_member(entry)).await?;
            let dump = dumper.dump(&String::from_utf8_lossy(&bytes));
            object.member(entry, &dump).await?;
        }
        let members = object.finish().await?;
        sink.finish().await?;
        Ok(members)
    }
}

async fn write_extension_listings(
    outdir: &Path,
    entries: &[String],
    name: fn(&str) -> String,
) -> Result<()> {
    for ext in TRACKED_EXTENSIONS {
        write_listing(&outdir.join(name(ext)), &with_extension(entries, ext)).await?;
    }
    Ok(())
}
