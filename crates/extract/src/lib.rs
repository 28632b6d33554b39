//! # Corpus Extract
//!
//! Per-package partials and corpus-wide totals for a directory of archived
//! packages.
//!
//! ## Pipeline
//!
//! ```text
//! current/<id>.tgz
//!     │
//!     ├──> Archive listing (tar --list)
//!     │      └─> files.txt, files<ext>.txt
//!     │
//!     ├──> Exclusion rules
//!     │      └─> slim.files.txt, slim.files<ext>.txt
//!     │
//!     ├──> Selective extraction into tmp/<id>/
//!     │      ├─> slim.code<ext>.txt   (numbered source lines)
//!     │      └─> slim.ast.js.json     (syntax trees, optional)
//!     │
//!     └──> partials/<id>/ ──> out/ (concatenated totals)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use corpus_extract::{BuildMode, ExtractConfig, PartialsOrchestrator, TotalsBuilder};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ExtractConfig::load("corpus.toml")?;
//!     let partials = PartialsOrchestrator::from_config(&config)?
//!         .run(BuildMode::Missing, None)
//!         .await?;
//!     let totals = TotalsBuilder::from_config(&config)?.run().await?;
//!
//!     println!("{} built, {} packages in totals", partials.built, totals.packages);
//!     Ok(())
//! }
//! ```

mod archive;
mod codec;
mod config;
mod error;
mod exclusions;
mod json_writer;
mod layout;
mod orchestrator;
mod partial;
mod report;
mod run_lock;
mod stream_copy;
mod totals;

pub use archive::{
    parse_listing_output, rebase_entries, validate_single_root, ArchiveError, ArchiveTool,
    MAX_LISTING_BYTES,
};
pub use codec::{ArtifactReader, ArtifactWriter, Compression, STREAM_BUFFER_BYTES};
pub use config::{ExtractConfig, Features};
pub use error::{ExtractError, Result};
pub use exclusions::{ExclusionError, ExclusionRule, ExclusionSet};
pub use json_writer::{member_line, JsonObjectWriter};
pub use layout::{
    aggregated_artifacts, code_dump, files_listing, slim_files_listing, tree_dump, CorpusLayout,
    FILES_LISTING, MANIFEST_FILE, PACKAGES_LISTING, SLIM_FILES_LISTING, TRACKED_EXTENSIONS,
    TREE_EXTENSIONS,
};
pub use orchestrator::{BuildMode, PartialsOrchestrator, PROGRESS_EVERY};
pub use partial::{BuildOptions, PartialBuilder};
pub use report::{PartialStats, PartialsReport, TotalsReport};
pub use run_lock::{acquire_run_lock, RunLock};
pub use stream_copy::{copy_bytes, dump_numbered_lines, DumpStats, Line, LineReader};
pub use totals::TotalsBuilder;
