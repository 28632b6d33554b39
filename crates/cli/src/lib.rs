use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use corpus_extract::{
    BuildMode, ExtractConfig, PartialsOrchestrator, PartialsReport, TotalsBuilder, TotalsReport,
};
use serde::Serialize;
use std::io;
use std::path::PathBuf;

use crate::flags::PartialsMode;

mod flags;

fn print_stdout(text: &str) -> Result<()> {
    use std::io::Write;

    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.write_all(b"\n"))
        .and_then(|_| stdout.flush())
    {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

#[derive(Parser)]
#[command(name = "corpus")]
#[command(about = "Searchable extracts of an archived package corpus", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(long, global = true)]
    quiet: bool,

    /// Config file (TOML); missing file means defaults
    #[arg(long, global = true, default_value = "corpus.toml")]
    config: PathBuf,

    /// Repository root holding current/ (overrides CORPUS_DIR)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Gzip tree dumps and totals
    #[arg(long, global = true)]
    compress: bool,

    /// Emit syntax-tree dumps
    #[arg(long, global = true)]
    ast: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build missing partials, or rebuild all of them
    Partials(PartialsArgs),

    /// Rebuild out/ from the partials
    Totals,

    /// Build missing partials, then totals
    Run,
}

#[derive(Args)]
struct PartialsArgs {
    #[arg(value_enum)]
    mode: Option<PartialsMode>,

    /// Only touch this package (archive file name)
    #[arg(long)]
    single: Option<String>,
}

#[derive(Serialize)]
struct RunReport {
    partials: PartialsReport,
    totals: TotalsReport,
}

pub async fn main_entry() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let config = resolve_config(&cli)?;
    log::debug!("Using corpus root {}", config.dir.display());

    match cli.command {
        Commands::Partials(args) => {
            let report = run_partials(
                &config,
                PartialsMode::as_domain(args.mode),
                args.single.as_deref(),
            )
            .await?;
            print_stdout(&serde_json::to_string_pretty(&report)?)?;
        }
        Commands::Totals => {
            let report = run_totals(&config).await?;
            print_stdout(&serde_json::to_string_pretty(&report)?)?;
        }
        Commands::Run => {
            let partials = run_partials(&config, BuildMode::Missing, None).await?;
            let totals = run_totals(&config).await?;
            let report = RunReport { partials, totals };
            print_stdout(&serde_json::to_string_pretty(&report)?)?;
        }
    }

    Ok(())
}

/// File, then environment, then flags
fn resolve_config(cli: &Cli) -> Result<ExtractConfig> {
    let mut config = ExtractConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;
    config.apply_env();
    if let Some(dir) = &cli.dir {
        config.dir = dir.clone();
    }
    if cli.compress {
        config.compress = true;
    }
    if cli.ast {
        config.features.ast = true;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn run_partials(
    config: &ExtractConfig,
    mode: BuildMode,
    single: Option<&str>,
) -> Result<PartialsReport> {
    let orchestrator =
        PartialsOrchestrator::from_config(config).context("Failed to set up partials")?;
    let report = orchestrator
        .run(mode, single)
        .await
        .context("Partials run failed")?;
    if report.errors > 0 {
        log::warn!("{} packages failed, see report", report.errors);
    }
    Ok(report)
}

async fn run_totals(config: &ExtractConfig) -> Result<TotalsReport> {
    let totals = TotalsBuilder::from_config(config).context("Failed to set up totals")?;
    totals.run().await.context("Totals run failed")
}
