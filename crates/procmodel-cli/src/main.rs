//! procmodel CLI
//!
//! - Validating and canonicalizing process model JSON (canonical or legacy)
//! - Splitting long texts into generator-sized chunks
//! - Running a text-to-model generator over a text, chunk by chunk
//! - Converting canonical models to and from node/edge graphs

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use procmodel_core::{
    find_cycles, split_chunks, to_graph, to_model, validate, CanonicalOutcome, Graph,
    ModelDocument, Pipeline,
};
use procmodel_extract::{ExtractionRunner, FailedChunkExport, HttpGenerator};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod config;
mod render;

use config::CliConfig;

#[derive(Parser)]
#[command(name = "procmodel")]
#[command(
    author,
    version,
    about = "procmodel: process model canonicalization and integrity checks"
)]
struct Cli {
    /// JSON config with `pipeline`, `extraction` and `generator` sections.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output (repeatable). `RUST_LOG` takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Log errors only.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print validator findings for a model file without changing it.
    ///
    /// Exits with status 1 when any error-level finding is present.
    Validate {
        /// Model JSON (canonical or legacy).
        input: PathBuf,
    },

    /// Repair, resolve and check a model; write the canonical result.
    Canonicalize {
        /// Model JSON (canonical or legacy).
        input: PathBuf,
        /// Canonical model output (stdout if omitted).
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Write dropped connections here.
        #[arg(long)]
        dangling_out: Option<PathBuf>,
        /// Write the full report as JSON here.
        #[arg(long)]
        report_json: Option<PathBuf>,
    },

    /// Split a text file into chunks.
    Split {
        /// Plain text input.
        input: PathBuf,
        /// Maximum chars per chunk.
        #[arg(long)]
        max_chars: Option<usize>,
        /// Chunks JSON output (stdout if omitted).
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Run the generator over a text and canonicalize the merged result.
    Extract {
        /// Plain text input.
        input: PathBuf,
        /// Generator endpoint URL.
        #[arg(long)]
        endpoint: Option<String>,
        /// Model name passed to the generator.
        #[arg(long)]
        model_name: Option<String>,
        /// Generator calls in flight.
        #[arg(long)]
        concurrency: Option<usize>,
        /// Per-chunk timeout.
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Maximum chars per chunk.
        #[arg(long)]
        max_chars: Option<usize>,
        /// Canonical model output (stdout if omitted).
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Failed-chunk export, written when chunks failed or the merged
        /// model could not be canonicalized. Defaults to
        /// `failed_chunks_<run id>.json`.
        #[arg(long)]
        failed_out: Option<PathBuf>,
        /// Write the full report as JSON here.
        #[arg(long)]
        report_json: Option<PathBuf>,
    },

    /// Canonicalize a model and write it as a node/edge graph.
    Graph {
        input: PathBuf,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Read a node/edge graph back into a canonical model.
    FromGraph {
        input: PathBuf,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Canonicalize a model and list its cycles.
    Cycles { input: PathBuf },
}

fn init_tracing(verbose: u8, quiet: bool) {
    let fallback = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);
    let config = CliConfig::load(cli.config.as_deref())?;
    tracing::debug!(?config, "configuration loaded");

    match cli.command {
        Commands::Validate { input } => cmd_validate(&input),
        Commands::Canonicalize {
            input,
            out,
            dangling_out,
            report_json,
        } => cmd_canonicalize(
            &config,
            &input,
            out.as_deref(),
            dangling_out.as_deref(),
            report_json.as_deref(),
        ),
        Commands::Split {
            input,
            max_chars,
            out,
        } => cmd_split(
            &input,
            max_chars.unwrap_or(config.extraction.max_chunk_chars),
            out.as_deref(),
        ),
        Commands::Extract {
            input,
            endpoint,
            model_name,
            concurrency,
            timeout_secs,
            max_chars,
            out,
            failed_out,
            report_json,
        } => {
            let mut config = config;
            if let Some(endpoint) = endpoint {
                config.generator.endpoint = endpoint;
            }
            if let Some(model_name) = model_name {
                config.extraction.model_name = model_name;
            }
            if let Some(concurrency) = concurrency {
                config.extraction.concurrency = concurrency;
            }
            if let Some(timeout_secs) = timeout_secs {
                config.extraction.timeout_secs = timeout_secs;
                config.generator.timeout_secs = timeout_secs;
            }
            if let Some(max_chars) = max_chars {
                config.extraction.max_chunk_chars = max_chars;
            }
            cmd_extract(
                config,
                &input,
                out.as_deref(),
                failed_out.as_deref(),
                report_json.as_deref(),
            )
        }
        Commands::Graph { input, out } => cmd_graph(&config, &input, out.as_deref()),
        Commands::FromGraph { input, out } => cmd_from_graph(&config, &input, out.as_deref()),
        Commands::Cycles { input } => cmd_cycles(&config, &input),
    }
}

// ============================================================================
// IO helpers
// ============================================================================

fn read_document(path: &Path) -> Result<ModelDocument> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    ModelDocument::parse_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Pretty JSON to `out`, or stdout.
fn write_json<T: Serialize>(value: &T, out: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match out {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            eprintln!("{} {}", "wrote".green().bold(), path.display().to_string().bold());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn canonicalize_file(config: &CliConfig, input: &Path) -> Result<CanonicalOutcome> {
    let document = read_document(input)?;
    Pipeline::new(config.pipeline.clone())
        .canonicalize_document(document)
        .with_context(|| format!("canonicalizing {}", input.display()))
}

// ============================================================================
// Commands
// ============================================================================

fn cmd_validate(input: &Path) -> Result<()> {
    println!("{} {}", "Validating".green().bold(), input.display());
    let raw = read_document(input)?
        .into_raw()
        .with_context(|| format!("converting {}", input.display()))?;
    let findings = validate(&raw);
    render::print_findings(&findings);
    if !findings.errors.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_canonicalize(
    config: &CliConfig,
    input: &Path,
    out: Option<&Path>,
    dangling_out: Option<&Path>,
    report_json: Option<&Path>,
) -> Result<()> {
    let outcome = canonicalize_file(config, input)?;
    write_json(&outcome.model, out)?;
    if let Some(path) = dangling_out {
        write_json(&outcome.dangling, Some(path))?;
    }
    if let Some(path) = report_json {
        write_json(&outcome.report, Some(path))?;
    }
    render::print_report(&outcome.report);
    Ok(())
}

fn cmd_split(input: &Path, max_chars: usize, out: Option<&Path>) -> Result<()> {
    let text =
        fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;
    let chunks = split_chunks(&text, max_chars);
    eprintln!(
        "{} {} chunks of at most {} chars",
        "split".green().bold(),
        chunks.len(),
        max_chars
    );
    write_json(&chunks, out)
}

fn cmd_extract(
    config: CliConfig,
    input: &Path,
    out: Option<&Path>,
    failed_out: Option<&Path>,
    report_json: Option<&Path>,
) -> Result<()> {
    let text =
        fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;
    let generator = HttpGenerator::new(config.generator.clone())
        .map_err(|e| anyhow!("failed to build generator client: {e}"))?;
    let runner = ExtractionRunner::new(Arc::new(generator), config.extraction.clone());
    let pipeline = Pipeline::new(config.pipeline.clone());

    eprintln!(
        "{} {} via {}",
        "Extracting".green().bold(),
        input.display(),
        config.generator.endpoint
    );

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| anyhow!("failed to initialize tokio runtime: {e}"))?;
    let extraction = match rt.block_on(runner.extract(&text, &pipeline)) {
        Ok(extraction) => extraction,
        Err(failure) => {
            let export = failure.export();
            let path = failed_export_path(failed_out, &export);
            export
                .save(&path)
                .with_context(|| format!("exporting chunks to {}", path.display()))?;
            eprintln!(
                "{} model not canonicalized; {} chunk payloads kept in {}",
                "error".red().bold(),
                export.failed_chunks.len(),
                path.display()
            );
            return Err(failure).context("canonicalizing extracted model");
        }
    };

    write_json(&extraction.outcome.model, out)?;
    if let Some(path) = report_json {
        write_json(&extraction.outcome.report, Some(path))?;
    }

    let export = extraction.failed_export();
    if !export.is_empty() {
        let path = failed_export_path(failed_out, &export);
        eprintln!(
            "{} {} of {} chunks failed",
            "warning".yellow().bold(),
            export.failed_chunks.len(),
            extraction.run.results.len()
        );
        export
            .save(&path)
            .with_context(|| format!("exporting failed chunks to {}", path.display()))?;
    }
    render::print_report(&extraction.outcome.report);
    Ok(())
}

/// `--failed-out`, or `failed_chunks_<run id>.json` in the working directory.
fn failed_export_path(failed_out: Option<&Path>, export: &FailedChunkExport) -> PathBuf {
    failed_out
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(format!("failed_chunks_{}.json", export.run_id)))
}

fn cmd_graph(config: &CliConfig, input: &Path, out: Option<&Path>) -> Result<()> {
    let outcome = canonicalize_file(config, input)?;
    write_json(&to_graph(&outcome.model), out)
}

fn cmd_from_graph(config: &CliConfig, input: &Path, out: Option<&Path>) -> Result<()> {
    let text =
        fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;
    let graph: Graph =
        serde_json::from_str(&text).with_context(|| format!("parsing graph {}", input.display()))?;
    let outcome = Pipeline::new(config.pipeline.clone())
        .canonicalize(to_model(&graph))
        .with_context(|| format!("canonicalizing {}", input.display()))?;
    write_json(&outcome.model, out)?;
    render::print_report(&outcome.report);
    Ok(())
}

fn cmd_cycles(config: &CliConfig, input: &Path) -> Result<()> {
    let outcome = canonicalize_file(config, input)?;
    let cycles: Vec<Vec<String>> = find_cycles(&outcome.model)
        .iter()
        .map(|cycle| cycle.iter().map(|n| n.to_string()).collect())
        .collect();
    render::print_cycles(&cycles);
    Ok(())
}
