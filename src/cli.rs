//! Command-line surface of the annotation client.
//!
//! The flag surface is flat: exactly one input mode is chosen per run
//! (single file, directory, harvested collection, reprocess, or load), and
//! every run finishes with a diagnostic report over the state store.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::bail;
use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::annotate::Annotator;
use crate::config::Config;
use crate::dispatch::{self, DispatchConfig, DispatchEvent, RunStats};
use crate::harvest::HarvestStore;
use crate::hash::sha1_of_file;
use crate::mongo::AnnotationSink;
use crate::paths::artifact_path_for;
use crate::report;
use crate::service::AnnotationService;
use crate::sources::{failed_candidates, CandidateRecord, CollectionCandidates, DirectoryCandidates};
use crate::state::{ProcessingStatus, StateStore};

#[derive(Parser)]
#[command(name = "softmention")]
#[command(about = "Batch client for the software mention recognition service")]
#[command(version)]
pub struct Cli {
    /// Single PDF file to annotate
    #[arg(long, value_name = "PDF")]
    file_in: Option<PathBuf>,

    /// Where to write the single-file result (default: next to the input)
    #[arg(long, value_name = "JSON")]
    file_out: Option<PathBuf>,

    /// Directory of PDF files to annotate recursively
    #[arg(long, value_name = "DIR")]
    repo_in: Option<PathBuf>,

    /// Harvester data directory whose record store drives the run
    #[arg(long, value_name = "DIR")]
    data_path: Option<PathBuf>,

    /// Path to the configuration file
    #[arg(long, default_value = "./config.json")]
    config: PathBuf,

    /// Resubmit documents whose last attempt failed
    #[arg(long)]
    reprocess: bool,

    /// Forget all recorded processing state before doing anything else
    #[arg(long)]
    reset: bool,

    /// Load annotation files under --repo-in into MongoDB
    #[arg(long)]
    load: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    let service = AnnotationService::new(config.base_url(), config.timeout(), config.retry_policy())?;
    if !service.is_alive().await {
        bail!(
            "software mention service at {} is not responding, leaving...",
            config.base_url()
        );
    }
    println!(
        "{} software mention service is up and running",
        style("✓").green()
    );

    let mut store = StateStore::open(&config.data_path)?;
    if cli.reset {
        store = store.reset()?;
        println!("{} processing state cleared", style("✓").green());
    }
    let store = Arc::new(store);

    let sink = match config.mongo() {
        Some(mongo) => Some(AnnotationSink::connect(&mongo).await?),
        None => None,
    };

    if cli.load {
        let Some(sink) = sink else {
            bail!("no mongodb instance configured to load the annotations into, leaving...");
        };
        let Some(repo_in) = cli.repo_in.as_deref() else {
            bail!("--load needs --repo-in pointing at the annotation files, leaving...");
        };
        let inserted = sink.load_directory(repo_in).await?;
        println!(
            "{} loaded {inserted} annotation files into mongodb",
            style("✓").green()
        );
    } else {
        let annotator = Arc::new(Annotator::new(service, store.clone(), sink));
        let dispatch_config = DispatchConfig {
            batch_size: config.batch_size,
            concurrency: config.concurrency,
        };

        if cli.reprocess {
            let candidates = failed_candidates(&store, &config.data_path)?;
            println!(
                "{} reprocessing {} failed documents",
                style("→").cyan(),
                candidates.len()
            );
            let stats = dispatch_with_progress(
                annotator,
                candidates.into_iter().map(Ok),
                dispatch_config,
            )
            .await?;
            print_stats(&stats);
        } else if let Some(repo_in) = cli.repo_in.as_deref() {
            println!(
                "{} annotating PDF documents under {}",
                style("→").cyan(),
                repo_in.display()
            );
            let candidates = DirectoryCandidates::new(repo_in, &store);
            let stats = dispatch_with_progress(annotator, candidates, dispatch_config).await?;
            print_stats(&stats);
        } else if let Some(file_in) = cli.file_in.as_deref() {
            annotate_single(&annotator, file_in, cli.file_out.clone()).await?;
        } else if let Some(data_path) = cli.data_path.as_deref() {
            let harvest = HarvestStore::open(data_path)?;
            println!(
                "{} {} harvested entries to consider",
                style("→").cyan(),
                harvest.count()?
            );
            let candidates = CollectionCandidates::new(&harvest, &store, data_path);
            let stats = dispatch_with_progress(annotator, candidates, dispatch_config).await?;
            print_stats(&stats);
        }
    }

    print_report(&report::tally(&store)?);
    Ok(())
}

/// Run a dispatch while a spinner tracks per-document completions.
async fn dispatch_with_progress(
    annotator: Arc<Annotator>,
    candidates: impl Iterator<Item = Result<CandidateRecord, crate::error::ClientError>>,
    config: DispatchConfig,
) -> anyhow::Result<RunStats> {
    let (event_tx, mut event_rx) = mpsc::channel::<DispatchEvent>(100);

    let progress_handler = tokio::spawn(async move {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {pos} documents processed")
                .unwrap(),
        );
        while let Some(event) = event_rx.recv().await {
            match event {
                DispatchEvent::Completed { id, status } => {
                    if status == ProcessingStatus::Failure {
                        pb.println(format!("{} {id}", style("✗").red()));
                    }
                    pb.inc(1);
                }
                DispatchEvent::Unreadable { error } => {
                    pb.println(format!("{} {error}", style("✗").red()));
                }
            }
        }
        pb.finish_and_clear();
    });

    let stats = dispatch::run(annotator, candidates, config, event_tx).await?;
    let _ = progress_handler.await;
    Ok(stats)
}

/// Annotate one file outside the batch machinery.
async fn annotate_single(
    annotator: &Annotator,
    file_in: &std::path::Path,
    file_out: Option<PathBuf>,
) -> anyhow::Result<()> {
    let id = sha1_of_file(file_in)?;
    let output_path = file_out.unwrap_or_else(|| artifact_path_for(file_in));
    let record = CandidateRecord {
        id,
        input_path: file_in.to_path_buf(),
        output_path: output_path.clone(),
        metadata: None,
    };

    match annotator.process(&record).await? {
        ProcessingStatus::Success => {
            if output_path.is_file() {
                let artifact: Value =
                    serde_json::from_str(&std::fs::read_to_string(&output_path)?)?;
                let count = artifact["mentions"].as_array().map_or(0, Vec::len);
                println!(
                    "{} {count} software mentions found, written to {}",
                    style("✓").green(),
                    output_path.display()
                );
            } else {
                println!("{} no software mentions found", style("✓").green());
            }
            Ok(())
        }
        ProcessingStatus::Failure => bail!("annotation failed for {}", file_in.display()),
    }
}

fn print_stats(stats: &RunStats) {
    println!(
        "{} run complete: {} dispatched, {} succeeded, {} failed, {} unreadable",
        style("✓").green(),
        stats.dispatched,
        stats.succeeded,
        stats.failed,
        stats.unreadable
    );
}

fn print_report(tally: &report::Tally) {
    println!();
    println!("total entries: {}", tally.total);
    println!(
        "total successfully processed: {}",
        style(tally.success).green()
    );
    println!("total failed: {}", style(tally.failure).red());
}
