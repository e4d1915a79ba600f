//! # docindex CLI
//!
//! Host application for the document index: owns the on-disk backend and the
//! caller identity, runs one lifecycle operation and renders its outcome.
//!
//! ```bash
//! docindex ensure
//! docindex ingest ./notes --scope thread-1 --user 5f2c
//! docindex search "water filter" --filter "chatThreadId eq 'thread-1'"
//! docindex facets metadata_spo_item_content_type
//! docindex purge thread-1
//! ```
//!
//! Every command acts on the conversation index unless `--library` is given.
//! The exit code is non-zero when any outcome is an error.

use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docindex_core::chunking::{collect_source_files, read_source, Chunker};
use docindex_core::config::Settings;
use docindex_core::{OperationOutcome, StaticIdentity};
use docindex_service::DocumentIndex;
use docindex_text::TantivyBackend;
use tracing::info;
use tracing_subscriber::EnvFilter;

const SOURCE_EXTENSIONS: &[&str] = &["txt", "md"];

#[derive(Parser)]
#[command(name = "docindex")]
#[command(about = "Manage the document indexes behind chat retrieval")]
#[command(version)]
struct Cli {
    /// Act on the library index instead of the conversation index
    #[arg(long, global = true)]
    library: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the index if it does not exist and print its descriptor
    Ensure,

    /// Chunk files (or directories of .txt/.md files) into one scope
    Ingest {
        /// Files or directories to ingest
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Owner scope the documents belong to
        #[arg(short, long)]
        scope: String,

        /// Hashed id of the user the documents are ingested for
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Search the index
    Search {
        /// Free text; omit to match everything
        query: Option<String>,

        /// Filter expression, e.g. "chatThreadId eq 'thread-1'"
        #[arg(short, long)]
        filter: Option<String>,

        /// Print the raw outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Count the values of a facetable field
    Facets {
        field: String,

        query: Option<String>,

        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Delete every document stored under a scope
    Purge { scope: String },
}

fn init_logging(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.logging.filter));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn print_errors<T>(outcome: &OperationOutcome<T>) {
    for err in outcome.errors() {
        match &err.code {
            Some(code) => eprintln!("error [{code}]: {}", err.message),
            None => eprintln!("error: {}", err.message),
        }
    }
}

/// Print every failure and a one-line summary; true when all succeeded.
fn report_batch(label: &str, verb: &str, outcomes: &[OperationOutcome<bool>]) -> bool {
    outcomes.iter().for_each(print_errors);
    let succeeded = outcomes.iter().filter(|o| o.is_ok()).count();
    println!("{label}: {succeeded} of {} {verb}", outcomes.len());
    succeeded == outcomes.len()
}

fn source_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    paths
        .iter()
        .flat_map(|p| if p.is_dir() { collect_source_files(p, SOURCE_EXTENSIONS) } else { vec![p.clone()] })
        .collect()
}

fn origin_name(path: &Path) -> String {
    path.file_name().map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let settings = Settings::load()?;
    init_logging(&settings);

    let registry = settings.registry()?;
    let name = if cli.library { &settings.index.library } else { &settings.index.conversation };
    let root = settings.index_root(&env::current_dir()?);

    let backend = Arc::new(TantivyBackend::new(root.clone()));
    let index = DocumentIndex::from_registry(backend, &registry, name)?.with_policy(settings.index.provision_policy);
    info!(index = %index.name(), root = %root.display(), "opening index");

    let ok = match cli.command {
        Commands::Ensure => {
            let outcome = index.ensure_index().await;
            if let Some(schema) = outcome.value() {
                println!("{}", serde_json::to_string_pretty(schema)?);
            }
            print_errors(&outcome);
            outcome.is_ok()
        }
        Commands::Ingest { paths, scope, user } => {
            let index = match user {
                Some(user) => index.with_identity(Arc::new(StaticIdentity(user))),
                None => index,
            };
            let chunker = Chunker::new(settings.chunking.clone());
            let mut ok = true;
            for path in source_files(&paths) {
                let text = read_source(&path).with_context(|| format!("reading {}", path.display()))?;
                let chunks = chunker.chunk(&text);
                let outcomes = index.index_documents(&origin_name(&path), &scope, &chunks).await;
                ok &= report_batch(&path.display().to_string(), "succeeded", &outcomes);
            }
            ok
        }
        Commands::Search { query, filter, json } => {
            let outcome = index.search(query.as_deref(), filter.as_deref()).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else if let Some(hits) = outcome.value() {
                for hit in hits {
                    let doc = &hit.document;
                    let origin = doc.metadata.get(docindex_core::schema::ORIGIN_NAME_FIELD).map(ToString::to_string);
                    println!("{:>8.3}  {}  {}  {}", hit.score, doc.id, doc.owner_scope, origin.unwrap_or_default());
                }
                println!("{} result(s)", hits.len());
            }
            print_errors(&outcome);
            outcome.is_ok()
        }
        Commands::Facets { field, query, filter } => {
            let outcome = index.facet_counts(&field, query.as_deref(), filter.as_deref()).await;
            for facet in outcome.value().into_iter().flatten() {
                println!("{:>6}  {}", facet.count, facet.value);
            }
            print_errors(&outcome);
            outcome.is_ok()
        }
        Commands::Purge { scope } => {
            let outcomes = index.delete_by_scope(&scope).await;
            report_batch(&scope, "deleted", &outcomes)
        }
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
