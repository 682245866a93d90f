//! BioGraph CLI - command-line front end for the model repository.
//!
//! Thin layer over `biograph-core`: every subcommand maps to one library
//! operation. Results go to stdout as text or, with `--json`, as JSON.

use anyhow::{Context, Result};
use biograph_core::{BioGraph, BioGraphError, CancellationToken};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "biograph")]
#[command(about = "Store, compare and search biological model graphs")]
struct Args {
    /// SQLite database holding the model graphs
    #[arg(long, global = true, default_value = "biograph.db")]
    store: PathBuf,

    /// Folder of downloaded model descriptions (<tag>.xml)
    #[arg(long, global = true, default_value = "models")]
    models: PathBuf,

    /// Mapping schema file (.json); the built-in SBML mapping when omitted
    #[arg(long, global = true)]
    schema: Option<PathBuf>,

    /// Concurrent imports for import and sync
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import (or replace) models from the models folder
    Import {
        #[arg(required = true)]
        tags: Vec<String>,
    },
    /// Import every model in the models folder that is not stored yet
    Sync,
    /// Delete a stored model
    Delete { tag: String },
    /// Merge two stored models into <a>-<b>
    Merge { tag_a: String, tag_b: String },
    /// List stored model tags
    List,
    /// Check whether a model is stored
    Exists { tag: String },
    /// Similarity of one model to another
    Compare { tag_a: String, tag_b: String },
    /// Rank stored models by similarity to a model
    Similar {
        tag: String,
        /// Maximum number of results (all when omitted)
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Find models by contained entities
    Search {
        #[command(subcommand)]
        query: SearchQuery,
    },
    /// Validate a mapping schema file
    Schema { path: PathBuf },
}

#[derive(Subcommand, Debug)]
enum SearchQuery {
    /// Models containing a compartment
    Compartment { compartment_id: String },
    /// Models containing a species
    Compound { species_id: String },
    /// Models with a species located in a compartment
    CompoundIn {
        species_id: String,
        compartment_id: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.debug);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {:#}", err);
            let code = err
                .downcast_ref::<BioGraphError>()
                .map(BioGraphError::exit_code)
                .unwrap_or(1);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn build(args: &Args) -> Result<BioGraph> {
    let mut builder = BioGraph::builder()
        .store_path(&args.store)
        .models_dir(&args.models);
    if let Some(schema) = &args.schema {
        builder = builder.schema_path(schema);
    }
    if let Some(workers) = args.workers {
        builder = builder.import_workers(workers);
    }
    builder
        .build()
        .with_context(|| format!("failed to open store {}", args.store.display()))
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight writes");
            token.cancel();
        }
    });
}

fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce() -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        let text = text();
        if !text.is_empty() {
            println!("{}", text);
        }
    }
    Ok(())
}

fn list_text(items: &[String], empty: &str) -> String {
    if items.is_empty() {
        empty.to_string()
    } else {
        items.join("\n")
    }
}

async fn run(args: Args) -> Result<()> {
    let graph = build(&args)?;
    let json = args.json;

    match args.command {
        Command::Import { tags } => {
            let cancel = CancellationToken::new();
            cancel_on_ctrl_c(cancel.clone());

            let report = graph.import_models(&tags, &cancel).await;
            emit(json, &report, || {
                let mut lines = vec![format!(
                    "imported {}, replaced {}, failed {}, cancelled {}",
                    report.imported.len(),
                    report.replaced.len(),
                    report.failed.len(),
                    report.cancelled.len()
                )];
                lines.extend(
                    report
                        .failed
                        .iter()
                        .map(|f| format!("  {}: {}", f.tag, f.error)),
                );
                lines.join("\n")
            })?;
            if !report.cancelled.is_empty() {
                return Err(BioGraphError::Cancelled.into());
            }
        }
        Command::Sync => {
            let cancel = CancellationToken::new();
            cancel_on_ctrl_c(cancel.clone());

            let report = graph.sync_missing(&cancel).await?;
            emit(json, &report, || {
                format!(
                    "synced {} models ({} failed)",
                    report.written(),
                    report.failed.len()
                )
            })?;
        }
        Command::Delete { tag } => {
            graph.delete_model(&tag).await?;
            info!("Deleted {}", tag);
        }
        Command::Merge { tag_a, tag_b } => {
            let merged = graph.merge_models(&tag_a, &tag_b).await?;
            emit(json, &merged, || merged.clone())?;
        }
        Command::List => {
            let tags = graph.list_models()?;
            emit(json, &tags, || list_text(&tags, ""))?;
        }
        Command::Exists { tag } => {
            let exists = graph.exists(&tag)?;
            emit(json, &exists, || exists.to_string())?;
            if !exists {
                return Err(BioGraphError::ModelNotFound { tag }.into());
            }
        }
        Command::Compare { tag_a, tag_b } => {
            let score = graph.compare(&tag_a, &tag_b)?;
            emit(json, &score, || format!("{:.4}", score))?;
        }
        Command::Similar { tag, limit } => {
            let matches = graph.find_all_similar(&tag, limit)?;
            emit(json, &matches, || {
                matches
                    .iter()
                    .map(|m| format!("{:>7.2}  {}", m.score, m.tag))
                    .collect::<Vec<_>>()
                    .join("\n")
            })?;
        }
        Command::Search { query } => {
            let names = match query {
                SearchQuery::Compartment { compartment_id } => {
                    graph.search_for_compartment(&compartment_id)?
                }
                SearchQuery::Compound { species_id } => graph.search_for_compound(&species_id)?,
                SearchQuery::CompoundIn {
                    species_id,
                    compartment_id,
                } => graph.search_compound_in_compartment(&species_id, &compartment_id)?,
            };
            emit(json, &names, || list_text(&names, "No models found"))?;
        }
        Command::Schema { path } => {
            graph.change_schema(&path)?;
            let schema = graph.repository().active_schema().current()?;
            emit(json, &*schema, || {
                format!(
                    "{}: {} node rules, {} relationship rules",
                    schema.name,
                    schema.nodes.len(),
                    schema.relationships.len()
                )
            })?;
        }
    }

    Ok(())
}
