//! marlin: index a codebase and query it from the command line.
//!
//! Every command prints JSON on stdout; logs go to stderr and `<data_dir>/logs/`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use marlin::engine::CallDirection;
use marlin::{CodeIntelligenceEngine, EngineConfig, SearchOptions};

const DEFAULT_DATA_DIR: &str = ".marlin";
const EMBEDDING_WAIT: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "marlin")]
#[command(about = "Incremental multi-language code intelligence", long_about = None)]
#[command(version)]
struct Cli {
    /// Store, config and log directory (defaults to .marlin under the indexed root or cwd)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a workspace
    Index {
        root: PathBuf,

        /// Keep running and re-index files as they change
        #[arg(long)]
        watch: bool,
    },

    /// Search symbols
    Search {
        query: String,

        /// Exact name match only
        #[arg(long, conflicts_with = "by_type")]
        exact: bool,

        /// Match declared or inferred types instead of names
        #[arg(long = "type")]
        by_type: bool,

        #[arg(short, long)]
        limit: Option<usize>,

        /// Structural ranking only
        #[arg(long)]
        no_semantic: bool,

        /// Interleave results across architectural layers
        #[arg(long)]
        cross_layer: bool,
    },

    /// Declarations of the identifier at a position
    Definition { file: PathBuf, line: u32, column: u32 },

    /// Everything that refers to the identifier at a position
    References { file: PathBuf, line: u32, column: u32 },

    /// Symbol, type and parent at a position
    Hover { file: PathBuf, line: u32, column: u32 },

    /// Callers or callees of the symbol at a position
    Calls {
        file: PathBuf,
        line: u32,
        column: u32,

        #[arg(long, conflicts_with = "outgoing")]
        incoming: bool,

        #[arg(long)]
        outgoing: bool,
    },

    /// List indexed workspaces, or remove one
    Workspaces {
        #[arg(long)]
        remove: Option<PathBuf>,
    },

    /// Store and embedding counters
    Stats,

    /// Per-component health
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let data_dir = cli.data_dir.clone().unwrap_or_else(|| match &cli.command {
        Commands::Index { root, .. } => root.join(DEFAULT_DATA_DIR),
        _ => PathBuf::from(DEFAULT_DATA_DIR),
    });
    let mut config = EngineConfig::load(&data_dir)?;
    if let Commands::Index { watch, .. } = &cli.command {
        config.watch = *watch;
    }

    let _log_guard = init_logging(&config.logs_dir())?;

    let engine = CodeIntelligenceEngine::new(config);
    engine.initialize().await?;

    let result = run(&engine, cli.command).await;
    if let Err(e) = engine.shutdown().await {
        warn!("Shutdown failed: {}", e);
    }
    result
}

async fn run(engine: &CodeIntelligenceEngine, command: Commands) -> Result<()> {
    match command {
        Commands::Index { root, watch } => {
            let report = engine.index_workspace(&root).await?;
            print_json(&report)?;

            if watch {
                info!("👀 Watching {} (Ctrl-C to stop)", root.display());
                tokio::signal::ctrl_c()
                    .await
                    .context("Failed to listen for Ctrl-C")?;
            } else if !engine.wait_for_embeddings(EMBEDDING_WAIT).await? {
                warn!("Embeddings still pending after {}s; they will be queued again next run", EMBEDDING_WAIT.as_secs());
            }
        }
        Commands::Search {
            query,
            exact,
            by_type,
            limit,
            no_semantic,
            cross_layer,
        } => {
            let mut options = SearchOptions::from_config(&engine.config().search);
            if let Some(limit) = limit {
                options.limit = limit;
            }
            options.include_semantics = !no_semantic;
            options.cross_layer = cross_layer;

            let results = if exact {
                engine.search_exact(&query, options.limit).await?
            } else if by_type {
                engine.search_by_type(&query, options.limit).await?
            } else {
                engine.search_code(&query, &options).await?
            };
            print_json(&results)?;
        }
        Commands::Definition { file, line, column } => {
            print_json(&engine.go_to_definition(&file, line, column).await?)?;
        }
        Commands::References { file, line, column } => {
            print_json(&engine.find_references(&file, line, column).await?)?;
        }
        Commands::Hover { file, line, column } => {
            print_json(&engine.hover(&file, line, column).await?)?;
        }
        Commands::Calls {
            file,
            line,
            column,
            incoming: _,
            outgoing,
        } => {
            let direction = if outgoing {
                CallDirection::Outgoing
            } else {
                CallDirection::Incoming
            };
            print_json(&engine.get_call_hierarchy(&file, line, column, direction).await?)?;
        }
        Commands::Workspaces { remove } => match remove {
            Some(root) => print_json(&engine.remove_workspace(&root).await?)?,
            None => print_json(&engine.list_indexed_workspaces().await?)?,
        },
        Commands::Stats => print_json(&engine.get_stats().await?)?,
        Commands::Health => print_json(&engine.health_check().await)?,
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// stderr plus a daily rolling file under `logs_dir`; the guard must outlive every log call
fn init_logging(logs_dir: &Path) -> Result<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("marlin=info"))
        .context("Invalid log filter")?;

    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("Failed to create {}", logs_dir.display()))?;
    let (file_writer, guard) = non_blocking(rolling::daily(logs_dir, "marlin.log"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(
            fmt::layer()
                .with_writer(file_writer)
                .with_target(true)
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true),
        )
        .init();

    Ok(guard)
}
