//! # docharbor CLI
//!
//! ## Usage
//!
//! ```bash
//! docharbor --config ./config/docharbor.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docharbor init` | Create the SQLite database and schema |
//! | `docharbor ingest` | Run one ingestion pass over the ingress folder |
//! | `docharbor clean` | Reconcile database, search index and document storage |
//! | `docharbor search "<term>"` | Full-text search |
//! | `docharbor get <id>` | Print one document |
//! | `docharbor latest` | List the newest documents |
//! | `docharbor reindex` | Rebuild the search index from the database |
//! | `docharbor serve` | Start the HTTP API and the ingestion scheduler |
//!
//! Results go to stdout, logs to stderr.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use docharbor::config;
use docharbor::engine::Engine;
use docharbor::ingest::FileOutcome;
use docharbor::logging;
use docharbor::migrate;
use docharbor::scheduler::Scheduler;
use docharbor::server;

/// docharbor: watched-folder document ingestion with OCR and full-text search.
#[derive(Parser)]
#[command(name = "docharbor", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docharbor.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run more than once.
    Init,

    /// Run one ingestion pass over the ingress folder.
    Ingest,

    /// Ingest a single file from anywhere on disk, as an upload would.
    Add {
        /// File to ingest.
        file: PathBuf,

        /// Sub-directory of ingress to place the file in.
        #[arg(long, default_value = "")]
        path: String,
    },

    /// Purge documents whose file is gone and send orphan files back to ingress.
    Clean,

    /// Full-text search. Whitespace in the term makes it a phrase query.
    Search {
        term: String,

        #[arg(long, default_value_t = 1)]
        page: i64,
    },

    /// Print a document by id.
    Get { id: String },

    /// List the newest documents.
    Latest {
        #[arg(long, default_value_t = 1)]
        page: i64,
    },

    /// Rebuild the search index from the document table.
    Reindex,

    /// Start the HTTP server and the periodic ingestion scheduler.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging.level);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest => {
            let engine = Engine::open(cfg).await?;
            match engine.run_ingestion().await {
                Some(s) => println!(
                    "Ingestion finished: {} scanned, {} registered, {} skipped, {} failed.",
                    s.scanned, s.registered, s.skipped, s.failed
                ),
                None => println!("Another job is running, nothing done."),
            }
        }
        Commands::Add { file, path } => {
            let engine = Engine::open(cfg).await?;
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .with_context(|| format!("not a file: {}", file.display()))?;
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;

            match engine.upload(&path, &name, &bytes).await? {
                FileOutcome::Registered(reg) => {
                    println!("Registered {} as {}", name, reg.id);
                    if let Some(dup) = reg.duplicate_of {
                        println!("  same content as {}", dup);
                    }
                }
                FileOutcome::Unsupported => anyhow::bail!("invalid file type: {}", name),
                FileOutcome::ExtractFailed(e) => anyhow::bail!("extraction failed: {}", e),
                FileOutcome::RegisterFailed(e) => return Err(e.into()),
                FileOutcome::Panicked(message) => {
                    anyhow::bail!("processing {} panicked: {}", name, message)
                }
            }
        }
        Commands::Clean => {
            let engine = Engine::open(cfg).await?;
            match engine.clean().await {
                Some(r) => println!(
                    "Clean finished: {} documents checked, {} purged, {} orphans moved to ingress.",
                    r.scanned, r.deleted, r.moved
                ),
                None => println!("Another job is running, nothing done."),
            }
        }
        Commands::Search { term, page } => {
            let engine = Engine::open(cfg).await?;
            let results = engine.search(&term, page).await?;
            if results.hits.is_empty() {
                println!("No results.");
                return Ok(());
            }
            for (i, hit) in results.hits.iter().enumerate() {
                let name = engine
                    .get(&hit.id)
                    .await?
                    .map(|d| d.name)
                    .unwrap_or_default();
                println!("{}. [{:.2}] {} ({})", i + 1, hit.score, name, hit.id);
                println!("    {}", hit.snippet.replace('\n', " "));
            }
            println!("{} total", results.total);
        }
        Commands::Get { id } => {
            let engine = Engine::open(cfg).await?;
            let doc = engine
                .get(&id)
                .await?
                .with_context(|| format!("document not found: {}", id))?;
            println!("id:       {}", doc.id);
            println!("name:     {}", doc.name);
            println!("path:     {}", doc.path);
            println!("folder:   {}", doc.folder);
            println!("type:     {}", doc.document_type);
            println!("hash:     {}", doc.hash);
            println!("ingested: {}", doc.ingress_time);
            println!("url:      {}", doc.url);
            println!();
            println!("{}", doc.full_text);
        }
        Commands::Latest { page } => {
            let engine = Engine::open(cfg).await?;
            let result = engine.latest(page).await?;
            for doc in &result.documents {
                println!("{}  {}  {}", doc.id, doc.folder, doc.name);
            }
            println!("{} total", result.total);
        }
        Commands::Reindex => {
            let engine = Engine::open(cfg).await?;
            let n = engine.reindex().await?;
            println!("Reindexed {} documents.", n);
        }
        Commands::Serve => {
            let engine = Arc::new(Engine::open(cfg).await?);
            let routes = engine.load_routes().await?;
            tracing::info!(routes, "view routes loaded");

            let scheduler = Scheduler::start(engine.clone());
            let result = server::run_server(engine, async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await;
            scheduler.shutdown().await;
            result?;
        }
    }

    Ok(())
}
