//! # docharbor
//!
//! Watched-folder document ingestion with text extraction, OCR fallback and
//! full-text search.
//!
//! Files dropped into the ingress folder are classified by extension, their
//! text is extracted (directly, or by rasterizing and OCR-ing scanned pages),
//! and they are registered into SQLite, an FTS5 index and durable document
//! storage. A periodic reconciler repairs drift between the three.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌───────────┐   ┌──────────────┐
//! │ Ingress  │──▶│  Ingestor │──▶│ Extractor │──▶│  Registrar   │
//! │ (folder) │   │  (walk)   │   │ (chains)  │   │ row/index/   │
//! └──────────┘   └───────────┘   └───────────┘   │ url/copy/    │
//!      ▲                                         │ dispose      │
//!      │ orphans                                 └──────┬───────┘
//! ┌────┴───────┐                                        ▼
//! │ Reconciler │◀──────────── SQLite + FTS5 + document storage
//! └────────────┘                       │
//!                        ┌─────────────┤
//!                        ▼             ▼
//!                   ┌─────────┐   ┌─────────┐
//!                   │   CLI   │   │  HTTP   │
//!                   └─────────┘   └─────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docharbor init          # create database
//! docharbor ingest        # process the ingress folder once
//! docharbor search "tax return"
//! docharbor serve         # HTTP API plus scheduled ingestion
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types |
//! | [`error`] | Extraction and registration error types |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema bootstrap |
//! | [`store`] | Document store trait and SQLite implementation |
//! | [`search`] | Search index trait and FTS5 implementation |
//! | [`command`] | External process runner with timeouts |
//! | [`ocr`] | OCR engine trait and tesseract backend |
//! | [`raster`] | PDF page rendering and image preparation |
//! | [`extract`] | Fallback extraction chains per file type |
//! | [`routes`] | Document view routes |
//! | [`registrar`] | Document registration |
//! | [`ingest`] | Ingress walker |
//! | [`reconcile`] | Store/index/storage reconciliation |
//! | [`scheduler`] | Run guard and periodic ingestion |
//! | [`tree`] | Document storage tree listing |
//! | [`engine`] | Facade wiring all of the above |
//! | [`server`] | HTTP API |
//! | [`logging`] | Tracing subscriber setup |

pub mod command;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod ocr;
pub mod raster;
pub mod reconcile;
pub mod registrar;
pub mod routes;
pub mod scheduler;
pub mod search;
pub mod server;
pub mod store;
pub mod tree;
