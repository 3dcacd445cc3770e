//! The pipeline facade.
//!
//! [`Engine`] owns every collaborator explicitly (configuration, document
//! store, search index, view routes, extractor) and exposes the operations
//! used by the CLI, the scheduler and the HTTP layer. Ingestion and clean
//! share one [`RunGuard`], so at most one of them runs at any time; a request
//! that finds the guard taken is skipped, not queued.

use anyhow::{bail, Context, Result};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::db;
use crate::error::StorageError;
use crate::extract::Extractor;
use crate::ingest::{panic_message, FileOutcome, Ingestor};
use crate::migrate;
use crate::models::{
    About, CleanReport, Document, DocumentField, FileTree, FileType, IngestSummary, Origin, Page,
    SearchResults,
};
use crate::reconcile::{companions_of, Reconciler};
use crate::registrar::Registrar;
use crate::routes::ViewRoutes;
use crate::scheduler::{RunGuard, RunPermit, Triggered};
use crate::search::{SearchIndex, SearchQuery, SqliteSearchIndex};
use crate::store::{DocumentStore, SqliteDocumentStore};
use crate::tree;

pub const LATEST_PAGE_SIZE: i64 = 20;
pub const SEARCH_PAGE_SIZE: i64 = 20;

pub struct Engine {
    config: Arc<Config>,
    store: Arc<dyn DocumentStore>,
    index: Arc<dyn SearchIndex>,
    routes: ViewRoutes,
    ingestor: Ingestor,
    reconciler: Reconciler,
    guard: RunGuard,
    last_clean: Mutex<Option<CleanReport>>,
}

impl Engine {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn DocumentStore>,
        index: Arc<dyn SearchIndex>,
        extractor: Extractor,
    ) -> Result<Self> {
        let routes = ViewRoutes::new();
        let registrar = Registrar::new(
            config.clone(),
            store.clone(),
            index.clone(),
            routes.clone(),
        );
        let ingestor = Ingestor::new(config.clone(), Arc::new(extractor), registrar)?;
        let reconciler = Reconciler::new(
            config.clone(),
            store.clone(),
            index.clone(),
            routes.clone(),
        );

        Ok(Self {
            config,
            store,
            index,
            routes,
            ingestor,
            reconciler,
            guard: RunGuard::new(),
            last_clean: Mutex::new(None),
        })
    }

    /// Connects to SQLite, bootstraps the schema and wires the production
    /// store, index and extractor.
    pub async fn open(config: Config) -> Result<Self> {
        let pool = db::connect(&config).await?;
        migrate::bootstrap(&pool).await?;

        if !config.ocr.is_enabled() {
            info!("no OCR engine configured, images and scanned PDFs register without text");
        }

        let extractor = Extractor::from_config(&config);
        let store = Arc::new(SqliteDocumentStore::new(pool.clone()));
        let index = Arc::new(SqliteSearchIndex::new(pool));
        Self::new(Arc::new(config), store, index, extractor)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn index(&self) -> &Arc<dyn SearchIndex> {
        &self.index
    }

    pub fn routes(&self) -> &ViewRoutes {
        &self.routes
    }

    pub fn guard(&self) -> &RunGuard {
        &self.guard
    }

    /// Registers a view route for every stored document.
    pub async fn load_routes(&self) -> Result<usize> {
        let documents = self.store.all().await?;
        let mut loaded = 0;
        for doc in documents.iter().filter(|d| !d.path.is_empty()) {
            self.routes.register(&doc.id, Path::new(&doc.path));
            loaded += 1;
        }
        Ok(loaded)
    }

    // ============ Jobs ============

    /// Runs one ingestion pass to completion. `None` when another job holds
    /// the guard.
    pub async fn run_ingestion(&self) -> Option<IngestSummary> {
        let permit = self.guard.try_acquire()?;
        Some(self.ingest_with(permit).await)
    }

    /// Runs one clean pass to completion. `None` when another job holds the
    /// guard.
    pub async fn clean(&self) -> Option<CleanReport> {
        let permit = self.guard.try_acquire()?;
        Some(self.clean_with(permit).await)
    }

    /// Starts an ingestion pass in the background and returns immediately.
    pub fn trigger_ingestion(self: &Arc<Self>) -> Triggered {
        let Some(permit) = self.guard.try_acquire() else {
            return Triggered::Busy;
        };
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine.ingest_with(permit).await;
        });
        Triggered::Started
    }

    /// Starts a clean pass in the background and returns immediately. The
    /// report becomes available through [`Engine::last_clean`].
    pub fn trigger_clean(self: &Arc<Self>) -> Triggered {
        let Some(permit) = self.guard.try_acquire() else {
            return Triggered::Busy;
        };
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine.clean_with(permit).await;
        });
        Triggered::Started
    }

    pub fn last_clean(&self) -> Option<CleanReport> {
        *self.last_clean.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn ingest_with(&self, _permit: RunPermit) -> IngestSummary {
        match AssertUnwindSafe(self.ingestor.walk()).catch_unwind().await {
            Ok(summary) => summary,
            Err(panic) => {
                error!(panic = %panic_message(panic.as_ref()), "ingestion run panicked");
                IngestSummary::default()
            }
        }
    }

    async fn clean_with(&self, _permit: RunPermit) -> CleanReport {
        let report = match AssertUnwindSafe(self.reconciler.run()).catch_unwind().await {
            Ok(report) => report,
            Err(panic) => {
                error!(panic = %panic_message(panic.as_ref()), "clean run panicked");
                CleanReport::default()
            }
        };
        *self.last_clean.lock().unwrap_or_else(|e| e.into_inner()) = Some(report);
        report
    }

    // ============ Documents ============

    /// Writes an uploaded file into ingress and pushes it through the
    /// pipeline right away, behind the same per-file panic boundary as an
    /// ingestion pass.
    pub async fn upload(
        &self,
        rel_dir: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<FileOutcome, StorageError> {
        let name = safe_file_name(file_name)?;
        if FileType::from_path(Path::new(name)).is_none() {
            return Err(StorageError::InvalidType(name.to_string()));
        }
        let dir = safe_relative_dir(rel_dir)?;

        let target = self.config.ingress.root.join(dir).join(name);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&target, bytes)
            .await
            .with_context(|| format!("failed to write {}", target.display()))?;

        info!(path = %target.display(), bytes = bytes.len(), "upload written to ingress");
        Ok(self.ingestor.ingest_guarded(&target, Origin::Upload).await)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Document>> {
        self.store.get(id).await
    }

    pub async fn latest(&self, page: i64) -> Result<Page> {
        self.store.newest(page, LATEST_PAGE_SIZE).await
    }

    pub async fn folder(&self, folder: &str) -> Result<Vec<Document>> {
        self.store.list_folder(folder.trim_matches('/')).await
    }

    /// Removes the stored file and its companions, the row, the search
    /// entry and the route. Returns the deleted document, or `None` if the id
    /// is unknown.
    pub async fn delete_document(&self, id: &str) -> Result<Option<Document>> {
        let Some(doc) = self.store.get(id).await? else {
            return Ok(None);
        };

        if !doc.path.is_empty() {
            let stored = Path::new(&doc.path);
            for (companion, _) in companions_of(stored) {
                if let Err(e) = tokio::fs::remove_file(&companion).await {
                    warn!(id, companion = %companion.display(), error = %e, "failed to delete companion");
                }
            }
            match tokio::fs::remove_file(stored).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| format!("failed to delete {}", doc.path));
                }
            }
        }

        self.forget(&doc).await?;
        info!(id, path = %doc.path, "document deleted");
        Ok(Some(doc))
    }

    /// Drops the row, the search entry and the route of `doc`.
    async fn forget(&self, doc: &Document) -> Result<()> {
        self.store.delete(&doc.id).await?;
        if let Err(e) = self.index.remove(&doc.id).await {
            warn!(id = %doc.id, error = %e, "failed to remove search entry");
        }
        self.routes.unregister(&doc.id);
        Ok(())
    }

    // ============ Storage tree ============

    /// The document storage tree with registered documents attached.
    pub async fn file_tree(&self) -> Result<FileTree> {
        let root = self.config.documents.root.clone();
        let documents = self.store.all().await?;
        let scan_root = root.clone();
        let nodes = tokio::task::spawn_blocking(move || tree::scan(&scan_root))
            .await
            .context("storage scan task failed")??;
        Ok(tree::attach_documents(&root, nodes, &documents))
    }

    /// Creates `name` inside `parent` (both relative to the document root).
    /// The parent must exist, except for the document root itself. Returns
    /// the new folder's relative path.
    pub async fn create_folder(&self, parent: &str, name: &str) -> Result<String, StorageError> {
        let parent_dir = safe_relative_dir(parent)?;
        let name = safe_file_name(name)?;
        let rel = parent_dir.join(name);
        let rel_str = rel.to_string_lossy().to_string();

        let root = &self.config.documents.root;
        tokio::fs::create_dir_all(root)
            .await
            .with_context(|| format!("failed to create {}", root.display()))?;

        let dir = root.join(&rel);
        match tokio::fs::create_dir(&dir).await {
            Ok(()) => {
                info!(folder = %rel_str, "folder created");
                Ok(rel_str)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(StorageError::AlreadyExists(rel_str))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(parent.to_string()))
            }
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("failed to create {}", dir.display()))
                .into()),
        }
    }

    /// Deletes a folder or a single file under the document root. Every
    /// document stored under it is removed too. Returns how many documents
    /// were removed. The document root itself cannot be deleted.
    pub async fn delete_path(&self, rel: &str) -> Result<usize, StorageError> {
        let rel_dir = safe_relative_dir(rel)?;
        if !rel_dir.components().any(|c| matches!(c, Component::Normal(_))) {
            return Err(StorageError::InvalidPath(rel.to_string()));
        }
        let target = self.config.documents.root.join(&rel_dir);

        let metadata = match tokio::fs::metadata(&target).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(rel.to_string()));
            }
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("failed to stat {}", target.display()))
                    .into());
            }
        };

        if !metadata.is_dir() {
            let stored = self.store.get_by_path(&target.to_string_lossy()).await?;
            return match stored {
                Some(doc) => {
                    self.delete_document(&doc.id).await?;
                    Ok(1)
                }
                None => {
                    tokio::fs::remove_file(&target)
                        .await
                        .with_context(|| format!("failed to delete {}", target.display()))?;
                    Ok(0)
                }
            };
        }

        tokio::fs::remove_dir_all(&target)
            .await
            .with_context(|| format!("failed to delete {}", target.display()))?;

        let mut removed = 0;
        for doc in self.store.all().await? {
            if Path::new(&doc.path).starts_with(&target) {
                self.forget(&doc).await?;
                removed += 1;
            }
        }
        info!(folder = %target.display(), documents = removed, "folder deleted");
        Ok(removed)
    }

    pub async fn about(&self) -> Result<About> {
        Ok(About {
            version: env!("CARGO_PKG_VERSION").to_string(),
            ocr_configured: self.config.ocr.is_enabled(),
            ocr_path: self.config.ocr.tesseract_path.clone(),
            converter_configured: self.config.converter.is_enabled(),
            database_type: "sqlite".to_string(),
            database_path: self.config.db.path.display().to_string(),
            document_count: self.store.count().await?,
            interval_minutes: self.config.ingress.interval_minutes,
            job_running: self.guard.is_running(),
        })
    }

    /// Patches the logical folder of each document. Returns how many rows
    /// were updated.
    pub async fn move_documents(&self, ids: &[String], folder: &str) -> Result<usize> {
        let folder = folder.trim_matches('/').to_string();
        let mut updated = 0;
        for id in ids {
            if self
                .store
                .update_field(id, DocumentField::Folder(folder.clone()))
                .await?
            {
                updated += 1;
            }
        }
        Ok(updated)
    }

    /// `page` is 1-based.
    pub async fn search(&self, term: &str, page: i64) -> Result<SearchResults> {
        let query = SearchQuery::parse(term)?;
        let offset = (page.max(1) - 1) * SEARCH_PAGE_SIZE;
        self.index.search(&query, SEARCH_PAGE_SIZE, offset).await
    }

    /// Rebuilds the search index from the document store.
    pub async fn reindex(&self) -> Result<usize> {
        let Some(_permit) = self.guard.try_acquire() else {
            bail!("a job is running, try again later");
        };
        self.index.clear().await?;
        let documents = self.store.all().await?;
        for doc in &documents {
            self.index.index(&doc.id, &doc.name, &doc.full_text).await?;
        }
        info!(documents = documents.len(), "search index rebuilt");
        Ok(documents.len())
    }
}

fn safe_file_name(name: &str) -> Result<&str, StorageError> {
    let trimmed = name.trim();
    match Path::new(trimmed).components().collect::<Vec<_>>().as_slice() {
        [Component::Normal(_)] => Ok(trimmed),
        _ => Err(StorageError::InvalidName(name.to_string())),
    }
}

fn safe_relative_dir(dir: &str) -> Result<PathBuf, StorageError> {
    let trimmed = dir.trim().trim_matches('/');
    let path = Path::new(trimmed);
    if path
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
    {
        Ok(path.to_path_buf())
    } else {
        Err(StorageError::InvalidPath(dir.to_string()))
    }
}
