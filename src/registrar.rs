//! Document registration.
//!
//! Turns an extracted file into a live document in a fixed order:
//!
//! 0. pick the storage path; if a different document or file already holds
//!    that name, the new one becomes `name (n).ext` instead
//! 1. upsert the database row, then add the text to the search index
//! 2. publish the `/document/view/{id}` route and persist its URL
//! 3. copy the file into document storage, carrying companion sidecars along
//! 4. delete the source, or move it to the processed folder
//!
//! A failure in step 1's row write aborts with nothing written. Index and URL
//! failures are logged and the sequence continues. A copy failure stops the
//! sequence so the source is never disposed of without a stored copy. The
//! first failure after the row exists is returned as
//! [`RegisterError::Partial`]; completed steps are not rolled back, and the
//! reconciler repairs the divergence later.

use anyhow::{anyhow, bail, Context};
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{RegisterError, RegisterStep};
use crate::models::{extension_of, Document, DocumentField, Origin};
use crate::reconcile::{companions_of, with_suffix};
use crate::routes::ViewRoutes;
use crate::search::SearchIndex;
use crate::store::DocumentStore;

const MAX_NAME_ATTEMPTS: u32 = 1000;

/// A completed registration.
#[derive(Debug, Clone)]
pub struct Registration {
    pub id: String,
    pub stored_path: PathBuf,
    /// Id of an existing document with identical content at another path.
    pub duplicate_of: Option<String>,
}

pub struct Registrar {
    config: Arc<Config>,
    store: Arc<dyn DocumentStore>,
    index: Arc<dyn SearchIndex>,
    routes: ViewRoutes,
}

impl Registrar {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn DocumentStore>,
        index: Arc<dyn SearchIndex>,
        routes: ViewRoutes,
    ) -> Self {
        Self {
            config,
            store,
            index,
            routes,
        }
    }

    pub async fn register(
        &self,
        source: &Path,
        text: &str,
        origin: Origin,
    ) -> Result<Registration, RegisterError> {
        let aborted = |e: anyhow::Error| RegisterError::Aborted {
            path: source.display().to_string(),
            source: e,
        };

        let preferred = destination_for(&self.config, source).map_err(aborted)?;
        let hash = hash_file(source).await.map_err(aborted)?;
        let dest = self
            .free_destination(&preferred, &hash)
            .await
            .map_err(aborted)?;
        if dest != preferred {
            info!(
                taken = %preferred.display(),
                stored = %dest.display(),
                "name held by different content, storing under a new name"
            );
        }
        let dest_str = dest.to_string_lossy().to_string();

        let duplicate_of = match self.store.get_by_hash(&hash).await {
            Ok(Some(existing)) if existing.path != dest_str => {
                warn!(
                    source = %source.display(),
                    existing_id = %existing.id,
                    existing_path = %existing.path,
                    "identical content already registered"
                );
                Some(existing.id)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(source = %source.display(), error = %e, "duplicate check failed");
                None
            }
        };

        // Step 1: row
        let doc = Document {
            id: Uuid::now_v7().to_string(),
            name: file_name_of(&dest),
            path: dest_str.clone(),
            ingress_time: chrono::Utc::now().timestamp(),
            folder: folder_of(&dest, &self.config.documents.root),
            hash,
            document_type: extension_of(&dest),
            full_text: text.to_string(),
            url: String::new(),
        };
        let id = self.store.save(&doc).await.map_err(aborted)?;

        let mut first_error: Option<(RegisterStep, anyhow::Error)> = None;

        if let Err(e) = self.index.index(&id, &doc.name, text).await {
            note_failure(&mut first_error, &id, RegisterStep::Index, e);
        }

        // Step 2: URL
        let url = self.routes.register(&id, &dest);
        match self.store.update_field(&id, DocumentField::Url(url)).await {
            Ok(true) => {}
            Ok(false) => note_failure(
                &mut first_error,
                &id,
                RegisterStep::PublishUrl,
                anyhow!("row {} vanished before its URL was saved", id),
            ),
            Err(e) => note_failure(&mut first_error, &id, RegisterStep::PublishUrl, e),
        }

        // Step 3: copy
        if let Err(e) = copy_into_storage(source, &dest).await {
            warn!(id = %id, error = %format!("{:#}", e), "copy failed, source left in place");
            let (step, source) = first_error.unwrap_or((RegisterStep::Copy, e));
            return Err(RegisterError::Partial { id, step, source });
        }

        for (companion, suffix) in companions_of(source) {
            let target = with_suffix(&dest, suffix);
            if let Err(e) = move_file(&companion, &target).await {
                warn!(
                    id = %id,
                    companion = %companion.display(),
                    error = %format!("{:#}", e),
                    "failed to carry companion file"
                );
            }
        }

        // Step 4: dispose
        if let Err(e) = self.dispose(source).await {
            note_failure(&mut first_error, &id, RegisterStep::Dispose, e);
        }

        if let Some((step, source)) = first_error {
            return Err(RegisterError::Partial { id, step, source });
        }

        info!(
            id = %id,
            origin = %origin,
            source = %source.display(),
            stored = %dest.display(),
            "document registered"
        );
        Ok(Registration {
            id,
            stored_path: dest,
            duplicate_of,
        })
    }

    /// First of `preferred`, `name (1).ext`, `name (2).ext`, ... that is
    /// free or already holds content `hash`.
    async fn free_destination(&self, preferred: &Path, hash: &str) -> anyhow::Result<PathBuf> {
        for n in 0..MAX_NAME_ATTEMPTS {
            let candidate = match n {
                0 => preferred.to_path_buf(),
                n => numbered(preferred, n),
            };
            if self.holds_nothing_else(&candidate, hash).await? {
                return Ok(candidate);
            }
        }
        bail!(
            "no free name for {} after {} attempts",
            preferred.display(),
            MAX_NAME_ATTEMPTS
        )
    }

    async fn holds_nothing_else(&self, path: &Path, hash: &str) -> anyhow::Result<bool> {
        if let Some(existing) = self.store.get_by_path(&path.to_string_lossy()).await? {
            return Ok(existing.hash == hash);
        }
        let exists = tokio::fs::try_exists(path)
            .await
            .with_context(|| format!("failed to check {}", path.display()))?;
        if exists {
            return Ok(hash_file(path).await? == hash);
        }
        Ok(true)
    }

    async fn dispose(&self, source: &Path) -> anyhow::Result<()> {
        if self.config.ingress.delete_on_process {
            return tokio::fs::remove_file(source)
                .await
                .with_context(|| format!("failed to delete {}", source.display()));
        }

        let folder = self
            .config
            .ingress
            .processed_folder
            .as_ref()
            .ok_or_else(|| anyhow!("no processed folder configured"))?;
        let file_name = source
            .file_name()
            .ok_or_else(|| anyhow!("source has no file name: {}", source.display()))?;
        move_file(source, &folder.join(file_name)).await
    }
}

/// Where `source` will live under the document root.
pub fn destination_for(config: &Config, source: &Path) -> anyhow::Result<PathBuf> {
    let file_name = source
        .file_name()
        .ok_or_else(|| anyhow!("source has no file name: {}", source.display()))?;

    let docs_root = &config.documents.root;
    if config.ingress.preserve_structure {
        if let Ok(rel) = source.strip_prefix(&config.ingress.root) {
            if rel.components().all(|c| matches!(c, Component::Normal(_))) {
                return Ok(docs_root.join(rel));
            }
        }
    }
    Ok(docs_root
        .join(&config.documents.new_document_folder)
        .join(file_name))
}

/// `bill.txt` becomes `bill (n).txt`.
fn numbered(path: &Path, n: u32) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{} ({}).{}", stem, n, ext.to_string_lossy()),
        None => format!("{} ({})", stem, n),
    };
    path.with_file_name(name)
}

fn note_failure(
    first: &mut Option<(RegisterStep, anyhow::Error)>,
    id: &str,
    step: RegisterStep,
    err: anyhow::Error,
) {
    warn!(id = %id, step = %step, error = %format!("{:#}", err), "registration step failed");
    if first.is_none() {
        *first = Some((step, err));
    }
}

pub async fn hash_file(path: &Path) -> anyhow::Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Parent directory of `path` relative to `root`, `/`-separated.
pub fn folder_of(path: &Path, root: &Path) -> String {
    path.parent()
        .and_then(|p| p.strip_prefix(root).ok())
        .map(|rel| {
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_default()
}

async fn copy_into_storage(source: &Path, dest: &Path) -> anyhow::Result<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    tokio::fs::copy(source, dest)
        .await
        .with_context(|| format!("failed to copy {} to {}", source.display(), dest.display()))?;
    Ok(())
}

/// Renames `from` to `to`, creating parent directories. Falls back to copy
/// and delete when a rename is impossible (e.g. across filesystems).
pub async fn move_file(from: &Path, to: &Path) -> anyhow::Result<()> {
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    if let Err(rename_err) = tokio::fs::rename(from, to).await {
        tokio::fs::copy(from, to).await.with_context(|| {
            format!(
                "failed to move {} to {}: {}",
                from.display(),
                to.display(),
                rename_err
            )
        })?;
        tokio::fs::remove_file(from)
            .await
            .with_context(|| format!("failed to remove {} after copy", from.display()))?;
    }
    Ok(())
}
