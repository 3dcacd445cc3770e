//! Ingestion walker.
//!
//! One pass enumerates the ingress tree up front, then drives extraction and
//! registration for each file sequentially. Every file runs inside its own
//! panic boundary, so one bad file never stops its siblings. Companion
//! sidecars (`<file>.yaml`, `<file>.txt`) next to their base file are never
//! registered on their own; the registrar carries them into storage with the
//! base. Directories left empty afterwards are removed bottom-up; the ingress
//! root itself is always kept.

use futures::FutureExt;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{ExtractError, RegisterError};
use crate::extract::{Extractor, Outcome};
use crate::models::{FileType, IngestSummary, Origin};
use crate::reconcile::is_companion_of_existing;
use crate::registrar::{Registrar, Registration};

/// Result of pushing one file through the pipeline.
#[derive(Debug)]
pub enum FileOutcome {
    Registered(Registration),
    /// Extension is not handled; the file stays in place.
    Unsupported,
    /// Extraction failed; the file stays in place.
    ExtractFailed(ExtractError),
    RegisterFailed(RegisterError),
    /// Processing panicked; the file stays in place.
    Panicked(String),
}

pub struct Ingestor {
    config: Arc<Config>,
    extractor: Arc<Extractor>,
    registrar: Registrar,
    excludes: GlobSet,
}

impl Ingestor {
    pub fn new(
        config: Arc<Config>,
        extractor: Arc<Extractor>,
        registrar: Registrar,
    ) -> anyhow::Result<Self> {
        let mut patterns = vec![
            "**/.*".to_string(),
            "**/.*/**".to_string(),
            "**/*.part".to_string(),
            "**/*.tmp".to_string(),
        ];
        patterns.extend(config.ingress.exclude_globs.clone());
        let excludes = build_globset(&patterns)?;

        Ok(Self {
            config,
            extractor,
            registrar,
            excludes,
        })
    }

    /// Classifies, extracts and registers a single file.
    pub async fn ingest_file(&self, path: &Path, origin: Origin) -> FileOutcome {
        let Some(file_type) = FileType::from_path(path) else {
            warn!(path = %path.display(), "invalid file type, leaving in place");
            return FileOutcome::Unsupported;
        };

        let text = match self.extractor.extract(path, file_type).await {
            Outcome::Success(text) => text,
            Outcome::Empty => {
                warn!(path = %path.display(), "no text extracted, leaving in place");
                return FileOutcome::ExtractFailed(ExtractError::NoText);
            }
            Outcome::Failed(e) => {
                warn!(path = %path.display(), error = %e, "extraction failed, leaving in place");
                return FileOutcome::ExtractFailed(e);
            }
        };

        match self.registrar.register(path, &text, origin).await {
            Ok(registration) => FileOutcome::Registered(registration),
            Err(e) => {
                error!(path = %path.display(), error = %e, "registration failed");
                FileOutcome::RegisterFailed(e)
            }
        }
    }

    /// [`Ingestor::ingest_file`] behind a panic boundary.
    pub async fn ingest_guarded(&self, path: &Path, origin: Origin) -> FileOutcome {
        match AssertUnwindSafe(self.ingest_file(path, origin))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(
                    path = %path.display(),
                    origin = %origin,
                    panic = %message,
                    "panic while ingesting file"
                );
                FileOutcome::Panicked(message)
            }
        }
    }

    /// One full pass over the ingress tree.
    pub async fn walk(&self) -> IngestSummary {
        let root = self.config.ingress.root.as_path();
        let processed = self.config.ingress.processed_folder.as_deref();
        let mut summary = IngestSummary::default();

        if let Err(e) = tokio::fs::create_dir_all(root).await {
            error!(root = %root.display(), error = %e, "ingress root unavailable");
            return summary;
        }

        let entries: Vec<PathBuf> = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(e) => Some(e.into_path()),
                Err(e) => {
                    warn!(error = %e, "failed to read ingress entry");
                    None
                }
            })
            .collect();

        for path in entries {
            if path == root || processed.is_some_and(|p| path.starts_with(p)) {
                continue;
            }

            let metadata = match tokio::fs::metadata(&path).await {
                Ok(m) => m,
                // carried into storage with its base file earlier in this pass
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cannot stat entry, skipping");
                    continue;
                }
            };
            if metadata.is_dir() || is_companion_of_existing(&path) {
                continue;
            }
            summary.scanned += 1;

            let relative = path.strip_prefix(root).unwrap_or(&path);
            if self.excludes.is_match(relative) {
                debug!(path = %path.display(), "excluded");
                summary.skipped += 1;
                continue;
            }

            match self.ingest_guarded(&path, Origin::Ingress).await {
                FileOutcome::Registered(_) => summary.registered += 1,
                FileOutcome::Unsupported => summary.skipped += 1,
                _ => summary.failed += 1,
            }
        }

        let removed = remove_empty_dirs(root, processed);
        if removed > 0 {
            debug!(removed, "removed empty ingress directories");
        }

        info!(
            scanned = summary.scanned,
            registered = summary.registered,
            skipped = summary.skipped,
            failed = summary.failed,
            "ingestion pass finished"
        );
        summary
    }
}

fn build_globset(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Removes empty directories below `root`, deepest first. `root` and every
/// ancestor of `keep` survive. Returns how many directories were removed.
pub fn remove_empty_dirs(root: &Path, keep: Option<&Path>) -> usize {
    let dirs: Vec<PathBuf> = WalkDir::new(root)
        .min_depth(1)
        .contents_first(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_dir())
        .map(|e| e.into_path())
        .collect();

    let mut removed = 0;
    for dir in dirs {
        if keep.is_some_and(|k| k.starts_with(&dir)) {
            continue;
        }
        let is_empty = std::fs::read_dir(&dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if !is_empty {
            continue;
        }
        match std::fs::remove_dir(&dir) {
            Ok(()) => removed += 1,
            Err(e) => debug!(dir = %dir.display(), error = %e, "could not remove directory"),
        }
    }
    removed
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
