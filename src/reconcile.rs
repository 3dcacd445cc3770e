//! Reconciliation of the database, search index and document storage.
//!
//! Phase A purges documents whose stored file has disappeared. Phase B walks
//! document storage and moves every processable file without a row back into
//! ingress at the same relative location, so the next ingestion pass
//! registers it again. Companion sidecars (`<file>.yaml`, `<file>.txt`)
//! travel with their file and are never orphans in their own right.
//!
//! Running it twice in a row is a no-op the second time.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::models::{extension_of, CleanReport, Document, PROCESSABLE_EXTENSIONS};
use crate::registrar::move_file;
use crate::routes::ViewRoutes;
use crate::search::SearchIndex;
use crate::store::DocumentStore;

pub const COMPANION_SUFFIXES: &[&str] = &[".yaml", ".txt"];

pub struct Reconciler {
    config: Arc<Config>,
    store: Arc<dyn DocumentStore>,
    index: Arc<dyn SearchIndex>,
    routes: ViewRoutes,
}

impl Reconciler {
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

    pub async fn run(&self) -> CleanReport {
        let mut report = CleanReport::default();

        let documents = match self.store.all().await {
            Ok(docs) => docs,
            Err(e) => {
                error!(error = %e, "failed to list documents, clean aborted");
                return report;
            }
        };
        report.scanned = documents.len();

        report.deleted = self.purge_missing(&documents).await;
        report.moved = self.relocate_orphans(&documents).await;

        info!(
            scanned = report.scanned,
            deleted = report.deleted,
            moved = report.moved,
            "clean finished"
        );
        report
    }

    async fn purge_missing(&self, documents: &[Document]) -> usize {
        let mut deleted = 0;
        for doc in documents {
            if doc.path.is_empty() {
                warn!(id = %doc.id, "document has no recorded path, skipping");
                continue;
            }
            match tokio::fs::try_exists(&doc.path).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    warn!(id = %doc.id, path = %doc.path, error = %e, "cannot verify file, skipping");
                    continue;
                }
            }

            if let Err(e) = self.store.delete(&doc.id).await {
                warn!(id = %doc.id, error = %e, "failed to delete document row");
                continue;
            }
            if let Err(e) = self.index.remove(&doc.id).await {
                warn!(id = %doc.id, error = %e, "failed to remove search entry");
            }
            self.routes.unregister(&doc.id);

            info!(id = %doc.id, path = %doc.path, "purged document with missing file");
            deleted += 1;
        }
        deleted
    }

    async fn relocate_orphans(&self, documents: &[Document]) -> usize {
        let docs_root = self.config.documents.root.as_path();
        if !docs_root.exists() {
            return 0;
        }

        let known = known_paths(documents);
        let files: Vec<PathBuf> = WalkDir::new(docs_root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(e) => Some(e),
                Err(e) => {
                    warn!(error = %e, "failed to read storage entry");
                    None
                }
            })
            .filter(|e| !e.file_type().is_dir())
            .map(|e| e.into_path())
            .collect();

        let mut moved = 0;
        for path in files {
            // already moved as a companion earlier in this pass
            if !path.exists() {
                continue;
            }
            if !is_orphan(&path, &known) {
                continue;
            }
            match self.move_to_ingress(&path).await {
                Ok(dest) => {
                    info!(from = %path.display(), to = %dest.display(), "moved orphan to ingress");
                    moved += 1;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %format!("{:#}", e), "failed to move orphan");
                }
            }
        }
        moved
    }

    async fn move_to_ingress(&self, path: &Path) -> anyhow::Result<PathBuf> {
        let relative = match path.strip_prefix(&self.config.documents.root) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => PathBuf::from(path.file_name().unwrap_or(path.as_os_str())),
        };
        let dest = self.config.ingress.root.join(&relative);
        move_file(path, &dest).await?;

        for (companion, suffix) in companions_of(path) {
            let companion_dest = with_suffix(&dest, suffix);
            match move_file(&companion, &companion_dest).await {
                Ok(()) => debug!(companion = %companion.display(), "moved companion file"),
                Err(e) => warn!(
                    companion = %companion.display(),
                    error = %format!("{:#}", e),
                    "failed to move companion file"
                ),
            }
        }
        Ok(dest)
    }
}

/// `path` with `suffix` appended to its full file name.
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

/// Every stored path plus its companion sidecar paths.
fn known_paths(documents: &[Document]) -> HashSet<PathBuf> {
    let mut known = HashSet::new();
    for doc in documents.iter().filter(|d| !d.path.is_empty()) {
        let path = PathBuf::from(&doc.path);
        for suffix in COMPANION_SUFFIXES {
            known.insert(with_suffix(&path, suffix));
        }
        known.insert(path);
    }
    known
}

/// A sidecar whose base file sits next to it on disk.
pub fn is_companion_of_existing(path: &Path) -> bool {
    let ext = extension_of(path);
    if !COMPANION_SUFFIXES
        .iter()
        .any(|s| s.trim_start_matches('.') == ext)
    {
        return false;
    }
    path.with_extension("").is_file()
}

/// Companion sidecars of `base` that exist on disk.
pub fn companions_of(base: &Path) -> Vec<(PathBuf, &'static str)> {
    COMPANION_SUFFIXES
        .iter()
        .map(|suffix| (with_suffix(base, suffix), *suffix))
        .filter(|(path, _)| path.is_file())
        .collect()
}

fn is_orphan(path: &Path, known: &HashSet<PathBuf>) -> bool {
    if is_companion_of_existing(path) || known.contains(path) {
        return false;
    }
    PROCESSABLE_EXTENSIONS.contains(&extension_of(path).as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn doc_at(path: &Path) -> Document {
        Document {
            id: "id".into(),
            name: "n".into(),
            path: path.to_string_lossy().to_string(),
            ingress_time: 0,
            folder: String::new(),
            hash: String::new(),
            document_type: "pdf".into(),
            full_text: String::new(),
            url: String::new(),
        }
    }

    #[test]
    fn suffix_is_appended_to_full_name() {
        assert_eq!(
            with_suffix(Path::new("/d/a.pdf"), ".yaml"),
            PathBuf::from("/d/a.pdf.yaml")
        );
    }

    #[test]
    fn known_paths_include_companions() {
        let known = known_paths(&[doc_at(Path::new("/d/a.pdf"))]);
        assert!(known.contains(Path::new("/d/a.pdf")));
        assert!(known.contains(Path::new("/d/a.pdf.yaml")));
        assert!(known.contains(Path::new("/d/a.pdf.txt")));
        assert_eq!(known.len(), 3);
    }

    #[test]
    fn orphan_classification() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path();
        let tracked = dir.join("tracked.pdf");
        let stray = dir.join("stray.png");
        let sidecar = dir.join("stray.png.txt");
        let lone_text = dir.join("notes.txt");
        let binary = dir.join("archive.zip");
        for p in [&tracked, &stray, &sidecar, &lone_text, &binary] {
            std::fs::write(p, "x").unwrap();
        }
        let known = known_paths(&[doc_at(&tracked)]);

        assert!(!is_orphan(&tracked, &known));
        assert!(is_orphan(&stray, &known));
        assert!(!is_orphan(&sidecar, &known), "companion of an existing file");
        assert!(is_orphan(&lone_text, &known), "plain text without a base file");
        assert!(!is_orphan(&binary, &known), "not processable");
    }

    #[test]
    fn directory_named_like_base_does_not_make_a_companion() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path();
        std::fs::create_dir(dir.join("minutes")).unwrap();
        std::fs::write(dir.join("minutes.txt"), "x").unwrap();
        std::fs::write(dir.join("scan.pdf"), "x").unwrap();
        std::fs::write(dir.join("scan.pdf.yaml"), "tags: []").unwrap();

        assert!(!is_companion_of_existing(&dir.join("minutes.txt")));
        assert!(is_companion_of_existing(&dir.join("scan.pdf.yaml")));
        assert_eq!(
            companions_of(&dir.join("scan.pdf")),
            vec![(dir.join("scan.pdf.yaml"), ".yaml")]
        );
    }
}
