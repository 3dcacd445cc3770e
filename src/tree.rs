//! Document storage tree listing.
//!
//! Walks the document root and joins every file with the document row stored
//! at its path, so a client can browse storage and open registered files.

use anyhow::Result;
use std::collections::HashMap;
use std::path::Path;
use walkdir::WalkDir;

use crate::models::{Document, FileTree, TreeNode};
use crate::reconcile::is_companion_of_existing;

/// Every directory and file under `root`, parents before children, siblings
/// sorted by name. A missing root yields an empty list.
pub fn scan(root: &Path) -> Result<Vec<TreeNode>> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut nodes: Vec<TreeNode> = Vec::new();
    let mut by_path: HashMap<String, usize> = HashMap::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        let metadata = entry.metadata()?;
        let path = relative_key(entry.path(), root);
        let parent = (entry.depth() > 0)
            .then(|| entry.path().parent().map(|p| relative_key(p, root)))
            .flatten();

        if let Some(&i) = parent.as_ref().and_then(|p| by_path.get(p)) {
            nodes[i]
                .children
                .push(entry.file_name().to_string_lossy().to_string());
        }
        by_path.insert(path.clone(), nodes.len());

        nodes.push(TreeNode {
            path,
            name: entry.file_name().to_string_lossy().to_string(),
            is_dir: metadata.is_dir(),
            size: if metadata.is_dir() { 0 } else { metadata.len() },
            modified: metadata
                .modified()
                .ok()
                .map(|t| chrono::DateTime::<chrono::Utc>::from(t).to_rfc3339()),
            parent,
            children: Vec::new(),
            document_id: None,
            url: None,
        });
    }
    Ok(nodes)
}

/// Fills in document ids and URLs from `documents` and collects files that
/// have no row.
pub fn attach_documents(root: &Path, mut nodes: Vec<TreeNode>, documents: &[Document]) -> FileTree {
    let by_path: HashMap<&str, &Document> =
        documents.iter().map(|d| (d.path.as_str(), d)).collect();

    let mut untracked = Vec::new();
    for node in nodes.iter_mut().filter(|n| !n.is_dir) {
        let full = root.join(&node.path);
        match by_path.get(full.to_string_lossy().as_ref()) {
            Some(doc) => {
                node.document_id = Some(doc.id.clone());
                node.url = (!doc.url.is_empty()).then(|| doc.url.clone());
            }
            None if is_companion_of_existing(&full) => {}
            None => untracked.push(node.path.clone()),
        }
    }
    FileTree { nodes, untracked }
}

fn relative_key(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .map(|rel| {
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_default()
}
