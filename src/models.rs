//! Core data models used throughout docharbor.
//!
//! These types represent the documents, classifications and job reports that
//! flow through the ingestion and reconciliation pipeline.

use serde::Serialize;
use std::path::Path;

/// A registered document as stored in SQLite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    /// UUID v7; lexicographic order is creation order.
    pub id: String,
    pub name: String,
    /// Absolute path of the stored copy under the document root.
    pub path: String,
    /// Unix seconds.
    pub ingress_time: i64,
    /// Directory of the stored file relative to the document root, `/`-separated.
    pub folder: String,
    /// SHA-256 hex of the file bytes.
    pub hash: String,
    /// Lowercase extension without the dot.
    pub document_type: String,
    pub full_text: String,
    /// Empty until the view route has been published.
    pub url: String,
}

/// Where a file entered the pipeline from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Ingress,
    Upload,
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Origin::Ingress => write!(f, "ingress"),
            Origin::Upload => write!(f, "upload"),
        }
    }
}

/// Extension-based file family, selecting the extractor policy chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    PlainText,
    WordProcessor,
    Pdf,
    Image,
}

/// Every extension the pipeline can process.
pub const PROCESSABLE_EXTENSIONS: &[&str] = &[
    "pdf", "txt", "rtf", "doc", "docx", "odf", "tiff", "jpg", "jpeg", "png",
];

impl FileType {
    pub fn from_extension(ext: &str) -> Option<FileType> {
        match ext.to_ascii_lowercase().as_str() {
            "txt" | "rtf" => Some(FileType::PlainText),
            "doc" | "docx" | "odf" => Some(FileType::WordProcessor),
            "pdf" => Some(FileType::Pdf),
            "png" | "jpg" | "jpeg" | "tiff" => Some(FileType::Image),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<FileType> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(FileType::from_extension)
    }
}

/// Lowercase extension without the dot, or an empty string.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

/// A single mutable column, used for in-place patches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentField {
    Url(String),
    Folder(String),
}

/// One page of a newest-first listing.
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub documents: Vec<Document>,
    pub total: i64,
}

/// Outcome counters of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanReport {
    pub scanned: usize,
    pub deleted: usize,
    pub moved: usize,
}

/// Outcome counters of one ingestion pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub scanned: usize,
    pub registered: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// A ranked full-text hit.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f64,
    pub snippet: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResults {
    pub total: i64,
    pub hits: Vec<SearchHit>,
}

/// One entry of the document storage tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    /// Relative to the document root, `/`-separated; empty for the root.
    pub path: String,
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    /// RFC 3339.
    pub modified: Option<String>,
    /// `path` of the containing directory; `None` for the root.
    pub parent: Option<String>,
    /// Names of direct children, directories only.
    pub children: Vec<String>,
    pub document_id: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FileTree {
    pub nodes: Vec<TreeNode>,
    /// Files with no document row, companions excluded.
    pub untracked: Vec<String>,
}

/// Runtime configuration summary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct About {
    pub version: String,
    pub ocr_configured: bool,
    pub ocr_path: String,
    pub converter_configured: bool,
    pub database_type: String,
    pub database_path: String,
    pub document_count: i64,
    pub interval_minutes: u64,
    pub job_running: bool,
}
