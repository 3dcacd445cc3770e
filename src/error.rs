//! Error types for extraction and registration.

use std::fmt;
use thiserror::Error;

/// A per-file extraction failure. The file stays where it is.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("could not read file: {0}")]
    Io(#[from] std::io::Error),

    /// Missing `%PDF` magic bytes.
    #[error("not a PDF file")]
    NotPdf,

    #[error("PDF text layer could not be decoded: {0}")]
    Pdf(String),

    #[error("office document could not be decoded: {0}")]
    Office(String),

    /// No converter is available for this word-processor format.
    #[error("no converter configured for .{0} files")]
    NoConverter(String),

    #[error("converter failed: {0}")]
    Converter(String),

    #[error("PDF rendering failed: {0}")]
    Render(String),

    #[error("no pages could be rendered from PDF")]
    NoPagesRendered,

    #[error("image processing failed: {0}")]
    Image(String),

    #[error("OCR engine exited non-zero: {0}")]
    OcrExit(String),

    #[error("OCR produced empty output")]
    OcrEmpty,

    #[error("{program} timed out after {secs}s")]
    Timeout { program: String, secs: u64 },

    #[error("failed to run {program}: {message}")]
    Spawn { program: String, message: String },

    /// Every policy in the chain came back empty.
    #[error("no text extracted")]
    NoText,
}

/// The registration step that failed after the row was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterStep {
    Index,
    PublishUrl,
    Copy,
    Dispose,
}

impl fmt::Display for RegisterStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterStep::Index => write!(f, "search index"),
            RegisterStep::PublishUrl => write!(f, "publish url"),
            RegisterStep::Copy => write!(f, "copy to storage"),
            RegisterStep::Dispose => write!(f, "dispose of source"),
        }
    }
}

/// Registration failure.
///
/// `Aborted` means nothing was written. `Partial` means the row exists and the
/// steps before `step` completed; no rollback is attempted.
#[derive(Error, Debug)]
pub enum RegisterError {
    #[error("registration aborted for {path}: {source:#}")]
    Aborted {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("document {id} partially registered, {step} failed: {source:#}")]
    Partial {
        id: String,
        step: RegisterStep,
        #[source]
        source: anyhow::Error,
    },
}

impl RegisterError {
    pub fn is_partial(&self) -> bool {
        matches!(self, RegisterError::Partial { .. })
    }
}

/// Failure of an operation that writes into ingress or document storage on
/// behalf of a caller. The `Invalid*` variants reject the request itself.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("invalid file name: {0:?}")]
    InvalidName(String),

    #[error("invalid file type: {0}")]
    InvalidType(String),

    #[error("invalid path: {0:?}")]
    InvalidPath(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] anyhow::Error),
}
