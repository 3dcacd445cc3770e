//! Optical character recognition through an external tesseract binary.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::command::{failure_message, run_with_timeout};
use crate::config::OcrConfig;
use crate::error::ExtractError;

#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Recognizes the text in one image file. Empty output is an error.
    async fn recognize(&self, image: &Path) -> Result<String, ExtractError>;
}

pub struct TesseractOcr {
    program: PathBuf,
    timeout_secs: u64,
}

impl TesseractOcr {
    pub fn new(program: impl Into<PathBuf>, timeout_secs: u64) -> Self {
        Self {
            program: program.into(),
            timeout_secs,
        }
    }

    /// `None` when OCR is disabled. A configured path that points at a missing
    /// file also disables OCR; bare program names are resolved through `PATH`
    /// at call time.
    pub fn from_config(config: &OcrConfig) -> Option<Self> {
        if !config.is_enabled() {
            return None;
        }
        let program = PathBuf::from(config.tesseract_path.trim());
        if program.components().count() > 1 && !program.exists() {
            warn!(
                path = %program.display(),
                "tesseract not found at configured path, OCR disabled"
            );
            return None;
        }
        Some(Self::new(program, config.timeout_secs))
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    async fn recognize(&self, image: &Path) -> Result<String, ExtractError> {
        let work = TempDir::new()?;
        // tesseract INPUT OUTPUT -- writes OUTPUT.txt
        let output_base = work.path().join("ocr");
        let program = self.program.to_string_lossy().to_string();

        debug!(image = %image.display(), "running tesseract");

        let output = run_with_timeout(
            Command::new(&self.program).arg(image).arg(&output_base),
            &program,
            self.timeout_secs,
        )
        .await?;

        if !output.status.success() {
            return Err(ExtractError::OcrExit(failure_message(&output)));
        }

        let text = tokio::fs::read_to_string(output_base.with_extension("txt"))
            .await
            .map_err(|e| ExtractError::OcrExit(format!("no output file: {}", e)))?;

        let text = text.trim();
        if text.is_empty() {
            return Err(ExtractError::OcrEmpty);
        }
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_path_disables_ocr() {
        assert!(TesseractOcr::from_config(&OcrConfig::default()).is_none());
    }

    #[test]
    fn missing_absolute_path_disables_ocr() {
        let config = OcrConfig {
            tesseract_path: "/nonexistent/bin/tesseract".to_string(),
            ..OcrConfig::default()
        };
        assert!(TesseractOcr::from_config(&config).is_none());
    }

    #[test]
    fn bare_program_name_is_kept() {
        let config = OcrConfig {
            tesseract_path: "tesseract".to_string(),
            ..OcrConfig::default()
        };
        assert!(TesseractOcr::from_config(&config).is_some());
    }

    #[cfg(unix)]
    fn script(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-tesseract");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn reads_text_written_next_to_output_base() {
        let dir = TempDir::new().unwrap();
        let ocr = TesseractOcr::new(script(dir.path(), "printf 'HELLO\\n\\f' > \"$2.txt\""), 10);
        let text = ocr.recognize(&dir.path().join("in.png")).await.unwrap();
        assert_eq!(text, "HELLO");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn blank_output_is_an_error() {
        let dir = TempDir::new().unwrap();
        let ocr = TesseractOcr::new(script(dir.path(), "printf '  \\n' > \"$2.txt\""), 10);
        let err = ocr.recognize(&dir.path().join("in.png")).await.unwrap_err();
        assert!(matches!(err, ExtractError::OcrEmpty));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_an_error() {
        let dir = TempDir::new().unwrap();
        let ocr = TesseractOcr::new(script(dir.path(), "echo bad image >&2; exit 1"), 10);
        let err = ocr.recognize(&dir.path().join("in.png")).await.unwrap_err();
        match err {
            ExtractError::OcrExit(msg) => assert!(msg.contains("bad image")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
