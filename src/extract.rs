//! Text extraction with explicit per-type fallback chains.
//!
//! Each file family maps to an ordered list of [`Policy`] objects. A chain
//! runs its policies in order and stops at the first [`Outcome::Success`];
//! `Empty` and recoverable `Failed` outcomes fall through to the next policy.
//!
//! | Family | Chain |
//! |--------|-------|
//! | Plain text (`.txt`, `.rtf`) | raw content |
//! | Word processor (`.doc`, `.docx`, `.odf`) | built-in OOXML / OpenDocument reader, then external converter |
//! | PDF | text layer, then rasterize + OCR |
//! | Image (`.png`, `.jpg`, `.jpeg`, `.tiff`) | OCR |
//!
//! When no OCR engine is configured, OCR policies succeed with empty text so
//! the document is still registered.

use async_trait::async_trait;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::debug;

use crate::command::{failure_message, run_with_timeout};
use crate::config::{Config, ConverterConfig};
use crate::error::ExtractError;
use crate::models::{extension_of, FileType};
use crate::ocr::{OcrEngine, TesseractOcr};
use crate::raster::{self, PageRenderer, Pdftoppm};

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
/// The PDF header may be preceded by junk, but only within the first KiB.
const PDF_HEADER_WINDOW: usize = 1024;

/// Result of one policy or a whole chain.
#[derive(Debug)]
pub enum Outcome {
    Success(String),
    Empty,
    Failed(ExtractError),
}

#[async_trait]
pub trait Policy: Send + Sync {
    fn name(&self) -> &'static str;
    async fn apply(&self, path: &Path) -> Outcome;
}

/// An ordered fallback list.
pub struct Chain {
    policies: Vec<Box<dyn Policy>>,
}

impl Chain {
    pub fn new(policies: Vec<Box<dyn Policy>>) -> Self {
        Self { policies }
    }

    /// First success wins; otherwise the last non-success outcome. A failure
    /// the rest of the chain cannot recover from stops the chain early.
    pub async fn run(&self, path: &Path) -> Outcome {
        let mut last = Outcome::Empty;
        for policy in &self.policies {
            let outcome = policy.apply(path).await;
            match outcome {
                Outcome::Success(_) => return outcome,
                Outcome::Failed(ref e) if stops_chain(e) => {
                    debug!(policy = policy.name(), error = %e, "chain stopped");
                    return outcome;
                }
                Outcome::Failed(ref e) => {
                    debug!(policy = policy.name(), error = %e, "policy failed, falling back");
                }
                Outcome::Empty => {
                    debug!(policy = policy.name(), "policy produced no text, falling back");
                }
            }
            last = outcome;
        }
        last
    }
}

fn stops_chain(err: &ExtractError) -> bool {
    matches!(err, ExtractError::Io(_) | ExtractError::NotPdf)
}

pub struct Extractor {
    plain: Chain,
    word: Chain,
    pdf: Chain,
    image: Chain,
}

impl Extractor {
    /// Builds the production chains: tesseract for OCR, pdftoppm for page
    /// rendering and the configured `.doc` converter, if any.
    pub fn from_config(config: &Config) -> Self {
        let ocr = TesseractOcr::from_config(&config.ocr).map(|o| Arc::new(o) as Arc<dyn OcrEngine>);
        let renderer: Arc<dyn PageRenderer> = Arc::new(Pdftoppm::from_config(&config.ocr));
        let converter = ExternalConverter::from_config(&config.converter);
        Self::new(ocr, renderer, converter, config.ocr.target_width)
    }

    pub fn new(
        ocr: Option<Arc<dyn OcrEngine>>,
        renderer: Arc<dyn PageRenderer>,
        converter: Option<ExternalConverter>,
        target_width: u32,
    ) -> Self {
        let mut word: Vec<Box<dyn Policy>> = vec![Box::new(OfficeXml)];
        if let Some(c) = converter {
            word.push(Box::new(c));
        }

        Self {
            plain: Chain::new(vec![Box::new(RawText)]),
            word: Chain::new(word),
            pdf: Chain::new(vec![
                Box::new(PdfTextLayer),
                Box::new(PdfRasterOcr {
                    ocr: ocr.clone(),
                    renderer,
                    target_width,
                }),
            ]),
            image: Chain::new(vec![Box::new(ImageOcr { ocr })]),
        }
    }

    pub async fn extract(&self, path: &Path, file_type: FileType) -> Outcome {
        let chain = match file_type {
            FileType::PlainText => &self.plain,
            FileType::WordProcessor => &self.word,
            FileType::Pdf => &self.pdf,
            FileType::Image => &self.image,
        };
        chain.run(path).await
    }
}

// ============ Plain text ============

struct RawText;

#[async_trait]
impl Policy for RawText {
    fn name(&self) -> &'static str {
        "raw-text"
    }

    async fn apply(&self, path: &Path) -> Outcome {
        match tokio::fs::read(path).await {
            Ok(bytes) => Outcome::Success(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) => Outcome::Failed(e.into()),
        }
    }
}

// ============ PDF ============

pub fn has_pdf_header(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(PDF_HEADER_WINDOW)];
    window.windows(4).any(|w| w == b"%PDF")
}

struct PdfTextLayer;

#[async_trait]
impl Policy for PdfTextLayer {
    fn name(&self) -> &'static str {
        "pdf-text-layer"
    }

    async fn apply(&self, path: &Path) -> Outcome {
        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(e) => return Outcome::Failed(e.into()),
        };
        if !has_pdf_header(&bytes) {
            return Outcome::Failed(ExtractError::NotPdf);
        }

        // pdf-extract can panic on malformed input; a panic here must still
        // fall through to the raster policy.
        let joined =
            tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes)).await;

        match joined {
            Ok(Ok(text)) if text.trim().is_empty() => Outcome::Empty,
            Ok(Ok(text)) => Outcome::Success(text),
            Ok(Err(e)) => Outcome::Failed(ExtractError::Pdf(e.to_string())),
            Err(e) => Outcome::Failed(ExtractError::Pdf(format!("decoder panicked: {}", e))),
        }
    }
}

struct PdfRasterOcr {
    ocr: Option<Arc<dyn OcrEngine>>,
    renderer: Arc<dyn PageRenderer>,
    target_width: u32,
}

impl PdfRasterOcr {
    async fn rasterize_and_recognize(
        &self,
        ocr: &dyn OcrEngine,
        path: &Path,
    ) -> Result<String, ExtractError> {
        let work = TempDir::new()?;
        let pages_dir = work.path().join("pages");
        tokio::fs::create_dir(&pages_dir).await?;

        let pages = self.renderer.render(path, &pages_dir).await?;
        if pages.is_empty() {
            return Err(ExtractError::NoPagesRendered);
        }
        debug!(pdf = %path.display(), pages = pages.len(), "composing pages for OCR");

        let composite = work.path().join("composite.png");
        let dest = composite.clone();
        let target_width = self.target_width;
        tokio::task::spawn_blocking(move || raster::write_composite(&pages, target_width, &dest))
            .await
            .map_err(|e| ExtractError::Image(e.to_string()))??;

        ocr.recognize(&composite).await
    }
}

#[async_trait]
impl Policy for PdfRasterOcr {
    fn name(&self) -> &'static str {
        "pdf-raster-ocr"
    }

    async fn apply(&self, path: &Path) -> Outcome {
        let Some(ocr) = &self.ocr else {
            debug!(pdf = %path.display(), "OCR disabled, registering without text");
            return Outcome::Success(String::new());
        };
        match self.rasterize_and_recognize(ocr.as_ref(), path).await {
            Ok(text) => Outcome::Success(text),
            Err(e) => Outcome::Failed(e),
        }
    }
}

// ============ Images ============

struct ImageOcr {
    ocr: Option<Arc<dyn OcrEngine>>,
}

#[async_trait]
impl Policy for ImageOcr {
    fn name(&self) -> &'static str {
        "image-ocr"
    }

    async fn apply(&self, path: &Path) -> Outcome {
        let Some(ocr) = &self.ocr else {
            debug!(image = %path.display(), "OCR disabled, registering without text");
            return Outcome::Success(String::new());
        };
        match ocr.recognize(path).await {
            Ok(text) => Outcome::Success(text),
            Err(e) => Outcome::Failed(e),
        }
    }
}

// ============ Word processors ============

/// Built-in reader for `.docx` (OOXML) and `.odf` (OpenDocument) archives.
struct OfficeXml;

#[async_trait]
impl Policy for OfficeXml {
    fn name(&self) -> &'static str {
        "office-xml"
    }

    async fn apply(&self, path: &Path) -> Outcome {
        let ext = extension_of(path);
        let entry = match ext.as_str() {
            "docx" => "word/document.xml",
            "odf" => "content.xml",
            other => return Outcome::Failed(ExtractError::NoConverter(other.to_string())),
        };
        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(e) => return Outcome::Failed(e.into()),
        };
        match extract_office_text(&bytes, entry) {
            Ok(text) if text.trim().is_empty() => Outcome::Empty,
            Ok(text) => Outcome::Success(text),
            Err(e) => Outcome::Failed(e),
        }
    }
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Office(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Office(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Office(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

/// Reads one XML entry from an office archive and returns its text runs,
/// one line per paragraph.
pub fn extract_office_text(bytes: &[u8], entry: &str) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Office(e.to_string()))?;
    let xml = read_zip_entry_bounded(&mut archive, entry, MAX_XML_ENTRY_BYTES)?;
    paragraph_text(&xml)
}

/// OOXML keeps text in `w:t` runs inside `w:p`; OpenDocument keeps it
/// directly in `text:p` / `text:h`. Both end paragraphs on a `p` element.
fn paragraph_text(xml: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut depth_in_text = 0usize;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if matches!(e.local_name().as_ref(), b"t" | b"p" | b"h" | b"span") {
                    depth_in_text += 1;
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"p" | b"h" => {
                    depth_in_text = depth_in_text.saturating_sub(1);
                    if !out.is_empty() && !out.ends_with('\n') {
                        out.push('\n');
                    }
                }
                b"t" | b"span" => depth_in_text = depth_in_text.saturating_sub(1),
                _ => {}
            },
            Ok(Event::Text(te)) if depth_in_text > 0 => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Office(e.to_string()))?;
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Office(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}

/// Runs an external command that prints a document's text on stdout.
pub struct ExternalConverter {
    program: PathBuf,
    args: Vec<String>,
    timeout_secs: u64,
}

impl ExternalConverter {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            program: program.into(),
            args,
            timeout_secs,
        }
    }

    pub fn from_config(config: &ConverterConfig) -> Option<Self> {
        config.is_enabled().then(|| {
            Self::new(
                config.command.trim(),
                config.args.clone(),
                config.timeout_secs,
            )
        })
    }
}

#[async_trait]
impl Policy for ExternalConverter {
    fn name(&self) -> &'static str {
        "external-converter"
    }

    async fn apply(&self, path: &Path) -> Outcome {
        let program = self.program.to_string_lossy().to_string();
        let output = match run_with_timeout(
            Command::new(&self.program).args(&self.args).arg(path),
            &program,
            self.timeout_secs,
        )
        .await
        {
            Ok(o) => o,
            Err(e) => return Outcome::Failed(e),
        };

        if !output.status.success() {
            return Outcome::Failed(ExtractError::Converter(failure_message(&output)));
        }
        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        if text.trim().is_empty() {
            Outcome::Empty
        } else {
            Outcome::Success(text)
        }
    }
}
