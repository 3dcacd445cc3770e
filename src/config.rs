use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub ingress: IngressConfig,
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub converter: ConverterConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// The watched drop-off directory and what happens to files after ingestion.
#[derive(Debug, Deserialize, Clone)]
pub struct IngressConfig {
    pub root: PathBuf,
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    /// Mirror the ingress-relative path under the document root instead of
    /// flattening into `documents.new_document_folder`.
    #[serde(default)]
    pub preserve_structure: bool,
    #[serde(default = "default_true")]
    pub delete_on_process: bool,
    /// Destination for ingress originals when `delete_on_process` is off.
    #[serde(default)]
    pub processed_folder: Option<PathBuf>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

fn default_interval_minutes() -> u64 {
    10
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    pub root: PathBuf,
    #[serde(default = "default_new_document_folder")]
    pub new_document_folder: String,
}

fn default_new_document_folder() -> String {
    "New".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct OcrConfig {
    /// Path to the tesseract executable. Empty disables OCR.
    #[serde(default)]
    pub tesseract_path: String,
    #[serde(default = "default_pdftoppm_path")]
    pub pdftoppm_path: String,
    #[serde(default = "default_render_dpi")]
    pub render_dpi: u32,
    #[serde(default = "default_target_width")]
    pub target_width: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract_path: String::new(),
            pdftoppm_path: default_pdftoppm_path(),
            render_dpi: default_render_dpi(),
            target_width: default_target_width(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl OcrConfig {
    pub fn is_enabled(&self) -> bool {
        !self.tesseract_path.trim().is_empty()
    }
}

fn default_pdftoppm_path() -> String {
    "pdftoppm".to_string()
}
fn default_render_dpi() -> u32 {
    150
}
fn default_target_width() -> u32 {
    1024
}
fn default_timeout_secs() -> u64 {
    120
}

/// External command used for legacy `.doc` files. It receives the file path
/// as its last argument and must print plain text on stdout.
#[derive(Debug, Deserialize, Clone)]
pub struct ConverterConfig {
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            args: Vec::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ConverterConfig {
    pub fn is_enabled(&self) -> bool {
        !self.command.trim().is_empty()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.ingress.interval_minutes == 0 {
        anyhow::bail!("ingress.interval_minutes must be >= 1");
    }

    if config.ocr.target_width == 0 {
        anyhow::bail!("ocr.target_width must be > 0");
    }
    if config.ocr.render_dpi == 0 {
        anyhow::bail!("ocr.render_dpi must be > 0");
    }

    if config.ingress.root == config.documents.root {
        anyhow::bail!("ingress.root and documents.root must be different directories");
    }

    if config.documents.new_document_folder.contains("..") {
        anyhow::bail!("documents.new_document_folder must not contain '..'");
    }

    match (&config.ingress.processed_folder, config.ingress.delete_on_process) {
        (None, false) => {
            anyhow::bail!("ingress.processed_folder must be set when delete_on_process = false")
        }
        (Some(folder), _) if folder.starts_with(&config.documents.root) => {
            anyhow::bail!(
                "ingress.processed_folder must not be inside documents.root: {}",
                folder.display()
            )
        }
        _ => {}
    }

    Ok(())
}
