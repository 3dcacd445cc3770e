//! PDF page rasterization and composite image preparation for OCR.
//!
//! Pages are rendered to PNG by an external renderer, stacked vertically into
//! one tall image, scaled to a fixed width and lightly sharpened.

use async_trait::async_trait;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::command::{failure_message, run_with_timeout};
use crate::config::OcrConfig;
use crate::error::ExtractError;

const SHARPEN_SIGMA: f32 = 1.0;
const SHARPEN_THRESHOLD: i32 = 0;

#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Renders every page of `pdf` into `out_dir` and returns the image paths
    /// in page order.
    async fn render(&self, pdf: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, ExtractError>;
}

pub struct Pdftoppm {
    program: String,
    dpi: u32,
    timeout_secs: u64,
}

impl Pdftoppm {
    pub fn from_config(config: &OcrConfig) -> Self {
        Self {
            program: config.pdftoppm_path.clone(),
            dpi: config.render_dpi,
            timeout_secs: config.timeout_secs,
        }
    }
}

#[async_trait]
impl PageRenderer for Pdftoppm {
    async fn render(&self, pdf: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
        let prefix = out_dir.join("page");
        debug!(pdf = %pdf.display(), dpi = self.dpi, "rendering PDF pages");

        let output = run_with_timeout(
            Command::new(&self.program)
                .arg("-png")
                .arg("-r")
                .arg(self.dpi.to_string())
                .arg(pdf)
                .arg(&prefix),
            &self.program,
            self.timeout_secs,
        )
        .await?;

        if !output.status.success() {
            return Err(ExtractError::Render(failure_message(&output)));
        }

        let mut pages = Vec::new();
        let mut entries = tokio::fs::read_dir(out_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("png") {
                pages.push(path);
            }
        }
        // pdftoppm zero-pads page numbers, so name order is page order
        pages.sort();
        Ok(pages)
    }
}

/// Loads the rendered pages and stacks them top to bottom on a white canvas
/// as wide as the widest page. Pages that fail to decode are skipped.
pub fn stack_pages(pages: &[PathBuf]) -> Result<RgbImage, ExtractError> {
    let mut decoded = Vec::with_capacity(pages.len());
    for page in pages {
        match image::open(page) {
            Ok(img) => decoded.push(img.to_rgb8()),
            Err(e) => warn!(page = %page.display(), error = %e, "skipping unreadable page"),
        }
    }
    if decoded.is_empty() {
        return Err(ExtractError::NoPagesRendered);
    }

    let width = decoded.iter().map(|p| p.width()).max().unwrap_or(0);
    let height = decoded
        .iter()
        .try_fold(0u32, |acc, p| acc.checked_add(p.height()))
        .ok_or_else(|| ExtractError::Image("composite image too tall".to_string()))?;

    let mut canvas = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
    let mut y: i64 = 0;
    for page in &decoded {
        imageops::overlay(&mut canvas, page, 0, y);
        y += i64::from(page.height());
    }
    Ok(canvas)
}

/// Scales to `target_width` keeping the aspect ratio, then sharpens.
pub fn prepare_for_ocr(image: RgbImage, target_width: u32) -> DynamicImage {
    let (w, h) = image.dimensions();
    let target_height = ((u64::from(h) * u64::from(target_width)) / u64::from(w.max(1)))
        .clamp(1, u64::from(u32::MAX)) as u32;
    DynamicImage::ImageRgb8(image)
        .resize_exact(target_width, target_height, FilterType::Lanczos3)
        .unsharpen(SHARPEN_SIGMA, SHARPEN_THRESHOLD)
}

/// Builds the OCR-ready composite from rendered pages and writes it as PNG.
pub fn write_composite(
    pages: &[PathBuf],
    target_width: u32,
    dest: &Path,
) -> Result<(), ExtractError> {
    let stacked = stack_pages(pages)?;
    let prepared = prepare_for_ocr(stacked, target_width);
    prepared
        .save_with_format(dest, image::ImageFormat::Png)
        .map_err(|e| ExtractError::Image(e.to_string()))
}
