//! PDF access via pdfium: direct text extraction and page rasterisation.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which is neither async-aware
//! nor cheap. Both operations run on tokio's blocking pool so the runtime's
//! worker thread never stalls inside FFI.
//!
//! Each call binds a fresh `Pdfium` instance. The OS caches the dynamic
//! library after the first load, so repeat binds cost next to nothing, and
//! the backend itself stays a plain `Send + Sync` value.

use crate::error::{ExtractionError, MrtpError, OcrError};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// PDF points per inch.
const POINTS_PER_INCH: f32 = 72.0;

/// Text and image access to a PDF file.
pub trait PdfBackend: Send + Sync {
    /// Concatenated text layer of every page, pages separated by `\n`.
    fn extract_text(
        &self,
        pdf: &Path,
    ) -> impl Future<Output = Result<String, ExtractionError>> + Send;

    /// One rendered image per page, in page order.
    fn render_pages(
        &self,
        pdf: &Path,
    ) -> impl Future<Output = Result<Vec<DynamicImage>, OcrError>> + Send;
}

/// [`PdfBackend`] backed by the pdfium shared library.
#[derive(Debug, Clone)]
pub struct PdfiumBackend {
    dpi: u32,
    max_pixels: u32,
}

impl PdfiumBackend {
    /// Create a backend, verifying the pdfium library can be bound.
    pub fn new(dpi: u32, max_pixels: u32) -> Result<Self, MrtpError> {
        bind_pdfium().map_err(MrtpError::PdfiumBindingFailed)?;
        Ok(Self { dpi, max_pixels })
    }
}

impl PdfBackend for PdfiumBackend {
    async fn extract_text(&self, pdf: &Path) -> Result<String, ExtractionError> {
        let path = pdf.to_path_buf();
        tokio::task::spawn_blocking(move || extract_text_blocking(&path))
            .await
            .map_err(|e| ExtractionError::Internal(format!("text task panicked: {e}")))?
    }

    async fn render_pages(&self, pdf: &Path) -> Result<Vec<DynamicImage>, OcrError> {
        let path = pdf.to_path_buf();
        let (dpi, max_pixels) = (self.dpi, self.max_pixels);
        tokio::task::spawn_blocking(move || render_pages_blocking(&path, dpi, max_pixels))
            .await
            .map_err(|e| OcrError::Internal(format!("render task panicked: {e}")))?
    }
}

/// Bind pdfium: `PDFIUM_DYNAMIC_LIB_PATH`, then next to the executable,
/// then the system library path.
fn bind_pdfium() -> Result<Pdfium, String> {
    if let Ok(path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        debug!(path = %path, "Loading pdfium from env var");
        let bindings = Pdfium::bind_to_library(&path)
            .map_err(|e| format!("cannot load pdfium from {path}: {e}"))?;
        return Ok(Pdfium::new(bindings));
    }

    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(PathBuf::from))
    {
        let lib_path =
            Pdfium::pdfium_platform_library_name_at_path(exe_dir.to_string_lossy().as_ref());
        if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
            debug!(dir = %exe_dir.display(), "Loaded pdfium next to executable");
            return Ok(Pdfium::new(bindings));
        }
    }

    let bindings = Pdfium::bind_to_system_library().map_err(|e| format!("{e}"))?;
    Ok(Pdfium::new(bindings))
}

fn extract_text_blocking(pdf: &Path) -> Result<String, ExtractionError> {
    let pdfium = bind_pdfium().map_err(ExtractionError::Internal)?;
    let document =
        pdfium
            .load_pdf_from_file(pdf, None)
            .map_err(|e| ExtractionError::OpenFailed {
                path: pdf.to_path_buf(),
                detail: format!("{e:?}"),
            })?;

    let mut texts = Vec::new();
    for (idx, page) in document.pages().iter().enumerate() {
        let text = page.text().map_err(|e| ExtractionError::PageText {
            page: idx + 1,
            detail: format!("{e:?}"),
        })?;
        texts.push(text.all());
    }

    debug!("Read text layer of {} page(s)", texts.len());
    Ok(texts.join("\n"))
}

fn render_pages_blocking(
    pdf: &Path,
    dpi: u32,
    max_pixels: u32,
) -> Result<Vec<DynamicImage>, OcrError> {
    let pdfium = bind_pdfium().map_err(OcrError::Internal)?;
    let document = pdfium
        .load_pdf_from_file(pdf, None)
        .map_err(|e| OcrError::RenderFailed {
            page: 0,
            detail: format!("{e:?}"),
        })?;

    let pages = document.pages();
    info!("Rasterising {} page(s) at {} DPI", pages.len(), dpi);

    let mut images = Vec::with_capacity(pages.len() as usize);
    for (idx, page) in pages.iter().enumerate() {
        let (width, height) =
            render_dimensions(page.width().value, page.height().value, dpi, max_pixels);
        if width == max_pixels || height == max_pixels {
            warn!(page = idx + 1, "Page dimensions capped to {max_pixels}px");
        }

        let config = PdfRenderConfig::new()
            .set_target_width(width as i32)
            .set_maximum_height(height as i32);

        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| OcrError::RenderFailed {
                page: idx + 1,
                detail: format!("{e:?}"),
            })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );
        images.push(image);
    }

    Ok(images)
}

/// Pixel size for a page at `dpi`, longest edge capped at `max_pixels`,
/// aspect ratio preserved.
fn render_dimensions(width_pt: f32, height_pt: f32, dpi: u32, max_pixels: u32) -> (u32, u32) {
    let scale = dpi as f32 / POINTS_PER_INCH;
    let w = (width_pt * scale).max(1.0);
    let h = (height_pt * scale).max(1.0);

    let longest = w.max(h);
    if longest > max_pixels as f32 {
        let ratio = max_pixels as f32 / longest;
        (
            ((w * ratio).round() as u32).clamp(1, max_pixels),
            ((h * ratio).round() as u32).clamp(1, max_pixels),
        )
    } else {
        (w.round() as u32, h.round() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_at_300_dpi() {
        // A4 = 595 x 842 pt
        let (w, h) = render_dimensions(595.0, 842.0, 300, 4096);
        assert_eq!((w, h), (2479, 3508));
    }

    #[test]
    fn longest_edge_is_capped() {
        let (w, h) = render_dimensions(595.0, 842.0, 600, 4096);
        assert_eq!(h, 4096);
        assert!(w < 4096);
        // aspect ratio roughly preserved
        let ratio = w as f32 / h as f32;
        assert!((ratio - 595.0 / 842.0).abs() < 0.01);
    }

    #[test]
    fn degenerate_page_is_at_least_one_pixel() {
        assert_eq!(render_dimensions(0.0, 0.0, 300, 4096), (1, 1));
    }
}
