//! PDF rasterisation: render every page of an upload to PNG via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! `tokio::task::spawn_blocking` moves the work onto a dedicated thread pool
//! thread designed for blocking operations, preventing the Tokio worker
//! threads from stalling during CPU-heavy rendering.
//!
//! ## Why cap pixels as well as DPI?
//!
//! 300 DPI keeps stamps and signatures legible on A4, but bills of lading and
//! certificates are sometimes A3 or larger. `max_rendered_pixels` caps the
//! longest edge regardless of physical size, keeping memory bounded.

use crate::backend::Attachment;
use crate::config::VerifyConfig;
use crate::error::VerifyError;
use crate::input::InputFile;
use crate::pipeline::encode;
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Turns one PDF upload into page images, in page order.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    async fn rasterize(&self, file: &InputFile) -> Result<Vec<Attachment>, VerifyError>;
}

/// Name of the `n`th (1-based) page image of `filename`.
pub fn page_filename(filename: &str, n: usize) -> String {
    format!("{}_page_{}.png", filename, n)
}

/// pdfium-backed [`Rasterizer`].
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    dpi: u32,
    max_pixels: u32,
    library_dir: Option<PathBuf>,
}

impl PdfiumRasterizer {
    pub fn new(config: &VerifyConfig) -> Self {
        Self {
            dpi: config.dpi,
            max_pixels: config.max_rendered_pixels,
            library_dir: config.pdfium_library_dir.clone(),
        }
    }

    /// Check that the pdfium library can be bound, without rendering.
    pub fn probe(&self) -> Result<(), VerifyError> {
        bind_pdfium(self.library_dir.as_deref(), "<probe>").map(|_| ())
    }
}

#[async_trait]
impl Rasterizer for PdfiumRasterizer {
    async fn rasterize(&self, file: &InputFile) -> Result<Vec<Attachment>, VerifyError> {
        let filename = file.filename.clone();
        let data = file.data.clone();
        let this = self.clone();

        tokio::task::spawn_blocking(move || this.rasterize_blocking(&filename, &data))
            .await
            .map_err(|e| VerifyError::Internal(format!("Render task panicked: {}", e)))?
    }
}

impl PdfiumRasterizer {
    fn rasterize_blocking(&self, filename: &str, data: &[u8]) -> Result<Vec<Attachment>, VerifyError> {
        let fail = |detail: String| VerifyError::Rasterization {
            filename: filename.to_string(),
            detail,
        };

        // pdfium opens by path; the temp file is removed when `tmp` is closed.
        let mut tmp = tempfile::Builder::new()
            .prefix("tradedoc-")
            .suffix(".pdf")
            .tempfile()
            .map_err(|e| VerifyError::Io(format!("tempfile: {}", e)))?;
        tmp.write_all(data)
            .map_err(|e| VerifyError::Io(format!("tempfile write: {}", e)))?;

        let result = self.render_file(tmp.path(), filename, fail);

        if let Err(e) = tmp.close() {
            warn!("Failed to remove temp file for '{}': {}", filename, e);
        }
        result
    }

    fn render_file(
        &self,
        path: &Path,
        filename: &str,
        fail: impl Fn(String) -> VerifyError,
    ) -> Result<Vec<Attachment>, VerifyError> {
        let pdfium = bind_pdfium(self.library_dir.as_deref(), filename)?;

        let document = pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| fail(format!("{:?}", e)))?;

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        if total_pages == 0 {
            return Err(fail("document has no pages".into()));
        }
        info!("'{}' loaded: {} pages", filename, total_pages);

        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(self.dpi as f32 / 72.0)
            .set_maximum_width(self.max_pixels as i32)
            .set_maximum_height(self.max_pixels as i32);

        let mut results = Vec::with_capacity(total_pages);
        for (idx, page) in pages.iter().enumerate() {
            let bitmap = page
                .render_with_config(&render_config)
                .map_err(|e| fail(format!("page {}: {:?}", idx + 1, e)))?;

            let image = bitmap.as_image();
            debug!(
                "Rendered '{}' page {} → {}x{} px",
                filename,
                idx + 1,
                image.width(),
                image.height()
            );

            let png = encode::encode_png(&image)
                .map_err(|e| fail(format!("page {}: PNG encoding failed: {}", idx + 1, e)))?;
            results.push(Attachment::new(
                page_filename(filename, idx + 1),
                "image/png",
                png,
            ));
        }

        Ok(results)
    }
}

/// Bind pdfium from `dir` if given, otherwise from the system library path.
fn bind_pdfium(dir: Option<&Path>, filename: &str) -> Result<Pdfium, VerifyError> {
    let bindings = match dir {
        Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| VerifyError::Rasterization {
        filename: filename.to_string(),
        detail: format!(
            "pdfium library not available ({:?}); set PDFIUM_LIB_PATH or install libpdfium",
            e
        ),
    })?;
    Ok(Pdfium::new(bindings))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_names_follow_upload() {
        assert_eq!(page_filename("invoice.pdf", 1), "invoice.pdf_page_1.png");
        assert_eq!(page_filename("bl.pdf", 12), "bl.pdf_page_12.png");
    }

    #[test]
    fn rasterizer_takes_config() {
        let config = VerifyConfig::builder()
            .dpi(150)
            .max_rendered_pixels(1200)
            .pdfium_library_dir("/opt/pdfium")
            .build()
            .unwrap();
        let r = PdfiumRasterizer::new(&config);
        assert_eq!(r.dpi, 150);
        assert_eq!(r.max_pixels, 1200);
        assert_eq!(r.library_dir.as_deref(), Some(Path::new("/opt/pdfium")));
    }

    #[tokio::test]
    async fn missing_library_is_rasterization_error() {
        let config = VerifyConfig::builder()
            .pdfium_library_dir("/definitely/not/a/pdfium/dir")
            .build()
            .unwrap();
        let r = PdfiumRasterizer::new(&config);
        let file = InputFile::new("a.pdf", Some("application/pdf".into()), b"%PDF-1.7".to_vec());
        let err = r.rasterize(&file).await.unwrap_err();
        assert_eq!(err.code(), "rasterization_error");
    }
}
