//! Turning validated uploads into backend attachments.
//!
//! ```text
//! InputFileSet ──▶ render (PDF pages, pdfium) ──▶ encode (PNG) ──▶ Vec<Attachment>
//!              └─▶ image uploads pass through untouched ─────────────┘
//! ```
//!
//! 1. [`render`] rasterises PDFs behind the [`render::Rasterizer`] trait;
//!    runs in `spawn_blocking` because pdfium is not async-safe
//! 2. [`encode`] PNG-encodes rendered pages and base64-wraps attachments for
//!    multimodal API request bodies

pub mod encode;
pub mod render;

use crate::backend::{Attachment, PayloadKind};
use crate::error::VerifyError;
use crate::input::{DocumentKind, InputFileSet};
use render::Rasterizer;
use tracing::debug;

/// Build the attachment list a backend of `kind` expects, preserving upload
/// order and, within a PDF, page order.
pub async fn prepare_attachments(
    files: &InputFileSet,
    kind: PayloadKind,
    rasterizer: &dyn Rasterizer,
) -> Result<Vec<Attachment>, VerifyError> {
    let mut attachments = Vec::new();
    for (file, doc_kind) in files.iter() {
        match (kind, doc_kind) {
            (PayloadKind::PageImages, DocumentKind::Pdf) => {
                let pages = rasterizer.rasterize(file).await?;
                debug!("'{}' → {} page image(s)", file.filename, pages.len());
                attachments.extend(pages);
            }
            _ => attachments.push(Attachment::new(
                file.filename.clone(),
                doc_kind.mime_type(),
                file.data.clone(),
            )),
        }
    }
    Ok(attachments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::InputFile;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TwoPages {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Rasterizer for TwoPages {
        async fn rasterize(&self, file: &InputFile) -> Result<Vec<Attachment>, VerifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((1..=2)
                .map(|n| Attachment::new(render::page_filename(&file.filename, n), "image/png", vec![n as u8]))
                .collect())
        }
    }

    fn files() -> InputFileSet {
        InputFileSet::new(vec![
            InputFile::new("lc.pdf", Some("application/pdf".into()), b"%PDF-lc".to_vec()),
            InputFile::new("stamp.jpg", Some("image/jpeg".into()), vec![0xFF, 0xD8, 0xFF, 1]),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn page_images_rasterize_pdfs_only() {
        let r = TwoPages {
            calls: AtomicUsize::new(0),
        };
        let out = prepare_attachments(&files(), PayloadKind::PageImages, &r)
            .await
            .unwrap();
        let names: Vec<_> = out.iter().map(|a| a.filename.as_str()).collect();
        assert_eq!(names, ["lc.pdf_page_1.png", "lc.pdf_page_2.png", "stamp.jpg"]);
        assert_eq!(out[2].mime_type, "image/jpeg");
        assert_eq!(r.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn original_files_skip_rasterizer() {
        let r = TwoPages {
            calls: AtomicUsize::new(0),
        };
        let out = prepare_attachments(&files(), PayloadKind::OriginalFiles, &r)
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].mime_type, "application/pdf");
        assert_eq!(out[0].data, b"%PDF-lc");
        assert_eq!(r.calls.load(Ordering::SeqCst), 0);
    }
}
