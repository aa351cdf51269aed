//! Image encoding: `DynamicImage` → PNG bytes, bytes → provider `ImageData`.
//!
//! PNG is chosen over JPEG because it is lossless: stamp outlines, faint
//! signatures and small print on scanned trade documents are exactly what the
//! model is asked to spot, and JPEG artefacts blur them.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rendered page as PNG.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!(
        "Encoded {}x{} page → {} bytes PNG",
        img.width(),
        img.height(),
        buf.len()
    );
    Ok(buf)
}

/// Wrap image bytes as base64 `ImageData` for a vision request.
///
/// `detail: "high"` asks GPT-4-class models for the full tile budget; without
/// it fine print and small tables are lost.
pub fn image_data(mime_type: &str, bytes: &[u8]) -> ImageData {
    let b64 = STANDARD.encode(bytes);
    ImageData::new(b64, mime_type).with_detail("high")
}
