//! Image encoding: page raster → base64 PNG wrapped in `ImageData`.
//!
//! PNG is lossless: JPEG artefacts around rendered glyphs shift the boxes the
//! vision model reports and blur thin coloured strokes, which costs colour
//! accuracy in the runs. `detail: "high"` asks GPT-4-class models for the
//! full tile budget so small type is still legible.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::{ImageFormat, RgbImage};
use std::io::Cursor;
use tracing::debug;

/// PNG-encode a page raster.
pub fn png_bytes(img: &RgbImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}

/// Encode a rasterised page as a base64 PNG ready for the vision API.
pub fn encode_page(img: &RgbImage) -> Result<ImageData, image::ImageError> {
    let b64 = STANDARD.encode(png_bytes(img)?);
    debug!(
        "Encoded {}x{} page → {} bytes base64",
        img.width(),
        img.height(),
        b64.len()
    );
    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}
