use std::io::Cursor;

use image::{DynamicImage, ImageFormat};

use crate::error::ProcessError;
use crate::processor::Bitmap;

/// Decodes a raster upload into its single page bitmap.
pub fn decode_raster(bytes: &[u8], format: ImageFormat) -> Result<Bitmap, ProcessError> {
    let _span = tracing::debug_span!("processor.raster", format = ?format).entered();

    image::load_from_memory_with_format(bytes, format)
        .map(|img| img.to_rgb8())
        .map_err(|e| ProcessError::ImageProcessing(format!("Failed to decode image: {}", e)))
}

/// Decodes an encoded image (PNG, JPEG, ...) of unknown format.
pub fn decode_any(bytes: &[u8]) -> Result<Bitmap, ProcessError> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgb8())
        .map_err(|e| ProcessError::ImageProcessing(format!("Failed to decode image: {}", e)))
}

pub fn encode_png(bitmap: &Bitmap) -> Result<Vec<u8>, ProcessError> {
    let mut png_data = Vec::new();
    DynamicImage::ImageRgb8(bitmap.clone())
        .write_to(&mut Cursor::new(&mut png_data), ImageFormat::Png)
        .map_err(|e| ProcessError::ImageProcessing(format!("Failed to encode PNG: {}", e)))?;
    Ok(png_data)
}
