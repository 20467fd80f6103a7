//! Leaf document processing: format detection, PDF inspection, raster
//! decoding, page rendering and OCR.

pub mod image;
pub mod image_filter;
pub mod ocr;
pub mod pdf;
pub mod render;

use std::path::Path;

use crate::error::ProcessError;

/// Every bitmap handed between stages is normalized to 8-bit RGB.
pub type Bitmap = ::image::RgbImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Raster(::image::ImageFormat),
}

impl DocumentKind {
    pub fn is_pdf(&self) -> bool {
        matches!(self, DocumentKind::Pdf)
    }
}

/// A fetched document held in memory.
#[derive(Debug, Clone)]
pub struct Document {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub kind: DocumentKind,
}

impl Document {
    pub fn from_bytes(filename: &str, bytes: Vec<u8>) -> Result<Self, ProcessError> {
        let kind = detect_kind(filename, &bytes)?;
        Ok(Self {
            filename: filename.to_string(),
            bytes,
            kind,
        })
    }

    pub fn open(path: &Path) -> Result<Self, ProcessError> {
        let bytes = std::fs::read(path).map_err(|e| ProcessError::ReadDocument {
            path: path.to_path_buf(),
            source: e,
        })?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document")
            .to_string();
        Self::from_bytes(&filename, bytes)
    }
}

/// Sniffs magic bytes first, then falls back to the file extension.
pub fn detect_kind(filename: &str, bytes: &[u8]) -> Result<DocumentKind, ProcessError> {
    if bytes.starts_with(b"%PDF") {
        return Ok(DocumentKind::Pdf);
    }
    if let Ok(format) = ::image::guess_format(bytes) {
        return Ok(DocumentKind::Raster(format));
    }

    let mime = mime_guess::from_path(filename).first();
    match mime {
        Some(m) if m.essence_str() == "application/pdf" => Ok(DocumentKind::Pdf),
        Some(m) if m.type_() == mime_guess::mime::IMAGE => {
            ::image::ImageFormat::from_mime_type(m.essence_str())
                .map(DocumentKind::Raster)
                .ok_or_else(|| ProcessError::UnsupportedFormat(m.essence_str().to_string()))
        }
        Some(m) => Err(ProcessError::UnsupportedFormat(m.essence_str().to_string())),
        None => Err(ProcessError::UnsupportedFormat(filename.to_string())),
    }
}
