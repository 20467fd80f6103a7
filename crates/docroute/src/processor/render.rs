use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::ProcessError;
use crate::processor::{Bitmap, Document, DocumentKind};

/// Rasterizes every page of a document, in page order.
pub trait PageRenderer: Send + Sync {
    fn render_pages(&self, document: &Document, dpi: u32) -> Result<Vec<Bitmap>, ProcessError>;
}

/// Renders PDF pages through poppler's `pdftoppm`.
///
/// PDF user space is 72 units per inch, so `-r <dpi>` is the `dpi / 72`
/// zoom over native size. Raster documents are returned as-is.
pub struct PdftoppmRenderer {
    binary: String,
    scratch_dir: Option<PathBuf>,
}

impl PdftoppmRenderer {
    pub fn new(binary: &str, scratch_dir: Option<PathBuf>) -> Self {
        Self {
            binary: binary.to_string(),
            scratch_dir,
        }
    }

    fn render_pdf(&self, pdf_bytes: &[u8], dpi: u32) -> Result<Vec<Bitmap>, ProcessError> {
        let builder = {
            let mut b = tempfile::Builder::new();
            b.prefix("docroute-render-");
            b
        };
        let temp_dir = match self.scratch_dir {
            Some(ref dir) => builder.tempdir_in(dir),
            None => builder.tempdir(),
        }
        .map_err(|e| ProcessError::Render(format!("Failed to create temp dir: {}", e)))?;

        let pdf_path = temp_dir.path().join("input.pdf");
        std::fs::write(&pdf_path, pdf_bytes)
            .map_err(|e| ProcessError::Render(format!("Failed to write temp PDF: {}", e)))?;

        let output_prefix = temp_dir.path().join("page");
        let output = Command::new(&self.binary)
            .args(["-png", "-r", &dpi.to_string()])
            .arg(&pdf_path)
            .arg(&output_prefix)
            .output()
            .map_err(|e| {
                ProcessError::Render(format!(
                    "Failed to run {}: {}. Make sure poppler-utils is installed.",
                    self.binary, e
                ))
            })?;

        if !output.status.success() {
            return Err(ProcessError::Render(format!(
                "{} failed: {}",
                self.binary,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let pages = collect_page_files(temp_dir.path())?;
        if pages.is_empty() {
            return Err(ProcessError::Render("Renderer produced no pages".to_string()));
        }

        pages
            .iter()
            .map(|path| {
                image::open(path)
                    .map(|img| img.to_rgb8())
                    .map_err(|e| ProcessError::Render(format!("Failed to load rendered page: {}", e)))
            })
            .collect()
    }
}

impl PageRenderer for PdftoppmRenderer {
    fn render_pages(&self, document: &Document, dpi: u32) -> Result<Vec<Bitmap>, ProcessError> {
        let _span = tracing::info_span!(
            "render.pages",
            filename = %document.filename,
            dpi = dpi
        )
        .entered();

        let pages = match document.kind {
            DocumentKind::Pdf => self.render_pdf(&document.bytes, dpi)?,
            DocumentKind::Raster(format) => {
                vec![crate::processor::image::decode_raster(&document.bytes, format)?]
            }
        };

        tracing::debug!(pages = pages.len(), "Rendered document");
        Ok(pages)
    }
}

/// `pdftoppm` names its output `page-1.png` or `page-01.png` depending on
/// the page count, so pages are ordered by their numeric suffix.
fn collect_page_files(dir: &Path) -> Result<Vec<PathBuf>, ProcessError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| ProcessError::Render(format!("Failed to list rendered pages: {}", e)))?;

    let mut pages: Vec<(u32, PathBuf)> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter_map(|path| page_number(&path).map(|n| (n, path)))
        .collect();
    pages.sort_by_key(|(n, _)| *n);

    Ok(pages.into_iter().map(|(_, path)| path).collect())
}

fn page_number(path: &Path) -> Option<u32> {
    if path.extension().and_then(|e| e.to_str()) != Some("png") {
        return None;
    }
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.strip_prefix("page-"))
        .and_then(|n| n.parse().ok())
}
