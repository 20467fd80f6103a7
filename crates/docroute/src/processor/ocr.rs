use std::sync::Arc;

use crate::error::ProcessError;
use crate::processor::Bitmap;

/// Raw engine output for one bitmap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OcrPage {
    pub text: String,
    /// Native 0-100 scale; negative values mark "no text" rows.
    pub token_confidences: Vec<f32>,
}

impl OcrPage {
    /// Mean token confidence scaled to `[0, 1]`, ignoring sentinel rows.
    /// `0.0` when no tokens were detected.
    pub fn confidence(&self) -> f64 {
        let valid: Vec<f64> = self
            .token_confidences
            .iter()
            .filter(|c| **c >= 0.0)
            .map(|c| f64::from(*c))
            .collect();

        if valid.is_empty() {
            return 0.0;
        }
        let mean = valid.iter().sum::<f64>() / valid.len() as f64;
        (mean / 100.0).clamp(0.0, 1.0)
    }
}

pub trait OcrEngine: Send + Sync {
    fn recognize(
        &self,
        image: &Bitmap,
        languages: &[String],
        psm: u32,
    ) -> Result<OcrPage, ProcessError>;
}

/// Tesseract through leptess. A fresh engine is initialized per call so
/// workers never share Tesseract state.
#[derive(Clone, Default)]
pub struct TesseractEngine {
    data_path: Option<String>,
}

impl TesseractEngine {
    pub fn new(data_path: Option<String>) -> Self {
        Self { data_path }
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(
        &self,
        image: &Bitmap,
        languages: &[String],
        psm: u32,
    ) -> Result<OcrPage, ProcessError> {
        let lang_str = if languages.is_empty() {
            "eng".to_string()
        } else {
            languages.join("+")
        };

        let png_data = crate::processor::image::encode_png(image)
            .map_err(|e| ProcessError::OcrFailed(format!("Failed to convert image: {}", e)))?;

        let mut lt = leptess::LepTess::new(self.data_path.as_deref(), &lang_str).map_err(|e| {
            ProcessError::OcrFailed(format!("Failed to initialize Tesseract: {}", e))
        })?;

        lt.set_variable(leptess::Variable::TesseditPagesegMode, &psm.to_string())
            .map_err(|e| ProcessError::OcrFailed(format!("Failed to set page mode: {:?}", e)))?;

        lt.set_image_from_mem(&png_data)
            .map_err(|e| ProcessError::OcrFailed(format!("Failed to set image for OCR: {}", e)))?;

        let text = lt
            .get_utf8_text()
            .map_err(|e| ProcessError::OcrFailed(format!("OCR failed: {}", e)))?;

        let tsv = lt
            .get_tsv_text(0)
            .map_err(|e| ProcessError::OcrFailed(format!("OCR failed: {}", e)))?;

        Ok(OcrPage {
            text,
            token_confidences: parse_tsv_confidences(&tsv),
        })
    }
}

/// Word-level (`level == 5`) confidences from Tesseract TSV output.
/// Column 11 is `conf`; the optional header row is skipped.
fn parse_tsv_confidences(tsv: &str) -> Vec<f32> {
    tsv.lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() < 11 || cols[0] != "5" {
                return None;
            }
            cols[10].trim().parse::<f32>().ok()
        })
        .collect()
}

/// Combined OCR output over one or more bitmaps.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrOutput {
    pub text: String,
    pub confidence: f64,
}

/// Runs an [`OcrEngine`] over a sequence of bitmaps and folds the results.
#[derive(Clone)]
pub struct OcrTextExtractor {
    engine: Arc<dyn OcrEngine>,
}

impl OcrTextExtractor {
    pub fn new(engine: Arc<dyn OcrEngine>) -> Self {
        Self { engine }
    }

    /// One image yields its text directly. Several images are joined as
    /// `--- Page {n} ---` blocks in input order, and the confidence is the
    /// mean of the per-image confidences.
    pub fn extract(
        &self,
        images: &[Bitmap],
        languages: &[String],
        psm: u32,
    ) -> Result<OcrOutput, ProcessError> {
        let _span = tracing::info_span!(
            "ocr.extract",
            images = images.len(),
            languages = %languages.join("+"),
            psm = psm
        )
        .entered();

        if images.is_empty() {
            return Ok(OcrOutput {
                text: String::new(),
                confidence: 0.0,
            });
        }

        let mut pages = Vec::with_capacity(images.len());
        for image in images {
            pages.push(self.engine.recognize(image, languages, psm)?);
        }

        if pages.len() == 1 {
            let page = &pages[0];
            return Ok(OcrOutput {
                text: page.text.trim().to_string(),
                confidence: page.confidence(),
            });
        }

        let text = pages
            .iter()
            .enumerate()
            .map(|(i, page)| format!("--- Page {} ---\n{}", i + 1, page.text.trim()))
            .collect::<Vec<_>>()
            .join("\n\n");
        let confidence =
            pages.iter().map(OcrPage::confidence).sum::<f64>() / pages.len() as f64;

        tracing::debug!(confidence, chars = text.len(), "OCR finished");

        Ok(OcrOutput { text, confidence })
    }
}
