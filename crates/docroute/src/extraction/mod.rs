//! Executes the chosen strategy and normalizes the service's answer.

pub mod prompt;
pub mod response;
pub mod service;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::classifier::{ClassificationResult, StrategyClass};
use crate::config::Config;
use crate::error::ProcessError;
use crate::processor::ocr::{OcrOutput, OcrTextExtractor};
use crate::processor::render::PageRenderer;
use crate::processor::{Bitmap, Document, DocumentKind};

pub use prompt::NOT_FOUND;
pub use response::{parse_service_response, strip_code_fences, ServiceResponse};
pub use service::{ExtractionRequest, ExtractionService, HttpExtractionService};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedPair {
    pub key: String,
    pub value: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    Text,
    Vision,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::Text => "text",
            ExtractionMethod::Vision => "vision",
        }
    }
}

/// Partial-result markers. These never fail a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractionWarning {
    VisionInputTruncated { supplied: usize, sent: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStats {
    pub page_count: usize,
    pub content_image_count: usize,
    pub has_text: bool,
    pub text_length: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub strategy_used: StrategyClass,
    pub method: ExtractionMethod,
    pub fields: Vec<ExtractedPair>,
    pub document_type_label: String,
    pub combined_confidence: f64,
    pub summary: String,
    pub ocr_confidence: Option<f64>,
    pub extraction_confidence: f64,
    pub warnings: Vec<ExtractionWarning>,
    pub stats: DocumentStats,
}

/// Mean of both scores when OCR ran, otherwise the service's own score.
pub fn combine_confidence(ocr_confidence: Option<f64>, extraction_confidence: f64) -> f64 {
    let combined = match ocr_confidence {
        Some(ocr) => (ocr + extraction_confidence) / 2.0,
        None => extraction_confidence,
    };
    combined.clamp(0.0, 1.0)
}

/// A value worth keeping: non-empty and not the uncertainty sentinel.
pub fn is_meaningful_value(value: &str) -> bool {
    let trimmed = value.trim();
    !trimmed.is_empty() && !trimmed.eq_ignore_ascii_case(NOT_FOUND)
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub vision_dpi: u32,
    pub ocr_dpi: u32,
    pub languages: Vec<String>,
    pub psm: u32,
    pub max_vision_images: usize,
    pub default_confidence: f64,
}

impl From<&Config> for DispatchSettings {
    fn from(config: &Config) -> Self {
        Self {
            vision_dpi: config.render.vision_dpi,
            ocr_dpi: config.render.ocr_dpi,
            languages: config.ocr.effective_languages(),
            psm: config.ocr.psm,
            max_vision_images: config.extraction.max_vision_images,
            default_confidence: config.extraction.default_confidence,
        }
    }
}

/// What the selected strategy hands to the service.
struct Prepared {
    method: ExtractionMethod,
    prompt: String,
    images: Vec<Bitmap>,
    ocr: Option<OcrOutput>,
    warnings: Vec<ExtractionWarning>,
}

pub struct ExtractionDispatcher {
    service: Arc<dyn ExtractionService>,
    renderer: Arc<dyn PageRenderer>,
    ocr: OcrTextExtractor,
    settings: DispatchSettings,
}

impl ExtractionDispatcher {
    pub fn new(
        service: Arc<dyn ExtractionService>,
        renderer: Arc<dyn PageRenderer>,
        ocr: OcrTextExtractor,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            service,
            renderer,
            ocr,
            settings,
        }
    }

    pub fn extract_fields(
        &self,
        classification: &ClassificationResult,
        document: &Document,
    ) -> Result<ExtractionResult, ProcessError> {
        let _span = tracing::info_span!(
            "extraction.dispatch",
            strategy = %classification.strategy,
            filename = %document.filename
        )
        .entered();

        let prepared = match classification.strategy {
            StrategyClass::TextOnly => self.prepare_text_only(classification),
            StrategyClass::ImageLight => self.prepare_image_light(classification, document)?,
            StrategyClass::ImageHeavy => self.prepare_image_heavy(classification, document)?,
            StrategyClass::Mixed => self.prepare_mixed(classification)?,
        };

        let raw = match prepared.method {
            ExtractionMethod::Text => self
                .service
                .extract_text(&ExtractionRequest::text(&prepared.prompt))?,
            ExtractionMethod::Vision => self
                .service
                .extract_vision(&ExtractionRequest::vision(&prepared.prompt, &prepared.images))?,
        };

        let response = parse_service_response(&raw)?;
        let result = self.finish(classification, prepared, response);

        tracing::info!(
            method = result.method.as_str(),
            fields = result.fields.len(),
            combined_confidence = result.combined_confidence,
            "Extraction finished"
        );
        Ok(result)
    }

    fn prepare_text_only(&self, classification: &ClassificationResult) -> Prepared {
        Prepared {
            method: ExtractionMethod::Text,
            prompt: prompt::text_prompt(&classification.text_content),
            images: Vec::new(),
            ocr: None,
            warnings: Vec::new(),
        }
    }

    fn prepare_image_light(
        &self,
        classification: &ClassificationResult,
        document: &Document,
    ) -> Result<Prepared, ProcessError> {
        let mut images = match document.kind {
            DocumentKind::Raster(_) if !classification.content_images.is_empty() => {
                classification.content_images.clone()
            }
            _ => self
                .renderer
                .render_pages(document, self.settings.vision_dpi)?,
        };

        let mut warnings = Vec::new();
        let limit = self.settings.max_vision_images;
        if images.len() > limit {
            tracing::warn!(
                supplied = images.len(),
                sent = limit,
                "Vision input truncated"
            );
            warnings.push(ExtractionWarning::VisionInputTruncated {
                supplied: images.len(),
                sent: limit,
            });
            images.truncate(limit);
        }

        let context = classification.text_content.trim();
        Ok(Prepared {
            method: ExtractionMethod::Vision,
            prompt: prompt::vision_prompt((!context.is_empty()).then_some(context)),
            images,
            ocr: None,
            warnings,
        })
    }

    fn prepare_image_heavy(
        &self,
        classification: &ClassificationResult,
        document: &Document,
    ) -> Result<Prepared, ProcessError> {
        let ocr = if classification.content_images.is_empty() {
            let pages = self.renderer.render_pages(document, self.settings.ocr_dpi)?;
            self.run_ocr(&pages)?
        } else {
            self.run_ocr(&classification.content_images)?
        };

        Ok(Prepared {
            method: ExtractionMethod::Text,
            prompt: prompt::text_prompt(&ocr.text),
            images: Vec::new(),
            ocr: Some(ocr),
            warnings: Vec::new(),
        })
    }

    fn prepare_mixed(&self, classification: &ClassificationResult) -> Result<Prepared, ProcessError> {
        let ocr = self.run_ocr(&classification.content_images)?;
        let combined = format!(
            "=== Extracted Text ===\n{}\n\n=== OCR from Images ===\n{}",
            classification.text_content.trim(),
            ocr.text
        );

        Ok(Prepared {
            method: ExtractionMethod::Text,
            prompt: prompt::text_prompt(&combined),
            images: Vec::new(),
            ocr: Some(ocr),
            warnings: Vec::new(),
        })
    }

    fn run_ocr(&self, images: &[Bitmap]) -> Result<OcrOutput, ProcessError> {
        self.ocr
            .extract(images, &self.settings.languages, self.settings.psm)
    }

    fn finish(
        &self,
        classification: &ClassificationResult,
        prepared: Prepared,
        response: ServiceResponse,
    ) -> ExtractionResult {
        let extraction_confidence = response
            .confidence
            .unwrap_or(self.settings.default_confidence);
        let ocr_confidence = prepared.ocr.as_ref().map(|o| o.confidence);
        let combined_confidence = combine_confidence(ocr_confidence, extraction_confidence);

        let total = response.pairs.len();
        let fields: Vec<ExtractedPair> = response
            .pairs
            .into_iter()
            .filter(|pair| is_meaningful_value(&pair.value))
            .map(|pair| ExtractedPair {
                key: pair.key,
                value: pair.value.trim().to_string(),
                confidence: pair.confidence.unwrap_or(combined_confidence),
            })
            .collect();

        if fields.len() < total {
            tracing::debug!(dropped = total - fields.len(), "Dropped empty or unknown values");
        }

        ExtractionResult {
            strategy_used: classification.strategy,
            method: prepared.method,
            fields,
            document_type_label: response.document_type,
            combined_confidence,
            summary: response.summary,
            ocr_confidence,
            extraction_confidence,
            warnings: prepared.warnings,
            stats: DocumentStats {
                page_count: classification.page_count,
                content_image_count: classification.content_image_count,
                has_text: classification.has_text,
                text_length: classification.text_length,
            },
        }
    }
}
