//! Picks the cheapest reliable extraction strategy for a document.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::schema::ClassifierConfig;
use crate::error::ProcessError;
use crate::processor::image_filter::ImageFilter;
use crate::processor::{pdf, Bitmap, Document, DocumentKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyClass {
    /// Embedded text goes straight to the text extraction service.
    TextOnly,
    /// Few images on a short document: page bitmaps go to the vision service.
    ImageLight,
    /// Many images or a long image-only document: OCR, then text extraction.
    ImageHeavy,
    /// Short text alongside many images: text plus OCR of the images.
    Mixed,
}

impl StrategyClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyClass::TextOnly => "TEXT_ONLY",
            StrategyClass::ImageLight => "IMAGE_LIGHT",
            StrategyClass::ImageHeavy => "IMAGE_HEAVY",
            StrategyClass::Mixed => "MIXED",
        }
    }
}

impl fmt::Display for StrategyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TEXT_ONLY" => Ok(StrategyClass::TextOnly),
            "IMAGE_LIGHT" => Ok(StrategyClass::ImageLight),
            "IMAGE_HEAVY" => Ok(StrategyClass::ImageHeavy),
            "MIXED" => Ok(StrategyClass::Mixed),
            other => Err(format!("unknown strategy class: {}", other)),
        }
    }
}

/// Everything the dispatcher needs, produced once per document.
#[derive(Debug, Clone)]
pub struct ClassificationResult {
    pub strategy: StrategyClass,
    pub page_count: usize,
    /// Only images that passed the image filter.
    pub content_image_count: usize,
    pub has_text: bool,
    /// Character count of the trimmed text.
    pub text_length: usize,
    pub text_content: String,
    pub content_images: Vec<Bitmap>,
}

/// The routing decision tree. Pure over its integer inputs; the rules are
/// evaluated in a fixed order and the first match wins.
pub fn decide_strategy(
    text_length: usize,
    content_image_count: usize,
    page_count: usize,
    config: &ClassifierConfig,
) -> StrategyClass {
    let has_text = text_length > config.text_threshold;
    let few_images = content_image_count <= config.image_threshold;
    let short = page_count <= config.max_light_pages;

    if content_image_count == 0 && has_text {
        return StrategyClass::TextOnly;
    }

    if !has_text {
        return match (few_images, short) {
            (false, _) => StrategyClass::ImageHeavy,
            (true, true) => StrategyClass::ImageLight,
            // The vision path is reserved for short documents.
            (true, false) => StrategyClass::ImageHeavy,
        };
    }

    // Text and images are both present.
    if text_length > config.dominant_text_length {
        StrategyClass::TextOnly
    } else if few_images && short {
        StrategyClass::ImageLight
    } else if few_images {
        StrategyClass::ImageHeavy
    } else {
        StrategyClass::Mixed
    }
}

pub struct DocumentClassifier {
    config: ClassifierConfig,
    filter: ImageFilter,
}

impl DocumentClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        let filter = ImageFilter::from(&config);
        Self { config, filter }
    }

    /// Inspects text, embedded images and page count, then applies
    /// [`decide_strategy`]. A document that cannot be read is an error.
    pub fn classify(&self, document: &Document) -> Result<ClassificationResult, ProcessError> {
        let _span = tracing::info_span!(
            "classifier.classify",
            filename = %document.filename,
            bytes = document.bytes.len()
        )
        .entered();

        let (text_content, candidates, page_count) = match document.kind {
            DocumentKind::Pdf => {
                let doc = pdf::load(&document.bytes)?;
                let text = pdf::extract_text(&doc);
                let images: Vec<Bitmap> = pdf::extract_images(&doc)
                    .into_iter()
                    .map(|img| img.bitmap)
                    .collect();
                (text, images, pdf::page_count(&doc))
            }
            DocumentKind::Raster(format) => {
                let bitmap = crate::processor::image::decode_raster(&document.bytes, format)?;
                (String::new(), vec![bitmap], 1)
            }
        };

        let total_images = candidates.len();
        let content_images: Vec<Bitmap> = candidates
            .into_iter()
            .filter(|img| self.filter.accepts(img.width(), img.height()))
            .collect();

        let text_length = text_content.trim().chars().count();
        let content_image_count = content_images.len();
        let has_text = text_length > self.config.text_threshold;
        let strategy = decide_strategy(text_length, content_image_count, page_count, &self.config);

        tracing::info!(
            strategy = %strategy,
            page_count,
            text_length,
            content_image_count,
            filtered_out = total_images - content_image_count,
            "Document classified"
        );

        Ok(ClassificationResult {
            strategy,
            page_count,
            content_image_count,
            has_text,
            text_length,
            text_content,
            content_images,
        })
    }
}
