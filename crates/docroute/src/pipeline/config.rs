use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::extraction::{ExtractionService, HttpExtractionService};
use crate::processor::ocr::{OcrEngine, TesseractEngine};
use crate::processor::render::{PageRenderer, PdftoppmRenderer};
use crate::storage::{LocalObjectStore, ObjectStore};

/// External collaborators, built once per process and shared by every
/// worker. Tests swap any of them for fakes.
#[derive(Clone)]
pub struct PipelineServices {
    pub store: Arc<dyn ObjectStore>,
    pub renderer: Arc<dyn PageRenderer>,
    pub ocr: Arc<dyn OcrEngine>,
    pub extraction: Arc<dyn ExtractionService>,
}

impl PipelineServices {
    /// Production wiring: local object store, `pdftoppm`, Tesseract and the
    /// HTTP extraction service.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            store: Arc::new(LocalObjectStore::new(&config.storage.root)),
            renderer: Arc::new(PdftoppmRenderer::new(
                &config.render.pdftoppm_path,
                config.worker.temp_dir.clone(),
            )),
            ocr: Arc::new(TesseractEngine::new(None)),
            extraction: Arc::new(HttpExtractionService::from_config(&config.extraction)?),
        })
    }
}
