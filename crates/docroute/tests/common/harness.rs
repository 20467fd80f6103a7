//! Test harness for isolated pipeline runs.
//!
//! The `TestHarness` struct provides:
//! - A temporary object store root and a scratch directory for local copies
//! - An in-memory database
//! - Fake renderer, OCR engine and extraction service with call recording
//! - A `JobPipeline` wired over all of the above

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use tempfile::TempDir;

use docroute::db::field_repo::{self, FieldRow};
use docroute::db::job_repo;
use docroute::extraction::ExtractionRequest;
use docroute::pipeline::PipelineServices;
use docroute::processor::ocr::{OcrEngine, OcrPage};
use docroute::processor::render::PageRenderer;
use docroute::processor::{Bitmap, Document};
use docroute::worker::job::Job;
use docroute::worker::{submit, JobQueue, Submission};
use docroute::{
    Config, Database, ExtractionService, IntegrityAnalyzer, JobOutcome, JobPipeline,
    LocalObjectStore, ProcessError, WorkerError,
};

/// "Today" for every harness pipeline, so date checks are stable.
pub fn pinned_today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 7, 15).expect("valid date")
}

/// One call made to the fake extraction service.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub vision: bool,
    pub prompt: String,
    pub image_count: usize,
}

type CallHook = Box<dyn Fn() + Send + Sync>;

/// Replays queued replies, then repeats the default reply.
#[derive(Default)]
pub struct FakeExtractionService {
    default_reply: Mutex<Option<Result<String, String>>>,
    queued: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<Vec<RecordedCall>>,
    on_call: Mutex<Option<CallHook>>,
}

impl FakeExtractionService {
    pub fn set_reply(&self, payload: impl Into<String>) {
        *self.default_reply.lock().unwrap() = Some(Ok(payload.into()));
    }

    pub fn set_failure(&self, message: &str) {
        *self.default_reply.lock().unwrap() = Some(Err(message.to_string()));
    }

    /// Used once, ahead of the default reply.
    pub fn push_reply(&self, payload: impl Into<String>) {
        self.queued.lock().unwrap().push_back(Ok(payload.into()));
    }

    /// Runs `hook` inside every call, before the reply is returned.
    pub fn on_call(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_call.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    fn respond(&self, vision: bool, request: &ExtractionRequest<'_>) -> Result<String, ProcessError> {
        self.calls.lock().unwrap().push(RecordedCall {
            vision,
            prompt: request.prompt.to_string(),
            image_count: request.images.len(),
        });
        if let Some(hook) = self.on_call.lock().unwrap().as_ref() {
            hook();
        }

        let reply = match self.queued.lock().unwrap().pop_front() {
            Some(reply) => reply,
            None => self
                .default_reply
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| Err("no reply configured".to_string())),
        };
        reply.map_err(ProcessError::ServiceRequest)
    }
}

impl ExtractionService for FakeExtractionService {
    fn extract_text(&self, request: &ExtractionRequest<'_>) -> Result<String, ProcessError> {
        self.respond(false, request)
    }

    fn extract_vision(&self, request: &ExtractionRequest<'_>) -> Result<String, ProcessError> {
        self.respond(true, request)
    }
}

/// Returns the same recognized text for every bitmap.
pub struct FakeOcrEngine {
    text: Mutex<String>,
    confidence: f32,
    calls: Mutex<usize>,
}

impl Default for FakeOcrEngine {
    fn default() -> Self {
        Self {
            text: Mutex::new("Scanned text".to_string()),
            confidence: 88.0,
            calls: Mutex::new(0),
        }
    }
}

impl FakeOcrEngine {
    pub fn set_text(&self, text: &str) {
        *self.text.lock().unwrap() = text.to_string();
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl OcrEngine for FakeOcrEngine {
    fn recognize(&self, _image: &Bitmap, _languages: &[String], _psm: u32) -> Result<OcrPage, ProcessError> {
        *self.calls.lock().unwrap() += 1;
        Ok(OcrPage {
            text: self.text.lock().unwrap().clone(),
            token_confidences: vec![self.confidence, -1.0],
        })
    }
}

/// Renders every document as `pages` white bitmaps and records the DPI.
pub struct FakeRenderer {
    pages: usize,
    dpis: Mutex<Vec<u32>>,
}

impl Default for FakeRenderer {
    fn default() -> Self {
        Self {
            pages: 1,
            dpis: Mutex::new(Vec::new()),
        }
    }
}

impl FakeRenderer {
    pub fn requested_dpis(&self) -> Vec<u32> {
        self.dpis.lock().unwrap().clone()
    }
}

impl PageRenderer for FakeRenderer {
    fn render_pages(&self, _document: &Document, dpi: u32) -> Result<Vec<Bitmap>, ProcessError> {
        self.dpis.lock().unwrap().push(dpi);
        Ok((0..self.pages)
            .map(|_| image::RgbImage::from_pixel(850, 1100, image::Rgb([255, 255, 255])))
            .collect())
    }
}

/// Collects job ids instead of running them.
#[derive(Default)]
pub struct RecordingQueue {
    ids: Mutex<Vec<String>>,
}

impl RecordingQueue {
    pub fn ids(&self) -> Vec<String> {
        self.ids.lock().unwrap().clone()
    }
}

impl JobQueue for RecordingQueue {
    fn enqueue(&self, job_id: &str) -> Result<(), WorkerError> {
        self.ids.lock().unwrap().push(job_id.to_string());
        Ok(())
    }
}

/// Test harness providing an isolated pipeline environment.
pub struct TestHarness {
    /// Keeps every directory below alive for the test's duration.
    temp_dir: TempDir,
    pub store_root: PathBuf,
    pub scratch_dir: PathBuf,
    pub store: Arc<LocalObjectStore>,
    pub db: Database,
    pub config: Arc<Config>,
    pub service: Arc<FakeExtractionService>,
    pub ocr: Arc<FakeOcrEngine>,
    pub renderer: Arc<FakeRenderer>,
    pub queue: RecordingQueue,
    pipeline: Arc<JobPipeline>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Applies `adjust` to the default config before the pipeline is built.
    pub fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store_root = temp_dir.path().join("objects");
        let scratch_dir = temp_dir.path().join("scratch");
        std::fs::create_dir_all(&scratch_dir).expect("Failed to create scratch directory");

        let mut config = Config::default();
        config.storage.root = store_root.clone();
        config.worker.temp_dir = Some(scratch_dir.clone());
        config.worker.worker_count = 2;
        adjust(&mut config);
        let config = Arc::new(config);

        let store = Arc::new(LocalObjectStore::new(&store_root));
        let db = Database::open_in_memory().expect("Failed to open database");
        let service = Arc::new(FakeExtractionService::default());
        let ocr = Arc::new(FakeOcrEngine::default());
        let renderer = Arc::new(FakeRenderer::default());

        let services = PipelineServices {
            store: store.clone(),
            renderer: renderer.clone(),
            ocr: ocr.clone(),
            extraction: service.clone(),
        };
        let pipeline = Arc::new(
            JobPipeline::new(services, db.clone(), Arc::clone(&config))
                .with_analyzer(IntegrityAnalyzer::with_today(pinned_today())),
        );

        Self {
            temp_dir,
            store_root,
            scratch_dir,
            store,
            db,
            config,
            service,
            ocr,
            renderer,
            queue: RecordingQueue::default(),
            pipeline,
        }
    }

    pub fn pipeline(&self) -> Arc<JobPipeline> {
        Arc::clone(&self.pipeline)
    }

    /// Stores the upload and records a QUEUED job without running it.
    pub fn submit(&self, owner: &str, filename: &str, bytes: &[u8]) -> String {
        submit(
            self.store.as_ref(),
            &self.db,
            &self.queue,
            &Submission {
                owner_ref: owner,
                filename,
                bytes,
            },
        )
        .expect("Failed to submit document")
    }

    pub fn process(&self, job_id: &str) -> JobOutcome {
        self.pipeline
            .process(job_id)
            .expect("Pipeline returned an infrastructure error")
    }

    /// Submits and processes in one go.
    pub fn run(&self, owner: &str, filename: &str, bytes: &[u8]) -> (String, JobOutcome) {
        let job_id = self.submit(owner, filename, bytes);
        let outcome = self.process(&job_id);
        (job_id, outcome)
    }

    pub fn job(&self, job_id: &str) -> Job {
        let row = job_repo::find_by_id(&self.db, job_id)
            .expect("Failed to read job")
            .expect("Job not found");
        Job::try_from(row).expect("Job row did not convert")
    }

    pub fn fields(&self, job_id: &str) -> Vec<FieldRow> {
        field_repo::list_for_job(&self.db, job_id).expect("Failed to read fields")
    }

    /// Current value of a persisted field, if present.
    pub fn field_value(&self, job_id: &str, name: &str) -> Option<String> {
        self.fields(job_id)
            .into_iter()
            .find(|f| f.field_name == name)
            .map(|f| f.current_value().to_string())
    }

    /// Entries left in the scratch directory.
    pub fn scratch_entries(&self) -> usize {
        std::fs::read_dir(&self.scratch_dir)
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
