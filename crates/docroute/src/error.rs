use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocrouteError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Document processing error: {0}")]
    Process(#[from] ProcessError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Failed to resolve secret '{name}': {reason}")]
    Secret { name: String, reason: String },
}

/// Failures while turning a document into text, bitmaps or fields.
///
/// Every variant is fatal for the job being processed.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to read document '{path}': {source}")]
    ReadDocument {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to process PDF: {0}")]
    PdfProcessing(String),

    #[error("Failed to process image: {0}")]
    ImageProcessing(String),

    #[error("Page rendering failed: {0}")]
    Render(String),

    #[error("OCR failed: {0}")]
    OcrFailed(String),

    #[error("Extraction service request failed: {0}")]
    ServiceRequest(String),

    #[error("Extraction service returned an unparseable response: {0}")]
    MalformedResponse(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove file '{path}': {source}")]
    RemoveFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid object reference: {0}")]
    InvalidReference(String),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Job queue is closed")]
    ChannelClosed,

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job {id} cannot be claimed from status '{status}'")]
    NotClaimable { id: String, status: String },
}

pub type Result<T> = std::result::Result<T, DocrouteError>;
