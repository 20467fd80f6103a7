pub mod broadcast;
pub mod classifier;
pub mod confidence;
pub mod config;
pub mod db;
pub mod error;
pub mod extraction;
pub mod integrity;
pub mod pipeline;
pub mod processor;
pub mod sanitize;
pub mod storage;
pub mod telemetry;
pub mod worker;

pub use broadcast::{JobPhase, JobProgressBroadcaster, JobProgressEvent};
pub use classifier::{ClassificationResult, DocumentClassifier, StrategyClass};
pub use config::{load_config, Config, StalePolicy};
pub use db::{Database, DatabaseError};
pub use error::{ConfigError, DocrouteError, ProcessError, Result, StorageError, WorkerError};
pub use extraction::{ExtractionDispatcher, ExtractionResult, ExtractionService};
pub use integrity::{IntegrityAnalyzer, RiskLevel, RiskReport};
pub use pipeline::{JobPipeline, PipelineError, PipelineServices};
pub use storage::{LocalObjectStore, ObjectStore};
pub use telemetry::{init_logging, LogFormat};
pub use worker::{JobOutcome, JobStatus, LeaseReconciler, WorkerPool};
