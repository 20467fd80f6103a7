//! Job orchestration: one attempt per dequeue, always ending terminal.

pub mod config;
pub mod context;
pub mod error;
pub mod progress;
pub mod runner;

pub use config::PipelineServices;
pub use context::PipelineContext;
pub use error::PipelineError;
pub use progress::{BroadcastProgress, NoopProgress, ProgressEvent, ProgressReporter};
pub use runner::{field_rows, lease_duration, JobPipeline};
