pub mod loader;
pub mod schema;

pub use loader::{load_config, load_config_from_str, resolve_api_key, validate_config};
pub use schema::{
    ClassifierConfig, Config, DatabaseConfig, ExtractionConfig, OcrConfig, RenderConfig,
    StalePolicy, StorageConfig, WorkerConfig,
};
