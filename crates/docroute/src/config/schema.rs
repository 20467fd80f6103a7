use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::telemetry::LogFormat;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            log_format: LogFormat::default(),
            classifier: ClassifierConfig::default(),
            ocr: OcrConfig::default(),
            render: RenderConfig::default(),
            extraction: ExtractionConfig::default(),
            worker: WorkerConfig::default(),
            storage: StorageConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

/// Thresholds for the image filter and the strategy decision tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_min_dimension")]
    pub min_width: u32,
    #[serde(default = "default_min_dimension")]
    pub min_height: u32,
    #[serde(default = "default_min_area")]
    pub min_area: u64,
    /// Trimmed character count above which a document "has text".
    #[serde(default = "default_text_threshold")]
    pub text_threshold: usize,
    /// Text length at which text wins over embedded images.
    #[serde(default = "default_dominant_text_length")]
    pub dominant_text_length: usize,
    #[serde(default = "default_image_threshold")]
    pub image_threshold: usize,
    /// Longest document still eligible for the vision path.
    #[serde(default = "default_max_light_pages")]
    pub max_light_pages: usize,
}

fn default_min_dimension() -> u32 {
    200
}

fn default_min_area() -> u64 {
    40_000
}

fn default_text_threshold() -> usize {
    50
}

fn default_dominant_text_length() -> usize {
    500
}

fn default_image_threshold() -> usize {
    2
}

fn default_max_light_pages() -> usize {
    5
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            min_width: default_min_dimension(),
            min_height: default_min_dimension(),
            min_area: default_min_area(),
            text_threshold: default_text_threshold(),
            dominant_text_length: default_dominant_text_length(),
            image_threshold: default_image_threshold(),
            max_light_pages: default_max_light_pages(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrConfig {
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
    /// Always included in the language set, even when `languages` omits it.
    #[serde(default = "default_language")]
    pub default_language: String,
    /// Tesseract page segmentation mode. 6 assumes a uniform block of text,
    /// which holds up best on tables.
    #[serde(default = "default_psm")]
    pub psm: u32,
}

fn default_languages() -> Vec<String> {
    vec!["eng".to_string(), "kan".to_string()]
}

fn default_language() -> String {
    "eng".to_string()
}

fn default_psm() -> u32 {
    6
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            languages: default_languages(),
            default_language: default_language(),
            psm: default_psm(),
        }
    }
}

impl OcrConfig {
    /// Language list with the default language guaranteed first.
    pub fn effective_languages(&self) -> Vec<String> {
        let mut langs = vec![self.default_language.clone()];
        for lang in &self.languages {
            if !langs.contains(lang) {
                langs.push(lang.clone());
            }
        }
        langs
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_vision_dpi")]
    pub vision_dpi: u32,
    #[serde(default = "default_ocr_dpi")]
    pub ocr_dpi: u32,
    #[serde(default = "default_pdftoppm")]
    pub pdftoppm_path: String,
}

fn default_vision_dpi() -> u32 {
    250
}

fn default_ocr_dpi() -> u32 {
    300
}

fn default_pdftoppm() -> String {
    "pdftoppm".to_string()
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            vision_dpi: default_vision_dpi(),
            ocr_dpi: default_ocr_dpi(),
            pdftoppm_path: default_pdftoppm(),
        }
    }
}

/// Connection settings for the external text/vision extraction service.
///
/// The API key is resolved in order: `api_key`, `api_key_file`,
/// `api_key_env_var`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_file: Option<PathBuf>,
    #[serde(default = "default_api_key_env_var")]
    pub api_key_env_var: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_vision_images")]
    pub max_vision_images: usize,
    /// Used when the service omits its own confidence.
    #[serde(default = "default_confidence")]
    pub default_confidence: f64,
}

fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_api_key_env_var() -> Option<String> {
    Some("DOCROUTE_EXTRACTION_API_KEY".to_string())
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_vision_images() -> usize {
    10
}

fn default_confidence() -> f64 {
    0.9
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key: None,
            api_key_file: None,
            api_key_env_var: default_api_key_env_var(),
            timeout_secs: default_timeout_secs(),
            max_vision_images: default_max_vision_images(),
            default_confidence: default_confidence(),
        }
    }
}

/// What the lease reconciler does with a job whose worker disappeared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StalePolicy {
    #[default]
    Requeue,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_lease_secs")]
    pub lease_secs: u64,
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
    #[serde(default)]
    pub stale_policy: StalePolicy,
    /// Parent directory for per-job scratch copies. System temp when unset.
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

fn default_lease_secs() -> u64 {
    900
}

fn default_reconcile_interval_secs() -> u64 {
    60
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            lease_secs: default_lease_secs(),
            reconcile_interval_secs: default_reconcile_interval_secs(),
            stale_policy: StalePolicy::default(),
            temp_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

fn default_storage_root() -> PathBuf {
    data_dir().join("objects")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

fn default_database_path() -> PathBuf {
    data_dir().join("docroute.db")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

/// `~/.local/share/docroute` (platform equivalent), or `./.docroute` when
/// the platform has no data directory.
fn data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("docroute"))
        .unwrap_or_else(|| PathBuf::from(".docroute"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifier_defaults() {
        let config = ClassifierConfig::default();
        assert_eq!(config.min_width, 200);
        assert_eq!(config.min_height, 200);
        assert_eq!(config.min_area, 40_000);
        assert_eq!(config.image_threshold, 2);
        assert_eq!(config.max_light_pages, 5);
        assert_eq!(config.text_threshold, 50);
        assert_eq!(config.dominant_text_length, 500);
    }

    #[test]
    fn test_effective_languages_puts_default_first() {
        let config = OcrConfig {
            languages: vec!["kan".to_string(), "eng".to_string(), "hin".to_string()],
            default_language: "eng".to_string(),
            psm: 6,
        };
        assert_eq!(config.effective_languages(), vec!["eng", "kan", "hin"]);
    }

    #[test]
    fn test_effective_languages_adds_missing_default() {
        let config = OcrConfig {
            languages: vec!["deu".to_string()],
            ..OcrConfig::default()
        };
        assert_eq!(config.effective_languages(), vec!["eng", "deu"]);
    }

    #[test]
    fn test_api_key_is_never_serialized() {
        let mut config = Config::default();
        config.extraction.api_key = Some("secret".to_string());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }

    #[test]
    fn test_empty_object_deserializes_to_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.render.vision_dpi, 250);
        assert_eq!(config.render.ocr_dpi, 300);
        assert_eq!(config.extraction.max_vision_images, 10);
        assert_eq!(config.worker.stale_policy, StalePolicy::Requeue);
        assert!(config.worker.worker_count > 0);
    }
}
