use std::path::Path;

use secrecy::SecretString;

use crate::config::schema::{Config, ExtractionConfig};
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

/// One week.
pub const MAX_LEASE_SECS: u64 = 7 * 24 * 60 * 60;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    let classifier = &config.classifier;
    if classifier.min_width == 0 || classifier.min_height == 0 || classifier.min_area == 0 {
        return Err(ConfigError::Validation {
            message: "Image filter thresholds must be positive".to_string(),
        });
    }
    if classifier.max_light_pages == 0 {
        return Err(ConfigError::Validation {
            message: "classifier.max_light_pages must be at least 1".to_string(),
        });
    }

    if config.ocr.default_language.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "ocr.default_language must not be empty".to_string(),
        });
    }
    if config.ocr.effective_languages().len() < 2 {
        return Err(ConfigError::Validation {
            message: "OCR needs at least two languages including the default".to_string(),
        });
    }

    for (name, dpi) in [
        ("render.vision_dpi", config.render.vision_dpi),
        ("render.ocr_dpi", config.render.ocr_dpi),
    ] {
        if !(36..=1200).contains(&dpi) {
            return Err(ConfigError::Validation {
                message: format!("{} must be between 36 and 1200, got {}", name, dpi),
            });
        }
    }

    let extraction = &config.extraction;
    if extraction.max_vision_images == 0 {
        return Err(ConfigError::Validation {
            message: "extraction.max_vision_images must be at least 1".to_string(),
        });
    }
    if !(0.0..=1.0).contains(&extraction.default_confidence) {
        return Err(ConfigError::Validation {
            message: "extraction.default_confidence must be within [0, 1]".to_string(),
        });
    }

    if config.worker.worker_count == 0 {
        return Err(ConfigError::Validation {
            message: "worker.worker_count must be at least 1".to_string(),
        });
    }
    if !(1..=MAX_LEASE_SECS).contains(&config.worker.lease_secs) {
        return Err(ConfigError::Validation {
            message: format!("worker.lease_secs must be between 1 and {}", MAX_LEASE_SECS),
        });
    }

    Ok(())
}

/// Resolves the extraction service key: direct value, then file, then env var.
pub fn resolve_api_key(config: &ExtractionConfig) -> Result<SecretString, ConfigError> {
    if let Some(ref key) = config.api_key {
        if !key.trim().is_empty() {
            return Ok(SecretString::from(key.trim().to_string()));
        }
    }

    if let Some(ref path) = config.api_key_file {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Secret {
            name: path.display().to_string(),
            reason: e.to_string(),
        })?;
        return Ok(SecretString::from(content.trim().to_string()));
    }

    if let Some(ref name) = config.api_key_env_var {
        return match std::env::var(name) {
            Ok(value) if !value.trim().is_empty() => {
                Ok(SecretString::from(value.trim().to_string()))
            }
            Ok(_) => Err(ConfigError::Secret {
                name: name.clone(),
                reason: "environment variable is empty".to_string(),
            }),
            Err(e) => Err(ConfigError::Secret {
                name: name.clone(),
                reason: e.to_string(),
            }),
        };
    }

    Err(ConfigError::Secret {
        name: "extraction.api_key".to_string(),
        reason: "no api_key, api_key_file or api_key_env_var configured".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;

    #[test]
    fn test_load_valid_config() {
        let config_json = r#"
        {
            "version": "1.0",
            "classifier": { "image_threshold": 3, "max_light_pages": 4 },
            "ocr": { "languages": ["eng", "hin"], "psm": 4 },
            "worker": { "worker_count": 2, "stale_policy": "fail" },
            "database": { "path": "/tmp/docroute-test.db" }
        }
        "#;

        let config = load_config_from_str(config_json).unwrap();
        assert_eq!(config.classifier.image_threshold, 3);
        assert_eq!(config.classifier.max_light_pages, 4);
        assert_eq!(config.classifier.min_width, 200);
        assert_eq!(config.ocr.psm, 4);
        assert_eq!(config.worker.worker_count, 2);
        assert_eq!(
            config.worker.stale_policy,
            crate::config::schema::StalePolicy::Fail
        );
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = load_config_from_str(r#"{ "version": "1.0" }"#).unwrap();
        assert_eq!(config.render.vision_dpi, 250);
        assert_eq!(config.extraction.default_confidence, 0.9);
    }

    #[test]
    fn test_unsupported_version() {
        let result = load_config_from_str(r#"{ "version": "2.0" }"#);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_schema_rejects_wrong_type() {
        let result = load_config_from_str(r#"{ "version": "1.0", "worker": { "worker_count": "four" } }"#);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_schema_rejects_unknown_stale_policy() {
        let result = load_config_from_str(
            r#"{ "version": "1.0", "worker": { "stale_policy": "ignore" } }"#,
        );
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_dpi_out_of_range() {
        let result =
            load_config_from_str(r#"{ "version": "1.0", "render": { "ocr_dpi": 5000 } }"#);
        match result {
            Err(ConfigError::Validation { message }) => assert!(message.contains("ocr_dpi")),
            other => panic!("Expected validation error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_single_language_rejected() {
        let result = load_config_from_str(
            r#"{ "version": "1.0", "ocr": { "languages": ["eng"] } }"#,
        );
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_invalid_json() {
        let result = load_config_from_str("{ not json");
        assert!(matches!(result, Err(ConfigError::ParseJson(_))));
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("/nonexistent/docroute.json");
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }

    #[test]
    fn test_resolve_api_key_direct_value_wins() {
        let config = ExtractionConfig {
            api_key: Some("  direct-key ".to_string()),
            api_key_env_var: Some("DOCROUTE_TEST_UNUSED".to_string()),
            ..ExtractionConfig::default()
        };
        let key = resolve_api_key(&config).unwrap();
        assert_eq!(key.expose_secret(), "direct-key");
    }

    #[test]
    fn test_resolve_api_key_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.txt");
        std::fs::write(&path, "file-key\n").unwrap();

        let config = ExtractionConfig {
            api_key_file: Some(path),
            ..ExtractionConfig::default()
        };
        let key = resolve_api_key(&config).unwrap();
        assert_eq!(key.expose_secret(), "file-key");
    }

    #[test]
    #[serial]
    fn test_resolve_api_key_from_env() {
        std::env::set_var("DOCROUTE_TEST_API_KEY", "env-key");
        let config = ExtractionConfig {
            api_key_env_var: Some("DOCROUTE_TEST_API_KEY".to_string()),
            ..ExtractionConfig::default()
        };
        let key = resolve_api_key(&config).unwrap();
        assert_eq!(key.expose_secret(), "env-key");
        std::env::remove_var("DOCROUTE_TEST_API_KEY");
    }

    #[test]
    #[serial]
    fn test_resolve_api_key_missing_env() {
        std::env::remove_var("DOCROUTE_TEST_MISSING_KEY");
        let config = ExtractionConfig {
            api_key_env_var: Some("DOCROUTE_TEST_MISSING_KEY".to_string()),
            ..ExtractionConfig::default()
        };
        assert!(matches!(
            resolve_api_key(&config),
            Err(ConfigError::Secret { .. })
        ));
    }
}
