use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::RiskLevel;
use crate::processor::{detect_kind, pdf, DocumentKind};

/// Software names that indicate a raster editor touched the file.
pub const EDITOR_SIGNATURES: &[&str] = &["photoshop", "gimp", "paint", "pixelmator", "affinity"];

pub const EDITED_INDICATOR: &str = "Document edited with image editing software";
pub const MISSING_TIMESTAMP_INDICATOR: &str = "Missing creation timestamp";
pub const UNREADABLE_INDICATOR: &str = "Unable to extract metadata";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFinding {
    pub indicators: Vec<String>,
    pub metadata_available: bool,
    pub risk_level: RiskLevel,
}

impl MetadataFinding {
    fn from_indicators(indicators: Vec<String>, metadata_available: bool) -> Self {
        let risk_level = match indicators.len() {
            0 => RiskLevel::Low,
            1 => RiskLevel::Medium,
            _ => RiskLevel::High,
        };
        Self {
            indicators,
            metadata_available,
            risk_level,
        }
    }

    fn unreadable() -> Self {
        Self::from_indicators(vec![UNREADABLE_INDICATOR.to_string()], false)
    }
}

pub fn is_editor_signature(software: &str) -> bool {
    let lower = software.to_lowercase();
    EDITOR_SIGNATURES.iter().any(|editor| lower.contains(editor))
}

/// Reads the file and inspects its embedded metadata. A file that cannot
/// be read or recognized is itself an indicator.
pub fn inspect_path(path: &Path) -> MetadataFinding {
    match std::fs::read(path) {
        Ok(bytes) => {
            let filename = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            inspect_bytes(filename, &bytes)
        }
        Err(e) => {
            tracing::warn!(
                "Could not read {} for metadata analysis: {}",
                crate::sanitize::redact_path(path),
                e
            );
            MetadataFinding::unreadable()
        }
    }
}

pub fn inspect_bytes(filename: &str, bytes: &[u8]) -> MetadataFinding {
    let entries = match detect_kind(filename, bytes) {
        Ok(DocumentKind::Pdf) => match pdf::load(bytes) {
            Ok(doc) => pdf_entries(&doc),
            Err(e) => {
                tracing::warn!("Could not read PDF metadata: {}", e);
                return MetadataFinding::unreadable();
            }
        },
        Ok(DocumentKind::Raster(_)) => exif_entries(bytes),
        Err(e) => {
            tracing::warn!("Could not analyze metadata: {}", e);
            return MetadataFinding::unreadable();
        }
    };

    let mut indicators = Vec::new();
    if entries
        .get("software")
        .is_some_and(|software| is_editor_signature(software))
    {
        indicators.push(EDITED_INDICATOR.to_string());
    }
    if !entries.contains_key("created") {
        indicators.push(MISSING_TIMESTAMP_INDICATOR.to_string());
    }

    tracing::debug!(entries = entries.len(), indicators = indicators.len(), "Metadata inspected");
    MetadataFinding::from_indicators(indicators, !entries.is_empty())
}

/// `software` joins Producer and Creator; `created` is CreationDate.
fn pdf_entries(doc: &lopdf::Document) -> BTreeMap<&'static str, String> {
    let mut entries = BTreeMap::new();
    let Some(info) = pdf::read_info(doc) else {
        return entries;
    };

    let software: Vec<String> = [info.producer, info.creator]
        .into_iter()
        .flatten()
        .filter(|s| !s.trim().is_empty())
        .collect();
    if !software.is_empty() {
        entries.insert("software", software.join(" / "));
    }
    if let Some(created) = info.creation_date.filter(|s| !s.trim().is_empty()) {
        entries.insert("created", created);
    }
    if let Some(modified) = info.mod_date.filter(|s| !s.trim().is_empty()) {
        entries.insert("modified", modified);
    }
    entries
}

/// Missing EXIF is not an error: the map is simply empty.
fn exif_entries(bytes: &[u8]) -> BTreeMap<&'static str, String> {
    let mut entries = BTreeMap::new();
    let mut cursor = Cursor::new(bytes);
    let exif = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(exif) => exif,
        Err(e) => {
            tracing::debug!("No EXIF data: {}", e);
            return entries;
        }
    };

    if let Some(field) = exif.get_field(exif::Tag::Software, exif::In::PRIMARY) {
        entries.insert("software", field.display_value().to_string());
    }
    if let Some(field) = exif.get_field(exif::Tag::DateTime, exif::In::PRIMARY) {
        entries.insert("created", field.display_value().to_string());
    }
    entries
}
