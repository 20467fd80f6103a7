//! Helpers for sanitizing data before it enters tracing span attributes.
//!
//! Storage references and temp paths can carry owner names, so spans only
//! ever see the last path component or a short digest prefix.

use std::path::Path;

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Returns the last segment of a `/`-separated object reference.
pub fn redact_ref(file_ref: &str) -> String {
    file_ref
        .rsplit(['/', '\\'])
        .find(|s| !s.is_empty())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Shortens a hex digest to a 12-char prefix for log correlation.
pub fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

/// Truncates a value to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((idx, _)) => value[..idx].to_string(),
        None => value.to_string(),
    }
}
