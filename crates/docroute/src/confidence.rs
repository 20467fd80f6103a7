//! Normalizes confidence values to a single `f64` in `[0, 1]`.
//!
//! Services report confidence as numbers on a 0-1 or 0-100 scale, numeric
//! strings, or textual labels. Everything downstream only sees floats.

use serde_json::Value;

/// Textual confidence labels and their scores.
pub const LABEL_SCORES: &[(&str, f64)] = &[
    ("very high", 0.95),
    ("high", 0.9),
    ("medium", 0.7),
    ("low", 0.5),
    ("very low", 0.3),
];

/// Maps a label such as `"High"` or `"very_low"` to its score.
pub fn label_score(label: &str) -> Option<f64> {
    let normalized = label
        .trim()
        .to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    LABEL_SCORES
        .iter()
        .find(|(name, _)| *name == normalized)
        .map(|(_, score)| *score)
}

/// Parses `"0.85"`, `"85%"`, `"85"` or a label.
pub fn parse_confidence(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(pct) = trimmed.strip_suffix('%') {
        return pct.trim().parse::<f64>().ok().and_then(|v| scale(v / 100.0));
    }
    match trimmed.parse::<f64>() {
        Ok(v) => scale(v),
        Err(_) => label_score(trimmed),
    }
}

/// Accepts a JSON number or string.
pub fn from_json(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().and_then(scale),
        Value::String(s) => parse_confidence(s),
        _ => None,
    }
}

/// Values above 1 are read as percentages.
fn scale(value: f64) -> Option<f64> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    let value = if value > 1.0 { value / 100.0 } else { value };
    (value <= 1.0).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_label_scores() {
        assert_eq!(label_score("high"), Some(0.9));
        assert_eq!(label_score("Medium"), Some(0.7));
        assert_eq!(label_score("low"), Some(0.5));
        assert_eq!(label_score("Very High"), Some(0.95));
        assert_eq!(label_score("very_low"), Some(0.3));
        assert_eq!(label_score("  very   low "), Some(0.3));
        assert_eq!(label_score("certain"), None);
    }

    #[test]
    fn test_parse_numeric_and_percent() {
        assert_eq!(parse_confidence("0.70"), Some(0.7));
        assert_eq!(parse_confidence("85%"), Some(0.85));
        assert_eq!(parse_confidence("92"), Some(0.92));
        assert_eq!(parse_confidence("1"), Some(1.0));
        assert_eq!(parse_confidence("250"), None);
        assert_eq!(parse_confidence("-0.2"), None);
        assert_eq!(parse_confidence(""), None);
    }

    #[test]
    fn test_from_json() {
        assert_eq!(from_json(&json!(0.95)), Some(0.95));
        assert_eq!(from_json(&json!("high")), Some(0.9));
        assert_eq!(from_json(&json!(null)), None);
        assert_eq!(from_json(&json!(true)), None);
    }
}
