//! Parsing of the extraction service's structured payload.

use serde_json::{Map, Value};

use crate::confidence;
use crate::error::ProcessError;

/// One `{key, value}` pair as returned by the service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServicePair {
    pub key: String,
    pub value: String,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceResponse {
    pub document_type: String,
    /// `None` when the service did not report a usable confidence.
    pub confidence: Option<f64>,
    pub pairs: Vec<ServicePair>,
    pub summary: String,
}

/// Removes a surrounding Markdown code fence (```` ``` ```` or
/// ```` ```json ````).
pub fn strip_code_fences(raw: &str) -> &str {
    let mut body = raw.trim();
    if let Some(rest) = body.strip_prefix("```") {
        body = match rest.find('\n') {
            Some(idx) if !rest[..idx].trim_start().starts_with('{') => &rest[idx + 1..],
            _ => rest.trim_start_matches("json"),
        };
    }
    if let Some(rest) = body.trim_end().strip_suffix("```") {
        body = rest;
    }
    body.trim()
}

/// Parses a service payload. Anything that is not a JSON object with an
/// `extracted_data` (or `fields`) array is rejected.
pub fn parse_service_response(raw: &str) -> Result<ServiceResponse, ProcessError> {
    let body = strip_code_fences(raw);
    let value = parse_json_object(body)?;

    let object = value.as_object().ok_or_else(|| {
        ProcessError::MalformedResponse(format!("expected a JSON object, got: {}", preview(body)))
    })?;

    let items = object
        .get("extracted_data")
        .or_else(|| object.get("fields"))
        .ok_or_else(|| ProcessError::MalformedResponse("missing 'extracted_data'".to_string()))?
        .as_array()
        .ok_or_else(|| {
            ProcessError::MalformedResponse("'extracted_data' is not an array".to_string())
        })?;

    let pairs = items.iter().filter_map(parse_pair).collect();

    Ok(ServiceResponse {
        document_type: string_field(object, "document_type")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "Unknown".to_string()),
        confidence: object.get("confidence").and_then(confidence::from_json),
        pairs,
        summary: string_field(object, "summary").unwrap_or_default(),
    })
}

/// Falls back to the outermost `{ ... }` when the model wrapped the object
/// in prose.
fn parse_json_object(body: &str) -> Result<Value, ProcessError> {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => Ok(value),
        Err(first_err) => {
            let inner = match (body.find('{'), body.rfind('}')) {
                (Some(start), Some(end)) if start < end => &body[start..=end],
                _ => {
                    return Err(ProcessError::MalformedResponse(format!(
                        "{} in: {}",
                        first_err,
                        preview(body)
                    )))
                }
            };
            serde_json::from_str::<Value>(inner).map_err(|_| {
                ProcessError::MalformedResponse(format!("{} in: {}", first_err, preview(body)))
            })
        }
    }
}

fn parse_pair(item: &Value) -> Option<ServicePair> {
    let Some(obj) = item.as_object() else {
        tracing::debug!("Ignoring non-object entry in extracted_data");
        return None;
    };

    let key = value_to_string(obj.get("key")?).trim().to_string();
    if key.is_empty() {
        return None;
    }

    Some(ServicePair {
        key,
        value: obj.get("value").map(value_to_string).unwrap_or_default(),
        confidence: obj.get("confidence").and_then(confidence::from_json),
    })
}

fn string_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    object.get(key).map(|v| value_to_string(v).trim().to_string())
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn preview(body: &str) -> String {
    crate::sanitize::truncate_chars(body, 120)
}
