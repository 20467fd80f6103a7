use std::time::Duration;

use base64::Engine as _;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::{resolve_api_key, ExtractionConfig};
use crate::error::{DocrouteError, ProcessError};
use crate::processor::Bitmap;

/// One call to the extraction service. The prompt already embeds any
/// document text; `images` is empty for text-only requests.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionRequest<'a> {
    pub prompt: &'a str,
    pub images: &'a [Bitmap],
}

impl<'a> ExtractionRequest<'a> {
    pub fn text(prompt: &'a str) -> Self {
        Self {
            prompt,
            images: &[],
        }
    }

    pub fn vision(prompt: &'a str, images: &'a [Bitmap]) -> Self {
        Self { prompt, images }
    }
}

/// Text- and vision-capable structured extraction backend. Implementations
/// return the raw payload; parsing happens in the dispatcher.
pub trait ExtractionService: Send + Sync {
    fn extract_text(&self, request: &ExtractionRequest<'_>) -> Result<String, ProcessError>;
    fn extract_vision(&self, request: &ExtractionRequest<'_>) -> Result<String, ProcessError>;
}

/// Client for a `generateContent`-style JSON API.
pub struct HttpExtractionService {
    endpoint: String,
    model: String,
    api_key: SecretString,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl HttpExtractionService {
    pub fn new(config: &ExtractionConfig, api_key: SecretString) -> Result<Self, ProcessError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProcessError::ServiceRequest(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            client,
            timeout_secs: config.timeout_secs,
        })
    }

    /// Resolves the API key from the config and builds the client.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, DocrouteError> {
        let api_key = resolve_api_key(config)?;
        Ok(Self::new(config, api_key)?)
    }

    fn generate(&self, request: &ExtractionRequest<'_>) -> Result<String, ProcessError> {
        let url = format!("{}/models/{}:generateContent", self.endpoint, self.model);
        let body = GenerateRequest {
            contents: vec![Content {
                parts: build_parts(request)?,
            }],
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_connect() {
                    ProcessError::ServiceRequest(format!("Cannot connect to {}", self.endpoint))
                } else if e.is_timeout() {
                    ProcessError::ServiceRequest(format!(
                        "Request timed out after {}s",
                        self.timeout_secs
                    ))
                } else {
                    ProcessError::ServiceRequest(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ProcessError::ServiceRequest(format!(
                "HTTP {}: {}",
                status.as_u16(),
                crate::sanitize::truncate_chars(&body, 200)
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .map_err(|e| ProcessError::MalformedResponse(e.to_string()))?;

        parsed.into_text()
    }
}

impl ExtractionService for HttpExtractionService {
    fn extract_text(&self, request: &ExtractionRequest<'_>) -> Result<String, ProcessError> {
        tracing::debug!(model = %self.model, "Sending text extraction request");
        self.generate(request)
    }

    fn extract_vision(&self, request: &ExtractionRequest<'_>) -> Result<String, ProcessError> {
        tracing::debug!(
            model = %self.model,
            images = request.images.len(),
            "Sending vision extraction request"
        );
        self.generate(request)
    }
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize, Debug, PartialEq)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    Image { inline_data: InlineData },
}

#[derive(Serialize, Debug, PartialEq)]
struct InlineData {
    mime_type: &'static str,
    data: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateResponse {
    fn into_text(self) -> Result<String, ProcessError> {
        let text: String = self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ProcessError::MalformedResponse(
                "service returned no text candidates".to_string(),
            ));
        }
        Ok(text)
    }
}

/// Prompt first, then each page as an inline base64 PNG, in order.
fn build_parts(request: &ExtractionRequest<'_>) -> Result<Vec<Part>, ProcessError> {
    let mut parts = Vec::with_capacity(request.images.len() + 1);
    parts.push(Part::Text {
        text: request.prompt.to_string(),
    });
    for image in request.images {
        let png = crate::processor::image::encode_png(image)?;
        parts.push(Part::Image {
            inline_data: InlineData {
                mime_type: "image/png",
                data: base64::engine::general_purpose::STANDARD.encode(png),
            },
        });
    }
    Ok(parts)
}
