//! Gemini `generateContent` client.
//!
//! This module provides [`GeminiClient`], the production implementation of
//! [`GenerationClient`]. Each request is a single
//! `POST {base_url}/models/{model}:generateContent` call authenticated with
//! the `x-goog-api-key` header.

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::{Credential, GenAiError, GenerationClient, GenerationRequest};

/// Default REST base URL for the Gemini API.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Maximum number of characters of a raw error body kept in an error message.
const MAX_ERROR_BODY_CHARS: usize = 200;

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

fn build_body(request: &GenerationRequest) -> GenerateContentBody<'_> {
    GenerateContentBody {
        system_instruction: request.system_instruction.as_deref().map(|text| Content {
            role: None,
            parts: vec![Part { text }],
        }),
        contents: vec![Content {
            role: Some("user"),
            parts: vec![Part {
                text: &request.prompt,
            }],
        }],
        generation_config: request
            .format
            .mime_type()
            .map(|response_mime_type| GenerationConfig { response_mime_type }),
    }
}

/// Concatenates the text parts of the first candidate.
fn extract_text(response: GenerateContentResponse) -> Result<String, GenAiError> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        return Err(GenAiError::EmptyResponse);
    }
    Ok(text)
}

/// Pulls the service's error message out of a failed response body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body).map_or_else(
        |_| body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
        |envelope| envelope.error.message,
    )
}

// ============================================================================
// Client
// ============================================================================

/// Generation client backed by the Gemini REST API.
///
/// The credential is held behind a lock so that the settings path can
/// replace it while requests are in flight.
#[derive(Debug)]
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    credential: RwLock<Option<Credential>>,
}

impl GeminiClient {
    /// Creates a client for the given base URL with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`GenAiError::Network`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, GenAiError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenAiError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credential: RwLock::new(None),
        })
    }

    /// Returns the `generateContent` URL for a model.
    #[must_use]
    pub fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{model}:generateContent", self.base_url)
    }

    fn current_credential(&self) -> Option<Credential> {
        self.credential
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl GenerationClient for GeminiClient {
    #[instrument(skip(self, request), fields(model = %request.model, format = ?request.format))]
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenAiError> {
        let credential = self
            .current_credential()
            .ok_or(GenAiError::MissingCredential)?;

        debug!(prompt_len = request.prompt.len(), "Sending generation request");

        let response = self
            .http
            .post(self.endpoint(&request.model))
            .header("x-goog-api-key", credential.expose())
            .json(&build_body(request))
            .send()
            .await
            .map_err(|e| GenAiError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GenAiError::Network(e.to_string()))?;

        if !status.is_success() {
            let message = error_message(&body);
            warn!(status = status.as_u16(), %message, "Generation request failed");
            return Err(GenAiError::api(status.as_u16(), message));
        }

        let parsed: GenerateContentResponse =
            serde_json::from_str(&body).map_err(|e| GenAiError::Decode(e.to_string()))?;
        let text = extract_text(parsed)?;

        debug!(response_len = text.len(), "Generation request succeeded");
        Ok(text)
    }

    fn install_credential(&self, credential: Credential) {
        *self
            .credential
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(credential);
        info!("API key installed in generation client");
    }

    fn has_credential(&self) -> bool {
        self.credential
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ResponseFormat;

    fn client() -> GeminiClient {
        GeminiClient::new(DEFAULT_BASE_URL, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn endpoint_joins_model() {
        let client = GeminiClient::new("http://localhost:9999/v1beta/", Duration::from_secs(1))
            .unwrap();
        assert_eq!(
            client.endpoint("gemini-3-flash-preview"),
            "http://localhost:9999/v1beta/models/gemini-3-flash-preview:generateContent"
        );
    }

    #[test]
    fn text_request_body_shape() {
        let request = GenerationRequest::new("m", "fn main() {}").with_system_instruction("draw");
        let json = serde_json::to_value(build_body(&request)).unwrap();

        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "draw");
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "fn main() {}");
        assert!(json.get("generationConfig").is_none());
    }

    #[test]
    fn json_request_sets_mime_type() {
        let request = GenerationRequest::new("m", "code").with_format(ResponseFormat::Json);
        let json = serde_json::to_value(build_body(&request)).unwrap();

        assert!(json.get("systemInstruction").is_none());
        assert_eq!(
            json["generationConfig"]["responseMimeType"],
            "application/json"
        );
    }

    #[test]
    fn extract_text_concatenates_parts() {
        let response: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"graph TD\n"},{"text":"A-->B"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(response).unwrap(), "graph TD\nA-->B");
    }

    #[test]
    fn extract_text_rejects_empty_candidates() {
        let response: GenerateContentResponse = serde_json::from_str(r"{}").unwrap();
        assert!(matches!(
            extract_text(response),
            Err(GenAiError::EmptyResponse)
        ));
    }

    #[test]
    fn error_message_prefers_envelope() {
        let body = r#"{"error":{"code":403,"message":"API key not valid","status":"PERMISSION_DENIED"}}"#;
        assert_eq!(error_message(body), "API key not valid");
        assert_eq!(error_message("upstream exploded"), "upstream exploded");
    }

    #[test]
    fn generate_without_credential_fails_fast() {
        let client = client();
        assert!(!client.has_credential());

        let request = GenerationRequest::new("m", "code");
        let result = tokio_test::block_on(client.generate(&request));
        assert!(matches!(result, Err(GenAiError::MissingCredential)));
    }

    #[test]
    fn install_credential_replaces_previous() {
        let client = client();
        client.install_credential(Credential::parse("AIzaFirst").unwrap());
        client.install_credential(Credential::parse("AIzaSecond").unwrap());
        assert!(client.has_credential());
        assert_eq!(
            client.current_credential().unwrap().expose(),
            "AIzaSecond"
        );
    }
}
