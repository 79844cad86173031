//! Code Canvas Generation Client
//!
//! Request/response boundary to the external text-generation service.
//!
//! This crate provides the [`GenerationClient`] trait used by the Code Canvas
//! orchestrators, the [`GeminiClient`] implementation that talks to the
//! Gemini `generateContent` REST endpoint, and a [`mock::ScriptedClient`]
//! that tests substitute for the real service.

pub mod gemini;
pub mod mock;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use gemini::GeminiClient;

/// Required prefix of a Gemini API key.
pub const CREDENTIAL_PREFIX: &str = "AIza";

/// Shared, process-wide handle to a generation client.
pub type SharedClient = Arc<dyn GenerationClient>;

/// Errors that can occur while talking to the generation service.
#[derive(Debug, Error)]
pub enum GenAiError {
    /// No credential has been installed in the client handle.
    #[error("generation client has no API key installed")]
    MissingCredential,

    /// The supplied API key failed the prefix check.
    #[error("invalid API key format: keys start with '{CREDENTIAL_PREFIX}'")]
    InvalidCredential,

    /// The service answered with a non-success HTTP status.
    #[error("generation API returned {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message extracted from the response body.
        message: String,
    },

    /// The request never produced an HTTP response.
    #[error("network error: {0}")]
    Network(String),

    /// The response body could not be decoded.
    #[error("failed to decode generation response: {0}")]
    Decode(String),

    /// The response contained no text candidate.
    #[error("generation response contained no text")]
    EmptyResponse,
}

impl GenAiError {
    /// Creates a new `Api` error.
    #[must_use]
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Returns `true` if the error means the credential was missing or rejected.
    #[must_use]
    pub fn is_authentication(&self) -> bool {
        match self {
            Self::MissingCredential | Self::InvalidCredential => true,
            Self::Api { status, message } => {
                matches!(status, 401 | 403) || (*status == 400 && message.contains("API key"))
            }
            _ => false,
        }
    }

    /// Returns `true` if the error means the model or resource does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }
}

/// A single API key for the generation service.
///
/// The key is validated only by its prefix. `Debug` output is redacted so the
/// key never reaches the logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Parses a raw key, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`GenAiError::InvalidCredential`] if the key does not start
    /// with [`CREDENTIAL_PREFIX`].
    pub fn parse(raw: &str) -> Result<Self, GenAiError> {
        let key = raw.trim();
        if key.starts_with(CREDENTIAL_PREFIX) {
            Ok(Self(key.to_string()))
        } else {
            Err(GenAiError::InvalidCredential)
        }
    }

    /// Returns the raw key.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns a short, non-secret hint for display ("AIza…1234").
    #[must_use]
    pub fn hint(&self) -> String {
        let start = self.0.char_indices().rev().nth(3).map_or(0, |(i, _)| i);
        format!("{CREDENTIAL_PREFIX}…{}", &self.0[start..])
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&"<redacted>").finish()
    }
}

/// The format the service is asked to answer in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    /// Free-form text.
    #[default]
    Text,
    /// Structured JSON.
    Json,
}

impl ResponseFormat {
    /// MIME type hint sent to the service, if any.
    #[must_use]
    pub const fn mime_type(self) -> Option<&'static str> {
        match self {
            Self::Text => None,
            Self::Json => Some("application/json"),
        }
    }
}

/// A single call to the generation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Model identifier (e.g. "gemini-3-pro-preview").
    pub model: String,
    /// Optional request-scoped system instruction.
    pub system_instruction: Option<String>,
    /// Requested response format.
    pub format: ResponseFormat,
    /// Prompt payload.
    pub prompt: String,
}

impl GenerationRequest {
    /// Creates a free-text request for the given model and prompt.
    #[must_use]
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_instruction: None,
            format: ResponseFormat::Text,
            prompt: prompt.into(),
        }
    }

    /// Sets the system instruction.
    #[must_use]
    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    /// Sets the response format.
    #[must_use]
    pub const fn with_format(mut self, format: ResponseFormat) -> Self {
        self.format = format;
        self
    }
}

/// Text-completion service boundary.
///
/// Implementations hold the process-wide credential. Orchestrators only call
/// [`GenerationClient::generate`]; the settings path installs credentials.
#[async_trait]
pub trait GenerationClient: Send + Sync + fmt::Debug {
    /// Sends one request and returns the extracted response text.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenAiError>;

    /// Installs (or replaces) the credential used by subsequent requests.
    fn install_credential(&self, credential: Credential);

    /// Returns `true` once a credential has been installed.
    fn has_credential(&self) -> bool;
}
