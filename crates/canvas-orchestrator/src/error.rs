//! Error types for the Code Canvas orchestrator.
//!
//! This module defines the error hierarchy for all orchestrator operations,
//! including configuration loading, generation calls, response parsing,
//! diagram rendering, and source intake. Every generation failure is
//! classified into the taxonomy here before it reaches a user.

use std::path::PathBuf;

use canvas_genai::GenAiError;
use serde::{Deserialize, Serialize};

/// A specialized `Result` type for Code Canvas orchestrator operations.
pub type Result<T> = std::result::Result<T, CanvasError>;

/// Number of characters of a transport diagnostic shown to the user.
const TRANSPORT_DIAGNOSTIC_CHARS: usize = 50;

/// Errors that can occur while serving a Code Canvas session.
///
/// Error variants are organized by subsystem and include actionable suggestions
/// where possible to help users resolve issues.
#[derive(Debug, thiserror::Error)]
pub enum CanvasError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your canvas.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Generation Errors
    // ========================================================================
    /// The credential is missing or was rejected by the service.
    #[error("Authentication failed: {message}\n\nSuggestion: Save a valid API key in Settings")]
    Authentication {
        /// Diagnostic from the service or client.
        message: String,
    },

    /// The requested model or resource is unavailable.
    #[error("Model or resource not found: {message}\n\nSuggestion: Try again later")]
    NotFound {
        /// Diagnostic from the service.
        message: String,
    },

    /// A successful call returned data that does not match the expected shape.
    #[error("Malformed response from generation service: {message}")]
    MalformedResponse {
        /// Description of the parse failure.
        message: String,
    },

    /// Generic network or service failure.
    #[error("Generation service error: {message}")]
    Transport {
        /// Diagnostic from the client or service.
        message: String,
    },

    // ========================================================================
    // Rendering Errors
    // ========================================================================
    /// The diagram text could not be rendered as a graphic.
    #[error("Failed to render diagram: {message}")]
    Render {
        /// Diagnostic from the renderer.
        message: String,
    },

    // ========================================================================
    // Source Intake Errors
    // ========================================================================
    /// An uploaded file has an extension outside the allow-list.
    #[error("Invalid file type: '{file_name}'\n\nSuggestion: Upload one of: {accepted}")]
    Validation {
        /// Name of the rejected file.
        file_name: String,
        /// Comma-separated list of accepted extensions.
        accepted: String,
    },

    /// An action that needs source code was requested with none loaded.
    #[error("No source code loaded\n\nSuggestion: Paste or upload code first")]
    EmptySource,

    /// An analysis was requested while another one is still running.
    #[error("An analysis is already running\n\nSuggestion: Wait for it to finish")]
    AnalysisInProgress,

    /// A quiz answer referenced a module or option that does not exist.
    #[error("No quiz {what} at index {index}")]
    QuizIndex {
        /// Either "module" or "option".
        what: &'static str,
        /// The rejected index.
        index: usize,
    },

    // ========================================================================
    // Credential Errors
    // ========================================================================
    /// A credential failed the prefix check.
    #[error("Invalid API Key format. Starts with '{}'", canvas_genai::CREDENTIAL_PREFIX)]
    InvalidCredential,

    /// The credential file could not be read or written.
    #[error("Credential store error at '{path}': {message}\n\nSuggestion: Check permissions on the credentials file")]
    CredentialStore {
        /// Path to the credentials file.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    // ========================================================================
    // General I/O Errors
    // ========================================================================
    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serializable category of a [`CanvasError`], reported alongside messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or rejected credential.
    Authentication,
    /// Model or resource unavailable.
    NotFound,
    /// Structured-data parse failure.
    MalformedResponse,
    /// Network or generic service failure.
    Transport,
    /// Diagram render failure.
    Render,
    /// Rejected upload.
    Validation,
    /// No source code loaded.
    EmptySource,
    /// Request conflicts with the current session state.
    Conflict,
    /// Credential failed the prefix check.
    InvalidCredential,
    /// Configuration problem.
    Configuration,
    /// Local storage or serialization problem.
    Storage,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::NotFound => write!(f, "not_found"),
            Self::MalformedResponse => write!(f, "malformed_response"),
            Self::Transport => write!(f, "transport"),
            Self::Render => write!(f, "render"),
            Self::Validation => write!(f, "validation"),
            Self::EmptySource => write!(f, "empty_source"),
            Self::Conflict => write!(f, "conflict"),
            Self::InvalidCredential => write!(f, "invalid_credential"),
            Self::Configuration => write!(f, "configuration"),
            Self::Storage => write!(f, "storage"),
        }
    }
}

impl From<GenAiError> for CanvasError {
    /// Classifies a generation-client failure into the user-facing taxonomy.
    fn from(err: GenAiError) -> Self {
        if err.is_authentication() {
            return Self::authentication(err.to_string());
        }
        if err.is_not_found() {
            return Self::not_found(err.to_string());
        }
        match err {
            GenAiError::Decode(message) => Self::malformed(message),
            other => Self::transport(other.to_string()),
        }
    }
}

impl CanvasError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `Authentication` error.
    #[must_use]
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates a new `MalformedResponse` error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }

    /// Creates a new `Transport` error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a new `Render` error.
    #[must_use]
    pub fn render(message: impl Into<String>) -> Self {
        Self::Render {
            message: message.into(),
        }
    }

    /// Creates a new `Validation` error for a rejected upload.
    #[must_use]
    pub fn validation(file_name: impl Into<String>, accepted: &[&str]) -> Self {
        Self::Validation {
            file_name: file_name.into(),
            accepted: accepted.join(", "),
        }
    }

    /// Creates a new `CredentialStore` error.
    #[must_use]
    pub fn credential_store(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::CredentialStore {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns the serializable category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ConfigParseError { .. } | Self::ConfigValidationError { .. } => {
                ErrorKind::Configuration
            }
            Self::Authentication { .. } => ErrorKind::Authentication,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Render { .. } => ErrorKind::Render,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::EmptySource => ErrorKind::EmptySource,
            Self::AnalysisInProgress | Self::QuizIndex { .. } => ErrorKind::Conflict,
            Self::InvalidCredential => ErrorKind::InvalidCredential,
            Self::CredentialStore { .. } | Self::Io(_) | Self::Json(_) => ErrorKind::Storage,
        }
    }

    /// Returns the message shown to the user for this error.
    ///
    /// Generation failures use short fixed messages; transport failures carry
    /// a truncated diagnostic.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Authentication { .. } => "Invalid API Key. Please check your settings.".into(),
            Self::NotFound { .. } => "Model not found. Please try again later.".into(),
            Self::Transport { message } => {
                let diagnostic: String = message.chars().take(TRANSPORT_DIAGNOSTIC_CHARS).collect();
                format!("AI Service Error: {diagnostic}...")
            }
            Self::MalformedResponse { .. } => {
                "The AI service returned an unexpected response. Please try again.".into()
            }
            Self::Validation { accepted, .. } => format!("Invalid file type. Accepted: {accepted}"),
            other => other.to_string(),
        }
    }

    /// Returns `true` if this error comes from the generation service boundary.
    #[must_use]
    pub const fn is_generation_failure(&self) -> bool {
        matches!(
            self,
            Self::Authentication { .. }
                | Self::NotFound { .. }
                | Self::MalformedResponse { .. }
                | Self::Transport { .. }
        )
    }
}
