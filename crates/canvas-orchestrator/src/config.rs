//! Configuration types for the Code Canvas server.
//!
//! This module provides the configuration structures that control model
//! selection, the generation endpoint, credential storage and the external
//! diagram renderer.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CanvasError, Result};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "canvas.json";

/// Default model for the diagram and learning-path requests.
fn default_analysis_model() -> String {
    "gemini-3-pro-preview".to_string()
}

/// Default model for the vibe request.
fn default_vibe_model() -> String {
    "gemini-3-flash-preview".to_string()
}

/// Default generation API base URL.
fn default_api_base_url() -> String {
    canvas_genai::gemini::DEFAULT_BASE_URL.to_string()
}

/// Default per-request timeout in seconds.
const fn default_request_timeout() -> u64 {
    120
}

/// Default credential file path.
fn default_credentials_file() -> String {
    ".code-canvas/credentials.json".to_string()
}

/// Default base URL for vibe image references.
fn default_image_base_url() -> String {
    "https://source.unsplash.com/1600x900/".to_string()
}

/// Default Mermaid CLI command.
fn default_renderer_command() -> String {
    "mmdc".to_string()
}

/// Default value for boolean options that default to true.
const fn default_true() -> bool {
    true
}

/// Main configuration for the Code Canvas server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Model used for the diagram and learning-path requests.
    #[serde(default = "default_analysis_model")]
    pub analysis_model: String,

    /// Model used for the vibe prompt request.
    #[serde(default = "default_vibe_model")]
    pub vibe_model: String,

    /// Base URL of the generation REST API.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Learner level sent with the learning-path request.
    #[serde(default)]
    pub user_level: UserLevel,

    /// Timeout for a single generation request in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Path of the JSON file holding the stored API key.
    #[serde(default = "default_credentials_file")]
    pub credentials_file: String,

    /// Base URL for vibe image references.
    #[serde(default = "default_image_base_url")]
    pub image_base_url: String,

    /// External diagram renderer settings.
    #[serde(default)]
    pub renderer: RendererConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            analysis_model: default_analysis_model(),
            vibe_model: default_vibe_model(),
            api_base_url: default_api_base_url(),
            user_level: UserLevel::default(),
            request_timeout_secs: default_request_timeout(),
            credentials_file: default_credentials_file(),
            image_base_url: default_image_base_url(),
            renderer: RendererConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// Looks for `canvas.json` in the current directory. If not found,
    /// returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            CanvasError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from `canvas.json` in a specific directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file path.
    ///
    /// If the file does not exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns `CanvasError::ConfigParseError` if the file exists but contains
    /// invalid JSON or an unknown user level.
    ///
    /// Returns `CanvasError::ConfigValidationError` if the configuration values
    /// are invalid.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(CanvasError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| CanvasError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `CanvasError::ConfigValidationError` if a model name or path is
    /// empty, the timeout is zero, or a URL lacks an http(s) scheme.
    pub fn validate(&self) -> Result<()> {
        if self.analysis_model.trim().is_empty() {
            return Err(CanvasError::config_validation(
                "analysisModel must not be empty",
                "Set analysisModel to a model id such as \"gemini-3-pro-preview\" in your canvas.json",
            ));
        }

        if self.vibe_model.trim().is_empty() {
            return Err(CanvasError::config_validation(
                "vibeModel must not be empty",
                "Set vibeModel to a model id such as \"gemini-3-flash-preview\" in your canvas.json",
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(CanvasError::config_validation(
                "requestTimeoutSecs must be greater than 0",
                "Set requestTimeoutSecs to at least 1 second in your canvas.json",
            ));
        }

        if self.credentials_file.trim().is_empty() {
            return Err(CanvasError::config_validation(
                "credentialsFile must not be empty",
                "Provide a valid credentials file path in your canvas.json",
            ));
        }

        for (field, url) in [
            ("apiBaseUrl", &self.api_base_url),
            ("imageBaseUrl", &self.image_base_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(CanvasError::config_validation(
                    format!("{field} must be an http(s) URL, got '{url}'"),
                    format!("Set {field} to a URL starting with https:// in your canvas.json"),
                ));
            }
        }

        if self.renderer.enabled && self.renderer.command.trim().is_empty() {
            return Err(CanvasError::config_validation(
                "renderer.command must not be empty when the renderer is enabled",
                "Set renderer.command (e.g. \"mmdc\") or renderer.enabled to false in your canvas.json",
            ));
        }

        Ok(())
    }

    /// Returns the per-request timeout as a [`Duration`].
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Learner level sent with the learning-path request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UserLevel {
    /// New to programming.
    Beginner,
    /// Comfortable with the basics (default).
    #[default]
    Intermediate,
    /// Experienced developer.
    Advanced,
}

impl UserLevel {
    /// Parses a string into a `UserLevel`, case-insensitively.
    fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "beginner" => Some(Self::Beginner),
            "intermediate" => Some(Self::Intermediate),
            "advanced" => Some(Self::Advanced),
            _ => None,
        }
    }

    /// Returns the label embedded in the learning-path prompt.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Beginner => "Beginner",
            Self::Intermediate => "Intermediate",
            Self::Advanced => "Advanced",
        }
    }
}

impl std::fmt::Display for UserLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl<'de> Deserialize<'de> for UserLevel {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid user level '{s}': expected one of 'beginner', 'intermediate', 'advanced'"
            ))
        })
    }
}

impl Serialize for UserLevel {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let s = match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        };
        serializer.serialize_str(s)
    }
}

/// External Mermaid renderer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RendererConfig {
    /// Command used to invoke the Mermaid CLI.
    #[serde(default = "default_renderer_command")]
    pub command: String,

    /// When false, every render falls back to the raw diagram text.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            command: default_renderer_command(),
            enabled: default_true(),
        }
    }
}
