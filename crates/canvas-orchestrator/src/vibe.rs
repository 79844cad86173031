//! Mood artwork generation driven by the complexity score.

use canvas_genai::{GenerationRequest, SharedClient};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::complexity::{select_style, ComplexityScore, StyleDirection};
use crate::error::{CanvasError, Result};
use crate::prompts::vibe_instruction;

/// Prompt text and image reference for one vibe generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VibeArtifact {
    /// Image prompt returned by the service, trimmed.
    pub prompt: String,
    /// Image reference derived from the style keyword.
    pub image_url: String,
    /// Style the prompt was requested in.
    pub style: StyleDirection,
    /// Score the style was selected from.
    pub score: ComplexityScore,
    /// Source revision this artifact was generated for.
    #[serde(default)]
    pub source_revision: u64,
    /// When the artifact was produced.
    pub created_at: DateTime<Utc>,
}

/// Issues the single vibe request.
#[derive(Debug, Clone)]
pub struct VibeOrchestrator {
    client: SharedClient,
    model: String,
    image_base_url: String,
}

impl VibeOrchestrator {
    /// Creates an orchestrator for the given model and image base URL.
    #[must_use]
    pub fn new(
        client: SharedClient,
        model: impl Into<String>,
        image_base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            image_base_url: image_base_url.into(),
        }
    }

    /// Builds the image reference for a style at the given time.
    #[must_use]
    pub fn image_url(&self, style: StyleDirection, at: DateTime<Utc>) -> String {
        format!(
            "{}?{}&t={}",
            self.image_base_url,
            style.image_keyword(),
            at.timestamp_millis()
        )
    }

    /// Generates an image prompt for `code` styled by `score`.
    ///
    /// Results are never cached; every call queries the service.
    ///
    /// # Errors
    ///
    /// Returns `CanvasError::EmptySource` for blank code, or the classified
    /// service error.
    #[instrument(skip(self, code), fields(model = %self.model, score = score.value()))]
    pub async fn generate_vibe(&self, code: &str, score: ComplexityScore) -> Result<VibeArtifact> {
        if code.trim().is_empty() {
            return Err(CanvasError::EmptySource);
        }

        let style = select_style(score);
        let request = GenerationRequest::new(&self.model, code)
            .with_system_instruction(vibe_instruction(score, style));

        let text = self.client.generate(&request).await?;
        let now = Utc::now();

        info!(?style, "Vibe prompt generated");
        Ok(VibeArtifact {
            prompt: text.trim().to_string(),
            image_url: self.image_url(style, now),
            style,
            score,
            source_revision: 0,
            created_at: now,
        })
    }
}
