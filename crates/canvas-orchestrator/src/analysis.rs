//! Concurrent diagram and learning-path generation.
//!
//! [`AnalysisOrchestrator::analyze`] issues the diagram request and the
//! learning-path request as two spawned tasks and waits for both. The outcome
//! is all or nothing: if either request fails, every partial result is
//! dropped and a single classified error is returned.

use canvas_genai::{GenerationRequest, ResponseFormat, SharedClient};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::complexity::{estimate_complexity, ComplexityScore};
use crate::config::UserLevel;
use crate::error::{CanvasError, Result};
use crate::prompts::{learning_path_prompt, ARCHITECT_INSTRUCTION, PROFESSOR_INSTRUCTION};
use crate::sanitize::{parse_learning_path, sanitize_diagram, DiagramDescription, LearningPathRecord};

/// Everything produced by one successful analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Sanitized Mermaid diagram.
    pub diagram: DiagramDescription,
    /// Score derived from the diagram.
    pub complexity_score: ComplexityScore,
    /// Parsed learning path.
    pub learning_path: LearningPathRecord,
}

/// Runs the two analysis requests against the shared client.
#[derive(Debug, Clone)]
pub struct AnalysisOrchestrator {
    client: SharedClient,
    model: String,
    user_level: UserLevel,
}

impl AnalysisOrchestrator {
    /// Creates an orchestrator for the given model and learner level.
    #[must_use]
    pub fn new(client: SharedClient, model: impl Into<String>, user_level: UserLevel) -> Self {
        Self {
            client,
            model: model.into(),
            user_level,
        }
    }

    fn diagram_request(&self, code: &str) -> GenerationRequest {
        GenerationRequest::new(&self.model, code).with_system_instruction(ARCHITECT_INSTRUCTION)
    }

    fn learning_path_request(&self, code: &str) -> GenerationRequest {
        GenerationRequest::new(&self.model, learning_path_prompt(code, self.user_level))
            .with_system_instruction(PROFESSOR_INSTRUCTION)
            .with_format(ResponseFormat::Json)
    }

    /// Analyzes `code`, returning the diagram, score and learning path.
    ///
    /// # Errors
    ///
    /// Returns `CanvasError::EmptySource` for blank code without calling the
    /// service. Otherwise returns the classified error of the first failing
    /// request, preferring the diagram request when both fail.
    #[instrument(skip(self, code), fields(model = %self.model, code_len = code.len()))]
    pub async fn analyze(&self, code: &str) -> Result<AnalysisResult> {
        if code.trim().is_empty() {
            return Err(CanvasError::EmptySource);
        }

        let diagram_request = self.diagram_request(code);
        let path_request = self.learning_path_request(code);

        let client = SharedClient::clone(&self.client);
        let diagram_task = tokio::spawn(async move { client.generate(&diagram_request).await });
        let client = SharedClient::clone(&self.client);
        let path_task = tokio::spawn(async move { client.generate(&path_request).await });

        debug!("Diagram and learning-path requests in flight");
        let (diagram, path) = tokio::join!(diagram_task, path_task);

        let diagram = settle(diagram);
        let path = settle(path);
        let outcome = combine(diagram, path);

        match &outcome {
            Ok(result) => info!(
                score = result.complexity_score.value(),
                modules = result.learning_path.modules.len(),
                "Analysis complete"
            ),
            Err(e) => warn!(kind = %e.kind(), error = %e, "Analysis failed"),
        }
        outcome
    }
}

/// Flattens a joined task result into the orchestrator's error space.
fn settle(
    joined: std::result::Result<
        std::result::Result<String, canvas_genai::GenAiError>,
        tokio::task::JoinError,
    >,
) -> Result<String> {
    match joined {
        Ok(response) => response.map_err(CanvasError::from),
        Err(e) => Err(CanvasError::transport(format!("generation task failed: {e}"))),
    }
}

/// Combines the two settled responses into one outcome.
///
/// Both must succeed; the diagram's error is reported when both fail.
///
/// # Errors
///
/// Returns the first failure, or `CanvasError::MalformedResponse` if the
/// learning-path text is not valid JSON.
pub fn combine(diagram: Result<String>, learning_path: Result<String>) -> Result<AnalysisResult> {
    let diagram_raw = diagram?;
    let path_raw = learning_path?;

    let diagram = sanitize_diagram(&diagram_raw);
    let complexity_score = estimate_complexity(&diagram);
    let learning_path = parse_learning_path(&path_raw)?;

    Ok(AnalysisResult {
        diagram,
        complexity_score,
        learning_path,
    })
}
