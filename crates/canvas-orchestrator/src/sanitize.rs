//! Cleanup and parsing of raw generation output.
//!
//! Diagram text is stripped of markdown code fences. Learning-path output is
//! parsed as strict JSON into [`LearningPathRecord`].

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CanvasError, Result};

/// Lowest accepted difficulty rating.
pub const MIN_DIFFICULTY: u8 = 1;

/// Highest accepted difficulty rating.
pub const MAX_DIFFICULTY: u8 = 5;

const MERMAID_FENCE: &str = "```mermaid";
const FENCE: &str = "```";

// ============================================================================
// Diagram
// ============================================================================

/// Mermaid diagram text with fence markers removed.
///
/// The text may still be empty or syntactically invalid Mermaid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiagramDescription(String);

impl DiagramDescription {
    /// Returns the diagram text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if there is no diagram text.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for DiagramDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Removes every "```mermaid" and "```" marker, then trims the result.
///
/// # Examples
///
/// ```
/// use canvas_orchestrator::sanitize::sanitize_diagram;
///
/// let diagram = sanitize_diagram("```mermaid\ngraph TD\nA-->B\n```\n");
/// assert_eq!(diagram.as_str(), "graph TD\nA-->B");
/// ```
#[must_use]
pub fn sanitize_diagram(raw: &str) -> DiagramDescription {
    let cleaned = raw.replace(MERMAID_FENCE, "").replace(FENCE, "");
    DiagramDescription(cleaned.trim().to_string())
}

// ============================================================================
// Learning path
// ============================================================================

/// One lesson of a learning path with its quiz.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    /// Lesson title.
    pub title: String,

    /// Lesson body in markdown.
    pub description: String,

    /// Quiz question for the lesson.
    pub quiz_question: String,

    /// Answer options, in display order.
    pub options: Vec<String>,

    /// Zero-based index of the correct option. May be out of range.
    pub correct_answer: i64,
}

impl Module {
    /// Returns the correct option, or `None` if the index is out of range.
    #[must_use]
    pub fn correct_option(&self) -> Option<&str> {
        usize::try_from(self.correct_answer)
            .ok()
            .and_then(|i| self.options.get(i))
            .map(String::as_str)
    }

    /// Returns `true` if `selected` is the correct option.
    ///
    /// Always `false` when the correct index is out of range.
    #[must_use]
    pub fn is_correct(&self, selected: usize) -> bool {
        self.correct_option().is_some()
            && usize::try_from(self.correct_answer).is_ok_and(|i| i == selected)
    }
}

/// Structured course generated for the current source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningPathRecord {
    /// Course title.
    pub title: String,

    /// Short course summary.
    pub summary: String,

    /// Ordered lessons.
    pub modules: Vec<Module>,

    /// Difficulty from 1 (easy) to 5 (hard).
    pub difficulty_rating: u8,
}

#[derive(Debug, Deserialize)]
struct RawLearningPath {
    title: String,
    summary: String,
    modules: Vec<Module>,
    difficulty_rating: i64,
}

fn clamp_difficulty(rating: i64) -> u8 {
    let clamped = rating.clamp(i64::from(MIN_DIFFICULTY), i64::from(MAX_DIFFICULTY));
    if clamped != rating {
        warn!(rating, clamped, "difficulty_rating out of range, clamping");
    }
    u8::try_from(clamped).unwrap_or(MAX_DIFFICULTY)
}

/// Parses the learning-path JSON returned by the generation service.
///
/// Surrounding whitespace is ignored. Module order and count are preserved.
///
/// # Errors
///
/// Returns `CanvasError::MalformedResponse` if the text is not JSON or a
/// required field is missing or mistyped.
pub fn parse_learning_path(raw: &str) -> Result<LearningPathRecord> {
    let parsed: RawLearningPath = serde_json::from_str(raw.trim())
        .map_err(|e| CanvasError::malformed(format!("learning path: {e}")))?;

    Ok(LearningPathRecord {
        title: parsed.title,
        summary: parsed.summary,
        modules: parsed.modules,
        difficulty_rating: clamp_difficulty(parsed.difficulty_rating),
    })
}
