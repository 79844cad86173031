//! Heuristic complexity score and the vibe style it selects.

use serde::{Deserialize, Serialize};

use crate::sanitize::DiagramDescription;

/// Highest possible complexity score.
pub const MAX_SCORE: u8 = 100;

/// Scores strictly above this value select [`StyleDirection::HighEnergy`].
pub const STYLE_THRESHOLD: u8 = 50;

const POINTS_PER_LINE: usize = 2;

/// Complexity of a diagram on a 0..=100 scale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComplexityScore(u8);

impl ComplexityScore {
    /// Creates a score, clamping to [`MAX_SCORE`].
    #[must_use]
    pub fn new(value: u8) -> Self {
        Self(value.min(MAX_SCORE))
    }

    /// Returns the numeric score.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }
}

impl std::fmt::Display for ComplexityScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Estimates complexity as two points per diagram line, capped at 100.
///
/// Lines are counted by splitting on `\n`; an empty diagram scores 0.
///
/// # Examples
///
/// ```
/// use canvas_orchestrator::complexity::estimate_complexity;
/// use canvas_orchestrator::sanitize::sanitize_diagram;
///
/// let diagram = sanitize_diagram("graph TD\nA-->B\nB-->C");
/// assert_eq!(estimate_complexity(&diagram).value(), 6);
/// ```
#[must_use]
pub fn estimate_complexity(diagram: &DiagramDescription) -> ComplexityScore {
    if diagram.is_empty() {
        return ComplexityScore(0);
    }
    let lines = diagram.as_str().split('\n').count();
    let points = lines.saturating_mul(POINTS_PER_LINE);
    ComplexityScore(u8::try_from(points.min(usize::from(MAX_SCORE))).unwrap_or(MAX_SCORE))
}

/// Visual mood of the generated artwork.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StyleDirection {
    /// Peaceful, minimal imagery for simple code.
    Calm,
    /// Chaotic, high-contrast imagery for complex code.
    HighEnergy,
}

impl StyleDirection {
    /// Style phrase embedded in the vibe instruction.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Calm => "peaceful, zen garden, minimal, glassmorphism, floating geometry, calm",
            Self::HighEnergy => {
                "chaotic, cyberpunk, glitch art, neon cables, high contrast, stressful"
            }
        }
    }

    /// Keyword used in the image reference query.
    #[must_use]
    pub const fn image_keyword(self) -> &'static str {
        match self {
            Self::Calm => "zen",
            Self::HighEnergy => "cyberpunk",
        }
    }
}

/// Picks the style for a score: above [`STYLE_THRESHOLD`] is high energy.
#[must_use]
pub const fn select_style(score: ComplexityScore) -> StyleDirection {
    if score.0 > STYLE_THRESHOLD {
        StyleDirection::HighEnergy
    } else {
        StyleDirection::Calm
    }
}
