//! In-memory session state for Code Canvas.
//!
//! The session owns the current source text and every artifact derived from
//! it. Analysis results are published in one update. Vibe results are guarded
//! by a monotonically increasing token and the source revision they were
//! generated for, so a late response never replaces a fresher one.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisResult;
use crate::complexity::ComplexityScore;
use crate::error::{CanvasError, ErrorKind, Result};
use crate::sanitize::{DiagramDescription, LearningPathRecord};
use crate::source::SourceText;
use crate::vibe::VibeArtifact;

// ============================================================================
// Status enums
// ============================================================================

/// Progress of the analysis action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    /// Nothing has been analyzed yet.
    #[default]
    Idle,
    /// Both requests are in flight.
    Analyzing,
    /// Diagram, score and learning path are published.
    Ready,
    /// The last analysis failed.
    Failed,
}

/// Progress of vibe generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VibeStatus {
    /// No artwork requested yet.
    #[default]
    Idle,
    /// A vibe request is in flight.
    Generating,
    /// An artifact for the current source is available.
    Ready,
    /// The latest vibe request failed.
    Failed,
}

/// Error recorded in the session for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionError {
    /// Error category.
    pub kind: ErrorKind,
    /// Message shown to the user.
    pub message: String,
}

impl From<&CanvasError> for SessionError {
    fn from(err: &CanvasError) -> Self {
        Self {
            kind: err.kind(),
            message: err.user_message(),
        }
    }
}

// ============================================================================
// Quiz progress
// ============================================================================

/// A recorded quiz answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizAnswer {
    /// Index of the selected option.
    pub selected: usize,
    /// Whether the selection matches the correct option.
    pub correct: bool,
}

/// Answers per module index. The first answer to a module locks it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuizProgress(BTreeMap<usize, QuizAnswer>);

impl QuizProgress {
    /// Returns the answer recorded for a module.
    #[must_use]
    pub fn answer(&self, module: usize) -> Option<QuizAnswer> {
        self.0.get(&module).copied()
    }

    /// Number of modules answered correctly.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.0.values().filter(|a| a.correct).count()
    }

    /// Number of modules answered.
    #[must_use]
    pub fn answered(&self) -> usize {
        self.0.len()
    }
}

/// Outcome of [`SessionState::answer_quiz`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOutcome {
    /// Module the answer belongs to.
    pub module: usize,
    /// The answer now on record.
    pub answer: QuizAnswer,
    /// `true` if the module was already answered and the new choice ignored.
    pub locked: bool,
}

// ============================================================================
// Live session
// ============================================================================

/// Placeholder live-mentoring session state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveSession {
    /// Whether the session is connected.
    pub connected: bool,
    /// Whether the microphone is muted.
    pub muted: bool,
    /// Title of the module the learner is focused on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus_module: Option<String>,
}

// ============================================================================
// SessionState
// ============================================================================

/// Complete state of one Code Canvas session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    /// Current source text.
    pub source: SourceText,
    /// Incremented on every accepted source change.
    pub source_revision: u64,
    /// Analysis progress.
    pub status: AnalysisStatus,
    /// Source revision the published analysis belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analyzed_revision: Option<u64>,
    /// Published diagram.
    pub diagram: DiagramDescription,
    /// Published complexity score.
    pub complexity_score: ComplexityScore,
    /// Published learning path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub learning_path: Option<LearningPathRecord>,
    /// Quiz answers for the published learning path.
    pub quiz: QuizProgress,
    /// Latest applied vibe artifact.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vibe: Option<VibeArtifact>,
    /// Vibe progress.
    pub vibe_status: VibeStatus,
    /// Token of the most recently started vibe request.
    pub vibe_token: u64,
    /// Error from the last analysis.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_error: Option<SessionError>,
    /// Error from the last vibe request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vibe_error: Option<SessionError>,
    /// Live session placeholder.
    pub live: LiveSession,
    /// When the session started.
    pub started_at: DateTime<Utc>,
    /// When the state was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    /// Creates an empty session.
    ///
    /// # Examples
    ///
    /// ```
    /// use canvas_orchestrator::{AnalysisStatus, SessionState};
    ///
    /// let state = SessionState::new();
    /// assert_eq!(state.status, AnalysisStatus::Idle);
    /// assert_eq!(state.source_revision, 0);
    /// assert_eq!(state.complexity_score.value(), 0);
    /// ```
    #[must_use]
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            source: SourceText::default(),
            source_revision: 0,
            status: AnalysisStatus::Idle,
            analyzed_revision: None,
            diagram: DiagramDescription::default(),
            complexity_score: ComplexityScore::default(),
            learning_path: None,
            quiz: QuizProgress::default(),
            vibe: None,
            vibe_status: VibeStatus::Idle,
            vibe_token: 0,
            analysis_error: None,
            vibe_error: None,
            live: LiveSession::default(),
            started_at: now,
            updated_at: now,
        }
    }

    /// Updates the `updated_at` timestamp to the current time.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Replaces the source text.
    ///
    /// Returns the new revision when the content changed, or `None` when the
    /// content is identical (the origin is still updated). A content change
    /// clears the vibe artifact, which only ever describes the old code.
    pub fn set_source(&mut self, source: SourceText) -> Option<u64> {
        if source.content == self.source.content {
            self.source.origin = source.origin;
            return None;
        }
        self.source = source;
        self.source_revision += 1;
        self.vibe = None;
        self.vibe_status = VibeStatus::Idle;
        self.vibe_error = None;
        self.touch();
        Some(self.source_revision)
    }

    /// Marks an analysis as started and returns the code and revision to analyze.
    ///
    /// # Errors
    ///
    /// Returns `CanvasError::EmptySource` if no code is loaded, or
    /// `CanvasError::AnalysisInProgress` if an analysis is already running.
    pub fn begin_analysis(&mut self) -> Result<(String, u64)> {
        if self.source.is_blank() {
            return Err(CanvasError::EmptySource);
        }
        if self.status == AnalysisStatus::Analyzing {
            return Err(CanvasError::AnalysisInProgress);
        }
        self.status = AnalysisStatus::Analyzing;
        self.analysis_error = None;
        self.touch();
        Ok((self.source.content.clone(), self.source_revision))
    }

    /// Publishes a finished analysis in a single update and resets the quiz.
    pub fn publish_analysis(&mut self, revision: u64, result: AnalysisResult) {
        self.diagram = result.diagram;
        self.complexity_score = result.complexity_score;
        self.learning_path = Some(result.learning_path);
        self.quiz = QuizProgress::default();
        self.live.focus_module = None;
        self.analyzed_revision = Some(revision);
        self.analysis_error = None;
        self.status = AnalysisStatus::Ready;
        self.touch();
    }

    /// Records a failed analysis. Previously published results are kept.
    pub fn fail_analysis(&mut self, err: &CanvasError) {
        self.analysis_error = Some(SessionError::from(err));
        self.status = AnalysisStatus::Failed;
        self.touch();
    }

    /// Starts a vibe request and returns its token.
    pub fn begin_vibe(&mut self) -> u64 {
        self.vibe_token += 1;
        self.vibe_status = VibeStatus::Generating;
        self.vibe_error = None;
        self.touch();
        self.vibe_token
    }

    /// Returns `true` if a completion for `token` and `revision` may be applied.
    #[must_use]
    pub const fn is_current_vibe(&self, token: u64, revision: u64) -> bool {
        token == self.vibe_token && revision == self.source_revision
    }

    /// Applies a vibe artifact if it is still current.
    ///
    /// Returns `false` and leaves the state unchanged when the token was
    /// superseded or the source changed since the request started.
    pub fn finish_vibe(&mut self, token: u64, revision: u64, mut artifact: VibeArtifact) -> bool {
        if !self.is_current_vibe(token, revision) {
            return false;
        }
        artifact.source_revision = revision;
        self.vibe = Some(artifact);
        self.vibe_status = VibeStatus::Ready;
        self.vibe_error = None;
        self.touch();
        true
    }

    /// Records a vibe failure if it is still current.
    ///
    /// Returns `false` when the failure belongs to a superseded request.
    pub fn fail_vibe(&mut self, token: u64, revision: u64, err: &CanvasError) -> bool {
        if !self.is_current_vibe(token, revision) {
            return false;
        }
        self.vibe_error = Some(SessionError::from(err));
        self.vibe_status = VibeStatus::Failed;
        self.touch();
        true
    }

    /// Records a quiz answer.
    ///
    /// The first answer to a module locks it; later answers return the
    /// recorded one with `locked` set. Answering also moves the live-session
    /// focus to the module.
    ///
    /// # Errors
    ///
    /// Returns `CanvasError::QuizIndex` if no learning path is published or
    /// the module or option index is out of range.
    pub fn answer_quiz(&mut self, module: usize, option: usize) -> Result<AnswerOutcome> {
        let path = self.learning_path.as_ref().ok_or(CanvasError::QuizIndex {
            what: "module",
            index: module,
        })?;
        let entry = path.modules.get(module).ok_or(CanvasError::QuizIndex {
            what: "module",
            index: module,
        })?;
        if option >= entry.options.len() {
            return Err(CanvasError::QuizIndex {
                what: "option",
                index: option,
            });
        }

        if let Some(answer) = self.quiz.answer(module) {
            return Ok(AnswerOutcome {
                module,
                answer,
                locked: true,
            });
        }

        let answer = QuizAnswer {
            selected: option,
            correct: entry.is_correct(option),
        };
        self.live.focus_module = Some(entry.title.clone());
        self.quiz.0.insert(module, answer);
        self.touch();

        Ok(AnswerOutcome {
            module,
            answer,
            locked: false,
        })
    }

    /// Toggles the live session connection and returns the new state.
    pub fn toggle_live(&mut self) -> bool {
        self.live.connected = !self.live.connected;
        if !self.live.connected {
            self.live.muted = false;
        }
        self.touch();
        self.live.connected
    }

    /// Toggles the live session microphone. Has no effect while disconnected.
    pub fn toggle_mute(&mut self) -> bool {
        if self.live.connected {
            self.live.muted = !self.live.muted;
            self.touch();
        }
        self.live.muted
    }
}

// ============================================================================
// Tests
// ============================================================================
