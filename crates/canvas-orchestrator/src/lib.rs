//! Code Canvas Orchestrator
//!
//! Turns pasted or uploaded source code into a diagram, a complexity score,
//! a learning path with quizzes and generated artwork, and serves the session
//! over HTTP and WebSocket.

pub mod analysis;
pub mod api;
pub mod complexity;
pub mod config;
pub mod credential;
pub mod error;
pub mod prompts;
pub mod reactor;
pub mod render;
pub mod sanitize;
pub mod service;
pub mod session;
pub mod source;
pub mod vibe;
pub mod websocket;

pub use analysis::{AnalysisOrchestrator, AnalysisResult};
pub use api::{
    create_router, AnswerRequest, AppState, ErrorResponse, SettingsRequest, SettingsResponse,
    SourceRequest, SourceResponse,
};
pub use complexity::{estimate_complexity, select_style, ComplexityScore, StyleDirection};
pub use config::{Config, RendererConfig, UserLevel};
pub use credential::CredentialStore;
pub use error::{CanvasError, ErrorKind, Result};
pub use reactor::spawn_vibe_reactor;
pub use render::{render_diagram, DiagramRenderer, DiagramView, DisabledRenderer, MermaidCliRenderer};
pub use sanitize::{parse_learning_path, sanitize_diagram, DiagramDescription, LearningPathRecord, Module};
pub use service::{CanvasService, CredentialStatus, SourceSnapshot, VibeOutcome};
pub use session::{
    AnalysisStatus, AnswerOutcome, LiveSession, QuizAnswer, QuizProgress, SessionError,
    SessionState, VibeStatus,
};
pub use source::{SourceOrigin, SourceText, ACCEPTED_EXTENSIONS};
pub use vibe::{VibeArtifact, VibeOrchestrator};
pub use websocket::{EventBroadcaster, SessionEvent};
