//! WebSocket event types and broadcasting for live session updates.
//!
//! Every change to the session (new source, analysis progress, vibe results,
//! quiz answers) is broadcast to all connected clients so a front-end can
//! update its views without polling.
//!
//! # Event Types
//!
//! - `connected` - Sent when a client connects, includes the full session
//! - `source_changed` - Source text replaced
//! - `analysis_started` / `analysis_complete` / `analysis_failed`
//! - `vibe_started` / `vibe_complete` / `vibe_failed` / `vibe_discarded`
//! - `quiz_answered` - A quiz answer was recorded
//! - `live_changed` - Live session toggled
//! - `credential_saved` - A new API key was stored
//!
//! # Example
//!
//! ```no_run
//! use canvas_orchestrator::websocket::{EventBroadcaster, SessionEvent};
//! use canvas_orchestrator::SessionState;
//!
//! # async fn example() {
//! let broadcaster = EventBroadcaster::new(100);
//! let mut receiver = broadcaster.subscribe();
//!
//! broadcaster.send(SessionEvent::connected(SessionState::new()));
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("Received: {}", event.event_name());
//! }
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::complexity::ComplexityScore;
use crate::session::{AnswerOutcome, LiveSession, SessionError, SessionState};
use crate::source::SourceOrigin;
use crate::vibe::VibeArtifact;

// ============================================================================
// Event Payloads
// ============================================================================

/// Payload for the `connected` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedPayload {
    /// The current session state.
    pub state: SessionState,
}

/// Payload for the `source_changed` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceChangedPayload {
    /// New source revision.
    pub revision: u64,
    /// Where the new source came from.
    pub origin: SourceOrigin,
    /// Number of lines in the new source.
    pub line_count: usize,
}

/// Payload for the `analysis_started` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisStartedPayload {
    /// Revision being analyzed.
    pub revision: u64,
    /// When the analysis started.
    pub timestamp: DateTime<Utc>,
}

/// Payload for the `analysis_complete` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisCompletePayload {
    /// Revision that was analyzed.
    pub revision: u64,
    /// Published score.
    pub complexity_score: ComplexityScore,
    /// Title of the learning path.
    pub title: String,
    /// Number of learning-path modules.
    pub modules: usize,
}

/// Payload for the `vibe_started` and `vibe_discarded` events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VibeTokenPayload {
    /// Token of the vibe request.
    pub token: u64,
    /// Source revision the request was made for.
    pub revision: u64,
}

/// Payload for the `vibe_complete` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VibeCompletePayload {
    /// Token of the vibe request.
    pub token: u64,
    /// Applied artifact.
    pub artifact: VibeArtifact,
}

/// Payload for the `analysis_failed` and `vibe_failed` events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailurePayload {
    /// Classified error.
    pub error: SessionError,
}

/// Payload for the `credential_saved` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialSavedPayload {
    /// Non-secret hint of the stored key.
    pub hint: String,
}

// ============================================================================
// Event Enum
// ============================================================================

/// WebSocket event types for session observation.
///
/// All events are serialized as JSON objects with "event" and "payload" fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Sent when a client connects.
    Connected(Box<ConnectedPayload>),
    /// Source text replaced.
    SourceChanged(SourceChangedPayload),
    /// Analysis requests issued.
    AnalysisStarted(AnalysisStartedPayload),
    /// Analysis results published.
    AnalysisComplete(AnalysisCompletePayload),
    /// Analysis failed.
    AnalysisFailed(FailurePayload),
    /// Vibe request issued.
    VibeStarted(VibeTokenPayload),
    /// Vibe artifact applied.
    VibeComplete(Box<VibeCompletePayload>),
    /// Vibe failed.
    VibeFailed(FailurePayload),
    /// Vibe completion dropped because it was stale.
    VibeDiscarded(VibeTokenPayload),
    /// Quiz answer recorded.
    QuizAnswered(AnswerOutcome),
    /// Live session state changed.
    LiveChanged(LiveSession),
    /// New credential stored.
    CredentialSaved(CredentialSavedPayload),
}

impl SessionEvent {
    /// Creates a `Connected` event with the current session state.
    #[must_use]
    pub fn connected(state: SessionState) -> Self {
        Self::Connected(Box::new(ConnectedPayload { state }))
    }

    /// Creates a `SourceChanged` event.
    #[must_use]
    pub const fn source_changed(revision: u64, origin: SourceOrigin, line_count: usize) -> Self {
        Self::SourceChanged(SourceChangedPayload {
            revision,
            origin,
            line_count,
        })
    }

    /// Creates an `AnalysisStarted` event.
    #[must_use]
    pub fn analysis_started(revision: u64) -> Self {
        Self::AnalysisStarted(AnalysisStartedPayload {
            revision,
            timestamp: Utc::now(),
        })
    }

    /// Creates an `AnalysisComplete` event.
    #[must_use]
    pub const fn analysis_complete(
        revision: u64,
        complexity_score: ComplexityScore,
        title: String,
        modules: usize,
    ) -> Self {
        Self::AnalysisComplete(AnalysisCompletePayload {
            revision,
            complexity_score,
            title,
            modules,
        })
    }

    /// Creates an `AnalysisFailed` event.
    #[must_use]
    pub const fn analysis_failed(error: SessionError) -> Self {
        Self::AnalysisFailed(FailurePayload { error })
    }

    /// Creates a `VibeStarted` event.
    #[must_use]
    pub const fn vibe_started(token: u64, revision: u64) -> Self {
        Self::VibeStarted(VibeTokenPayload { token, revision })
    }

    /// Creates a `VibeComplete` event.
    #[must_use]
    pub fn vibe_complete(token: u64, artifact: VibeArtifact) -> Self {
        Self::VibeComplete(Box::new(VibeCompletePayload { token, artifact }))
    }

    /// Creates a `VibeFailed` event.
    #[must_use]
    pub const fn vibe_failed(error: SessionError) -> Self {
        Self::VibeFailed(FailurePayload { error })
    }

    /// Creates a `VibeDiscarded` event.
    #[must_use]
    pub const fn vibe_discarded(token: u64, revision: u64) -> Self {
        Self::VibeDiscarded(VibeTokenPayload { token, revision })
    }

    /// Creates a `CredentialSaved` event.
    #[must_use]
    pub fn credential_saved(hint: impl Into<String>) -> Self {
        Self::CredentialSaved(CredentialSavedPayload { hint: hint.into() })
    }

    /// Returns the event name as a string.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::SourceChanged(_) => "source_changed",
            Self::AnalysisStarted(_) => "analysis_started",
            Self::AnalysisComplete(_) => "analysis_complete",
            Self::AnalysisFailed(_) => "analysis_failed",
            Self::VibeStarted(_) => "vibe_started",
            Self::VibeComplete(_) => "vibe_complete",
            Self::VibeFailed(_) => "vibe_failed",
            Self::VibeDiscarded(_) => "vibe_discarded",
            Self::QuizAnswered(_) => "quiz_answered",
            Self::LiveChanged(_) => "live_changed",
            Self::CredentialSaved(_) => "credential_saved",
        }
    }
}

// ============================================================================
// Event Broadcaster
// ============================================================================

/// Broadcasts session events to all connected WebSocket clients.
///
/// Events are not persisted for disconnected clients.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBroadcaster {
    /// Creates a new `EventBroadcaster` with the specified per-subscriber buffer.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new subscriber for receiving events.
    ///
    /// A subscriber that falls behind receives a `Lagged` error and misses
    /// some events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Broadcasts an event and returns the number of receivers.
    pub fn send(&self, event: SessionEvent) -> usize {
        debug!(event = event.event_name(), "Broadcasting session event");
        self.sender.send(event).unwrap_or(0)
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

// ============================================================================
// WebSocket Handler
// ============================================================================

/// Interval between heartbeat pings.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Maximum number of missed pong responses before disconnecting.
const MAX_MISSED_PONGS: u8 = 3;

/// State needed by the WebSocket handler.
#[derive(Debug, Clone)]
pub struct WsState {
    /// Event source for connected clients.
    pub broadcaster: EventBroadcaster,
    /// Session shared with the HTTP handlers.
    pub session: Arc<Mutex<SessionState>>,
}

/// WebSocket upgrade handler for `/api/ws`.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<WsState>) -> Response {
    info!("New WebSocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handles a single WebSocket connection.
///
/// Sends `connected` with the current session, forwards broadcast events,
/// pings every 30 seconds and closes after 3 missed pongs.
async fn handle_socket(socket: WebSocket, state: WsState) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before snapshotting so no event between the two is lost.
    let mut event_receiver = state.broadcaster.subscribe();
    let snapshot = state.session.lock().await.clone();

    let connected_json = match serde_json::to_string(&SessionEvent::connected(snapshot)) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to serialize connected event: {}", e);
            return;
        }
    };

    if sender.send(Message::Text(connected_json)).await.is_err() {
        debug!("Client disconnected before receiving connected event");
        return;
    }

    info!("WebSocket client connected, sent session snapshot");

    let mut heartbeat_interval = interval(HEARTBEAT_INTERVAL);
    let mut missed_pongs = 0u8;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        missed_pongs = 0;
                        debug!("Received pong from client");
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client requested close");
                        break;
                    }
                    Some(Ok(Message::Text(_) | Message::Binary(_))) => {
                        debug!("Ignoring data message from client");
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            debug!("Failed to send pong, client disconnected");
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                }
            }

            event = event_receiver.recv() => {
                match event {
                    Ok(session_event) => {
                        let json = match serde_json::to_string(&session_event) {
                            Ok(j) => j,
                            Err(e) => {
                                warn!("Failed to serialize event: {}", e);
                                continue;
                            }
                        };

                        if sender.send(Message::Text(json)).await.is_err() {
                            debug!("Failed to send event, client disconnected");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Client lagged, missed {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Broadcaster closed");
                        break;
                    }
                }
            }

            _ = heartbeat_interval.tick() => {
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    debug!("Failed to send ping, client disconnected");
                    break;
                }
                missed_pongs += 1;
                if missed_pongs >= MAX_MISSED_PONGS {
                    info!("Client missed {} pongs, closing connection", MAX_MISSED_PONGS);
                    break;
                }
            }
        }
    }

    info!("WebSocket client disconnected");
}

// ============================================================================
// Tests
// ============================================================================
