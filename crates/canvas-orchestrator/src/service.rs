//! Session actions shared by the HTTP API, the vibe reactor and the CLI.
//!
//! [`CanvasService`] ties the orchestrators to the session state. Every
//! action updates the session under its lock and broadcasts the matching
//! [`SessionEvent`]. Network calls are made with the lock released.

use std::sync::Arc;

use canvas_genai::{Credential, SharedClient};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::analysis::{AnalysisOrchestrator, AnalysisResult};
use crate::config::Config;
use crate::credential::CredentialStore;
use crate::error::{CanvasError, Result};
use crate::render::{render_diagram, DiagramRenderer, DiagramView, DisabledRenderer, MermaidCliRenderer};
use crate::session::{AnswerOutcome, LiveSession, SessionError, SessionState};
use crate::source::SourceText;
use crate::vibe::{VibeArtifact, VibeOrchestrator};
use crate::websocket::{EventBroadcaster, SessionEvent};

/// Latest source content published to the vibe reactor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSnapshot {
    /// Revision of the content.
    pub revision: u64,
    /// The content itself.
    pub content: String,
}

/// Result of a vibe request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VibeOutcome {
    /// The artifact was applied to the session.
    Applied {
        /// Token of the request.
        token: u64,
        /// The applied artifact.
        artifact: VibeArtifact,
    },
    /// The response arrived after a newer request or a source change.
    Discarded {
        /// Token of the request.
        token: u64,
        /// Source revision the request was made for.
        revision: u64,
    },
}

/// Credential status reported to the settings view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialStatus {
    /// Whether a key is installed.
    pub has_credential: bool,
    /// Non-secret hint of the installed key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// Owns the session and runs every user action against it.
#[derive(Debug)]
pub struct CanvasService {
    session: Arc<Mutex<SessionState>>,
    client: SharedClient,
    analysis: AnalysisOrchestrator,
    vibe: VibeOrchestrator,
    renderer: Arc<dyn DiagramRenderer>,
    credentials: CredentialStore,
    credential_hint: Mutex<Option<String>>,
    broadcaster: EventBroadcaster,
    source_tx: watch::Sender<SourceSnapshot>,
}

impl CanvasService {
    /// Creates a service from explicit parts.
    #[must_use]
    pub fn new(
        config: &Config,
        client: SharedClient,
        renderer: Arc<dyn DiagramRenderer>,
        credentials: CredentialStore,
    ) -> Self {
        let analysis = AnalysisOrchestrator::new(
            SharedClient::clone(&client),
            &config.analysis_model,
            config.user_level,
        );
        let vibe = VibeOrchestrator::new(
            SharedClient::clone(&client),
            &config.vibe_model,
            &config.image_base_url,
        );
        let (source_tx, _) = watch::channel(SourceSnapshot::default());

        Self {
            session: Arc::new(Mutex::new(SessionState::new())),
            client,
            analysis,
            vibe,
            renderer,
            credentials,
            credential_hint: Mutex::new(None),
            broadcaster: EventBroadcaster::default(),
            source_tx,
        }
    }

    /// Creates a service whose renderer and credential file follow `config`.
    #[must_use]
    pub fn from_config(config: &Config, client: SharedClient) -> Self {
        let renderer: Arc<dyn DiagramRenderer> = if config.renderer.enabled {
            Arc::new(MermaidCliRenderer::new(&config.renderer.command))
        } else {
            Arc::new(DisabledRenderer)
        };
        Self::new(
            config,
            client,
            renderer,
            CredentialStore::new(&config.credentials_file),
        )
    }

    /// Shared session handle.
    #[must_use]
    pub fn session(&self) -> Arc<Mutex<SessionState>> {
        Arc::clone(&self.session)
    }

    /// Event broadcaster for WebSocket clients.
    #[must_use]
    pub fn broadcaster(&self) -> EventBroadcaster {
        self.broadcaster.clone()
    }

    /// Subscribes to source changes.
    ///
    /// The receiver is notified only when the content actually changes and
    /// always observes the newest content.
    #[must_use]
    pub fn subscribe_source(&self) -> watch::Receiver<SourceSnapshot> {
        self.source_tx.subscribe()
    }

    /// Returns a copy of the current session.
    pub async fn snapshot(&self) -> SessionState {
        self.session.lock().await.clone()
    }

    // ------------------------------------------------------------------------
    // Source
    // ------------------------------------------------------------------------

    /// Replaces the source text.
    ///
    /// Returns the new revision, or `None` if the content did not change.
    pub async fn set_source(&self, source: SourceText) -> Option<u64> {
        let (revision, origin, line_count, content) = {
            let mut session = self.session.lock().await;
            let revision = session.set_source(source)?;
            (
                revision,
                session.source.origin.clone(),
                session.source.line_count(),
                session.source.content.clone(),
            )
        };

        info!(revision, line_count, "Source text replaced");
        self.source_tx.send_if_modified(|current| {
            if current.revision >= revision {
                return false;
            }
            *current = SourceSnapshot { revision, content };
            true
        });
        self.broadcaster
            .send(SessionEvent::source_changed(revision, origin, line_count));
        Some(revision)
    }

    /// Validates and applies an uploaded file.
    ///
    /// # Errors
    ///
    /// Returns `CanvasError::Validation` for an unaccepted file name.
    pub async fn upload_source(&self, name: &str, bytes: &[u8]) -> Result<Option<u64>> {
        let source = SourceText::from_upload(name, bytes)?;
        Ok(self.set_source(source).await)
    }

    // ------------------------------------------------------------------------
    // Analysis
    // ------------------------------------------------------------------------

    /// Runs the analysis for the current source and publishes the result.
    ///
    /// The requests and the publish step run in their own task, so dropping
    /// the returned future never leaves the session stuck in `Analyzing`.
    ///
    /// # Errors
    ///
    /// Returns `CanvasError::EmptySource` or `CanvasError::AnalysisInProgress`
    /// without calling the service, or the classified failure, which is also
    /// recorded in the session.
    pub async fn analyze(&self) -> Result<AnalysisResult> {
        let (code, revision) = self.session.lock().await.begin_analysis()?;
        self.broadcaster.send(SessionEvent::analysis_started(revision));

        let analysis = self.analysis.clone();
        let session = Arc::clone(&self.session);
        let broadcaster = self.broadcaster.clone();
        let task = tokio::spawn(async move {
            let outcome = analysis.analyze(&code).await;
            settle_analysis(&session, &broadcaster, revision, outcome).await
        });

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                let err = CanvasError::transport(format!("analysis task failed: {e}"));
                settle_analysis(&self.session, &self.broadcaster, revision, Err(err)).await
            }
        }
    }

    /// Renders the published diagram, falling back to raw text on failure.
    pub async fn render_current_diagram(&self) -> DiagramView {
        let diagram = self.session.lock().await.diagram.clone();
        render_diagram(self.renderer.as_ref(), &diagram).await
    }

    // ------------------------------------------------------------------------
    // Vibe
    // ------------------------------------------------------------------------

    /// Generates artwork for the current source and published score.
    ///
    /// The result is applied only if no newer vibe request started and the
    /// source is unchanged; otherwise it is reported as discarded.
    ///
    /// # Errors
    ///
    /// Returns `CanvasError::EmptySource` if no code is loaded, or the
    /// classified failure of a request that is still current.
    pub async fn generate_vibe(&self) -> Result<VibeOutcome> {
        let (token, revision, code, score) = {
            let mut session = self.session.lock().await;
            if session.source.is_blank() {
                return Err(CanvasError::EmptySource);
            }
            let token = session.begin_vibe();
            (
                token,
                session.source_revision,
                session.source.content.clone(),
                session.complexity_score,
            )
        };
        self.broadcaster
            .send(SessionEvent::vibe_started(token, revision));

        let outcome = self.vibe.generate_vibe(&code, score).await;

        let mut session = self.session.lock().await;
        match outcome {
            Ok(artifact) => {
                let applied = session
                    .finish_vibe(token, revision, artifact)
                    .then(|| session.vibe.clone())
                    .flatten();
                drop(session);
                if let Some(artifact) = applied {
                    self.broadcaster
                        .send(SessionEvent::vibe_complete(token, artifact.clone()));
                    return Ok(VibeOutcome::Applied { token, artifact });
                }
                debug!(token, revision, "Discarding stale vibe result");
                self.broadcaster
                    .send(SessionEvent::vibe_discarded(token, revision));
                Ok(VibeOutcome::Discarded { token, revision })
            }
            Err(e) => {
                if session.fail_vibe(token, revision, &e) {
                    drop(session);
                    warn!(token, kind = %e.kind(), "Vibe generation failed");
                    self.broadcaster
                        .send(SessionEvent::vibe_failed(SessionError::from(&e)));
                    return Err(e);
                }
                drop(session);
                debug!(token, revision, "Discarding stale vibe failure");
                self.broadcaster
                    .send(SessionEvent::vibe_discarded(token, revision));
                Ok(VibeOutcome::Discarded { token, revision })
            }
        }
    }

    // ------------------------------------------------------------------------
    // Learning path and live session
    // ------------------------------------------------------------------------

    /// Records a quiz answer for the published learning path.
    ///
    /// # Errors
    ///
    /// Returns `CanvasError::QuizIndex` for an unknown module or option.
    pub async fn answer_quiz(&self, module: usize, option: usize) -> Result<AnswerOutcome> {
        let outcome = self.session.lock().await.answer_quiz(module, option)?;
        if !outcome.locked {
            self.broadcaster.send(SessionEvent::QuizAnswered(outcome));
        }
        Ok(outcome)
    }

    /// Returns the live session state.
    pub async fn live(&self) -> LiveSession {
        self.session.lock().await.live.clone()
    }

    /// Toggles the live session connection.
    pub async fn toggle_live(&self) -> LiveSession {
        let live = {
            let mut session = self.session.lock().await;
            session.toggle_live();
            session.live.clone()
        };
        info!(connected = live.connected, "Live session toggled");
        self.broadcaster.send(SessionEvent::LiveChanged(live.clone()));
        live
    }

    /// Toggles the live session microphone.
    pub async fn toggle_mute(&self) -> LiveSession {
        let live = {
            let mut session = self.session.lock().await;
            session.toggle_mute();
            session.live.clone()
        };
        self.broadcaster.send(SessionEvent::LiveChanged(live.clone()));
        live
    }

    // ------------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------------

    /// Installs a credential without persisting it.
    pub async fn install_credential(&self, credential: Credential) {
        *self.credential_hint.lock().await = Some(credential.hint());
        self.client.install_credential(credential);
    }

    /// Loads the stored credential, if any, and installs it.
    ///
    /// # Errors
    ///
    /// Returns `CanvasError::CredentialStore` if the file is unreadable.
    pub async fn load_stored_credential(&self) -> Result<bool> {
        match self.credentials.load()? {
            Some(credential) => {
                self.install_credential(credential).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Validates, persists and installs a new API key.
    ///
    /// # Errors
    ///
    /// Returns `CanvasError::InvalidCredential` if the key fails the prefix
    /// check, or `CanvasError::CredentialStore` if it cannot be saved.
    pub async fn save_credential(&self, raw: &str) -> Result<CredentialStatus> {
        let credential = Credential::parse(raw).map_err(|_| CanvasError::InvalidCredential)?;
        self.credentials.save(&credential)?;

        let hint = credential.hint();
        self.install_credential(credential).await;
        self.broadcaster
            .send(SessionEvent::credential_saved(hint.clone()));

        Ok(CredentialStatus {
            has_credential: true,
            hint: Some(hint),
        })
    }

    /// Returns whether a credential is installed.
    pub async fn credential_status(&self) -> CredentialStatus {
        CredentialStatus {
            has_credential: self.client.has_credential(),
            hint: self.credential_hint.lock().await.clone(),
        }
    }
}

/// Publishes or records an analysis outcome and broadcasts it.
async fn settle_analysis(
    session: &Mutex<SessionState>,
    broadcaster: &EventBroadcaster,
    revision: u64,
    outcome: Result<AnalysisResult>,
) -> Result<AnalysisResult> {
    let mut state = session.lock().await;
    match outcome {
        Ok(result) => {
            state.publish_analysis(revision, result.clone());
            drop(state);
            broadcaster.send(SessionEvent::analysis_complete(
                revision,
                result.complexity_score,
                result.learning_path.title.clone(),
                result.learning_path.modules.len(),
            ));
            Ok(result)
        }
        Err(e) => {
            state.fail_analysis(&e);
            drop(state);
            broadcaster.send(SessionEvent::analysis_failed(SessionError::from(&e)));
            Err(e)
        }
    }
}
