//! HTTP API for the Code Canvas server.
//!
//! A browser front-end drives the session through these endpoints and
//! observes changes over the WebSocket at `/api/ws`.
//!
//! # Endpoints
//!
//! - `GET /api/session` - Full session state
//! - `PUT /api/source` - Replace the source with pasted text
//! - `POST /api/source/upload` - Replace the source with an uploaded file
//! - `POST /api/analyze` - Generate diagram, score and learning path
//! - `GET /api/diagram` - Rendered diagram (SVG or raw fallback)
//! - `POST /api/learning-path/modules/:index/answer` - Answer a quiz
//! - `POST /api/vibe` - Generate artwork for the current source
//! - `GET /api/settings` / `PUT /api/settings` - Credential status and update
//! - `GET /api/live`, `POST /api/live/toggle`, `POST /api/live/mute` - Live session
//! - `GET /api/ws` - Session event stream
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use canvas_genai::GeminiClient;
//! use canvas_orchestrator::{create_router, AppState, Config};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::default();
//! let client = Arc::new(GeminiClient::new(&config.api_base_url, config.request_timeout())?);
//! let router = create_router(AppState::new(config, client));
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//! axum::serve(listener, router).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use axum::{
    extract::{FromRef, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use canvas_genai::SharedClient;
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::analysis::AnalysisResult;
use crate::config::{Config, UserLevel};
use crate::error::{CanvasError, ErrorKind};
use crate::render::DiagramView;
use crate::service::{CanvasService, CredentialStatus, VibeOutcome};
use crate::session::{AnswerOutcome, LiveSession, SessionState};
use crate::source::{validate_upload_name, SourceText};
use crate::websocket::{ws_handler, WsState};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for `PUT /api/source`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRequest {
    /// Pasted source text.
    pub code: String,
}

/// Response body for the source endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceResponse {
    /// Whether the content differs from the previous source.
    pub changed: bool,
    /// Current source revision.
    pub revision: u64,
    /// Number of lines in the current source.
    pub line_count: usize,
}

/// Request body for a quiz answer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AnswerRequest {
    /// Index of the chosen option.
    pub option: usize,
}

/// Request body for `PUT /api/settings`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsRequest {
    /// New API key.
    pub api_key: String,
}

/// Response body for the settings endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsResponse {
    /// Installed credential.
    #[serde(flatten)]
    pub credential: CredentialStatus,
    /// Model used for analysis.
    pub analysis_model: String,
    /// Model used for vibe prompts.
    pub vibe_model: String,
    /// Learner level sent with learning-path requests.
    pub user_level: UserLevel,
}

/// Error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Message shown to the user.
    pub error: String,
    /// Error category, absent for request-shape errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for the HTTP server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Session actions.
    pub service: Arc<CanvasService>,
}

impl AppState {
    /// Creates state with a service built from `config`.
    #[must_use]
    pub fn new(config: Config, client: SharedClient) -> Self {
        let service = Arc::new(CanvasService::from_config(&config, client));
        Self { config, service }
    }

    /// Creates state around an existing service.
    #[must_use]
    pub const fn with_service(config: Config, service: Arc<CanvasService>) -> Self {
        Self { config, service }
    }
}

impl FromRef<Arc<AppState>> for WsState {
    fn from_ref(state: &Arc<AppState>) -> Self {
        Self {
            broadcaster: state.service.broadcaster(),
            session: state.service.session(),
        }
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// API error type that converts to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Failure from a session action.
    Canvas(CanvasError),
    /// The request itself was malformed.
    BadRequest(String),
}

impl From<CanvasError> for ApiError {
    fn from(err: CanvasError) -> Self {
        Self::Canvas(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Canvas(CanvasError::QuizIndex { .. }) => StatusCode::NOT_FOUND,
            Self::Canvas(err) => match err.kind() {
                ErrorKind::Authentication => StatusCode::UNAUTHORIZED,
                ErrorKind::NotFound | ErrorKind::MalformedResponse | ErrorKind::Transport => {
                    StatusCode::BAD_GATEWAY
                }
                ErrorKind::Validation => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                ErrorKind::EmptySource | ErrorKind::InvalidCredential => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::Render | ErrorKind::Configuration | ErrorKind::Storage => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            Self::Canvas(err) => {
                if status.is_server_error() {
                    warn!(kind = %err.kind(), error = %err, "Request failed");
                }
                ErrorResponse {
                    error: err.user_message(),
                    kind: Some(err.kind()),
                }
            }
            Self::BadRequest(error) => ErrorResponse { error, kind: None },
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with all API endpoints.
///
/// All routes live under `/api`, with CORS open for local front-ends and
/// request tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/session", get(handle_session))
        .route("/source", put(handle_set_source))
        .route("/source/upload", post(handle_upload_source))
        .route("/analyze", post(handle_analyze))
        .route("/diagram", get(handle_diagram))
        .route(
            "/learning-path/modules/:index/answer",
            post(handle_answer_quiz),
        )
        .route("/vibe", post(handle_vibe))
        .route(
            "/settings",
            get(handle_get_settings).put(handle_put_settings),
        )
        .route("/live", get(handle_live))
        .route("/live/toggle", post(handle_toggle_live))
        .route("/live/mute", post(handle_toggle_mute))
        .route("/ws", get(ws_handler));

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

// ============================================================================
// Handlers
// ============================================================================

async fn handle_session(State(state): State<Arc<AppState>>) -> Json<SessionState> {
    Json(state.service.snapshot().await)
}

async fn source_response(state: &AppState, changed: bool) -> SourceResponse {
    let session = state.service.session();
    let session = session.lock().await;
    SourceResponse {
        changed,
        revision: session.source_revision,
        line_count: session.source.line_count(),
    }
}

/// Handler for `PUT /api/source`.
async fn handle_set_source(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SourceRequest>,
) -> Json<SourceResponse> {
    let changed = state
        .service
        .set_source(SourceText::pasted(request.code))
        .await
        .is_some();
    Json(source_response(&state, changed).await)
}

/// Handler for `POST /api/source/upload`.
///
/// Takes the first multipart field that carries a file name. The name is
/// checked before the body is read.
async fn handle_upload_source(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<SourceResponse> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        let Some(name) = field.file_name().map(str::to_string) else {
            continue;
        };
        validate_upload_name(&name)?;

        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        info!(file = %name, bytes = bytes.len(), "Source file uploaded");

        let changed = state.service.upload_source(&name, &bytes).await?.is_some();
        return Ok(Json(source_response(&state, changed).await));
    }

    Err(ApiError::BadRequest("No file in upload".to_string()))
}

/// Handler for `POST /api/analyze`.
async fn handle_analyze(State(state): State<Arc<AppState>>) -> ApiResult<AnalysisResult> {
    Ok(Json(state.service.analyze().await?))
}

/// Handler for `GET /api/diagram`.
async fn handle_diagram(State(state): State<Arc<AppState>>) -> Json<DiagramView> {
    Json(state.service.render_current_diagram().await)
}

/// Handler for `POST /api/learning-path/modules/:index/answer`.
async fn handle_answer_quiz(
    State(state): State<Arc<AppState>>,
    Path(index): Path<usize>,
    Json(request): Json<AnswerRequest>,
) -> ApiResult<AnswerOutcome> {
    Ok(Json(state.service.answer_quiz(index, request.option).await?))
}

/// Handler for `POST /api/vibe`.
async fn handle_vibe(State(state): State<Arc<AppState>>) -> ApiResult<VibeOutcome> {
    Ok(Json(state.service.generate_vibe().await?))
}

async fn settings_response(state: &AppState) -> SettingsResponse {
    SettingsResponse {
        credential: state.service.credential_status().await,
        analysis_model: state.config.analysis_model.clone(),
        vibe_model: state.config.vibe_model.clone(),
        user_level: state.config.user_level,
    }
}

/// Handler for `GET /api/settings`.
async fn handle_get_settings(State(state): State<Arc<AppState>>) -> Json<SettingsResponse> {
    Json(settings_response(&state).await)
}

/// Handler for `PUT /api/settings`.
async fn handle_put_settings(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SettingsRequest>,
) -> ApiResult<SettingsResponse> {
    state.service.save_credential(&request.api_key).await?;
    Ok(Json(settings_response(&state).await))
}

async fn handle_live(State(state): State<Arc<AppState>>) -> Json<LiveSession> {
    Json(state.service.live().await)
}

async fn handle_toggle_live(State(state): State<Arc<AppState>>) -> Json<LiveSession> {
    Json(state.service.toggle_live().await)
}

async fn handle_toggle_mute(State(state): State<Arc<AppState>>) -> Json<LiveSession> {
    Json(state.service.toggle_mute().await)
}

// ============================================================================
// Tests
// ============================================================================
