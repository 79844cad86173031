//! End-to-end tests for the Code Canvas HTTP API.
//!
//! Each test starts a real server on a free port, backed by a scripted
//! generation client, and drives it over HTTP.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use canvas_genai::mock::{ScriptedClient, ScriptedReply};
use canvas_genai::{ResponseFormat, SharedClient};
use canvas_orchestrator::{
    create_router, spawn_vibe_reactor, AnalysisStatus, AppState, CanvasService, Config,
    SourceText, UserLevel, VibeStatus,
};
use serde_json::Value;

const LEARNING_PATH: &str = r#"{
    "title": "Word Counting",
    "summary": "Counts words with a map.",
    "difficulty_rating": 2,
    "modules": [
        {"title": "Maps", "description": "d", "quiz_question": "q1", "options": ["a", "b"], "correct_answer": 0},
        {"title": "Entries", "description": "d", "quiz_question": "q2", "options": ["a", "b"], "correct_answer": 1},
        {"title": "Ownership", "description": "d", "quiz_question": "q3", "options": ["a", "b"], "correct_answer": 0}
    ]
}"#;

/// Path to the sample project fixture.
fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures/sample-project")
}

fn test_config(name: &str) -> Config {
    Config {
        credentials_file: std::env::temp_dir()
            .join("canvas-integration")
            .join(name)
            .to_string_lossy()
            .into_owned(),
        ..Config::default()
    }
}

/// A ten-line diagram wrapped in a fence.
fn ten_line_diagram() -> String {
    let body: Vec<String> = (0..9).map(|i| format!("  N{i} --> N{}", i + 1)).collect();
    format!("```mermaid\ngraph TD\n{}\n```", body.join("\n"))
}

struct TestServer {
    base_url: String,
    service: Arc<CanvasService>,
    http: reqwest::Client,
    _handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn start(config: Config, client: SharedClient) -> Self {
        let service = Arc::new(CanvasService::from_config(&config, client));
        let router = create_router(AppState::with_service(config, Arc::clone(&service)));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get local addr");

        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.expect("Server failed");
        });

        Self {
            base_url: format!("http://{addr}/api"),
            service,
            http: reqwest::Client::new(),
            _handle: handle,
        }
    }

    async fn put_source(&self, code: &str) -> Value {
        self.http
            .put(format!("{}/source", self.base_url))
            .json(&serde_json::json!({ "code": code }))
            .send()
            .await
            .expect("Failed to send source")
            .json()
            .await
            .expect("Invalid source response")
    }

    async fn post(&self, path: &str) -> reqwest::Response {
        self.http
            .post(format!("{}{path}", self.base_url))
            .send()
            .await
            .expect("Failed to send request")
    }

    async fn session(&self) -> Value {
        self.http
            .get(format!("{}/session", self.base_url))
            .send()
            .await
            .expect("Failed to get session")
            .json()
            .await
            .expect("Invalid session response")
    }

    async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> reqwest::Response {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);
        self.http
            .post(format!("{}/source/upload", self.base_url))
            .multipart(form)
            .send()
            .await
            .expect("Failed to upload")
    }
}

// ============================================================================
// Configuration and source intake
// ============================================================================

/// Tests that the sample config loads with overridden fields.
#[test]
fn test_sample_config_loads() {
    let config = Config::load_from_dir(&fixture_path()).expect("Failed to load config");

    assert_eq!(config.analysis_model, "gemini-test-pro");
    assert_eq!(config.vibe_model, "gemini-test-flash");
    assert_eq!(config.user_level, UserLevel::Beginner);
    assert_eq!(config.request_timeout_secs, 30);
    assert!(!config.renderer.enabled);
}

/// Tests that a fixture source file loads through the allow-list.
#[test]
fn test_sample_source_loads() {
    let source = SourceText::load(fixture_path().join("counter.rs")).expect("Failed to load");
    assert!(source.content.contains("pub struct Counter"));
    assert_eq!(source.line_count(), 21);

    assert!(SourceText::load(fixture_path().join("notes.exe")).is_err());
}

/// Tests that a rejected upload leaves the source untouched and an accepted
/// one replaces it.
#[tokio::test]
async fn test_upload_allow_list() {
    let server = TestServer::start(
        test_config("upload.json"),
        Arc::new(ScriptedClient::with_credential()),
    )
    .await;
    server.put_source("original").await;

    let response = server.upload("note.exe", b"MZ\x90\x00".to_vec()).await;
    assert_eq!(response.status(), reqwest::StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let body: Value = response.json().await.expect("Invalid error body");
    assert_eq!(body["kind"], "validation");
    assert_eq!(server.session().await["source"]["content"], "original");

    let response = server.upload("main.rs", b"fn main() {}\n".to_vec()).await;
    assert!(response.status().is_success());

    let session = server.session().await;
    assert_eq!(session["source"]["content"], "fn main() {}\n");
    assert_eq!(session["source"]["origin"]["kind"], "file");
    assert_eq!(session["source"]["origin"]["name"], "main.rs");
    assert_eq!(session["source_revision"], 2);
}

// ============================================================================
// Analysis
// ============================================================================

/// Tests that the score depends only on the diagram's line count.
#[tokio::test]
async fn test_score_follows_diagram_lines() {
    let config = test_config("score.json");
    let client = ScriptedClient::with_credential()
        .script(
            &config.analysis_model,
            ResponseFormat::Text,
            ScriptedReply::text(ten_line_diagram()),
        )
        .script(
            &config.analysis_model,
            ResponseFormat::Json,
            ScriptedReply::text(LEARNING_PATH),
        );
    let server = TestServer::start(config, Arc::new(client)).await;

    let code: Vec<String> = (0..30).map(|i| format!("let v{i} = {i};")).collect();
    server.put_source(&code.join("\n")).await;

    let response = server.post("/analyze").await;
    assert!(response.status().is_success());
    let result: Value = response.json().await.expect("Invalid analysis body");

    assert_eq!(result["complexity_score"], 20);
    assert!(!result["diagram"].as_str().unwrap_or_default().contains("```"));

    let titles: Vec<&str> = result["learning_path"]["modules"]
        .as_array()
        .expect("modules should be an array")
        .iter()
        .filter_map(|m| m["title"].as_str())
        .collect();
    assert_eq!(titles, ["Maps", "Entries", "Ownership"]);

    let session = server.session().await;
    assert_eq!(session["status"], "ready");
    assert_eq!(session["complexity_score"], 20);
}

/// Tests that one failed request discards the other's result.
#[tokio::test]
async fn test_partial_failure_publishes_nothing() {
    let config = test_config("partial.json");
    let client = Arc::new(
        ScriptedClient::with_credential()
            .script(
                &config.analysis_model,
                ResponseFormat::Text,
                ScriptedReply::status(401, "API key not valid"),
            )
            .script(
                &config.analysis_model,
                ResponseFormat::Json,
                ScriptedReply::text(LEARNING_PATH),
            ),
    );
    let server = TestServer::start(config, Arc::clone(&client) as SharedClient).await;
    server.put_source("fn main() {}").await;

    let response = server.post("/analyze").await;
    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.expect("Invalid error body");
    assert_eq!(body["error"], "Invalid API Key. Please check your settings.");

    // Both requests were issued even though one failed.
    assert_eq!(client.requests().len(), 2);

    let session = server.session().await;
    assert_eq!(session["status"], "failed");
    assert!(session.get("learning_path").is_none());
    assert_eq!(session["complexity_score"], 0);
    assert_eq!(session["analysis_error"]["kind"], "authentication");
}

/// Tests that malformed learning-path JSON surfaces as a gateway error.
#[tokio::test]
async fn test_malformed_learning_path() {
    let config = test_config("malformed.json");
    let client = ScriptedClient::with_credential()
        .script(
            &config.analysis_model,
            ResponseFormat::Text,
            ScriptedReply::text("graph TD"),
        )
        .script(
            &config.analysis_model,
            ResponseFormat::Json,
            ScriptedReply::text(r#"{"title":"T","summary":"S","difficulty_rating":1}"#),
        );
    let server = TestServer::start(config, Arc::new(client)).await;
    server.put_source("x").await;

    let response = server.post("/analyze").await;
    assert_eq!(response.status(), reqwest::StatusCode::BAD_GATEWAY);
    let body: Value = response.json().await.expect("Invalid error body");
    assert_eq!(body["kind"], "malformed_response");
}

// ============================================================================
// Vibe
// ============================================================================

/// Tests that rapid edits never leave artwork for code that was replaced.
#[tokio::test]
async fn test_rapid_edits_keep_latest_vibe() {
    let config = test_config("rapid.json");
    let client = ScriptedClient::with_credential()
        .script(
            &config.vibe_model,
            ResponseFormat::Text,
            ScriptedReply::text("first").delayed(Duration::from_millis(300)),
        )
        .script(
            &config.vibe_model,
            ResponseFormat::Text,
            ScriptedReply::text("second").delayed(Duration::from_millis(150)),
        )
        .script(
            &config.vibe_model,
            ResponseFormat::Text,
            ScriptedReply::text("third"),
        );
    let server = TestServer::start(config, Arc::new(client)).await;
    let _reactor = spawn_vibe_reactor(Arc::clone(&server.service));

    for code in ["a = 1", "a = 2", "a = 3"] {
        server.put_source(code).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    // Let every in-flight request settle.
    tokio::time::sleep(Duration::from_millis(500)).await;

    let snapshot = server.service.snapshot().await;
    assert_eq!(snapshot.source.content, "a = 3");
    assert_eq!(snapshot.vibe_status, VibeStatus::Ready);
    let vibe = snapshot.vibe.expect("a vibe should be applied");
    assert_eq!(vibe.source_revision, snapshot.source_revision);
}

/// Tests that an explicit vibe request uses the published score.
#[tokio::test]
async fn test_explicit_vibe_after_analysis() {
    let config = test_config("explicit.json");
    let diagram: Vec<String> = (0..30).map(|i| format!("N{i} --> N{}", i + 1)).collect();
    let client = ScriptedClient::with_credential()
        .script(
            &config.analysis_model,
            ResponseFormat::Text,
            ScriptedReply::text(diagram.join("\n")),
        )
        .script(
            &config.analysis_model,
            ResponseFormat::Json,
            ScriptedReply::text(LEARNING_PATH),
        )
        .script(
            &config.vibe_model,
            ResponseFormat::Text,
            ScriptedReply::text("neon grid city"),
        );
    let server = TestServer::start(config, Arc::new(client)).await;
    server.put_source("fn main() {}").await;
    assert!(server.post("/analyze").await.status().is_success());

    let response = server.post("/vibe").await;
    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Invalid vibe body");

    assert_eq!(body["outcome"], "applied");
    assert_eq!(body["artifact"]["score"], 60);
    assert_eq!(body["artifact"]["style"], "high_energy");
    assert!(body["artifact"]["image_url"]
        .as_str()
        .unwrap_or_default()
        .contains("?cyberpunk&t="));

    let session = server.session().await;
    assert_eq!(session["vibe_status"], "ready");
    assert_eq!(session["status"], "ready");
}

// ============================================================================
// Quiz and settings
// ============================================================================

/// Tests that only the first answer to a module counts.
#[tokio::test]
async fn test_quiz_answers_lock() {
    let config = test_config("quiz.json");
    let client = ScriptedClient::with_credential()
        .script(
            &config.analysis_model,
            ResponseFormat::Text,
            ScriptedReply::text("graph TD"),
        )
        .script(
            &config.analysis_model,
            ResponseFormat::Json,
            ScriptedReply::text(LEARNING_PATH),
        );
    let server = TestServer::start(config, Arc::new(client)).await;
    server.put_source("x").await;
    server.post("/analyze").await;

    let answer = |module: usize, option: usize| {
        server
            .http
            .post(format!(
                "{}/learning-path/modules/{module}/answer",
                server.base_url
            ))
            .json(&serde_json::json!({ "option": option }))
            .send()
    };

    let first: Value = answer(1, 1).await.expect("send").json().await.expect("json");
    assert_eq!(first["answer"]["correct"], true);

    let second: Value = answer(1, 0).await.expect("send").json().await.expect("json");
    assert_eq!(second["locked"], true);
    assert_eq!(second["answer"]["selected"], 1);

    let session = server.session().await;
    assert_eq!(session["live"]["focus_module"], "Entries");
    assert_eq!(
        server.service.snapshot().await.status,
        AnalysisStatus::Ready
    );
}

/// Tests that saving a key enables generation without a restart.
#[tokio::test]
async fn test_saved_key_enables_generation() {
    let config = test_config("enable.json");
    let path = PathBuf::from(&config.credentials_file);
    let client = ScriptedClient::new().script(
        &config.vibe_model,
        ResponseFormat::Text,
        ScriptedReply::text("calm lake"),
    );
    let server = TestServer::start(config, Arc::new(client)).await;
    server.put_source("x").await;

    assert_eq!(
        server.post("/vibe").await.status(),
        reqwest::StatusCode::UNAUTHORIZED
    );

    let response = server
        .http
        .put(format!("{}/settings", server.base_url))
        .json(&serde_json::json!({ "api_key": "AIzaSyIntegration1" }))
        .send()
        .await
        .expect("Failed to save settings");
    assert!(response.status().is_success());

    assert!(server.post("/vibe").await.status().is_success());
    std::fs::remove_file(&path).ok();
}
