//! Integration tests for WebSocket session event streaming.
//!
//! These tests validate connection handling, event broadcasting, and that
//! HTTP actions show up as events on every connected client.

use std::sync::Arc;
use std::time::Duration;

use canvas_genai::mock::{ScriptedClient, ScriptedReply};
use canvas_genai::{ResponseFormat, SharedClient};
use canvas_orchestrator::{
    create_router, AnalysisStatus, AppState, CanvasService, Config, EventBroadcaster,
    SessionEvent, SourceText,
};
use futures::SinkExt;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tungstenite::Message;

/// Helper type for WebSocket client
type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

const LEARNING_PATH: &str = r#"{"title":"Basics","summary":"S","difficulty_rating":1,"modules":[
    {"title":"Start","description":"d","quiz_question":"q","options":["a","b"],"correct_answer":0}]}"#;

struct TestServer {
    ws_url: String,
    http_url: String,
    service: Arc<CanvasService>,
    _handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    fn broadcaster(&self) -> EventBroadcaster {
        self.service.broadcaster()
    }
}

fn scripted_client() -> ScriptedClient {
    let config = Config::default();
    ScriptedClient::with_credential()
        .script(
            &config.analysis_model,
            ResponseFormat::Text,
            ScriptedReply::text("graph TD\nA-->B"),
        )
        .script(
            &config.analysis_model,
            ResponseFormat::Json,
            ScriptedReply::text(LEARNING_PATH),
        )
        .script(
            &config.vibe_model,
            ResponseFormat::Text,
            ScriptedReply::text("paper lanterns"),
        )
}

/// Spawns the test server and returns its URLs.
async fn spawn_test_server(client: SharedClient) -> TestServer {
    let config = Config {
        credentials_file: std::env::temp_dir()
            .join("canvas-integration")
            .join("ws-credentials.json")
            .to_string_lossy()
            .into_owned(),
        ..Config::default()
    };
    let service = Arc::new(CanvasService::from_config(&config, client));
    let router = create_router(AppState::with_service(config, Arc::clone(&service)));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local addr");

    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    TestServer {
        ws_url: format!("ws://{addr}/api/ws"),
        http_url: format!("http://{addr}/api"),
        service,
        _handle: handle,
    }
}

/// Connects a WebSocket client to the given URL.
async fn connect_client(url: &str) -> WsClient {
    let (ws_stream, _) = connect_async(url)
        .await
        .expect("Failed to connect to WebSocket");
    ws_stream
}

/// Receives the next text message from the WebSocket and parses it as a
/// `SessionEvent`. Ping frames are answered with pong.
async fn receive_event(client: &mut WsClient) -> SessionEvent {
    loop {
        let msg = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("Timeout waiting for message")
            .expect("Stream ended")
            .expect("WebSocket error");

        match msg {
            Message::Text(text) => {
                return serde_json::from_str(&text).expect("Failed to parse event");
            }
            Message::Ping(data) => {
                client
                    .send(Message::Pong(data))
                    .await
                    .expect("Failed to send pong");
            }
            Message::Pong(_) => {}
            other => panic!("Expected text message, got: {other:?}"),
        }
    }
}

/// Receives events until one with `name` arrives.
async fn receive_until(client: &mut WsClient, name: &str) -> SessionEvent {
    loop {
        let event = receive_event(client).await;
        if event.event_name() == name {
            return event;
        }
    }
}

// ============================================================================
// Connection Tests
// ============================================================================

/// Tests that a WebSocket client receives a connected event on connection.
#[tokio::test]
async fn test_client_receives_connected_event_on_connect() {
    let server = spawn_test_server(Arc::new(ScriptedClient::new())).await;

    let mut client = connect_client(&server.ws_url).await;
    let event = receive_event(&mut client).await;

    if let SessionEvent::Connected(payload) = event {
        assert_eq!(payload.state.status, AnalysisStatus::Idle);
        assert_eq!(payload.state.source_revision, 0);
    } else {
        panic!("Expected Connected event, got: {event:?}");
    }
}

/// Tests that the connected event carries the current session.
#[tokio::test]
async fn test_connected_event_contains_current_state() {
    let server = spawn_test_server(Arc::new(ScriptedClient::new())).await;
    server
        .service
        .set_source(SourceText::pasted("print('hi')"))
        .await;

    let mut client = connect_client(&server.ws_url).await;
    let event = receive_event(&mut client).await;

    if let SessionEvent::Connected(payload) = event {
        assert_eq!(payload.state.source.content, "print('hi')");
        assert_eq!(payload.state.source_revision, 1);
    } else {
        panic!("Expected Connected event");
    }
}

// ============================================================================
// Event Broadcast Tests
// ============================================================================

/// Tests that events are broadcast to all connected clients.
#[tokio::test]
async fn test_events_broadcast_to_all_clients() {
    let server = spawn_test_server(Arc::new(ScriptedClient::new())).await;

    let mut client1 = connect_client(&server.ws_url).await;
    let mut client2 = connect_client(&server.ws_url).await;
    receive_event(&mut client1).await;
    receive_event(&mut client2).await;

    server.broadcaster().send(SessionEvent::analysis_started(7));

    for client in [&mut client1, &mut client2] {
        let event = receive_event(client).await;
        assert!(
            matches!(&event, SessionEvent::AnalysisStarted(p) if p.revision == 7),
            "Expected AnalysisStarted, got: {event:?}"
        );
    }
}

/// Tests that HTTP actions produce the matching event sequence.
#[tokio::test]
async fn test_api_actions_trigger_websocket_events() {
    let server = spawn_test_server(Arc::new(scripted_client())).await;
    let mut client = connect_client(&server.ws_url).await;
    receive_event(&mut client).await; // Consume connected event

    let http = reqwest::Client::new();
    http.put(format!("{}/source", server.http_url))
        .json(&serde_json::json!({ "code": "fn main() {}" }))
        .send()
        .await
        .expect("Failed to send source");

    let event = receive_event(&mut client).await;
    assert!(
        matches!(&event, SessionEvent::SourceChanged(p) if p.revision == 1 && p.line_count == 1),
        "Expected SourceChanged, got: {event:?}"
    );

    let response = http
        .post(format!("{}/analyze", server.http_url))
        .send()
        .await
        .expect("Failed to analyze");
    assert!(response.status().is_success());

    let event = receive_event(&mut client).await;
    assert!(matches!(event, SessionEvent::AnalysisStarted(_)));
    let event = receive_event(&mut client).await;
    if let SessionEvent::AnalysisComplete(payload) = event {
        assert_eq!(payload.complexity_score.value(), 4);
        assert_eq!(payload.title, "Basics");
        assert_eq!(payload.modules, 1);
    } else {
        panic!("Expected AnalysisComplete, got: {event:?}");
    }

    http.post(format!("{}/vibe", server.http_url))
        .send()
        .await
        .expect("Failed to request vibe");

    let event = receive_until(&mut client, "vibe_complete").await;
    if let SessionEvent::VibeComplete(payload) = event {
        assert_eq!(payload.artifact.prompt, "paper lanterns");
        assert_eq!(payload.artifact.source_revision, 1);
    } else {
        panic!("Expected VibeComplete, got: {event:?}");
    }
}

/// Tests that a failed analysis is broadcast with its user message.
#[tokio::test]
async fn test_analysis_failure_event() {
    let server = spawn_test_server(Arc::new(ScriptedClient::new())).await;
    server.service.set_source(SourceText::pasted("x")).await;

    let mut client = connect_client(&server.ws_url).await;
    receive_event(&mut client).await;

    reqwest::Client::new()
        .post(format!("{}/analyze", server.http_url))
        .send()
        .await
        .expect("Failed to analyze");

    let event = receive_until(&mut client, "analysis_failed").await;
    if let SessionEvent::AnalysisFailed(payload) = event {
        assert_eq!(
            payload.error.message,
            "Invalid API Key. Please check your settings."
        );
    } else {
        panic!("Expected AnalysisFailed, got: {event:?}");
    }
}

// ============================================================================
// Disconnection Tests
// ============================================================================

/// Tests that server continues after client disconnects.
#[tokio::test]
async fn test_server_continues_after_client_disconnect() {
    let server = spawn_test_server(Arc::new(ScriptedClient::new())).await;

    let mut client1 = connect_client(&server.ws_url).await;
    receive_event(&mut client1).await;
    client1.close(None).await.ok();
    drop(client1);

    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut client2 = connect_client(&server.ws_url).await;
    let event = receive_event(&mut client2).await;
    assert!(matches!(event, SessionEvent::Connected(_)));

    server.service.toggle_live().await;
    let event = receive_event(&mut client2).await;
    assert!(
        matches!(&event, SessionEvent::LiveChanged(live) if live.connected),
        "Expected LiveChanged, got: {event:?}"
    );
}
