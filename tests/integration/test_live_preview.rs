//! Integration tests for the live preview server.
//!
//! A real server is started on an ephemeral port; clients talk to it over
//! HTTP and WebSocket the way the browser front end does.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use kata_engine::{
    create_router, AppState, Catalog, Config, MemoryProgressStore, SessionEvent, View,
};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tungstenite::Message;

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn load_catalog() -> Catalog {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures/catalog.json");
    Catalog::load(&path).expect("Failed to load fixture catalog")
}

/// Starts a server for `set` and returns its base address.
async fn spawn_test_server(set: &str) -> (String, tokio::task::JoinHandle<()>) {
    let state = AppState::new(
        Config::default(),
        load_catalog(),
        Arc::new(MemoryProgressStore::new()),
        Some(set),
    )
    .expect("Failed to create app state");
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local addr");

    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    (addr.to_string(), handle)
}

async fn connect_client(addr: &str) -> WsClient {
    let (ws_stream, _) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("Failed to connect to WebSocket");
    ws_stream
}

/// Receives the next event, answering pings along the way.
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

async fn send_json(client: &mut WsClient, value: serde_json::Value) {
    client
        .send(Message::Text(value.to_string()))
        .await
        .expect("Failed to send message");
}

async fn post(addr: &str, path: &str, body: serde_json::Value) -> serde_json::Value {
    reqwest::Client::new()
        .post(format!("http://{addr}/api{path}"))
        .json(&body)
        .send()
        .await
        .expect("Request failed")
        .json()
        .await
        .expect("Response was not JSON")
}

#[tokio::test]
async fn test_connected_event_carries_snapshot() {
    let (addr, _handle) = spawn_test_server("JavaScript").await;
    let mut client = connect_client(&addr).await;

    match receive_event(&mut client).await {
        SessionEvent::Connected(payload) => {
            assert_eq!(payload.snapshot.set, "JavaScript");
            assert_eq!(payload.snapshot.view, View::Listing);
            assert_eq!(payload.snapshot.progress.total, 2);
            assert!(payload.snapshot.editor.is_none());
        }
        other => panic!("Expected Connected event, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_source_before_select_errors_only_for_sender() {
    let (addr, _handle) = spawn_test_server("HTML Basics").await;
    let mut sender = connect_client(&addr).await;
    let mut watcher = connect_client(&addr).await;
    receive_event(&mut sender).await;
    receive_event(&mut watcher).await;

    send_json(&mut sender, serde_json::json!({ "type": "submit" })).await;
    match receive_event(&mut sender).await {
        SessionEvent::Error(payload) => assert_eq!(payload.message, "no exercise is open"),
        other => panic!("Expected Error event, got: {other:?}"),
    }

    // The watcher sees the next real event, not the error.
    post(&addr, "/select", serde_json::json!({ "index": 0 })).await;
    assert!(matches!(
        receive_event(&mut watcher).await,
        SessionEvent::Navigated(_)
    ));
}

#[tokio::test]
async fn test_live_preview_round_trip() {
    let (addr, _handle) = spawn_test_server("HTML Basics").await;
    let mut editor = connect_client(&addr).await;
    let mut viewer = connect_client(&addr).await;
    receive_event(&mut editor).await;
    receive_event(&mut viewer).await;

    let response = post(&addr, "/select", serde_json::json!({ "index": 0 })).await;
    assert_eq!(response["changed"], true);
    assert_eq!(response["snapshot"]["view"]["state"], "detail");

    for client in [&mut editor, &mut viewer] {
        match receive_event(client).await {
            SessionEvent::Navigated(payload) => {
                assert_eq!(payload.snapshot.view, View::Detail { index: 0 });
                let editor = payload.snapshot.editor.expect("editor should be open");
                assert_eq!(editor.source, "<!-- your heading here -->");
            }
            other => panic!("Expected Navigated event, got: {other:?}"),
        }
    }

    send_json(
        &mut editor,
        serde_json::json!({ "type": "source", "source": "<h1>Hello</h1>" }),
    )
    .await;
    for client in [&mut editor, &mut viewer] {
        match receive_event(client).await {
            SessionEvent::Preview(payload) => {
                assert_eq!(payload.index, 0);
                assert_eq!(payload.preview.html, "<h1>Hello</h1>");
            }
            other => panic!("Expected Preview event, got: {other:?}"),
        }
    }

    let html = reqwest::get(format!("http://{addr}/api/preview"))
        .await
        .expect("Request failed");
    assert!(html.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/html"));
    assert_eq!(html.text().await.unwrap(), "<h1>Hello</h1>");

    send_json(&mut editor, serde_json::json!({ "type": "submit" })).await;
    match receive_event(&mut viewer).await {
        SessionEvent::Feedback(payload) => {
            assert_eq!(payload.index, 0);
            assert!(payload.outcome.passed);
            assert_eq!(payload.progress.completed, 1);
            assert_eq!(payload.progress.percent, 33);
        }
        other => panic!("Expected Feedback event, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_reset_progress_is_broadcast() {
    let (addr, _handle) = spawn_test_server("HTML Basics").await;
    let mut client = connect_client(&addr).await;
    receive_event(&mut client).await;

    post(&addr, "/select", serde_json::json!({ "index": 1 })).await;
    receive_event(&mut client).await;
    send_json(
        &mut client,
        serde_json::json!({ "type": "source", "source": "p { color: red; }" }),
    )
    .await;
    receive_event(&mut client).await;
    send_json(&mut client, serde_json::json!({ "type": "submit" })).await;
    receive_event(&mut client).await;
    post(&addr, "/back", serde_json::json!({})).await;
    receive_event(&mut client).await;

    let declined = post(&addr, "/reset-progress", serde_json::json!({})).await;
    assert_eq!(declined["changed"], false);
    assert_eq!(declined["snapshot"]["progress"]["completed"], 1);

    let response = post(
        &addr,
        "/reset-progress",
        serde_json::json!({ "confirm": true }),
    )
    .await;
    assert_eq!(response["changed"], true);

    match receive_event(&mut client).await {
        SessionEvent::ProgressReset(payload) => assert_eq!(payload.set, "HTML Basics"),
        other => panic!("Expected ProgressReset event, got: {other:?}"),
    }
}
