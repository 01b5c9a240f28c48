//! End-to-end tests for the live sentiment WebSocket.
//!
//! Spins up the real router on an ephemeral port and talks to it with a
//! plain WebSocket client, the way the browser frontend does.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tcare::agent::AutonomousAgent;
use tcare::config::SentimentConfig;
use tcare::decision::DecisionEngine;
use tcare::sentiment::SentimentService;
use tcare::server::{router, AppState};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn spawn_backend() -> (Arc<SentimentService>, String) {
    let sentiment = Arc::new(SentimentService::new(SentimentConfig::default()));
    let state = AppState {
        sentiment: Arc::clone(&sentiment),
        decision: Arc::new(DecisionEngine::rule_based()),
        agent: Arc::new(AutonomousAgent::rule_based()),
    };
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    (sentiment, format!("ws://{addr}/sentiment"))
}

async fn connect(url: &str) -> WsClient {
    let (socket, _) = connect_async(url).await.unwrap();
    socket
}

async fn next_json(socket: &mut WsClient) -> serde_json::Value {
    loop {
        match socket.next().await.unwrap().unwrap() {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

#[tokio::test]
async fn fresh_connection_gets_status_then_live_samples() {
    let (sentiment, url) = spawn_backend().await;
    let mut socket = connect(&url).await;

    let status = next_json(&mut socket).await;
    assert_eq!(status["type"], "status");
    assert_eq!(status["data"]["running"], false);

    sentiment.ingest_line("1");
    sentiment.ingest_line("-1");

    let first = next_json(&mut socket).await;
    assert_eq!(first["type"], "sentiment");
    assert_eq!(first["data"]["value"], 1);

    let second = next_json(&mut socket).await;
    assert_eq!(second["data"]["value"], -1);
}

#[tokio::test]
async fn current_sample_is_replayed_on_connect() {
    let (sentiment, url) = spawn_backend().await;
    sentiment.ingest_line("-1");

    let mut socket = connect(&url).await;
    let replay = next_json(&mut socket).await;
    assert_eq!(replay["type"], "sentiment");
    assert_eq!(replay["data"]["value"], -1);

    let status = next_json(&mut socket).await;
    assert_eq!(status["type"], "status");
}

#[tokio::test]
async fn samples_fan_out_to_every_client() {
    let (sentiment, url) = spawn_backend().await;
    let mut first = connect(&url).await;
    let mut second = connect(&url).await;

    // Drain the connect-time status on both.
    next_json(&mut first).await;
    next_json(&mut second).await;

    sentiment.ingest_line("1");

    let a = next_json(&mut first).await;
    let b = next_json(&mut second).await;
    assert_eq!(a["data"]["value"], 1);
    assert_eq!(b["data"]["value"], 1);
}

#[tokio::test]
async fn stop_command_is_acknowledged_with_status() {
    let (_sentiment, url) = spawn_backend().await;
    let mut socket = connect(&url).await;
    next_json(&mut socket).await;

    socket
        .send(Message::Text(r#"{"type":"stop"}"#.into()))
        .await
        .unwrap();

    let ack = next_json(&mut socket).await;
    assert_eq!(ack["type"], "status");
    assert_eq!(ack["data"]["running"], false);
}

#[tokio::test]
async fn malformed_command_does_not_close_the_stream() {
    let (sentiment, url) = spawn_backend().await;
    let mut socket = connect(&url).await;
    next_json(&mut socket).await;

    socket
        .send(Message::Text("this is not json".into()))
        .await
        .unwrap();

    // Stream still delivers after the garbage frame.
    sentiment.ingest_line("0");
    let message = next_json(&mut socket).await;
    assert_eq!(message["type"], "sentiment");
    assert_eq!(message["data"]["value"], 0);
}
