//! HTTP control surface for the assistant backend.
//!
//! Exposes the sentiment service, decision engine, and autonomous agent
//! over REST, plus the `/sentiment` WebSocket used by browser clients
//! for live sample fan-out.
//!
//! ## Endpoints
//!
//! - `GET /health` — liveness plus sentiment service status
//! - `GET /api/sentiment/current` — latest sample
//! - `GET /api/sentiment/history?limit=N` — recent samples, oldest first
//! - `GET /api/sentiment/analytics?window=MS` — average and trend
//! - `POST /api/sentiment/start` — spawn the analyzer process
//! - `POST /api/sentiment/stop` — stop the analyzer process
//! - `POST /api/decision/analyze` — multimodal decision for a context
//! - `POST /api/agent/decide` — autonomous agent plan for a context
//! - `GET /sentiment` — WebSocket sample stream

use crate::agent::{AgenticContext, AutonomousAgent};
use crate::decision::{DecisionEngine, MultimodalContext, SentimentPoint};
use crate::sentiment::{channel, SentimentService};
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Default sample count for the history endpoint.
const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Default analytics window, milliseconds.
const DEFAULT_ANALYTICS_WINDOW_MS: i64 = 30_000;

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

/// Shared state for axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The managed sentiment analyzer process.
    pub sentiment: Arc<SentimentService>,
    /// Two-tier decision engine.
    pub decision: Arc<DecisionEngine>,
    /// Autonomous agent planner.
    pub agent: Arc<AutonomousAgent>,
}

/// Build the application router over the given state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/api/sentiment/current", get(handle_current))
        .route("/api/sentiment/history", get(handle_history))
        .route("/api/sentiment/analytics", get(handle_analytics))
        .route("/api/sentiment/start", post(handle_start))
        .route("/api/sentiment/stop", post(handle_stop))
        .route("/api/decision/analyze", post(handle_decision))
        .route("/api/agent/decide", post(handle_agent))
        .route("/sentiment", get(handle_sentiment_ws))
        .with_state(state)
}

fn error_body(error: &str, message: impl Into<String>) -> Json<serde_json::Value> {
    Json(json!({ "error": error, "message": message.into() }))
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    /// Maximum number of samples to return.
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalyticsQuery {
    /// Lookback window in milliseconds.
    pub window: Option<i64>,
}

/// Body of `POST /api/sentiment/start`; an empty body is accepted.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    /// Camera index override; falls back to the configured default.
    pub camera_index: Option<u32>,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// `GET /health` — liveness and sentiment service status.
async fn handle_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "sentiment": {
            "running": state.sentiment.is_running(),
            "current": state.sentiment.current(),
        },
    }))
}

/// `GET /api/sentiment/current` — latest accepted sample, if any.
async fn handle_current(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "sentiment": state.sentiment.current(),
        "running": state.sentiment.is_running(),
    }))
}

/// `GET /api/sentiment/history` — recent samples, oldest first.
async fn handle_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Json<serde_json::Value> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    Json(json!({ "history": state.sentiment.history(limit) }))
}

/// `GET /api/sentiment/analytics` — windowed average and trend.
async fn handle_analytics(
    State(state): State<AppState>,
    Query(query): Query<AnalyticsQuery>,
) -> Json<serde_json::Value> {
    let window_ms = query.window.unwrap_or(DEFAULT_ANALYTICS_WINDOW_MS);
    Json(json!({
        "current": state.sentiment.current(),
        "average": state.sentiment.average(window_ms),
        "trend": state.sentiment.trend(window_ms),
        "windowMs": window_ms,
        "running": state.sentiment.is_running(),
    }))
}

/// `POST /api/sentiment/start` — spawn the analyzer.
///
/// Starting twice is a client error; the running instance is kept.
async fn handle_start(
    State(state): State<AppState>,
    body: Option<Json<StartRequest>>,
) -> Response {
    if state.sentiment.is_running() {
        return (
            StatusCode::BAD_REQUEST,
            error_body(
                "Sentiment service already running",
                "stop the current instance before starting another",
            ),
        )
            .into_response();
    }

    let camera_index = body
        .and_then(|Json(req)| req.camera_index)
        .unwrap_or_else(|| state.sentiment.default_camera_index());

    match state.sentiment.start(camera_index) {
        Ok(()) => Json(json!({
            "message": "Sentiment service started",
            "running": true,
        }))
        .into_response(),
        Err(e) => {
            warn!(error = %e, "sentiment start failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_body("Failed to start sentiment service", e.to_string()),
            )
                .into_response()
        }
    }
}

/// `POST /api/sentiment/stop` — stop the analyzer.
async fn handle_stop(State(state): State<AppState>) -> Response {
    if !state.sentiment.is_running() {
        return (
            StatusCode::BAD_REQUEST,
            error_body(
                "Sentiment service not running",
                "nothing to stop",
            ),
        )
            .into_response();
    }

    state.sentiment.stop();
    Json(json!({
        "message": "Sentiment service stopped",
        "running": false,
    }))
    .into_response()
}

/// `POST /api/decision/analyze` — decide for a multimodal context.
///
/// Sentiment fields the client leaves out are filled from the live
/// service so callers do not have to mirror the sample stream.
async fn handle_decision(
    State(state): State<AppState>,
    Json(mut context): Json<MultimodalContext>,
) -> Json<serde_json::Value> {
    fill_decision_context(&mut context, &state.sentiment);

    let decision = state.decision.decide(&context).await;
    let style = state.decision.response_style(&context);
    let change = state.decision.should_change_approach(&context);

    Json(json!({
        "decision": decision,
        "responseStyle": style,
        "shouldChangeApproach": change,
        "context": {
            "sentiment": context.current_sentiment,
            "trend": context.sentiment_trend,
            "page": context.current_page,
        },
    }))
}

/// `POST /api/agent/decide` — plan an autonomous flow for a context.
async fn handle_agent(
    State(state): State<AppState>,
    Json(mut context): Json<AgenticContext>,
) -> Json<serde_json::Value> {
    fill_agent_context(&mut context, &state.sentiment);

    let decision = state.agent.decide(&context).await;
    let take_control = state.agent.should_take_control(&context);

    Json(json!({
        "decision": decision,
        "shouldTakeControl": take_control,
        "context": {
            "sentiment": context.current_sentiment,
            "trend": context.sentiment_trend,
            "page": context.current_page,
        },
    }))
}

/// `GET /sentiment` — upgrade to the live sample WebSocket.
async fn handle_sentiment_ws(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    info!("sentiment websocket client connecting");
    ws.on_upgrade(move |socket| channel::serve_connection(socket, state.sentiment))
}

// ---------------------------------------------------------------------------
// Context fill
// ---------------------------------------------------------------------------

/// Fill missing sentiment fields from the live service.
fn fill_decision_context(context: &mut MultimodalContext, sentiment: &SentimentService) {
    if context.current_sentiment.is_none() {
        if let Some(sample) = sentiment.current() {
            context.current_sentiment = Some(f64::from(sample.value));
            context.sentiment_label = Some(sample.label().to_owned());
        }
    }
    if context.sentiment_trend.is_none() {
        context.sentiment_trend = Some(sentiment.trend(DEFAULT_ANALYTICS_WINDOW_MS));
    }
    if context.sentiment_history.is_none() {
        let points: Vec<SentimentPoint> = sentiment
            .history(10)
            .iter()
            .map(|s| SentimentPoint {
                value: f64::from(s.value),
                timestamp: s.timestamp,
            })
            .collect();
        if !points.is_empty() {
            context.sentiment_history = Some(points);
        }
    }
}

/// Fill missing sentiment fields from the live service.
///
/// The agent context carries sentiment as plain fields; an empty label
/// marks them as not provided by the client.
fn fill_agent_context(context: &mut AgenticContext, sentiment: &SentimentService) {
    if context.sentiment_label.is_empty() {
        if let Some(sample) = sentiment.current() {
            context.current_sentiment = f64::from(sample.value);
            context.sentiment_label = sample.label().to_owned();
        } else {
            context.sentiment_label = "Neutral".to_owned();
        }
        context.sentiment_trend = sentiment.trend(DEFAULT_ANALYTICS_WINDOW_MS);
    }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::config::SentimentConfig;

    fn test_state() -> AppState {
        AppState {
            sentiment: Arc::new(SentimentService::new(SentimentConfig::default())),
            decision: Arc::new(DecisionEngine::rule_based()),
            agent: Arc::new(AutonomousAgent::rule_based()),
        }
    }

    async fn spawn_server(state: AppState) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn health_reports_stopped_service() {
        let base = spawn_server(test_state()).await;
        let body: serde_json::Value = reqwest::get(format!("{base}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["sentiment"]["running"], false);
        assert!(body["sentiment"]["current"].is_null());
    }

    #[tokio::test]
    async fn current_and_history_reflect_ingested_samples() {
        let state = test_state();
        state.sentiment.ingest_line("1");
        state.sentiment.ingest_line("-1");
        let base = spawn_server(state).await;

        let body: serde_json::Value = reqwest::get(format!("{base}/api/sentiment/current"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["sentiment"]["value"], -1);

        let body: serde_json::Value =
            reqwest::get(format!("{base}/api/sentiment/history?limit=1"))
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
        let history = body["history"].as_array().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0]["value"], -1);
    }

    #[tokio::test]
    async fn analytics_averages_over_window() {
        let state = test_state();
        state.sentiment.ingest_line("1");
        state.sentiment.ingest_line("1");
        let base = spawn_server(state).await;

        let body: serde_json::Value = reqwest::get(format!("{base}/api/sentiment/analytics"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["average"], 1.0);
        assert_eq!(body["windowMs"], 30_000);
        assert_eq!(body["trend"], "stable");
    }

    #[tokio::test]
    async fn stop_without_start_is_bad_request() {
        let base = spawn_server(test_state()).await;
        let client = reqwest::Client::new();
        let resp = client
            .post(format!("{base}/api/sentiment/stop"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "Sentiment service not running");
    }

    #[tokio::test]
    async fn double_start_is_bad_request() {
        let state = AppState {
            sentiment: Arc::new(SentimentService::new(SentimentConfig {
                command: "sh".to_owned(),
                args: vec!["-c".to_owned(), "sleep 5".to_owned()],
                ..SentimentConfig::default()
            })),
            decision: Arc::new(DecisionEngine::rule_based()),
            agent: Arc::new(AutonomousAgent::rule_based()),
        };
        let sentiment = Arc::clone(&state.sentiment);
        let base = spawn_server(state).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{base}/api/sentiment/start"))
            .json(&json!({}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["running"], true);

        let resp = client
            .post(format!("{base}/api/sentiment/start"))
            .json(&json!({}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "Sentiment service already running");

        sentiment.stop();
    }

    #[tokio::test]
    async fn start_failure_is_server_error() {
        let state = AppState {
            sentiment: Arc::new(SentimentService::new(SentimentConfig {
                command: "/nonexistent/analyzer-binary".to_owned(),
                args: Vec::new(),
                ..SentimentConfig::default()
            })),
            decision: Arc::new(DecisionEngine::rule_based()),
            agent: Arc::new(AutonomousAgent::rule_based()),
        };
        let base = spawn_server(state).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{base}/api/sentiment/start"))
            .json(&json!({ "cameraIndex": 1 }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "Failed to start sentiment service");
    }

    #[tokio::test]
    async fn decision_endpoint_fills_sentiment_from_service() {
        let state = test_state();
        state.sentiment.ingest_line("-1");
        let base = spawn_server(state).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{base}/api/decision/analyze"))
            .json(&json!({ "currentPage": "/plans", "pageLabel": "Plans" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["context"]["sentiment"], -1.0);
        assert_eq!(body["context"]["page"], "/plans");
        assert_eq!(body["decision"]["responseDepth"], "empathetic");
        assert_eq!(body["shouldChangeApproach"], false);
        assert_eq!(body["responseStyle"]["tone"], "empathetic");
    }

    #[tokio::test]
    async fn agent_endpoint_plans_and_reports_control() {
        let base = spawn_server(test_state()).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{base}/api/agent/decide"))
            .json(&json!({
                "currentPage": "/",
                "pageLabel": "Home",
                "sessionId": "s-1",
                "userLastInput": "show me the cheapest plan",
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["shouldTakeControl"], true);
        assert_eq!(body["decision"]["shouldTakeControl"], true);
        assert_eq!(body["decision"]["primaryAction"]["type"], "navigate");
        assert_eq!(body["decision"]["primaryAction"]["target"], "/plans");
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let base = spawn_server(test_state()).await;
        let resp = reqwest::get(format!("{base}/api/nope")).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
    }
}
