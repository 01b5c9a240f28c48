//! T-Care: multimodal decision core for a mobile-carrier support assistant.
//!
//! The backend fuses three live signals into assistant behavior:
//! Webcam sentiment → Context aggregation → Decision/Agent → Voice session
//!
//! # Architecture
//!
//! Independent services connected by async channels and shared state:
//! - **Sentiment**: wraps the external frame analyzer process and fans
//!   samples out over a broadcast channel and a WebSocket
//! - **Context**: aggregates screen state, sentiment, and conversation
//!   into snapshots pushed to the voice session on an interval
//! - **Decision**: LLM-backed engine with a total rule-based fallback
//! - **Agent**: plans bounded action chains and executes them against a
//!   page surface
//! - **Voice**: orchestrates call lifecycle against a pluggable provider
//! - **Server**: REST and WebSocket control surface over all of it

pub mod agent;
pub mod config;
pub mod context;
pub mod decision;
pub mod error;
pub mod monitor;
pub mod sentiment;
pub mod server;
pub mod voice;

pub use config::AssistConfig;
pub use error::{AssistError, Result};
pub use sentiment::{SentimentEvent, SentimentService, SentimentTrend};
