//! Configuration types for the T-Care orchestration core.
//!
//! Configuration is loaded from an optional TOML file and then overlaid
//! with environment variables, so deployments can run with no file at all.
//! Every field has a documented default. API keys are never stored in the
//! file; they resolve from the environment only.

use crate::error::{AssistError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration for the assistant backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistConfig {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Sentiment analyzer process settings.
    pub sentiment: SentimentConfig,
    /// Decision engine / LLM provider settings.
    pub decision: DecisionConfig,
    /// Context aggregator settings.
    pub context: ContextConfig,
    /// Voice session settings.
    pub voice: VoiceConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 3001,
        }
    }
}

/// Sentiment analyzer process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SentimentConfig {
    /// Command used to launch the external frame analyzer.
    pub command: String,
    /// Arguments passed to the command.
    pub args: Vec<String>,
    /// Camera index used when a start request does not specify one.
    pub default_camera_index: u32,
    /// Ring buffer capacity for sentiment history.
    pub history_capacity: usize,
    /// Grace period before a force kill on stop, in milliseconds.
    pub stop_grace_ms: u64,
}

impl Default for SentimentConfig {
    fn default() -> Self {
        Self {
            command: "python".to_owned(),
            args: vec!["scripts/cam.py".to_owned()],
            default_camera_index: 0,
            history_capacity: 100,
            stop_grace_ms: 3000,
        }
    }
}

/// Which chat-completion provider the decision engine prefers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionProvider {
    /// OpenAI-style endpoint (`response_format: json_object` supported).
    OpenAi,
    /// NVIDIA-style endpoint (Nemotron via integrate.api.nvidia.com).
    Nvidia,
}

/// Decision engine and autonomous agent provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Preferred provider for `/api/decision/analyze`.
    pub provider: DecisionProvider,
    /// OpenAI-compatible chat completions URL.
    pub openai_endpoint: String,
    /// Model sent to the OpenAI endpoint.
    pub openai_model: String,
    /// NVIDIA chat completions URL.
    pub nvidia_endpoint: String,
    /// Model sent to the NVIDIA endpoint.
    pub nvidia_model: String,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            provider: DecisionProvider::Nvidia,
            openai_endpoint: "https://api.openai.com/v1/chat/completions".to_owned(),
            openai_model: "gpt-4o-mini".to_owned(),
            nvidia_endpoint: "https://integrate.api.nvidia.com/v1/chat/completions".to_owned(),
            nvidia_model: "nvidia/llama-3.1-nemotron-70b-instruct".to_owned(),
            request_timeout_secs: 30,
        }
    }
}

impl DecisionConfig {
    /// OpenAI API key from the environment, if configured.
    ///
    /// Both `OPENAI_API_KEY` and the legacy `OPENAI_KEY` are recognized.
    pub fn openai_api_key(&self) -> Option<String> {
        env_nonempty("OPENAI_API_KEY").or_else(|| env_nonempty("OPENAI_KEY"))
    }

    /// NVIDIA API key from the environment, if configured.
    ///
    /// Both `NVIDIA_API_KEY` and the legacy `NIM_API_KEY` are recognized.
    pub fn nvidia_api_key(&self) -> Option<String> {
        env_nonempty("NVIDIA_API_KEY").or_else(|| env_nonempty("NIM_API_KEY"))
    }
}

/// Context aggregator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Interval between periodic context pushes to the voice session, ms.
    pub update_interval_ms: u64,
    /// Maximum conversation messages kept per session (persisted cap).
    pub conversation_cap: usize,
    /// Minimum history size before a trend is derived.
    pub trend_min_samples: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: 5000,
            conversation_cap: 300,
            trend_min_samples: 10,
        }
    }
}

/// Voice session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Bounded wait for the call-start-success signal, ms.
    pub start_timeout_ms: u64,
    /// Best-effort wait for playable assistant audio, ms.
    pub audio_ready_timeout_ms: u64,
    /// Pause after the call starts before forcing unmute, ms.
    pub unmute_settle_ms: u64,
    /// Pause for the opening greeting before injecting context, ms.
    pub greeting_wait_ms: u64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            start_timeout_ms: 10_000,
            audio_ready_timeout_ms: 5_000,
            unmute_settle_ms: 300,
            greeting_wait_ms: 3_000,
        }
    }
}

impl AssistConfig {
    /// Load configuration from a TOML file, then apply environment overrides.
    ///
    /// A missing file is not an error; defaults are used.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)
                .map_err(|e| AssistError::Config(format!("cannot read {}: {e}", path.display())))?;
            toml::from_str(&text)
                .map_err(|e| AssistError::Config(format!("cannot parse {}: {e}", path.display())))?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Overlay recognized environment variables onto the loaded config.
    pub fn apply_env_overrides(&mut self) {
        if let Some(port) = env_nonempty("BACKEND_PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }
        if let Some(engine) = env_nonempty("DECISION_ENGINE") {
            match engine.to_lowercase().as_str() {
                "openai" => self.decision.provider = DecisionProvider::OpenAi,
                "nvidia" => self.decision.provider = DecisionProvider::Nvidia,
                other => tracing::warn!("unrecognized DECISION_ENGINE value: {other}"),
            }
        }
        if let Some(index) = env_nonempty("CAMERA_INDEX").and_then(|v| v.parse().ok()) {
            self.sentiment.default_camera_index = index;
        }
        if let Some(ms) = env_nonempty("CONTEXT_UPDATE_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.context.update_interval_ms = ms;
        }
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
