//! Error types for the T-Care orchestration core.

/// Top-level error type for the assistant backend and client components.
#[derive(Debug, thiserror::Error)]
pub enum AssistError {
    /// Sentiment analyzer process error (spawn, signal, stream handling).
    #[error("sentiment error: {0}")]
    Sentiment(String),

    /// LLM provider error (HTTP failure, timeout, malformed response).
    #[error("provider error: {0}")]
    Provider(String),

    /// Decision parsing or validation error.
    #[error("decision error: {0}")]
    Decision(String),

    /// Autonomous agent execution error.
    #[error("agent error: {0}")]
    Agent(String),

    /// Voice session error (permission, call start/stop, injection).
    #[error("voice error: {0}")]
    Voice(String),

    /// Context aggregation or conversation persistence error.
    #[error("context error: {0}")]
    Context(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, AssistError>;
