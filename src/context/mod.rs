//! Multimodal context aggregation and voice-session context pushes.
//!
//! The aggregator holds the current screen context, sentiment history,
//! and conversation log for one session. While a voice session is
//! active, [`ContextPusher`] serializes the snapshot into a flat text
//! block on a timer and injects it as a system message, skipping pushes
//! when nothing changed. Navigation forces an immediate push.

use crate::config::ContextConfig;
use crate::decision::{DecisionEngine, DecisionResult, MultimodalContext, ResponseStyle, SentimentPoint, TranscriptMessage};
use crate::error::{AssistError, Result};
use crate::sentiment::{SentimentHistory, SentimentSample, SentimentTrend};
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Data model
// ---------------------------------------------------------------------------

/// Where the user is and what they see.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScreenContext {
    pub route: String,
    pub route_label: String,
    pub focused_element: Option<String>,
    pub scroll_position: Option<f64>,
    pub visible_content: Option<String>,
}

/// Partial screen update; present fields overwrite, absent fields keep
/// their current value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScreenContextPatch {
    pub route: Option<String>,
    pub route_label: Option<String>,
    pub focused_element: Option<String>,
    pub scroll_position: Option<f64>,
    pub visible_content: Option<String>,
}

impl ScreenContext {
    fn apply(&mut self, patch: ScreenContextPatch) {
        if let Some(route) = patch.route {
            self.route = route;
        }
        if let Some(label) = patch.route_label {
            self.route_label = label;
        }
        if let Some(focused) = patch.focused_element {
            self.focused_element = Some(focused);
        }
        if let Some(scroll) = patch.scroll_position {
            self.scroll_position = Some(scroll);
        }
        if let Some(content) = patch.visible_content {
            self.visible_content = Some(content);
        }
    }
}

/// One turn of the session conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: String,
    pub content: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

impl ConversationMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

/// Immutable view of everything the aggregator knows right now.
#[derive(Debug, Clone)]
pub struct ContextSnapshot {
    pub session_id: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub screen: ScreenContext,
    pub sentiment: Option<SentimentSample>,
    pub trend: SentimentTrend,
    pub recent_messages: Vec<ConversationMessage>,
    pub user_input: Option<String>,
    pub sentiment_history: Vec<SentimentSample>,
}

// ---------------------------------------------------------------------------
// Conversation persistence
// ---------------------------------------------------------------------------

/// JSON-on-disk conversation log, one file per session.
#[derive(Debug, Clone)]
pub struct ConversationStore {
    dir: PathBuf,
}

impl ConversationStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store under the platform data directory.
    pub fn default_location() -> Result<Self> {
        let base = dirs::data_dir()
            .ok_or_else(|| AssistError::Context("no data directory available".to_owned()))?;
        Ok(Self::new(base.join("tcare").join("conversations")))
    }

    fn path_for(&self, session_id: &str) -> Result<PathBuf> {
        // Session ids are uuids; reject anything that could escape the dir.
        if session_id.is_empty()
            || !session_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(AssistError::Context(format!(
                "invalid session id: {session_id:?}"
            )));
        }
        Ok(self.dir.join(format!("{session_id}.json")))
    }

    /// Load a session's log; a missing file is an empty log.
    pub fn load(&self, session_id: &str) -> Result<Vec<ConversationMessage>> {
        let path = self.path_for(session_id)?;
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&path)?;
        serde_json::from_str(&raw).map_err(|e| {
            AssistError::Context(format!("corrupt conversation log {}: {e}", path.display()))
        })
    }

    pub fn save(&self, session_id: &str, messages: &[ConversationMessage]) -> Result<()> {
        let path = self.path_for(session_id)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(messages)
            .map_err(|e| AssistError::Context(format!("serialize conversation log: {e}")))?;
        std::fs::write(&path, json)?;
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

/// How many recent messages a snapshot carries.
const SNAPSHOT_MESSAGE_LIMIT: usize = 10;

#[derive(Debug)]
struct AggregatorState {
    screen: ScreenContext,
    history: SentimentHistory,
    conversation: Vec<ConversationMessage>,
    user_input: Option<String>,
}

/// Session-scoped context state shared across the server.
pub struct ContextAggregator {
    session_id: String,
    conversation_cap: usize,
    trend_min_samples: usize,
    store: Option<ConversationStore>,
    state: Mutex<AggregatorState>,
}

impl ContextAggregator {
    pub fn new(config: &ContextConfig) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            conversation_cap: config.conversation_cap,
            trend_min_samples: config.trend_min_samples,
            store: None,
            state: Mutex::new(AggregatorState {
                screen: ScreenContext::default(),
                history: SentimentHistory::default(),
                conversation: Vec::new(),
                user_input: None,
            }),
        }
    }

    /// Persist the conversation log through this store, loading any
    /// existing log for the session first.
    pub fn with_store(mut self, store: ConversationStore) -> Self {
        if let Ok(existing) = store.load(&self.session_id) {
            self.lock().conversation = existing;
        }
        self.store = Some(store);
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Shallow-merge a partial screen update.
    pub fn update_screen(&self, patch: ScreenContextPatch) {
        self.lock().screen.apply(patch);
    }

    pub fn record_sample(&self, sample: SentimentSample) {
        self.lock().history.push(sample);
    }

    pub fn set_user_input(&self, input: Option<String>) {
        self.lock().user_input = input;
    }

    /// Append a conversation turn, evicting the oldest past the cap, and
    /// persist if a store is attached.
    pub fn push_message(&self, role: impl Into<String>, content: impl Into<String>) {
        let message = ConversationMessage::new(role, content);
        let snapshot = {
            let mut state = self.lock();
            state.conversation.push(message);
            let overflow = state.conversation.len().saturating_sub(self.conversation_cap);
            if overflow > 0 {
                state.conversation.drain(..overflow);
            }
            self.store.as_ref().map(|_| state.conversation.clone())
        };
        if let (Some(store), Some(messages)) = (&self.store, snapshot) {
            if let Err(e) = store.save(&self.session_id, &messages) {
                warn!(error = %e, "failed to persist conversation log");
            }
        }
    }

    pub fn conversation_len(&self) -> usize {
        self.lock().conversation.len()
    }

    /// Current trend; stays `Stable` until enough samples accumulated.
    pub fn trend(&self) -> SentimentTrend {
        let state = self.lock();
        if state.history.len() < self.trend_min_samples {
            return SentimentTrend::Stable;
        }
        let now = Utc::now().timestamp_millis();
        state.history.trend(60_000, now)
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        let state = self.lock();
        let trend = if state.history.len() < self.trend_min_samples {
            SentimentTrend::Stable
        } else {
            state.history.trend(60_000, Utc::now().timestamp_millis())
        };
        let start = state
            .conversation
            .len()
            .saturating_sub(SNAPSHOT_MESSAGE_LIMIT);
        ContextSnapshot {
            session_id: self.session_id.clone(),
            timestamp: Utc::now().timestamp_millis(),
            screen: state.screen.clone(),
            sentiment: state.history.latest(),
            trend,
            recent_messages: state.conversation[start..].to_vec(),
            user_input: state.user_input.clone(),
            sentiment_history: state.history.recent(usize::MAX),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AggregatorState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ContextSnapshot {
    /// The decision-engine view of this snapshot.
    pub fn to_multimodal(&self) -> MultimodalContext {
        MultimodalContext {
            current_page: self.screen.route.clone(),
            page_label: self.screen.route_label.clone(),
            user_input: self.user_input.clone(),
            scroll_position: self.screen.scroll_position,
            focused_element: self.screen.focused_element.clone(),
            current_sentiment: self.sentiment.map(|s| f64::from(s.value)),
            sentiment_label: self.sentiment.map(|s| s.label().to_owned()),
            sentiment_trend: Some(self.trend),
            sentiment_history: Some(
                self.sentiment_history
                    .iter()
                    .map(|s| SentimentPoint {
                        value: f64::from(s.value),
                        timestamp: s.timestamp,
                    })
                    .collect(),
            ),
            recent_messages: Some(
                self.recent_messages
                    .iter()
                    .map(|m| TranscriptMessage {
                        role: m.role.clone(),
                        content: m.content.clone(),
                    })
                    .collect(),
            ),
            conversation_topic: None,
            detected_intent: None,
            confidence: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Context block rendering
// ---------------------------------------------------------------------------

/// Render a snapshot into the flat text block injected into the voice
/// session.
pub fn build_context_message(snapshot: &ContextSnapshot) -> String {
    let mut parts = Vec::new();

    parts.push("=== MULTIMODAL CONTEXT UPDATE ===".to_owned());
    parts.push(format!("Session: {}", snapshot.session_id));
    let time = Utc
        .timestamp_millis_opt(snapshot.timestamp)
        .single()
        .unwrap_or_else(Utc::now);
    parts.push(format!("Time: {}", time.format("%H:%M:%S")));
    parts.push(String::new());

    parts.push("SCREEN CONTEXT:".to_owned());
    parts.push(format!(
        "- Current Page: {} ({})",
        snapshot.screen.route_label, snapshot.screen.route
    ));
    if let Some(focused) = &snapshot.screen.focused_element {
        parts.push(format!("- User Focus: {focused}"));
    }
    if let Some(input) = &snapshot.user_input {
        parts.push(format!("- User Input: \"{input}\""));
    }
    if let Some(content) = &snapshot.screen.visible_content {
        parts.push(format!("- Visible Content: {content}"));
    }
    parts.push(String::new());

    if let Some(sentiment) = snapshot.sentiment {
        parts.push("SENTIMENT ANALYSIS:".to_owned());
        parts.push(format!(
            "- Current: {} ({})",
            sentiment.label(),
            sentiment.value
        ));
        parts.push(format!("- Trend: {}", snapshot.trend));

        if sentiment.value < 0 {
            if f64::from(sentiment.value) < -0.5 {
                parts.push(
                    "- USER IS FRUSTRATED - Prioritize quick solutions and show empathy"
                        .to_owned(),
                );
            } else {
                parts.push("- USER IS SLIGHTLY FRUSTRATED - Be patient and helpful".to_owned());
            }
        } else if sentiment.value > 0 {
            parts.push("- USER IS HAPPY - Can provide detailed information".to_owned());
        }

        match snapshot.trend {
            SentimentTrend::Declining => parts.push(
                "- SENTIMENT DECLINING - Consider changing approach or offering alternatives"
                    .to_owned(),
            ),
            SentimentTrend::Improving => {
                parts.push("- SENTIMENT IMPROVING - Current approach is working well".to_owned());
            }
            SentimentTrend::Stable => {}
        }
        parts.push(String::new());
    }

    if !snapshot.recent_messages.is_empty() {
        parts.push("RECENT CONVERSATION:".to_owned());
        let start = snapshot.recent_messages.len().saturating_sub(3);
        for message in &snapshot.recent_messages[start..] {
            parts.push(format!(
                "{}: {}",
                message.role.to_uppercase(),
                message.content
            ));
        }
        parts.push(String::new());
    }

    parts.join("\n")
}

/// Append the decision analysis to a rendered context block.
pub fn build_enhanced_message(
    context_message: &str,
    decision: &DecisionResult,
    style: &ResponseStyle,
    should_change_approach: bool,
) -> String {
    let mut parts = vec![context_message.to_owned()];

    parts.push("AI DECISION ANALYSIS:".to_owned());
    parts.push(format!("- Recommended Action: {}", decision.action));
    parts.push(format!(
        "- Confidence: {:.0}%",
        decision.confidence * 100.0
    ));
    parts.push(format!("- Reasoning: {}", decision.reasoning));
    parts.push(format!(
        "- Response Depth: {}",
        serde_json::to_value(decision.response_depth)
            .ok()
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_default()
    ));
    parts.push(String::new());

    parts.push("RESPONSE STYLE:".to_owned());
    parts.push(format!("- Tone: {}", format!("{:?}", style.tone).to_lowercase()));
    parts.push(format!(
        "- Verbosity: {}",
        format!("{:?}", style.verbosity).to_lowercase()
    ));
    parts.push(format!(
        "- Urgency: {}",
        format!("{:?}", style.urgency).to_lowercase()
    ));
    parts.push(String::new());

    if should_change_approach {
        parts.push(
            "ATTENTION: Consider changing approach - sentiment indicates current method not working"
                .to_owned(),
        );
        parts.push(String::new());
    }

    if let Some(suggested) = &decision.suggested_response {
        parts.push("SUGGESTED RESPONSE:".to_owned());
        parts.push(suggested.clone());
        parts.push(String::new());
    }

    if let Some(options) = &decision.alternative_options {
        if !options.is_empty() {
            parts.push("ALTERNATIVE OPTIONS:".to_owned());
            for (i, option) in options.iter().enumerate() {
                parts.push(format!("{}. {option}", i + 1));
            }
            parts.push(String::new());
        }
    }

    if let Some(steps) = &decision.next_steps {
        if !steps.is_empty() {
            parts.push("NEXT STEPS:".to_owned());
            for (i, step) in steps.iter().enumerate() {
                parts.push(format!("{}. {step}", i + 1));
            }
        }
    }

    parts.join("\n")
}

// ---------------------------------------------------------------------------
// Periodic pusher
// ---------------------------------------------------------------------------

/// Receives rendered context blocks; implemented by the voice session.
#[async_trait::async_trait]
pub trait ContextSink: Send + Sync {
    /// Deliver one system-role context message. Must not trigger a
    /// spoken response.
    async fn inject_context(&self, content: &str) -> Result<()>;
}

/// Periodic context push loop tied to one voice session.
///
/// Pushes once on start, then every interval; identical consecutive
/// blocks are skipped. [`ContextPusher::poke`] forces an immediate push
/// (used on navigation). Dropping or stopping cancels the task.
pub struct ContextPusher {
    cancel: CancellationToken,
    notify: Arc<Notify>,
    handle: Option<JoinHandle<()>>,
}

impl ContextPusher {
    pub fn spawn(
        aggregator: Arc<ContextAggregator>,
        sink: Arc<dyn ContextSink>,
        engine: Option<Arc<DecisionEngine>>,
        interval: Duration,
    ) -> Self {
        let cancel = CancellationToken::new();
        let notify = Arc::new(Notify::new());

        let task_cancel = cancel.clone();
        let task_notify = notify.clone();
        let handle = tokio::spawn(async move {
            info!(interval_ms = interval.as_millis() as u64, "context pusher started");
            let mut last_key = String::new();
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                    _ = task_notify.notified() => {
                        debug!("immediate context push requested");
                    }
                }
                push_once(&aggregator, sink.as_ref(), engine.as_deref(), &mut last_key).await;
            }
            info!("context pusher stopped");
        });

        Self {
            cancel,
            notify,
            handle: Some(handle),
        }
    }

    /// Force a push outside the timer, e.g. right after navigation.
    pub fn poke(&self) {
        self.notify.notify_one();
    }

    /// Cancel the loop and wait for it to finish.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for ContextPusher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Comparison key for the skip-unchanged check. The Time header advances
/// every second, so comparing raw blocks would re-push identical context
/// on every tick; the key drops that line.
fn dedup_key(block: &str) -> String {
    block
        .lines()
        .filter(|line| !line.starts_with("Time: "))
        .collect::<Vec<_>>()
        .join("\n")
}

async fn push_once(
    aggregator: &ContextAggregator,
    sink: &dyn ContextSink,
    engine: Option<&DecisionEngine>,
    last_key: &mut String,
) {
    let snapshot = aggregator.snapshot();
    let block = build_context_message(&snapshot);
    let key = dedup_key(&block);
    if key == *last_key {
        debug!("context unchanged, skipping push");
        return;
    }
    *last_key = key;

    let message = match engine {
        Some(engine) => {
            let context = snapshot.to_multimodal();
            let decision = engine.decide(&context).await;
            let style = engine.response_style(&context);
            let change = engine.should_change_approach(&context);
            build_enhanced_message(&block, &decision, &style, change)
        }
        None => block,
    };

    if let Err(e) = sink.inject_context(&message).await {
        warn!(error = %e, "context push failed");
    }
}

// ── Tests ───────────────────────────────────────────────────────────────
