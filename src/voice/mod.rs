//! Voice session lifecycle over a pluggable provider.
//!
//! [`VoiceSessionClient`] owns starting and stopping a real-time voice
//! call, with bounded waits for the provider's start signals, a forced
//! unmute, and context injection after the opening greeting. The actual
//! transport sits behind [`VoiceProvider`] so tests and headless
//! embedders can substitute a mock.

use crate::config::VoiceConfig;
use crate::context::ContextSink;
use crate::error::{AssistError, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Events emitted by a voice provider during a call.
#[derive(Debug, Clone)]
pub enum VoiceEvent {
    /// The call handshake succeeded.
    StartSucceeded,
    /// The call could not be started.
    StartFailed { reason: String },
    /// Assistant audio is playable.
    AudioReady,
    /// The call ended, locally or provider-side.
    CallEnded,
    /// Assistant speech started.
    SpeechStart,
    /// Assistant speech ended.
    SpeechEnd,
    /// Provider-side error; the call may still be alive.
    Error(String),
}

/// Overrides applied when starting a call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallOverrides {
    pub first_message_mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_message: Option<String>,
    /// Recording stays off so the analyzer keeps exclusive camera access.
    pub recording_enabled: bool,
}

impl CallOverrides {
    pub fn assistant_speaks_first(intro: Option<String>) -> Self {
        Self {
            first_message_mode: "assistant-speaks-first".to_owned(),
            first_message: intro,
            recording_enabled: false,
        }
    }
}

/// Transport contract for a real-time voice call.
#[async_trait]
pub trait VoiceProvider: Send + Sync {
    /// Request microphone access. Denial aborts the session start.
    async fn request_microphone(&self) -> Result<()>;

    /// Begin the call; start outcome arrives as events.
    async fn start_call(&self, overrides: &CallOverrides) -> Result<String>;

    /// Tear the call down.
    async fn stop_call(&self) -> Result<()>;

    /// Add a system-role message to the live conversation without
    /// triggering a spoken response.
    async fn send_system_message(&self, content: &str) -> Result<()>;

    /// Speak a message, interrupting any in-flight assistant speech.
    async fn say(&self, message: &str) -> Result<()>;

    async fn set_muted(&self, muted: bool) -> Result<()>;

    /// Subscribe to call events.
    fn subscribe(&self) -> broadcast::Receiver<VoiceEvent>;
}

// ---------------------------------------------------------------------------
// Session client
// ---------------------------------------------------------------------------

/// Lifecycle wrapper around one voice call at a time.
pub struct VoiceSessionClient {
    provider: Arc<dyn VoiceProvider>,
    config: VoiceConfig,
    active: Arc<AtomicBool>,
}

impl VoiceSessionClient {
    pub fn new(provider: Arc<dyn VoiceProvider>, config: VoiceConfig) -> Self {
        Self {
            provider,
            config,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Start a call and return its id.
    ///
    /// Sequence: microphone permission, start with assistant-speaks-first
    /// overrides, bounded wait for start-success, best-effort wait for
    /// playable audio, forced unmute, then the context payload after the
    /// greeting window.
    ///
    /// # Errors
    ///
    /// Fails on microphone denial, provider start failure, or start-signal
    /// timeout. An audio-ready timeout is logged and tolerated.
    pub async fn start(
        &self,
        intro: Option<String>,
        context_payload: Option<String>,
    ) -> Result<String> {
        if self.is_active() {
            return Err(AssistError::Voice("voice session already active".to_owned()));
        }

        self.provider.request_microphone().await.map_err(|e| {
            AssistError::Voice(format!("microphone permission denied: {e}"))
        })?;

        // Subscribe before starting so no start signal can be missed.
        let mut events = self.provider.subscribe();
        let overrides = CallOverrides::assistant_speaks_first(intro);
        let call_id = self.provider.start_call(&overrides).await?;
        info!(call_id = %call_id, "voice call starting");

        self.wait_for_start(&mut events).await?;

        if let Err(e) = self.wait_for_audio(&mut events).await {
            // Calls are usable without the audio-ready signal.
            warn!(error = %e, "proceeding without audio-ready signal");
        }

        tokio::time::sleep(Duration::from_millis(self.config.unmute_settle_ms)).await;
        if let Err(e) = self.provider.set_muted(false).await {
            warn!(error = %e, "unable to force unmute");
        }

        self.active.store(true, Ordering::SeqCst);
        self.watch_for_end();

        // The assistant speaks its greeting first; context injected too
        // early would interleave with it. The call is already live at
        // this point, so a failed injection is logged, not fatal.
        tokio::time::sleep(Duration::from_millis(self.config.greeting_wait_ms)).await;
        if let Some(payload) = context_payload {
            match self.provider.send_system_message(&payload).await {
                Ok(()) => debug!("initial context payload delivered"),
                Err(e) => warn!(error = %e, "initial context payload failed"),
            }
        }

        Ok(call_id)
    }

    /// Stop the call. No-op when idle.
    pub async fn stop(&self) -> Result<()> {
        if !self.active.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        info!("stopping voice call");
        self.provider.stop_call().await
    }

    /// Speak a message, interrupting current assistant speech.
    pub async fn speak(&self, message: &str) -> Result<()> {
        if !self.is_active() {
            return Err(AssistError::Voice("no active voice session".to_owned()));
        }
        self.provider.say(message).await
    }

    /// Call-end and error hooks for owners that mirror session state.
    pub fn events(&self) -> broadcast::Receiver<VoiceEvent> {
        self.provider.subscribe()
    }

    async fn wait_for_start(&self, events: &mut broadcast::Receiver<VoiceEvent>) -> Result<()> {
        let timeout = Duration::from_millis(self.config.start_timeout_ms);
        let wait = async {
            loop {
                match events.recv().await {
                    Ok(VoiceEvent::StartSucceeded) => return Ok(()),
                    Ok(VoiceEvent::StartFailed { reason }) => {
                        return Err(AssistError::Voice(reason));
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(AssistError::Voice("provider event stream closed".to_owned()));
                    }
                }
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| AssistError::Voice("timed out waiting for voice call to start".to_owned()))?
    }

    async fn wait_for_audio(&self, events: &mut broadcast::Receiver<VoiceEvent>) -> Result<()> {
        let timeout = Duration::from_millis(self.config.audio_ready_timeout_ms);
        let wait = async {
            loop {
                match events.recv().await {
                    Ok(VoiceEvent::AudioReady) => return Ok(()),
                    Ok(VoiceEvent::StartFailed { reason }) => {
                        return Err(AssistError::Voice(reason));
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(AssistError::Voice("provider event stream closed".to_owned()));
                    }
                }
            }
        };
        tokio::time::timeout(timeout, wait).await.map_err(|_| {
            AssistError::Voice("timed out waiting for assistant audio".to_owned())
        })?
    }

    /// Clear the active flag when the provider reports the call ended.
    fn watch_for_end(&self) {
        let mut events = self.provider.subscribe();
        let active = self.active.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(VoiceEvent::CallEnded) => {
                        active.store(false, Ordering::SeqCst);
                        info!("voice call ended");
                        break;
                    }
                    Ok(VoiceEvent::Error(e)) => {
                        warn!(error = %e, "voice provider error");
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}

#[async_trait]
impl ContextSink for VoiceSessionClient {
    async fn inject_context(&self, content: &str) -> Result<()> {
        if !self.is_active() {
            return Err(AssistError::Voice("no active voice session".to_owned()));
        }
        self.provider.send_system_message(content).await
    }
}

// ---------------------------------------------------------------------------
// Mock provider
// ---------------------------------------------------------------------------

/// Scriptable in-memory provider for tests and headless runs.
pub struct MockVoiceProvider {
    events: broadcast::Sender<VoiceEvent>,
    deny_microphone: bool,
    fail_start: Option<String>,
    emit_audio_ready: bool,
    reject_system_messages: bool,
    state: std::sync::Mutex<MockState>,
}

#[derive(Debug, Default)]
struct MockState {
    system_messages: Vec<String>,
    spoken: Vec<String>,
    muted: Option<bool>,
    stopped: bool,
}

impl Default for MockVoiceProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockVoiceProvider {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            events,
            deny_microphone: false,
            fail_start: None,
            emit_audio_ready: true,
            reject_system_messages: false,
            state: std::sync::Mutex::new(MockState::default()),
        }
    }

    pub fn deny_microphone(mut self) -> Self {
        self.deny_microphone = true;
        self
    }

    pub fn fail_start(mut self, reason: impl Into<String>) -> Self {
        self.fail_start = Some(reason.into());
        self
    }

    /// Suppress the audio-ready signal to exercise the tolerant path.
    pub fn without_audio_ready(mut self) -> Self {
        self.emit_audio_ready = false;
        self
    }

    /// Make every system-message injection fail.
    pub fn reject_system_messages(mut self) -> Self {
        self.reject_system_messages = true;
        self
    }

    /// Simulate a provider-side hangup.
    pub fn hang_up(&self) {
        let _ = self.events.send(VoiceEvent::CallEnded);
    }

    pub fn system_messages(&self) -> Vec<String> {
        self.lock().system_messages.clone()
    }

    pub fn spoken(&self) -> Vec<String> {
        self.lock().spoken.clone()
    }

    pub fn last_muted(&self) -> Option<bool> {
        self.lock().muted
    }

    pub fn was_stopped(&self) -> bool {
        self.lock().stopped
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl VoiceProvider for MockVoiceProvider {
    async fn request_microphone(&self) -> Result<()> {
        if self.deny_microphone {
            return Err(AssistError::Voice("permission denied".to_owned()));
        }
        Ok(())
    }

    async fn start_call(&self, _overrides: &CallOverrides) -> Result<String> {
        match &self.fail_start {
            Some(reason) => {
                let _ = self.events.send(VoiceEvent::StartFailed {
                    reason: reason.clone(),
                });
            }
            None => {
                let _ = self.events.send(VoiceEvent::StartSucceeded);
                if self.emit_audio_ready {
                    let _ = self.events.send(VoiceEvent::AudioReady);
                }
            }
        }
        Ok(uuid::Uuid::new_v4().to_string())
    }

    async fn stop_call(&self) -> Result<()> {
        self.lock().stopped = true;
        let _ = self.events.send(VoiceEvent::CallEnded);
        Ok(())
    }

    async fn send_system_message(&self, content: &str) -> Result<()> {
        if self.reject_system_messages {
            return Err(AssistError::Voice("message channel unavailable".to_owned()));
        }
        self.lock().system_messages.push(content.to_owned());
        Ok(())
    }

    async fn say(&self, message: &str) -> Result<()> {
        self.lock().spoken.push(message.to_owned());
        Ok(())
    }

    async fn set_muted(&self, muted: bool) -> Result<()> {
        self.lock().muted = Some(muted);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<VoiceEvent> {
        self.events.subscribe()
    }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn fast_config() -> VoiceConfig {
        VoiceConfig {
            start_timeout_ms: 500,
            audio_ready_timeout_ms: 100,
            unmute_settle_ms: 0,
            greeting_wait_ms: 0,
        }
    }

    #[tokio::test]
    async fn start_unmutes_and_injects_context_after_greeting() {
        let provider = Arc::new(MockVoiceProvider::new());
        let client = VoiceSessionClient::new(provider.clone(), fast_config());

        let call_id = client
            .start(Some("Hello!".to_owned()), Some("CONTEXT".to_owned()))
            .await
            .unwrap();
        assert!(!call_id.is_empty());
        assert!(client.is_active());
        assert_eq!(provider.last_muted(), Some(false));
        assert_eq!(provider.system_messages(), vec!["CONTEXT"]);
    }

    #[tokio::test]
    async fn microphone_denial_aborts_start() {
        let provider = Arc::new(MockVoiceProvider::new().deny_microphone());
        let client = VoiceSessionClient::new(provider, fast_config());

        let err = client.start(None, None).await.unwrap_err();
        assert!(err.to_string().contains("microphone permission denied"));
        assert!(!client.is_active());
    }

    #[tokio::test]
    async fn provider_start_failure_surfaces() {
        let provider = Arc::new(MockVoiceProvider::new().fail_start("no capacity"));
        let client = VoiceSessionClient::new(provider, fast_config());

        let err = client.start(None, None).await.unwrap_err();
        assert!(err.to_string().contains("no capacity"));
        assert!(!client.is_active());
    }

    #[tokio::test]
    async fn missing_audio_ready_is_tolerated() {
        let provider = Arc::new(MockVoiceProvider::new().without_audio_ready());
        let client = VoiceSessionClient::new(provider, fast_config());

        client.start(None, None).await.unwrap();
        assert!(client.is_active());
    }

    #[tokio::test]
    async fn failed_context_injection_leaves_call_running() {
        let provider = Arc::new(MockVoiceProvider::new().reject_system_messages());
        let client = VoiceSessionClient::new(provider.clone(), fast_config());

        let call_id = client
            .start(None, Some("CONTEXT".to_owned()))
            .await
            .unwrap();
        assert!(!call_id.is_empty());
        assert!(client.is_active());
        assert!(provider.system_messages().is_empty());

        client.stop().await.unwrap();
        assert!(provider.was_stopped());
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let provider = Arc::new(MockVoiceProvider::new());
        let client = VoiceSessionClient::new(provider.clone(), fast_config());

        client.stop().await.unwrap();
        assert!(!provider.was_stopped());

        client.start(None, None).await.unwrap();
        client.stop().await.unwrap();
        assert!(provider.was_stopped());
        assert!(!client.is_active());
        client.stop().await.unwrap();
    }

    #[tokio::test]
    async fn provider_hangup_clears_active_state() {
        let provider = Arc::new(MockVoiceProvider::new());
        let client = VoiceSessionClient::new(provider.clone(), fast_config());

        client.start(None, None).await.unwrap();
        provider.hang_up();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!client.is_active());
    }

    #[tokio::test]
    async fn speak_requires_active_session() {
        let provider = Arc::new(MockVoiceProvider::new());
        let client = VoiceSessionClient::new(provider.clone(), fast_config());

        assert!(client.speak("too early").await.is_err());
        client.start(None, None).await.unwrap();
        client.speak("hello there").await.unwrap();
        assert_eq!(provider.spoken(), vec!["hello there"]);
    }

    #[tokio::test]
    async fn context_sink_rejects_idle_session() {
        let provider = Arc::new(MockVoiceProvider::new());
        let client = VoiceSessionClient::new(provider.clone(), fast_config());

        assert!(client.inject_context("block").await.is_err());
        client.start(None, None).await.unwrap();
        client.inject_context("block").await.unwrap();
        assert_eq!(provider.system_messages(), vec!["block"]);
    }
}
