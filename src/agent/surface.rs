//! Seam between the action executor and the page it drives.
//!
//! The real surface is the browser client on the other end of a
//! transport; [`ScriptedSurface`] is an in-memory stand-in used by tests
//! and headless embedders.

use crate::error::{AssistError, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;

/// Everything the agent can do to the app surface.
///
/// Implementations should return `Err` when the target genuinely does
/// not exist; the executor treats that as a failed step and moves to a
/// fallback action.
#[async_trait]
pub trait PageSurface: Send + Sync {
    /// Navigate to a page path such as `/plans`.
    async fn navigate(&self, path: &str) -> Result<()>;

    /// Click an element identified by visible text or description.
    async fn click(&self, description: &str) -> Result<()>;

    /// Expand the FAQ accordion item matching the question text.
    async fn expand_faq(&self, question: &str) -> Result<()>;

    /// Open the details view of the named device card.
    async fn view_device_details(&self, device: &str) -> Result<()>;

    /// Select a tower on the network map by its id.
    async fn select_tower(&self, tower_id: &str) -> Result<()>;

    /// Type text into the chatbot input or a form field and submit it.
    async fn input_text(&self, text: &str) -> Result<()>;

    /// Scroll the described element into view.
    async fn scroll_to(&self, description: &str) -> Result<()>;

    /// Speak a message to the user over the voice channel.
    async fn speak(&self, message: &str) -> Result<()>;
}

/// Friendly label for a page path, used when narrating navigation.
pub fn page_label(path: &str) -> &str {
    match path {
        "/" => "Home",
        "/plans" => "Plans",
        "/devices" => "Devices",
        "/status" => "Network Status",
        "/help" => "Help",
        "/assist" => "AI Assistant",
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Scripted surface
// ---------------------------------------------------------------------------

/// One recorded surface interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceCall {
    Navigate(String),
    Click(String),
    ExpandFaq(String),
    ViewDeviceDetails(String),
    SelectTower(String),
    InputText(String),
    ScrollTo(String),
    Speak(String),
}

/// In-memory surface that records every call and can be scripted to
/// reject specific targets.
#[derive(Debug, Default)]
pub struct ScriptedSurface {
    state: Mutex<ScriptedState>,
}

#[derive(Debug, Default)]
struct ScriptedState {
    current_page: String,
    calls: Vec<SurfaceCall>,
    missing_targets: HashSet<String>,
}

impl ScriptedSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a target as absent; any action against it fails.
    pub fn without_target(self, target: impl Into<String>) -> Self {
        self.lock().missing_targets.insert(target.into());
        self
    }

    /// The page the surface is currently on.
    pub fn current_page(&self) -> String {
        self.lock().current_page.clone()
    }

    /// Every interaction so far, in order.
    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.lock().calls.clone()
    }

    /// Spoken messages only, in order.
    pub fn spoken(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                SurfaceCall::Speak(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptedState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, target: &str, call: SurfaceCall, what: &str) -> Result<()> {
        let mut state = self.lock();
        if state.missing_targets.contains(target) {
            return Err(AssistError::Agent(format!("{what} \"{target}\" not found")));
        }
        state.calls.push(call);
        Ok(())
    }
}

#[async_trait]
impl PageSurface for ScriptedSurface {
    async fn navigate(&self, path: &str) -> Result<()> {
        let mut state = self.lock();
        if state.missing_targets.contains(path) {
            return Err(AssistError::Agent(format!("page \"{path}\" not found")));
        }
        state.current_page = path.to_owned();
        state.calls.push(SurfaceCall::Navigate(path.to_owned()));
        Ok(())
    }

    async fn click(&self, description: &str) -> Result<()> {
        self.record(
            description,
            SurfaceCall::Click(description.to_owned()),
            "element",
        )
    }

    async fn expand_faq(&self, question: &str) -> Result<()> {
        self.record(
            question,
            SurfaceCall::ExpandFaq(question.to_owned()),
            "FAQ",
        )
    }

    async fn view_device_details(&self, device: &str) -> Result<()> {
        self.record(
            device,
            SurfaceCall::ViewDeviceDetails(device.to_owned()),
            "device",
        )
    }

    async fn select_tower(&self, tower_id: &str) -> Result<()> {
        self.record(
            tower_id,
            SurfaceCall::SelectTower(tower_id.to_owned()),
            "tower",
        )
    }

    async fn input_text(&self, text: &str) -> Result<()> {
        self.lock().calls.push(SurfaceCall::InputText(text.to_owned()));
        Ok(())
    }

    async fn scroll_to(&self, description: &str) -> Result<()> {
        self.record(
            description,
            SurfaceCall::ScrollTo(description.to_owned()),
            "element",
        )
    }

    async fn speak(&self, message: &str) -> Result<()> {
        self.lock().calls.push(SurfaceCall::Speak(message.to_owned()));
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────────
