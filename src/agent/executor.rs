//! Executes agent action chains against a page surface.
//!
//! A chain runs step by step with a short pause between actions so the
//! page can settle. Step count is bounded by the plan's own estimate and
//! a hard cap, so a malformed plan can never run away. When a step fails
//! the executor substitutes the next fallback action; with none left the
//! chain aborts.

use crate::agent::surface::{page_label, PageSurface};
use crate::agent::{ActionKind, AgenticAction, AgenticDecision};
use crate::error::{AssistError, Result};
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Hard cap on chain length regardless of the plan's estimate.
pub const MAX_CHAIN_STEPS: u32 = 10;

/// Pause between chain steps.
const STEP_DELAY: Duration = Duration::from_millis(500);

/// Pause after navigation before narrating, so the page change lands
/// first.
const NAVIGATE_SETTLE: Duration = Duration::from_millis(200);

/// How many executed actions to keep for inspection.
const HISTORY_CAPACITY: usize = 50;

/// Record of one executed (or failed) action.
#[derive(Debug, Clone)]
pub struct ActionRecord {
    pub kind: ActionKind,
    pub target: Option<String>,
    pub result: String,
    pub succeeded: bool,
    /// Epoch milliseconds.
    pub executed_at: i64,
}

/// Outcome of a full chain run.
#[derive(Debug, Clone)]
pub struct ChainOutcome {
    /// Result string of each completed step, in order.
    pub steps: Vec<String>,
    /// Whether any fallback action was substituted along the way.
    pub used_fallback: bool,
}

/// Drives action chains against a [`PageSurface`].
pub struct ActionExecutor {
    surface: Arc<dyn PageSurface>,
    step_delay: Duration,
    history: Mutex<VecDeque<ActionRecord>>,
}

impl ActionExecutor {
    pub fn new(surface: Arc<dyn PageSurface>) -> Self {
        Self {
            surface,
            step_delay: STEP_DELAY,
            history: Mutex::new(VecDeque::with_capacity(HISTORY_CAPACITY)),
        }
    }

    /// Override the inter-step pause. Tests use a zero delay.
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    /// Recently executed actions, oldest first.
    pub fn history(&self) -> Vec<ActionRecord> {
        self.lock_history().iter().cloned().collect()
    }

    /// Run a plan's chain to completion.
    ///
    /// Steps are bounded by `min(estimated_steps, MAX_CHAIN_STEPS)`. A
    /// failing step consumes the next fallback action; when fallbacks run
    /// out the error propagates.
    pub async fn execute_chain(&self, decision: &AgenticDecision) -> Result<ChainOutcome> {
        let bound = decision.estimated_steps.min(MAX_CHAIN_STEPS);
        info!(
            steps = bound,
            strategy = %decision.conversation_strategy,
            "executing action chain"
        );

        let mut fallbacks: VecDeque<AgenticAction> =
            decision.fallback_actions.iter().cloned().collect();
        let mut current = Some(decision.primary_action.clone());
        let mut steps = Vec::new();
        let mut used_fallback = false;
        let mut step = 1u32;

        while let Some(action) = current {
            if step > bound {
                debug!(step, bound, "chain step bound reached");
                break;
            }

            match self.execute_action(&action).await {
                Ok(result) => {
                    debug!(step, result = %result, "chain step done");
                    steps.push(result);
                    current = action.next_action.map(|next| *next);
                    step += 1;
                    if current.is_some() {
                        tokio::time::sleep(self.step_delay).await;
                    }
                }
                Err(e) => match fallbacks.pop_front() {
                    Some(fallback) => {
                        warn!(step, error = %e, "chain step failed, substituting fallback");
                        used_fallback = true;
                        current = Some(fallback);
                    }
                    None => {
                        warn!(step, error = %e, "chain step failed with no fallback");
                        return Err(e);
                    }
                },
            }
        }

        info!(completed = steps.len(), "chain execution completed");
        Ok(ChainOutcome {
            steps,
            used_fallback,
        })
    }

    /// Execute one action and return a human-readable result.
    pub async fn execute_action(&self, action: &AgenticAction) -> Result<String> {
        debug!(kind = ?action.kind, target = action.target.as_deref().unwrap_or(""), "executing action");

        let outcome = self.dispatch(action).await;
        self.record(action, &outcome);
        outcome
    }

    async fn dispatch(&self, action: &AgenticAction) -> Result<String> {
        let target = action.target.as_deref();
        match action.kind {
            ActionKind::Navigate => {
                let path = required(target, "navigate")?;
                self.surface.navigate(path).await?;
                // Narrate after the page change; settle pause shrinks
                // with the configured step delay so tests stay fast.
                tokio::time::sleep(self.step_delay.min(NAVIGATE_SETTLE)).await;
                self.surface
                    .speak(&format!("Here's {}", page_label(path)))
                    .await?;
                Ok(format!("Navigated to {path}"))
            }
            ActionKind::Click => {
                let description = required(target, "click")?;
                self.surface.click(description).await?;
                Ok(format!("Clicked \"{description}\""))
            }
            ActionKind::ExpandFaq => {
                let question = required(target, "expand_faq")?;
                self.surface.expand_faq(question).await?;
                Ok(format!("Expanded FAQ: \"{question}\""))
            }
            ActionKind::ViewDeviceDetails => {
                let device = required(target, "view_device_details")?;
                self.surface.view_device_details(device).await?;
                Ok(format!("Viewing details for \"{device}\""))
            }
            ActionKind::SelectTower => {
                let tower = required(target, "select_tower")?;
                self.surface.select_tower(tower).await?;
                Ok(format!("Selected tower \"{tower}\""))
            }
            ActionKind::QueryChatbot => {
                let question = action
                    .value
                    .as_deref()
                    .or(target)
                    .ok_or_else(|| missing("query_chatbot"))?;
                Ok(knowledge_lookup(question))
            }
            ActionKind::InputText => {
                let text = action
                    .value
                    .as_deref()
                    .or(target)
                    .ok_or_else(|| missing("input_text"))?;
                self.surface.input_text(text).await?;
                Ok(format!("Sent message: \"{}\"", truncate(text, 50)))
            }
            ActionKind::Scroll => {
                let description = required(target, "scroll")?;
                self.surface.scroll_to(description).await?;
                Ok(format!("Scrolled to \"{description}\""))
            }
            ActionKind::Speak => {
                let message = target
                    .or(action.value.as_deref())
                    .ok_or_else(|| missing("speak"))?;
                self.surface.speak(message).await?;
                Ok("Message spoken".to_owned())
            }
            ActionKind::Wait => Ok("Waiting for user input".to_owned()),
            ActionKind::Complete => Ok("Task completed".to_owned()),
        }
    }

    fn record(&self, action: &AgenticAction, outcome: &Result<String>) {
        let mut history = self.lock_history();
        if history.len() == HISTORY_CAPACITY {
            history.pop_front();
        }
        history.push_back(ActionRecord {
            kind: action.kind,
            target: action.target.clone(),
            result: match outcome {
                Ok(result) => result.clone(),
                Err(e) => e.to_string(),
            },
            succeeded: outcome.is_ok(),
            executed_at: Utc::now().timestamp_millis(),
        });
    }

    fn lock_history(&self) -> std::sync::MutexGuard<'_, VecDeque<ActionRecord>> {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn required<'a>(target: Option<&'a str>, kind: &str) -> Result<&'a str> {
    target.ok_or_else(|| missing(kind))
}

fn missing(kind: &str) -> AssistError {
    AssistError::Agent(format!("{kind} action missing its target"))
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Canned knowledge-base answers keyed on question keywords.
pub fn knowledge_lookup(question: &str) -> String {
    let question = question.to_lowercase();
    if question.contains("plan") {
        "We have three main plans: Essential ($60/mo), Plus ($80/mo), and Max ($100/mo). All include unlimited talk, text, and 5G data.".to_owned()
    } else if question.contains("device") || question.contains("phone") {
        "We have a range of devices from $449 to $999, including iPhone 16 Pro, Samsung Galaxy S25, Google Pixel 9, and more. All support 5G.".to_owned()
    } else if question.contains("network") || question.contains("coverage") {
        "Our network has extensive 5G coverage nationwide with 99% reliability. You can check specific tower status on the Network Status page.".to_owned()
    } else {
        "I can help you with plans, devices, or network questions. What specifically would you like to know?".to_owned()
    }
}

// ── Tests ───────────────────────────────────────────────────────────────
