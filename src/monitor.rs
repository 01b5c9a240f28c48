//! Proactive sentiment triggers.
//!
//! Watches the sample stream and fires agent actions when sentiment
//! patterns warrant stepping in (persistent frustration, rapid drops,
//! frustration on specific pages). Each action name carries a cooldown
//! so triggers cannot spam the user.

use crate::agent::executor::ActionExecutor;
use crate::agent::{ActionKind, AgenticAction};
use crate::sentiment::{SentimentSample, SentimentTrend};
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info, warn};

/// Rolling sample window the trigger conditions look at.
const HISTORY_SIZE: usize = 10;

/// Inputs a trigger condition sees for one sample.
pub struct TriggerInput<'a> {
    pub sample: SentimentSample,
    pub trend: SentimentTrend,
    /// Route the user is currently on.
    pub route: &'a str,
    /// Recent samples, oldest first, including the current one.
    pub history: &'a [SentimentSample],
}

type Condition = Box<dyn Fn(&TriggerInput<'_>) -> bool + Send + Sync>;

/// One sentiment-driven trigger.
pub struct SentimentTrigger {
    /// Cooldowns are keyed by action name, so triggers that fire the
    /// same kind of intervention share one.
    pub action: &'static str,
    pub description: &'static str,
    pub cooldown_ms: i64,
    pub condition: Condition,
    /// What the agent says when the trigger fires.
    pub utterance: &'static str,
}

/// Watches sentiment and fires proactive actions through the executor.
pub struct SentimentMonitor {
    triggers: Vec<SentimentTrigger>,
    last_fired: HashMap<&'static str, i64>,
    history: VecDeque<SentimentSample>,
}

impl Default for SentimentMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl SentimentMonitor {
    pub fn new() -> Self {
        Self {
            triggers: default_triggers(),
            last_fired: HashMap::new(),
            history: VecDeque::with_capacity(HISTORY_SIZE),
        }
    }

    /// Monitor with a custom trigger table.
    pub fn with_triggers(triggers: Vec<SentimentTrigger>) -> Self {
        Self {
            triggers,
            last_fired: HashMap::new(),
            history: VecDeque::with_capacity(HISTORY_SIZE),
        }
    }

    pub fn add_trigger(&mut self, trigger: SentimentTrigger) {
        self.triggers.push(trigger);
    }

    /// Forget history and cooldowns, e.g. on session restart.
    pub fn reset(&mut self) {
        self.history.clear();
        self.last_fired.clear();
    }

    pub fn history(&self) -> Vec<SentimentSample> {
        self.history.iter().copied().collect()
    }

    /// Feed one sample; fires every eligible trigger.
    pub async fn process(
        &mut self,
        sample: SentimentSample,
        trend: SentimentTrend,
        route: &str,
        executor: &ActionExecutor,
    ) {
        self.process_at(Utc::now().timestamp_millis(), sample, trend, route, executor)
            .await;
    }

    async fn process_at(
        &mut self,
        now_ms: i64,
        sample: SentimentSample,
        trend: SentimentTrend,
        route: &str,
        executor: &ActionExecutor,
    ) {
        if self.history.len() == HISTORY_SIZE {
            self.history.pop_front();
        }
        self.history.push_back(sample);

        debug!(
            value = sample.value,
            trend = %trend,
            route,
            history = self.history.len(),
            "monitor processing sample"
        );

        let history: Vec<SentimentSample> = self.history.iter().copied().collect();
        let input = TriggerInput {
            sample,
            trend,
            route,
            history: &history,
        };

        let mut fired = Vec::new();
        for trigger in &self.triggers {
            let last = self.last_fired.get(trigger.action).copied().unwrap_or(0);
            if now_ms - last < trigger.cooldown_ms {
                continue;
            }
            if (trigger.condition)(&input) {
                fired.push((trigger.action, trigger.description, trigger.utterance));
            }
        }

        for (action, description, utterance) in fired {
            info!(action, description, "sentiment trigger fired");
            self.last_fired.insert(action, now_ms);
            let speak =
                AgenticAction::new(ActionKind::Speak, description, 0.8).with_target(utterance);
            // Trigger failures never take the monitor down.
            if let Err(e) = executor.execute_action(&speak).await {
                warn!(action, error = %e, "sentiment trigger action failed");
            }
        }
    }
}

fn default_triggers() -> Vec<SentimentTrigger> {
    vec![
        // Persistent frustration: three frustrated readings in a row.
        SentimentTrigger {
            action: "proactive_help",
            description: "Offer help when user is persistently frustrated",
            cooldown_ms: 30_000,
            condition: Box::new(|input| {
                input.history.len() >= 3
                    && input.history[input.history.len() - 3..]
                        .iter()
                        .all(|s| f64::from(s.value) < -0.3)
            }),
            utterance:
                "I've noticed this has been frustrating. Let me help you right away - what can I sort out for you?",
        },
        // Declining sentiment while browsing devices.
        SentimentTrigger {
            action: "suggest_alternative",
            description: "Suggest alternative device when sentiment declines",
            cooldown_ms: 45_000,
            condition: Box::new(|input| {
                input.trend == SentimentTrend::Declining
                    && input.sample.value < 0
                    && input.route == "/devices"
            }),
            utterance:
                "Not finding the right device? I can suggest some alternatives or compare options for you.",
        },
        // Frustrated on the network status page.
        SentimentTrigger {
            action: "proactive_help",
            description: "Offer help with network issues when frustrated",
            cooldown_ms: 40_000,
            condition: Box::new(|input| {
                f64::from(input.sample.value) < -0.5 && input.route == "/status"
            }),
            utterance:
                "Network trouble is frustrating. I can run a quick check on your area or open a support ticket.",
        },
        // Rapid drop: was happy five samples ago, frustrated now.
        SentimentTrigger {
            action: "proactive_help",
            description: "Immediate help when sentiment drops rapidly",
            cooldown_ms: 35_000,
            condition: Box::new(|input| {
                input.history.len() >= 5 && {
                    let recent = &input.history[input.history.len() - 5..];
                    f64::from(recent[0].value) > 0.5 && f64::from(input.sample.value) < -0.3
                }
            }),
            utterance: "Something seems to have gone wrong just now. Tell me what happened and I'll fix it.",
        },
        // Frustrated on the plans page.
        SentimentTrigger {
            action: "suggest_alternative",
            description: "Suggest alternative plan when frustrated",
            cooldown_ms: 45_000,
            condition: Box::new(|input| {
                f64::from(input.sample.value) < -0.3 && input.route == "/plans"
            }),
            utterance:
                "If none of these plans look right, I can walk you through the differences or find a better fit.",
        },
    ]
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::agent::surface::ScriptedSurface;
    use std::sync::Arc;
    use std::time::Duration;

    fn executor(surface: Arc<ScriptedSurface>) -> ActionExecutor {
        ActionExecutor::new(surface).with_step_delay(Duration::ZERO)
    }

    fn sample(value: i8) -> SentimentSample {
        SentimentSample::now(value)
    }

    #[tokio::test]
    async fn persistent_frustration_fires_once_per_cooldown() {
        let surface = Arc::new(ScriptedSurface::new());
        let exec = executor(surface.clone());
        let mut monitor = SentimentMonitor::new();

        for i in 0..3 {
            monitor
                .process_at(i, sample(-1), SentimentTrend::Stable, "/", &exec)
                .await;
        }
        assert_eq!(surface.spoken().len(), 1);

        // Within cooldown: another frustrated sample stays silent.
        monitor
            .process_at(10_000, sample(-1), SentimentTrend::Stable, "/", &exec)
            .await;
        assert_eq!(surface.spoken().len(), 1);

        // Past cooldown it may fire again.
        monitor
            .process_at(40_000, sample(-1), SentimentTrend::Stable, "/", &exec)
            .await;
        assert_eq!(surface.spoken().len(), 2);
    }

    #[tokio::test]
    async fn declining_on_devices_suggests_alternative() {
        let surface = Arc::new(ScriptedSurface::new());
        let exec = executor(surface.clone());
        let mut monitor = SentimentMonitor::new();

        monitor
            .process_at(0, sample(-1), SentimentTrend::Declining, "/devices", &exec)
            .await;
        let spoken = surface.spoken();
        assert_eq!(spoken.len(), 1);
        assert!(spoken[0].contains("alternatives"));

        // Same condition elsewhere does not fire.
        let surface2 = Arc::new(ScriptedSurface::new());
        let exec2 = executor(surface2.clone());
        let mut monitor2 = SentimentMonitor::new();
        monitor2
            .process_at(0, sample(-1), SentimentTrend::Declining, "/help", &exec2)
            .await;
        assert!(surface2.spoken().is_empty());
    }

    #[tokio::test]
    async fn rapid_drop_needs_five_samples() {
        let surface = Arc::new(ScriptedSurface::new());
        let exec = executor(surface.clone());
        let mut monitor = SentimentMonitor::new();

        // happy, then drift down to frustrated over five samples
        for (i, v) in [1, 0, 0, 0].iter().enumerate() {
            monitor
                .process_at(i as i64, sample(*v), SentimentTrend::Stable, "/", &exec)
                .await;
        }
        assert!(surface.spoken().is_empty());

        monitor
            .process_at(5, sample(-1), SentimentTrend::Stable, "/", &exec)
            .await;
        let spoken = surface.spoken();
        assert_eq!(spoken.len(), 1);
        assert!(spoken[0].contains("gone wrong"));
    }

    #[tokio::test]
    async fn shared_action_name_shares_cooldown() {
        let surface = Arc::new(ScriptedSurface::new());
        let exec = executor(surface.clone());
        let mut monitor = SentimentMonitor::new();

        // Fire proactive_help via the status-page trigger.
        monitor
            .process_at(0, sample(-1), SentimentTrend::Stable, "/status", &exec)
            .await;
        assert_eq!(surface.spoken().len(), 1);

        // Persistent-frustration would fire too, but shares the
        // proactive_help cooldown.
        for i in 1..4 {
            monitor
                .process_at(i, sample(-1), SentimentTrend::Stable, "/", &exec)
                .await;
        }
        assert_eq!(surface.spoken().len(), 1);
    }

    #[tokio::test]
    async fn reset_clears_history_and_cooldowns() {
        let surface = Arc::new(ScriptedSurface::new());
        let exec = executor(surface.clone());
        let mut monitor = SentimentMonitor::new();

        for i in 0..3 {
            monitor
                .process_at(i, sample(-1), SentimentTrend::Stable, "/", &exec)
                .await;
        }
        assert_eq!(monitor.history().len(), 3);

        monitor.reset();
        assert!(monitor.history().is_empty());

        for i in 0..3 {
            monitor
                .process_at(100 + i, sample(-1), SentimentTrend::Stable, "/", &exec)
                .await;
        }
        assert_eq!(surface.spoken().len(), 2);
    }
}
