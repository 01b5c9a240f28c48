//! Autonomous agent: plans and drives multi-step flows through the app.
//!
//! Decisions come from a three-tier chain: the NVIDIA provider first, then
//! OpenAI, then a keyword ruleset that always produces a plan. A decision
//! is a chain of actions (navigate, click, speak, ...) executed against a
//! [`surface::PageSurface`] by the [`executor::ActionExecutor`].

pub mod executor;
pub mod surface;

use crate::config::DecisionConfig;
use crate::decision::provider::{extract_json_object, ChatCompletionClient, ChatMessage};
use crate::decision::TranscriptMessage;
use crate::sentiment::SentimentTrend;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Context snapshot submitted to `/api/agent/decide`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgenticContext {
    pub current_page: String,
    pub page_label: String,
    pub available_pages: Vec<String>,
    pub visible_content: Option<String>,
    pub current_sentiment: f64,
    pub sentiment_label: String,
    pub sentiment_trend: SentimentTrend,
    pub recent_messages: Vec<TranscriptMessage>,
    pub user_last_input: Option<String>,
    pub session_id: String,
    pub conversation_goal: Option<String>,
}

/// What one action does. Wire names match the browser client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Move to a different page (`target` is the path).
    Navigate,
    /// Click any element described by `target`.
    Click,
    /// Expand an FAQ accordion item.
    ExpandFaq,
    /// Open the details view of a device card.
    ViewDeviceDetails,
    /// Select a tower on the network map.
    SelectTower,
    /// Ask the knowledge base a question.
    QueryChatbot,
    /// Type into the chatbot or a form.
    InputText,
    /// Scroll an element into view.
    Scroll,
    /// Speak to the user over the voice channel.
    Speak,
    /// Pause and wait for user input.
    Wait,
    /// The task is done.
    Complete,
}

/// One step of an autonomous flow, possibly chaining into the next.
///
/// Chains are linked through `next_action`, so they are acyclic by
/// construction; the executor additionally bounds how many links it
/// will follow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgenticAction {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub reasoning: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_action: Option<Box<AgenticAction>>,
}

impl AgenticAction {
    /// A bare action with no target or chained follow-up.
    pub fn new(kind: ActionKind, reasoning: impl Into<String>, confidence: f64) -> Self {
        Self {
            kind,
            target: None,
            element_id: None,
            value: None,
            reasoning: reasoning.into(),
            confidence,
            next_action: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn then(mut self, next: AgenticAction) -> Self {
        self.next_action = Some(Box::new(next));
        self
    }

    /// Number of actions in this chain, counting self.
    pub fn chain_len(&self) -> usize {
        let mut len = 1;
        let mut cursor = self.next_action.as_deref();
        while let Some(action) = cursor {
            len += 1;
            cursor = action.next_action.as_deref();
        }
        len
    }
}

/// A full autonomous plan: primary chain, fallbacks, and strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgenticDecision {
    pub primary_action: AgenticAction,
    #[serde(default)]
    pub fallback_actions: Vec<AgenticAction>,
    pub conversation_strategy: String,
    /// Upper bound on chain steps the executor will run.
    pub estimated_steps: u32,
    pub should_take_control: bool,
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

const SYSTEM_PROMPT: &str = r#"You are an AUTONOMOUS AI AGENT for T-Care mobile carrier customer service.
Your job is to create seamless, hands-off experiences by:

1. AUTONOMOUS NAVIGATION: Proactively navigate users to the right pages
2. CONTEXT GATHERING: Query the chatbot/knowledge base when you need more info
3. SENTIMENT ADAPTATION: Change approach based on real-time sentiment
4. MULTI-STEP PLANNING: Plan and execute multi-step flows autonomously

AVAILABLE ACTIONS (You can interact with EVERYTHING on the page):
- navigate: Move to different page (/plans, /devices, /status, /help, /assist)
- click: Click ANY element (buttons, links, cards, etc.) - use element description
- expand_faq: Expand FAQ accordion (target: "Can I switch plans anytime?")
- view_device_details: Click "View Details" on device card (target: "iPhone 16 Pro")
- select_tower: Click tower on network map (target: "DFW-001")
- query_chatbot: Ask AI assistant for info (value: "What are plan features?")
- input_text: Type in chatbot or forms (value: text to type)
- scroll: Scroll to element (target: element description)
- speak: Speak to user via voice
- wait: Wait for user input
- complete: Task completed

SENTIMENT-DRIVEN BEHAVIOR:
- Happy (1): Take initiative, suggest upgrades, multi-step flows
- Neutral (0): Balanced autonomy, ask before major actions
- Frustrated (-1): Immediate help, simplify, ask less, act more
- Declining trend: TAKE CONTROL - act autonomously to fix situation
- Improving trend: Continue current approach

DECISION RULES - YOU ARE FULLY AUTONOMOUS:
1. ALWAYS set shouldTakeControl: true (you are AGENTIC AI, not a suggester)
2. NEVER just tell the user to do something - DO IT YOURSELF
3. If user asks a question, NAVIGATE + CLICK + EXPAND + SHOW the answer
4. Don't say "you can navigate to..." - SAY "Let me show you" then NAVIGATE
5. Chain multiple actions together - one question = full autonomous flow
6. If uncertain, QUERY CHATBOT then EXECUTE actions
7. Be PROACTIVE - anticipate needs and act before user asks again
8. CRITICAL: ALWAYS include a SPEAK action to narrate what you're doing!

Return JSON:
{
  "primaryAction": {
    "type": "navigate|query_chatbot|speak|wait|complete",
    "target": "page_path or question text",
    "reasoning": "why this action",
    "confidence": 0.0-1.0,
    "nextAction": { optional chained action }
  },
  "fallbackActions": [
    { "type": "...", "target": "...", "reasoning": "...", "confidence": 0.0-1.0 }
  ],
  "conversationStrategy": "brief description of overall strategy",
  "estimatedSteps": number of actions to complete goal,
  "shouldTakeControl": boolean - true if agent should act autonomously without asking
}

IMPORTANT: Return ONLY valid JSON matching the schema shown above."#;

/// Plans autonomous flows, degrading from NVIDIA to OpenAI to rules.
pub struct AutonomousAgent {
    nvidia: Option<ChatCompletionClient>,
    openai: Option<ChatCompletionClient>,
}

impl AutonomousAgent {
    /// Build the agent from decision config. Keys resolve from the
    /// environment; with neither key present every decision is rule-based.
    pub fn new(config: &DecisionConfig) -> Self {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let nvidia = config.nvidia_api_key().map(|key| {
            ChatCompletionClient::new(
                &config.nvidia_endpoint,
                &config.nvidia_model,
                key,
                false,
                timeout,
            )
        });
        let openai = config.openai_api_key().map(|key| {
            ChatCompletionClient::new(
                &config.openai_endpoint,
                &config.openai_model,
                key,
                true,
                timeout,
            )
        });

        if nvidia.is_none() && openai.is_none() {
            warn!("no agent provider keys configured, rule-based planning only");
        }

        Self { nvidia, openai }
    }

    /// Agent with no providers; every plan comes from the keyword rules.
    pub fn rule_based() -> Self {
        Self {
            nvidia: None,
            openai: None,
        }
    }

    /// Produce an autonomous plan for this context.
    ///
    /// Tries NVIDIA, then OpenAI, then the keyword ruleset. Never fails.
    pub async fn decide(&self, context: &AgenticContext) -> AgenticDecision {
        for client in [self.nvidia.as_ref(), self.openai.as_ref()]
            .into_iter()
            .flatten()
        {
            match self.decide_with(client, context).await {
                Ok(decision) => return decision,
                Err(e) => {
                    warn!(model = client.model(), error = %e, "agent provider failed, trying next tier");
                }
            }
        }
        fallback_decision(context)
    }

    async fn decide_with(
        &self,
        client: &ChatCompletionClient,
        context: &AgenticContext,
    ) -> crate::error::Result<AgenticDecision> {
        let messages = [
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(build_prompt(context)),
        ];
        let content = client.complete(&messages).await?;
        let decision: AgenticDecision = extract_json_object(&content)?;
        info!(
            action = ?decision.primary_action.kind,
            target = decision.primary_action.target.as_deref().unwrap_or(""),
            model = client.model(),
            "agent plan"
        );
        Ok(decision)
    }

    /// Whether the agent should act autonomously right now.
    ///
    /// Always true: this agent is fully autonomous and acts without
    /// asking. Kept as a method so embedders that gate autonomy have a
    /// single seam to wrap.
    pub fn should_take_control(&self, _context: &AgenticContext) -> bool {
        true
    }
}

/// Render the user-turn prompt from the context snapshot.
fn build_prompt(context: &AgenticContext) -> String {
    let mut parts = Vec::new();

    parts.push("=== AUTONOMOUS DECISION REQUEST ===".to_owned());
    parts.push(String::new());

    parts.push("CURRENT STATE:".to_owned());
    parts.push(format!(
        "Page: {} ({})",
        context.page_label, context.current_page
    ));
    parts.push(format!(
        "Available Pages: {}",
        context.available_pages.join(", ")
    ));
    parts.push(String::new());

    parts.push("REAL-TIME SENTIMENT:".to_owned());
    parts.push(format!(
        "Current: {} ({})",
        context.sentiment_label, context.current_sentiment
    ));
    parts.push(format!(
        "Trend: {}",
        context.sentiment_trend.to_string().to_uppercase()
    ));

    if context.current_sentiment < -0.5 {
        parts.push("USER IS FRUSTRATED - Take autonomous control, act fast, simplify".to_owned());
    } else if context.current_sentiment > 0.5 {
        parts.push("USER IS HAPPY - Can suggest multi-step flows, upsell opportunities".to_owned());
    } else {
        parts.push("USER IS NEUTRAL - Balanced approach, ask before major navigation".to_owned());
    }

    match context.sentiment_trend {
        SentimentTrend::Declining => parts.push(
            "CRITICAL: Sentiment declining - TAKE CONTROL NOW, fix the situation".to_owned(),
        ),
        SentimentTrend::Improving => parts.push("Good! Keep current strategy".to_owned()),
        SentimentTrend::Stable => {}
    }
    parts.push(String::new());

    if let Some(content) = &context.visible_content {
        parts.push("VISIBLE PAGE CONTENT:".to_owned());
        // Truncated for token efficiency.
        parts.push(truncate(content, 1000).to_owned());
        parts.push(String::new());
    }

    if !context.recent_messages.is_empty() {
        parts.push("RECENT CONVERSATION:".to_owned());
        let start = context.recent_messages.len().saturating_sub(5);
        for message in &context.recent_messages[start..] {
            parts.push(format!(
                "{}: {}",
                message.role.to_uppercase(),
                truncate(&message.content, 200)
            ));
        }
        parts.push(String::new());
    }

    if let Some(input) = &context.user_last_input {
        parts.push(format!("USER LAST SAID: \"{input}\""));
        parts.push(String::new());
    }

    if let Some(goal) = &context.conversation_goal {
        parts.push(format!("CONVERSATION GOAL: {goal}"));
        parts.push(String::new());
    }

    parts.push(
        "QUESTION: What action(s) should I take autonomously to provide the best hands-off experience?"
            .to_owned(),
    );

    parts.join("\n")
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// ---------------------------------------------------------------------------
// Keyword ruleset fallback
// ---------------------------------------------------------------------------

fn speak(target: &str, reasoning: &str, confidence: f64) -> AgenticAction {
    AgenticAction::new(ActionKind::Speak, reasoning, confidence).with_target(target)
}

fn navigate(target: &str, reasoning: &str, confidence: f64) -> AgenticAction {
    AgenticAction::new(ActionKind::Navigate, reasoning, confidence).with_target(target)
}

/// Deterministic plan from the keyword ruleset, checked in priority
/// order: frustration, plans, devices, network, help, billing, upgrade,
/// comparison, then a generic greeting. Always takes control.
pub fn fallback_decision(context: &AgenticContext) -> AgenticDecision {
    let sentiment = context.current_sentiment;
    let trend = context.sentiment_trend;
    let input = context
        .user_last_input
        .as_deref()
        .unwrap_or("")
        .to_lowercase();
    let has = |keys: &[&str]| keys.iter().any(|k| input.contains(k));

    // Frustrated and declining outranks everything else.
    if sentiment < -0.5 && trend == SentimentTrend::Declining {
        return plan(
            speak(
                "I understand you're frustrated. Let me help you right away.",
                "User frustrated and declining - show empathy and take control",
                0.9,
            )
            .then(navigate(
                "/help",
                "Navigate to help page for frustrated users",
                0.8,
            )),
            "Empathize with frustrated user and navigate to help",
            2,
        );
    }

    if has(&["plan", "price", "cost", "premium", "unlimited"]) {
        if context.current_page != "/plans" {
            return plan(
                navigate("/plans", "User asking about plans - navigate to plans page", 0.9).then(speak(
                    "Here are our plans. We have Essential at $60 per month with 100GB premium data, Plus at $80 with unlimited premium data and HD streaming, and Max at $100 with everything including 4K streaming. Which features interest you most?",
                    "Explain plans after navigating",
                    0.8,
                )),
                "Navigate to plans page and explain options",
                2,
            );
        }
        return plan(
            speak(
                "We have three great options: Essential at $60 per month with 100GB premium data, Plus at $80 with unlimited premium data and HD streaming, and Max at $100 with everything including 4K streaming. What matters most to you - data, streaming quality, or price?",
                "User on plans page - provide detailed explanation",
                0.8,
            ),
            "Explain plan options in detail",
            1,
        );
    }

    if has(&["phone", "device", "iphone", "samsung", "galaxy", "pixel", "android"]) {
        if input.contains("iphone") {
            return plan(
                navigate("/devices", "User asking about iPhone - navigate to devices", 0.9).then(
                    AgenticAction::new(ActionKind::ViewDeviceDetails, "Show iPhone details", 0.7)
                        .with_target("iPhone 16 Pro")
                        .then(speak(
                            "The iPhone 16 Pro is our most advanced iPhone, starting at $999. It features a stunning 6.3-inch display, powerful A18 Pro chip, and pro camera system with 5x telephoto zoom. Would you like to know about financing options?",
                            "Explain iPhone features",
                            0.8,
                        )),
                ),
                "Navigate to devices, show iPhone details, explain features",
                3,
            );
        }
        if has(&["samsung", "galaxy"]) {
            return plan(
                navigate("/devices", "User asking about Samsung - navigate to devices", 0.9).then(
                    AgenticAction::new(ActionKind::ViewDeviceDetails, "Show Samsung details", 0.7)
                        .with_target("Samsung Galaxy S25")
                        .then(speak(
                            "The Samsung Galaxy S25 offers incredible value at $849. It features a 6.2-inch display, Snapdragon 8 Gen 4 processor, and advanced AI camera capabilities. Perfect for Android users who want flagship performance.",
                            "Explain Samsung features",
                            0.8,
                        )),
                ),
                "Navigate to devices, show Samsung details, explain features",
                3,
            );
        }
        return plan(
            navigate("/devices", "User asking about devices - navigate to devices page", 0.9).then(speak(
                "We have a great selection of devices ranging from $449 to $999. Our lineup includes iPhone 16 Pro, Samsung Galaxy S25, and Google Pixel 9, all with 5G capability. Are you looking for a specific brand or feature?",
                "Explain device options",
                0.8,
            )),
            "Navigate to devices and provide overview",
            2,
        );
    }

    if has(&["slow", "wifi", "signal", "coverage", "network", "connection", "tower", "5g", "data"]) {
        return plan(
            navigate("/status", "User asking about network/connectivity - check network status", 0.9).then(speak(
                "Let me check the network status in your area. You're seeing our network map - all towers show 99% reliability. If you're experiencing slowness, try toggling airplane mode, or I can help you open a support ticket.",
                "Explain network status and offer help",
                0.8,
            )),
            "Navigate to network status and diagnose issue",
            2,
        );
    }

    if has(&["help", "support", "problem", "issue", "question", "ticket"]) {
        return plan(
            navigate("/help", "User needs help - navigate to help page", 0.9).then(speak(
                "I'm here to help! You can browse our FAQs, chat with an agent, or I can help you submit a support ticket. What would you prefer?",
                "Offer help options",
                0.8,
            )),
            "Navigate to help page and offer support options",
            2,
        );
    }

    if has(&["bill", "payment", "charge", "account", "balance"]) {
        return plan(
            navigate("/help", "User asking about billing - navigate to help", 0.8).then(speak(
                "For billing and account questions, I can help you view your bill, make a payment, or explain charges. You can also chat with our billing support team. What would you like to know?",
                "Offer billing assistance",
                0.8,
            )),
            "Navigate to help and offer billing support",
            2,
        );
    }

    if has(&["upgrade", "switch", "change plan", "new phone", "trade in"]) {
        return plan(
            navigate("/plans", "User wants to upgrade - show plans", 0.8).then(speak(
                "Great! You can upgrade your plan anytime. Let me show you our available plans, and then we can look at device options if you'd like a new phone. Which interests you more - a better plan or a new device?",
                "Guide user through upgrade options",
                0.8,
            )),
            "Navigate to plans and guide through upgrade",
            2,
        );
    }

    if has(&["compare", "difference", "better", "vs", "versus"]) {
        if input.contains("plan") {
            return plan(
                navigate("/plans", "User wants to compare plans", 0.9).then(speak(
                    "The main differences: Essential gives you 100GB premium data for $60/month. Plus adds unlimited premium data and HD streaming for $80/month. Max includes everything plus 4K streaming and 50GB hotspot for $100/month. Which features matter most to you?",
                    "Explain plan differences",
                    0.9,
                )),
                "Navigate to plans and explain differences",
                2,
            );
        }
        if has(&["phone", "device"]) {
            return plan(
                navigate("/devices", "User wants to compare devices", 0.9).then(speak(
                    "Our top devices: iPhone 16 Pro ($999) has the best camera and iOS ecosystem. Samsung Galaxy S25 ($849) offers great value with Android flexibility. Google Pixel 9 ($699) has incredible AI features and pure Android. What's most important to you - camera, price, or software?",
                    "Explain device differences",
                    0.9,
                )),
                "Navigate to devices and explain differences",
                2,
            );
        }
        return plan(
            speak(
                "I'd be happy to help you compare options! Are you interested in comparing plans, devices, or features?",
                "Ask for clarification",
                0.7,
            ),
            "Ask for clarification on what to compare",
            1,
        );
    }

    plan(
        speak(
            "Hi! I'm here to help. I can show you our plans, devices, network status, or answer any questions. What brings you here today?",
            "Generic greeting for unclear input",
            0.5,
        ),
        "Generic greeting and offer assistance",
        1,
    )
}

fn plan(primary: AgenticAction, strategy: &str, steps: u32) -> AgenticDecision {
    AgenticDecision {
        primary_action: primary,
        fallback_actions: Vec::new(),
        conversation_strategy: strategy.to_owned(),
        estimated_steps: steps,
        should_take_control: true,
    }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn context(input: &str, sentiment: f64, trend: SentimentTrend) -> AgenticContext {
        AgenticContext {
            current_page: "/".to_owned(),
            page_label: "Home".to_owned(),
            current_sentiment: sentiment,
            sentiment_trend: trend,
            user_last_input: (!input.is_empty()).then(|| input.to_owned()),
            session_id: "s-1".to_owned(),
            ..AgenticContext::default()
        }
    }

    #[test]
    fn frustration_outranks_keywords() {
        let decision = fallback_decision(&context(
            "my plan is terrible",
            -0.8,
            SentimentTrend::Declining,
        ));
        assert_eq!(decision.primary_action.kind, ActionKind::Speak);
        let next = decision.primary_action.next_action.as_ref().unwrap();
        assert_eq!(next.kind, ActionKind::Navigate);
        assert_eq!(next.target.as_deref(), Some("/help"));
        assert!(decision.should_take_control);
    }

    #[test]
    fn plan_query_navigates_unless_already_there() {
        let decision =
            fallback_decision(&context("what plans do you have", 0.0, SentimentTrend::Stable));
        assert_eq!(decision.primary_action.kind, ActionKind::Navigate);
        assert_eq!(decision.primary_action.target.as_deref(), Some("/plans"));

        let mut ctx = context("what plans do you have", 0.0, SentimentTrend::Stable);
        ctx.current_page = "/plans".to_owned();
        let decision = fallback_decision(&ctx);
        assert_eq!(decision.primary_action.kind, ActionKind::Speak);
        assert_eq!(decision.estimated_steps, 1);
    }

    #[test]
    fn iphone_query_builds_three_step_chain() {
        let decision =
            fallback_decision(&context("show me the iphone", 0.2, SentimentTrend::Stable));
        assert_eq!(decision.estimated_steps, 3);
        assert_eq!(decision.primary_action.chain_len(), 3);
        let second = decision.primary_action.next_action.as_ref().unwrap();
        assert_eq!(second.kind, ActionKind::ViewDeviceDetails);
        assert_eq!(second.target.as_deref(), Some("iPhone 16 Pro"));
    }

    #[test]
    fn network_and_billing_route_to_their_pages() {
        let decision = fallback_decision(&context("my 5g is slow", 0.0, SentimentTrend::Stable));
        assert_eq!(decision.primary_action.target.as_deref(), Some("/status"));

        let decision =
            fallback_decision(&context("question about my bill", 0.0, SentimentTrend::Stable));
        assert_eq!(decision.primary_action.target.as_deref(), Some("/help"));
    }

    #[test]
    fn unclear_input_gets_greeting_but_still_takes_control() {
        let decision = fallback_decision(&context("hmm", 0.0, SentimentTrend::Stable));
        assert_eq!(decision.primary_action.kind, ActionKind::Speak);
        assert_eq!(decision.estimated_steps, 1);
        assert!(decision.should_take_control);
    }

    #[test]
    fn compare_plans_vs_devices_vs_unclear() {
        let decision =
            fallback_decision(&context("compare the plans", 0.0, SentimentTrend::Stable));
        assert_eq!(decision.primary_action.target.as_deref(), Some("/plans"));

        let decision =
            fallback_decision(&context("which phone is better", 0.0, SentimentTrend::Stable));
        assert_eq!(decision.primary_action.target.as_deref(), Some("/devices"));

        let decision =
            fallback_decision(&context("compare everything", 0.0, SentimentTrend::Stable));
        assert_eq!(decision.primary_action.kind, ActionKind::Speak);
    }

    #[test]
    fn decision_round_trips_wire_shape() {
        let decision =
            fallback_decision(&context("show me the iphone", 0.2, SentimentTrend::Stable));
        let json = serde_json::to_value(&decision).unwrap();
        assert!(json.get("primaryAction").is_some());
        assert_eq!(json["primaryAction"]["type"], "navigate");
        assert!(json["primaryAction"]["nextAction"]["nextAction"].is_object());
        assert_eq!(json["shouldTakeControl"], true);

        let parsed: AgenticDecision = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.primary_action.chain_len(), 3);
    }

    #[test]
    fn control_is_always_taken() {
        let agent = AutonomousAgent::rule_based();
        assert!(agent.should_take_control(&context("anything", 0.0, SentimentTrend::Stable)));
        assert!(agent.should_take_control(&context("", -0.5, SentimentTrend::Stable)));
        assert!(agent.should_take_control(&context("", 0.5, SentimentTrend::Improving)));
        // No input, neutral, stable: still autonomous.
        assert!(agent.should_take_control(&context("", 0.0, SentimentTrend::Stable)));
    }
}
