//! Multimodal decision engine.
//!
//! Given a context snapshot (page, sentiment, conversation, user input),
//! decides what the assistant should do next. Two tiers:
//!
//! 1. A configured chat-completion provider asked for a structured JSON
//!    decision.
//! 2. A deterministic rule table keyed on sentiment value and trend,
//!    used whenever the provider is unconfigured, unreachable, or returns
//!    something unparseable. The fallback is total — it never fails.

pub mod provider;

use crate::config::{DecisionConfig, DecisionProvider};
use crate::sentiment::{sentiment_label, SentimentTrend};
use provider::{extract_json_object, ChatCompletionClient, ChatMessage};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Context and decision types
// ---------------------------------------------------------------------------

/// One conversation turn as sent over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub role: String,
    pub content: String,
}

/// A timestamped point of sentiment history as sent by clients.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SentimentPoint {
    pub value: f64,
    pub timestamp: i64,
}

/// Context snapshot submitted to `/api/decision/analyze`.
///
/// Field names mirror the browser client's JSON. Everything except the
/// current page is optional; the engine tolerates partial context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MultimodalContext {
    pub current_page: String,
    pub page_label: String,
    /// Typed or spoken user input, if any.
    pub user_input: Option<String>,
    pub scroll_position: Option<f64>,
    pub focused_element: Option<String>,
    /// Current sentiment on the -1..=1 scale.
    pub current_sentiment: Option<f64>,
    pub sentiment_label: Option<String>,
    pub sentiment_trend: Option<SentimentTrend>,
    pub sentiment_history: Option<Vec<SentimentPoint>>,
    pub recent_messages: Option<Vec<TranscriptMessage>>,
    pub conversation_topic: Option<String>,
    pub detected_intent: Option<String>,
    pub confidence: Option<f64>,
}

/// How deep the assistant's next response should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseDepth {
    Brief,
    Detailed,
    Empathetic,
}

/// A structured decision about the assistant's next move.
///
/// `action` is one of `navigate_to_X` (open form), `show_details`,
/// `offer_alternatives`, `escalate_support`, `continue_current`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionResult {
    pub action: String,
    pub confidence: f64,
    pub reasoning: String,
    pub response_depth: ResponseDepth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternative_options: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_steps: Option<Vec<String>>,
}

/// Tone/verbosity/urgency triple derived from sentiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseStyle {
    pub tone: Tone,
    pub verbosity: Verbosity,
    pub urgency: Urgency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Empathetic,
    Professional,
    Friendly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Concise,
    Moderate,
    Detailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    High,
    Medium,
    Low,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

const SYSTEM_PROMPT: &str = r#"You are the decision engine of a T-Care mobile carrier support assistant.
Analyze the multimodal context (screen position, user sentiment, conversation history, voice/text input)
and decide the best action to take and how to respond.

RULES:
1. If sentiment is NEGATIVE (frustrated), prioritize quick solutions and show empathy
2. If sentiment is POSITIVE (happy), be friendly and can provide more detail
3. If sentiment is NEUTRAL, be helpful and concise
4. Consider the current page - if the user is on Plans, help with plans
5. If sentiment is declining, offer alternative solutions or escalate
6. If sentiment is improving, continue with the current approach
7. Use conversation history to avoid repeating information

Return JSON with:
{
  "action": "navigate_to_X" | "show_details" | "offer_alternatives" | "escalate_support" | "continue_current",
  "confidence": 0.0-1.0,
  "reasoning": "brief explanation",
  "responseDepth": "brief" | "detailed" | "empathetic",
  "suggestedResponse": "what to say to the user",
  "alternativeOptions": ["option1", "option2"],
  "nextSteps": ["step1", "step2"]
}"#;

/// Two-tier decision maker: provider call, then deterministic rules.
pub struct DecisionEngine {
    client: Option<ChatCompletionClient>,
}

impl DecisionEngine {
    /// Build an engine from config, resolving API keys from the
    /// environment. A missing key for the selected provider simply leaves
    /// the engine on its rule-based tier.
    pub fn new(config: &DecisionConfig) -> Self {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let client = match config.provider {
            DecisionProvider::OpenAi => config.openai_api_key().map(|key| {
                ChatCompletionClient::new(
                    &config.openai_endpoint,
                    &config.openai_model,
                    key,
                    true,
                    timeout,
                )
            }),
            DecisionProvider::Nvidia => config.nvidia_api_key().map(|key| {
                ChatCompletionClient::new(
                    &config.nvidia_endpoint,
                    &config.nvidia_model,
                    key,
                    false,
                    timeout,
                )
            }),
        };

        if client.is_none() {
            warn!("no decision provider key configured, rule-based decisions only");
        }

        Self { client }
    }

    /// Engine with no provider; every decision comes from the rule table.
    pub fn rule_based() -> Self {
        Self { client: None }
    }

    /// Decide the assistant's next action for this context.
    ///
    /// Never fails: any provider or parse error degrades to the rule
    /// table.
    pub async fn decide(&self, context: &MultimodalContext) -> DecisionResult {
        if let Some(client) = &self.client {
            let messages = [
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user(build_prompt(context)),
            ];
            match client.complete(&messages).await {
                Ok(content) => match extract_json_object::<DecisionResult>(&content) {
                    Ok(decision) => {
                        info!(action = %decision.action, model = client.model(), "provider decision");
                        return decision;
                    }
                    Err(e) => warn!(error = %e, "provider decision unparseable, using rules"),
                },
                Err(e) => warn!(error = %e, "provider decision failed, using rules"),
            }
        }
        fallback_decision(context)
    }

    /// Whether accumulated sentiment warrants changing the current
    /// approach. Pure function of the supplied context.
    pub fn should_change_approach(&self, context: &MultimodalContext) -> bool {
        let sentiment = context.current_sentiment.unwrap_or(0.0);
        let trend = context.sentiment_trend.unwrap_or(SentimentTrend::Stable);

        if sentiment < -0.3 && trend == SentimentTrend::Declining {
            return true;
        }

        if let Some(history) = &context.sentiment_history {
            if history.len() >= 5 {
                let recent = &history[history.len() - 5..];
                let avg = recent.iter().map(|p| p.value).sum::<f64>() / recent.len() as f64;
                if avg < -0.5 {
                    return true;
                }
            }
        }

        false
    }

    /// Map sentiment into a response style triple via fixed thresholds.
    pub fn response_style(&self, context: &MultimodalContext) -> ResponseStyle {
        let sentiment = context.current_sentiment.unwrap_or(0.0);

        if sentiment <= -0.5 {
            ResponseStyle {
                tone: Tone::Empathetic,
                verbosity: Verbosity::Concise,
                urgency: Urgency::High,
            }
        } else if sentiment < 0.0 {
            ResponseStyle {
                tone: Tone::Empathetic,
                verbosity: Verbosity::Moderate,
                urgency: Urgency::Medium,
            }
        } else if sentiment > 0.5 {
            ResponseStyle {
                tone: Tone::Friendly,
                verbosity: Verbosity::Detailed,
                urgency: Urgency::Low,
            }
        } else {
            ResponseStyle {
                tone: Tone::Professional,
                verbosity: Verbosity::Moderate,
                urgency: Urgency::Medium,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Rule-based fallback
// ---------------------------------------------------------------------------

/// Deterministic decision from the sentiment/trend rule table.
///
/// Total over all context shapes, including empty ones.
pub fn fallback_decision(context: &MultimodalContext) -> DecisionResult {
    let sentiment = context.current_sentiment.unwrap_or(0.0);
    let trend = context.sentiment_trend.unwrap_or(SentimentTrend::Stable);

    let (mut action, mut depth, reasoning) = if sentiment < -0.5 && trend == SentimentTrend::Declining
    {
        (
            "offer_alternatives",
            ResponseDepth::Empathetic,
            "User is frustrated and sentiment declining - need alternative approach",
        )
    } else if sentiment < 0.0 {
        (
            "show_details",
            ResponseDepth::Empathetic,
            "User is frustrated - show more details with empathy",
        )
    } else if sentiment > 0.0 && trend == SentimentTrend::Improving {
        (
            "continue_current",
            ResponseDepth::Brief,
            "User is happy and improving - continue current approach",
        )
    } else {
        (
            "continue_current",
            ResponseDepth::Brief,
            "Neutral sentiment - standard helpful response",
        )
    };

    if let Some(input) = &context.user_input {
        if input.to_lowercase().contains("help") {
            action = "show_details";
            depth = ResponseDepth::Detailed;
        }
    }

    DecisionResult {
        action: action.to_owned(),
        confidence: 0.7,
        reasoning: reasoning.to_owned(),
        response_depth: depth,
        suggested_response: Some(suggested_response(context, depth)),
        alternative_options: Some(page_alternatives(&context.current_page)),
        next_steps: Some(next_steps(sentiment)),
    }
}

fn suggested_response(context: &MultimodalContext, depth: ResponseDepth) -> String {
    let sentiment = context.current_sentiment.unwrap_or(0.0);
    match depth {
        ResponseDepth::Empathetic => {
            if sentiment < 0.0 {
                "I understand this is frustrating. Let me help you find a solution quickly."
                    .to_owned()
            } else {
                "I'm here to help! Let's get this resolved for you.".to_owned()
            }
        }
        ResponseDepth::Detailed => format!(
            "I can help you with {}. Let me walk you through the options in detail.",
            context.page_label
        ),
        ResponseDepth::Brief => format!(
            "I can help with that. What would you like to know about {}?",
            context.page_label
        ),
    }
}

fn page_alternatives(page: &str) -> Vec<String> {
    let options: &[&str] = match page {
        "/plans" => &[
            "Compare plan features",
            "Check device compatibility",
            "See pricing details",
        ],
        "/status" => &[
            "Run network diagnostics",
            "Check outage map",
            "Restart connection",
        ],
        "/devices" => &["Filter by price", "Compare devices", "Check compatibility"],
        _ => &[],
    };
    options.iter().map(|s| (*s).to_owned()).collect()
}

fn next_steps(sentiment: f64) -> Vec<String> {
    let steps: &[&str] = if sentiment < -0.5 {
        &[
            "Offer quick solution",
            "Provide direct contact option",
            "Escalate if needed",
        ]
    } else if sentiment > 0.5 {
        &[
            "Provide detailed information",
            "Suggest related features",
            "Offer personalized recommendations",
        ]
    } else {
        &["Answer question directly", "Offer additional help"]
    };
    steps.iter().map(|s| (*s).to_owned()).collect()
}

/// Render the user-turn prompt from the context snapshot.
fn build_prompt(context: &MultimodalContext) -> String {
    let mut parts = Vec::new();

    parts.push("CURRENT CONTEXT:".to_owned());
    parts.push(format!(
        "Page: {} ({})",
        context.page_label, context.current_page
    ));

    if let Some(input) = &context.user_input {
        parts.push(format!("User Input: \"{input}\""));
    }

    if let Some(sentiment) = context.current_sentiment {
        let label = context
            .sentiment_label
            .clone()
            .unwrap_or_else(|| sentiment_label(sentiment).to_owned());
        parts.push(format!("User Sentiment: {label} ({sentiment})"));
        if let Some(trend) = context.sentiment_trend {
            parts.push(format!("Sentiment Trend: {trend}"));
        }
    }

    if let Some(focused) = &context.focused_element {
        parts.push(format!("User Focus: {focused}"));
    }

    if let Some(messages) = &context.recent_messages {
        if !messages.is_empty() {
            parts.push("\nRECENT CONVERSATION:".to_owned());
            for message in messages {
                parts.push(format!(
                    "{}: {}",
                    message.role.to_uppercase(),
                    message.content
                ));
            }
        }
    }

    if let Some(intent) = &context.detected_intent {
        parts.push(format!(
            "\nDetected Intent: {intent} (confidence: {})",
            context.confidence.unwrap_or(0.0)
        ));
    }

    parts.push(
        "\nQUESTION: Based on this multimodal context, what action should I take and how should I respond?"
            .to_owned(),
    );

    parts.join("\n")
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn context(sentiment: f64, trend: SentimentTrend) -> MultimodalContext {
        MultimodalContext {
            current_page: "/plans".to_owned(),
            page_label: "Plans".to_owned(),
            current_sentiment: Some(sentiment),
            sentiment_trend: Some(trend),
            ..MultimodalContext::default()
        }
    }

    #[tokio::test]
    async fn frustrated_declining_offers_alternatives() {
        let engine = DecisionEngine::rule_based();
        let decision = engine.decide(&context(-0.6, SentimentTrend::Declining)).await;
        assert_eq!(decision.action, "offer_alternatives");
        assert_eq!(decision.response_depth, ResponseDepth::Empathetic);
    }

    #[tokio::test]
    async fn happy_improving_continues_briefly() {
        let engine = DecisionEngine::rule_based();
        let decision = engine.decide(&context(0.8, SentimentTrend::Improving)).await;
        assert_eq!(decision.action, "continue_current");
        assert_eq!(decision.response_depth, ResponseDepth::Brief);
    }

    #[tokio::test]
    async fn help_keyword_overrides_to_detailed_details() {
        let engine = DecisionEngine::rule_based();
        let mut ctx = context(0.0, SentimentTrend::Stable);
        ctx.user_input = Some("I need some help with my plan".to_owned());
        let decision = engine.decide(&ctx).await;
        assert_eq!(decision.action, "show_details");
        assert_eq!(decision.response_depth, ResponseDepth::Detailed);
    }

    #[tokio::test]
    async fn fallback_is_total_over_empty_context() {
        let engine = DecisionEngine::rule_based();
        let decision = engine.decide(&MultimodalContext::default()).await;
        assert_eq!(decision.action, "continue_current");
        assert!(decision.confidence > 0.0);
        assert!(decision.suggested_response.is_some());
    }

    #[test]
    fn approach_changes_on_frustrated_decline() {
        let engine = DecisionEngine::rule_based();
        assert!(engine.should_change_approach(&context(-0.4, SentimentTrend::Declining)));
        assert!(!engine.should_change_approach(&context(-0.4, SentimentTrend::Stable)));
    }

    #[test]
    fn approach_changes_on_low_recent_average() {
        let engine = DecisionEngine::rule_based();
        let mut ctx = context(0.0, SentimentTrend::Stable);
        ctx.sentiment_history = Some(
            (0..6)
                .map(|i| SentimentPoint {
                    value: -0.8,
                    timestamp: i,
                })
                .collect(),
        );
        assert!(engine.should_change_approach(&ctx));

        ctx.sentiment_history = Some(
            (0..4)
                .map(|i| SentimentPoint {
                    value: -0.9,
                    timestamp: i,
                })
                .collect(),
        );
        // Fewer than five entries never triggers the average rule.
        assert!(!engine.should_change_approach(&ctx));
    }

    #[test]
    fn response_style_thresholds() {
        let engine = DecisionEngine::rule_based();

        let style = engine.response_style(&context(-0.5, SentimentTrend::Stable));
        assert_eq!(style.tone, Tone::Empathetic);
        assert_eq!(style.verbosity, Verbosity::Concise);
        assert_eq!(style.urgency, Urgency::High);

        let style = engine.response_style(&context(-0.2, SentimentTrend::Stable));
        assert_eq!(style.tone, Tone::Empathetic);
        assert_eq!(style.verbosity, Verbosity::Moderate);

        let style = engine.response_style(&context(0.8, SentimentTrend::Stable));
        assert_eq!(style.tone, Tone::Friendly);
        assert_eq!(style.urgency, Urgency::Low);

        let style = engine.response_style(&context(0.0, SentimentTrend::Stable));
        assert_eq!(style.tone, Tone::Professional);
    }

    #[test]
    fn decision_result_serializes_camel_case() {
        let decision = fallback_decision(&MultimodalContext::default());
        let json = serde_json::to_value(&decision).unwrap();
        assert!(json.get("responseDepth").is_some());
        assert!(json.get("suggestedResponse").is_some());
    }
}
