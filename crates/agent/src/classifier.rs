use std::fmt::Write as _;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use pedido_core::domain::conversation::{ConversationTurn, Intent};

use crate::llm::{json_payload, LlmClient};

const CLASSIFY_PROMPT: &str = "You classify a customer's message for a food \
ordering service. Respond with a single JSON object and nothing else:\n\
{\"intent\": \"<greeting|order|order_status|help|unknown>\", \"confidence\": <0.0-1.0>}\n\
- greeting: salutations and small talk\n\
- order: the customer wants to place or add to an order\n\
- order_status: the customer asks about an existing order\n\
- help: the customer asks what you can do or how ordering works\n\
- unknown: anything else";

/// How many prior turns are replayed into the prompt as context.
const CONTEXT_TURNS: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Classification {
    pub intent: Intent,
    pub confidence: f64,
}

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("language model call failed: {0}")]
    Completion(String),
    #[error("model response was not usable: {0}")]
    MalformedModelResponse(String),
}

pub struct Classifier {
    llm: Arc<dyn LlmClient>,
}

impl Classifier {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn classify(
        &self,
        text: &str,
        context: &[ConversationTurn],
    ) -> Result<Classification, ClassifyError> {
        let prompt = build_prompt(text, context);
        let raw = self
            .llm
            .complete(&prompt)
            .await
            .map_err(|error| ClassifyError::Completion(error.to_string()))?;
        decode_classification(&raw)
    }

    /// Customer-facing path: any classification failure degrades to
    /// `(unknown, 0.0)` rather than surfacing an error.
    pub async fn classify_or_fallback(
        &self,
        text: &str,
        context: &[ConversationTurn],
    ) -> Classification {
        match self.classify(text, context).await {
            Ok(classification) => classification,
            Err(error) => {
                warn!(event_name = "classify_fallback", error = %error, "classification degraded to unknown");
                Classification { intent: Intent::Unknown, confidence: 0.0 }
            }
        }
    }
}

fn build_prompt(text: &str, context: &[ConversationTurn]) -> String {
    let mut prompt = String::from(CLASSIFY_PROMPT);
    let recent = context.iter().rev().take(CONTEXT_TURNS).rev();
    let mut wrote_header = false;
    for turn in recent {
        if !wrote_header {
            prompt.push_str("\n\nRecent conversation:");
            wrote_header = true;
        }
        let _ = write!(prompt, "\ncustomer: {}\nassistant: {}", turn.inbound_text, turn.reply_text);
    }
    let _ = write!(prompt, "\n\nMessage: {text}");
    prompt
}

#[derive(Deserialize)]
struct RawClassification {
    intent: String,
    confidence: f64,
}

fn decode_classification(raw: &str) -> Result<Classification, ClassifyError> {
    let payload = json_payload(raw);
    let decoded: RawClassification = serde_json::from_str(payload)
        .map_err(|error| ClassifyError::MalformedModelResponse(error.to_string()))?;

    let intent = Intent::parse(&decoded.intent).ok_or_else(|| {
        ClassifyError::MalformedModelResponse(format!("unknown intent `{}`", decoded.intent))
    })?;

    if !decoded.confidence.is_finite() {
        return Err(ClassifyError::MalformedModelResponse(format!(
            "non-finite confidence {}",
            decoded.confidence
        )));
    }

    Ok(Classification { intent, confidence: decoded.confidence.clamp(0.0, 1.0) })
}
