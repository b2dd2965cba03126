use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::customer::CustomerId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnId(pub String);

/// Closed set of classified message purposes. Anything the model emits
/// outside this set is rejected at decode time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Greeting,
    Order,
    OrderStatus,
    Help,
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::Order => "order",
            Self::OrderStatus => "order_status",
            Self::Help => "help",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "greeting" => Some(Self::Greeting),
            "order" => Some(Self::Order),
            "order_status" => Some(Self::OrderStatus),
            "help" => Some(Self::Help),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

/// One inbound/outbound pair with its classification metadata. Append-only,
/// used as conversational context and audit, never as a business entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: TurnId,
    pub customer_id: CustomerId,
    pub inbound_text: String,
    pub intent: Intent,
    pub confidence: f64,
    pub reply_text: String,
    pub created_at: DateTime<Utc>,
}
