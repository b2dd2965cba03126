use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerId(pub String);

/// A customer is keyed by the identity the channel adapter hands us
/// (phone number for WhatsApp/SMS, handle for chat). Created on first
/// inbound message and never deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub identity: String,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}
