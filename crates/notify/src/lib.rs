//! Notification dispatch - multi-channel fan-out with policy enforcement
//!
//! Sends customer and merchant notifications over chat, email, and SMS
//! gateways. Policy lives here, not in the senders: preference filtering,
//! the rolling-hour rate limit, the SMS cooldown, and the bounded retry are
//! applied before a transport ever sees the message, and every attempted
//! channel leaves an audit record whatever the outcome.

pub mod notifier;
pub mod ratelimit;
pub mod retry;
pub mod senders;

pub use notifier::Notifier;
pub use ratelimit::RateLimiter;
pub use retry::RetryPolicy;
pub use senders::{ChannelSender, HttpGatewaySender, NoopSender, TransportError};
