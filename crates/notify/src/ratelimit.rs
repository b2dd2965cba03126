use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use pedido_core::domain::notification::{Channel, SuppressionReason};

/// Per-(recipient, channel) send accounting: a rolling-hour window plus, for
/// SMS, a minimum spacing between consecutive sends. Check and record happen
/// under one lock so concurrent senders cannot both claim the last slot.
pub struct RateLimiter {
    hourly_cap: u32,
    sms_cooldown: Duration,
    windows: Mutex<HashMap<(String, Channel), SendWindow>>,
}

#[derive(Default)]
struct SendWindow {
    sends: VecDeque<DateTime<Utc>>,
    last_send: Option<DateTime<Utc>>,
}

impl RateLimiter {
    pub fn new(hourly_cap: u32, sms_cooldown_minutes: u32) -> Self {
        Self {
            hourly_cap,
            sms_cooldown: Duration::minutes(i64::from(sms_cooldown_minutes)),
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Claims one send slot, or reports why the send must be suppressed.
    /// Suppression is a policy outcome, not an error.
    pub async fn try_acquire(
        &self,
        recipient: &str,
        channel: Channel,
        now: DateTime<Utc>,
    ) -> Result<(), SuppressionReason> {
        let mut windows = self.windows.lock().await;
        let window = windows.entry((recipient.to_string(), channel)).or_default();

        let horizon = now - Duration::hours(1);
        while window.sends.front().is_some_and(|sent| *sent <= horizon) {
            window.sends.pop_front();
        }

        if window.sends.len() >= self.hourly_cap as usize {
            return Err(SuppressionReason::RateLimit);
        }

        if channel == Channel::Sms {
            if let Some(last) = window.last_send {
                if now - last < self.sms_cooldown {
                    return Err(SuppressionReason::Cooldown);
                }
            }
        }

        window.sends.push_back(now);
        window.last_send = Some(now);
        Ok(())
    }
}
