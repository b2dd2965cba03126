use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use secrecy::ExposeSecret;
use tracing::{info, warn};
use uuid::Uuid;

use pedido_core::config::NotificationsConfig;
use pedido_core::domain::notification::{
    Channel, DeliveryOutcome, Notification, NotificationId, Priority,
};
use pedido_core::domain::order::{Order, OrderStatus};
use pedido_core::lifecycle::{NotifyError, TransitionNotifier};
use pedido_core::store::{CustomerStore, NotificationAudit};

use crate::ratelimit::RateLimiter;
use crate::retry::RetryPolicy;
use crate::senders::{ChannelSender, HttpGatewaySender, NoopSender, TransportError};

/// Multi-channel dispatcher. Applies preference filtering, the rate limiter,
/// and the retry policy, and appends one audit record per attempted channel.
pub struct Notifier {
    senders: HashMap<Channel, Arc<dyn ChannelSender>>,
    limiter: RateLimiter,
    retry: RetryPolicy,
    audit: Arc<dyn NotificationAudit>,
    customers: Arc<dyn CustomerStore>,
    preferences: HashMap<String, Vec<Channel>>,
    merchant_recipient: Option<String>,
}

impl Notifier {
    pub fn new(
        senders: Vec<Arc<dyn ChannelSender>>,
        limiter: RateLimiter,
        retry: RetryPolicy,
        audit: Arc<dyn NotificationAudit>,
        customers: Arc<dyn CustomerStore>,
        preferences: HashMap<String, Vec<Channel>>,
        merchant_recipient: Option<String>,
    ) -> Self {
        let senders = senders.into_iter().map(|sender| (sender.channel(), sender)).collect();
        Self { senders, limiter, retry, audit, customers, preferences, merchant_recipient }
    }

    /// Wires HTTP gateway senders for every channel with a configured URL and
    /// a logging no-op for the rest.
    pub fn from_config(
        config: &NotificationsConfig,
        audit: Arc<dyn NotificationAudit>,
        customers: Arc<dyn CustomerStore>,
    ) -> Result<Self, TransportError> {
        let token = config.gateway_token.as_ref().map(|token| token.expose_secret().to_string());
        let mut senders: Vec<Arc<dyn ChannelSender>> = Vec::with_capacity(Channel::ALL.len());
        for channel in Channel::ALL {
            let url = match channel {
                Channel::Chat => config.chat_webhook_url.as_ref(),
                Channel::Email => config.email_gateway_url.as_ref(),
                Channel::Sms => config.sms_gateway_url.as_ref(),
            };
            let sender: Arc<dyn ChannelSender> = match url {
                Some(url) => Arc::new(HttpGatewaySender::new(
                    channel,
                    url.clone(),
                    token.clone(),
                    config.send_timeout_secs,
                )?),
                None => Arc::new(NoopSender::new(channel)),
            };
            senders.push(sender);
        }

        Ok(Self::new(
            senders,
            RateLimiter::new(config.hourly_cap, config.sms_cooldown_minutes),
            RetryPolicy::new(config.retry_max_attempts, config.retry_delay_ms),
            audit,
            customers,
            config.preferences.clone(),
            config.merchant_recipient.clone(),
        ))
    }

    /// Dispatches `body` on every requested channel the recipient accepts.
    /// Channels removed by preference are not attempted and leave no audit
    /// record; every attempted channel is audited whatever its outcome.
    pub async fn notify(
        &self,
        recipient: &str,
        channels_requested: &[Channel],
        body: &str,
        notification_type: &str,
        priority: Priority,
    ) -> Vec<(Channel, DeliveryOutcome)> {
        let allowed = self.preferences.get(recipient);
        let mut outcomes = Vec::new();

        for &channel in channels_requested {
            if allowed.is_some_and(|channels| !channels.contains(&channel)) {
                continue;
            }

            let outcome = match self.limiter.try_acquire(recipient, channel, Utc::now()).await {
                Err(reason) => {
                    info!(
                        event_name = "notify.suppressed",
                        channel = channel.as_str(),
                        recipient,
                        reason = ?reason,
                        "send suppressed by policy"
                    );
                    DeliveryOutcome::Suppressed(reason)
                }
                Ok(()) => self.dispatch(channel, recipient, body).await,
            };

            self.record(recipient, channel, body, priority, notification_type, outcome).await;
            outcomes.push((channel, outcome));
        }

        outcomes
    }

    async fn dispatch(&self, channel: Channel, recipient: &str, body: &str) -> DeliveryOutcome {
        let Some(sender) = self.senders.get(&channel) else {
            warn!(
                event_name = "notify.no_sender",
                channel = channel.as_str(),
                "no sender wired for channel"
            );
            return DeliveryOutcome::Failed;
        };

        match self.retry.run(|| sender.send(recipient, body)).await {
            Ok(()) => DeliveryOutcome::Sent,
            Err(error) => {
                warn!(
                    event_name = "notify.send_failed",
                    channel = channel.as_str(),
                    recipient,
                    error = %error,
                    "send failed after retry"
                );
                DeliveryOutcome::Failed
            }
        }
    }

    async fn record(
        &self,
        recipient: &str,
        channel: Channel,
        body: &str,
        priority: Priority,
        notification_type: &str,
        outcome: DeliveryOutcome,
    ) {
        let notification = Notification {
            id: NotificationId(Uuid::new_v4().to_string()),
            recipient: recipient.to_string(),
            channel,
            body: body.to_string(),
            priority,
            notification_type: notification_type.to_string(),
            outcome,
            created_at: Utc::now(),
        };
        if let Err(error) = self.audit.append(notification).await {
            warn!(
                event_name = "notify.audit_failed",
                channel = channel.as_str(),
                error = %error,
                "audit record not persisted"
            );
        }
    }
}

#[async_trait]
impl TransitionNotifier for Notifier {
    async fn order_transitioned(
        &self,
        order: &Order,
        previous: OrderStatus,
        reason: Option<&str>,
    ) -> Result<(), NotifyError> {
        let customer = self
            .customers
            .find_by_id(&order.customer_id)
            .await
            .map_err(|error| NotifyError(error.to_string()))?
            .ok_or_else(|| {
                NotifyError(format!("customer `{}` not found", order.customer_id.0))
            })?;

        let priority = transition_priority(order.status);
        let body = customer_transition_body(order, reason);
        self.notify(&customer.identity, &Channel::ALL, &body, "order_transition", priority).await;

        if let Some(merchant) = &self.merchant_recipient {
            let body = format!(
                "Order {}: {} -> {}",
                order.id.0,
                previous.as_str(),
                order.status.as_str()
            );
            self.notify(merchant, &Channel::ALL, &body, "order_transition", priority).await;
        }

        Ok(())
    }
}

fn transition_priority(status: OrderStatus) -> Priority {
    match status {
        OrderStatus::Cancelled | OrderStatus::ReadyForPickup => Priority::High,
        OrderStatus::Delivered => Priority::Low,
        _ => Priority::Medium,
    }
}

fn customer_transition_body(order: &Order, reason: Option<&str>) -> String {
    let base = match order.status {
        OrderStatus::Confirmed => format!("Your order {} is confirmed.", order.id.0),
        OrderStatus::Preparing => format!("Your order {} is being prepared.", order.id.0),
        OrderStatus::ReadyForPickup => format!("Your order {} is ready for pickup!", order.id.0),
        OrderStatus::PickedUp => format!("Your order {} is on its way.", order.id.0),
        OrderStatus::Delivered => format!("Your order {} has been delivered. Enjoy!", order.id.0),
        OrderStatus::Cancelled => format!("Your order {} has been cancelled.", order.id.0),
        OrderStatus::Pending => format!("Your order {} is awaiting confirmation.", order.id.0),
    };
    match reason {
        Some(reason) => format!("{base} ({reason})"),
        None => base,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use tokio::sync::Mutex;

    use pedido_core::domain::customer::{Customer, CustomerId};
    use pedido_core::domain::notification::{Channel, DeliveryOutcome, Priority, SuppressionReason};
    use pedido_core::domain::order::{LineItem, Order, OrderId, OrderStatus};
    use pedido_core::lifecycle::TransitionNotifier;
    use pedido_core::store::CustomerStore;
    use pedido_db::repositories::{InMemoryCustomerRepository, InMemoryNotificationAudit};

    use crate::ratelimit::RateLimiter;
    use crate::retry::RetryPolicy;
    use crate::senders::{ChannelSender, TransportError};

    use super::Notifier;

    /// Records every send; replays a script of failures, succeeding once the
    /// script is exhausted.
    struct ScriptedSender {
        channel: Channel,
        calls: Mutex<Vec<String>>,
        failures: Mutex<VecDeque<TransportError>>,
    }

    impl ScriptedSender {
        fn new(channel: Channel) -> Arc<Self> {
            Arc::new(Self {
                channel,
                calls: Mutex::new(Vec::new()),
                failures: Mutex::new(VecDeque::new()),
            })
        }

        fn failing(channel: Channel, failures: usize) -> Arc<Self> {
            let script = (0..failures)
                .map(|_| TransportError::Request("gateway unreachable".to_string()))
                .collect();
            Arc::new(Self {
                channel,
                calls: Mutex::new(Vec::new()),
                failures: Mutex::new(script),
            })
        }

        async fn call_count(&self) -> usize {
            self.calls.lock().await.len()
        }
    }

    #[async_trait]
    impl ChannelSender for ScriptedSender {
        fn channel(&self) -> Channel {
            self.channel
        }

        async fn send(&self, recipient: &str, _body: &str) -> Result<(), TransportError> {
            self.calls.lock().await.push(recipient.to_string());
            match self.failures.lock().await.pop_front() {
                Some(error) => Err(error),
                None => Ok(()),
            }
        }
    }

    fn notifier(
        senders: Vec<Arc<dyn ChannelSender>>,
        hourly_cap: u32,
        preferences: HashMap<String, Vec<Channel>>,
    ) -> (Notifier, Arc<InMemoryNotificationAudit>, Arc<InMemoryCustomerRepository>) {
        let audit = Arc::new(InMemoryNotificationAudit::new());
        let customers = Arc::new(InMemoryCustomerRepository::new());
        let notifier = Notifier::new(
            senders,
            RateLimiter::new(hourly_cap, 30),
            RetryPolicy::new(2, 1),
            audit.clone(),
            customers.clone(),
            preferences,
            Some("merchant-desk".to_string()),
        );
        (notifier, audit, customers)
    }

    fn all_scripted() -> (Vec<Arc<dyn ChannelSender>>, Arc<ScriptedSender>, Arc<ScriptedSender>, Arc<ScriptedSender>)
    {
        let chat = ScriptedSender::new(Channel::Chat);
        let email = ScriptedSender::new(Channel::Email);
        let sms = ScriptedSender::new(Channel::Sms);
        (vec![chat.clone(), email.clone(), sms.clone()], chat, email, sms)
    }

    #[tokio::test]
    async fn preference_filtered_channels_are_neither_attempted_nor_audited() {
        let (senders, chat, email, sms) = all_scripted();
        let preferences =
            HashMap::from([("+1555".to_string(), vec![Channel::Chat, Channel::Email])]);
        let (notifier, audit, _) = notifier(senders, 10, preferences);

        let outcomes =
            notifier.notify("+1555", &Channel::ALL, "body", "order_update", Priority::Medium).await;

        let channels: Vec<Channel> = outcomes.iter().map(|(channel, _)| *channel).collect();
        assert_eq!(channels, vec![Channel::Chat, Channel::Email]);
        assert_eq!(chat.call_count().await, 1);
        assert_eq!(email.call_count().await, 1);
        assert_eq!(sms.call_count().await, 0);

        let records = audit.records().await;
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|record| record.channel != Channel::Sms));
    }

    #[tokio::test]
    async fn recipient_without_preferences_gets_all_channels() {
        let (senders, chat, email, sms) = all_scripted();
        let (notifier, _, _) = notifier(senders, 10, HashMap::new());

        let outcomes =
            notifier.notify("+1555", &Channel::ALL, "body", "order_update", Priority::Low).await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|(_, outcome)| *outcome == DeliveryOutcome::Sent));
        assert_eq!(chat.call_count().await, 1);
        assert_eq!(email.call_count().await, 1);
        assert_eq!(sms.call_count().await, 1);
    }

    #[tokio::test]
    async fn send_over_hourly_cap_is_suppressed_and_audited() {
        let (senders, _, email, _) = all_scripted();
        let (notifier, audit, _) = notifier(senders, 2, HashMap::new());

        for _ in 0..2 {
            notifier.notify("+1555", &[Channel::Email], "body", "order_update", Priority::Low).await;
        }
        let outcomes =
            notifier.notify("+1555", &[Channel::Email], "body", "order_update", Priority::Low).await;

        assert_eq!(
            outcomes,
            vec![(Channel::Email, DeliveryOutcome::Suppressed(SuppressionReason::RateLimit))]
        );
        // Transport untouched for the suppressed attempt.
        assert_eq!(email.call_count().await, 2);

        let records = audit.records().await;
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].outcome, DeliveryOutcome::Suppressed(SuppressionReason::RateLimit));
    }

    #[tokio::test]
    async fn capped_channel_leaves_other_channels_unaffected() {
        let (senders, chat, email, _) = all_scripted();
        let (notifier, _, _) = notifier(senders, 1, HashMap::new());

        notifier.notify("+1555", &[Channel::Email], "body", "order_update", Priority::Low).await;
        let outcomes = notifier
            .notify("+1555", &[Channel::Email, Channel::Chat], "body", "order_update", Priority::Low)
            .await;

        assert_eq!(
            outcomes,
            vec![
                (Channel::Email, DeliveryOutcome::Suppressed(SuppressionReason::RateLimit)),
                (Channel::Chat, DeliveryOutcome::Sent),
            ]
        );
        assert_eq!(email.call_count().await, 1);
        assert_eq!(chat.call_count().await, 1);
    }

    #[tokio::test]
    async fn second_sms_within_cooldown_is_suppressed() {
        let (senders, _, _, sms) = all_scripted();
        let (notifier, audit, _) = notifier(senders, 10, HashMap::new());

        notifier.notify("+1555", &[Channel::Sms], "body", "order_update", Priority::High).await;
        let outcomes =
            notifier.notify("+1555", &[Channel::Sms], "body", "order_update", Priority::High).await;

        assert_eq!(
            outcomes,
            vec![(Channel::Sms, DeliveryOutcome::Suppressed(SuppressionReason::Cooldown))]
        );
        assert_eq!(sms.call_count().await, 1);
        assert_eq!(audit.records().await.len(), 2);
    }

    #[tokio::test]
    async fn transport_failure_is_retried_once_then_recorded_failed() {
        let failing = ScriptedSender::failing(Channel::Chat, 2);
        let (notifier, audit, _) = notifier(vec![failing.clone()], 10, HashMap::new());

        let outcomes =
            notifier.notify("+1555", &[Channel::Chat], "body", "order_update", Priority::Medium).await;

        assert_eq!(outcomes, vec![(Channel::Chat, DeliveryOutcome::Failed)]);
        assert_eq!(failing.call_count().await, 2);
        assert_eq!(audit.records().await[0].outcome, DeliveryOutcome::Failed);
    }

    #[tokio::test]
    async fn retry_recovers_from_a_single_transport_failure() {
        let flaky = ScriptedSender::failing(Channel::Chat, 1);
        let (notifier, _, _) = notifier(vec![flaky.clone()], 10, HashMap::new());

        let outcomes =
            notifier.notify("+1555", &[Channel::Chat], "body", "order_update", Priority::Medium).await;

        assert_eq!(outcomes, vec![(Channel::Chat, DeliveryOutcome::Sent)]);
        assert_eq!(flaky.call_count().await, 2);
    }

    #[tokio::test]
    async fn transition_fans_out_to_customer_and_merchant() {
        let (senders, chat, _, _) = all_scripted();
        let preferences = HashMap::from([
            ("+1555".to_string(), vec![Channel::Chat]),
            ("merchant-desk".to_string(), vec![Channel::Chat]),
        ]);
        let (notifier, audit, customers) = notifier(senders, 10, preferences);

        customers
            .insert(Customer {
                id: CustomerId("C-1".to_string()),
                identity: "+1555".to_string(),
                display_name: None,
                created_at: Utc::now(),
            })
            .await
            .expect("seed customer");

        let order = Order {
            id: OrderId("O-1".to_string()),
            customer_id: CustomerId("C-1".to_string()),
            items: vec![LineItem {
                name: "pizza".to_string(),
                quantity: 1,
                unit_price: Some(Decimal::new(1200, 2)),
                special_instructions: None,
            }],
            status: OrderStatus::Confirmed,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        notifier
            .order_transitioned(&order, OrderStatus::Pending, Some("merchant accepted"))
            .await
            .expect("fan out");

        let recipients = chat.calls.lock().await.clone();
        assert_eq!(recipients, vec!["+1555".to_string(), "merchant-desk".to_string()]);

        let records = audit.records().await;
        assert_eq!(records.len(), 2);
        assert!(records[0].body.contains("O-1"));
        assert!(records[1].body.contains("pending -> confirmed"));
    }

    #[tokio::test]
    async fn transition_for_unknown_customer_is_an_error() {
        let (senders, _, _, _) = all_scripted();
        let (notifier, _, _) = notifier(senders, 10, HashMap::new());

        let order = Order {
            id: OrderId("O-1".to_string()),
            customer_id: CustomerId("C-missing".to_string()),
            items: vec![],
            status: OrderStatus::Confirmed,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert!(notifier.order_transitioned(&order, OrderStatus::Pending, None).await.is_err());
    }
}
