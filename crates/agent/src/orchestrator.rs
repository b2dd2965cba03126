use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use pedido_core::domain::conversation::{ConversationTurn, Intent, TurnId};
use pedido_core::domain::customer::{Customer, CustomerId};
use pedido_core::domain::notification::Channel;
use pedido_core::domain::order::OrderId;
use pedido_core::errors::DomainError;
use pedido_core::lifecycle::OrderLifecycleManager;
use pedido_core::store::{ConversationStore, CustomerStore};

use crate::classifier::Classifier;
use crate::extractor::Extractor;
use crate::llm::LlmClient;
use crate::replies;

/// Classifications below this score are routed as `unknown` regardless of the
/// intent the model picked.
const CONFIDENCE_THRESHOLD: f64 = 0.5;

/// Prior turns replayed to the classifier as conversational context.
const CONTEXT_WINDOW: u32 = 5;

/// Drives one inbound message through classify → branch → reply → persist.
/// The entry point is infallible: every failure path degrades to a canned
/// reply, and nothing here panics across the boundary.
pub struct ConversationRuntime {
    customers: Arc<dyn CustomerStore>,
    conversations: Arc<dyn ConversationStore>,
    lifecycle: Arc<OrderLifecycleManager>,
    classifier: Classifier,
    extractor: Extractor,
    /// Per-customer turn serialization. Keyed by channel identity so the
    /// resolve-or-create step is covered by the same lock.
    turn_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ConversationRuntime {
    pub fn new(
        customers: Arc<dyn CustomerStore>,
        conversations: Arc<dyn ConversationStore>,
        lifecycle: Arc<OrderLifecycleManager>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        Self {
            customers,
            conversations,
            lifecycle,
            classifier: Classifier::new(llm.clone()),
            extractor: Extractor::new(llm),
            turn_locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn handle_inbound_message(
        &self,
        identity: &str,
        text: &str,
        channel: Channel,
    ) -> String {
        let correlation_id = Uuid::new_v4().to_string();
        info!(
            event_name = "conversation.inbound",
            correlation_id = %correlation_id,
            channel = channel.as_str(),
            "inbound message received"
        );

        let lock = self.turn_lock(identity).await;
        let reply = {
            let _serialized = lock.lock().await;
            self.run_turn(identity, text, &correlation_id).await
        };
        drop(lock);
        self.release_turn_lock(identity).await;
        reply
    }

    async fn run_turn(&self, identity: &str, text: &str, correlation_id: &str) -> String {
        let customer = match self.resolve_or_create_customer(identity).await {
            Ok(customer) => customer,
            Err(error) => {
                warn!(
                    event_name = "conversation.customer_resolution_failed",
                    correlation_id = %correlation_id,
                    error = %error,
                    "could not resolve customer; replying without persistence"
                );
                return replies::service_trouble();
            }
        };

        let context = match self.conversations.recent_turns(&customer.id, CONTEXT_WINDOW).await {
            Ok(turns) => turns,
            Err(error) => {
                warn!(
                    event_name = "conversation.context_load_failed",
                    correlation_id = %correlation_id,
                    customer_id = %customer.id.0,
                    error = %error,
                    "classifying without conversation context"
                );
                Vec::new()
            }
        };

        let classification = self.classifier.classify_or_fallback(text, &context).await;
        let routed = if classification.confidence < CONFIDENCE_THRESHOLD {
            Intent::Unknown
        } else {
            classification.intent
        };
        info!(
            event_name = "conversation.classified",
            correlation_id = %correlation_id,
            customer_id = %customer.id.0,
            intent = routed.as_str(),
            confidence = classification.confidence,
            "message classified"
        );

        let reply = match routed {
            Intent::Greeting => replies::greeting(customer.display_name.as_deref()),
            Intent::Help => replies::help(),
            Intent::Unknown => replies::unknown(),
            Intent::Order => self.handle_order(&customer, text, &correlation_id).await,
            Intent::OrderStatus => self.handle_order_status(&customer, text).await,
        };

        let turn = ConversationTurn {
            id: TurnId(Uuid::new_v4().to_string()),
            customer_id: customer.id.clone(),
            inbound_text: text.to_string(),
            // Store the routed intent so the audit trail matches the reply
            // the customer actually received.
            intent: routed,
            confidence: classification.confidence,
            reply_text: reply.clone(),
            created_at: Utc::now(),
        };
        if let Err(error) = self.conversations.append_turn(turn).await {
            warn!(
                event_name = "conversation.turn_persist_failed",
                correlation_id = %correlation_id,
                customer_id = %customer.id.0,
                error = %error,
                "turn not persisted; reply still returned"
            );
        }

        reply
    }

    async fn handle_order(&self, customer: &Customer, text: &str, correlation_id: &str) -> String {
        let extraction = match self.extractor.extract(text).await {
            Ok(extraction) => extraction,
            Err(error) => {
                warn!(
                    event_name = "conversation.extract_failed",
                    correlation_id = %correlation_id,
                    customer_id = %customer.id.0,
                    error = %error,
                    "extraction degraded to clarification"
                );
                return replies::clarify_order();
            }
        };

        if extraction.requires_clarification {
            return replies::clarify_order();
        }

        let mut items = extraction.items;
        if let Some(instructions) = &extraction.special_instructions {
            // The schema keeps instructions per line; an order-level note is
            // carried on every line that has none of its own.
            for item in items.iter_mut().filter(|item| item.special_instructions.is_none()) {
                item.special_instructions = Some(instructions.clone());
            }
        }

        match self.lifecycle.create_order(customer.id.clone(), items).await {
            Ok(order) => replies::order_created(&order),
            Err(DomainError::Validation(reason)) => replies::order_rejected(&reason),
            Err(error) => {
                warn!(
                    event_name = "conversation.order_create_failed",
                    correlation_id = %correlation_id,
                    customer_id = %customer.id.0,
                    error = %error,
                    "order creation failed"
                );
                replies::service_trouble()
            }
        }
    }

    async fn handle_order_status(&self, customer: &Customer, text: &str) -> String {
        if let Some(reference) = explicit_order_reference(text) {
            return match self.lifecycle.get_order(&reference).await {
                Ok(order) if order.customer_id == customer.id => replies::order_status(&order),
                Ok(_) | Err(DomainError::NotFound { .. }) => {
                    replies::order_not_found(&reference.0)
                }
                Err(_) => replies::service_trouble(),
            };
        }

        match self.lifecycle.latest_active_order(&customer.id).await {
            Ok(Some(order)) => replies::order_status(&order),
            Ok(None) => replies::no_active_order(),
            Err(_) => replies::service_trouble(),
        }
    }

    async fn resolve_or_create_customer(&self, identity: &str) -> Result<Customer, String> {
        match self.customers.find_by_identity(identity).await {
            Ok(Some(customer)) => return Ok(customer),
            Ok(None) => {}
            Err(error) => return Err(error.to_string()),
        }

        let customer = Customer {
            id: CustomerId(Uuid::new_v4().to_string()),
            identity: identity.to_string(),
            display_name: None,
            created_at: Utc::now(),
        };
        match self.customers.insert(customer.clone()).await {
            Ok(()) => {
                info!(
                    event_name = "conversation.customer_created",
                    customer_id = %customer.id.0,
                    "first contact; customer record created"
                );
                Ok(customer)
            }
            // Lost an insert race with another channel adapter; the winner's
            // row is authoritative.
            Err(_) => match self.customers.find_by_identity(identity).await {
                Ok(Some(existing)) => Ok(existing),
                Ok(None) => Err("customer vanished after insert conflict".to_string()),
                Err(error) => Err(error.to_string()),
            },
        }
    }

    async fn turn_lock(&self, identity: &str) -> Arc<Mutex<()>> {
        let mut locks = self.turn_locks.lock().await;
        locks.entry(identity.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Drops a sender's lock entry once no turn holds or awaits it, so the
    /// map does not grow with every identity the server has ever seen.
    async fn release_turn_lock(&self, identity: &str) {
        let mut locks = self.turn_locks.lock().await;
        if let Some(entry) = locks.get(identity) {
            if Arc::strong_count(entry) == 1 {
                locks.remove(identity);
            }
        }
    }
}

/// Finds an order id quoted verbatim in the message, if any. Order ids are
/// uuids, so any token that parses as one is treated as a reference.
fn explicit_order_reference(text: &str) -> Option<OrderId> {
    text.split_whitespace()
        .map(|token| token.trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '-'))
        .find(|token| Uuid::parse_str(token).is_ok())
        .map(|token| OrderId(token.to_string()))
}
