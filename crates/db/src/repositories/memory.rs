//! In-memory store implementations for tests and local development. Each one
//! mirrors the behavior of its SQL counterpart, including ordering and the
//! conditional status update semantics.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use pedido_core::domain::conversation::ConversationTurn;
use pedido_core::domain::customer::{Customer, CustomerId};
use pedido_core::domain::notification::Notification;
use pedido_core::domain::order::{Order, OrderId, OrderStatus};
use pedido_core::store::{
    ConversationStore, CustomerStore, NotificationAudit, OrderStore, StatusUpdate, StoreError,
};

#[derive(Default)]
pub struct InMemoryCustomerRepository {
    customers: RwLock<HashMap<CustomerId, Customer>>,
}

impl InMemoryCustomerRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CustomerStore for InMemoryCustomerRepository {
    async fn find_by_identity(&self, identity: &str) -> Result<Option<Customer>, StoreError> {
        let customers = self.customers.read().await;
        Ok(customers.values().find(|customer| customer.identity == identity).cloned())
    }

    async fn find_by_id(&self, id: &CustomerId) -> Result<Option<Customer>, StoreError> {
        let customers = self.customers.read().await;
        Ok(customers.get(id).cloned())
    }

    async fn insert(&self, customer: Customer) -> Result<(), StoreError> {
        let mut customers = self.customers.write().await;
        if customers.values().any(|existing| existing.identity == customer.identity) {
            return Err(StoreError::Backend(format!(
                "identity `{}` already registered",
                customer.identity
            )));
        }
        customers.insert(customer.id.clone(), customer);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<OrderId, Order>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderRepository {
    async fn insert(&self, order: Order) -> Result<(), StoreError> {
        let mut orders = self.orders.write().await;
        orders.insert(order.id.clone(), order);
        Ok(())
    }

    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, StoreError> {
        let orders = self.orders.read().await;
        Ok(orders.get(id).cloned())
    }

    async fn list_for_customer(&self, customer_id: &CustomerId) -> Result<Vec<Order>, StoreError> {
        let orders = self.orders.read().await;
        let mut matching: Vec<Order> =
            orders.values().filter(|order| &order.customer_id == customer_id).cloned().collect();
        matching.sort_by_key(|order| order.created_at);
        Ok(matching)
    }

    async fn update_status(
        &self,
        id: &OrderId,
        expected: OrderStatus,
        new: OrderStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<StatusUpdate, StoreError> {
        let mut orders = self.orders.write().await;
        match orders.get_mut(id) {
            Some(order) if order.status == expected => {
                order.status = new;
                order.updated_at = updated_at;
                Ok(StatusUpdate::Applied)
            }
            _ => Ok(StatusUpdate::NoMatch),
        }
    }
}

#[derive(Default)]
pub struct InMemoryConversationRepository {
    turns: RwLock<Vec<ConversationTurn>>,
}

impl InMemoryConversationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationRepository {
    async fn append_turn(&self, turn: ConversationTurn) -> Result<(), StoreError> {
        let mut turns = self.turns.write().await;
        turns.push(turn);
        Ok(())
    }

    async fn recent_turns(
        &self,
        customer_id: &CustomerId,
        limit: u32,
    ) -> Result<Vec<ConversationTurn>, StoreError> {
        let turns = self.turns.read().await;
        let mut matching: Vec<ConversationTurn> =
            turns.iter().filter(|turn| &turn.customer_id == customer_id).cloned().collect();
        matching.sort_by_key(|turn| turn.created_at);
        let keep = matching.len().saturating_sub(limit as usize);
        Ok(matching.split_off(keep))
    }
}

#[derive(Default)]
pub struct InMemoryNotificationAudit {
    records: RwLock<Vec<Notification>>,
}

impl InMemoryNotificationAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<Notification> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl NotificationAudit for InMemoryNotificationAudit {
    async fn append(&self, notification: Notification) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        records.push(notification);
        Ok(())
    }
}
