use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::conversation::ConversationTurn;
use crate::domain::customer::{Customer, CustomerId};
use crate::domain::notification::Notification;
use crate::domain::order::{Order, OrderId, OrderStatus};

/// Persistence errors surfaced to the core. Backend crates map their native
/// error types (sqlx and friends) into these string-carrying variants so the
/// core stays storage-agnostic.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("stored row failed to decode: {0}")]
    Decode(String),
}

/// Result of an atomic conditional status update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusUpdate {
    /// Exactly one row matched the expected status and was updated.
    Applied,
    /// No row matched; either the order is gone or another writer won.
    NoMatch,
}

#[async_trait]
pub trait CustomerStore: Send + Sync {
    async fn find_by_identity(&self, identity: &str) -> Result<Option<Customer>, StoreError>;
    async fn find_by_id(&self, id: &CustomerId) -> Result<Option<Customer>, StoreError>;
    async fn insert(&self, customer: Customer) -> Result<(), StoreError>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: Order) -> Result<(), StoreError>;
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, StoreError>;
    async fn list_for_customer(&self, customer_id: &CustomerId) -> Result<Vec<Order>, StoreError>;

    /// Conditional update: set `new` only where the stored status still equals
    /// `expected`. Concurrent writers race through this single compare-and-set.
    async fn update_status(
        &self,
        id: &OrderId,
        expected: OrderStatus,
        new: OrderStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<StatusUpdate, StoreError>;
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn append_turn(&self, turn: ConversationTurn) -> Result<(), StoreError>;
    async fn recent_turns(
        &self,
        customer_id: &CustomerId,
        limit: u32,
    ) -> Result<Vec<ConversationTurn>, StoreError>;
}

#[async_trait]
pub trait NotificationAudit: Send + Sync {
    async fn append(&self, notification: Notification) -> Result<(), StoreError>;
}
