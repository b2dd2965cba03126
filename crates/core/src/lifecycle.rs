use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::catalog::CatalogResolver;
use crate::domain::customer::CustomerId;
use crate::domain::order::{LineItem, Order, OrderId, OrderStatus};
use crate::errors::DomainError;
use crate::store::{OrderStore, StatusUpdate, StoreError};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("notification dispatch failed: {0}")]
pub struct NotifyError(pub String);

/// Seam between the lifecycle manager and the notification dispatcher.
/// Delivery is best-effort: errors are logged by the caller and never roll
/// back the transition that triggered them.
#[async_trait]
pub trait TransitionNotifier: Send + Sync {
    async fn order_transitioned(
        &self,
        order: &Order,
        previous: OrderStatus,
        reason: Option<&str>,
    ) -> Result<(), NotifyError>;
}

/// Read model handed to merchant/driver-facing surfaces.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub total: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl StatusSnapshot {
    pub fn of(order: &Order) -> Self {
        Self {
            order_id: order.id.clone(),
            status: order.status,
            total: order.total(),
            updated_at: order.updated_at,
        }
    }
}

/// Owns order creation, the status state machine, and its persistence
/// contract. Orders are mutated only through `transition`; the orchestrator
/// and extractor never touch order rows directly.
pub struct OrderLifecycleManager {
    orders: Arc<dyn OrderStore>,
    notifier: Option<Arc<dyn TransitionNotifier>>,
    catalog: Option<Arc<dyn CatalogResolver>>,
}

impl OrderLifecycleManager {
    pub fn new(orders: Arc<dyn OrderStore>) -> Self {
        Self { orders, notifier: None, catalog: None }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn TransitionNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn CatalogResolver>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Validates and persists a new order in `pending`. Line items with no
    /// extracted price are resolved against the merchant catalog when one is
    /// configured; unresolved items stay unpriced.
    pub async fn create_order(
        &self,
        customer_id: CustomerId,
        mut items: Vec<LineItem>,
    ) -> Result<Order, DomainError> {
        Order::validate_items(&items)?;

        if let Some(catalog) = &self.catalog {
            for item in items.iter_mut().filter(|item| item.unit_price.is_none()) {
                if let Some(entry) = catalog.resolve(&item.name) {
                    item.unit_price = Some(entry.unit_price);
                }
            }
        }

        let now = Utc::now();
        let order = Order {
            id: OrderId(Uuid::new_v4().to_string()),
            customer_id,
            items,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        self.orders.insert(order.clone()).await?;
        info!(
            event_name = "lifecycle.order.created",
            order_id = %order.id.0,
            customer_id = %order.customer_id.0,
            total = %order.total(),
            "order created"
        );
        Ok(order)
    }

    /// Applies one validated edge of the status graph via a conditional
    /// update. Exactly one of any set of racing callers observes `Applied`;
    /// the rest re-read and fail with the transition the winner left behind.
    pub async fn transition(
        &self,
        order_id: &OrderId,
        new_status: OrderStatus,
        reason: Option<&str>,
    ) -> Result<Order, DomainError> {
        let order = self.load(order_id).await?;
        let previous = order.status;
        if !order.can_transition_to(new_status) {
            return Err(DomainError::InvalidTransition { from: previous, to: new_status });
        }

        let now = Utc::now();
        match self.orders.update_status(order_id, previous, new_status, now).await? {
            StatusUpdate::Applied => {}
            StatusUpdate::NoMatch => {
                // Lost the race (or the row vanished). Report the state the
                // winning writer left behind.
                let current = self.load(order_id).await?;
                return Err(DomainError::Conflict {
                    id: order_id.0.clone(),
                    current: current.status,
                });
            }
        }

        let mut updated = order;
        updated.status = new_status;
        updated.updated_at = now;

        info!(
            event_name = "lifecycle.order.transitioned",
            order_id = %updated.id.0,
            from = previous.as_str(),
            to = new_status.as_str(),
            reason = reason.unwrap_or("unspecified"),
            "order status transitioned"
        );

        if let Some(notifier) = &self.notifier {
            if let Err(error) = notifier.order_transitioned(&updated, previous, reason).await {
                warn!(
                    event_name = "lifecycle.notify.failed",
                    order_id = %updated.id.0,
                    error = %error,
                    "transition notification failed; order state is authoritative"
                );
            }
        }

        Ok(updated)
    }

    pub async fn get_order(&self, order_id: &OrderId) -> Result<Order, DomainError> {
        self.load(order_id).await
    }

    pub async fn list_orders_for_customer(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Vec<Order>, DomainError> {
        Ok(self.orders.list_for_customer(customer_id).await?)
    }

    /// Most recent order still on a non-terminal status, if any.
    pub async fn latest_active_order(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<Order>, DomainError> {
        let orders = self.orders.list_for_customer(customer_id).await?;
        Ok(orders.into_iter().filter(|order| !order.status.is_terminal()).next_back())
    }

    async fn load(&self, order_id: &OrderId) -> Result<Order, DomainError> {
        match self.orders.find_by_id(order_id).await {
            Ok(Some(order)) => Ok(order),
            Ok(None) => Err(DomainError::order_not_found(order_id.0.clone())),
            Err(StoreError::Backend(message)) => Err(DomainError::Store(message)),
            Err(StoreError::Decode(message)) => Err(DomainError::Store(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use rust_decimal::Decimal;
    use tokio::sync::{Mutex, RwLock};

    use crate::catalog::{CatalogEntry, StaticCatalog};
    use crate::domain::customer::CustomerId;
    use crate::domain::order::{LineItem, Order, OrderId, OrderStatus};
    use crate::errors::DomainError;
    use crate::store::{OrderStore, StatusUpdate, StoreError};

    use super::{NotifyError, OrderLifecycleManager, StatusSnapshot, TransitionNotifier};

    #[derive(Default)]
    struct MapOrderStore {
        orders: RwLock<HashMap<String, Order>>,
    }

    #[async_trait]
    impl OrderStore for MapOrderStore {
        async fn insert(&self, order: Order) -> Result<(), StoreError> {
            self.orders.write().await.insert(order.id.0.clone(), order);
            Ok(())
        }

        async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, StoreError> {
            Ok(self.orders.read().await.get(&id.0).cloned())
        }

        async fn list_for_customer(
            &self,
            customer_id: &CustomerId,
        ) -> Result<Vec<Order>, StoreError> {
            let orders = self.orders.read().await;
            let mut matching: Vec<Order> = orders
                .values()
                .filter(|order| order.customer_id == *customer_id)
                .cloned()
                .collect();
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
            match orders.get_mut(&id.0) {
                Some(order) if order.status == expected => {
                    order.status = new;
                    order.updated_at = updated_at;
                    Ok(StatusUpdate::Applied)
                }
                _ => Ok(StatusUpdate::NoMatch),
            }
        }
    }

    struct RecordingNotifier {
        calls: Mutex<Vec<(OrderStatus, OrderStatus)>>,
        fail: bool,
    }

    impl RecordingNotifier {
        fn new(fail: bool) -> Self {
            Self { calls: Mutex::new(Vec::new()), fail }
        }
    }

    #[async_trait]
    impl TransitionNotifier for RecordingNotifier {
        async fn order_transitioned(
            &self,
            order: &Order,
            previous: OrderStatus,
            _reason: Option<&str>,
        ) -> Result<(), NotifyError> {
            self.calls.lock().await.push((previous, order.status));
            if self.fail {
                return Err(NotifyError("gateway unreachable".to_owned()));
            }
            Ok(())
        }
    }

    fn items() -> Vec<LineItem> {
        vec![
            LineItem {
                name: "pizza".to_string(),
                quantity: 2,
                unit_price: None,
                special_instructions: None,
            },
            LineItem {
                name: "soda".to_string(),
                quantity: 1,
                unit_price: Some(Decimal::new(300, 2)),
                special_instructions: None,
            },
        ]
    }

    fn catalog() -> StaticCatalog {
        StaticCatalog::new(vec![CatalogEntry {
            name: "pizza".to_string(),
            aliases: vec![],
            unit_price: Decimal::new(1250, 2),
        }])
    }

    #[tokio::test]
    async fn create_order_resolves_catalog_prices_and_starts_pending() {
        let manager = OrderLifecycleManager::new(Arc::new(MapOrderStore::default()))
            .with_catalog(Arc::new(catalog()));

        let order =
            manager.create_order(CustomerId("C-1".to_string()), items()).await.expect("create");

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.items[0].unit_price, Some(Decimal::new(1250, 2)));
        assert_eq!(order.total(), Decimal::new(2800, 2));
    }

    #[tokio::test]
    async fn create_order_rejects_empty_items() {
        let manager = OrderLifecycleManager::new(Arc::new(MapOrderStore::default()));
        let error = manager
            .create_order(CustomerId("C-1".to_string()), Vec::new())
            .await
            .expect_err("empty items");
        assert!(matches!(error, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn transition_applies_legal_edge_and_notifies() {
        let notifier = Arc::new(RecordingNotifier::new(false));
        let manager = OrderLifecycleManager::new(Arc::new(MapOrderStore::default()))
            .with_notifier(notifier.clone());

        let order =
            manager.create_order(CustomerId("C-1".to_string()), items()).await.expect("create");
        let updated =
            manager.transition(&order.id, OrderStatus::Confirmed, None).await.expect("transition");

        assert_eq!(updated.status, OrderStatus::Confirmed);
        let calls = notifier.calls.lock().await;
        assert_eq!(calls.as_slice(), &[(OrderStatus::Pending, OrderStatus::Confirmed)]);
    }

    #[tokio::test]
    async fn illegal_edge_is_rejected_and_state_unchanged() {
        let manager = OrderLifecycleManager::new(Arc::new(MapOrderStore::default()));
        let order =
            manager.create_order(CustomerId("C-1".to_string()), items()).await.expect("create");

        let error = manager
            .transition(&order.id, OrderStatus::Delivered, None)
            .await
            .expect_err("pending -> delivered");
        assert!(matches!(
            error,
            DomainError::InvalidTransition { from: OrderStatus::Pending, to: OrderStatus::Delivered }
        ));

        let unchanged = manager.get_order(&order.id).await.expect("get");
        assert_eq!(unchanged.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn notifier_failure_does_not_roll_back_transition() {
        let manager = OrderLifecycleManager::new(Arc::new(MapOrderStore::default()))
            .with_notifier(Arc::new(RecordingNotifier::new(true)));

        let order =
            manager.create_order(CustomerId("C-1".to_string()), items()).await.expect("create");
        manager
            .transition(&order.id, OrderStatus::Confirmed, Some("merchant accepted"))
            .await
            .expect("transition succeeds despite notifier failure");

        let stored = manager.get_order(&order.id).await.expect("get");
        assert_eq!(stored.status, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn racing_transitions_resolve_to_exactly_one_winner() {
        let manager = Arc::new(OrderLifecycleManager::new(Arc::new(MapOrderStore::default())));
        let order =
            manager.create_order(CustomerId("C-1".to_string()), items()).await.expect("create");

        let to_confirmed = {
            let manager = manager.clone();
            let id = order.id.clone();
            tokio::spawn(async move { manager.transition(&id, OrderStatus::Confirmed, None).await })
        };
        let to_cancelled = {
            let manager = manager.clone();
            let id = order.id.clone();
            tokio::spawn(async move { manager.transition(&id, OrderStatus::Cancelled, None).await })
        };

        let results = [to_confirmed.await.expect("join"), to_cancelled.await.expect("join")];
        let winners = results.iter().filter(|result| result.is_ok()).count();
        assert_eq!(winners, 1, "exactly one racing transition may claim pending");

        let final_order = manager.get_order(&order.id).await.expect("get");
        assert!(matches!(final_order.status, OrderStatus::Confirmed | OrderStatus::Cancelled));
        for result in results {
            match result {
                Ok(order) => assert_eq!(order.status, final_order.status),
                Err(error) => assert!(matches!(error, DomainError::Conflict { .. })),
            }
        }
    }

    #[tokio::test]
    async fn repeated_reads_return_identical_snapshots() {
        let manager = OrderLifecycleManager::new(Arc::new(MapOrderStore::default()));
        let order =
            manager.create_order(CustomerId("C-1".to_string()), items()).await.expect("create");

        let first = manager.get_order(&order.id).await.expect("first read");
        let second = manager.get_order(&order.id).await.expect("second read");

        assert_eq!(first, second);
        assert_eq!(StatusSnapshot::of(&first), StatusSnapshot::of(&second));
    }

    #[tokio::test]
    async fn unknown_order_is_not_found() {
        let manager = OrderLifecycleManager::new(Arc::new(MapOrderStore::default()));
        let error = manager
            .get_order(&OrderId("missing".to_string()))
            .await
            .expect_err("missing order");
        assert!(matches!(error, DomainError::NotFound { kind: "order", .. }));
    }

    #[tokio::test]
    async fn latest_active_order_skips_terminal_states() {
        let manager = OrderLifecycleManager::new(Arc::new(MapOrderStore::default()));
        let customer = CustomerId("C-1".to_string());

        let first = manager.create_order(customer.clone(), items()).await.expect("create");
        manager.transition(&first.id, OrderStatus::Cancelled, None).await.expect("cancel");
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let second = manager.create_order(customer.clone(), items()).await.expect("create");

        let active = manager.latest_active_order(&customer).await.expect("lookup");
        assert_eq!(active.map(|order| order.id), Some(second.id));
    }
}
