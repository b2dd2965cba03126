pub mod catalog;
pub mod config;
pub mod domain;
pub mod errors;
pub mod lifecycle;
pub mod store;

pub use catalog::{CatalogEntry, CatalogResolver, StaticCatalog};
pub use domain::conversation::{ConversationTurn, Intent, TurnId};
pub use domain::customer::{Customer, CustomerId};
pub use domain::notification::{
    Channel, DeliveryOutcome, Notification, NotificationId, Priority, SuppressionReason,
};
pub use domain::order::{LineItem, Order, OrderId, OrderStatus};
pub use errors::DomainError;
pub use lifecycle::{NotifyError, OrderLifecycleManager, StatusSnapshot, TransitionNotifier};
pub use store::{
    ConversationStore, CustomerStore, NotificationAudit, OrderStore, StoreError, StatusUpdate,
};

pub use chrono;
pub use rust_decimal;
