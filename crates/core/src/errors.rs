use thiserror::Error;

use crate::domain::order::OrderStatus;
use crate::store::StoreError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid order transition from {from:?} to {to:?}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("concurrent update conflict on order {id}: status is now {current:?}")]
    Conflict { id: String, current: OrderStatus },
    #[error("persistence failure: {0}")]
    Store(String),
}

impl DomainError {
    pub fn order_not_found(id: impl Into<String>) -> Self {
        Self::NotFound { kind: "order", id: id.into() }
    }

    pub fn customer_not_found(id: impl Into<String>) -> Self {
        Self::NotFound { kind: "customer", id: id.into() }
    }
}

impl From<StoreError> for DomainError {
    fn from(value: StoreError) -> Self {
        Self::Store(value.to_string())
    }
}
