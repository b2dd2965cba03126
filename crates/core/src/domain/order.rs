use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::customer::CustomerId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    ReadyForPickup,
    PickedUp,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Preparing => "preparing",
            Self::ReadyForPickup => "ready_for_pickup",
            Self::PickedUp => "picked_up",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "preparing" => Some(Self::Preparing),
            "ready_for_pickup" => Some(Self::ReadyForPickup),
            "picked_up" => Some(Self::PickedUp),
            "delivered" => Some(Self::Delivered),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Adjacency table for the order lifecycle. Every legal edge lives here;
    /// transition validation is a single lookup against this table.
    pub fn allowed_transitions(&self) -> &'static [OrderStatus] {
        match self {
            Self::Pending => &[Self::Confirmed, Self::Cancelled],
            Self::Confirmed => &[Self::Preparing, Self::Cancelled],
            Self::Preparing => &[Self::ReadyForPickup, Self::Cancelled],
            Self::ReadyForPickup => &[Self::PickedUp, Self::Cancelled],
            Self::PickedUp => &[Self::Delivered, Self::Cancelled],
            Self::Delivered => &[],
            Self::Cancelled => &[],
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    pub quantity: u32,
    /// Unit price may be unresolved at extraction time and filled in later
    /// from a merchant catalog.
    pub unit_price: Option<Decimal>,
    pub special_instructions: Option<String>,
}

impl LineItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_price.unwrap_or(Decimal::ZERO) * Decimal::from(self.quantity)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub items: Vec<LineItem>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Derived total. Never stored independently of the line items.
    pub fn total(&self) -> Decimal {
        self.items.iter().map(LineItem::line_total).sum()
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        self.status.allowed_transitions().contains(&next)
    }

    pub fn transition_to(&mut self, next: OrderStatus, at: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.can_transition_to(next) {
            return Err(DomainError::InvalidTransition { from: self.status, to: next });
        }
        self.status = next;
        self.updated_at = at;
        Ok(())
    }

    pub fn validate_items(items: &[LineItem]) -> Result<(), DomainError> {
        if items.is_empty() {
            return Err(DomainError::Validation("order requires at least one line item".to_owned()));
        }
        for item in items {
            if item.quantity == 0 {
                return Err(DomainError::Validation(format!(
                    "line item `{}` has non-positive quantity",
                    item.name
                )));
            }
            if item.unit_price.is_some_and(|price| price < Decimal::ZERO) {
                return Err(DomainError::Validation(format!(
                    "line item `{}` has negative unit price",
                    item.name
                )));
            }
        }
        Ok(())
    }
}
