use pedido_core::store::StoreError;

pub mod conversation;
pub mod customer;
pub mod memory;
pub mod notification;
pub mod order;

pub use conversation::SqlConversationRepository;
pub use customer::SqlCustomerRepository;
pub use memory::{
    InMemoryConversationRepository, InMemoryCustomerRepository, InMemoryNotificationAudit,
    InMemoryOrderRepository,
};
pub use notification::SqlNotificationRepository;
pub use order::SqlOrderRepository;

pub(crate) fn db_error(error: sqlx::Error) -> StoreError {
    StoreError::Backend(error.to_string())
}

pub(crate) fn decode_error(message: impl Into<String>) -> StoreError {
    StoreError::Decode(message.into())
}
