pub mod conversation;
pub mod customer;
pub mod notification;
pub mod order;
