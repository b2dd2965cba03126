//! Customer-facing reply templates. Plain functions over format strings; the
//! orchestrator picks which one to render, nothing here talks to the model.

use pedido_core::domain::order::{Order, OrderStatus};

pub fn greeting(display_name: Option<&str>) -> String {
    match display_name {
        Some(name) => format!(
            "Hi {name}! I can take your order or check on an existing one. \
             What would you like?"
        ),
        None => "Hi there! I can take your order or check on an existing one. \
                 What would you like?"
            .to_string(),
    }
}

pub fn help() -> String {
    "I can help you place an order (just tell me what you'd like) or check \
     the status of one you've already placed."
        .to_string()
}

pub fn unknown() -> String {
    "Sorry, I didn't quite catch that. You can place an order by telling me \
     what you'd like, or ask about an order you've already placed."
        .to_string()
}

pub fn clarify_order() -> String {
    "I couldn't work out what you'd like to order. Could you list the items \
     and quantities? For example: \"2 pizzas and a soda\"."
        .to_string()
}

pub fn order_created(order: &Order) -> String {
    format!(
        "Your order is in! Order {} — {} item(s), total {}. We'll let you \
         know as soon as it's confirmed.",
        order.id.0,
        order.items.len(),
        order.total()
    )
}

pub fn order_rejected(reason: &str) -> String {
    format!("I couldn't place that order: {reason}. Could you try again?")
}

pub fn order_status(order: &Order) -> String {
    format!("Order {} is currently {}.", order.id.0, describe_status(order.status))
}

pub fn order_not_found(reference: &str) -> String {
    format!("I couldn't find an order matching {reference}. Could you check the order id?")
}

pub fn no_active_order() -> String {
    "You don't have any active orders right now. Would you like to place one?".to_string()
}

pub fn service_trouble() -> String {
    "Sorry, something went wrong on our side. Please try again in a moment.".to_string()
}

fn describe_status(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "pending confirmation",
        OrderStatus::Confirmed => "confirmed",
        OrderStatus::Preparing => "being prepared",
        OrderStatus::ReadyForPickup => "ready for pickup",
        OrderStatus::PickedUp => "out for delivery",
        OrderStatus::Delivered => "delivered",
        OrderStatus::Cancelled => "cancelled",
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use pedido_core::domain::customer::CustomerId;
    use pedido_core::domain::order::{LineItem, Order, OrderId, OrderStatus};

    use super::{greeting, order_created, order_status};

    #[test]
    fn greeting_uses_display_name_when_known() {
        assert!(greeting(Some("Ana")).starts_with("Hi Ana!"));
        assert!(greeting(None).starts_with("Hi there!"));
    }

    #[test]
    fn order_created_mentions_id_and_total() {
        let order = Order {
            id: OrderId("O-42".to_string()),
            customer_id: CustomerId("C-1".to_string()),
            items: vec![LineItem {
                name: "pizza".to_string(),
                quantity: 2,
                unit_price: Some(Decimal::new(1250, 2)),
                special_instructions: None,
            }],
            status: OrderStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let reply = order_created(&order);
        assert!(reply.contains("O-42"));
        assert!(reply.contains("25.00"));
    }

    #[test]
    fn status_reply_describes_each_state() {
        let mut order = Order {
            id: OrderId("O-42".to_string()),
            customer_id: CustomerId("C-1".to_string()),
            items: vec![],
            status: OrderStatus::Preparing,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(order_status(&order).contains("being prepared"));
        order.status = OrderStatus::ReadyForPickup;
        assert!(order_status(&order).contains("ready for pickup"));
    }
}
