//! Message bodies for order notifications.

use std::fmt::Write as _;

use storefront_orders::OrderSnapshot;

use super::OutgoingMail;

/// Placeholder for a contact value the customer never provided.
const MISSING: &str = "n/a";

pub fn customer_sms(snapshot: &OrderSnapshot) -> String {
    format!(
        "Hi {}, your order #{} is confirmed. Total: {}.",
        snapshot.customer.name, snapshot.order_id, snapshot.total_price
    )
}

pub fn admin_subject(snapshot: &OrderSnapshot) -> String {
    format!("New Order #{}", snapshot.order_id)
}

pub fn admin_body(snapshot: &OrderSnapshot) -> String {
    let customer = &snapshot.customer;
    let mut body = String::new();
    // Writing to a String cannot fail.
    let _ = writeln!(
        body,
        "Customer: {} ({})",
        customer.name,
        customer.email.as_deref().unwrap_or(MISSING)
    );
    let _ = writeln!(
        body,
        "Phone: {}",
        customer.phone_number.as_deref().unwrap_or(MISSING)
    );
    let _ = writeln!(body, "Order ID: {}", snapshot.order_id);
    let _ = writeln!(body, "Status: {}", snapshot.status);
    let _ = writeln!(body, "Total: {}", snapshot.total_price);
    body.push_str("Items:\n");
    for line in &snapshot.items {
        let _ = writeln!(
            body,
            "- {} x {} = {}",
            line.product_name, line.quantity, line.total_price
        );
    }
    body
}

pub fn admin_mail(snapshot: &OrderSnapshot, from: &str, admin: &str) -> OutgoingMail {
    OutgoingMail {
        from: from.to_string(),
        to: admin.to_string(),
        subject: admin_subject(snapshot),
        body: admin_body(snapshot),
    }
}

pub fn confirmation_subject(order_id: impl std::fmt::Display) -> String {
    format!("Order Confirmation #{order_id}")
}

pub fn confirmation_body(order_id: impl std::fmt::Display) -> String {
    format!(
        "Thank you for your purchase!\n\nYour order with ID {order_id} has been received and is being processed."
    )
}
