//! Immutable, fully resolved view of an order.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use storefront_catalog::Product;
use storefront_core::{DomainError, DomainResult, OrderId, Price, ProductId};

use crate::customer::Customer;
use crate::order::{Order, OrderItem, OrderStatus};

/// One resolved order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotLine {
    pub product: ProductId,
    pub product_name: String,
    pub price: Price,
    pub quantity: u32,
    pub total_price: Decimal,
}

/// Order with product names, current prices and totals resolved.
///
/// Totals use each product's price at the moment the snapshot is built, not
/// the price when the order was placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderSnapshot {
    pub order_id: OrderId,
    pub customer: Customer,
    pub created_at: DateTime<Utc>,
    pub status: OrderStatus,
    pub items: Vec<SnapshotLine>,
    pub total_price: Decimal,
}

impl OrderSnapshot {
    /// Resolve `items` against `products`.
    ///
    /// Fails with `NotFound` when an item references a product that is not in
    /// the lookup.
    pub fn build(
        order: &Order,
        customer: Customer,
        items: &[OrderItem],
        products: &HashMap<ProductId, Product>,
    ) -> DomainResult<Self> {
        let mut lines = Vec::with_capacity(items.len());
        let mut total = Decimal::ZERO;

        for item in items {
            let product = products
                .get(&item.product)
                .ok_or_else(|| DomainError::not_found(format!("product {}", item.product)))?;
            let line_total = product.price.times(item.quantity);
            total += line_total;
            lines.push(SnapshotLine {
                product: product.id,
                product_name: product.name.clone(),
                price: product.price,
                quantity: item.quantity,
                total_price: line_total,
            });
        }

        Ok(Self {
            order_id: order.id,
            customer,
            created_at: order.created_at,
            status: order.status,
            items: lines,
            total_price: total,
        })
    }
}
