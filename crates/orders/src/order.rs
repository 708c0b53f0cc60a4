use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::{CustomerId, DomainError, DomainResult, Entity, OrderId, OrderItemId, ProductId};

/// Order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(DomainError::validation(format!("unknown order status '{other}'"))),
        }
    }
}

/// Order header row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer: CustomerId,
    pub created_at: DateTime<Utc>,
    pub status: OrderStatus,
}

impl Entity for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Order line: product and quantity.
///
/// The line price is not stored; it is derived from the product's current
/// price whenever the order is read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order: OrderId,
    pub product: ProductId,
    pub quantity: u32,
}

/// One requested line of an order placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineRequest {
    pub product: ProductId,
    pub quantity: i64,
}

/// Command: place an order.
///
/// The customer is deliberately absent: it is taken from the authenticated
/// caller, never from the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub items: Vec<OrderLineRequest>,
}

/// The complete set of rows one placement writes: the order and all its items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedOrder {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

impl PlaceOrder {
    pub fn new(items: Vec<OrderLineRequest>) -> Self {
        Self { items }
    }

    /// Check preconditions that need no store access.
    pub fn validate(&self) -> DomainResult<()> {
        if self.items.is_empty() {
            return Err(DomainError::validation("order must contain at least one item"));
        }
        for (idx, line) in self.items.iter().enumerate() {
            if line.quantity <= 0 {
                return Err(DomainError::validation(format!(
                    "items[{idx}]: quantity must be a positive integer"
                )));
            }
            if u32::try_from(line.quantity).is_err() {
                return Err(DomainError::validation(format!(
                    "items[{idx}]: quantity is too large"
                )));
            }
        }
        Ok(())
    }

    /// Build the order header and its items as one unit.
    ///
    /// The order starts `pending`. One item is produced per requested line.
    pub fn into_rows(self, customer: CustomerId, now: DateTime<Utc>) -> DomainResult<PlacedOrder> {
        self.validate()?;

        let order = Order {
            id: OrderId::new(),
            customer,
            created_at: now,
            status: OrderStatus::Pending,
        };

        let items = self
            .items
            .into_iter()
            .map(|line| {
                let quantity = u32::try_from(line.quantity)
                    .map_err(|_| DomainError::validation("quantity is too large"))?;
                Ok(OrderItem {
                    id: OrderItemId::new(),
                    order: order.id,
                    product: line.product,
                    quantity,
                })
            })
            .collect::<DomainResult<Vec<_>>>()?;

        Ok(PlacedOrder { order, items })
    }
}

impl PlacedOrder {
    pub fn product_ids(&self) -> Vec<ProductId> {
        let mut ids: Vec<ProductId> = self.items.iter().map(|i| i.product).collect();
        ids.sort();
        ids.dedup();
        ids
    }
}
