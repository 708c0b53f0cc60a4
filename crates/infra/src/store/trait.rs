use std::sync::Arc;

use thiserror::Error;

use storefront_catalog::{Category, Product};
use storefront_core::{CategoryId, CustomerId, OrderId, Price, ProductId};
use storefront_orders::{Customer, Order, OrderItem};

/// Storage operation error.
///
/// These are infrastructure errors, as opposed to domain validation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write. Transient under concurrency:
    /// the row now exists and can be fetched.
    #[error("uniqueness conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// A write referenced a row that does not exist.
    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("transaction already finished")]
    Closed,
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// Factory for transactions over the catalog and order tables.
#[async_trait::async_trait]
pub trait CatalogStore: Send + Sync {
    type Tx: StoreTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;
}

/// A unit of work.
///
/// Reads observe committed rows plus this transaction's own writes. Dropping
/// the transaction without calling [`StoreTx::commit`] rolls it back.
#[async_trait::async_trait]
pub trait StoreTx: Send {
    /// Category with exactly this name under `parent` (`None` = root level).
    async fn find_category(
        &mut self,
        name: &str,
        parent: Option<CategoryId>,
    ) -> Result<Option<Category>, StoreError>;

    /// Insert a category. A row with the same `(name, parent)` yields
    /// [`StoreError::Conflict`].
    async fn insert_category(&mut self, category: &Category) -> Result<(), StoreError>;

    async fn get_category(&mut self, id: CategoryId) -> Result<Option<Category>, StoreError>;

    /// Direct children of `parent`, in creation order.
    async fn child_categories(&mut self, parent: CategoryId) -> Result<Vec<Category>, StoreError>;

    async fn insert_product(&mut self, product: &Product) -> Result<(), StoreError>;

    async fn get_product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError>;

    /// Prices of every product whose category is one of `categories`.
    async fn prices_in_categories(
        &mut self,
        categories: &[CategoryId],
    ) -> Result<Vec<Price>, StoreError>;

    /// Insert or replace a customer profile.
    async fn upsert_customer(&mut self, customer: &Customer) -> Result<(), StoreError>;

    async fn get_customer(&mut self, id: CustomerId) -> Result<Option<Customer>, StoreError>;

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError>;

    async fn insert_order_item(&mut self, item: &OrderItem) -> Result<(), StoreError>;

    async fn get_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError>;

    /// Items of `order`, in insertion order.
    async fn order_items(&mut self, order: OrderId) -> Result<Vec<OrderItem>, StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}

#[async_trait::async_trait]
impl<S: CatalogStore> CatalogStore for Arc<S> {
    type Tx = S::Tx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        (**self).begin().await
    }
}
