//! Subtree-scoped price statistics.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use storefront_catalog::{PriceAverage, round_to_price_scale};
use storefront_core::CategoryId;

use crate::category_tree::walk_from;
use crate::error::ServiceResult;
use crate::store::{CatalogStore, StoreTx};

/// Average price of a category subtree, as presented to callers.
///
/// `average_price` is rounded to two decimal places and serializes as `null`
/// when the subtree holds no products.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AveragePriceReport {
    pub category_id: CategoryId,
    pub average_price: Option<Decimal>,
}

/// Price aggregation over a [`CatalogStore`].
#[derive(Debug, Clone)]
pub struct PriceAggregator<S> {
    store: S,
}

impl<S: CatalogStore> PriceAggregator<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Exact mean price of every product in `category`'s subtree.
    ///
    /// `None` when the subtree has no products. The walk and the price read
    /// share one transaction so they observe the same snapshot.
    #[instrument(skip(self), fields(category_id = %category), err)]
    pub async fn average_price(&self, category: CategoryId) -> ServiceResult<Option<Decimal>> {
        let mut tx = self.store.begin().await?;
        let walk = walk_from(&mut tx, category).await?;
        let prices = tx.prices_in_categories(walk.visited_in_order()).await?;

        let avg: PriceAverage = prices.into_iter().collect();
        debug!(
            categories = walk.visited_in_order().len(),
            products = avg.count(),
            "averaged subtree prices"
        );
        Ok(avg.mean())
    }

    /// [`PriceAggregator::average_price`] rounded for presentation.
    pub async fn average_price_report(&self, category: CategoryId) -> ServiceResult<AveragePriceReport> {
        let average = self.average_price(category).await?;
        Ok(AveragePriceReport {
            category_id: category,
            average_price: average.map(round_to_price_scale),
        })
    }
}
