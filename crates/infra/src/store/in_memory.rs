use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use storefront_catalog::{Category, Product};
use storefront_core::{CategoryId, CustomerId, OrderId, Price, ProductId};
use storefront_orders::{Customer, Order, OrderItem};

use super::r#trait::{CatalogStore, StoreError, StoreTx};

/// Operations that can be made to fail on demand in tests.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FailPoint {
    InsertCategory,
    InsertProduct,
    InsertOrder,
    InsertOrderItem,
    Commit,
}

#[derive(Debug, Default, Clone)]
struct Tables {
    categories: BTreeMap<CategoryId, Category>,
    products: BTreeMap<ProductId, Product>,
    customers: HashMap<CustomerId, Customer>,
    orders: BTreeMap<OrderId, Order>,
    order_items: Vec<OrderItem>,
}

impl Tables {
    fn category_named(&self, name: &str, parent: Option<CategoryId>) -> Option<&Category> {
        self.categories
            .values()
            .find(|c| c.parent == parent && c.name == name)
    }
}

/// In-memory catalog + order store.
///
/// Intended for tests/dev. Transactions stage their writes privately and
/// apply them under a single write lock at commit, where the
/// `(name, parent)` uniqueness of categories and all row references are
/// checked. Cloning shares the underlying tables.
///
/// Open transactions are counted the way a connection pool would count
/// checked-out connections, so tests can assert how many a service holds at
/// once.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    committed: Arc<RwLock<Tables>>,
    faults: Arc<Mutex<HashSet<FailPoint>>>,
    open_txs: Arc<TxGauge>,
}

#[derive(Debug, Default)]
struct TxGauge {
    open: AtomicUsize,
    peak: AtomicUsize,
}

impl TxGauge {
    fn acquire(&self) {
        let open = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(open, Ordering::SeqCst);
    }

    fn release(&self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Make every subsequent call at `point` fail with `Unavailable`.
    pub fn fail_on(&self, point: FailPoint) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.insert(point);
        }
    }

    pub fn clear_faults(&self) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.clear();
        }
    }

    pub fn category_count(&self) -> usize {
        self.read(|t| t.categories.len())
    }

    pub fn product_count(&self) -> usize {
        self.read(|t| t.products.len())
    }

    pub fn order_count(&self) -> usize {
        self.read(|t| t.orders.len())
    }

    pub fn order_item_count(&self) -> usize {
        self.read(|t| t.order_items.len())
    }

    /// Transactions begun and not yet dropped.
    pub fn open_transactions(&self) -> usize {
        self.open_txs.open.load(Ordering::SeqCst)
    }

    /// Most transactions ever open at the same time.
    pub fn peak_open_transactions(&self) -> usize {
        self.open_txs.peak.load(Ordering::SeqCst)
    }

    /// Committed categories, in creation order.
    pub fn categories(&self) -> Vec<Category> {
        self.read(|t| t.categories.values().cloned().collect())
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> T {
        match self.committed.read() {
            Ok(tables) => f(&tables),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }
}

#[async_trait::async_trait]
impl CatalogStore for InMemoryStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        self.open_txs.acquire();
        Ok(InMemoryTx {
            committed: self.committed.clone(),
            faults: self.faults.clone(),
            gauge: self.open_txs.clone(),
            staged: Tables::default(),
            finished: false,
        })
    }
}

/// Transaction over an [`InMemoryStore`].
#[derive(Debug)]
pub struct InMemoryTx {
    committed: Arc<RwLock<Tables>>,
    faults: Arc<Mutex<HashSet<FailPoint>>>,
    gauge: Arc<TxGauge>,
    staged: Tables,
    finished: bool,
}

impl Drop for InMemoryTx {
    fn drop(&mut self) {
        self.gauge.release();
    }
}

impl InMemoryTx {
    fn check(&self, point: FailPoint) -> Result<(), StoreError> {
        if self.finished {
            return Err(StoreError::Closed);
        }
        let faults = self
            .faults
            .lock()
            .map_err(|_| StoreError::Unavailable("fault registry poisoned".to_string()))?;
        if faults.contains(&point) {
            return Err(StoreError::Unavailable(format!("injected failure at {point:?}")));
        }
        Ok(())
    }

    fn open(&self) -> Result<(), StoreError> {
        if self.finished {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    fn with_committed<T>(&self, f: impl FnOnce(&Tables) -> T) -> Result<T, StoreError> {
        let tables = self
            .committed
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(f(&tables))
    }

    fn category_exists(&self, committed: &Tables, id: CategoryId) -> bool {
        committed.categories.contains_key(&id) || self.staged.categories.contains_key(&id)
    }

    fn validate_against(&self, committed: &Tables) -> Result<(), StoreError> {
        for category in self.staged.categories.values() {
            if committed.category_named(&category.name, category.parent).is_some() {
                return Err(StoreError::Conflict(format!(
                    "category '{}' already exists under {:?}",
                    category.name, category.parent
                )));
            }
            if let Some(parent) = category.parent {
                if !self.category_exists(committed, parent) {
                    return Err(StoreError::Integrity(format!(
                        "category {} references missing parent {parent}",
                        category.id
                    )));
                }
            }
        }

        for product in self.staged.products.values() {
            if let Some(category) = product.category {
                if !self.category_exists(committed, category) {
                    return Err(StoreError::Integrity(format!(
                        "product {} references missing category {category}",
                        product.id
                    )));
                }
            }
        }

        for order in self.staged.orders.values() {
            let known = committed.customers.contains_key(&order.customer)
                || self.staged.customers.contains_key(&order.customer);
            if !known {
                return Err(StoreError::Integrity(format!(
                    "order {} references missing customer {}",
                    order.id, order.customer
                )));
            }
        }

        for item in &self.staged.order_items {
            let order_known = committed.orders.contains_key(&item.order)
                || self.staged.orders.contains_key(&item.order);
            let product_known = committed.products.contains_key(&item.product)
                || self.staged.products.contains_key(&item.product);
            if !order_known || !product_known {
                return Err(StoreError::Integrity(format!(
                    "order item {} references a missing order or product",
                    item.id
                )));
            }
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl StoreTx for InMemoryTx {
    async fn find_category(
        &mut self,
        name: &str,
        parent: Option<CategoryId>,
    ) -> Result<Option<Category>, StoreError> {
        self.open()?;
        if let Some(c) = self.staged.category_named(name, parent) {
            return Ok(Some(c.clone()));
        }
        self.with_committed(|t| t.category_named(name, parent).cloned())
    }

    async fn insert_category(&mut self, category: &Category) -> Result<(), StoreError> {
        self.check(FailPoint::InsertCategory)?;
        let taken = self.staged.category_named(&category.name, category.parent).is_some()
            || self.with_committed(|t| t.category_named(&category.name, category.parent).is_some())?;
        if taken {
            return Err(StoreError::Conflict(format!(
                "category '{}' already exists under {:?}",
                category.name, category.parent
            )));
        }
        self.staged.categories.insert(category.id, category.clone());
        Ok(())
    }

    async fn get_category(&mut self, id: CategoryId) -> Result<Option<Category>, StoreError> {
        self.open()?;
        if let Some(c) = self.staged.categories.get(&id) {
            return Ok(Some(c.clone()));
        }
        self.with_committed(|t| t.categories.get(&id).cloned())
    }

    async fn child_categories(&mut self, parent: CategoryId) -> Result<Vec<Category>, StoreError> {
        self.open()?;
        let mut children: BTreeMap<CategoryId, Category> = self.with_committed(|t| {
            t.categories
                .values()
                .filter(|c| c.parent == Some(parent))
                .map(|c| (c.id, c.clone()))
                .collect()
        })?;
        children.extend(
            self.staged
                .categories
                .values()
                .filter(|c| c.parent == Some(parent))
                .map(|c| (c.id, c.clone())),
        );
        Ok(children.into_values().collect())
    }

    async fn insert_product(&mut self, product: &Product) -> Result<(), StoreError> {
        self.check(FailPoint::InsertProduct)?;
        self.staged.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn get_product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        self.open()?;
        if let Some(p) = self.staged.products.get(&id) {
            return Ok(Some(p.clone()));
        }
        self.with_committed(|t| t.products.get(&id).cloned())
    }

    async fn prices_in_categories(
        &mut self,
        categories: &[CategoryId],
    ) -> Result<Vec<Price>, StoreError> {
        self.open()?;
        let wanted: HashSet<CategoryId> = categories.iter().copied().collect();
        let in_scope = |p: &Product| p.category.is_some_and(|c| wanted.contains(&c));

        let mut products: BTreeMap<ProductId, Price> = self.with_committed(|t| {
            t.products
                .values()
                .filter(|p| in_scope(p))
                .map(|p| (p.id, p.price))
                .collect()
        })?;
        products.extend(
            self.staged
                .products
                .values()
                .filter(|p| in_scope(p))
                .map(|p| (p.id, p.price)),
        );
        Ok(products.into_values().collect())
    }

    async fn upsert_customer(&mut self, customer: &Customer) -> Result<(), StoreError> {
        self.open()?;
        self.staged.customers.insert(customer.id, customer.clone());
        Ok(())
    }

    async fn get_customer(&mut self, id: CustomerId) -> Result<Option<Customer>, StoreError> {
        self.open()?;
        if let Some(c) = self.staged.customers.get(&id) {
            return Ok(Some(c.clone()));
        }
        self.with_committed(|t| t.customers.get(&id).cloned())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        self.check(FailPoint::InsertOrder)?;
        self.staged.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn insert_order_item(&mut self, item: &OrderItem) -> Result<(), StoreError> {
        self.check(FailPoint::InsertOrderItem)?;
        self.staged.order_items.push(item.clone());
        Ok(())
    }

    async fn get_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
        self.open()?;
        if let Some(o) = self.staged.orders.get(&id) {
            return Ok(Some(o.clone()));
        }
        self.with_committed(|t| t.orders.get(&id).cloned())
    }

    async fn order_items(&mut self, order: OrderId) -> Result<Vec<OrderItem>, StoreError> {
        self.open()?;
        let mut items: Vec<OrderItem> = self.with_committed(|t| {
            t.order_items
                .iter()
                .filter(|i| i.order == order)
                .cloned()
                .collect()
        })?;
        items.extend(self.staged.order_items.iter().filter(|i| i.order == order).cloned());
        Ok(items)
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        self.check(FailPoint::Commit)?;

        let mut committed = self
            .committed
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        self.validate_against(&committed)?;

        let staged = std::mem::take(&mut self.staged);
        committed.categories.extend(staged.categories);
        committed.products.extend(staged.products);
        committed.customers.extend(staged.customers);
        committed.orders.extend(staged.orders);
        committed.order_items.extend(staged.order_items);
        drop(committed);

        self.finished = true;
        Ok(())
    }

    async fn rollback(mut self) -> Result<(), StoreError> {
        self.open()?;
        self.staged = Tables::default();
        self.finished = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storefront_core::Price;

    fn product_in(category: CategoryId, price: &str) -> Product {
        Product {
            id: ProductId::new(),
            name: "Baguette".to_string(),
            description: None,
            price: Price::parse(price).unwrap(),
            category: Some(category),
            stock_quantity: 0,
        }
    }

    #[tokio::test]
    async fn uncommitted_writes_are_invisible_to_other_transactions() {
        let store = InMemoryStore::new();
        let root = Category::new("All Products", None).unwrap();

        let mut tx1 = store.begin().await.unwrap();
        tx1.insert_category(&root).await.unwrap();
        assert!(tx1.get_category(root.id).await.unwrap().is_some());

        let mut tx2 = store.begin().await.unwrap();
        assert!(tx2.get_category(root.id).await.unwrap().is_none());

        tx1.commit().await.unwrap();
        assert!(tx2.get_category(root.id).await.unwrap().is_some());
        assert_eq!(store.category_count(), 1);
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let store = InMemoryStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_category(&Category::new("Bakery", None).unwrap())
                .await
                .unwrap();
        }
        assert_eq!(store.category_count(), 0);
        assert_eq!(store.open_transactions(), 0);
    }

    #[tokio::test]
    async fn open_transactions_are_counted_until_finished() {
        let store = InMemoryStore::new();
        let tx1 = store.begin().await.unwrap();
        let tx2 = store.begin().await.unwrap();
        assert_eq!(store.open_transactions(), 2);

        tx1.commit().await.unwrap();
        tx2.rollback().await.unwrap();
        assert_eq!(store.open_transactions(), 0);
        assert_eq!(store.peak_open_transactions(), 2);
    }

    #[tokio::test]
    async fn duplicate_name_under_same_parent_conflicts_at_commit() {
        let store = InMemoryStore::new();
        let mut tx1 = store.begin().await.unwrap();
        let mut tx2 = store.begin().await.unwrap();

        tx1.insert_category(&Category::new("Bakery", None).unwrap())
            .await
            .unwrap();
        tx2.insert_category(&Category::new("Bakery", None).unwrap())
            .await
            .unwrap();

        tx1.commit().await.unwrap();
        let err = tx2.commit().await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.category_count(), 1);
    }

    #[tokio::test]
    async fn same_name_under_different_parents_is_allowed() {
        let store = InMemoryStore::new();
        let a = Category::new("A", None).unwrap();
        let b = Category::new("B", None).unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.insert_category(&a).await.unwrap();
        tx.insert_category(&b).await.unwrap();
        tx.insert_category(&Category::new("Sale", Some(a.id)).unwrap())
            .await
            .unwrap();
        tx.insert_category(&Category::new("Sale", Some(b.id)).unwrap())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.category_count(), 4);
    }

    #[tokio::test]
    async fn product_with_unknown_category_fails_integrity() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_product(&product_in(CategoryId::new(), "1.00"))
            .await
            .unwrap();

        let err = tx.commit().await.unwrap_err();
        assert!(matches!(err, StoreError::Integrity(_)));
        assert_eq!(store.product_count(), 0);
    }

    #[tokio::test]
    async fn prices_are_filtered_by_category_set() {
        let store = InMemoryStore::new();
        let bread = Category::new("Bread", None).unwrap();
        let fruit = Category::new("Fruits", None).unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.insert_category(&bread).await.unwrap();
        tx.insert_category(&fruit).await.unwrap();
        tx.insert_product(&product_in(bread.id, "2.00")).await.unwrap();
        tx.insert_product(&product_in(fruit.id, "0.80")).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let prices = tx.prices_in_categories(&[bread.id]).await.unwrap();
        assert_eq!(prices, vec![Price::parse("2.00").unwrap()]);
    }

    #[tokio::test]
    async fn injected_failure_is_reported_as_unavailable() {
        let store = InMemoryStore::new();
        store.fail_on(FailPoint::InsertCategory);

        let mut tx = store.begin().await.unwrap();
        let err = tx
            .insert_category(&Category::new("Bakery", None).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));

        store.clear_faults();
        assert!(tx
            .insert_category(&Category::new("Bakery", None).unwrap())
            .await
            .is_ok());
    }
}
