//! Order placement.
//!
//! The order header and all of its items are written in one transaction.
//! Notifications go out only after that transaction commits and cannot undo
//! or fail it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::task;
use tracing::{info, instrument, warn};

use storefront_auth::{AuthzError, Permission, Principal, authorize, authorize_order_placement};
use storefront_catalog::Product;
use storefront_core::entity::index_by_id;
use storefront_core::{CustomerId, OrderId, ProductId};
use storefront_orders::{Customer, Order, OrderSnapshot, PlaceOrder};

use crate::error::{ServiceError, ServiceResult};
use crate::notifications::NotificationDispatcher;
use crate::store::{CatalogStore, StoreTx};

/// Places orders and reads them back.
#[derive(Debug, Clone)]
pub struct OrderService<S> {
    store: S,
    notifications: Arc<NotificationDispatcher>,
}

impl<S: CatalogStore> OrderService<S> {
    pub fn new(store: S, notifications: Arc<NotificationDispatcher>) -> Self {
        Self {
            store,
            notifications,
        }
    }

    /// Create or update the profile of the customer behind a principal.
    #[instrument(skip(self, customer), fields(customer_id = %customer.id), err)]
    pub async fn register_customer(&self, customer: Customer) -> ServiceResult<Customer> {
        let mut tx = self.store.begin().await?;
        tx.upsert_customer(&customer).await?;
        tx.commit().await?;
        Ok(customer)
    }

    /// Place an order for the calling principal.
    ///
    /// The customer is always the caller. Every referenced product must
    /// exist. On success the order is `pending` and notifications have been
    /// attempted; their outcome does not affect the return value.
    ///
    /// Senders and mailers are blocking calls, so dispatch runs on tokio's
    /// blocking pool and never on the worker serving the request.
    #[instrument(
        skip(self, caller, command),
        fields(principal = %caller.principal_id, lines = command.items.len()),
        err
    )]
    pub async fn place_order(&self, caller: &Principal, command: PlaceOrder) -> ServiceResult<Order> {
        let customer_id = caller.principal_id.customer_id();
        authorize_order_placement(caller, customer_id)?;
        command.validate()?;

        let mut tx = self.store.begin().await?;
        let customer = tx.get_customer(customer_id).await?.ok_or_else(|| {
            ServiceError::not_found(format!("customer profile for principal {}", caller.principal_id))
        })?;

        let placed = command.into_rows(customer_id, Utc::now())?;
        let products = load_products(&mut tx, placed.product_ids()).await?;

        tx.insert_order(&placed.order).await?;
        for item in &placed.items {
            tx.insert_order_item(item).await?;
        }
        tx.commit().await?;

        info!(order_id = %placed.order.id, items = placed.items.len(), "order placed");

        match OrderSnapshot::build(&placed.order, customer, &placed.items, &products) {
            Ok(snapshot) => {
                let notifications = Arc::clone(&self.notifications);
                let dispatched = task::spawn_blocking(move || notifications.notify(&snapshot)).await;
                if let Err(e) = dispatched {
                    warn!(order_id = %placed.order.id, error = %e, "notification dispatch aborted");
                }
            }
            Err(e) => {
                warn!(order_id = %placed.order.id, error = %e, "could not build order snapshot, notifications skipped");
            }
        }

        Ok(placed.order)
    }

    /// Resolved view of an order, priced at the products' current prices.
    ///
    /// Staff with `orders.read` may read any order; customers only their own.
    #[instrument(skip(self, caller), fields(principal = %caller.principal_id, order_id = %order_id), err)]
    pub async fn order_summary(&self, caller: &Principal, order_id: OrderId) -> ServiceResult<OrderSnapshot> {
        let mut tx = self.store.begin().await?;
        let order = tx
            .get_order(order_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("order {order_id}")))?;

        ensure_can_read(caller, order.customer)?;

        let customer = tx
            .get_customer(order.customer)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("customer {}", order.customer)))?;
        let items = tx.order_items(order_id).await?;
        let product_ids = items.iter().map(|i| i.product).collect();
        let products = load_products(&mut tx, product_ids).await?;

        Ok(OrderSnapshot::build(&order, customer, &items, &products)?)
    }
}

fn ensure_can_read(caller: &Principal, owner: CustomerId) -> Result<(), AuthzError> {
    match authorize(caller, &Permission::READ_ORDERS) {
        Ok(()) => Ok(()),
        Err(_) if caller.principal_id.customer_id() == owner => Ok(()),
        Err(_) => Err(AuthzError::NotOwner {
            principal: caller.principal_id.to_string(),
            customer: owner.to_string(),
        }),
    }
}

async fn load_products<T: StoreTx>(
    tx: &mut T,
    mut ids: Vec<ProductId>,
) -> ServiceResult<HashMap<ProductId, Product>> {
    ids.sort_unstable();
    ids.dedup();
    let mut products = Vec::with_capacity(ids.len());
    for id in ids {
        let product = tx
            .get_product(id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("product {id}")))?;
        products.push(product);
    }
    Ok(index_by_id(products))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    use storefront_core::Price;
    use storefront_orders::{OrderLineRequest, OrderStatus};

    use crate::category_tree::CategoryTree;
    use crate::config::Config;
    use crate::import::{NewProductRequest, ProductImporter, ProductPlacement};
    use crate::notifications::testing::{FailingMailer, FailingSms, RecordingMailer, RecordingSms};
    use crate::store::{FailPoint, InMemoryStore};
    use storefront_catalog::CategoryPathInput;

    type Store = Arc<InMemoryStore>;

    async fn product(store: &Store, name: &str, price: rust_decimal::Decimal) -> Product {
        ProductImporter::new(store.clone(), CategoryTree::new(store.clone()))
            .create_product(
                &Principal::staff(),
                NewProductRequest {
                    name: name.to_string(),
                    price: Price::new(price).unwrap(),
                    description: None,
                    stock_quantity: None,
                    placement: ProductPlacement::Path(CategoryPathInput::from("Home > Lighting")),
                },
            )
            .await
            .unwrap()
    }

    async fn shopper(service: &OrderService<Store>) -> Principal {
        let id = CustomerId::new();
        service
            .register_customer(
                Customer::new(id, "Alice")
                    .with_email("alice@example.com")
                    .with_phone_number("+15550100"),
            )
            .await
            .unwrap();
        Principal::customer(id)
    }

    fn line(product: &Product, quantity: i64) -> OrderLineRequest {
        OrderLineRequest {
            product: product.id,
            quantity,
        }
    }

    fn recording() -> (Arc<RecordingSms>, Arc<RecordingMailer>, Arc<NotificationDispatcher>) {
        let sms = Arc::new(RecordingSms::default());
        let mailer = Arc::new(RecordingMailer::default());
        let dispatcher = NotificationDispatcher::from_config(sms.clone(), mailer.clone(), &Config::default());
        (sms, mailer, Arc::new(dispatcher))
    }

    #[tokio::test]
    async fn places_pending_order_and_notifies() {
        let store = InMemoryStore::arc();
        let (sms, mailer, dispatcher) = recording();
        let service = OrderService::new(store.clone(), dispatcher);
        let lamp = product(&store, "Desk Lamp", dec!(120.00)).await;
        let caller = shopper(&service).await;

        let order = service
            .place_order(&caller, PlaceOrder::new(vec![line(&lamp, 2)]))
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.customer, caller.principal_id.customer_id());
        assert_eq!(store.order_count(), 1);
        assert_eq!(store.order_item_count(), 1);

        let texts = sms.sent.lock().unwrap();
        assert_eq!(
            texts[0].1,
            format!("Hi Alice, your order #{} is confirmed. Total: 240.00.", order.id)
        );
        assert_eq!(
            mailer.subjects(),
            vec![format!("New Order #{}", order.id), format!("Order Confirmation #{}", order.id)]
        );
    }

    #[tokio::test]
    async fn summary_totals_use_current_prices() {
        let store = InMemoryStore::arc();
        let (_, _, dispatcher) = recording();
        let service = OrderService::new(store.clone(), dispatcher);
        let lamp = product(&store, "Desk Lamp", dec!(120.00)).await;
        let bulb = product(&store, "Bulb", dec!(4.50)).await;
        let caller = shopper(&service).await;

        let order = service
            .place_order(&caller, PlaceOrder::new(vec![line(&lamp, 2), line(&bulb, 1)]))
            .await
            .unwrap();

        let summary = service.order_summary(&caller, order.id).await.unwrap();
        assert_eq!(summary.items.len(), 2);
        assert_eq!(summary.items[0].product_name, "Desk Lamp");
        assert_eq!(summary.items[0].total_price.to_string(), "240.00");
        assert_eq!(summary.total_price.to_string(), "244.50");

        let stranger = Principal::customer(CustomerId::new());
        let err = service.order_summary(&stranger, order.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));

        assert!(service.order_summary(&Principal::staff(), order.id).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_product_is_not_found_and_writes_nothing() {
        let store = InMemoryStore::arc();
        let (sms, _, dispatcher) = recording();
        let service = OrderService::new(store.clone(), dispatcher);
        let caller = shopper(&service).await;

        let err = service
            .place_order(
                &caller,
                PlaceOrder::new(vec![OrderLineRequest {
                    product: ProductId::new(),
                    quantity: 1,
                }]),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::NotFound(_)));
        assert_eq!(store.order_count(), 0);
        assert!(sms.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_requests_are_rejected_before_storage() {
        let store = InMemoryStore::arc();
        let (_, _, dispatcher) = recording();
        let service = OrderService::new(store.clone(), dispatcher);
        let lamp = product(&store, "Desk Lamp", dec!(120.00)).await;
        let caller = shopper(&service).await;

        let err = service.place_order(&caller, PlaceOrder::new(vec![])).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let err = service
            .place_order(&caller, PlaceOrder::new(vec![line(&lamp, 0)]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(store.order_count(), 0);
    }

    #[tokio::test]
    async fn caller_without_profile_is_not_found() {
        let store = InMemoryStore::arc();
        let (_, _, dispatcher) = recording();
        let service = OrderService::new(store.clone(), dispatcher);
        let lamp = product(&store, "Desk Lamp", dec!(120.00)).await;

        let err = service
            .place_order(
                &Principal::customer(CustomerId::new()),
                PlaceOrder::new(vec![line(&lamp, 1)]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn principal_without_permission_is_unauthorized() {
        let store = InMemoryStore::arc();
        let (_, _, dispatcher) = recording();
        let service = OrderService::new(store.clone(), dispatcher);
        let lamp = product(&store, "Desk Lamp", dec!(120.00)).await;

        let anonymous = Principal::new(storefront_auth::PrincipalId::new());
        let err = service
            .place_order(&anonymous, PlaceOrder::new(vec![line(&lamp, 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn item_write_failure_rolls_back_the_order() {
        let store = InMemoryStore::arc();
        let (sms, mailer, dispatcher) = recording();
        let service = OrderService::new(store.clone(), dispatcher);
        let lamp = product(&store, "Desk Lamp", dec!(120.00)).await;
        let caller = shopper(&service).await;

        store.fail_on(FailPoint::InsertOrderItem);
        let err = service
            .place_order(&caller, PlaceOrder::new(vec![line(&lamp, 1)]))
            .await
            .unwrap_err();

        assert!(err.is_infrastructure());
        assert_eq!(store.order_count(), 0);
        assert_eq!(store.order_item_count(), 0);
        assert!(sms.sent.lock().unwrap().is_empty());
        assert!(mailer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn commit_failure_rolls_back_the_order() {
        let store = InMemoryStore::arc();
        let (_, _, dispatcher) = recording();
        let service = OrderService::new(store.clone(), dispatcher);
        let lamp = product(&store, "Desk Lamp", dec!(120.00)).await;
        let caller = shopper(&service).await;

        store.fail_on(FailPoint::Commit);
        let err = service
            .place_order(&caller, PlaceOrder::new(vec![line(&lamp, 1)]))
            .await
            .unwrap_err();
        assert!(err.is_infrastructure());
        assert_eq!(store.order_count(), 0);
    }

    #[derive(Debug, Default)]
    struct ThreadRecordingSms {
        threads: std::sync::Mutex<Vec<std::thread::ThreadId>>,
    }

    impl crate::notifications::SmsSender for ThreadRecordingSms {
        fn send_sms(&self, _to: &str, _body: &str) -> Result<(), crate::notifications::NotificationError> {
            self.threads.lock().unwrap().push(std::thread::current().id());
            Ok(())
        }
    }

    #[tokio::test]
    async fn notifications_run_off_the_request_thread() {
        let store = InMemoryStore::arc();
        let sms = Arc::new(ThreadRecordingSms::default());
        let dispatcher = NotificationDispatcher::from_config(
            sms.clone(),
            Arc::new(RecordingMailer::default()),
            &Config::default(),
        );
        let service = OrderService::new(store.clone(), Arc::new(dispatcher));
        let lamp = product(&store, "Desk Lamp", dec!(120.00)).await;
        let caller = shopper(&service).await;

        service
            .place_order(&caller, PlaceOrder::new(vec![line(&lamp, 1)]))
            .await
            .unwrap();

        let threads = sms.threads.lock().unwrap();
        assert_eq!(threads.len(), 1);
        assert_ne!(threads[0], std::thread::current().id());
    }

    #[tokio::test]
    async fn notification_failures_do_not_affect_the_order() {
        let store = InMemoryStore::arc();
        let dispatcher = Arc::new(NotificationDispatcher::from_config(
            Arc::new(FailingSms),
            Arc::new(FailingMailer::default()),
            &Config::default(),
        ));
        let service = OrderService::new(store.clone(), dispatcher);
        let lamp = product(&store, "Desk Lamp", dec!(120.00)).await;
        let caller = shopper(&service).await;

        let order = service
            .place_order(&caller, PlaceOrder::new(vec![line(&lamp, 3)]))
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(store.order_count(), 1);
        assert_eq!(store.order_item_count(), 1);
    }
}
