//! Postgres-backed catalog + order store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (foreign key violation) | `23503` | `Integrity` |
//! | Database (check constraint violation) | `23514` | `Integrity` |
//! | Database (other) | Any other | `Unavailable` |
//! | PoolClosed / Io / other | N/A | `Unavailable` |
//!
//! Category uniqueness is enforced by a unique index over
//! `(name, COALESCE(parent_id, nil-uuid))`, so two root categories with the
//! same name also collide.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use storefront_catalog::{Category, Product};
use storefront_core::{CategoryId, CustomerId, OrderId, OrderItemId, Price, ProductId};
use storefront_orders::{Customer, Order, OrderItem, OrderStatus};

use super::r#trait::{CatalogStore, StoreError, StoreTx};

/// Tables and indexes this store expects.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS categories (
    id UUID PRIMARY KEY,
    name TEXT NOT NULL CHECK (name <> ''),
    parent_id UUID NULL REFERENCES categories (id) ON DELETE CASCADE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE UNIQUE INDEX IF NOT EXISTS categories_name_parent_key
    ON categories (name, COALESCE(parent_id, '00000000-0000-0000-0000-000000000000'::uuid));
CREATE INDEX IF NOT EXISTS categories_parent_idx ON categories (parent_id);

CREATE TABLE IF NOT EXISTS products (
    id UUID PRIMARY KEY,
    name TEXT NOT NULL CHECK (name <> ''),
    description TEXT NULL,
    price NUMERIC(10, 2) NOT NULL CHECK (price >= 0),
    category_id UUID NULL REFERENCES categories (id) ON DELETE SET NULL,
    stock_quantity BIGINT NOT NULL DEFAULT 0 CHECK (stock_quantity >= 0),
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS products_category_idx ON products (category_id);

CREATE TABLE IF NOT EXISTS customers (
    id UUID PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT NULL,
    phone_number TEXT NULL
);

CREATE TABLE IF NOT EXISTS orders (
    id UUID PRIMARY KEY,
    customer_id UUID NOT NULL REFERENCES customers (id),
    created_at TIMESTAMPTZ NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('pending', 'confirmed', 'cancelled'))
);

CREATE TABLE IF NOT EXISTS order_items (
    id UUID PRIMARY KEY,
    order_id UUID NOT NULL REFERENCES orders (id) ON DELETE CASCADE,
    product_id UUID NOT NULL REFERENCES products (id),
    quantity BIGINT NOT NULL CHECK (quantity > 0),
    position BIGSERIAL
);
CREATE INDEX IF NOT EXISTS order_items_order_idx ON order_items (order_id);
"#;

/// Postgres-backed store.
///
/// Cheap to clone; all clones share one connection pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create missing tables and indexes.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl CatalogStore for PostgresStore {
    type Tx = PostgresTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(PostgresTx { tx: Some(tx) })
    }
}

/// Transaction over a [`PostgresStore`].
///
/// sqlx rolls the transaction back when it is dropped unfinished.
pub struct PostgresTx {
    tx: Option<Transaction<'static, Postgres>>,
}

impl std::fmt::Debug for PostgresTx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresTx")
            .field("open", &self.tx.is_some())
            .finish()
    }
}

impl PostgresTx {
    fn conn(&mut self) -> Result<&mut Transaction<'static, Postgres>, StoreError> {
        self.tx.as_mut().ok_or(StoreError::Closed)
    }
}

#[async_trait::async_trait]
impl StoreTx for PostgresTx {
    #[instrument(skip(self), err)]
    async fn find_category(
        &mut self,
        name: &str,
        parent: Option<CategoryId>,
    ) -> Result<Option<Category>, StoreError> {
        let tx = self.conn()?;
        let row = sqlx::query(
            r#"
            SELECT id, name, parent_id
            FROM categories
            WHERE name = $1 AND parent_id IS NOT DISTINCT FROM $2
            "#,
        )
        .bind(name)
        .bind(parent.map(Uuid::from))
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("find_category", e))?;

        row.map(|r| category_from_row(&r)).transpose()
    }

    #[instrument(skip(self), fields(category_id = %category.id, name = %category.name), err)]
    async fn insert_category(&mut self, category: &Category) -> Result<(), StoreError> {
        let tx = self.conn()?;
        // ON CONFLICT keeps the transaction usable; a lost race surfaces as
        // zero inserted rows.
        let inserted = sqlx::query(
            r#"
            INSERT INTO categories (id, name, parent_id)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(category.id.as_uuid())
        .bind(&category.name)
        .bind(category.parent.map(Uuid::from))
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_category", e))?
        .rows_affected();

        if inserted == 0 {
            return Err(StoreError::Conflict(format!(
                "category '{}' already exists under {:?}",
                category.name, category.parent
            )));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(category_id = %id), err)]
    async fn get_category(&mut self, id: CategoryId) -> Result<Option<Category>, StoreError> {
        let tx = self.conn()?;
        let row = sqlx::query("SELECT id, name, parent_id FROM categories WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("get_category", e))?;

        row.map(|r| category_from_row(&r)).transpose()
    }

    #[instrument(skip(self), fields(parent_id = %parent), err)]
    async fn child_categories(&mut self, parent: CategoryId) -> Result<Vec<Category>, StoreError> {
        let tx = self.conn()?;
        let rows = sqlx::query(
            r#"
            SELECT id, name, parent_id
            FROM categories
            WHERE parent_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(parent.as_uuid())
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("child_categories", e))?;

        rows.iter().map(category_from_row).collect()
    }

    #[instrument(skip(self), fields(product_id = %product.id), err)]
    async fn insert_product(&mut self, product: &Product) -> Result<(), StoreError> {
        let tx = self.conn()?;
        sqlx::query(
            r#"
            INSERT INTO products (id, name, description, price, category_id, stock_quantity)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(product.description.as_deref())
        .bind(product.price.amount())
        .bind(product.category.map(Uuid::from))
        .bind(i64::from(product.stock_quantity))
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_product", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn get_product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let tx = self.conn()?;
        let row = sqlx::query(
            r#"
            SELECT id, name, description, price, category_id, stock_quantity
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("get_product", e))?;

        row.map(|r| product_from_row(&r)).transpose()
    }

    #[instrument(skip(self, categories), fields(category_count = categories.len()), err)]
    async fn prices_in_categories(
        &mut self,
        categories: &[CategoryId],
    ) -> Result<Vec<Price>, StoreError> {
        let ids: Vec<Uuid> = categories.iter().map(|c| *c.as_uuid()).collect();
        let tx = self.conn()?;
        let rows = sqlx::query("SELECT price FROM products WHERE category_id = ANY($1)")
            .bind(ids)
            .fetch_all(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("prices_in_categories", e))?;

        rows.iter()
            .map(|r| {
                let amount: Decimal = r.try_get("price").map_err(|e| decode_error("price", e))?;
                price_from(amount)
            })
            .collect()
    }

    #[instrument(skip(self), fields(customer_id = %customer.id), err)]
    async fn upsert_customer(&mut self, customer: &Customer) -> Result<(), StoreError> {
        let tx = self.conn()?;
        sqlx::query(
            r#"
            INSERT INTO customers (id, name, email, phone_number)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                email = EXCLUDED.email,
                phone_number = EXCLUDED.phone_number
            "#,
        )
        .bind(customer.id.as_uuid())
        .bind(&customer.name)
        .bind(customer.email.as_deref())
        .bind(customer.phone_number.as_deref())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("upsert_customer", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(customer_id = %id), err)]
    async fn get_customer(&mut self, id: CustomerId) -> Result<Option<Customer>, StoreError> {
        let tx = self.conn()?;
        let row = sqlx::query("SELECT id, name, email, phone_number FROM customers WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("get_customer", e))?;

        row.map(|r| -> Result<Customer, StoreError> {
            Ok(Customer {
                id: CustomerId::from_uuid(r.try_get("id").map_err(|e| decode_error("id", e))?),
                name: r.try_get("name").map_err(|e| decode_error("name", e))?,
                email: r.try_get("email").map_err(|e| decode_error("email", e))?,
                phone_number: r
                    .try_get("phone_number")
                    .map_err(|e| decode_error("phone_number", e))?,
            })
        })
        .transpose()
    }

    #[instrument(skip(self), fields(order_id = %order.id, customer_id = %order.customer), err)]
    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        let tx = self.conn()?;
        sqlx::query(
            r#"
            INSERT INTO orders (id, customer_id, created_at, status)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.customer.as_uuid())
        .bind(order.created_at)
        .bind(order.status.as_str())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(order_id = %item.order, product_id = %item.product), err)]
    async fn insert_order_item(&mut self, item: &OrderItem) -> Result<(), StoreError> {
        let tx = self.conn()?;
        sqlx::query(
            r#"
            INSERT INTO order_items (id, order_id, product_id, quantity)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(item.order.as_uuid())
        .bind(item.product.as_uuid())
        .bind(i64::from(item.quantity))
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order_item", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(order_id = %id), err)]
    async fn get_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let tx = self.conn()?;
        let row = sqlx::query("SELECT id, customer_id, created_at, status FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("get_order", e))?;

        row.map(|r| -> Result<Order, StoreError> {
            let status: String = r.try_get("status").map_err(|e| decode_error("status", e))?;
            let created_at: DateTime<Utc> =
                r.try_get("created_at").map_err(|e| decode_error("created_at", e))?;
            Ok(Order {
                id: OrderId::from_uuid(r.try_get("id").map_err(|e| decode_error("id", e))?),
                customer: CustomerId::from_uuid(
                    r.try_get("customer_id").map_err(|e| decode_error("customer_id", e))?,
                ),
                created_at,
                status: status
                    .parse::<OrderStatus>()
                    .map_err(|e| StoreError::Integrity(e.to_string()))?,
            })
        })
        .transpose()
    }

    #[instrument(skip(self), fields(order_id = %order), err)]
    async fn order_items(&mut self, order: OrderId) -> Result<Vec<OrderItem>, StoreError> {
        let tx = self.conn()?;
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, product_id, quantity
            FROM order_items
            WHERE order_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(order.as_uuid())
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("order_items", e))?;

        rows.iter()
            .map(|r| {
                let quantity: i64 = r.try_get("quantity").map_err(|e| decode_error("quantity", e))?;
                Ok(OrderItem {
                    id: OrderItemId::from_uuid(r.try_get("id").map_err(|e| decode_error("id", e))?),
                    order: OrderId::from_uuid(
                        r.try_get("order_id").map_err(|e| decode_error("order_id", e))?,
                    ),
                    product: ProductId::from_uuid(
                        r.try_get("product_id").map_err(|e| decode_error("product_id", e))?,
                    ),
                    quantity: u32::try_from(quantity)
                        .map_err(|_| StoreError::Integrity(format!("bad quantity {quantity}")))?,
                })
            })
            .collect()
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::Closed)?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::Closed)?;
        tx.rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

fn category_from_row(row: &PgRow) -> Result<Category, StoreError> {
    let parent: Option<Uuid> = row.try_get("parent_id").map_err(|e| decode_error("parent_id", e))?;
    Ok(Category {
        id: CategoryId::from_uuid(row.try_get("id").map_err(|e| decode_error("id", e))?),
        name: row.try_get("name").map_err(|e| decode_error("name", e))?,
        parent: parent.map(CategoryId::from_uuid),
    })
}

fn product_from_row(row: &PgRow) -> Result<Product, StoreError> {
    let amount: Decimal = row.try_get("price").map_err(|e| decode_error("price", e))?;
    let category: Option<Uuid> = row
        .try_get("category_id")
        .map_err(|e| decode_error("category_id", e))?;
    let stock: i64 = row
        .try_get("stock_quantity")
        .map_err(|e| decode_error("stock_quantity", e))?;

    Ok(Product {
        id: ProductId::from_uuid(row.try_get("id").map_err(|e| decode_error("id", e))?),
        name: row.try_get("name").map_err(|e| decode_error("name", e))?,
        description: row
            .try_get("description")
            .map_err(|e| decode_error("description", e))?,
        price: price_from(amount)?,
        category: category.map(CategoryId::from_uuid),
        stock_quantity: u32::try_from(stock)
            .map_err(|_| StoreError::Integrity(format!("bad stock_quantity {stock}")))?,
    })
}

fn price_from(amount: Decimal) -> Result<Price, StoreError> {
    Price::new(amount).map_err(|e| StoreError::Integrity(format!("stored price {amount}: {e}")))
}

fn decode_error(column: &str, err: sqlx::Error) -> StoreError {
    StoreError::Integrity(format!("failed to decode column {column}: {err}"))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                Some("23503") | Some("23514") => StoreError::Integrity(msg),
                _ => StoreError::Unavailable(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::RowNotFound => StoreError::NotFound(format!("row not found in {}", operation)),
        _ => StoreError::Unavailable(format!("sqlx error in {}: {}", operation, err)),
    }
}
