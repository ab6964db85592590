use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::cart::CartLine;
use crate::domain::inventory::{Product, ProductSummary};
use crate::domain::order::{
    DeliveryAddress, Order, OrderItem, OrderItemView, OrderStatus, OrderView,
};
use crate::utils::{retry_with_backoff, RetryConfig};
use super::{OrderFilter, Page, Store, StoreError, UnitOfWork, check_savepoint_name};

// ============================================================================
// PostgreSQL Store
// ============================================================================
//
// One sqlx transaction per unit of work. Stock reservation is a single
// conditional UPDATE, so PostgreSQL's row lock on the product is what
// serializes concurrent checkouts. Order reads are three set-based queries
// (headers, lines joined with products, addresses) regardless of page size.
//
// ============================================================================

const ORDER_COLUMNS: &str = "id, user_id, order_status, payment_status, subtotal, shipping_price, \
     discount, total, payment_method, payment_id, notes, created_at, updated_at, paid_at, \
     shipped_at, delivered_at, cancelled_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect, retrying while the database is unreachable
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        retry: RetryConfig,
    ) -> Result<Self, StoreError> {
        let pool = retry_with_backoff(retry, |attempt| {
            tracing::info!(attempt = attempt, "Connecting to PostgreSQL");
            PgPoolOptions::new()
                .max_connections(max_connections)
                .connect(database_url)
        })
        .await
        .into_result()?;

        Ok(Self::new(pool))
    }

    /// Apply pending migrations from ./migrations
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        Ok(PgTx {
            tx: self.pool.begin().await?,
        })
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[derive(sqlx::FromRow)]
struct CartLineRow {
    quantity: i32,
    id: Uuid,
    title: String,
    price: Decimal,
    category_id: Option<Uuid>,
    stock_quantity: i32,
    reserved: i32,
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    product_title: String,
    product_price: Decimal,
    quantity: i32,
    live_title: Option<String>,
    live_price: Option<Decimal>,
    live_category_id: Option<Uuid>,
}

impl ItemRow {
    fn into_view(self) -> OrderItemView {
        let product = match (self.live_title, self.live_price) {
            (Some(title), Some(price)) => Some(ProductSummary {
                id: self.product_id,
                title,
                price,
                category_id: self.live_category_id,
            }),
            _ => None,
        };

        OrderItemView::new(
            OrderItem {
                id: self.id,
                order_id: self.order_id,
                product_id: self.product_id,
                product_title: self.product_title,
                product_price: self.product_price,
                quantity: self.quantity,
            },
            product,
        )
    }
}

impl PgTx {
    /// Attach lines and addresses to already loaded headers
    async fn load_views(&mut self, orders: Vec<Order>) -> Result<Vec<OrderView>, StoreError> {
        if orders.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();

        let item_rows = sqlx::query_as::<_, ItemRow>(
            "SELECT oi.id, oi.order_id, oi.product_id, oi.product_title, oi.product_price, oi.quantity,
                    p.title AS live_title, p.price AS live_price, p.category_id AS live_category_id
             FROM order_items oi
             LEFT JOIN products p ON p.id = oi.product_id
             WHERE oi.order_id = ANY($1)
             ORDER BY oi.product_title",
        )
        .bind(&ids)
        .fetch_all(&mut *self.tx)
        .await?;

        let addresses = sqlx::query_as::<_, DeliveryAddress>(
            "SELECT id, order_id, city, postcode, region, country, phone
             FROM delivery_addresses
             WHERE order_id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut items_by_order: HashMap<Uuid, Vec<OrderItemView>> = HashMap::new();
        for row in item_rows {
            items_by_order.entry(row.order_id).or_default().push(row.into_view());
        }
        let mut address_by_order: HashMap<Uuid, DeliveryAddress> =
            addresses.into_iter().map(|a| (a.order_id, a)).collect();

        Ok(orders
            .into_iter()
            .map(|order| OrderView {
                order_items: items_by_order.remove(&order.id).unwrap_or_default(),
                delivery_address: address_by_order.remove(&order.id),
                order,
            })
            .collect())
    }
}

#[async_trait]
impl UnitOfWork for PgTx {
    async fn find_product(&mut self, product_id: Uuid) -> Result<Option<Product>, StoreError> {
        let product = sqlx::query_as::<_, Product>(
            "SELECT id, title, price, category_id, stock_quantity, reserved
             FROM products WHERE id = $1",
        )
        .bind(product_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(product)
    }

    async fn reserve_stock(&mut self, product_id: Uuid, quantity: i32) -> Result<bool, StoreError> {
        let reserved = sqlx::query_scalar::<_, Uuid>(
            "UPDATE products
             SET reserved = reserved + $2
             WHERE id = $1 AND stock_quantity - reserved >= $2
             RETURNING id",
        )
        .bind(product_id)
        .bind(quantity)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(reserved.is_some())
    }

    async fn release_stock(&mut self, product_id: Uuid, quantity: i32) -> Result<(), StoreError> {
        sqlx::query("UPDATE products SET reserved = GREATEST(reserved - $2, 0) WHERE id = $1")
            .bind(product_id)
            .bind(quantity)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn cart_lines(&mut self, user_id: Uuid) -> Result<Vec<CartLine>, StoreError> {
        let rows = sqlx::query_as::<_, CartLineRow>(
            "SELECT ci.quantity, p.id, p.title, p.price, p.category_id, p.stock_quantity, p.reserved
             FROM cart_items ci
             JOIN carts c ON c.id = ci.cart_id
             JOIN products p ON p.id = ci.product_id
             WHERE c.user_id = $1
             ORDER BY p.title",
        )
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| CartLine {
                product_id: row.id,
                quantity: row.quantity,
                product: Product {
                    id: row.id,
                    title: row.title,
                    price: row.price,
                    category_id: row.category_id,
                    stock_quantity: row.stock_quantity,
                    reserved: row.reserved,
                },
            })
            .collect())
    }

    async fn set_cart_quantity(
        &mut self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO carts (id, user_id) VALUES ($1, $2) ON CONFLICT (user_id) DO NOTHING")
            .bind(Uuid::new_v4())
            .bind(user_id)
            .execute(&mut *self.tx)
            .await?;

        sqlx::query(
            "INSERT INTO cart_items (cart_id, product_id, quantity)
             SELECT id, $2, $3 FROM carts WHERE user_id = $1
             ON CONFLICT (cart_id, product_id) DO UPDATE SET quantity = EXCLUDED.quantity",
        )
        .bind(user_id)
        .bind(product_id)
        .bind(quantity)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn remove_cart_item(&mut self, user_id: Uuid, product_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "DELETE FROM cart_items ci
             USING carts c
             WHERE ci.cart_id = c.id AND c.user_id = $1 AND ci.product_id = $2",
        )
        .bind(user_id)
        .bind(product_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear_cart(&mut self, user_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM cart_items ci
             USING carts c
             WHERE ci.cart_id = c.id AND c.user_id = $1",
        )
        .bind(user_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO orders (
                id, user_id, order_status, payment_status, subtotal, shipping_price, discount,
                total, payment_method, payment_id, notes, created_at, updated_at
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(order.order_status)
        .bind(order.payment_status)
        .bind(order.subtotal)
        .bind(order.shipping_price)
        .bind(order.discount)
        .bind(order.total)
        .bind(order.payment_method)
        .bind(&order.payment_id)
        .bind(&order.notes)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_order_item(&mut self, item: &OrderItem) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO order_items (id, order_id, product_id, product_title, product_price, quantity)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(item.id)
        .bind(item.order_id)
        .bind(item.product_id)
        .bind(&item.product_title)
        .bind(item.product_price)
        .bind(item.quantity)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_order_totals(
        &mut self,
        order_id: Uuid,
        subtotal: Decimal,
        total: Decimal,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE orders SET subtotal = $2, total = $3, updated_at = $4 WHERE id = $1")
            .bind(order_id)
            .bind(subtotal)
            .bind(total)
            .bind(updated_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_delivery_address(&mut self, address: &DeliveryAddress) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO delivery_addresses (id, order_id, city, postcode, region, country, phone)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(address.id)
        .bind(address.order_id)
        .bind(&address.city)
        .bind(address.postcode)
        .bind(&address.region)
        .bind(&address.country)
        .bind(&address.phone)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn find_order(
        &mut self,
        order_id: Uuid,
        owner: Option<Uuid>,
    ) -> Result<Option<OrderView>, StoreError> {
        // Ownership is part of the query, not a check afterwards
        let sql = format!(
            "SELECT {} FROM orders WHERE id = $1 AND ($2::uuid IS NULL OR user_id = $2)",
            ORDER_COLUMNS
        );
        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(order_id)
            .bind(owner)
            .fetch_optional(&mut *self.tx)
            .await?;

        match order {
            Some(order) => Ok(self.load_views(vec![order]).await?.into_iter().next()),
            None => Ok(None),
        }
    }

    async fn list_orders(&mut self, filter: OrderFilter, page: Page) -> Result<Vec<OrderView>, StoreError> {
        let orders = match filter {
            OrderFilter::User(user_id) => {
                let sql = format!(
                    "SELECT {} FROM orders WHERE user_id = $1
                     ORDER BY created_at DESC, id DESC OFFSET $2 LIMIT $3",
                    ORDER_COLUMNS
                );
                sqlx::query_as::<_, Order>(&sql)
                    .bind(user_id)
                    .bind(page.offset)
                    .bind(page.limit)
                    .fetch_all(&mut *self.tx)
                    .await?
            }
            OrderFilter::Status(status) => {
                let sql = format!(
                    "SELECT {} FROM orders WHERE order_status = $1
                     ORDER BY created_at DESC, id DESC OFFSET $2 LIMIT $3",
                    ORDER_COLUMNS
                );
                sqlx::query_as::<_, Order>(&sql)
                    .bind(status)
                    .bind(page.offset)
                    .bind(page.limit)
                    .fetch_all(&mut *self.tx)
                    .await?
            }
        };

        self.load_views(orders).await
    }

    async fn update_order_state(&mut self, order: &Order, expected: OrderStatus) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE orders
             SET order_status = $2, payment_status = $3, updated_at = $4, paid_at = $5,
                 shipped_at = $6, delivered_at = $7, cancelled_at = $8
             WHERE id = $1 AND order_status = $9",
        )
        .bind(order.id)
        .bind(order.order_status)
        .bind(order.payment_status)
        .bind(order.updated_at)
        .bind(order.paid_at)
        .bind(order.shipped_at)
        .bind(order.delivered_at)
        .bind(order.cancelled_at)
        .bind(expected)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn savepoint(&mut self, name: &str) -> Result<(), StoreError> {
        check_savepoint_name(name)?;
        sqlx::query(&format!("SAVEPOINT {}", name))
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> Result<(), StoreError> {
        check_savepoint_name(name)?;
        sqlx::query(&format!("ROLLBACK TO SAVEPOINT {}", name))
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn release_savepoint(&mut self, name: &str) -> Result<(), StoreError> {
        check_savepoint_name(name)?;
        sqlx::query(&format!("RELEASE SAVEPOINT {}", name))
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

// ============================================================================
// PostgreSQL Tests
// ============================================================================
//
// These need a reachable database and are ignored by default:
//
//   DATABASE_URL=postgres://... cargo test -- --ignored
//
// Every test seeds its own products and users, so they can share a database.
//
// ============================================================================
