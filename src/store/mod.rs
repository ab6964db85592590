// ============================================================================
// Store - Units of Work over the Relational Model
// ============================================================================
//
// `Store::begin` opens a unit of work; every read and write the domain needs
// goes through it. Nothing is visible to other units of work until `commit`.
// Dropping a unit of work without committing rolls it back.
//
// Nesting is explicit: a caller already holding a unit of work passes it as
// `Scope::Nested`, and the callee brackets its writes in a savepoint instead
// of opening (and committing) a transaction of its own.
//
// Backends:
// - PgStore     - PostgreSQL via sqlx
// - MemoryStore - single-process, used by tests and the demo mode
//
// ============================================================================

// Private module declarations
mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::cart::CartLine;
use crate::domain::inventory::Product;
use crate::domain::order::{DeliveryAddress, Order, OrderItem, OrderStatus, OrderView};

pub use memory::{MemoryStore, MemoryTx};
#[cfg(test)]
pub use memory::FailPoint;
pub use postgres::{PgStore, PgTx};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Constraint violated: {0}")]
    Constraint(String),

    #[error("Invalid savepoint name: {0}")]
    InvalidSavepoint(String),

    #[error("Unknown savepoint: {0}")]
    UnknownSavepoint(String),

    #[cfg(test)]
    #[error("Injected failure at {0:?}")]
    Injected(FailPoint),
}

/// Offset/limit window for list queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: i64,
    pub limit: i64,
}

impl Page {
    pub const MAX_LIMIT: i64 = 100;

    /// Clamp caller input: offset >= 0, 1 <= limit <= 100
    pub fn new(offset: Option<i64>, limit: Option<i64>) -> Self {
        Self {
            offset: offset.unwrap_or(0).max(0),
            limit: limit.unwrap_or(Self::MAX_LIMIT).clamp(1, Self::MAX_LIMIT),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Which orders a list query returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderFilter {
    User(Uuid),
    Status(OrderStatus),
}

/// Whether an operation owns its unit of work or runs inside the caller's
pub enum Scope<'a, U> {
    /// Open, commit or roll back a unit of work of our own
    Root,
    /// The caller holds a unit of work; use a savepoint inside it
    Nested(&'a mut U),
}

#[async_trait]
pub trait Store: Send + Sync + 'static {
    type Tx: UnitOfWork;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;
}

#[async_trait]
pub trait UnitOfWork: Send + Sized {
    // -- Products / stock ledger --------------------------------------------

    async fn find_product(&mut self, product_id: Uuid) -> Result<Option<Product>, StoreError>;

    /// `reserved += quantity` iff `stock_quantity - reserved >= quantity`,
    /// evaluated atomically. Returns whether the row was updated.
    async fn reserve_stock(&mut self, product_id: Uuid, quantity: i32) -> Result<bool, StoreError>;

    /// `reserved = max(reserved - quantity, 0)`
    async fn release_stock(&mut self, product_id: Uuid, quantity: i32) -> Result<(), StoreError>;

    // -- Cart ---------------------------------------------------------------

    /// The user's cart lines joined with their products, by product title
    async fn cart_lines(&mut self, user_id: Uuid) -> Result<Vec<CartLine>, StoreError>;

    /// Create the cart if needed and set the line to `quantity`
    async fn set_cart_quantity(
        &mut self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), StoreError>;

    /// Returns whether a line was removed
    async fn remove_cart_item(&mut self, user_id: Uuid, product_id: Uuid) -> Result<bool, StoreError>;

    /// Delete every line, keep the cart. Returns the number of lines removed.
    async fn clear_cart(&mut self, user_id: Uuid) -> Result<u64, StoreError>;

    // -- Orders -------------------------------------------------------------

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError>;

    async fn insert_order_item(&mut self, item: &OrderItem) -> Result<(), StoreError>;

    /// Write recomputed money columns; `updated_at` moves with them
    async fn update_order_totals(
        &mut self,
        order_id: Uuid,
        subtotal: Decimal,
        total: Decimal,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn insert_delivery_address(&mut self, address: &DeliveryAddress) -> Result<(), StoreError>;

    /// Fully loaded order; with `owner` set, orders of other users are absent
    async fn find_order(
        &mut self,
        order_id: Uuid,
        owner: Option<Uuid>,
    ) -> Result<Option<OrderView>, StoreError>;

    /// Newest first
    async fn list_orders(&mut self, filter: OrderFilter, page: Page) -> Result<Vec<OrderView>, StoreError>;

    /// Persist status, payment status and timestamps of `order`, but only if
    /// the stored status is still `expected`. Returns whether it was written.
    async fn update_order_state(&mut self, order: &Order, expected: OrderStatus) -> Result<bool, StoreError>;

    // -- Unit of work control -----------------------------------------------

    async fn savepoint(&mut self, name: &str) -> Result<(), StoreError>;

    async fn rollback_to_savepoint(&mut self, name: &str) -> Result<(), StoreError>;

    async fn release_savepoint(&mut self, name: &str) -> Result<(), StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}

/// Savepoint names end up in SQL text, so only identifiers are accepted
pub(crate) fn check_savepoint_name(name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && name.len() <= 63
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidSavepoint(name.to_string()))
    }
}
