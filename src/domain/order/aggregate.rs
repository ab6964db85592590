use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::inventory::ProductSummary;
use super::value_objects::{DeliveryAddress, OrderStatus, PaymentMethod, PaymentStatus};

// ============================================================================
// Order Aggregate
// ============================================================================
//
// `Order` is the header row. Line items are immutable snapshots of the
// product at checkout time; `OrderView` is the fully loaded read model the
// store hands back (header + lines with their live product + address).
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    // Identity
    pub id: Uuid,
    pub user_id: Uuid,

    // Workflow and money state (independent axes)
    pub order_status: OrderStatus,
    pub payment_status: PaymentStatus,

    // Amounts, two fraction digits
    pub subtotal: Decimal,
    pub shipping_price: Decimal,
    pub discount: Option<Decimal>,
    pub total: Decimal,

    pub payment_method: PaymentMethod,
    pub payment_id: Option<String>,
    pub notes: Option<String>,

    // Audit trail; the optional ones are set once, by their transition
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Order {
    /// A fresh `pending`/`pending` order with nothing on it but shipping
    pub fn new(
        user_id: Uuid,
        payment_method: PaymentMethod,
        shipping_price: Decimal,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let shipping_price = shipping_price.round_dp(2);
        Self {
            id: Uuid::now_v7(),
            user_id,
            order_status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            subtotal: Decimal::ZERO,
            shipping_price,
            discount: None,
            total: shipping_price,
            payment_method,
            payment_id: None,
            notes,
            created_at: now,
            updated_at: now,
            paid_at: None,
            shipped_at: None,
            delivered_at: None,
            cancelled_at: None,
        }
    }
}

/// Snapshot of one product line, frozen when the order was placed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub product_title: String,
    pub product_price: Decimal,
    pub quantity: i32,
}

impl OrderItem {
    /// quantity * snapshotted price
    pub fn total_price(&self) -> Decimal {
        (self.product_price * Decimal::from(self.quantity)).round_dp(2)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItemView {
    #[serde(flatten)]
    pub item: OrderItem,
    pub total_price: Decimal,
    /// Current catalog data; `None` once the product is gone
    pub product: Option<ProductSummary>,
}

impl OrderItemView {
    pub fn new(item: OrderItem, product: Option<ProductSummary>) -> Self {
        Self {
            total_price: item.total_price(),
            item,
            product,
        }
    }
}

/// An order with everything a caller needs to render it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    pub order_items: Vec<OrderItemView>,
    pub delivery_address: Option<DeliveryAddress>,
}

impl OrderView {
    pub fn id(&self) -> Uuid {
        self.order.id
    }

    pub fn status(&self) -> OrderStatus {
        self.order.order_status
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
