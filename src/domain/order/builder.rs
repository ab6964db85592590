use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashSet;
use uuid::Uuid;

use crate::domain::inventory::Product;
use super::aggregate::{Order, OrderItem};
use super::commands::OrderCreateRequest;
use super::errors::OrderError;
use super::value_objects::DeliveryAddress;

// ============================================================================
// Order Aggregate Builder
// ============================================================================
//
// Pure assembly of the rows a checkout writes: the order header, one item
// snapshot per product and the delivery address. Totals are recomputed from
// the snapshots on every added line. Nothing here touches the store.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct OrderBuilder {
    order: Order,
    items: Vec<OrderItem>,
    products: HashSet<Uuid>,
    address: DeliveryAddress,
}

impl OrderBuilder {
    /// Validate the request and lay out an empty `pending` order for `user_id`
    pub fn new(
        user_id: Uuid,
        request: &OrderCreateRequest,
        shipping_price: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        request.validate().map_err(OrderError::Validation)?;
        if shipping_price.is_sign_negative() {
            return Err(OrderError::Validation(format!(
                "shipping price cannot be negative: {}",
                shipping_price
            )));
        }

        let notes = request.notes.as_ref().map(|n| n.trim().to_string());
        let order = Order::new(user_id, request.payment_method, shipping_price, notes, now);
        let address = DeliveryAddress::for_order(order.id, &request.delivery_address);

        Ok(Self {
            order,
            items: Vec::new(),
            products: HashSet::new(),
            address,
        })
    }

    /// Header as it stands; totals reflect the lines added so far
    pub fn header(&self) -> &Order {
        &self.order
    }

    /// Snapshot `product` at its current title and price
    pub fn add_line(&mut self, product: &Product, quantity: i32) -> Result<&OrderItem, OrderError> {
        if quantity <= 0 {
            return Err(OrderError::Validation(format!(
                "quantity for product {} must be positive, got {}",
                product.id, quantity
            )));
        }
        if product.price.is_sign_negative() {
            return Err(OrderError::Validation(format!(
                "price for product {} cannot be negative",
                product.id
            )));
        }
        if !self.products.insert(product.id) {
            return Err(OrderError::Validation(format!(
                "product {} appears twice in the order",
                product.id
            )));
        }

        let index = self.items.len();
        self.items.push(OrderItem {
            id: Uuid::new_v4(),
            order_id: self.order.id,
            product_id: product.id,
            product_title: product.title.clone(),
            product_price: product.price.round_dp(2),
            quantity,
        });
        self.recompute_totals();

        Ok(&self.items[index])
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn delivery_address(&self) -> &DeliveryAddress {
        &self.address
    }

    pub fn subtotal(&self) -> Decimal {
        self.order.subtotal
    }

    pub fn total(&self) -> Decimal {
        self.order.total
    }

    fn recompute_totals(&mut self) {
        let subtotal: Decimal = self.items.iter().map(OrderItem::total_price).sum();
        self.order.subtotal = subtotal.round_dp(2);
        // Discount is a manual field; it is never applied here
        self.order.total = (self.order.shipping_price + self.order.subtotal).round_dp(2);
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
