use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
#[cfg(test)]
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::domain::cart::CartLine;
use crate::domain::inventory::Product;
use crate::domain::order::{
    DeliveryAddress, Order, OrderItem, OrderItemView, OrderStatus, OrderView,
};
use super::{OrderFilter, Page, Store, StoreError, UnitOfWork, check_savepoint_name};

// ============================================================================
// In-Memory Store
// ============================================================================
//
// A unit of work holds the state lock for its whole lifetime, so units of
// work are serialized the way row locks serialize competing writers in
// PostgreSQL. The state as of `begin` is kept aside and put back on rollback
// or drop; savepoints are further snapshots on a stack.
//
// Test builds carry fail points that make a chosen write fail once, to
// exercise rollback. They are compiled out of the service binary.
//
// ============================================================================

/// Writes that can be made to fail on demand
#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    InsertOrder,
    InsertOrderItem,
    UpdateOrderTotals,
    InsertDeliveryAddress,
    ClearCart,
    Commit,
}

#[derive(Debug, Clone, Default)]
struct MemoryCart {
    id: Uuid,
    // (product_id, quantity) in insertion order
    items: Vec<(Uuid, i32)>,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    products: HashMap<Uuid, Product>,
    carts: HashMap<Uuid, MemoryCart>,
    orders: HashMap<Uuid, Order>,
    order_items: Vec<OrderItem>,
    addresses: HashMap<Uuid, DeliveryAddress>,
}

impl MemoryState {
    fn view(&self, order: &Order) -> OrderView {
        let order_items = self
            .order_items
            .iter()
            .filter(|item| item.order_id == order.id)
            .map(|item| {
                let product = self.products.get(&item.product_id).map(Product::summary);
                OrderItemView::new(item.clone(), product)
            })
            .collect();

        OrderView {
            order: order.clone(),
            order_items,
            delivery_address: self.addresses.get(&order.id).cloned(),
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    #[cfg(test)]
    fail_points: Arc<std::sync::Mutex<HashSet<FailPoint>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a catalog product
    pub async fn seed_product(&self, product: Product) {
        let mut state = self.state.lock().await;
        state.products.insert(product.id, product);
    }

    /// Committed view of a product
    pub async fn product(&self, product_id: Uuid) -> Option<Product> {
        self.state.lock().await.products.get(&product_id).cloned()
    }

    /// Edit a product outside any checkout, e.g. a catalog price change
    pub async fn update_product<F>(&self, product_id: Uuid, edit: F) -> bool
    where
        F: FnOnce(&mut Product),
    {
        let mut state = self.state.lock().await;
        match state.products.get_mut(&product_id) {
            Some(product) => {
                edit(product);
                true
            }
            None => false,
        }
    }

    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }

    pub async fn order_item_count(&self) -> usize {
        self.state.lock().await.order_items.len()
    }

    pub async fn address_count(&self) -> usize {
        self.state.lock().await.addresses.len()
    }

    /// Make the next write at `point` fail
    #[cfg(test)]
    pub fn fail_at(&self, point: FailPoint) {
        if let Ok(mut points) = self.fail_points.lock() {
            points.insert(point);
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let snapshot = guard.clone();

        Ok(MemoryTx {
            guard,
            snapshot: Some(snapshot),
            savepoints: Vec::new(),
            #[cfg(test)]
            fail_points: self.fail_points.clone(),
        })
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    // Some(..) until committed
    snapshot: Option<MemoryState>,
    savepoints: Vec<(String, MemoryState)>,
    #[cfg(test)]
    fail_points: Arc<std::sync::Mutex<HashSet<FailPoint>>>,
}

#[cfg(test)]
impl MemoryTx {
    fn trip(&self, point: FailPoint) -> Result<(), StoreError> {
        let tripped = self
            .fail_points
            .lock()
            .map(|mut points| points.remove(&point))
            .unwrap_or(false);

        if tripped {
            tracing::debug!(fail_point = ?point, "Injected store failure");
            return Err(StoreError::Injected(point));
        }
        Ok(())
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.guard = snapshot;
        }
    }
}

#[async_trait]
impl UnitOfWork for MemoryTx {
    async fn find_product(&mut self, product_id: Uuid) -> Result<Option<Product>, StoreError> {
        Ok(self.guard.products.get(&product_id).cloned())
    }

    async fn reserve_stock(&mut self, product_id: Uuid, quantity: i32) -> Result<bool, StoreError> {
        match self.guard.products.get_mut(&product_id) {
            Some(product) if product.stock_quantity - product.reserved >= quantity => {
                product.reserved += quantity;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_stock(&mut self, product_id: Uuid, quantity: i32) -> Result<(), StoreError> {
        if let Some(product) = self.guard.products.get_mut(&product_id) {
            product.reserved = (product.reserved - quantity).max(0);
        }
        Ok(())
    }

    async fn cart_lines(&mut self, user_id: Uuid) -> Result<Vec<CartLine>, StoreError> {
        let state = &*self.guard;
        let Some(cart) = state.carts.get(&user_id) else {
            return Ok(Vec::new());
        };

        let mut lines: Vec<CartLine> = cart
            .items
            .iter()
            .filter_map(|(product_id, quantity)| {
                state.products.get(product_id).map(|product| CartLine {
                    product_id: *product_id,
                    quantity: *quantity,
                    product: product.clone(),
                })
            })
            .collect();
        lines.sort_by(|a, b| a.product.title.cmp(&b.product.title));

        Ok(lines)
    }

    async fn set_cart_quantity(
        &mut self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), StoreError> {
        if quantity <= 0 {
            return Err(StoreError::Constraint(format!(
                "cart quantity must be positive, got {}",
                quantity
            )));
        }
        if !self.guard.products.contains_key(&product_id) {
            return Err(StoreError::Constraint(format!("unknown product {}", product_id)));
        }

        let cart = self.guard.carts.entry(user_id).or_insert_with(|| MemoryCart {
            id: Uuid::new_v4(),
            items: Vec::new(),
        });

        match cart.items.iter_mut().find(|(id, _)| *id == product_id) {
            Some((_, existing)) => *existing = quantity,
            None => cart.items.push((product_id, quantity)),
        }
        Ok(())
    }

    async fn remove_cart_item(&mut self, user_id: Uuid, product_id: Uuid) -> Result<bool, StoreError> {
        let Some(cart) = self.guard.carts.get_mut(&user_id) else {
            return Ok(false);
        };
        let before = cart.items.len();
        cart.items.retain(|(id, _)| *id != product_id);
        Ok(cart.items.len() < before)
    }

    async fn clear_cart(&mut self, user_id: Uuid) -> Result<u64, StoreError> {
        #[cfg(test)]
        self.trip(FailPoint::ClearCart)?;

        let Some(cart) = self.guard.carts.get_mut(&user_id) else {
            return Ok(0);
        };
        let removed = cart.items.len() as u64;
        cart.items.clear();
        Ok(removed)
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        #[cfg(test)]
        self.trip(FailPoint::InsertOrder)?;

        if self.guard.orders.contains_key(&order.id) {
            return Err(StoreError::Constraint(format!("duplicate order {}", order.id)));
        }
        self.guard.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn insert_order_item(&mut self, item: &OrderItem) -> Result<(), StoreError> {
        #[cfg(test)]
        self.trip(FailPoint::InsertOrderItem)?;

        if !self.guard.orders.contains_key(&item.order_id) {
            return Err(StoreError::Constraint(format!("unknown order {}", item.order_id)));
        }
        if item.quantity <= 0 || item.product_price.is_sign_negative() {
            return Err(StoreError::Constraint(format!(
                "invalid order item for product {}",
                item.product_id
            )));
        }
        let duplicate = self
            .guard
            .order_items
            .iter()
            .any(|existing| existing.order_id == item.order_id && existing.product_id == item.product_id);
        if duplicate {
            return Err(StoreError::Constraint(format!(
                "uq_order_product ({}, {})",
                item.order_id, item.product_id
            )));
        }

        self.guard.order_items.push(item.clone());
        Ok(())
    }

    async fn update_order_totals(
        &mut self,
        order_id: Uuid,
        subtotal: Decimal,
        total: Decimal,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        #[cfg(test)]
        self.trip(FailPoint::UpdateOrderTotals)?;

        let order = self
            .guard
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| StoreError::Constraint(format!("unknown order {}", order_id)))?;
        order.subtotal = subtotal;
        order.total = total;
        order.updated_at = updated_at;
        Ok(())
    }

    async fn insert_delivery_address(&mut self, address: &DeliveryAddress) -> Result<(), StoreError> {
        #[cfg(test)]
        self.trip(FailPoint::InsertDeliveryAddress)?;

        if !self.guard.orders.contains_key(&address.order_id) {
            return Err(StoreError::Constraint(format!("unknown order {}", address.order_id)));
        }
        if self.guard.addresses.contains_key(&address.order_id) {
            return Err(StoreError::Constraint(format!(
                "order {} already has an address",
                address.order_id
            )));
        }
        self.guard.addresses.insert(address.order_id, address.clone());
        Ok(())
    }

    async fn find_order(
        &mut self,
        order_id: Uuid,
        owner: Option<Uuid>,
    ) -> Result<Option<OrderView>, StoreError> {
        let state = &*self.guard;
        Ok(state
            .orders
            .get(&order_id)
            .filter(|order| owner.map_or(true, |user_id| order.user_id == user_id))
            .map(|order| state.view(order)))
    }

    async fn list_orders(&mut self, filter: OrderFilter, page: Page) -> Result<Vec<OrderView>, StoreError> {
        let state = &*self.guard;
        let mut orders: Vec<&Order> = state
            .orders
            .values()
            .filter(|order| match filter {
                OrderFilter::User(user_id) => order.user_id == user_id,
                OrderFilter::Status(status) => order.order_status == status,
            })
            .collect();
        orders.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));

        Ok(orders
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .map(|order| state.view(order))
            .collect())
    }

    async fn update_order_state(&mut self, order: &Order, expected: OrderStatus) -> Result<bool, StoreError> {
        let Some(stored) = self.guard.orders.get_mut(&order.id) else {
            return Ok(false);
        };
        if stored.order_status != expected {
            return Ok(false);
        }

        stored.order_status = order.order_status;
        stored.payment_status = order.payment_status;
        stored.updated_at = order.updated_at;
        stored.paid_at = order.paid_at;
        stored.shipped_at = order.shipped_at;
        stored.delivered_at = order.delivered_at;
        stored.cancelled_at = order.cancelled_at;
        Ok(true)
    }

    async fn savepoint(&mut self, name: &str) -> Result<(), StoreError> {
        check_savepoint_name(name)?;
        let snapshot = self.guard.clone();
        self.savepoints.push((name.to_string(), snapshot));
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> Result<(), StoreError> {
        let position = self
            .savepoints
            .iter()
            .rposition(|(saved, _)| saved == name)
            .ok_or_else(|| StoreError::UnknownSavepoint(name.to_string()))?;

        // Like SQL: later savepoints go away, this one stays usable
        self.savepoints.truncate(position + 1);
        *self.guard = self.savepoints[position].1.clone();
        Ok(())
    }

    async fn release_savepoint(&mut self, name: &str) -> Result<(), StoreError> {
        let position = self
            .savepoints
            .iter()
            .rposition(|(saved, _)| saved == name)
            .ok_or_else(|| StoreError::UnknownSavepoint(name.to_string()))?;
        self.savepoints.truncate(position);
        Ok(())
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        #[cfg(test)]
        self.trip(FailPoint::Commit)?;
        self.snapshot = None;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        // Drop restores the snapshot
        drop(self);
        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
