use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::inventory::StockLedger;
use crate::metrics::Metrics;
use crate::store::{OrderFilter, Page, Store, UnitOfWork};
use super::aggregate::OrderView;
use super::commands::StatusCommand;
use super::errors::OrderError;
use super::state_machine::{apply_cancel, apply_transition, pinned_source};
use super::value_objects::OrderStatus;

// ============================================================================
// Order Service - Queries and Status Workflow
// ============================================================================
//
// Reads return fully loaded `OrderView`s. Writes load the order, run it
// through the state machine and persist with an update guarded by the status
// the order was read in, so two concurrent transitions cannot both win.
//
// ============================================================================

pub struct OrderService<S: Store> {
    store: Arc<S>,
    metrics: Arc<Metrics>,
}

impl<S: Store> OrderService<S> {
    pub fn new(store: Arc<S>, metrics: Arc<Metrics>) -> Self {
        Self { store, metrics }
    }

    /// The user's orders, newest first
    pub async fn list_orders(&self, user_id: Uuid, page: Page) -> Result<Vec<OrderView>, OrderError> {
        let mut tx = self.store.begin().await?;
        let orders = tx.list_orders(OrderFilter::User(user_id), page).await?;
        tx.commit().await?;

        if orders.is_empty() {
            return Err(OrderError::NoOrders);
        }
        Ok(orders)
    }

    /// One of the user's own orders; other users' orders are `NotFound`
    pub async fn get_order(&self, user_id: Uuid, order_id: Uuid) -> Result<OrderView, OrderError> {
        let mut tx = self.store.begin().await?;
        let order = tx.find_order(order_id, Some(user_id)).await?;
        tx.commit().await?;

        order.ok_or(OrderError::NotFound(order_id))
    }

    /// Privileged listing across all users; may be empty
    pub async fn list_orders_by_status(
        &self,
        status: OrderStatus,
        page: Page,
    ) -> Result<Vec<OrderView>, OrderError> {
        let mut tx = self.store.begin().await?;
        let orders = tx.list_orders(OrderFilter::Status(status), page).await?;
        tx.commit().await?;
        Ok(orders)
    }

    /// Move an order to `target`, provided it is currently in `expected`.
    /// Reaching `Cancelled` this way gives the stock back as `cancel` does.
    pub async fn transition(
        &self,
        order_id: Uuid,
        target: OrderStatus,
        expected: OrderStatus,
    ) -> Result<OrderView, OrderError> {
        let mut tx = self.store.begin().await?;
        let mut view = tx
            .find_order(order_id, None)
            .await?
            .ok_or(OrderError::NotFound(order_id))?;

        apply_transition(&mut view.order, target, expected, Utc::now())?;
        self.persist(&mut tx, &view, expected).await?;
        if target == OrderStatus::Cancelled {
            Self::release_items(&mut tx, &view).await?;
        }
        tx.commit().await?;

        self.metrics.record_transition(target.as_str());
        tracing::info!(
            order_id = %order_id,
            from = %expected,
            to = %target,
            payment_status = %view.order.payment_status,
            "Order status changed"
        );
        Ok(view)
    }

    /// Run a named workflow step; its expected status comes from the table
    pub async fn apply(&self, order_id: Uuid, command: StatusCommand) -> Result<OrderView, OrderError> {
        self.transition(order_id, command.target(), pinned_source(command))
            .await
    }

    /// Cancel one of the user's own orders and give its stock back
    pub async fn cancel(&self, user_id: Uuid, order_id: Uuid) -> Result<OrderView, OrderError> {
        let mut tx = self.store.begin().await?;
        let mut view = tx
            .find_order(order_id, Some(user_id))
            .await?
            .ok_or(OrderError::NotFound(order_id))?;

        let previous = view.status();
        apply_cancel(&mut view.order, Utc::now())?;
        self.persist(&mut tx, &view, previous).await?;
        Self::release_items(&mut tx, &view).await?;
        tx.commit().await?;

        self.metrics.record_transition(OrderStatus::Cancelled.as_str());
        tracing::info!(
            order_id = %order_id,
            user_id = %user_id,
            from = %previous,
            released_lines = view.order_items.len(),
            "Order cancelled"
        );
        Ok(view)
    }

    async fn release_items(tx: &mut S::Tx, view: &OrderView) -> Result<(), OrderError> {
        for line in &view.order_items {
            StockLedger::release(tx, line.item.product_id, line.item.quantity).await?;
        }
        Ok(())
    }

    async fn persist(
        &self,
        tx: &mut S::Tx,
        view: &OrderView,
        expected: OrderStatus,
    ) -> Result<(), OrderError> {
        if tx.update_order_state(&view.order, expected).await? {
            return Ok(());
        }

        // Someone else moved the order since we read it
        let actual = tx
            .find_order(view.id(), None)
            .await?
            .map(|current| current.status())
            .ok_or(OrderError::NotFound(view.id()))?;
        tracing::warn!(
            order_id = %view.id(),
            actual = %actual,
            expected = %expected,
            "Concurrent status change detected"
        );
        Err(OrderError::invalid_transition(actual, &[expected]))
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
