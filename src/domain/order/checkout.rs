use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::domain::inventory::StockLedger;
use crate::metrics::Metrics;
use crate::store::{Scope, Store, UnitOfWork};
use super::aggregate::OrderView;
use super::builder::OrderBuilder;
use super::commands::OrderCreateRequest;
use super::errors::OrderError;
use super::value_objects::PaymentMethod;

// ============================================================================
// Checkout Orchestrator
// ============================================================================
//
// Turns the user's cart into an order inside one unit of work:
//
//   cart -> header -> (reserve, snapshot)* -> totals -> address -> clear cart
//
// Cash orders are committed; card payment has no processor behind it yet, so
// card checkouts are rolled back with PaymentUnavailable. Any failure undoes
// every write of the checkout, including stock reservations.
//
// ============================================================================

const CHECKOUT_SAVEPOINT: &str = "checkout";

pub struct CheckoutService<S: Store> {
    store: Arc<S>,
    shipping_price: Decimal,
    metrics: Arc<Metrics>,
}

impl<S: Store> CheckoutService<S> {
    pub fn new(store: Arc<S>, shipping_price: Decimal, metrics: Arc<Metrics>) -> Self {
        Self {
            store,
            shipping_price,
            metrics,
        }
    }

    /// Place an order from the cart of `user_id`.
    ///
    /// With `Scope::Root` the checkout opens and commits its own unit of work.
    /// With `Scope::Nested` it runs inside the caller's, bracketed by a
    /// savepoint; on failure only the checkout's own writes are undone and the
    /// caller's unit of work stays usable.
    pub async fn checkout(
        &self,
        scope: Scope<'_, S::Tx>,
        user_id: Uuid,
        request: &OrderCreateRequest,
    ) -> Result<OrderView, OrderError> {
        let started = Instant::now();

        let result = match scope {
            Scope::Root => self.checkout_root(user_id, request).await,
            Scope::Nested(tx) => self.checkout_nested(tx, user_id, request).await,
        };

        let outcome = match &result {
            Ok(_) => "created",
            Err(e) => e.code(),
        };
        self.metrics.record_checkout(
            outcome,
            request.payment_method.as_str(),
            started.elapsed().as_secs_f64(),
        );

        match &result {
            Ok(view) => tracing::info!(
                user_id = %user_id,
                order_id = %view.id(),
                total = %view.order.total,
                items = view.order_items.len(),
                "Order placed"
            ),
            Err(e) if e.is_internal() => {
                tracing::error!(user_id = %user_id, error = %e, "Checkout failed")
            }
            Err(e) => tracing::info!(user_id = %user_id, reason = e.code(), "Checkout rejected"),
        }

        result
    }

    async fn checkout_root(
        &self,
        user_id: Uuid,
        request: &OrderCreateRequest,
    ) -> Result<OrderView, OrderError> {
        let mut tx = self.store.begin().await?;

        match self.place_order(&mut tx, user_id, request).await {
            Ok(view) => {
                tx.commit().await?;
                Ok(view)
            }
            Err(e) => {
                if let Err(rollback_error) = tx.rollback().await {
                    tracing::error!(error = %rollback_error, "Checkout rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn checkout_nested(
        &self,
        tx: &mut S::Tx,
        user_id: Uuid,
        request: &OrderCreateRequest,
    ) -> Result<OrderView, OrderError> {
        tx.savepoint(CHECKOUT_SAVEPOINT).await?;

        match self.place_order(tx, user_id, request).await {
            Ok(view) => {
                tx.release_savepoint(CHECKOUT_SAVEPOINT).await?;
                Ok(view)
            }
            Err(e) => {
                tx.rollback_to_savepoint(CHECKOUT_SAVEPOINT).await?;
                tx.release_savepoint(CHECKOUT_SAVEPOINT).await?;
                Err(e)
            }
        }
    }

    /// Every write of a checkout, on the given unit of work. Does not commit.
    async fn place_order(
        &self,
        tx: &mut S::Tx,
        user_id: Uuid,
        request: &OrderCreateRequest,
    ) -> Result<OrderView, OrderError> {
        let lines = tx.cart_lines(user_id).await?;
        if lines.is_empty() {
            return Err(OrderError::EmptyCart);
        }

        let mut builder = OrderBuilder::new(user_id, request, self.shipping_price, Utc::now())?;
        let order_id = builder.header().id;
        tx.insert_order(builder.header()).await?;

        for line in &lines {
            if let Err(e) = StockLedger::reserve(tx, line.product_id, line.quantity).await {
                let e = OrderError::from(e);
                if let OrderError::InsufficientStock { product_id } = &e {
                    self.metrics.record_reservation_failure(&product_id.to_string());
                }
                return Err(e);
            }

            let item = builder.add_line(&line.product, line.quantity)?;
            tx.insert_order_item(item).await?;
        }

        tx.update_order_totals(order_id, builder.subtotal(), builder.total(), Utc::now())
            .await?;
        tx.insert_delivery_address(builder.delivery_address()).await?;

        let cleared = tx.clear_cart(user_id).await?;
        tracing::debug!(
            order_id = %order_id,
            subtotal = %builder.subtotal(),
            cleared = cleared,
            "Order rows written"
        );

        match request.payment_method {
            PaymentMethod::Cash => tx
                .find_order(order_id, Some(user_id))
                .await?
                .ok_or(OrderError::NotFound(order_id)),
            PaymentMethod::Card => Err(OrderError::PaymentUnavailable(PaymentMethod::Card)),
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::inventory::Product;
    use crate::domain::order::{DeliveryAddressInput, OrderStatus, PaymentStatus};
    use crate::store::{FailPoint, MemoryStore};
    use rust_decimal_macros::dec;

    struct Fixture {
        store: MemoryStore,
        service: CheckoutService<MemoryStore>,
        product_a: Uuid,
        product_b: Uuid,
    }

    async fn fixture(stock_a: i32, stock_b: i32) -> Fixture {
        let store = MemoryStore::new();
        let a = Product::new("Product A", dec!(10), stock_a);
        let b = Product::new("Product B", dec!(20), stock_b);
        let (product_a, product_b) = (a.id, b.id);
        store.seed_product(a).await;
        store.seed_product(b).await;

        let service = CheckoutService::new(
            Arc::new(store.clone()),
            dec!(200),
            Arc::new(Metrics::new().unwrap()),
        );

        Fixture {
            store,
            service,
            product_a,
            product_b,
        }
    }

    async fn fill_cart(store: &MemoryStore, user_id: Uuid, lines: &[(Uuid, i32)]) {
        let mut tx = store.begin().await.unwrap();
        for (product_id, quantity) in lines {
            tx.set_cart_quantity(user_id, *product_id, *quantity).await.unwrap();
        }
        tx.commit().await.unwrap();
    }

    async fn cart_len(store: &MemoryStore, user_id: Uuid) -> usize {
        let mut tx = store.begin().await.unwrap();
        tx.cart_lines(user_id).await.unwrap().len()
    }

    fn request(method: PaymentMethod) -> OrderCreateRequest {
        OrderCreateRequest {
            payment_method: method,
            delivery_address: DeliveryAddressInput {
                city: "Springfield".to_string(),
                postcode: Some(1500),
                region: Some("Oregon".to_string()),
                country: "Freedonia".to_string(),
                phone: Some("15551234567".to_string()),
            },
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_cash_checkout_computes_totals() {
        let f = fixture(10, 10).await;
        let user = Uuid::new_v4();
        fill_cart(&f.store, user, &[(f.product_a, 4), (f.product_b, 2)]).await;

        let view = f
            .service
            .checkout(Scope::Root, user, &request(PaymentMethod::Cash))
            .await
            .unwrap();

        assert_eq!(view.order.subtotal, dec!(80));
        assert_eq!(view.order.shipping_price, dec!(200));
        assert_eq!(view.order.total, dec!(280));
        assert_eq!(view.status(), OrderStatus::Pending);
        assert_eq!(view.order.payment_status, PaymentStatus::Pending);
        assert_eq!(view.order_items.len(), 2);
        assert_eq!(view.delivery_address.as_ref().unwrap().city, "Springfield");

        assert_eq!(f.store.product(f.product_a).await.unwrap().reserved, 4);
        assert_eq!(f.store.product(f.product_b).await.unwrap().reserved, 2);
        assert_eq!(cart_len(&f.store, user).await, 0);
    }

    #[tokio::test]
    async fn test_empty_cart_creates_nothing() {
        let f = fixture(10, 10).await;
        let user = Uuid::new_v4();

        let result = f
            .service
            .checkout(Scope::Root, user, &request(PaymentMethod::Cash))
            .await;

        assert!(matches!(result, Err(OrderError::EmptyCart)));
        assert_eq!(f.store.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_insufficient_stock_undoes_earlier_reservations() {
        // A sorts before B, so A is reserved first and must be given back
        let f = fixture(10, 1).await;
        let user = Uuid::new_v4();
        fill_cart(&f.store, user, &[(f.product_a, 4), (f.product_b, 2)]).await;

        let result = f
            .service
            .checkout(Scope::Root, user, &request(PaymentMethod::Cash))
            .await;

        assert!(matches!(
            result,
            Err(OrderError::InsufficientStock { product_id }) if product_id == f.product_b
        ));
        assert_eq!(f.store.product(f.product_a).await.unwrap().reserved, 0);
        assert_eq!(f.store.product(f.product_b).await.unwrap().reserved, 0);
        assert_eq!(f.store.order_count().await, 0);
        assert_eq!(cart_len(&f.store, user).await, 2);
    }

    #[tokio::test]
    async fn test_card_payment_rolls_back_everything() {
        let f = fixture(10, 10).await;
        let user = Uuid::new_v4();
        fill_cart(&f.store, user, &[(f.product_a, 1)]).await;

        let result = f
            .service
            .checkout(Scope::Root, user, &request(PaymentMethod::Card))
            .await;

        assert!(matches!(result, Err(OrderError::PaymentUnavailable(PaymentMethod::Card))));
        assert_eq!(f.store.order_count().await, 0);
        assert_eq!(f.store.order_item_count().await, 0);
        assert_eq!(f.store.address_count().await, 0);
        assert_eq!(f.store.product(f.product_a).await.unwrap().reserved, 0);
        assert_eq!(cart_len(&f.store, user).await, 1);
    }

    #[tokio::test]
    async fn test_store_failure_at_any_step_is_atomic() {
        let points = [
            FailPoint::InsertOrder,
            FailPoint::InsertOrderItem,
            FailPoint::UpdateOrderTotals,
            FailPoint::InsertDeliveryAddress,
            FailPoint::ClearCart,
            FailPoint::Commit,
        ];

        for point in points {
            let f = fixture(10, 10).await;
            let user = Uuid::new_v4();
            fill_cart(&f.store, user, &[(f.product_a, 3), (f.product_b, 1)]).await;
            f.store.fail_at(point);

            let result = f
                .service
                .checkout(Scope::Root, user, &request(PaymentMethod::Cash))
                .await;

            assert!(
                matches!(&result, Err(e) if e.is_internal() && e.code() == "internal_error"),
                "expected internal error at {:?}",
                point
            );
            assert_eq!(f.store.order_count().await, 0, "order left behind at {:?}", point);
            assert_eq!(f.store.order_item_count().await, 0);
            assert_eq!(f.store.address_count().await, 0);
            assert_eq!(f.store.product(f.product_a).await.unwrap().reserved, 0);
            assert_eq!(cart_len(&f.store, user).await, 2);
        }
    }

    // Memory units of work hold the state lock, so these two run one after the
    // other. The interleaved race against row locks is in store::postgres.
    #[tokio::test]
    async fn test_competing_checkouts_cannot_oversell() {
        let f = fixture(5, 10).await;
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        fill_cart(&f.store, alice, &[(f.product_a, 3)]).await;
        fill_cart(&f.store, bob, &[(f.product_a, 3)]).await;

        let cash = request(PaymentMethod::Cash);
        let (first, second) = futures_util::future::join(
            f.service.checkout(Scope::Root, alice, &cash),
            f.service.checkout(Scope::Root, bob, &cash),
        )
        .await;

        let successes = [&first, &second].iter().filter(|r| r.is_ok()).count();
        let rejected = [&first, &second]
            .iter()
            .filter(|r| matches!(r, Err(OrderError::InsufficientStock { .. })))
            .count();
        assert_eq!(successes, 1);
        assert_eq!(rejected, 1);
        assert_eq!(f.store.product(f.product_a).await.unwrap().reserved, 3);
        assert_eq!(f.store.order_count().await, 1);
    }

    #[tokio::test]
    async fn test_items_keep_checkout_price() {
        let f = fixture(10, 10).await;
        let user = Uuid::new_v4();
        fill_cart(&f.store, user, &[(f.product_a, 2)]).await;

        let view = f
            .service
            .checkout(Scope::Root, user, &request(PaymentMethod::Cash))
            .await
            .unwrap();

        f.store
            .update_product(f.product_a, |p| {
                p.price = dec!(99);
                p.title = "Renamed".to_string();
            })
            .await;

        let mut tx = f.store.begin().await.unwrap();
        let reloaded = tx.find_order(view.id(), Some(user)).await.unwrap().unwrap();
        let line = &reloaded.order_items[0];
        assert_eq!(line.item.product_price, dec!(10));
        assert_eq!(line.item.product_title, "Product A");
        assert_eq!(line.total_price, dec!(20));
        assert_eq!(line.product.as_ref().unwrap().price, dec!(99));
        assert_eq!(reloaded.order.total, dec!(220));
    }

    #[tokio::test]
    async fn test_nested_checkout_failure_keeps_outer_work() {
        let f = fixture(10, 10).await;
        let user = Uuid::new_v4();
        fill_cart(&f.store, user, &[(f.product_a, 2)]).await;

        let mut outer = f.store.begin().await.unwrap();
        outer.reserve_stock(f.product_b, 5).await.unwrap();

        let result = f
            .service
            .checkout(Scope::Nested(&mut outer), user, &request(PaymentMethod::Card))
            .await;
        assert!(matches!(result, Err(OrderError::PaymentUnavailable(_))));

        // The outer unit of work still sees its own write and none of the checkout's
        assert_eq!(outer.find_product(f.product_b).await.unwrap().unwrap().reserved, 5);
        assert_eq!(outer.find_product(f.product_a).await.unwrap().unwrap().reserved, 0);
        assert_eq!(outer.cart_lines(user).await.unwrap().len(), 1);
        outer.commit().await.unwrap();

        assert_eq!(f.store.product(f.product_b).await.unwrap().reserved, 5);
        assert_eq!(f.store.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_nested_checkout_commits_with_outer() {
        let f = fixture(10, 10).await;
        let user = Uuid::new_v4();
        fill_cart(&f.store, user, &[(f.product_a, 2)]).await;

        let mut outer = f.store.begin().await.unwrap();
        let view = f
            .service
            .checkout(Scope::Nested(&mut outer), user, &request(PaymentMethod::Cash))
            .await
            .unwrap();
        assert_eq!(view.order.total, dec!(220));

        // Nothing is visible until the outer unit of work commits
        outer.rollback().await.unwrap();
        assert_eq!(f.store.order_count().await, 0);

        let mut outer = f.store.begin().await.unwrap();
        f.service
            .checkout(Scope::Nested(&mut outer), user, &request(PaymentMethod::Cash))
            .await
            .unwrap();
        outer.commit().await.unwrap();
        assert_eq!(f.store.order_count().await, 1);
    }

    #[tokio::test]
    async fn test_invalid_address_is_rejected_before_writing() {
        let f = fixture(10, 10).await;
        let user = Uuid::new_v4();
        fill_cart(&f.store, user, &[(f.product_a, 1)]).await;

        let mut bad = request(PaymentMethod::Cash);
        bad.delivery_address.postcode = Some(9999);

        let result = f.service.checkout(Scope::Root, user, &bad).await;
        assert!(matches!(result, Err(OrderError::Validation(_))));
        assert_eq!(f.store.order_count().await, 0);
    }
}
