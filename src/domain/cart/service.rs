use std::sync::Arc;
use uuid::Uuid;

use crate::domain::inventory::Product;
use crate::metrics::Metrics;
use crate::store::{Store, UnitOfWork};
use super::errors::CartError;
use super::value_objects::{CartLine, MAX_LINE_QUANTITY};

// ============================================================================
// Cart Service
// ============================================================================
//
// Every mutation runs in its own unit of work and checks the requested
// quantity against what is available to sell right now. The check is
// advisory: the checkout re-validates through the stock reservation itself.
//
// ============================================================================

pub struct CartService<S: Store> {
    store: Arc<S>,
    metrics: Arc<Metrics>,
}

impl<S: Store> CartService<S> {
    pub fn new(store: Arc<S>, metrics: Arc<Metrics>) -> Self {
        Self { store, metrics }
    }

    /// Lines of the user's cart; empty when the user has no cart yet
    pub async fn get_cart(&self, user_id: Uuid) -> Result<Vec<CartLine>, CartError> {
        let mut tx = self.store.begin().await?;
        let lines = tx.cart_lines(user_id).await?;
        tx.commit().await?;
        Ok(lines)
    }

    /// Add `quantity` units, merging with an existing line for the product
    pub async fn add_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<Vec<CartLine>, CartError> {
        check_quantity(quantity)?;

        let mut tx = self.store.begin().await?;
        let product = tx
            .find_product(product_id)
            .await?
            .ok_or(CartError::ProductNotFound(product_id))?;

        let existing = tx
            .cart_lines(user_id)
            .await?
            .into_iter()
            .find(|line| line.product_id == product_id)
            .map(|line| line.quantity)
            .unwrap_or(0);
        let merged = existing.saturating_add(quantity);
        check_quantity(merged)?;
        check_available(&product, merged)?;

        tx.set_cart_quantity(user_id, product_id, merged).await?;
        let lines = tx.cart_lines(user_id).await?;
        tx.commit().await?;

        self.metrics.record_cart_mutation("add");
        tracing::info!(
            user_id = %user_id,
            product_id = %product_id,
            quantity = merged,
            "Cart line added"
        );
        Ok(lines)
    }

    /// Set an existing line to an absolute quantity; zero removes it
    pub async fn update_quantity(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<Vec<CartLine>, CartError> {
        if quantity == 0 {
            return self.remove_item(user_id, product_id).await;
        }
        check_quantity(quantity)?;

        let mut tx = self.store.begin().await?;
        let line = tx
            .cart_lines(user_id)
            .await?
            .into_iter()
            .find(|line| line.product_id == product_id)
            .ok_or(CartError::ItemNotFound(product_id))?;
        check_available(&line.product, quantity)?;

        tx.set_cart_quantity(user_id, product_id, quantity).await?;
        let lines = tx.cart_lines(user_id).await?;
        tx.commit().await?;

        self.metrics.record_cart_mutation("update");
        tracing::info!(
            user_id = %user_id,
            product_id = %product_id,
            quantity = quantity,
            "Cart line updated"
        );
        Ok(lines)
    }

    pub async fn remove_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<Vec<CartLine>, CartError> {
        let mut tx = self.store.begin().await?;
        if !tx.remove_cart_item(user_id, product_id).await? {
            return Err(CartError::ItemNotFound(product_id));
        }
        let lines = tx.cart_lines(user_id).await?;
        tx.commit().await?;

        self.metrics.record_cart_mutation("remove");
        tracing::info!(user_id = %user_id, product_id = %product_id, "Cart line removed");
        Ok(lines)
    }

    /// Empty the cart. A missing or already empty cart is not an error.
    pub async fn clear(&self, user_id: Uuid) -> Result<(), CartError> {
        let mut tx = self.store.begin().await?;
        let removed = tx.clear_cart(user_id).await?;
        tx.commit().await?;

        self.metrics.record_cart_mutation("clear");
        tracing::info!(user_id = %user_id, removed = removed, "Cart cleared");
        Ok(())
    }
}

fn check_quantity(quantity: i32) -> Result<(), CartError> {
    if (1..=MAX_LINE_QUANTITY).contains(&quantity) {
        Ok(())
    } else {
        Err(CartError::InvalidQuantity(quantity))
    }
}

fn check_available(product: &Product, requested: i32) -> Result<(), CartError> {
    let available = product.available();
    if available <= 0 {
        return Err(CartError::OutOfStock(product.id));
    }
    if requested > available {
        return Err(CartError::ExceedsAvailable { available, requested });
    }
    Ok(())
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use rust_decimal_macros::dec;

    async fn setup(stock: i32) -> (CartService<MemoryStore>, MemoryStore, Uuid) {
        let store = MemoryStore::new();
        let product = Product::new("Coffee Grinder", dec!(45), stock);
        let product_id = product.id;
        store.seed_product(product).await;

        let service = CartService::new(Arc::new(store.clone()), Arc::new(Metrics::new().unwrap()));
        (service, store, product_id)
    }

    #[tokio::test]
    async fn test_add_creates_cart_and_merges_lines() {
        let (service, _store, product_id) = setup(10).await;
        let user = Uuid::new_v4();

        assert!(service.get_cart(user).await.unwrap().is_empty());

        service.add_item(user, product_id, 2).await.unwrap();
        let lines = service.add_item(user, product_id, 3).await.unwrap();

        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 5);
        assert_eq!(lines[0].line_total(), dec!(225));
    }

    #[tokio::test]
    async fn test_add_rejects_quantity_above_availability() {
        let (service, store, product_id) = setup(5).await;
        let user = Uuid::new_v4();
        store.update_product(product_id, |p| p.reserved = 2).await;

        service.add_item(user, product_id, 2).await.unwrap();
        let result = service.add_item(user, product_id, 2).await;

        assert!(matches!(
            result,
            Err(CartError::ExceedsAvailable { available: 3, requested: 4 })
        ));
        assert_eq!(service.get_cart(user).await.unwrap()[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_add_out_of_stock_and_unknown_product() {
        let (service, _store, product_id) = setup(0).await;
        let user = Uuid::new_v4();

        assert!(matches!(
            service.add_item(user, product_id, 1).await,
            Err(CartError::OutOfStock(p)) if p == product_id
        ));

        let missing = Uuid::new_v4();
        assert!(matches!(
            service.add_item(user, missing, 1).await,
            Err(CartError::ProductNotFound(p)) if p == missing
        ));
    }

    #[tokio::test]
    async fn test_add_rejects_invalid_quantities() {
        let (service, _store, product_id) = setup(5).await;
        let user = Uuid::new_v4();

        assert!(matches!(
            service.add_item(user, product_id, 0).await,
            Err(CartError::InvalidQuantity(0))
        ));
        assert!(matches!(
            service.add_item(user, product_id, 1000).await,
            Err(CartError::InvalidQuantity(1000))
        ));
    }

    #[tokio::test]
    async fn test_update_quantity_and_remove_with_zero() {
        let (service, _store, product_id) = setup(10).await;
        let user = Uuid::new_v4();
        service.add_item(user, product_id, 2).await.unwrap();

        let lines = service.update_quantity(user, product_id, 7).await.unwrap();
        assert_eq!(lines[0].quantity, 7);

        assert!(matches!(
            service.update_quantity(user, product_id, 11).await,
            Err(CartError::ExceedsAvailable { available: 10, requested: 11 })
        ));

        let lines = service.update_quantity(user, product_id, 0).await.unwrap();
        assert!(lines.is_empty());
    }

    #[tokio::test]
    async fn test_update_or_remove_missing_line() {
        let (service, _store, product_id) = setup(10).await;
        let user = Uuid::new_v4();

        assert!(matches!(
            service.update_quantity(user, product_id, 1).await,
            Err(CartError::ItemNotFound(p)) if p == product_id
        ));
        assert!(matches!(
            service.remove_item(user, product_id).await,
            Err(CartError::ItemNotFound(p)) if p == product_id
        ));
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let (service, _store, product_id) = setup(10).await;
        let user = Uuid::new_v4();

        service.clear(user).await.unwrap();

        service.add_item(user, product_id, 1).await.unwrap();
        service.clear(user).await.unwrap();
        service.clear(user).await.unwrap();
        assert!(service.get_cart(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_carts_are_per_user() {
        let (service, _store, product_id) = setup(10).await;
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        service.add_item(alice, product_id, 3).await.unwrap();

        assert!(service.get_cart(bob).await.unwrap().is_empty());
        assert_eq!(service.get_cart(alice).await.unwrap()[0].quantity, 3);
    }
}
