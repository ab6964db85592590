use uuid::Uuid;

use crate::store::StoreError;

// ============================================================================
// Cart Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CartError {
    #[error("Product not found: {0}")]
    ProductNotFound(Uuid),

    #[error("Product {0} is out of stock")]
    OutOfStock(Uuid),

    #[error("Requested quantity {requested} exceeds available {available}")]
    ExceedsAvailable { available: i32, requested: i32 },

    #[error("Product {0} is not in the cart")]
    ItemNotFound(Uuid),

    #[error("Invalid item quantity: {0}")]
    InvalidQuantity(i32),

    #[error(transparent)]
    Store(#[from] StoreError),
}
