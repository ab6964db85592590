use uuid::Uuid;

use crate::store::StoreError;

// ============================================================================
// Stock Ledger Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StockError {
    #[error("Insufficient stock for product {0}")]
    Insufficient(Uuid),

    #[error("Invalid stock quantity: {0}")]
    InvalidQuantity(i32),

    #[error(transparent)]
    Store(#[from] StoreError),
}
