use uuid::Uuid;

use crate::store::UnitOfWork;
use super::errors::StockError;

// ============================================================================
// Stock Ledger
// ============================================================================
//
// Reservation is a single conditional update evaluated by the store
// ("reserved += n WHERE stock_quantity - reserved >= n"), never a
// read-check-write in application code. Two checkouts racing for the same
// product therefore cannot both pass the availability check.
//
// ============================================================================

pub struct StockLedger;

impl StockLedger {
    /// Hold `quantity` units of a product against an order.
    ///
    /// Leaves the product untouched and returns [`StockError::Insufficient`]
    /// when fewer than `quantity` units are available or the product does
    /// not exist.
    pub async fn reserve<U: UnitOfWork>(
        uow: &mut U,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), StockError> {
        if quantity <= 0 {
            return Err(StockError::InvalidQuantity(quantity));
        }

        if !uow.reserve_stock(product_id, quantity).await? {
            tracing::warn!(
                product_id = %product_id,
                quantity = quantity,
                "Stock reservation rejected"
            );
            return Err(StockError::Insufficient(product_id));
        }

        tracing::debug!(product_id = %product_id, quantity = quantity, "Reserved stock");
        Ok(())
    }

    /// Give back previously reserved units. `reserved` never drops below zero.
    pub async fn release<U: UnitOfWork>(
        uow: &mut U,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), StockError> {
        if quantity <= 0 {
            return Err(StockError::InvalidQuantity(quantity));
        }

        uow.release_stock(product_id, quantity).await?;

        tracing::debug!(product_id = %product_id, quantity = quantity, "Released stock");
        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
