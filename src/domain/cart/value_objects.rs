use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::inventory::Product;

// ============================================================================
// Cart Value Objects
// ============================================================================

/// Largest quantity a single cart line may hold
pub const MAX_LINE_QUANTITY: i32 = 999;

/// One cart line together with the product as it is right now
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: Uuid,
    pub quantity: i32,
    pub product: Product,
}

impl CartLine {
    pub fn line_total(&self) -> Decimal {
        (self.product.price * Decimal::from(self.quantity)).round_dp(2)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddCartItem {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateCartItem {
    /// Absolute quantity; zero removes the line
    pub quantity: i32,
}
