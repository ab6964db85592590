use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Inventory Value Objects
// ============================================================================

/// A stock-bearing catalog entry.
///
/// `reserved` counts units held against open orders; it never exceeds
/// `stock_quantity` and is only changed through [`super::StockLedger`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: Uuid,
    pub title: String,
    pub price: Decimal,
    pub category_id: Option<Uuid>,
    pub stock_quantity: i32,
    pub reserved: i32,
}

impl Product {
    pub fn new(title: impl Into<String>, price: Decimal, stock_quantity: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            price: price.round_dp(2),
            category_id: None,
            stock_quantity,
            reserved: 0,
        }
    }

    /// Units that can still be sold
    pub fn available(&self) -> i32 {
        self.stock_quantity - self.reserved
    }

    pub fn summary(&self) -> ProductSummary {
        ProductSummary {
            id: self.id,
            title: self.title.clone(),
            price: self.price,
            category_id: self.category_id,
        }
    }
}

/// Live product data attached to order lines when an order is read back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub id: Uuid,
    pub title: String,
    pub price: Decimal,
    pub category_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_available_subtracts_reserved() {
        let mut product = Product::new("Kettle", dec!(35.50), 10);
        product.reserved = 4;
        assert_eq!(product.available(), 6);
    }

    #[test]
    fn test_new_rounds_price_to_cents() {
        let product = Product::new("Toaster", dec!(19.999), 1);
        assert_eq!(product.price, dec!(20.00));
        assert_eq!(product.reserved, 0);
    }
}
