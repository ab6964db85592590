use uuid::Uuid;

use crate::domain::inventory::StockError;
use crate::store::StoreError;
use super::value_objects::{OrderStatus, PaymentMethod};

// ============================================================================
// Order Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Product {product_id} is out of stock")]
    InsufficientStock { product_id: Uuid },

    #[error("Order is {actual}, expected {}", list_statuses(.expected))]
    InvalidTransition {
        actual: OrderStatus,
        expected: Vec<OrderStatus>,
    },

    #[error("Payment method {0} is not available yet")]
    PaymentUnavailable(PaymentMethod),

    #[error("Order not found: {0}")]
    NotFound(Uuid),

    #[error("No orders found")]
    NoOrders,

    #[error("Invalid order data: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl OrderError {
    pub fn invalid_transition(actual: OrderStatus, expected: &[OrderStatus]) -> Self {
        OrderError::InvalidTransition {
            actual,
            expected: expected.to_vec(),
        }
    }

    /// True for failures the caller did not cause
    pub fn is_internal(&self) -> bool {
        matches!(self, OrderError::Store(_) | OrderError::PaymentUnavailable(_))
    }

    /// Stable machine-readable name, used in responses and metric labels
    pub fn code(&self) -> &'static str {
        match self {
            OrderError::EmptyCart => "empty_cart",
            OrderError::InsufficientStock { .. } => "insufficient_stock",
            OrderError::InvalidTransition { .. } => "invalid_transition",
            OrderError::PaymentUnavailable(_) => "payment_unavailable",
            OrderError::NotFound(_) => "not_found",
            OrderError::NoOrders => "no_orders",
            OrderError::Validation(_) => "validation_error",
            OrderError::Store(_) => "internal_error",
        }
    }
}

impl From<StockError> for OrderError {
    fn from(error: StockError) -> Self {
        match error {
            StockError::Insufficient(product_id) => OrderError::InsufficientStock { product_id },
            StockError::InvalidQuantity(quantity) => {
                OrderError::Validation(format!("invalid item quantity: {}", quantity))
            }
            StockError::Store(e) => OrderError::Store(e),
        }
    }
}

fn list_statuses(statuses: &[OrderStatus]) -> String {
    match statuses {
        [] => "no status".to_string(),
        [single] => single.to_string(),
        many => {
            let names: Vec<&str> = many.iter().map(OrderStatus::as_str).collect();
            format!("one of {}", names.join(", "))
        }
    }
}
