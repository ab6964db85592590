use serde::{Deserialize, Serialize};

use super::value_objects::{check_len, DeliveryAddressInput, OrderStatus, PaymentMethod};

// ============================================================================
// Order Commands - Represent user intent
// ============================================================================

/// Checkout request: the cart supplies the lines, this supplies the rest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreateRequest {
    pub payment_method: PaymentMethod,
    pub delivery_address: DeliveryAddressInput,
    #[serde(default)]
    pub notes: Option<String>,
}

impl OrderCreateRequest {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(notes) = &self.notes {
            check_len("notes", notes, 4, 50)?;
        }
        self.delivery_address.validate()
    }
}

/// Privileged workflow steps. Each one targets a single status and is only
/// legal from the status the transition table lists for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCommand {
    Confirm,
    StartProcessing,
    Ship,
    Deliver,
    Refund,
}

impl StatusCommand {
    pub fn target(&self) -> OrderStatus {
        match self {
            StatusCommand::Confirm => OrderStatus::Confirmed,
            StatusCommand::StartProcessing => OrderStatus::Processing,
            StatusCommand::Ship => OrderStatus::Shipped,
            StatusCommand::Deliver => OrderStatus::Delivered,
            StatusCommand::Refund => OrderStatus::Refunded,
        }
    }
}
