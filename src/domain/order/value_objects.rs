use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Order Value Objects
// ============================================================================
//
// Order progress and payment state are two independent axes. Which order
// status may follow which is decided by `state_machine::TRANSITIONS`, not by
// these enums.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "order_status", rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Refunded,
    PartiallyRefunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::PartiallyRefunded => "partially_refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "payment_method", rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    Cash,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Cash => "cash",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an order ships to, as submitted by the customer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryAddressInput {
    pub city: String,
    #[serde(default)]
    pub postcode: Option<i32>,
    #[serde(default)]
    pub region: Option<String>,
    pub country: String,
    #[serde(default)]
    pub phone: Option<String>,
}

impl DeliveryAddressInput {
    /// Field rules applied before anything is written
    pub fn validate(&self) -> Result<(), String> {
        check_len("city", &self.city, 4, 50)?;
        check_len("country", &self.country, 4, 50)?;

        if let Some(region) = &self.region {
            check_len("region", region, 4, 50)?;
        }
        if let Some(phone) = &self.phone {
            check_len("phone", phone, 11, 12)?;
        }
        if let Some(postcode) = self.postcode {
            if !(1000..=4000).contains(&postcode) {
                return Err(format!("postcode must be between 1000 and 4000, got {}", postcode));
            }
        }

        Ok(())
    }
}

/// Delivery address row owned by exactly one order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeliveryAddress {
    pub id: Uuid,
    pub order_id: Uuid,
    pub city: String,
    pub postcode: Option<i32>,
    pub region: Option<String>,
    pub country: String,
    pub phone: Option<String>,
}

impl DeliveryAddress {
    pub fn for_order(order_id: Uuid, input: &DeliveryAddressInput) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            city: input.city.trim().to_string(),
            postcode: input.postcode,
            region: input.region.as_ref().map(|r| r.trim().to_string()),
            country: input.country.trim().to_string(),
            phone: input.phone.as_ref().map(|p| p.trim().to_string()),
        }
    }
}

pub(crate) fn check_len(field: &str, value: &str, min: usize, max: usize) -> Result<(), String> {
    let len = value.trim().chars().count();
    if len < min || len > max {
        return Err(format!(
            "{} must be between {} and {} characters, got {}",
            field, min, max, len
        ));
    }
    Ok(())
}

// ============================================================================
// Unit Tests
// ============================================================================
