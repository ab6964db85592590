// ============================================================================
// Order Domain - Checkout & Order Workflow
// ============================================================================
//
// This module contains ALL Order-specific code:
// - Value objects (OrderStatus, PaymentStatus, PaymentMethod, addresses)
// - Commands (OrderCreateRequest, StatusCommand)
// - Errors (OrderError enum)
// - Aggregate (Order, OrderItem, OrderView)
// - Builder (assembles the checkout write set)
// - State machine (transition table and side effects)
// - Checkout (cart -> order orchestration in one unit of work)
// - Service (order queries and status transitions)
//
// ============================================================================

pub mod aggregate;
pub mod builder;
pub mod checkout;
pub mod commands;
pub mod errors;
pub mod service;
pub mod state_machine;
pub mod value_objects;

// Re-export for convenience
pub use aggregate::*;
pub use builder::*;
pub use checkout::*;
pub use commands::*;
pub use errors::*;
pub use service::*;
pub use value_objects::*;
