// ============================================================================
// Cart Domain - Per-User Cart Contents
// ============================================================================
//
// - Value objects (CartLine, AddCartItem, UpdateCartItem)
// - Errors (CartError)
// - Service (CartService - reads and stock-checked mutations)
//
// The checkout reads carts through the same unit of work it writes orders
// with, so these types are shared with `domain::order::checkout`.
//
// ============================================================================

pub mod errors;
pub mod service;
pub mod value_objects;

pub use errors::*;
pub use service::*;
pub use value_objects::*;
