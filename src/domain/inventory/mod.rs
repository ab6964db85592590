// ============================================================================
// Inventory Domain - Product Stock & Reservations
// ============================================================================
//
// - Value objects (Product, ProductSummary)
// - Errors (StockError)
// - Ledger (StockLedger - the only writer of `Product::reserved`)
//
// ============================================================================

pub mod errors;
pub mod ledger;
pub mod value_objects;

pub use errors::*;
pub use ledger::*;
pub use value_objects::*;
