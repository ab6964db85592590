// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Each area has its own subdirectory with value objects, errors and the
// service that drives it through a unit of work:
// - inventory - Product stock and the reservation ledger
// - cart      - Per-user cart contents and stock-checked mutations
// - order     - Order aggregate, status workflow and checkout
//
// Nothing in here talks to a database directly; every persistence step goes
// through `crate::store::UnitOfWork`.
//
// ============================================================================

pub mod cart;
pub mod inventory;
pub mod order;
