// ============================================================================
// Shop Orders - Checkout, Stock Reservation & Order Workflow
// ============================================================================
//
// Layers (leaves first):
// - store/   - Unit of work abstraction + PostgreSQL and in-memory backends
// - domain/  - Inventory ledger, cart rules, order aggregate & workflow
// - api/     - HTTP surface (actix-web) over the domain services
// - metrics/ - Prometheus metrics and scrape endpoint
//
// The binary in main.rs wires these together from `config::Config`.
//
// ============================================================================

pub mod api;
pub mod config;
pub mod domain;
pub mod metrics;
pub mod store;
pub mod utils;
