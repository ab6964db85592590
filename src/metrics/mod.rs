// Private module declaration
mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

// Re-export for public API
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// - Checkouts by outcome and their duration
// - Stock reservation rejections
// - Order status transitions by target status
// - Cart mutations by operation
//
// All metrics are registered with one Registry scraped via /metrics
// ============================================================================

/// Central metrics registry for the entire application
pub struct Metrics {
    registry: Registry,

    // Checkout Metrics
    pub checkouts_total: IntCounterVec,
    pub checkout_duration: HistogramVec,
    pub stock_reservation_failures: IntCounterVec,

    // Workflow Metrics
    pub order_transitions: IntCounterVec,

    // Cart Metrics
    pub cart_mutations: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        // Checkout Metrics
        let checkouts_total = IntCounterVec::new(
            Opts::new("checkouts_total", "Checkout attempts by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(checkouts_total.clone()))?;

        let checkout_duration = HistogramVec::new(
            HistogramOpts::new("checkout_duration_seconds", "Checkout duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["payment_method"],
        )?;
        registry.register(Box::new(checkout_duration.clone()))?;

        let stock_reservation_failures = IntCounterVec::new(
            Opts::new(
                "stock_reservation_failures_total",
                "Checkouts aborted because a product ran out of stock",
            ),
            &["product_id"],
        )?;
        registry.register(Box::new(stock_reservation_failures.clone()))?;

        // Workflow Metrics
        let order_transitions = IntCounterVec::new(
            Opts::new("order_transitions_total", "Order status transitions by target status"),
            &["target"],
        )?;
        registry.register(Box::new(order_transitions.clone()))?;

        // Cart Metrics
        let cart_mutations = IntCounterVec::new(
            Opts::new("cart_mutations_total", "Cart mutations by operation"),
            &["operation"],
        )?;
        registry.register(Box::new(cart_mutations.clone()))?;

        Ok(Self {
            registry,
            checkouts_total,
            checkout_duration,
            stock_reservation_failures,
            order_transitions,
            cart_mutations,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Helper to record a finished checkout
    pub fn record_checkout(&self, outcome: &str, payment_method: &str, duration_secs: f64) {
        self.checkouts_total.with_label_values(&[outcome]).inc();
        self.checkout_duration
            .with_label_values(&[payment_method])
            .observe(duration_secs);
    }

    pub fn record_reservation_failure(&self, product_id: &str) {
        self.stock_reservation_failures.with_label_values(&[product_id]).inc();
    }

    pub fn record_transition(&self, target: &str) {
        self.order_transitions.with_label_values(&[target]).inc();
    }

    pub fn record_cart_mutation(&self, operation: &str) {
        self.cart_mutations.with_label_values(&[operation]).inc();
    }
}
