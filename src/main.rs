use actix_web::{web, App, HttpServer};
use clap::Parser;
use prometheus::Registry;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use shop_orders::api::{self, AppState};
use shop_orders::config::Config;
use shop_orders::domain::inventory::Product;
use shop_orders::metrics::{start_metrics_server, Metrics};
use shop_orders::store::{MemoryStore, PgStore, Store};
use shop_orders::utils::RetryConfig;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,shop_orders=debug"))
        )
        .init();

    let config = Config::parse();
    tracing::info!("🚀 Starting shop orders service");

    let metrics = Arc::new(Metrics::new()?);
    let registry = Arc::new(metrics.registry().clone());

    match &config.database_url {
        Some(url) => {
            let retry = RetryConfig::with_max_attempts(config.db_connect_attempts);
            let store = PgStore::connect(url, config.db_max_connections, retry).await?;
            store.migrate().await?;
            tracing::info!("✅ Connected to PostgreSQL");

            serve(store, &config, metrics, registry).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, running on the in-memory store with demo products");
            let store = MemoryStore::new();
            seed_demo_catalog(&store).await;

            serve(store, &config, metrics, registry).await
        }
    }
}

/// Run the API and the metrics endpoint until either stops
async fn serve<S: Store>(
    store: S,
    config: &Config,
    metrics: Arc<Metrics>,
    registry: Arc<Registry>,
) -> anyhow::Result<()> {
    let state = web::Data::new(AppState::new(
        Arc::new(store),
        config.shipping_price(),
        metrics,
    ));

    tracing::info!(
        addr = %config.http_addr,
        shipping_price = %config.shipping_price(),
        "🌐 Starting HTTP API"
    );
    let api_server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(api::configure::<S>)
    })
    .bind(config.http_addr.as_str())?
    .run();

    let metrics_server = start_metrics_server(registry, config.metrics_port);

    tokio::try_join!(api_server, metrics_server)?;

    tracing::info!("👋 Shutdown complete");
    Ok(())
}

async fn seed_demo_catalog(store: &MemoryStore) {
    let catalog = [
        ("Espresso Machine", Decimal::new(24999, 2), 15),
        ("Coffee Grinder", Decimal::new(4500, 2), 40),
        ("Milk Frother", Decimal::new(1999, 2), 0),
        ("Ceramic Mug", Decimal::new(850, 2), 200),
    ];

    for (title, price, stock) in catalog {
        let product = Product::new(title, price, stock);
        tracing::info!(
            product_id = %product.id,
            title = title,
            price = %product.price,
            stock = stock,
            "Seeded demo product"
        );
        store.seed_product(product).await;
    }
}
