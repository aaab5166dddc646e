use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use numguard_worker::config::{ConfigHandle, EngineConfig};
use numguard_worker::engine::{Engine, EngineParts, EventServices};
use numguard_worker::postgres::PgStore;
use numguard_worker::shutdown::shutdown_signal;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "numguard_worker=debug".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // --- Configuration ---
    let config = ConfigHandle::new(EngineConfig::from_env());
    let snapshot = config.snapshot();
    tracing::info!(
        stat_api = %snapshot.stat_base_url,
        vendor_sync = snapshot.vendor_base_url.is_some(),
        concurrency = snapshot.worker_concurrency,
        "Loaded engine configuration"
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = numguard_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    numguard_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    numguard_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Event bus ---
    let event_bus = Arc::new(numguard_events::EventBus::default());
    let event_services = EventServices::spawn(pool.clone(), &event_bus);

    // --- Engine ---
    let parts = EngineParts::with_http_clients(
        &snapshot,
        Arc::new(PgStore::new(pool.clone())),
        Arc::clone(&event_bus),
    )
    .expect("Failed to build stat/vendor clients");
    let engine = Engine::start(config, parts);

    shutdown_signal().await;

    // --- Shutdown ---
    let Engine { supervisor, manual } = engine;
    drop(manual);
    supervisor.shutdown().await;

    drop(event_bus);
    event_services.drain(Duration::from_secs(5)).await;
    pool.close().await;

    tracing::info!("Graceful shutdown complete");
}
