use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use numguard_api::config::ServerConfig;
use numguard_api::router::build_app_router;
use numguard_api::state::AppState;
use numguard_worker::config::{ConfigHandle, EngineConfig};
use numguard_worker::engine::{Engine, EngineParts, EventServices};
use numguard_worker::postgres::PgStore;
use numguard_worker::shutdown::shutdown_signal;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "numguard_api=debug,numguard_worker=debug,tower_http=debug".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");
    let engine_config = ConfigHandle::new(EngineConfig::from_env());

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
        &engine_config.snapshot(),
        Arc::new(PgStore::new(pool.clone())),
        Arc::clone(&event_bus),
    )
    .expect("Failed to build stat/vendor clients");
    let Engine { supervisor, manual } = Engine::start(engine_config, parts);

    // --- App state ---
    let state = AppState {
        pool: pool.clone(),
        config: Arc::new(config.clone()),
        manual,
    };
    let app = build_app_router(state);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, stopping engine");

    // The router (and with it every manual action sender) is gone by now.
    if !supervisor.shutdown().await {
        tracing::warn!("Engine tasks did not stop within the grace period");
    }

    drop(event_bus);
    event_services
        .drain(Duration::from_secs(config.shutdown_timeout_secs))
        .await;
    pool.close().await;

    tracing::info!("Graceful shutdown complete");
}
