use anyhow::{Context, Result};
use area::config::load_from_env;
use area::session::{JwtSessionIssuer, SessionIssuer};
use area::store::Stores;
use area_engine::adapters::default_adapters;
use area_engine::api::{create_router, ApiState};
use area_engine::areas::AreaService;
use area_engine::dispatch::{DispatchContext, DispatchEngine};
use area_engine::oauth::{run_state_cleanup, EnvClients, StateManager, TokenLifecycle};
use area_engine::registry::ServiceRegistry;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "area_engine=info,area=info".into()),
        )
        .init();

    info!("AREA engine starting...");

    let config = load_from_env().context("Failed to load configuration")?;

    let encryption_key = std::env::var("AREA_ENCRYPTION_KEY")
        .context("AREA_ENCRYPTION_KEY is required (base64-encoded 32-byte key)")?;
    let jwt_secret =
        std::env::var("AREA_JWT_SECRET").context("AREA_JWT_SECRET is required")?;

    info!(
        database = %config.database.path,
        callback_base_url = %config.oauth.callback_base_url,
        api_port = config.api.port,
        "Configuration loaded"
    );

    let stores = Stores::open(&config.database.path, &encryption_key)
        .context("Failed to open stores")?;
    info!("Stores initialized");

    let registry = Arc::new(ServiceRegistry::with_adapters(default_adapters())?);
    registry.seed(&stores.catalog)?;
    info!(services = registry.list_services().len(), "Service catalog seeded");

    let sessions: Arc<dyn SessionIssuer> = Arc::new(JwtSessionIssuer::new(&jwt_secret));
    let states = StateManager::new(config.oauth.state_expiry_seconds);
    let tokens = Arc::new(TokenLifecycle::new(
        registry.clone(),
        stores.users.clone(),
        stores.credentials.clone(),
        sessions.clone(),
        Arc::new(EnvClients),
        states.clone(),
        &config.oauth.callback_base_url,
        chrono::Duration::seconds(config.dispatch.refresh_threshold_seconds),
    ));

    let engine = Arc::new(DispatchEngine::new(DispatchContext {
        areas: stores.areas.clone(),
        results: stores.results.clone(),
        catalog: stores.catalog.clone(),
        registry: registry.clone(),
        tokens: tokens.clone(),
        failure_alert_threshold: config.dispatch.failure_alert_threshold,
    }));
    let started = engine.start()?;
    info!(workers = started, "Dispatch engine running");

    let cleanup_task = tokio::spawn(run_state_cleanup(
        states,
        config.oauth.state_cleanup_interval_seconds,
    ));

    let areas = Arc::new(AreaService::new(
        stores.areas.clone(),
        stores.results.clone(),
        stores.catalog.clone(),
        stores.credentials.clone(),
        registry,
        engine.clone(),
    ));

    let app = create_router(ApiState {
        areas,
        tokens,
        sessions,
    });

    let addr = format!("0.0.0.0:{}", config.api.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(addr = %addr, "API server listening");

    let server_task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "API server error");
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    server_task.abort();
    cleanup_task.abort();
    engine.shutdown().await;

    info!("AREA engine stopped");
    Ok(())
}
