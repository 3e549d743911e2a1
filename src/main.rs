//! Sponsor Tracker server.
//!
//! Usage:
//!   cargo run --bin seed_data         # optional demo data
//!   cargo run --bin sponsor_tracker   # start the REST API
//!
//! Configuration comes from the environment (a `.env` file is honoured).

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};

use sponsor_tracker::auth::TokenService;
use sponsor_tracker::checkout::StripeCheckout;
use sponsor_tracker::config::Config;
use sponsor_tracker::rest::{create_router, AppState};
use sponsor_tracker::storage::Storage;
use sponsor_tracker::telemetry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    // Keep the guard alive so buffered file logs are flushed on exit.
    let _log_guard = telemetry::init(&config)?;

    info!(
        environment = %config.environment,
        port = config.server_port,
        data_dir = %config.data_dir,
        "Sponsor Tracker starting"
    );
    if config.stripe_secret_key.is_none() {
        warn!("STRIPE_SECRET_KEY not set; checkout requests will fail");
    }

    let storage = Storage::open(&config.data_dir)?;
    let tokens = TokenService::new(&config.jwt_secret, config.jwt_expiration);
    let checkout = StripeCheckout::new(
        config.stripe_secret_key.clone(),
        &config.stripe_api_base,
        &config.frontend_url,
    );
    let state = AppState::new(
        storage.clone(),
        tokens,
        Arc::new(checkout),
        config.bcrypt_cost,
    );
    let app = create_router(state, &config.cors_allowed_origins);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "REST API listening (docs at /swagger-ui)");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down, flushing storage");
    storage.flush().await?;
    Ok(())
}

async fn shutdown_signal() {
    wait_for_signal(tokio::signal::ctrl_c()).await
}

/// Resolve when `signal` fires. If the listener cannot be installed, never
/// resolve, so the server keeps running instead of shutting down at once.
async fn wait_for_signal<F, E>(signal: F)
where
    F: Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    if let Err(e) = signal.await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
