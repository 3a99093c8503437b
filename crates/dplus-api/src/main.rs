//! # dplus-api — Binary Entry Point
//!
//! Starts the Axum HTTP server for DirectivesPlus.
//! Binds to configurable port (default 8080).

use std::net::SocketAddr;

use dplus_api::state::{AppConfig, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured tracing. LOG_FORMAT=json switches to JSON lines.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = AppConfig::from_env().map_err(|e| {
        tracing::error!("Invalid configuration: {e}");
        e
    })?;
    let port = config.port;
    tracing::info!(?config, "configuration loaded");

    // Initialize database pool (optional — absent means no local ledger).
    let db_pool = dplus_api::db::init_pool().await.map_err(|e| {
        tracing::error!("Database initialization failed: {e}");
        e
    })?;

    let platform = match dplus_platform_client::PlatformConfig::from_env() {
        Ok(platform_config) => {
            tracing::info!(url = %platform_config.base_url, "platform client configured");
            match dplus_platform_client::PlatformClient::new(platform_config) {
                Ok(client) => Some(client),
                Err(e) => {
                    tracing::error!("Failed to create platform client: {e}");
                    return Err(e.into());
                }
            }
        }
        Err(e) => {
            tracing::warn!(
                "Platform client not configured: {e}. Using the in-memory directory; auth relay endpoints will return 503."
            );
            None
        }
    };

    let state = AppState::try_with_config(config, platform, db_pool).map_err(|e| {
        tracing::error!("Dossier key rejected: {e}");
        e
    })?;

    let app = dplus_api::app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("DirectivesPlus API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
