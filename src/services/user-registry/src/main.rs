//! User Registry Service
//!
//! Serves the registration API on `USER_REGISTRY_HOST:USER_REGISTRY_PORT`
//! (default port 8000). The MongoDB connection is established lazily by the
//! first request that needs it.

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use user_registry::{create_router, AppState, Config, LogFormat};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    config.validate()?;

    init_tracing(&config);

    info!(
        environment = %config.environment,
        database = %config.mongodb.database,
        collection = %config.mongodb.collection,
        "🚀 Starting User Registry Service v{}",
        env!("CARGO_PKG_VERSION")
    );

    if config.mongodb.url.is_none() {
        warn!("MONGODB_URI is not set; user endpoints will fail until it is configured");
    }

    let bind_address = config.bind_address();
    let state = AppState::from_config(config);
    let connections = state.connections.clone();
    let app = create_router(state);

    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {}", bind_address))?;
    info!("🌐 User Registry Service listening on {}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    connections.shutdown().await;
    info!("👋 User Registry Service shutdown complete");
    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("user_registry={},tower_http=debug", config.log_level).into()
    });

    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("🛑 Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("🛑 Received SIGTERM, shutting down");
        },
    }
}
