use std::sync::Arc;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use trackbridge::adapters::http::wait_for_shutdown;
use trackbridge::adapters::{build_app, ShutdownTrigger, SqliteStoreFactory, WebSocketState};
use trackbridge::application::bridge::{BridgeError, BridgeRegistry};
use trackbridge::application::relay::ConnectionManager;
use trackbridge::config::{AppConfig, ConfigError, LogFormat, ServerConfig, ValidationError};

#[derive(Debug, Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid configuration: {0}")]
    Validation(#[from] ValidationError),

    #[error("failed to load project stores: {0}")]
    Stores(#[from] BridgeError),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

fn init_tracing(server: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&server.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match server.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

async fn shutdown_signal(receiver: tokio::sync::watch::Receiver<bool>) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
        }
        _ = wait_for_shutdown(receiver) => {}
    }
    tracing::info!("shutting down");
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let config = AppConfig::load()?;
    config.validate()?;
    init_tracing(&config.server);

    let factory = Arc::new(SqliteStoreFactory::new(
        config.storage.root.clone(),
        config.storage.file_extension.clone(),
        config.storage.strict_version_check,
    ));
    let registry = Arc::new(BridgeRegistry::new(factory));
    let loaded = registry.load_existing().await?;
    tracing::info!(
        root = %config.storage.root.display(),
        projects = loaded,
        "project stores loaded"
    );

    let manager = ConnectionManager::new(Arc::clone(&registry), config.relay.outbound_buffer);
    let websocket = WebSocketState::new(manager, config.relay.handshake_timeout());
    let (trigger, shutdown) = ShutdownTrigger::new(config.server.shutdown_delay());
    let app = build_app(
        registry,
        websocket,
        trigger,
        &config.server.cors_origins_list(),
    );

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "trackbridge listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;
    Ok(())
}
