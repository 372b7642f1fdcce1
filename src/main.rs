// Relay server entry point

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chess_sync::adapters::{relay_router, RelayState, RoomManager};
use chess_sync::config::{AppConfig, ConfigError, ServerConfig, ValidationError};

const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
enum StartupError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(#[from] ValidationError),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

fn init_tracing(server: &ServerConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&server.log_level));

    if server.use_json_logs() {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_line_number(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let config = AppConfig::load()?;
    init_tracing(&config.server);
    config.validate()?;

    tracing::info!(
        environment = ?config.server.environment,
        engines = ?config.bots.engines.keys().collect::<Vec<_>>(),
        "Starting chess-sync relay"
    );

    let rooms = Arc::new(RoomManager::new(config.session.update_capacity));

    let pruner = Arc::clone(&rooms);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PRUNE_INTERVAL);
        loop {
            interval.tick().await;
            pruner.prune().await;
        }
    });

    let app = relay_router(RelayState::new(rooms)).layer(TraceLayer::new_for_http());

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Listening");
    tracing::info!("WebSocket endpoint: ws://{}/ws/{{participant_id}}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
