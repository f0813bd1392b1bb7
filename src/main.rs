//! Aether Gateway - Binary Entry Point
//!
//! Reads configuration from the environment, starts the hub (and the bus
//! relay when `REDIS_URL` is set) and serves `/ws` until SIGINT/SIGTERM.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aether_gateway::api::{create_router, AppState, EventBroadcaster};
use aether_gateway::config::GatewayConfig;
use aether_gateway::hub::Hub;
use aether_gateway::{GatewayResult, NAME, VERSION};

#[tokio::main]
async fn main() -> GatewayResult<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env("GATEWAY_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = GatewayConfig::from_env()?;
    info!(name = NAME, version = VERSION, "Starting gateway");

    let (hub, control) = Hub::spawn();
    let relay_shutdown = CancellationToken::new();
    let (broadcaster, relay) = connect_bus(&config, &hub, &relay_shutdown).await?;

    let state = AppState::new(hub.clone(), &config.jwt_secret)
        .with_broadcaster(broadcaster)
        .with_session(config.session);
    let app = create_router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(config.listen_addr()).await?;
    info!("Gateway listening on ws://{}/ws", listener.local_addr()?);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    relay_shutdown.cancel();
    if let Some(relay) = relay {
        if let Err(e) = relay.await {
            warn!(error = %e, "Bus relay task failed");
        }
    }
    hub.shutdown().await;
    if let Err(e) = control.await {
        warn!(error = %e, "Hub control loop failed");
    }

    info!("Shutdown complete");
    served.map_err(Into::into)
}

#[cfg(feature = "redis")]
async fn connect_bus(
    config: &GatewayConfig,
    hub: &Hub,
    shutdown: &CancellationToken,
) -> GatewayResult<(EventBroadcaster, Option<tokio::task::JoinHandle<()>>)> {
    use aether_gateway::bus::{BusBridge, RedisBus};

    let Some(url) = config.redis_url.as_deref() else {
        info!("REDIS_URL not set, running single-process");
        return Ok((EventBroadcaster::local(hub.clone()), None));
    };

    let bus = RedisBus::connect(url).await?;
    let bridge = BusBridge::new(Arc::new(bus));
    let relay = bridge.start_relay(hub.clone(), shutdown.clone()).await?;
    info!("Bus relay subscribed");
    Ok((EventBroadcaster::with_bridge(hub.clone(), bridge), Some(relay)))
}

#[cfg(not(feature = "redis"))]
async fn connect_bus(
    config: &GatewayConfig,
    hub: &Hub,
    _shutdown: &CancellationToken,
) -> GatewayResult<(EventBroadcaster, Option<tokio::task::JoinHandle<()>>)> {
    if config.redis_url.is_some() {
        warn!("REDIS_URL set but built without the redis feature, running single-process");
    }
    Ok((EventBroadcaster::local(hub.clone()), None))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
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
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Received shutdown signal, draining connections");
}
