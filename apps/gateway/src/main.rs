//! Roomcast chat gateway
//!
//! A thin axum application embedding the roomcast engine: clients connect
//! to `/ws?userId=<id>&roomId=<room>` and every text frame they send is
//! relayed to their room. With `REDIS_URL` and `ROOMCAST_AUTO_SYNC` set,
//! several gateway instances share rooms through Redis pub/sub.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use roomcast_engine::{
    ws_route, ConnectionManager, EngineConfig, InProcessBroker, MessageBroker, RedisBroker,
};

mod chat;
mod config;

/// Pick the broker for this deployment: Redis when configured and
/// reachable, otherwise an in-process bus good for a single host.
async fn build_broker(config: &config::Config) -> Arc<dyn MessageBroker> {
    let Some(url) = &config.redis_url else {
        return Arc::new(InProcessBroker::new());
    };
    match redis::Client::open(url.as_str()) {
        Ok(client) => match RedisBroker::connect(client).await {
            Ok(broker) => return Arc::new(broker),
            Err(e) => {
                tracing::warn!(error = %e, "redis unreachable, falling back to in-process broker");
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, "invalid REDIS_URL, falling back to in-process broker");
        }
    }
    Arc::new(InProcessBroker::new())
}

fn build_router(manager: ConnectionManager) -> Router {
    Router::new()
        .route("/", get(|| async { "Roomcast chat gateway" }))
        .route("/health", get(|| async { "OK" }))
        .route("/health/live", get(liveness_probe))
        .route("/ws", get(ws_route))
        .layer(Extension(manager))
        .layer(TraceLayer::new_for_http())
}

async fn liveness_probe() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "alive",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roomcast_gateway=debug,roomcast_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = config::Config::from_env()?;
    tracing::info!(port = config.port, auto_sync = config.auto_sync, "starting gateway");

    let broker = build_broker(&config).await;
    let manager = ConnectionManager::start(
        EngineConfig::builder()
            .auto_sync(config.auto_sync)
            .sync_channel(config.sync_channel.clone())
            .broker(broker)
            .build(),
    )
    .await;

    chat::install_hooks(&manager, chat::ChatState::new());

    let app = build_router(manager.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    manager.close().await;

    Ok(())
}
