//! API Server
//!
//! Server setup: middleware stack, socket binding and graceful shutdown.

use super::{
    handlers::AppState,
    middleware::{create_cors_layer, request_id_middleware},
    routes::create_router,
};
use axum::{middleware, Router};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            allowed_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
        }
    }
}

pub struct ApiServer {
    config: ApiConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(config: ApiConfig, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    /// Start the server and block until shutdown.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let app = self.create_app();
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port).parse()?;

        info!("🌐 Starting Croupier API server");
        info!("   Listen: http://{}", addr);
        info!("   Crash feed: ws://{}/ws/crash", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }

    fn create_app(&self) -> Router {
        create_router(self.state.clone()).layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(Duration::from_secs(
                    self.config.request_timeout_secs,
                )))
                .layer(create_cors_layer(&self.config.allowed_origins)),
        )
    }
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::warn!("shutdown signal listener failed: {}", e);
        return;
    }
    info!("shutdown signal received, draining connections");
}
