// Main entry point - Dependency injection and server setup
mod domain;
mod application;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc};
use anyhow::Context;
use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::live_updates::LiveUpdateNotifier;
use crate::application::session_registry::SessionRegistry;
use crate::domain::aggregation::AggregationPolicy;
use crate::infrastructure::config::{load_backend_config, load_charts_config};
use crate::infrastructure::http_values_repository::HttpValuesRepository;
use crate::infrastructure::websocket_notifier::WebSocketNotifier;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{chart_state, health_check, list_charts, nearest_point, stream_chart};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let backend_config = load_backend_config()?;
    let charts = load_charts_config()?.into_definitions();

    // Create repository and change notifier (infrastructure layer)
    let repository = Arc::new(HttpValuesRepository::new(
        backend_config.values.host.clone(),
        backend_config.values.authorization.clone(),
        backend_config.values.timeout(),
    )?);

    let poll_interval = backend_config.live.poll_interval();
    let notifier = match &backend_config.live.websocket_url {
        Some(url) => LiveUpdateNotifier::new(Arc::new(WebSocketNotifier::new(url.clone())), poll_interval),
        None => LiveUpdateNotifier::polling(poll_interval),
    };

    // Start one session per chart (application layer)
    let registry = SessionRegistry::start(
        charts,
        AggregationPolicy::new(backend_config.chart.px_per_point),
        repository,
        notifier,
    );

    // Create application state
    let state = Arc::new(AppState {
        registry,
        pointer_radius_px: backend_config.chart.pointer_radius_px,
    });

    // Build router (presentation layer)
    // Responses are compressed by the handlers, so there is no CompressionLayer
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/charts", get(list_charts))
        .route("/charts/:id/state", get(chart_state))
        .route("/charts/:id/stream", get(stream_chart))
        .route("/charts/:id/nearest", get(nearest_point))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = backend_config
        .server
        .listen_addr
        .parse()
        .with_context(|| format!("Invalid listen address {}", backend_config.server.listen_addr))?;
    tracing::info!("Starting chart-viewport service on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router).await?;

    Ok(())
}
