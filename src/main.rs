mod api;
mod authentication;
mod catalog;
mod clients;
mod config;
mod db;
mod errors;
mod plans;
mod system;
#[cfg(test)]
mod test_support;

use std::sync::Arc;

use anyhow::Context;
use axum::body::Body;
use axum::http::{header, HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use axum_prometheus::PrometheusMetricLayer;
use sqlx::PgPool;
use tower_cookies::CookieManagerLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::api::common::tracing::{make_custom_span, on_custom_failure, on_custom_request, on_custom_response};
use crate::api::create_api_router;
use crate::api::v1::services::status_sync::StatusSyncService;
use crate::clients::{HeyGenClient, StorageClient, StripeClient};
use crate::config::Settings;
use crate::db::init_db;
use crate::system::create_system_router;

#[derive(Clone)]
pub struct InnerState {
    pub db: PgPool,
    pub settings: Arc<Settings>,
    pub heygen: HeyGenClient,
    pub stripe: StripeClient,
    pub storage: Option<StorageClient>,
}

impl InnerState {
    pub fn new(db: PgPool, settings: Settings) -> Self {
        Self {
            db,
            heygen: HeyGenClient::new(&settings.heygen),
            stripe: StripeClient::new(&settings.stripe),
            storage: settings.storage.as_ref().map(StorageClient::new),
            settings: Arc::new(settings),
        }
    }
}

fn cors_layer(settings: &Settings) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    match HeaderValue::from_str(&settings.app_url) {
        Ok(origin) => layer.allow_origin(origin).allow_credentials(true),
        Err(_) => {
            tracing::warn!(app_url = %settings.app_url, "APP_URL is not a valid origin, CORS disabled");
            layer
        }
    }
}

/// Every route the service answers, minus `/metrics` which needs the
/// process-wide Prometheus recorder.
pub fn build_router(state: InnerState) -> Router {
    let cors = cors_layer(&state.settings);

    Router::new()
        .merge(create_system_router())
        .merge(create_api_router(state.clone()))
        .layer(CookieManagerLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(make_custom_span::<Body>)
                .on_request(on_custom_request::<Body>)
                .on_response(on_custom_response::<Body>)
                .on_failure(on_custom_failure),
        )
        .layer(cors)
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "api_scriptcast=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env()?;
    let db = init_db(&settings).await?;
    let bind_address = settings.bind_address.clone();
    let sync_interval = settings.status_sync_interval;

    let state = InnerState::new(db, settings);

    match sync_interval {
        Some(period) => {
            tokio::spawn(StatusSyncService::new(state.clone()).run(period));
        }
        None => tracing::info!("Status sync disabled"),
    }

    let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();

    let app = build_router(state)
        .route("/metrics", get(|| async move { metric_handle.render() }))
        .layer(prometheus_layer);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Could not bind {}", bind_address))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}
