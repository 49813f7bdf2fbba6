//! HTTP API, grouped by version.

pub mod common;
pub mod v1;

use axum::Router;

use crate::InnerState;

/// Creates the main API router with all versions
#[tracing::instrument(name = "create_api_router", skip(state))]
pub fn create_api_router(state: InnerState) -> Router<InnerState> {
    tracing::info!("Creating API router with versioned endpoints");

    Router::new()
        .merge(v1::create_public_router(state.clone()))
        .merge(v1::create_protected_router(state))
}
