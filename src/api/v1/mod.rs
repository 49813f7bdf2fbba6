//! API Version 1 endpoints
//!
//! Public routes (feed, catalog, plans, sign-in, Stripe webhooks) and the
//! session-protected routes for generation, history and billing.

pub mod auth;
pub mod billing;
pub mod catalog;
pub mod entities;
pub mod generation;
pub mod interactions;
pub mod services;
pub mod videos;
pub mod webhooks;

use axum::routing::{delete, get, patch, post, put};
use axum::{middleware, Router};

use crate::api::common::middleware::auth_middleware;
use crate::InnerState;

#[tracing::instrument(name = "create_public_router", skip(state))]
pub fn create_public_router(state: InnerState) -> Router<InnerState> {
    tracing::info!("Creating public API router");

    Router::new()
        .route("/api/auth/signup", post(auth::signup))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))

        .route("/api/videos", get(videos::list_feed))

        .route("/api/catalog/avatars", get(catalog::list_avatars))
        .route("/api/catalog/voices", get(catalog::list_voices))
        .route("/api/catalog/backgrounds", get(catalog::list_backgrounds))
        .route("/api/plans", get(billing::list_plans))

        .route("/api/webhooks", post(webhooks::stripe_webhook))
        .route("/api/webhooks/stripe", post(webhooks::stripe_webhook))
        .with_state(state)
}

#[tracing::instrument(name = "create_protected_router", skip(state))]
pub fn create_protected_router(state: InnerState) -> Router<InnerState> {
    tracing::info!("Creating session-protected API router");

    Router::new()
        .route("/api/auth/me", get(auth::me))

        .route("/api/generate-video", post(generation::generate_video))
        .route("/api/video-status", get(generation::video_status))

        .route("/api/videos", delete(videos::delete_video))
        .route("/api/videos/history", get(videos::history))
        .route("/api/videos/{id}/visibility", patch(videos::set_visibility))
        .route("/api/videos/{id}/interactions", get(interactions::get_interactions))
        .route("/api/videos/{id}/like", put(interactions::like).delete(interactions::unlike))
        .route("/api/videos/{id}/save", put(interactions::save).delete(interactions::unsave))

        .route("/api/create-checkout-session", post(billing::create_checkout_session))
        .route("/api/create-portal-session", post(billing::create_portal_session))
        .route("/api/subscription", get(billing::get_subscription))
        .route("/api/usage", get(billing::usage))

        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
