//! Checkout, billing portal and plan/usage lookups.

use axum::extract::State;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::api::common::limits::{current_usage, Usage};
use crate::api::common::ApiResponse;
use crate::api::v1::auth::Claims;
use crate::api::v1::entities::subscriptions::{self, Subscription};
use crate::api::v1::entities::{customers, users};
use crate::clients::stripe::CheckoutSessionParams;
use crate::errors::AppError;
use crate::plans::Plan;
use crate::InnerState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutPayload {
    #[serde(default)]
    plan_name: String,
}

#[derive(Debug, Serialize)]
pub struct SessionUrl {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct PlanInfo {
    pub name: &'static str,
    pub monthly_video_limit: i32,
    pub monthly_price_usd: u32,
}

/// Only paid plans can be bought.
fn purchasable(plan_name: &str) -> Option<Plan> {
    Plan::from_name(plan_name).filter(|plan| *plan != Plan::Free)
}

/// Returns the caller's Stripe customer id, creating and persisting one on
/// first purchase.
async fn get_or_create_customer(inner: &InnerState, claims: &Claims) -> Result<String, AppError> {
    if let Some(existing) = customers::stripe_id_for_user(&inner.db, &claims.user_id).await? {
        return Ok(existing);
    }

    let email = match users::find_by_id(&inner.db, &claims.user_id).await? {
        Some(user) => user.email,
        None => claims.sub.clone(),
    };

    let customer = inner.stripe.create_customer(&email, &claims.user_id).await?;
    customers::upsert(&inner.db, &claims.user_id, &customer.id).await?;
    tracing::info!(stripe_customer_id = %customer.id, "Created Stripe customer");
    Ok(customer.id)
}

#[tracing::instrument(name = "Create checkout session", skip(inner, claims, payload), fields(user_id = %claims.user_id, plan = %payload.plan_name))]
pub async fn create_checkout_session(
    State(inner): State<InnerState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CheckoutPayload>,
) -> Result<Json<SessionUrl>, AppError> {
    let plan = purchasable(&payload.plan_name)
        .ok_or_else(|| AppError::Validation("Invalid plan".to_string()))?;
    let price_id = plan
        .price_id(&inner.settings.stripe)
        .ok_or_else(|| AppError::Validation("Invalid plan".to_string()))?;

    let customer_id = get_or_create_customer(&inner, &claims).await?;

    let app_url = &inner.settings.app_url;
    let success_url = format!("{}/dashboard?success=true", app_url);
    let cancel_url = format!("{}/plans?canceled=true", app_url);

    let session = inner
        .stripe
        .create_checkout_session(&CheckoutSessionParams {
            customer_id: &customer_id,
            price_id,
            success_url: &success_url,
            cancel_url: &cancel_url,
            user_id: &claims.user_id,
        })
        .await?;

    let url = session.url.ok_or_else(|| {
        AppError::ExternalService(anyhow::anyhow!("Checkout session {} has no URL", session.id))
    })?;

    metrics::counter!("checkout_sessions_created_total", "plan" => plan.name()).increment(1);
    Ok(Json(SessionUrl { url }))
}

#[tracing::instrument(name = "Create billing portal session", skip(inner, claims), fields(user_id = %claims.user_id))]
pub async fn create_portal_session(
    State(inner): State<InnerState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<SessionUrl>, AppError> {
    let customer_id = customers::stripe_id_for_user(&inner.db, &claims.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Customer not found".to_string()))?;

    let return_url = format!("{}/dashboard", inner.settings.app_url);
    let session = inner.stripe.create_portal_session(&customer_id, &return_url).await?;
    tracing::debug!(session_id = %session.id, "Portal session created");

    Ok(Json(SessionUrl { url: session.url }))
}

pub async fn get_subscription(
    State(inner): State<InnerState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<Option<Subscription>>>, AppError> {
    let subscription = subscriptions::latest_for_user(&inner.db, &claims.user_id).await?;
    Ok(Json(ApiResponse::success(subscription)))
}

pub async fn list_plans() -> Json<Vec<PlanInfo>> {
    Json(
        Plan::ALL
            .into_iter()
            .map(|plan| PlanInfo {
                name: plan.name(),
                monthly_video_limit: plan.monthly_video_limit(),
                monthly_price_usd: plan.monthly_price_usd(),
            })
            .collect(),
    )
}

pub async fn usage(
    State(inner): State<InnerState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Usage>, AppError> {
    Ok(Json(current_usage(&inner.db, &claims.user_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{request, response_json, test_state};
    use axum::http::StatusCode;
    use serde_json::json;

    #[test]
    fn only_paid_plans_are_purchasable() {
        assert_eq!(purchasable("Founder"), Some(Plan::Founder));
        assert_eq!(purchasable("Pro"), Some(Plan::Pro));
        assert_eq!(purchasable("Free"), None);
        assert_eq!(purchasable("Enterprise"), None);
        assert_eq!(purchasable(""), None);
    }

    #[tokio::test]
    async fn checkout_rejects_unknown_plan() {
        let app = crate::build_router(test_state());
        let (status, body) = response_json(
            app,
            request("POST", "/api/create-checkout-session")
                .authed("user-1")
                .json(json!({"planName": "Enterprise"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid plan");
    }

    #[tokio::test]
    async fn portal_requires_session() {
        let app = crate::build_router(test_state());
        let (status, _) =
            response_json(app, request("POST", "/api/create-portal-session").empty()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn plans_are_public() {
        let app = crate::build_router(test_state());
        let (status, body) = response_json(app, request("GET", "/api/plans").empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["name"], "Free");
        assert_eq!(body[1]["monthly_video_limit"], 15);
        assert_eq!(body[2]["monthly_price_usd"], 99);
    }
}
