//! Stripe webhook receiver. Keeps `customers` and `subscriptions` in sync
//! with what Stripe reports.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

use crate::api::v1::entities::subscriptions::{self, SubscriptionUpsert};
use crate::api::v1::entities::customers;
use crate::clients::stripe::{
    timestamp_to_datetime, StripeCustomer, StripeEvent, StripeSubscription, SIGNATURE_HEADER,
    USER_ID_METADATA_KEY,
};
use crate::config::StripeSettings;
use crate::errors::AppError;
use crate::plans::Plan;
use crate::InnerState;

#[tracing::instrument(name = "Stripe webhook", skip(inner, headers, body))]
pub async fn stripe_webhook(
    State(inner): State<InnerState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<Value>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Validation("No signature found".to_string()))?;

    let event = inner.stripe.construct_event(&body, signature).map_err(|e| {
        tracing::warn!(error = %e, "Rejected webhook");
        e
    })?;

    tracing::info!(event_id = %event.id, event_type = %event.event_type, "Received Stripe event");
    metrics::counter!("stripe_webhook_events_total", "type" => event.event_type.clone()).increment(1);

    handle_event(&inner, event).await?;
    Ok(Json(json!({ "received": true })))
}

/// What an event asks of the database, decided before touching it.
#[derive(Debug)]
enum EventAction {
    LinkCustomer { user_id: String, stripe_customer_id: String },
    StoreSubscription(StripeSubscription),
    CancelSubscription(String),
    Ignore,
}

fn classify(event: StripeEvent) -> Result<EventAction, AppError> {
    let action = match event.event_type.as_str() {
        "customer.created" => {
            let customer: StripeCustomer = parse_object(event.data.object)?;
            match customer.metadata.get(USER_ID_METADATA_KEY) {
                Some(user_id) => {
                    tracing::debug!(email = customer.email.as_deref().unwrap_or_default(), "Customer carries user_id");
                    EventAction::LinkCustomer {
                        user_id: user_id.clone(),
                        stripe_customer_id: customer.id.clone(),
                    }
                }
                None => {
                    tracing::debug!(stripe_customer_id = %customer.id, "Customer has no user_id metadata");
                    EventAction::Ignore
                }
            }
        }
        "customer.subscription.created" | "customer.subscription.updated" => {
            EventAction::StoreSubscription(parse_object(event.data.object)?)
        }
        "customer.subscription.deleted" => {
            let subscription: StripeSubscription = parse_object(event.data.object)?;
            EventAction::CancelSubscription(subscription.id)
        }
        other => {
            tracing::debug!(event_type = %other, "Unhandled event type");
            EventAction::Ignore
        }
    };
    Ok(action)
}

async fn handle_event(inner: &InnerState, event: StripeEvent) -> Result<(), AppError> {
    match classify(event)? {
        EventAction::LinkCustomer { user_id, stripe_customer_id } => {
            customers::upsert(&inner.db, &user_id, &stripe_customer_id).await?;
            tracing::info!(stripe_customer_id = %stripe_customer_id, "Linked Stripe customer");
        }
        EventAction::StoreSubscription(subscription) => on_subscription_changed(inner, &subscription).await?,
        EventAction::CancelSubscription(subscription_id) => {
            let touched = subscriptions::mark_canceled(&inner.db, &subscription_id).await?;
            if touched == 0 {
                tracing::warn!(subscription_id = %subscription_id, "Deleted subscription was never recorded");
            } else {
                tracing::info!(subscription_id = %subscription_id, "Subscription canceled");
            }
        }
        EventAction::Ignore => {}
    }
    Ok(())
}

fn parse_object<T: serde::de::DeserializeOwned>(object: Value) -> Result<T, AppError> {
    serde_json::from_value(object)
        .map_err(|e| AppError::Webhook(format!("Unexpected event object: {}", e)))
}

/// Resolves the local user for a subscription. The customers table is the
/// source of truth; subscription metadata only fills a gap left by a lost
/// `customer.created` event.
async fn resolve_user(inner: &InnerState, subscription: &StripeSubscription) -> Result<String, AppError> {
    if let Some(user_id) = customers::user_for_stripe_id(&inner.db, &subscription.customer).await? {
        return Ok(user_id);
    }

    match subscription.metadata.get(USER_ID_METADATA_KEY) {
        Some(user_id) => {
            tracing::warn!(stripe_customer_id = %subscription.customer, "Customer missing, linking from metadata");
            customers::upsert(&inner.db, user_id, &subscription.customer).await?;
            Ok(user_id.clone())
        }
        None => Err(AppError::NotFound("Customer not found".to_string())),
    }
}

async fn on_subscription_changed(inner: &InnerState, subscription: &StripeSubscription) -> Result<(), AppError> {
    let user_id = resolve_user(inner, subscription).await?;
    let plan = plan_for(subscription, &inner.settings.stripe);

    subscriptions::upsert(&inner.db, &build_upsert(subscription, &user_id, plan)).await?;

    tracing::info!(
        subscription_id = %subscription.id,
        status = %subscription.status,
        plan = %plan,
        "Subscription stored"
    );
    Ok(())
}

fn plan_for(subscription: &StripeSubscription, stripe: &StripeSettings) -> Plan {
    subscription
        .price_id()
        .map(|price| Plan::from_price_id(price, stripe))
        .unwrap_or(Plan::Free)
}

fn build_upsert<'a>(subscription: &'a StripeSubscription, user_id: &'a str, plan: Plan) -> SubscriptionUpsert<'a> {
    SubscriptionUpsert {
        id: &subscription.id,
        user_id,
        status: &subscription.status,
        plan_name: plan.name(),
        stripe_customer_id: &subscription.customer,
        stripe_price_id: subscription.price_id(),
        quantity: subscription.first_item().and_then(|item| item.quantity),
        cancel_at_period_end: subscription.cancel_at_period_end,
        cancel_at: timestamp_to_datetime(subscription.cancel_at),
        canceled_at: timestamp_to_datetime(subscription.canceled_at),
        current_period_start: timestamp_to_datetime(subscription.period_start()),
        current_period_end: timestamp_to_datetime(subscription.period_end()),
        trial_start: timestamp_to_datetime(subscription.trial_start),
        trial_end: timestamp_to_datetime(subscription.trial_end),
    }
}
