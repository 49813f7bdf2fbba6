use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};

use crate::errors::AppError;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Subscription {
    pub id: String,
    pub user_id: String,
    pub status: String,
    pub plan_name: String,
    pub stripe_customer_id: String,
    pub stripe_price_id: Option<String>,
    pub quantity: Option<i32>,
    pub cancel_at_period_end: bool,
    pub cancel_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub trial_start: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct SubscriptionUpsert<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub status: &'a str,
    pub plan_name: &'a str,
    pub stripe_customer_id: &'a str,
    pub stripe_price_id: Option<&'a str>,
    pub quantity: Option<i32>,
    pub cancel_at_period_end: bool,
    pub cancel_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub trial_start: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
}

#[tracing::instrument(name = "Upsert subscription", skip(db, sub), fields(subscription_id = %sub.id, status = %sub.status, plan = %sub.plan_name))]
pub async fn upsert(db: &PgPool, sub: &SubscriptionUpsert<'_>) -> Result<(), AppError> {
    sqlx::query(
        r#"INSERT INTO subscriptions (
               id, user_id, status, plan_name, stripe_customer_id, stripe_price_id, quantity,
               cancel_at_period_end, cancel_at, canceled_at, current_period_start,
               current_period_end, trial_start, trial_end
           )
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
           ON CONFLICT (id) DO UPDATE SET
               user_id = EXCLUDED.user_id,
               status = EXCLUDED.status,
               plan_name = EXCLUDED.plan_name,
               stripe_customer_id = EXCLUDED.stripe_customer_id,
               stripe_price_id = EXCLUDED.stripe_price_id,
               quantity = EXCLUDED.quantity,
               cancel_at_period_end = EXCLUDED.cancel_at_period_end,
               cancel_at = EXCLUDED.cancel_at,
               canceled_at = EXCLUDED.canceled_at,
               current_period_start = EXCLUDED.current_period_start,
               current_period_end = EXCLUDED.current_period_end,
               trial_start = EXCLUDED.trial_start,
               trial_end = EXCLUDED.trial_end,
               updated_at = now()"#,
    )
    .bind(sub.id)
    .bind(sub.user_id)
    .bind(sub.status)
    .bind(sub.plan_name)
    .bind(sub.stripe_customer_id)
    .bind(sub.stripe_price_id)
    .bind(sub.quantity)
    .bind(sub.cancel_at_period_end)
    .bind(sub.cancel_at)
    .bind(sub.canceled_at)
    .bind(sub.current_period_start)
    .bind(sub.current_period_end)
    .bind(sub.trial_start)
    .bind(sub.trial_end)
    .execute(db)
    .await?;
    Ok(())
}

/// Returns how many rows were touched; zero means we never saw the subscription.
#[tracing::instrument(name = "Mark subscription canceled", skip(db))]
pub async fn mark_canceled(db: &PgPool, id: &str) -> Result<u64, AppError> {
    let result = sqlx::query(
        r#"UPDATE subscriptions
           SET status = 'canceled', cancel_at_period_end = FALSE, canceled_at = now(), updated_at = now()
           WHERE id = $1"#,
    )
    .bind(id)
    .execute(db)
    .await?;
    Ok(result.rows_affected())
}

pub async fn latest_for_user(db: &PgPool, user_id: &str) -> Result<Option<Subscription>, AppError> {
    let row = sqlx::query_as::<_, Subscription>(
        r#"SELECT * FROM subscriptions
           WHERE user_id = $1
           ORDER BY created_at DESC
           LIMIT 1"#,
    )
    .bind(user_id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}
