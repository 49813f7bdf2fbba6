use chrono::{Datelike, NaiveDate, Utc};
use serde::Serialize;
use sqlx::PgPool;

use crate::api::v1::entities::subscriptions;
use crate::errors::AppError;
use crate::plans::Plan;

#[derive(Debug, Clone, Serialize)]
pub struct Usage {
    pub plan: Plan,
    pub used: i32,
    pub limit: i32,
}

#[derive(Debug, sqlx::FromRow)]
struct Counter {
    monthly_video_count: i32,
    video_count_period: NaiveDate,
}

pub fn month_start(today: NaiveDate) -> NaiveDate {
    today.with_day(1).unwrap_or(today)
}

/// Counter value once any stale month has been rolled over.
pub fn current_count(count: i32, period: NaiveDate, today: NaiveDate) -> i32 {
    if period < month_start(today) {
        0
    } else {
        count
    }
}

pub fn limit_message(limit: i32) -> String {
    format!(
        "You have reached your monthly limit of {} videos. Please upgrade your plan to create more videos.",
        limit
    )
}

pub async fn effective_plan(db: &PgPool, user_id: &str) -> Result<Plan, AppError> {
    let latest = subscriptions::latest_for_user(db, user_id).await?;
    Ok(Plan::effective(
        latest
            .as_ref()
            .map(|s| (s.status.as_str(), s.plan_name.as_str())),
    ))
}

pub async fn current_usage(db: &PgPool, user_id: &str) -> Result<Usage, AppError> {
    let plan = effective_plan(db, user_id).await?;
    let counter = sqlx::query_as::<_, Counter>(
        "SELECT monthly_video_count, video_count_period FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Usage {
        plan,
        used: current_count(
            counter.monthly_video_count,
            counter.video_count_period,
            Utc::now().date_naive(),
        ),
        limit: plan.monthly_video_limit(),
    })
}

/// Takes one slot of the monthly allowance, or fails with `LimitReached`.
/// The user row is locked so concurrent requests can't overshoot.
#[tracing::instrument(name = "Reserve video slot", skip(db))]
pub async fn reserve_video_slot(db: &PgPool, user_id: &str) -> Result<Usage, AppError> {
    let plan = effective_plan(db, user_id).await?;
    let limit = plan.monthly_video_limit();
    let today = Utc::now().date_naive();

    let mut txn = db.begin().await?;

    let counter = sqlx::query_as::<_, Counter>(
        "SELECT monthly_video_count, video_count_period FROM users WHERE id = $1 FOR UPDATE",
    )
    .bind(user_id)
    .fetch_optional(&mut *txn)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let used = current_count(counter.monthly_video_count, counter.video_count_period, today);
    if used >= limit {
        tracing::warn!(plan = %plan, used, limit, "Monthly video limit reached");
        return Err(AppError::LimitReached(limit_message(limit)));
    }

    sqlx::query(
        r#"UPDATE users
           SET monthly_video_count = $2, video_count_period = $3, updated_at = now()
           WHERE id = $1"#,
    )
    .bind(user_id)
    .bind(used + 1)
    .bind(month_start(today))
    .execute(&mut *txn)
    .await?;

    txn.commit().await?;

    tracing::info!(plan = %plan, used = used + 1, limit, "Reserved video slot");
    Ok(Usage {
        plan,
        used: used + 1,
        limit,
    })
}

/// Gives back a slot when the provider refused the job.
#[tracing::instrument(name = "Release video slot", skip(db))]
pub async fn release_video_slot(db: &PgPool, user_id: &str) -> Result<(), AppError> {
    sqlx::query(
        r#"UPDATE users
           SET monthly_video_count = GREATEST(monthly_video_count - 1, 0), updated_at = now()
           WHERE id = $1"#,
    )
    .bind(user_id)
    .execute(db)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn counter_survives_within_month() {
        assert_eq!(current_count(4, date(2024, 12, 1), date(2024, 12, 31)), 4);
    }

    #[test]
    fn counter_resets_on_new_month() {
        assert_eq!(current_count(15, date(2024, 12, 1), date(2025, 1, 2)), 0);
        assert_eq!(current_count(3, date(2024, 11, 1), date(2024, 12, 1)), 0);
    }

    #[test]
    fn month_start_is_first_day() {
        assert_eq!(month_start(date(2024, 2, 29)), date(2024, 2, 1));
    }

    #[test]
    fn limit_message_names_the_limit() {
        assert_eq!(
            limit_message(15),
            "You have reached your monthly limit of 15 videos. Please upgrade your plan to create more videos."
        );
    }

    #[sqlx::test]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn slots_run_out_and_come_back(db: PgPool) {
        crate::test_support::insert_user(&db, "user-1").await;
        let limit = Plan::Free.monthly_video_limit();

        for expected in 1..=limit {
            assert_eq!(reserve_video_slot(&db, "user-1").await.unwrap().used, expected);
        }
        let err = reserve_video_slot(&db, "user-1").await.unwrap_err();
        assert!(matches!(err, AppError::LimitReached(_)));

        release_video_slot(&db, "user-1").await.unwrap();
        assert_eq!(current_usage(&db, "user-1").await.unwrap().used, limit - 1);
        assert!(reserve_video_slot(&db, "user-1").await.is_ok());
    }

    #[sqlx::test]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn release_never_goes_negative(db: PgPool) {
        crate::test_support::insert_user(&db, "user-1").await;
        release_video_slot(&db, "user-1").await.unwrap();
        assert_eq!(current_usage(&db, "user-1").await.unwrap().used, 0);
    }
}
