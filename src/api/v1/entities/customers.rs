use sqlx::PgPool;

use crate::errors::AppError;

pub async fn stripe_id_for_user(db: &PgPool, user_id: &str) -> Result<Option<String>, AppError> {
    let id = sqlx::query_scalar::<_, String>("SELECT stripe_customer_id FROM customers WHERE id = $1")
        .bind(user_id)
        .fetch_optional(db)
        .await?;
    Ok(id)
}

pub async fn user_for_stripe_id(db: &PgPool, stripe_customer_id: &str) -> Result<Option<String>, AppError> {
    let id = sqlx::query_scalar::<_, String>("SELECT id FROM customers WHERE stripe_customer_id = $1")
        .bind(stripe_customer_id)
        .fetch_optional(db)
        .await?;
    Ok(id)
}

#[tracing::instrument(name = "Upsert customer", skip(db))]
pub async fn upsert(db: &PgPool, user_id: &str, stripe_customer_id: &str) -> Result<(), AppError> {
    sqlx::query(
        r#"INSERT INTO customers (id, stripe_customer_id)
           VALUES ($1, $2)
           ON CONFLICT (id) DO UPDATE SET stripe_customer_id = EXCLUDED.stripe_customer_id"#,
    )
    .bind(user_id)
    .bind(stripe_customer_id)
    .execute(db)
    .await?;
    Ok(())
}
