use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use crate::errors::AppError;

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[tracing::instrument(name = "Insert user", skip(db, password_hash))]
pub async fn insert(db: &PgPool, id: &str, email: &str, password_hash: &str) -> Result<User, AppError> {
    // Quota counters live on the same row but are read through `limits`.
    sqlx::query_as::<_, User>(
        r#"INSERT INTO users (id, email, password_hash)
           VALUES ($1, $2, $3)
           RETURNING id, email, password_hash, created_at"#,
    )
    .bind(id)
    .bind(email)
    .bind(password_hash)
    .fetch_one(db)
    .await
    .map_err(|e| {
        // unique_violation
        let duplicate = matches!(&e, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505"));
        if duplicate {
            AppError::Conflict(format!("User with email '{}' already exists", email))
        } else {
            AppError::Database(anyhow::Error::from(e).context("Failed to create user"))
        }
    })
}

pub async fn find_by_email(db: &PgPool, email: &str) -> Result<Option<User>, AppError> {
    let user = sqlx::query_as::<_, User>("SELECT id, email, password_hash, created_at FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(db)
        .await?;
    Ok(user)
}

pub async fn find_by_id(db: &PgPool, id: &str) -> Result<Option<User>, AppError> {
    let user = sqlx::query_as::<_, User>("SELECT id, email, password_hash, created_at FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(user)
}
