//! Like and Save join rows.

use sqlx::PgPool;

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interaction {
    Like,
    Save,
}

impl Interaction {
    fn table(self) -> &'static str {
        match self {
            Interaction::Like => "likes",
            Interaction::Save => "saves",
        }
    }
}

/// Idempotently records or clears an interaction.
#[tracing::instrument(name = "Set interaction", skip(db))]
pub async fn set(
    db: &PgPool,
    kind: Interaction,
    user_id: &str,
    video_id: &str,
    on: bool,
) -> Result<(), AppError> {
    // Table names come from a closed enum, never from input.
    let sql = if on {
        format!(
            "INSERT INTO {} (user_id, video_id) VALUES ($1, $2) ON CONFLICT (user_id, video_id) DO NOTHING",
            kind.table()
        )
    } else {
        format!("DELETE FROM {} WHERE user_id = $1 AND video_id = $2", kind.table())
    };

    sqlx::query(&sql)
        .bind(user_id)
        .bind(video_id)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn is_set(db: &PgPool, kind: Interaction, user_id: &str, video_id: &str) -> Result<bool, AppError> {
    let sql = format!(
        "SELECT EXISTS (SELECT 1 FROM {} WHERE user_id = $1 AND video_id = $2)",
        kind.table()
    );
    let exists = sqlx::query_scalar::<_, bool>(&sql)
        .bind(user_id)
        .bind(video_id)
        .fetch_one(db)
        .await?;
    Ok(exists)
}

pub async fn count_for_user(db: &PgPool, kind: Interaction, user_id: &str) -> Result<i64, AppError> {
    let sql = format!("SELECT COUNT(*) FROM {} WHERE user_id = $1", kind.table());
    let count = sqlx::query_scalar::<_, i64>(&sql)
        .bind(user_id)
        .fetch_one(db)
        .await?;
    Ok(count)
}
