//! Rows for generated videos. `id` is the provider's video id.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};

use crate::clients::heygen::VideoStatus;
use crate::errors::AppError;

/// Anonymous visitors see at most this many public videos.
pub const ANONYMOUS_FEED_LIMIT: i64 = 6;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Video {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub script: String,
    pub avatar_id: String,
    pub voice_id: String,
    pub status: String,
    pub video_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub error_message: Option<String>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewVideo<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub title: &'a str,
    pub script: &'a str,
    pub avatar_id: &'a str,
    pub voice_id: &'a str,
}

/// What a status poll learned about a video.
#[derive(Debug)]
pub struct StatusUpdate<'a> {
    pub status: &'a VideoStatus,
    pub video_url: Option<&'a str>,
    pub thumbnail_url: Option<&'a str>,
    pub error_message: Option<&'a str>,
}

#[tracing::instrument(name = "Insert video", skip(db, video), fields(video_id = %video.id, user_id = %video.user_id))]
pub async fn insert(db: &PgPool, video: &NewVideo<'_>) -> Result<Video, AppError> {
    let row = sqlx::query_as::<_, Video>(
        r#"INSERT INTO videos (id, user_id, title, script, avatar_id, voice_id, status)
           VALUES ($1, $2, $3, $4, $5, $6, $7)
           RETURNING *"#,
    )
    .bind(video.id)
    .bind(video.user_id)
    .bind(video.title)
    .bind(video.script)
    .bind(video.avatar_id)
    .bind(video.voice_id)
    .bind(VideoStatus::Pending.as_str())
    .fetch_one(db)
    .await?;
    Ok(row)
}

pub async fn find(db: &PgPool, id: &str) -> Result<Option<Video>, AppError> {
    let row = sqlx::query_as::<_, Video>("SELECT * FROM videos WHERE id = $1")
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(row)
}

/// A video the viewer may interact with: public ones, or their own.
pub async fn find_visible(db: &PgPool, id: &str, viewer: &str) -> Result<Option<Video>, AppError> {
    let row = sqlx::query_as::<_, Video>(
        "SELECT * FROM videos WHERE id = $1 AND (is_public = TRUE OR user_id = $2)",
    )
    .bind(id)
    .bind(viewer)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

pub async fn find_owned(db: &PgPool, id: &str, user_id: &str) -> Result<Option<Video>, AppError> {
    let row = sqlx::query_as::<_, Video>("SELECT * FROM videos WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .fetch_optional(db)
        .await?;
    Ok(row)
}

/// Completed videos, newest first. Anonymous viewers get a short public feed;
/// signed-in viewers also see their own private videos.
pub async fn list_feed(db: &PgPool, viewer: Option<&str>) -> Result<Vec<Video>, AppError> {
    let rows = match viewer {
        None => {
            sqlx::query_as::<_, Video>(
                r#"SELECT * FROM videos
                   WHERE status = 'completed' AND is_public = TRUE
                   ORDER BY created_at DESC
                   LIMIT $1"#,
            )
            .bind(ANONYMOUS_FEED_LIMIT)
            .fetch_all(db)
            .await?
        }
        Some(user_id) => {
            sqlx::query_as::<_, Video>(
                r#"SELECT * FROM videos
                   WHERE status = 'completed' AND (is_public = TRUE OR user_id = $1)
                   ORDER BY created_at DESC"#,
            )
            .bind(user_id)
            .fetch_all(db)
            .await?
        }
    };
    Ok(rows)
}

pub async fn list_for_user(db: &PgPool, user_id: &str) -> Result<Vec<Video>, AppError> {
    let rows = sqlx::query_as::<_, Video>(
        "SELECT * FROM videos WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Rows not yet in a terminal state, including ones whose status we don't
/// recognise.
pub async fn list_in_flight(db: &PgPool, limit: i64) -> Result<Vec<Video>, AppError> {
    let rows = sqlx::query_as::<_, Video>(
        r#"SELECT * FROM videos
           WHERE status <> ALL($1)
           ORDER BY updated_at ASC
           LIMIT $2"#,
    )
    .bind(VideoStatus::TERMINAL.to_vec())
    .bind(limit)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn delete_owned(db: &PgPool, id: &str, user_id: &str) -> Result<u64, AppError> {
    let result = sqlx::query("DELETE FROM videos WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}

pub async fn set_visibility(
    db: &PgPool,
    id: &str,
    user_id: &str,
    is_public: bool,
) -> Result<Option<Video>, AppError> {
    let row = sqlx::query_as::<_, Video>(
        r#"UPDATE videos SET is_public = $3, updated_at = now()
           WHERE id = $1 AND user_id = $2
           RETURNING *"#,
    )
    .bind(id)
    .bind(user_id)
    .bind(is_public)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

/// Stores the latest provider report. A missing URL never clears one already stored.
pub async fn apply_status(db: &PgPool, id: &str, update: &StatusUpdate<'_>) -> Result<Option<Video>, AppError> {
    let row = sqlx::query_as::<_, Video>(
        r#"UPDATE videos
           SET status = $2,
               video_url = COALESCE($3, video_url),
               thumbnail_url = COALESCE($4, thumbnail_url),
               error_message = $5,
               updated_at = now()
           WHERE id = $1
           RETURNING *"#,
    )
    .bind(id)
    .bind(update.status.as_str())
    .bind(update.video_url)
    .bind(update.thumbnail_url)
    .bind(update.error_message)
    .fetch_optional(db)
    .await?;
    Ok(row)
}
