use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::{Extension, Json};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::api::common::middleware::claims_from_headers;
use crate::api::common::{ApiResponse, VideoIdQuery};
use crate::api::v1::auth::Claims;
use crate::api::v1::entities::interactions::{self, Interaction};
use crate::api::v1::entities::videos::{self, Video};
use crate::clients::storage::video_object_path;
use crate::errors::AppError;
use crate::InnerState;

#[derive(Debug, Serialize)]
pub struct HistoryStats {
    pub created: usize,
    pub liked: i64,
    pub saved: i64,
}

#[derive(Debug, Serialize)]
pub struct History {
    pub videos: Vec<Video>,
    pub stats: HistoryStats,
}

#[derive(Debug, Deserialize)]
pub struct VisibilityPayload {
    is_public: bool,
}

/// Public feed. A valid session widens it to the caller's own videos; a bad
/// or missing one just means an anonymous view.
#[tracing::instrument(name = "List video feed", skip(inner, headers))]
pub async fn list_feed(
    State(inner): State<InnerState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Video>>, AppError> {
    let claims = claims_from_headers(&headers, inner.settings.jwt_secret.expose_secret());
    let viewer = claims.as_ref().map(|c| c.user_id.as_str());

    let feed = videos::list_feed(&inner.db, viewer).await?;
    tracing::debug!(count = feed.len(), signed_in = viewer.is_some(), "Feed loaded");
    Ok(Json(feed))
}

#[tracing::instrument(name = "Get video history", skip(inner, claims), fields(user_id = %claims.user_id))]
pub async fn history(
    State(inner): State<InnerState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<History>>, AppError> {
    let (owned, liked, saved) = tokio::try_join!(
        videos::list_for_user(&inner.db, &claims.user_id),
        interactions::count_for_user(&inner.db, Interaction::Like, &claims.user_id),
        interactions::count_for_user(&inner.db, Interaction::Save, &claims.user_id),
    )?;

    Ok(Json(ApiResponse::success(History {
        stats: HistoryStats {
            created: owned.len(),
            liked,
            saved,
        },
        videos: owned,
    })))
}

#[tracing::instrument(name = "Delete video", skip(inner, claims, query), fields(user_id = %claims.user_id))]
pub async fn delete_video(
    State(inner): State<InnerState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<VideoIdQuery>,
) -> Result<Json<Value>, AppError> {
    let video_id = query.require()?;

    // Only the owner may remove the stored file.
    if videos::find_owned(&inner.db, &video_id, &claims.user_id).await?.is_none() {
        return Err(AppError::NotFound("Video not found".to_string()));
    }

    if let Some(storage) = &inner.storage {
        if let Err(e) = storage.remove(&video_object_path(&video_id)).await {
            tracing::warn!(video_id = %video_id, error = %e, "Storage delete failed, removing row anyway");
        }
    }

    let deleted = videos::delete_owned(&inner.db, &video_id, &claims.user_id).await?;
    if deleted == 0 {
        return Err(AppError::NotFound("Video not found".to_string()));
    }

    metrics::counter!("videos_deleted_total").increment(1);
    tracing::info!(video_id = %video_id, "Video deleted");
    Ok(Json(json!({ "success": true })))
}

#[tracing::instrument(name = "Set video visibility", skip(inner, claims, payload), fields(user_id = %claims.user_id))]
pub async fn set_visibility(
    State(inner): State<InnerState>,
    Extension(claims): Extension<Claims>,
    Path(video_id): Path<String>,
    Json(payload): Json<VisibilityPayload>,
) -> Result<Json<ApiResponse<Video>>, AppError> {
    let video = videos::set_visibility(&inner.db, &video_id, &claims.user_id, payload.is_public)
        .await?
        .ok_or_else(|| AppError::NotFound("Video not found".to_string()))?;

    tracing::info!(video_id = %video.id, is_public = video.is_public, "Visibility updated");
    Ok(Json(ApiResponse::success(video)))
}
