use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Serialize;

use crate::api::v1::auth::Claims;
use crate::api::v1::entities::interactions::{self, Interaction};
use crate::api::v1::entities::videos;
use crate::errors::AppError;
use crate::InnerState;

#[derive(Debug, Serialize)]
pub struct InteractionState {
    pub liked: bool,
    pub saved: bool,
}

#[derive(Debug, Serialize)]
pub struct LikeState {
    pub liked: bool,
}

#[derive(Debug, Serialize)]
pub struct SaveState {
    pub saved: bool,
}

/// Private videos of other users answer exactly like missing ones.
async fn ensure_video(inner: &InnerState, claims: &Claims, video_id: &str) -> Result<(), AppError> {
    match videos::find_visible(&inner.db, video_id, &claims.user_id).await? {
        Some(_) => Ok(()),
        None => Err(AppError::NotFound("Video not found".to_string())),
    }
}

#[tracing::instrument(name = "Get interactions", skip(inner, claims), fields(user_id = %claims.user_id))]
pub async fn get_interactions(
    State(inner): State<InnerState>,
    Extension(claims): Extension<Claims>,
    Path(video_id): Path<String>,
) -> Result<Json<InteractionState>, AppError> {
    ensure_video(&inner, &claims, &video_id).await?;
    let (liked, saved) = tokio::try_join!(
        interactions::is_set(&inner.db, Interaction::Like, &claims.user_id, &video_id),
        interactions::is_set(&inner.db, Interaction::Save, &claims.user_id, &video_id),
    )?;
    Ok(Json(InteractionState { liked, saved }))
}

async fn toggle(
    inner: &InnerState,
    claims: &Claims,
    video_id: &str,
    kind: Interaction,
    on: bool,
) -> Result<(), AppError> {
    ensure_video(inner, claims, video_id).await?;
    interactions::set(&inner.db, kind, &claims.user_id, video_id, on).await?;
    tracing::debug!(video_id = %video_id, ?kind, on, "Interaction updated");
    Ok(())
}

pub async fn like(
    State(inner): State<InnerState>,
    Extension(claims): Extension<Claims>,
    Path(video_id): Path<String>,
) -> Result<Json<LikeState>, AppError> {
    toggle(&inner, &claims, &video_id, Interaction::Like, true).await?;
    Ok(Json(LikeState { liked: true }))
}

pub async fn unlike(
    State(inner): State<InnerState>,
    Extension(claims): Extension<Claims>,
    Path(video_id): Path<String>,
) -> Result<Json<LikeState>, AppError> {
    toggle(&inner, &claims, &video_id, Interaction::Like, false).await?;
    Ok(Json(LikeState { liked: false }))
}

pub async fn save(
    State(inner): State<InnerState>,
    Extension(claims): Extension<Claims>,
    Path(video_id): Path<String>,
) -> Result<Json<SaveState>, AppError> {
    toggle(&inner, &claims, &video_id, Interaction::Save, true).await?;
    Ok(Json(SaveState { saved: true }))
}

pub async fn unsave(
    State(inner): State<InnerState>,
    Extension(claims): Extension<Claims>,
    Path(video_id): Path<String>,
) -> Result<Json<SaveState>, AppError> {
    toggle(&inner, &claims, &video_id, Interaction::Save, false).await?;
    Ok(Json(SaveState { saved: false }))
}

#[cfg(test)]
mod tests {
    use crate::api::v1::entities::videos::{self, NewVideo};
    use crate::test_support::{insert_user, request, response_json, state_with_pool, test_state};
    use axum::http::StatusCode;
    use sqlx::PgPool;

    #[tokio::test]
    async fn like_requires_session() {
        let app = crate::build_router(test_state());
        let (status, body) =
            response_json(app, request("PUT", "/api/videos/v1/like").empty()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Unauthorized");
    }

    #[tokio::test]
    async fn interactions_require_session() {
        let app = crate::build_router(test_state());
        let (status, _) =
            response_json(app, request("GET", "/api/videos/v1/interactions").empty()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[sqlx::test]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn others_private_videos_cannot_be_liked(db: PgPool) {
        insert_user(&db, "owner").await;
        insert_user(&db, "stranger").await;
        videos::insert(
            &db,
            &NewVideo {
                id: "vid_private",
                user_id: "owner",
                title: "Draft",
                script: "Draft",
                avatar_id: "avatar",
                voice_id: "voice",
            },
        )
        .await
        .unwrap();

        let app = crate::build_router(state_with_pool(db.clone(), "http://127.0.0.1:1", "http://127.0.0.1:1"));
        let (status, body) = response_json(
            app.clone(),
            request("PUT", "/api/videos/vid_private/like").authed("stranger").empty(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Video not found");

        let (missing, _) = response_json(
            app.clone(),
            request("PUT", "/api/videos/vid_nope/like").authed("stranger").empty(),
        )
        .await;
        assert_eq!(missing, status);

        let (status, body) = response_json(
            app,
            request("PUT", "/api/videos/vid_private/like").authed("owner").empty(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["liked"], true);
    }
}
