//! Submitting scripts to the provider and polling their status.

use axum::extract::{Query, State};
use axum::{Extension, Json};
use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::common::limits::{release_video_slot, reserve_video_slot};
use crate::api::common::VideoIdQuery;
use crate::api::v1::auth::Claims;
use crate::api::v1::entities::videos::{self, NewVideo, StatusUpdate};
use crate::catalog::{self, AvatarStyle, BackgroundKind};
use crate::clients::heygen::{GenerationRequest, VideoStatus, VideoStatusReport};
use crate::clients::storage::video_object_path;
use crate::clients::{HeyGenClient, StorageClient};
use crate::errors::AppError;
use crate::InnerState;

const MAX_TITLE_CHARS: usize = 80;

#[derive(Debug, Deserialize)]
pub struct GenerateVideoPayload {
    text: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    avatar: Option<AvatarChoice>,
    #[serde(default)]
    voice: Option<VoiceChoice>,
    #[serde(default)]
    background: Option<BackgroundChoice>,
}

#[derive(Debug, Deserialize)]
pub struct AvatarChoice {
    id: String,
    #[serde(default)]
    style: AvatarStyle,
}

#[derive(Debug, Deserialize)]
pub struct VoiceChoice {
    id: String,
}

#[derive(Debug, Deserialize)]
pub struct BackgroundChoice {
    #[serde(rename = "type")]
    kind: BackgroundKind,
    value: String,
}

#[derive(Debug, Serialize)]
pub struct GenerateVideoResponse {
    pub video_id: String,
}

#[derive(Debug, Serialize)]
pub struct VideoStatusResponse {
    pub status: VideoStatus,
    pub video_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub error: Option<Value>,
}

/// Validated generation input plus the title we store with the row.
#[derive(Debug)]
struct PreparedGeneration {
    title: String,
    request: GenerationRequest,
}

fn prepare(payload: GenerateVideoPayload) -> Result<PreparedGeneration, AppError> {
    let script = payload.text.trim();
    if script.is_empty() {
        return Err(AppError::Validation("Please enter a script".to_string()));
    }

    let (avatar, avatar_style) = match &payload.avatar {
        Some(choice) => (
            catalog::find_avatar(&choice.id)
                .ok_or_else(|| AppError::Validation(format!("Unknown avatar: {}", choice.id)))?,
            choice.style,
        ),
        None => (catalog::default_avatar(), AvatarStyle::default()),
    };

    let voice = match &payload.voice {
        Some(choice) => catalog::find_voice(&choice.id)
            .ok_or_else(|| AppError::Validation(format!("Unknown voice: {}", choice.id)))?,
        None => catalog::default_voice(),
    };

    let (background_kind, background_value) = match payload.background {
        Some(bg) if !bg.value.trim().is_empty() => (bg.kind, bg.value),
        _ => (
            catalog::DEFAULT_BACKGROUND.kind,
            catalog::DEFAULT_BACKGROUND.value.to_string(),
        ),
    };

    let title = payload
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| script.chars().take(MAX_TITLE_CHARS).collect());

    Ok(PreparedGeneration {
        title,
        request: GenerationRequest {
            script: script.to_string(),
            avatar_id: avatar.id.to_string(),
            avatar_style,
            voice_id: voice.id.to_string(),
            background_kind,
            background_value,
        },
    })
}

/// Submits the job, handing the reserved slot back when the provider refuses it.
async fn submit_or_release<F, Fut>(
    heygen: &HeyGenClient,
    request: &GenerationRequest,
    release: F,
) -> Result<String, AppError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(), AppError>>,
{
    match heygen.generate_video(request).await {
        Ok(video_id) => Ok(video_id),
        Err(e) => {
            if let Err(release_err) = release().await {
                tracing::error!(error = %release_err, "Failed to release video slot");
            }
            metrics::counter!("videos_generation_failed_total").increment(1);
            Err(e)
        }
    }
}

/// The provider job keeps running without a row, so the id has to reach the
/// logs and the caller.
fn orphaned_video_error(video_id: &str, err: AppError) -> AppError {
    tracing::error!(video_id = %video_id, error = %err, "Provider accepted video but the row was not saved");
    AppError::Database(
        anyhow::Error::new(err).context(format!("Video {} was accepted but could not be saved", video_id)),
    )
}

#[tracing::instrument(name = "Generate video", skip(inner, claims, payload), fields(user_id = %claims.user_id))]
pub async fn generate_video(
    State(inner): State<InnerState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<GenerateVideoPayload>,
) -> Result<Json<GenerateVideoResponse>, AppError> {
    let prepared = prepare(payload)?;

    let usage = reserve_video_slot(&inner.db, &claims.user_id).await?;
    tracing::debug!(used = usage.used, limit = usage.limit, "Slot reserved, calling provider");

    let video_id = submit_or_release(&inner.heygen, &prepared.request, || {
        release_video_slot(&inner.db, &claims.user_id)
    })
    .await?;

    videos::insert(
        &inner.db,
        &NewVideo {
            id: &video_id,
            user_id: &claims.user_id,
            title: &prepared.title,
            script: &prepared.request.script,
            avatar_id: &prepared.request.avatar_id,
            voice_id: &prepared.request.voice_id,
        },
    )
    .await
    .map_err(|e| orphaned_video_error(&video_id, e))?;

    metrics::counter!("videos_generation_requested_total").increment(1);
    tracing::info!(video_id = %video_id, "Video generation started");
    Ok(Json(GenerateVideoResponse { video_id }))
}

#[tracing::instrument(name = "Check video status", skip(inner, claims, query), fields(user_id = %claims.user_id))]
pub async fn video_status(
    State(inner): State<InnerState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<VideoIdQuery>,
) -> Result<Json<VideoStatusResponse>, AppError> {
    let video_id = query.require()?;
    let report = inner.heygen.video_status(&video_id).await?;

    let mut video_url = report.video_url.clone();
    if videos::find_owned(&inner.db, &video_id, &claims.user_id).await?.is_some() {
        if let Some(stored) = record_status(&inner, &video_id, &report).await? {
            video_url = stored.video_url.or(video_url);
        }
    }

    Ok(Json(VideoStatusResponse {
        status: report.status,
        video_url,
        thumbnail_url: report.thumbnail_url,
        error: report.error,
    }))
}

/// Which URL to persist for a report. Completed videos are copied into our
/// bucket when storage is configured; a failed copy falls back to the
/// provider URL, and a row already pointing into the bucket keeps its URL
/// (`None` leaves the column untouched).
pub async fn video_url_to_store(
    heygen: &HeyGenClient,
    storage: Option<&StorageClient>,
    video_id: &str,
    report: &VideoStatusReport,
    current_url: Option<&str>,
) -> Option<String> {
    let provider_url = report.video_url.as_deref()?;
    let storage = match storage {
        Some(storage) if report.status == VideoStatus::Completed => storage,
        _ => return Some(provider_url.to_string()),
    };

    if current_url.is_some_and(|url| storage.owns_url(url)) {
        tracing::debug!(video_id = %video_id, "Video already in storage");
        return None;
    }

    let copied = async {
        let bytes = heygen.download_video(provider_url).await?;
        storage.upload(&video_object_path(video_id), bytes, "video/mp4").await
    }
    .await;

    match copied {
        Ok(url) => Some(url),
        Err(e) => {
            tracing::error!(
                video_id = %video_id,
                error = %e,
                "Failed to copy video into storage, keeping provider URL"
            );
            Some(provider_url.to_string())
        }
    }
}

/// Persists a provider report onto the row.
pub async fn record_status(
    inner: &InnerState,
    video_id: &str,
    report: &VideoStatusReport,
) -> Result<Option<videos::Video>, AppError> {
    let current_url = if report.status == VideoStatus::Completed && inner.storage.is_some() {
        videos::find(&inner.db, video_id).await?.and_then(|v| v.video_url)
    } else {
        None
    };

    let video_url = video_url_to_store(
        &inner.heygen,
        inner.storage.as_ref(),
        video_id,
        report,
        current_url.as_deref(),
    )
    .await;
    let error_message = report.error_message();

    videos::apply_status(
        &inner.db,
        video_id,
        &StatusUpdate {
            status: &report.status,
            video_url: video_url.as_deref(),
            thumbnail_url: report.thumbnail_url.as_deref(),
            error_message: error_message.as_deref(),
        },
    )
    .await
}
