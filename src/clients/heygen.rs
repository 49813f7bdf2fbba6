//! HTTP client for the HeyGen video generation API.

use std::fmt;

use bytes::Bytes;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::{AvatarStyle, BackgroundKind};
use crate::config::HeyGenSettings;
use crate::errors::AppError;

/// `code` value HeyGen uses for a successful status lookup.
const STATUS_OK_CODE: i64 = 100;

#[derive(Clone, Debug)]
pub struct HeyGenClient {
    http_client: Client,
    base_url: String,
    api_key: Secret<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub script: String,
    pub avatar_id: String,
    pub avatar_style: AvatarStyle,
    pub voice_id: String,
    pub background_kind: BackgroundKind,
    pub background_value: String,
}

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    video_inputs: Vec<VideoInput<'a>>,
    dimension: Dimension,
    aspect_ratio: &'static str,
}

#[derive(Debug, Serialize)]
struct VideoInput<'a> {
    character: Character<'a>,
    voice: VoiceInput<'a>,
    background: BackgroundInput<'a>,
}

#[derive(Debug, Serialize)]
struct Character<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    avatar_id: &'a str,
    avatar_style: AvatarStyle,
}

#[derive(Debug, Serialize)]
struct VoiceInput<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    input_text: &'a str,
    voice_id: &'a str,
}

#[derive(Debug, Serialize)]
struct BackgroundInput<'a> {
    #[serde(rename = "type")]
    kind: BackgroundKind,
    value: &'a str,
}

#[derive(Debug, Serialize)]
struct Dimension {
    width: u32,
    height: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    data: Option<GenerateData>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct GenerateData {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<VideoStatusReport>,
}

/// Provider vocabulary for a generation job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoStatus {
    Pending,
    Processing,
    Waiting,
    Completed,
    Failed,
    #[serde(untagged)]
    Unknown(String),
}

impl VideoStatus {
    pub fn is_terminal(&self) -> bool {
        Self::TERMINAL.contains(&self.as_str())
    }

    pub fn as_str(&self) -> &str {
        match self {
            VideoStatus::Pending => "pending",
            VideoStatus::Processing => "processing",
            VideoStatus::Waiting => "waiting",
            VideoStatus::Completed => "completed",
            VideoStatus::Failed => "failed",
            VideoStatus::Unknown(other) => other,
        }
    }

    /// Stored statuses that need no further polling. Anything else, including
    /// statuses we don't recognise, is still in flight.
    pub const TERMINAL: [&'static str; 2] = ["completed", "failed"];
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoStatusReport {
    pub status: VideoStatus,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl VideoStatusReport {
    /// HeyGen reports failures either as a string or as `{code, message, detail}`.
    pub fn error_message(&self) -> Option<String> {
        match self.error.as_ref()? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => other
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| Some(other.to_string())),
        }
    }
}

impl HeyGenClient {
    pub fn new(settings: &HeyGenSettings) -> Self {
        Self {
            http_client: Client::new(),
            base_url: settings.base_url.clone(),
            api_key: settings.api_key.clone(),
        }
    }

    /// Submits a generation job and returns the provider's video id.
    #[tracing::instrument(
        name = "Request video generation",
        skip(self, request),
        fields(avatar_id = %request.avatar_id, voice_id = %request.voice_id, script_length = request.script.len())
    )]
    pub async fn generate_video(&self, request: &GenerationRequest) -> Result<String, AppError> {
        let url = format!("{}/v2/video/generate", self.base_url);
        let body = build_generate_body(request);

        tracing::debug!("Sending generation request to HeyGen");
        let response = self
            .http_client
            .post(&url)
            .header("X-Api-Key", self.api_key.expose_secret())
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %error_text, "HeyGen generate request failed");
            return Err(AppError::ExternalService(anyhow::anyhow!(
                "API request failed: {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown Status")
            )));
        }

        let parsed: GenerateResponse = response.json().await?;
        match parsed.data.and_then(|d| d.video_id) {
            Some(video_id) => {
                tracing::info!(video_id = %video_id, "HeyGen accepted generation job");
                Ok(video_id)
            }
            None => {
                let reason = match parsed.error {
                    Some(Value::String(s)) => s,
                    Some(Value::Null) | None => "Failed to get video_id".to_string(),
                    Some(other) => other.to_string(),
                };
                tracing::error!(reason = %reason, "HeyGen response carried no video_id");
                Err(AppError::ExternalService(anyhow::anyhow!(reason)))
            }
        }
    }

    #[tracing::instrument(name = "Fetch video status", skip(self))]
    pub async fn video_status(&self, video_id: &str) -> Result<VideoStatusReport, AppError> {
        let url = format!("{}/v1/video_status.get", self.base_url);

        let response = self
            .http_client
            .get(&url)
            .query(&[("video_id", video_id)])
            .header("X-Api-Key", self.api_key.expose_secret())
            .send()
            .await?;

        let parsed: StatusResponse = response.json().await?;
        if parsed.code != STATUS_OK_CODE {
            let message = parsed.message.unwrap_or_else(|| "API request failed".to_string());
            tracing::error!(code = parsed.code, message = %message, "HeyGen status lookup failed");
            return Err(AppError::ExternalService(anyhow::anyhow!(message)));
        }

        let report = parsed.data.ok_or_else(|| {
            AppError::ExternalService(anyhow::anyhow!("Status response carried no data"))
        })?;
        tracing::debug!(status = %report.status, "HeyGen status received");
        Ok(report)
    }

    /// Downloads a rendered video from the provider's result URL.
    #[tracing::instrument(name = "Download rendered video", skip(self, url))]
    pub async fn download_video(&self, url: &str) -> Result<Bytes, AppError> {
        let response = self.http_client.get(url).send().await?.error_for_status()?;
        let bytes = response.bytes().await?;
        tracing::debug!(size = bytes.len(), "Downloaded rendered video");
        Ok(bytes)
    }
}

fn build_generate_body(request: &GenerationRequest) -> GenerateBody<'_> {
    GenerateBody {
        video_inputs: vec![VideoInput {
            character: Character {
                kind: "avatar",
                avatar_id: &request.avatar_id,
                avatar_style: request.avatar_style,
            },
            voice: VoiceInput {
                kind: "text",
                input_text: &request.script,
                voice_id: &request.voice_id,
            },
            background: BackgroundInput {
                kind: request.background_kind,
                value: &request.background_value,
            },
        }],
        dimension: Dimension {
            width: 720,
            height: 1280,
        },
        aspect_ratio: "9:16",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> HeyGenClient {
        HeyGenClient::new(&HeyGenSettings {
            base_url: server.uri(),
            api_key: Secret::new("heygen-key".into()),
        })
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            script: "Hello from the script".into(),
            avatar_id: "Daisy-inskirt-20220818".into(),
            avatar_style: AvatarStyle::Normal,
            voice_id: "2d5b0e6cf36f460aa7fc47e3eee4ba54".into(),
            background_kind: BackgroundKind::Color,
            background_value: "#008000".into(),
        }
    }

    #[test]
    fn generate_body_is_portrait_720p() {
        let request = request();
        let body = serde_json::to_value(build_generate_body(&request)).unwrap();

        assert_eq!(body["dimension"], json!({"width": 720, "height": 1280}));
        assert_eq!(body["aspect_ratio"], "9:16");
        let input = &body["video_inputs"][0];
        assert_eq!(input["character"]["type"], "avatar");
        assert_eq!(input["character"]["avatar_style"], "normal");
        assert_eq!(input["voice"]["type"], "text");
        assert_eq!(input["voice"]["input_text"], "Hello from the script");
        assert_eq!(input["background"], json!({"type": "color", "value": "#008000"}));
    }

    #[test]
    fn status_vocabulary() {
        let parse = |s: &str| serde_json::from_value::<VideoStatus>(json!(s)).unwrap();
        assert_eq!(parse("completed"), VideoStatus::Completed);
        assert_eq!(parse("waiting"), VideoStatus::Waiting);
        assert_eq!(parse("rendering"), VideoStatus::Unknown("rendering".into()));
        assert!(parse("failed").is_terminal());
        assert!(!parse("processing").is_terminal());
        assert!(!parse("rendering").is_terminal());
        assert_eq!(parse("rendering").as_str(), "rendering");
    }

    #[test]
    fn stored_status_round_trips_terminality() {
        // What the sync query skips must match what `is_terminal` reports
        // once the status has been written to and read back from a row.
        for raw in ["pending", "processing", "waiting", "completed", "failed", "rendering", ""] {
            let status = serde_json::from_value::<VideoStatus>(json!(raw)).unwrap();
            assert_eq!(
                VideoStatus::TERMINAL.contains(&status.as_str()),
                status.is_terminal(),
                "{}",
                raw
            );
            assert_eq!(status.as_str(), raw);
        }
        assert!(!VideoStatus::Unknown("rendering".into()).is_terminal());
    }

    #[test]
    fn error_message_accepts_both_shapes() {
        let report = |error: Value| VideoStatusReport {
            status: VideoStatus::Failed,
            video_url: None,
            thumbnail_url: None,
            error: Some(error),
        };
        assert_eq!(report(json!("boom")).error_message().as_deref(), Some("boom"));
        assert_eq!(
            report(json!({"code": 40001, "message": "avatar unavailable"}))
                .error_message()
                .as_deref(),
            Some("avatar unavailable")
        );
        assert_eq!(report(Value::Null).error_message(), None);
    }

    #[tokio::test]
    async fn generate_video_returns_provider_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/video/generate"))
            .and(header("X-Api-Key", "heygen-key"))
            .and(body_partial_json(json!({"aspect_ratio": "9:16"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": null,
                "data": {"video_id": "vid_123"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let video_id = client(&server).generate_video(&request()).await.unwrap();
        assert_eq!(video_id, "vid_123");
    }

    #[tokio::test]
    async fn generate_video_surfaces_http_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/video/generate"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&server)
            .await;

        let err = client(&server).generate_video(&request()).await.unwrap_err();
        assert!(matches!(err, AppError::ExternalService(_)));
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn generate_video_without_id_uses_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/video/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": "avatar not found",
                "data": null
            })))
            .mount(&server)
            .await;

        let err = client(&server).generate_video(&request()).await.unwrap_err();
        assert!(err.to_string().contains("avatar not found"));
    }

    #[tokio::test]
    async fn video_status_passes_report_through() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/video_status.get"))
            .and(query_param("video_id", "vid_123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 100,
                "message": "Success",
                "data": {
                    "status": "completed",
                    "video_url": "https://cdn.heygen.test/vid_123.mp4",
                    "thumbnail_url": "https://cdn.heygen.test/vid_123.jpg",
                    "error": null
                }
            })))
            .mount(&server)
            .await;

        let report = client(&server).video_status("vid_123").await.unwrap();
        assert_eq!(report.status, VideoStatus::Completed);
        assert_eq!(report.video_url.as_deref(), Some("https://cdn.heygen.test/vid_123.mp4"));
    }

    #[tokio::test]
    async fn video_status_rejects_non_success_code() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/video_status.get"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 40014,
                "message": "video not found",
                "data": null
            })))
            .mount(&server)
            .await;

        let err = client(&server).video_status("missing").await.unwrap_err();
        assert!(err.to_string().contains("video not found"));
    }
}
