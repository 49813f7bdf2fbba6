//! Object storage for rendered videos, spoken over the managed backend's
//! storage REST API.

use bytes::Bytes;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde_json::json;

use crate::config::StorageSettings;
use crate::errors::AppError;

#[derive(Clone, Debug)]
pub struct StorageClient {
    http_client: Client,
    base_url: String,
    service_key: Secret<String>,
    bucket: String,
}

/// Object key for a video's rendered file.
pub fn video_object_path(video_id: &str) -> String {
    format!("{}.mp4", video_id)
}

impl StorageClient {
    pub fn new(settings: &StorageSettings) -> Self {
        Self {
            http_client: Client::new(),
            base_url: settings.base_url.clone(),
            service_key: settings.service_key.clone(),
            bucket: settings.bucket.clone(),
        }
    }

    pub fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, path
        )
    }

    /// True when `url` already points into our bucket.
    pub fn owns_url(&self, url: &str) -> bool {
        url.starts_with(&format!("{}/storage/v1/object/public/{}/", self.base_url, self.bucket))
    }

    #[tracing::instrument(name = "Upload object to storage", skip(self, body), fields(bucket = %self.bucket, size = body.len()))]
    pub async fn upload(&self, path: &str, body: Bytes, content_type: &str) -> Result<String, AppError> {
        let url = format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, path);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(self.service_key.expose_secret())
            .header("Content-Type", content_type)
            .header("x-upsert", "true")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalService(anyhow::anyhow!(
                "Storage upload failed: {} {}",
                status.as_u16(),
                text
            )));
        }

        tracing::info!(path = %path, "Stored object");
        Ok(self.public_url(path))
    }

    #[tracing::instrument(name = "Remove object from storage", skip(self), fields(bucket = %self.bucket))]
    pub async fn remove(&self, path: &str) -> Result<(), AppError> {
        let url = format!("{}/storage/v1/object/{}", self.base_url, self.bucket);
        let response = self
            .http_client
            .delete(&url)
            .bearer_auth(self.service_key.expose_secret())
            .json(&json!({ "prefixes": [path] }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalService(anyhow::anyhow!(
                "Storage removal failed: {} {}",
                status.as_u16(),
                text
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> StorageClient {
        StorageClient::new(&StorageSettings {
            base_url: server.uri(),
            service_key: Secret::new("service-key".into()),
            bucket: "videos".into(),
        })
    }

    #[test]
    fn object_path_and_public_url() {
        let storage = StorageClient::new(&StorageSettings {
            base_url: "https://proj.storage.test".into(),
            service_key: Secret::new("k".into()),
            bucket: "videos".into(),
        });
        let url = storage.public_url(&video_object_path("vid_1"));
        assert_eq!(url, "https://proj.storage.test/storage/v1/object/public/videos/vid_1.mp4");
        assert!(storage.owns_url(&url));
        assert!(!storage.owns_url("https://cdn.heygen.test/vid_1.mp4"));
    }

    #[tokio::test]
    async fn upload_returns_public_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/videos/vid_1.mp4"))
            .and(header("authorization", "Bearer service-key"))
            .and(header("x-upsert", "true"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let url = client(&server)
            .upload("vid_1.mp4", Bytes::from_static(b"mp4"), "video/mp4")
            .await
            .unwrap();
        assert_eq!(url, format!("{}/storage/v1/object/public/videos/vid_1.mp4", server.uri()));
    }

    #[tokio::test]
    async fn remove_sends_prefixes() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/storage/v1/object/videos"))
            .and(body_json(serde_json::json!({"prefixes": ["vid_1.mp4"]})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).remove("vid_1.mp4").await.unwrap();
    }

    #[tokio::test]
    async fn failed_removal_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        assert!(client(&server).remove("vid_1.mp4").await.is_err());
    }
}
