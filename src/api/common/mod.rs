//! Shared pieces used by every API handler.

pub mod limits;
pub mod middleware;
pub mod tracing;
pub mod utils;

use serde::{Deserialize, Serialize};

/// Standard API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }
}

/// `?videoId=` query used by the status and delete endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoIdQuery {
    pub video_id: Option<String>,
}

impl VideoIdQuery {
    pub fn require(self) -> Result<String, crate::errors::AppError> {
        self.video_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| crate::errors::AppError::Validation("Video ID is required".to_string()))
    }
}
