//! Backend API client.
//!
//! Wraps the three non-streaming endpoints: video ingestion (multipart),
//! transcription request, and the prompt catalog. The streaming
//! completion endpoint lives in `completion`.

pub mod completion;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::domain::{AudioArtifact, PromptTemplate, VideoId};

pub use completion::{
    CompletionError, CompletionRequest, CompletionStream, CompletionTransport,
    HttpCompletionTransport,
};

/// Errors from backend requests
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Backend operations the orchestrator depends on.
#[async_trait]
pub trait VideoApi: Send + Sync {
    /// Upload an audio artifact; returns the server-assigned video id
    async fn upload_audio(&self, artifact: &AudioArtifact) -> Result<VideoId, ApiError>;

    /// Request a transcription for an uploaded video.
    ///
    /// Only the call's completion matters; the response body is unused.
    async fn request_transcription(
        &self,
        video_id: &VideoId,
        prompt: Option<&str>,
    ) -> Result<(), ApiError>;

    /// Fetch the prompt template catalog
    async fn list_prompts(&self) -> Result<Vec<PromptTemplate>, ApiError>;
}

/// Ingestion response: `{ "video": { "id": "..." } }`, extra fields tolerated
#[derive(Debug, Deserialize)]
struct UploadResponse {
    video: UploadedVideo,
}

#[derive(Debug, Deserialize)]
struct UploadedVideo {
    id: VideoId,
}

#[derive(Debug, Serialize)]
struct TranscriptionBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    prompt: Option<&'a str>,
}

/// HTTP client for the backend API.
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl VideoApi for ApiClient {
    async fn upload_audio(&self, artifact: &AudioArtifact) -> Result<VideoId, ApiError> {
        debug!(bytes = artifact.size(), "Uploading audio artifact");

        let part = Part::bytes(artifact.bytes.clone())
            .file_name(artifact.file_name)
            .mime_str(artifact.media_type)?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(format!("{}/videos", self.base_url))
            .multipart(form)
            .send()
            .await?;

        let parsed: UploadResponse = Self::check(response).await?.json().await?;
        Ok(parsed.video.id)
    }

    async fn request_transcription(
        &self,
        video_id: &VideoId,
        prompt: Option<&str>,
    ) -> Result<(), ApiError> {
        debug!(video_id = %video_id, "Requesting transcription");

        let response = self
            .client
            .post(format!("{}/videos/{}/transcription", self.base_url, video_id))
            .json(&TranscriptionBody { prompt })
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }

    async fn list_prompts(&self) -> Result<Vec<PromptTemplate>, ApiError> {
        let response = self
            .client
            .get(format!("{}/prompts", self.base_url))
            .send()
            .await?;

        let prompts = Self::check(response).await?.json().await?;
        Ok(prompts)
    }
}
