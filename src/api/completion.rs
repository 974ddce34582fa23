//! Streaming completion consumer.
//!
//! One stream is active at a time. Each `run` claims a fresh generation
//! token; chunk appends tagged with a stale generation are discarded, so
//! a newer run deterministically supersedes an older one mid-stream
//! without any upstream cancellation signal.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::domain::VideoId;

/// Errors from a completion stream
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Stream was superseded by a newer request")]
    Superseded,
}

/// Body of a completion request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    pub video_id: VideoId,
    pub temperature: f32,
    pub prompt: String,
}

/// Raw chunk stream produced by a transport
pub type ChunkStream = BoxStream<'static, Result<Vec<u8>, CompletionError>>;

/// Transport seam for the streaming completion endpoint.
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    async fn open(&self, request: &CompletionRequest) -> Result<ChunkStream, CompletionError>;
}

/// Production transport: POST to `/ai/complete`, consume the chunked body.
pub struct HttpCompletionTransport {
    base_url: String,
    client: reqwest::Client,
}

impl HttpCompletionTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl CompletionTransport for HttpCompletionTransport {
    async fn open(&self, request: &CompletionRequest) -> Result<ChunkStream, CompletionError> {
        let response = self
            .client
            .post(format!("{}/ai/complete", self.base_url))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(CompletionError::from))
            .boxed())
    }
}

/// Buffer contents tagged with the generation that owns them
struct BufferState {
    generation: u64,
    bytes: Vec<u8>,
}

/// Accumulating consumer of one completion stream at a time.
pub struct CompletionStream {
    transport: Arc<dyn CompletionTransport>,
    generation: AtomicU64,
    busy: AtomicBool,
    buffer: Mutex<BufferState>,
}

impl CompletionStream {
    pub fn new(transport: Arc<dyn CompletionTransport>) -> Self {
        Self {
            transport,
            generation: AtomicU64::new(0),
            busy: AtomicBool::new(false),
            buffer: Mutex::new(BufferState {
                generation: 0,
                bytes: Vec::new(),
            }),
        }
    }

    /// Whether a stream is currently active; consumers gate resubmission on this
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Text accumulated so far for the newest stream
    pub async fn snapshot(&self) -> String {
        let buf = self.buffer.lock().await;
        String::from_utf8_lossy(&buf.bytes).into_owned()
    }

    /// Raw bytes accumulated so far; chunk boundaries may split characters
    pub async fn snapshot_bytes(&self) -> Vec<u8> {
        self.buffer.lock().await.bytes.clone()
    }

    /// Drive one completion stream to the end.
    ///
    /// Resets the buffer, appends each chunk in arrival order and returns
    /// the accumulated text. A newer `run` supersedes this one: its
    /// remaining appends are dropped and it resolves with `Superseded`.
    #[instrument(skip_all, fields(video_id = %request.video_id))]
    pub async fn run(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        {
            let mut buf = self.buffer.lock().await;
            buf.generation = generation;
            buf.bytes.clear();
        }
        self.busy.store(true, Ordering::SeqCst);

        let mut stream = match self.transport.open(request).await {
            Ok(stream) => stream,
            Err(e) => {
                self.finish_if_current(generation);
                return Err(e);
            }
        };

        let mut accumulated = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    self.finish_if_current(generation);
                    return Err(e);
                }
            };

            let mut buf = self.buffer.lock().await;
            if buf.generation != generation {
                debug!("Dropping chunk from superseded stream");
                return Err(CompletionError::Superseded);
            }
            buf.bytes.extend_from_slice(&chunk);
            accumulated.extend_from_slice(&chunk);
        }

        if self.buffer.lock().await.generation != generation {
            return Err(CompletionError::Superseded);
        }

        self.finish_if_current(generation);
        Ok(String::from_utf8_lossy(&accumulated).into_owned())
    }

    /// Clear the busy flag unless a newer stream has taken over
    fn finish_if_current(&self, generation: u64) {
        if self.generation.load(Ordering::SeqCst) == generation {
            self.busy.store(false, Ordering::SeqCst);
        }
    }
}
