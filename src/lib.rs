//! vidscribe - video-to-transcription pipeline with streamed AI completions
//!
//! Transcodes a local video into a compact audio track through a
//! lazily-loaded media engine, uploads it for transcription, and streams
//! a templated text completion back chunk by chunk.
//!
//! # Architecture
//!
//! The pipeline is a single-flight state machine:
//! - The engine is loaded at most once per process; concurrent first
//!   callers share one load
//! - A job moves strictly forward through
//!   `waiting → converting → uploading → generating → success`
//! - Failures land in a tagged `failed` state instead of stalling
//! - Completion streams carry generation tokens so a newer request
//!   deterministically supersedes an older one
//!
//! # Modules
//!
//! - `engine`: media engine with a virtual staging filesystem
//! - `pipeline`: transcoding and upload orchestration
//! - `api`: backend client and the streaming completion consumer
//! - `domain`: shared data structures
//! - `cli`: command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Upload a video and request its transcription
//! vidscribe submit talk.mp4 --prompt "rust, async, tokio"
//!
//! # Stream a completion over the transcription
//! vidscribe complete <video-id> --prompt-id summary
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod engine;
pub mod pipeline;

// Re-export main types at crate root for convenience
pub use api::{ApiClient, CompletionRequest, CompletionStream, CompletionTransport, VideoApi};
pub use domain::{AudioArtifact, JobState, PromptTemplate, VideoFile, VideoId};
pub use engine::{EngineHandle, EngineResources, MediaEngine, TranscodeBackend};
pub use pipeline::{JobError, TranscodePipeline, UploadOrchestrator};
