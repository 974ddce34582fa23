//! Pipeline stages: transcoding and upload orchestration.

pub mod orchestrator;
pub mod transcode;

pub use orchestrator::{JobError, UploadOrchestrator};
pub use transcode::{ConvertError, TranscodePipeline};
