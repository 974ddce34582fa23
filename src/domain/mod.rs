//! Data structures shared across the pipeline.

pub mod job;
pub mod media;
pub mod prompt;

pub use job::{JobState, VideoId};
pub use media::{AudioArtifact, VideoFile, AUDIO_FILE_NAME, AUDIO_MEDIA_TYPE};
pub use prompt::PromptTemplate;
