//! Job state machine vocabulary.
//!
//! A job moves strictly forward through `waiting → converting → uploading
//! → generating → success`. Any stage error lands in `failed`, which can
//! only return to `waiting` through an explicit reset.

use serde::{Deserialize, Serialize};
use std::fmt;

/// State of the single upload job a session may have in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum JobState {
    /// No job in flight; submissions are accepted
    Waiting,

    /// Transcoding the input video to audio
    Converting,

    /// Uploading the audio artifact to the backend
    Uploading,

    /// Waiting for the transcription request to be accepted
    Generating,

    /// Job finished; the video id has been handed to the caller
    Success,

    /// Job failed with a human-readable reason
    Failed { reason: String },
}

impl JobState {
    /// Whether a new submission may start from this state
    pub fn accepts_submission(&self) -> bool {
        matches!(self, Self::Waiting)
    }

    /// Whether the job has finished, successfully or not
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed { .. })
    }

    /// Short label for progress display
    pub fn label(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Converting => "converting",
            Self::Uploading => "uploading",
            Self::Generating => "generating",
            Self::Success => "success",
            Self::Failed { .. } => "failed",
        }
    }
}

impl Default for JobState {
    fn default() -> Self {
        Self::Waiting
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed { reason } => write!(f, "failed: {}", reason),
            other => f.write_str(other.label()),
        }
    }
}

/// Server-assigned identifier for an uploaded video.
///
/// Only ever constructed from an ingestion response; the client never
/// synthesizes one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(String);

impl VideoId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
