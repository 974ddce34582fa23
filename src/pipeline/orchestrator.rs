//! Upload job state machine.
//!
//! Sequences transcode → upload → transcription-request for a single job
//! and publishes every transition before the next stage begins. At most
//! one job is in flight: the claim from `waiting` to `converting` is
//! atomic, so re-entrant submissions are rejected rather than queued.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use crate::api::{ApiError, VideoApi};
use crate::domain::{JobState, VideoFile, VideoId};

use super::transcode::{ConvertError, TranscodePipeline};

/// Errors from job submission and control
#[derive(Debug, Error)]
pub enum JobError {
    #[error("A job is already in flight (state: {state})")]
    Busy { state: JobState },

    #[error("Job was superseded by a newer submission")]
    Superseded,

    #[error("Nothing to reset (state: {state})")]
    NotResettable { state: JobState },

    #[error("Conversion failed: {0}")]
    Convert(#[from] ConvertError),

    #[error("Backend request failed: {0}")]
    Api(#[from] ApiError),
}

/// Single-flight orchestrator for the upload pipeline.
pub struct UploadOrchestrator {
    pipeline: TranscodePipeline,
    api: Arc<dyn VideoApi>,
    state_tx: watch::Sender<JobState>,
    generation: AtomicU64,
}

impl UploadOrchestrator {
    pub fn new(pipeline: TranscodePipeline, api: Arc<dyn VideoApi>) -> Self {
        let (state_tx, _) = watch::channel(JobState::Waiting);
        Self {
            pipeline,
            api,
            state_tx,
            generation: AtomicU64::new(0),
        }
    }

    /// Current job state
    pub fn state(&self) -> JobState {
        self.state_tx.borrow().clone()
    }

    /// Subscribe to state transitions
    pub fn subscribe(&self) -> watch::Receiver<JobState> {
        self.state_tx.subscribe()
    }

    /// Return a terminal job to `waiting` so a new submission can start.
    pub fn reset(&self) -> Result<(), JobError> {
        let changed = self.state_tx.send_if_modified(|state| {
            if state.is_terminal() {
                *state = JobState::Waiting;
                true
            } else {
                false
            }
        });

        if changed {
            Ok(())
        } else {
            Err(JobError::NotResettable { state: self.state() })
        }
    }

    /// Abandon any in-flight job and reopen submissions.
    ///
    /// The stale job observes the bumped generation at its next stage
    /// boundary and bails without publishing further states.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.state_tx.send_replace(JobState::Waiting);
        info!("In-flight job cancelled");
    }

    /// Run one job: convert, upload, request transcription.
    ///
    /// Accepted only while the state is `waiting`. Returns the
    /// server-assigned video id on success; on failure the state moves to
    /// `failed` and the error propagates.
    #[instrument(skip_all, fields(file = %video.file_name))]
    pub async fn submit(
        &self,
        video: VideoFile,
        prompt: Option<String>,
    ) -> Result<VideoId, JobError> {
        // Atomic waiting → converting claim; holds even under re-entry.
        // The generation is claimed in the same step: no cancel or later
        // claim can land between the state transition and the snapshot.
        let mut job_generation = 0;
        let claimed = self.state_tx.send_if_modified(|state| {
            if state.accepts_submission() {
                *state = JobState::Converting;
                job_generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                true
            } else {
                false
            }
        });

        if !claimed {
            return Err(JobError::Busy { state: self.state() });
        }

        info!(size = video.size(), "Job accepted");

        match self
            .run_stages(&video, prompt.as_deref(), job_generation)
            .await
        {
            Ok(video_id) => {
                info!(video_id = %video_id, "Job finished");
                Ok(video_id)
            }
            Err(JobError::Superseded) => {
                warn!("Job superseded by a newer submission");
                Err(JobError::Superseded)
            }
            Err(e) => {
                if self.generation.load(Ordering::SeqCst) != job_generation {
                    warn!(error = %e, "Superseded job failed; dropping its state");
                    return Err(JobError::Superseded);
                }
                error!(error = %e, "Job failed");
                self.state_tx.send_replace(JobState::Failed {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        video: &VideoFile,
        prompt: Option<&str>,
        job_generation: u64,
    ) -> Result<VideoId, JobError> {
        // State is already `converting` and visible to observers
        let artifact = self.pipeline.convert(video).await?;

        self.advance(job_generation, JobState::Uploading)?;
        let video_id = self.api.upload_audio(&artifact).await?;

        self.advance(job_generation, JobState::Generating)?;
        self.api.request_transcription(&video_id, prompt).await?;

        self.advance(job_generation, JobState::Success)?;
        Ok(video_id)
    }

    /// Publish the next state unless this job has been superseded
    fn advance(&self, job_generation: u64, next: JobState) -> Result<(), JobError> {
        if self.generation.load(Ordering::SeqCst) != job_generation {
            return Err(JobError::Superseded);
        }
        info!(state = %next, "Job state");
        self.state_tx.send_replace(next);
        Ok(())
    }
}
