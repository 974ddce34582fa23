//! Video-to-audio conversion through the media engine.
//!
//! The fixed command demuxes the first audio stream and encodes MP3 at a
//! constant 20 kb/s. Fidelity is deliberately traded for upload size; the
//! artifact feeds speech-to-text, not playback.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::domain::{AudioArtifact, VideoFile};
use crate::engine::{EngineError, MediaEngine, ProgressObserver};

/// Errors from a conversion attempt
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Conversion produced an empty audio track")]
    EmptyOutput,
}

/// Drives the media engine through the fixed video → MP3 command.
pub struct TranscodePipeline {
    engine: Arc<MediaEngine>,
}

impl TranscodePipeline {
    pub fn new(engine: Arc<MediaEngine>) -> Self {
        Self { engine }
    }

    /// Convert a video into a compact audio artifact.
    ///
    /// Staging names are unique per invocation, so concurrent conversions
    /// cannot collide in the engine's virtual filesystem. Any stage
    /// failure propagates as a single conversion error; the input is not
    /// retried.
    #[instrument(skip(self, video), fields(file = %video.file_name, size = video.size()))]
    pub async fn convert(&self, video: &VideoFile) -> Result<AudioArtifact, ConvertError> {
        let engine = self.engine.acquire().await?;

        let job = Uuid::new_v4();
        let input_name = format!("input-{}.mp4", job);
        let output_name = format!("output-{}.mp3", job);

        engine.write_file(&input_name, video.bytes.clone()).await;

        let observer: ProgressObserver = Arc::new(|fraction: f64| {
            debug!(progress = format!("{:.0}%", fraction * 100.0), "Converting");
        });

        let args: Vec<String> = [
            "-i",
            &input_name,
            "-map",
            "0:a",
            "-b:a",
            "20k",
            "-acodec",
            "libmp3lame",
            &output_name,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let result = engine
            .exec(&args, std::slice::from_ref(&output_name), Some(observer))
            .await;

        // Staged input is no longer needed whichever way exec went
        engine.remove_file(&input_name).await;
        result?;

        let bytes = engine.read_file(&output_name).await?;
        engine.remove_file(&output_name).await;

        if bytes.is_empty() {
            return Err(ConvertError::EmptyOutput);
        }

        info!(audio_bytes = bytes.len(), "Conversion finished");
        Ok(AudioArtifact::new(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    use async_trait::async_trait;

    use crate::engine::{EngineResources, TranscodeBackend};

    struct FixedMp3Backend;

    #[async_trait]
    impl TranscodeBackend for FixedMp3Backend {
        fn name(&self) -> &str {
            "fixed-mp3"
        }

        async fn load(
            &self,
            _resources: &EngineResources,
            _cache_dir: &Path,
        ) -> Result<(), EngineError> {
            Ok(())
        }

        async fn exec(
            &self,
            args: &[String],
            _inputs: &HashMap<String, Vec<u8>>,
            outputs: &[String],
            observer: Option<ProgressObserver>,
        ) -> Result<HashMap<String, Vec<u8>>, EngineError> {
            assert_eq!(args[0], "-i");
            assert_eq!(&args[2..8], &["-map", "0:a", "-b:a", "20k", "-acodec", "libmp3lame"]);

            if let Some(obs) = observer {
                obs(0.5);
                obs(1.0);
            }

            Ok(outputs
                .iter()
                .map(|name| (name.clone(), b"mp3 bytes".to_vec()))
                .collect())
        }
    }

    fn test_engine(backend: Arc<dyn TranscodeBackend>) -> Arc<MediaEngine> {
        Arc::new(MediaEngine::with_backend(
            EngineResources {
                core_url: "http://localhost/core.js".to_string(),
                wasm_url: "http://localhost/core.wasm".to_string(),
                worker_url: "http://localhost/worker.js".to_string(),
            },
            PathBuf::from("/tmp/unused"),
            backend,
        ))
    }

    #[tokio::test]
    async fn test_convert_yields_mp3_artifact() {
        let pipeline = TranscodePipeline::new(test_engine(Arc::new(FixedMp3Backend)));
        let video = VideoFile::new(b"raw video".to_vec(), "video/mp4", "clip.mp4");

        let artifact = pipeline.convert(&video).await.unwrap();
        assert_eq!(artifact.media_type, "audio/mpeg");
        assert_eq!(artifact.file_name, "audio.mp3");
        assert_eq!(artifact.bytes, b"mp3 bytes");
    }

    struct FailingBackend;

    #[async_trait]
    impl TranscodeBackend for FailingBackend {
        fn name(&self) -> &str {
            "failing"
        }

        async fn load(
            &self,
            _resources: &EngineResources,
            _cache_dir: &Path,
        ) -> Result<(), EngineError> {
            Ok(())
        }

        async fn exec(
            &self,
            _args: &[String],
            _inputs: &HashMap<String, Vec<u8>>,
            _outputs: &[String],
            _observer: Option<ProgressObserver>,
        ) -> Result<HashMap<String, Vec<u8>>, EngineError> {
            Err(EngineError::ExecFailed("codec blew up".to_string()))
        }
    }

    #[tokio::test]
    async fn test_convert_propagates_exec_failure() {
        let pipeline = TranscodePipeline::new(test_engine(Arc::new(FailingBackend)));
        let video = VideoFile::new(b"raw video".to_vec(), "video/mp4", "clip.mp4");

        let err = pipeline.convert(&video).await.unwrap_err();
        assert!(matches!(err, ConvertError::Engine(EngineError::ExecFailed(_))));
    }
}
