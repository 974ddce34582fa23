//! Media inputs and outputs of the transcode pipeline.

use std::path::Path;

use anyhow::{Context, Result};

/// Media type of every produced audio artifact
pub const AUDIO_MEDIA_TYPE: &str = "audio/mpeg";

/// Synthetic filename of every produced audio artifact
pub const AUDIO_FILE_NAME: &str = "audio.mp3";

/// A raw video file handed to the pipeline.
#[derive(Debug, Clone)]
pub struct VideoFile {
    /// Raw container bytes
    pub bytes: Vec<u8>,

    /// Declared media type (e.g. "video/mp4")
    pub media_type: String,

    /// Original filename
    pub file_name: String,
}

impl VideoFile {
    pub fn new(bytes: Vec<u8>, media_type: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            bytes,
            media_type: media_type.into(),
            file_name: file_name.into(),
        }
    }

    /// Read a video from disk, deriving the media type from the extension.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read video file: {}", path.display()))?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "video".to_string());

        let media_type = match path.extension().and_then(|e| e.to_str()) {
            Some("mp4") | Some("m4v") => "video/mp4",
            Some("webm") => "video/webm",
            Some("mov") => "video/quicktime",
            Some("mkv") => "video/x-matroska",
            _ => "application/octet-stream",
        };

        Ok(Self::new(bytes, media_type, file_name))
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Compact audio produced by the transcode pipeline.
///
/// Consumed exactly once by the upload stage, then discarded. The fixed
/// media type and filename are part of the ingestion contract.
#[derive(Debug, Clone)]
pub struct AudioArtifact {
    pub bytes: Vec<u8>,
    pub media_type: &'static str,
    pub file_name: &'static str,
}

impl AudioArtifact {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            media_type: AUDIO_MEDIA_TYPE,
            file_name: AUDIO_FILE_NAME,
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_video_from_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("clip.mp4");
        tokio::fs::write(&path, b"fake video bytes").await.unwrap();

        let video = VideoFile::from_path(&path).await.unwrap();
        assert_eq!(video.file_name, "clip.mp4");
        assert_eq!(video.media_type, "video/mp4");
        assert_eq!(video.size(), 16);
    }

    #[tokio::test]
    async fn test_unknown_extension_falls_back() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("clip.raw");
        tokio::fs::write(&path, b"x").await.unwrap();

        let video = VideoFile::from_path(&path).await.unwrap();
        assert_eq!(video.media_type, "application/octet-stream");
    }

    #[test]
    fn test_artifact_shape() {
        let artifact = AudioArtifact::new(vec![1, 2, 3]);
        assert_eq!(artifact.media_type, "audio/mpeg");
        assert_eq!(artifact.file_name, "audio.mp3");
        assert_eq!(artifact.size(), 3);
    }
}
