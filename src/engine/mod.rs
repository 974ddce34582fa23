//! Media engine: lazily-loaded transcoder behind a virtual staging filesystem.
//!
//! The engine is loaded at most once per process. Concurrent first callers
//! share a single in-flight load; a failed load caches nothing, so a later
//! `acquire` retries. Staged files live in an in-memory name → bytes map
//! that acts as the I/O surface between the write, exec and read phases.

pub mod ffmpeg;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{Mutex, OnceCell};
use tracing::info;

pub use ffmpeg::FfmpegBackend;

/// Errors from engine loading and command execution
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Engine load failed: {0}")]
    LoadFailed(String),

    #[error("Failed to fetch engine resource {url}: {source}")]
    ResourceFetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("No staged file named '{0}'")]
    MissingFile(String),

    #[error("Transcode command failed: {0}")]
    ExecFailed(String),

    #[error("Transcode command timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Observer for fractional transcode progress (0.0–1.0).
///
/// Diagnostic only; it never affects control flow.
pub type ProgressObserver = Arc<dyn Fn(f64) + Send + Sync>;

/// The three fixed resource locations the engine loads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineResources {
    /// Core runtime script
    pub core_url: String,
    /// Binary codec payload
    pub wasm_url: String,
    /// Worker script
    pub worker_url: String,
}

impl EngineResources {
    pub fn all(&self) -> [&str; 3] {
        [&self.core_url, &self.wasm_url, &self.worker_url]
    }
}

/// Trait for transcode backends.
///
/// `exec` receives the current staged inputs, runs one transcode command,
/// and returns the bytes of each declared output name.
#[async_trait]
pub trait TranscodeBackend: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// One-time load: stage resources and verify the backend is usable
    async fn load(&self, resources: &EngineResources, cache_dir: &Path)
        -> Result<(), EngineError>;

    /// Execute a transcode command against the staged inputs
    async fn exec(
        &self,
        args: &[String],
        inputs: &HashMap<String, Vec<u8>>,
        outputs: &[String],
        observer: Option<ProgressObserver>,
    ) -> Result<HashMap<String, Vec<u8>>, EngineError>;
}

/// Process-scoped owner of the transcoder.
///
/// `acquire` is idempotent and single-flight: all callers resolve to the
/// same handle, and the underlying load runs exactly once on success.
pub struct MediaEngine {
    resources: EngineResources,
    cache_dir: PathBuf,
    backend: Arc<dyn TranscodeBackend>,
    handle: OnceCell<Arc<EngineHandle>>,
}

impl MediaEngine {
    /// Create an engine using the subprocess backend
    pub fn new(resources: EngineResources, cache_dir: PathBuf, binary_path: String) -> Self {
        Self::with_backend(resources, cache_dir, Arc::new(FfmpegBackend::new(binary_path)))
    }

    /// Create an engine with a custom backend
    pub fn with_backend(
        resources: EngineResources,
        cache_dir: PathBuf,
        backend: Arc<dyn TranscodeBackend>,
    ) -> Self {
        Self {
            resources,
            cache_dir,
            backend,
            handle: OnceCell::new(),
        }
    }

    /// Get the engine handle, loading the engine on first use.
    ///
    /// Concurrent callers during a pending load await the same outcome.
    /// A load failure propagates to every waiter and is not cached.
    pub async fn acquire(&self) -> Result<Arc<EngineHandle>, EngineError> {
        self.handle
            .get_or_try_init(|| async {
                info!(backend = self.backend.name(), "Loading media engine");
                self.backend.load(&self.resources, &self.cache_dir).await?;
                info!("Media engine loaded");
                Ok(Arc::new(EngineHandle::new(Arc::clone(&self.backend))))
            })
            .await
            .cloned()
    }

    /// Whether the engine has completed its one-time load
    pub fn is_loaded(&self) -> bool {
        self.handle.initialized()
    }
}

/// Handle to the loaded transcoder and its virtual filesystem.
pub struct EngineHandle {
    backend: Arc<dyn TranscodeBackend>,
    staging: Mutex<HashMap<String, Vec<u8>>>,
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle").finish_non_exhaustive()
    }
}

impl EngineHandle {
    fn new(backend: Arc<dyn TranscodeBackend>) -> Self {
        Self {
            backend,
            staging: Mutex::new(HashMap::new()),
        }
    }

    /// Stage bytes under a name in the virtual filesystem
    pub async fn write_file(&self, name: &str, bytes: Vec<u8>) {
        self.staging.lock().await.insert(name.to_string(), bytes);
    }

    /// Read staged bytes back out of the virtual filesystem
    pub async fn read_file(&self, name: &str) -> Result<Vec<u8>, EngineError> {
        self.staging
            .lock()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::MissingFile(name.to_string()))
    }

    /// Remove a staged file; returns whether it existed
    pub async fn remove_file(&self, name: &str) -> bool {
        self.staging.lock().await.remove(name).is_some()
    }

    /// Execute a transcode command.
    ///
    /// Declared outputs are written back into the virtual filesystem on
    /// success.
    pub async fn exec(
        &self,
        args: &[String],
        outputs: &[String],
        observer: Option<ProgressObserver>,
    ) -> Result<(), EngineError> {
        let inputs = self.staging.lock().await.clone();
        let produced = self.backend.exec(args, &inputs, outputs, observer).await?;
        self.staging.lock().await.extend(produced);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoBackend;

    #[async_trait]
    impl TranscodeBackend for EchoBackend {
        fn name(&self) -> &str {
            "echo"
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
            inputs: &HashMap<String, Vec<u8>>,
            outputs: &[String],
            _observer: Option<ProgressObserver>,
        ) -> Result<HashMap<String, Vec<u8>>, EngineError> {
            // Echo the first input's bytes to every declared output
            let bytes = inputs.values().next().cloned().unwrap_or_default();
            Ok(outputs
                .iter()
                .map(|name| (name.clone(), bytes.clone()))
                .collect())
        }
    }

    fn test_resources() -> EngineResources {
        EngineResources {
            core_url: "http://localhost/core.js".to_string(),
            wasm_url: "http://localhost/core.wasm".to_string(),
            worker_url: "http://localhost/worker.js".to_string(),
        }
    }

    #[tokio::test]
    async fn test_staging_roundtrip() {
        let engine = MediaEngine::with_backend(
            test_resources(),
            PathBuf::from("/tmp/unused"),
            Arc::new(EchoBackend),
        );
        let handle = engine.acquire().await.unwrap();

        handle.write_file("in.mp4", vec![1, 2, 3]).await;
        assert_eq!(handle.read_file("in.mp4").await.unwrap(), vec![1, 2, 3]);

        assert!(handle.remove_file("in.mp4").await);
        assert!(!handle.remove_file("in.mp4").await);
        assert!(matches!(
            handle.read_file("in.mp4").await,
            Err(EngineError::MissingFile(_))
        ));
    }

    #[tokio::test]
    async fn test_exec_merges_outputs() {
        let engine = MediaEngine::with_backend(
            test_resources(),
            PathBuf::from("/tmp/unused"),
            Arc::new(EchoBackend),
        );
        let handle = engine.acquire().await.unwrap();

        handle.write_file("in.mp4", vec![9, 9]).await;
        handle
            .exec(&["-i".to_string(), "in.mp4".to_string()], &["out.mp3".to_string()], None)
            .await
            .unwrap();

        assert_eq!(handle.read_file("out.mp3").await.unwrap(), vec![9, 9]);
    }

    #[tokio::test]
    async fn test_acquire_is_idempotent() {
        let engine = MediaEngine::with_backend(
            test_resources(),
            PathBuf::from("/tmp/unused"),
            Arc::new(EchoBackend),
        );

        assert!(!engine.is_loaded());
        let a = engine.acquire().await.unwrap();
        let b = engine.acquire().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(engine.is_loaded());
    }
}
