//! Engine Acquisition Integration Tests
//!
//! Tests for single-flight loading: concurrent first callers share one
//! load, and a failed load is never cached.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use vidscribe::engine::{
    EngineError, EngineResources, MediaEngine, ProgressObserver, TranscodeBackend,
};

/// Backend that counts loads and can hold or fail them on demand
struct CountingBackend {
    loads: AtomicUsize,
    hold: AtomicBool,
    fail_next: AtomicBool,
    gate: Notify,
}

impl CountingBackend {
    fn new(hold: bool, fail_next: bool) -> Self {
        Self {
            loads: AtomicUsize::new(0),
            hold: AtomicBool::new(hold),
            fail_next: AtomicBool::new(fail_next),
            gate: Notify::new(),
        }
    }
}

#[async_trait]
impl TranscodeBackend for CountingBackend {
    fn name(&self) -> &str {
        "counting"
    }

    async fn load(
        &self,
        _resources: &EngineResources,
        _cache_dir: &Path,
    ) -> Result<(), EngineError> {
        self.loads.fetch_add(1, Ordering::SeqCst);

        if self.hold.load(Ordering::SeqCst) {
            self.gate.notified().await;
        }

        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(EngineError::LoadFailed("resource fetch refused".to_string()));
        }

        Ok(())
    }

    async fn exec(
        &self,
        _args: &[String],
        _inputs: &HashMap<String, Vec<u8>>,
        _outputs: &[String],
        _observer: Option<ProgressObserver>,
    ) -> Result<HashMap<String, Vec<u8>>, EngineError> {
        Ok(HashMap::new())
    }
}

fn resources() -> EngineResources {
    EngineResources {
        core_url: "http://localhost/core.js".to_string(),
        wasm_url: "http://localhost/core.wasm".to_string(),
        worker_url: "http://localhost/worker.js".to_string(),
    }
}

#[tokio::test]
async fn test_concurrent_acquires_share_one_load() {
    let backend = Arc::new(CountingBackend::new(true, false));
    let engine = Arc::new(MediaEngine::with_backend(
        resources(),
        PathBuf::from("/tmp/unused"),
        backend.clone(),
    ));

    let mut tasks = Vec::new();
    for _ in 0..3 {
        let engine = engine.clone();
        tasks.push(tokio::spawn(async move { engine.acquire().await }));
    }

    // Let all three reach the pending load before releasing it
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(backend.loads.load(Ordering::SeqCst), 1);
    backend.gate.notify_one();

    let mut handles = Vec::new();
    for task in tasks {
        handles.push(task.await.unwrap().unwrap());
    }

    assert_eq!(backend.loads.load(Ordering::SeqCst), 1);
    assert!(Arc::ptr_eq(&handles[0], &handles[1]));
    assert!(Arc::ptr_eq(&handles[0], &handles[2]));
}

#[tokio::test]
async fn test_failed_load_is_not_cached() {
    let backend = Arc::new(CountingBackend::new(false, true));
    let engine = MediaEngine::with_backend(
        resources(),
        PathBuf::from("/tmp/unused"),
        backend.clone(),
    );

    let err = engine.acquire().await.unwrap_err();
    assert!(matches!(err, EngineError::LoadFailed(_)));
    assert!(!engine.is_loaded());

    // A later call retries and succeeds
    engine.acquire().await.unwrap();
    assert_eq!(backend.loads.load(Ordering::SeqCst), 2);
    assert!(engine.is_loaded());
}
