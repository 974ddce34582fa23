//! Subprocess transcode backend.
//!
//! Loading stages the three engine resources into a local cache directory
//! and verifies the transcoder binary answers `-version`. Execution
//! materializes the staged inputs in a temporary directory, runs one
//! command, parses `-progress` output into fractional progress, and reads
//! the declared outputs back.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::{EngineError, EngineResources, ProgressObserver, TranscodeBackend};

/// Default timeout for a single transcode command
const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(600);

/// How many trailing diagnostic lines to keep for error reporting
const STDERR_TAIL: usize = 40;

/// Transcode backend shelling out to an ffmpeg-compatible binary
pub struct FfmpegBackend {
    binary_path: String,
    client: reqwest::Client,
    exec_timeout: Duration,
}

impl FfmpegBackend {
    /// Create a backend for the given binary name or path
    pub fn new(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
            client: reqwest::Client::new(),
            exec_timeout: DEFAULT_EXEC_TIMEOUT,
        }
    }

    /// Override the per-command timeout
    pub fn with_timeout(mut self, exec_timeout: Duration) -> Self {
        self.exec_timeout = exec_timeout;
        self
    }

    /// Fetch one engine resource into the cache, skipping files already staged
    async fn fetch_resource(&self, url: &str, cache_dir: &Path) -> Result<(), EngineError> {
        let file_name = url.rsplit('/').next().unwrap_or("resource");
        let dest = cache_dir.join(file_name);

        if dest.exists() {
            debug!(url, "Engine resource already cached");
            return Ok(());
        }

        debug!(url, "Fetching engine resource");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| EngineError::ResourceFetch {
                url: url.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(EngineError::LoadFailed(format!(
                "resource {} returned HTTP {}",
                url,
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|source| EngineError::ResourceFetch {
                url: url.to_string(),
                source,
            })?;

        tokio::fs::write(&dest, &bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl TranscodeBackend for FfmpegBackend {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn load(
        &self,
        resources: &EngineResources,
        cache_dir: &Path,
    ) -> Result<(), EngineError> {
        tokio::fs::create_dir_all(cache_dir).await?;

        for url in resources.all() {
            self.fetch_resource(url, cache_dir).await?;
        }

        let output = Command::new(&self.binary_path)
            .arg("-version")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                EngineError::LoadFailed(format!("cannot run '{}': {}", self.binary_path, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::LoadFailed(format!(
                "'{} -version' failed: {}",
                self.binary_path,
                stderr.trim()
            )));
        }

        Ok(())
    }

    async fn exec(
        &self,
        args: &[String],
        inputs: &HashMap<String, Vec<u8>>,
        outputs: &[String],
        observer: Option<ProgressObserver>,
    ) -> Result<HashMap<String, Vec<u8>>, EngineError> {
        let staging = tempfile::tempdir()?;

        for (name, bytes) in inputs {
            tokio::fs::write(staging.path().join(name), bytes).await?;
        }

        // Rewrite staged names into paths under the temporary directory
        let rewritten: Vec<String> = args
            .iter()
            .map(|arg| {
                if inputs.contains_key(arg) || outputs.iter().any(|o| o == arg) {
                    staging.path().join(arg).to_string_lossy().to_string()
                } else {
                    arg.clone()
                }
            })
            .collect();

        let mut child = Command::new(&self.binary_path)
            .args(["-hide_banner", "-nostats", "-progress", "pipe:1", "-y"])
            .args(&rewritten)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                EngineError::ExecFailed(format!("failed to spawn '{}': {}", self.binary_path, e))
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // The input duration arrives on stderr; progress counters on stdout.
        let (duration_tx, duration_rx) = watch::channel(None::<f64>);

        let progress_fut = async move {
            let Some(stdout) = stdout else { return };
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(out_time_secs) = parse_out_time_secs(&line) {
                    if let Some(total) = *duration_rx.borrow() {
                        if total > 0.0 {
                            let fraction = (out_time_secs / total).clamp(0.0, 1.0);
                            if let Some(ref obs) = observer {
                                obs(fraction);
                            }
                        }
                    }
                }
            }
        };

        let stderr_fut = async move {
            let Some(stderr) = stderr else {
                return String::new();
            };
            let mut tail: Vec<String> = Vec::new();
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(secs) = parse_duration_secs(&line) {
                    let _ = duration_tx.send(Some(secs));
                }
                if tail.len() == STDERR_TAIL {
                    tail.remove(0);
                }
                tail.push(line);
            }
            tail.join("\n")
        };

        let run = async {
            let (_, diagnostics) = tokio::join!(progress_fut, stderr_fut);
            let status = child.wait().await;
            (status, diagnostics)
        };

        let outcome = timeout(self.exec_timeout, run).await;
        let (status, diagnostics) = match outcome {
            Ok((status, diagnostics)) => (status?, diagnostics),
            Err(_) => {
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill timed-out transcode process");
                }
                return Err(EngineError::Timeout(self.exec_timeout));
            }
        };

        if !status.success() {
            return Err(EngineError::ExecFailed(format!(
                "exit code {}: {}",
                status.code().unwrap_or(-1),
                diagnostics.trim()
            )));
        }

        let mut produced = HashMap::new();
        for name in outputs {
            let path = staging.path().join(name);
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|_| EngineError::MissingFile(name.clone()))?;
            produced.insert(name.clone(), bytes);
        }

        Ok(produced)
    }
}

/// Parse "  Duration: 00:01:02.34, start: ..." into seconds
fn parse_duration_secs(line: &str) -> Option<f64> {
    let rest = line.trim_start().strip_prefix("Duration: ")?;
    let stamp = rest.split(',').next()?.trim();

    let mut parts = stamp.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;

    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Parse a progress counter line ("out_time_us=1234567") into seconds
fn parse_out_time_secs(line: &str) -> Option<f64> {
    let value = line.strip_prefix("out_time_us=")?;
    let micros: f64 = value.trim().parse().ok()?;
    Some(micros / 1_000_000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(
            parse_duration_secs("  Duration: 00:01:02.34, start: 0.000000, bitrate: 128 kb/s"),
            Some(62.34)
        );
        assert_eq!(parse_duration_secs("Duration: 01:00:00.00"), Some(3600.0));
        assert_eq!(parse_duration_secs("frame=  100"), None);
        assert_eq!(parse_duration_secs("Duration: N/A, bitrate: N/A"), None);
    }

    #[test]
    fn test_parse_out_time() {
        assert_eq!(parse_out_time_secs("out_time_us=1500000"), Some(1.5));
        assert_eq!(parse_out_time_secs("out_time=00:00:01.500000"), None);
        assert_eq!(parse_out_time_secs("progress=continue"), None);
    }

    #[test]
    fn test_backend_name() {
        let backend = FfmpegBackend::new("ffmpeg");
        assert_eq!(backend.name(), "ffmpeg");
    }

    #[test]
    fn test_timeout_override() {
        let backend = FfmpegBackend::new("ffmpeg").with_timeout(Duration::from_secs(5));
        assert_eq!(backend.exec_timeout, Duration::from_secs(5));
    }
}
