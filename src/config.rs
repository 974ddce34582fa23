//! Configuration for vidscribe.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (VIDSCRIBE_HOME, VIDSCRIBE_API_URL)
//! 2. Config file (.vidscribe/config.yaml)
//! 3. Defaults (~/.vidscribe, http://localhost:3333)
//!
//! Config file discovery searches the current directory and parents for
//! .vidscribe/config.yaml.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::engine::EngineResources;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Default base URL of the backend API
const DEFAULT_API_URL: &str = "http://localhost:3333";

/// Default locations of the three engine load resources
const DEFAULT_CORE_URL: &str = "https://unpkg.com/@ffmpeg/core-mt@0.12.6/dist/esm/ffmpeg-core.js";
const DEFAULT_WASM_URL: &str = "https://unpkg.com/@ffmpeg/core-mt@0.12.6/dist/esm/ffmpeg-core.wasm";
const DEFAULT_WORKER_URL: &str =
    "https://unpkg.com/@ffmpeg/core-mt@0.12.6/dist/esm/ffmpeg-core.worker.js";

/// Default sampling temperature for completions
const DEFAULT_TEMPERATURE: f32 = 0.5;

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub api: Option<ApiConfig>,
    #[serde(default)]
    pub engine: Option<EngineConfig>,
    #[serde(default)]
    pub completion: Option<CompletionConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfig {
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
    pub core_url: Option<String>,
    pub wasm_url: Option<String>,
    pub worker_url: Option<String>,
    /// Binary used to execute transcode commands
    pub binary: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionConfig {
    pub temperature: Option<f32>,
}

/// Resolved configuration with all defaults applied
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to vidscribe home (engine cache lives below it)
    pub home: PathBuf,
    /// Base URL of the backend API
    pub api_base_url: String,
    /// Engine load resources
    pub engine_resources: EngineResources,
    /// Transcoder binary name or path
    pub engine_binary: String,
    /// Default completion temperature
    pub default_temperature: f32,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

impl ResolvedConfig {
    /// Directory where engine resources are staged
    pub fn engine_cache_dir(&self) -> PathBuf {
        self.home.join("engine")
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".vidscribe").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".vidscribe");

    let config_file = find_config_file();
    let file = match config_file {
        Some(ref path) => Some(load_config_file(path)?),
        None => None,
    };

    let home = std::env::var("VIDSCRIBE_HOME")
        .map(PathBuf::from)
        .unwrap_or(default_home);

    let api_base_url = std::env::var("VIDSCRIBE_API_URL").unwrap_or_else(|_| {
        file.as_ref()
            .and_then(|f| f.api.as_ref())
            .and_then(|a| a.base_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    });

    let engine = file.as_ref().and_then(|f| f.engine.clone()).unwrap_or_default();
    let engine_resources = EngineResources {
        core_url: engine.core_url.unwrap_or_else(|| DEFAULT_CORE_URL.to_string()),
        wasm_url: engine.wasm_url.unwrap_or_else(|| DEFAULT_WASM_URL.to_string()),
        worker_url: engine
            .worker_url
            .unwrap_or_else(|| DEFAULT_WORKER_URL.to_string()),
    };
    let engine_binary = engine.binary.unwrap_or_else(|| "ffmpeg".to_string());

    let default_temperature = file
        .as_ref()
        .and_then(|f| f.completion.as_ref())
        .and_then(|c| c.temperature)
        .unwrap_or(DEFAULT_TEMPERATURE);

    Ok(ResolvedConfig {
        home,
        api_base_url,
        engine_resources,
        engine_binary,
        default_temperature,
        config_file,
    })
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}
