//! Command-line interface for vidscribe.
//!
//! Provides commands for submitting videos, browsing the prompt catalog,
//! streaming completions, and checking the engine.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::api::{
    ApiClient, CompletionRequest, CompletionStream, HttpCompletionTransport, VideoApi,
};
use crate::config;
use crate::domain::{VideoFile, VideoId};
use crate::engine::MediaEngine;
use crate::pipeline::{TranscodePipeline, UploadOrchestrator};

/// vidscribe - video-to-transcription pipeline with streamed completions
#[derive(Parser, Debug)]
#[command(name = "vidscribe")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Transcode a video, upload it and request a transcription
    Submit {
        /// Path to the video file
        video: PathBuf,

        /// Keywords mentioned in the video (comma-separated)
        #[arg(short, long)]
        prompt: Option<String>,
    },

    /// List prompt templates from the catalog
    Prompts,

    /// Stream a completion for an uploaded video
    Complete {
        /// Video id returned by a previous submit
        video_id: String,

        /// Prompt text (the `{transcription}` placeholder is substituted server-side)
        #[arg(short, long)]
        prompt: Option<String>,

        /// Use a catalog template as the prompt instead of --prompt
        #[arg(long)]
        prompt_id: Option<String>,

        /// Sampling temperature (0.0–1.0)
        #[arg(short, long)]
        temperature: Option<f32>,
    },

    /// Engine maintenance
    Engine {
        #[command(subcommand)]
        command: EngineCommands,
    },

    /// Show resolved configuration (debug)
    Config,
}

#[derive(Subcommand, Debug)]
pub enum EngineCommands {
    /// Load the engine and verify it is usable
    Check,
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Submit { video, prompt } => execute_submit(video, prompt).await,
            Commands::Prompts => execute_prompts().await,
            Commands::Complete {
                video_id,
                prompt,
                prompt_id,
                temperature,
            } => execute_complete(video_id, prompt, prompt_id, temperature).await,
            Commands::Engine {
                command: EngineCommands::Check,
            } => execute_engine_check().await,
            Commands::Config => execute_config(),
        }
    }
}

fn build_engine() -> Result<Arc<MediaEngine>> {
    let cfg = config::config()?;
    Ok(Arc::new(MediaEngine::new(
        cfg.engine_resources.clone(),
        cfg.engine_cache_dir(),
        cfg.engine_binary.clone(),
    )))
}

async fn execute_submit(video: PathBuf, prompt: Option<String>) -> Result<()> {
    let cfg = config::config()?;
    let engine = build_engine()?;
    let api = Arc::new(ApiClient::new(cfg.api_base_url.clone()));
    let orchestrator = UploadOrchestrator::new(TranscodePipeline::new(engine), api);

    let file = VideoFile::from_path(&video).await?;
    println!("Submitting {} ({} bytes)", file.file_name, file.size());

    let mut states = orchestrator.subscribe();
    let reporter = tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = states.borrow().clone();
            println!("  → {}", state);
        }
    });

    let started = Instant::now();
    let result = orchestrator.submit(file, prompt).await;
    reporter.abort();

    let video_id = result?;
    println!(
        "Done in {:.1}s — video id: {}",
        started.elapsed().as_secs_f64(),
        video_id
    );
    Ok(())
}

async fn execute_prompts() -> Result<()> {
    let cfg = config::config()?;
    let api = ApiClient::new(cfg.api_base_url.clone());

    let prompts = api.list_prompts().await?;
    if prompts.is_empty() {
        println!("No prompt templates available.");
        return Ok(());
    }

    for prompt in prompts {
        println!("{}  {}", prompt.id, prompt.title);
        println!("    {}", prompt.template);
    }
    Ok(())
}

/// Resolve the completion prompt from the flags.
///
/// `--prompt-id` looks the template up in the catalog and uses its text
/// literally; the backend substitutes `{transcription}` server-side.
async fn resolve_prompt(
    api: &dyn VideoApi,
    prompt: Option<String>,
    prompt_id: Option<String>,
) -> Result<String> {
    match (prompt, prompt_id) {
        (Some(_), Some(_)) => bail!("--prompt and --prompt-id are mutually exclusive"),
        (Some(text), None) => Ok(text),
        (None, Some(id)) => api
            .list_prompts()
            .await?
            .into_iter()
            .find(|p| p.id == id)
            .map(|p| p.template)
            .with_context(|| format!("No prompt template with id '{}'", id)),
        (None, None) => bail!("Provide --prompt or --prompt-id"),
    }
}

/// Longest leading slice of `bytes` that decodes as complete UTF-8.
///
/// A chunk boundary can split a multi-byte character; its leading bytes
/// stay pending until the rest arrives instead of being rendered as
/// U+FFFD.
fn valid_utf8_prefix(bytes: &[u8]) -> &str {
    match std::str::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => std::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or(""),
    }
}

async fn execute_complete(
    video_id: String,
    prompt: Option<String>,
    prompt_id: Option<String>,
    temperature: Option<f32>,
) -> Result<()> {
    let cfg = config::config()?;

    let api = ApiClient::new(cfg.api_base_url.clone());
    let prompt = resolve_prompt(&api, prompt, prompt_id).await?;

    let temperature = temperature.unwrap_or(cfg.default_temperature);
    if !(0.0..=1.0).contains(&temperature) {
        bail!("Temperature must be between 0.0 and 1.0");
    }

    let stream = CompletionStream::new(Arc::new(HttpCompletionTransport::new(
        cfg.api_base_url.clone(),
    )));
    let request = CompletionRequest {
        video_id: VideoId::new(video_id),
        temperature,
        prompt,
    };

    // Render the buffer incrementally while the stream runs. The offset
    // tracks raw buffer bytes, so printing resumes on a character
    // boundary even when a chunk ended mid-character.
    let mut printed = 0usize;
    let mut ticker = tokio::time::interval(Duration::from_millis(100));
    let run = stream.run(&request);
    tokio::pin!(run);

    loop {
        tokio::select! {
            result = &mut run => {
                result?;
                break;
            }
            _ = ticker.tick() => {
                let snapshot = stream.snapshot_bytes().await;
                let delta = valid_utf8_prefix(&snapshot[printed..]);
                if !delta.is_empty() {
                    print!("{}", delta);
                    std::io::stdout().flush().ok();
                    printed += delta.len();
                }
            }
        }
    }

    let snapshot = stream.snapshot_bytes().await;
    if printed < snapshot.len() {
        print!("{}", String::from_utf8_lossy(&snapshot[printed..]));
    }
    println!();
    Ok(())
}

async fn execute_engine_check() -> Result<()> {
    let cfg = config::config()?;
    let engine = build_engine()?;

    engine.acquire().await?;
    println!(
        "Engine loaded; resources staged under {}",
        cfg.engine_cache_dir().display()
    );
    Ok(())
}

fn execute_config() -> Result<()> {
    let cfg = config::config()?;

    println!("Home:        {}", cfg.home.display());
    println!("API:         {}", cfg.api_base_url);
    println!("Engine bin:  {}", cfg.engine_binary);
    println!("Core:        {}", cfg.engine_resources.core_url);
    println!("Wasm:        {}", cfg.engine_resources.wasm_url);
    println!("Worker:      {}", cfg.engine_resources.worker_url);
    println!("Temperature: {}", cfg.default_temperature);
    match cfg.config_file {
        Some(ref path) => println!("Config file: {}", path.display()),
        None => println!("Config file: (none found)"),
    }
    Ok(())
}
