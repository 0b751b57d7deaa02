//! Scribe Engine - CLI entry point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use scribe_engine::inference::GenerationEvent;
use scribe_engine::inference::session::GenerationRequest;
use scribe_engine::models::lifecycle::LifecycleState;
use scribe_engine::provider::{Provider, ProviderKind, TextProvider};
use scribe_engine::{Engine, EngineBuilder, EngineConfig};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;

#[derive(Parser, Debug)]
#[command(name = "scribe-engine")]
#[command(about = "On-device LLM lifecycle and inference engine", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Log format (json or pretty)
    #[arg(long, default_value = "pretty")]
    log_format: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage the local model cache
    Models {
        #[command(subcommand)]
        command: ModelsCommand,
    },
    /// Run a prompt through a provider
    Run {
        /// The user prompt
        prompt: String,

        /// Provider to use (local, openai, gemini, mistral); defaults to the
        /// configured default provider
        #[arg(short, long)]
        provider: Option<ProviderKind>,

        /// System prompt override
        #[arg(short, long)]
        system: Option<String>,

        /// Image file whose recognized text is appended to the prompt;
        /// repeatable
        #[arg(long)]
        image: Vec<PathBuf>,

        /// Print tokens incrementally as they are generated (local provider)
        #[arg(long)]
        stream: bool,

        /// Override the generated-token ceiling
        #[arg(long)]
        max_tokens: Option<usize>,
    },
}

#[derive(Subcommand, Debug)]
enum ModelsCommand {
    /// List all catalog models and their states
    List,
    /// Show the state of one model
    Status { model_id: String },
    /// Download a model's files, reporting progress until it settles
    Download { model_id: String },
    /// Delete a model's cached files
    Delete { model_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    match cli.log_format.as_str() {
        "pretty" => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .json()
                .init();
        }
    }

    // Load configuration
    let config = EngineConfig::load(cli.config)?;
    config.validate()?;

    let engine = EngineBuilder::new(config).build();

    match cli.command {
        Command::Models { command } => run_models(&engine, command).await,
        Command::Run {
            prompt,
            provider,
            system,
            image,
            stream,
            max_tokens,
        } => run_prompt(&engine, prompt, provider, system, image, stream, max_tokens).await,
    }
}

async fn run_models(engine: &Engine, command: ModelsCommand) -> Result<()> {
    let manager = engine.manager();
    match command {
        ModelsCommand::List => {
            let snapshots = manager.list().await;
            println!("{}", serde_json::to_string_pretty(&snapshots)?);
        }
        ModelsCommand::Status { model_id } => {
            let snapshot = manager.status(&model_id).await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        ModelsCommand::Download { model_id } => {
            manager.start_download(&model_id).await?;

            // Poll for progress until the download settles; Ctrl+C cancels.
            loop {
                tokio::select! {
                    _ = signal::ctrl_c() => {
                        eprintln!();
                        manager.cancel_download(&model_id).await?;
                        anyhow::bail!("Download cancelled");
                    }
                    _ = tokio::time::sleep(Duration::from_millis(250)) => {}
                }

                let snapshot = manager.status(&model_id).await?;
                match snapshot.state {
                    LifecycleState::Downloading => {
                        eprint!("\r{:>5.1}%", snapshot.download_progress * 100.0);
                        let _ = std::io::stderr().flush();
                    }
                    LifecycleState::Downloaded | LifecycleState::Loaded => {
                        eprintln!("\r100.0%");
                        println!("Downloaded {}", model_id);
                        break;
                    }
                    LifecycleState::Idle => {
                        let message = snapshot
                            .last_error
                            .unwrap_or_else(|| "download failed".to_string());
                        anyhow::bail!(message);
                    }
                }
            }
        }
        ModelsCommand::Delete { model_id } => {
            manager.delete_model(&model_id).await?;
            println!("Deleted {}", model_id);
        }
    }
    Ok(())
}

async fn run_prompt(
    engine: &Engine,
    prompt: String,
    provider: Option<ProviderKind>,
    system: Option<String>,
    images: Vec<PathBuf>,
    stream: bool,
    max_tokens: Option<usize>,
) -> Result<()> {
    let provider = match provider {
        Some(kind) => engine.provider(kind)?,
        None => engine.default_provider()?,
    };

    let mut image_bytes = Vec::with_capacity(images.len());
    for path in &images {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read image: {:?}", path))?;
        image_bytes.push(bytes);
    }

    let mut request = GenerationRequest::new(&prompt)
        .with_images(image_bytes)
        .streaming(stream);
    if let Some(system) = &system {
        request = request.with_system_prompt(system);
    }
    if let Some(max_tokens) = max_tokens {
        request = request.with_max_tokens(max_tokens);
    }
    request.max_tokens = request.max_tokens.min(engine.config().max_tokens);

    // Incremental display is only available from the local session; remote
    // providers return the final text in one piece.
    if stream && let Provider::Local(local) = provider {
        let mut events = local.generate_stream(request).await?;
        loop {
            tokio::select! {
                _ = signal::ctrl_c() => {
                    local.cancel();
                }
                event = events.next() => {
                    match event {
                        Some(GenerationEvent::Delta(text)) => {
                            print!("{}", text);
                            let _ = std::io::stdout().flush();
                        }
                        Some(GenerationEvent::Completed(result)) => {
                            println!();
                            tracing::info!(
                                total_tokens = result.total_tokens,
                                tokens_per_second = format!("{:.1}", result.tokens_per_second),
                                "Generation finished"
                            );
                            break;
                        }
                        Some(GenerationEvent::Failed(message)) => {
                            anyhow::bail!(message);
                        }
                        None => break,
                    }
                }
            }
        }
        return Ok(());
    }

    let output = tokio::select! {
        _ = signal::ctrl_c() => {
            provider.cancel();
            anyhow::bail!("Cancelled");
        }
        output = provider.process_text(request) => output?,
    };
    println!("{}", output);
    Ok(())
}
