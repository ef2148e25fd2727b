use std::{path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{ChatSession, TurnOutcome};
use tracing_subscriber::EnvFilter;

mod config;
mod repl;

use repl::Repl;

#[derive(Parser, Debug)]
#[command(name = "vision-chat", about = "Chat with a multimodal Gemini model from the terminal")]
struct Args {
    /// Settings file (defaults to ./vision-chat.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Model name, e.g. gemini-1.5-flash
    #[arg(long)]
    model: Option<String>,
    /// Base URL of the generative language API
    #[arg(long)]
    api_base: Option<String>,
    /// Image to stage before the first prompt; repeatable
    #[arg(long = "image", short = 'i')]
    images: Vec<PathBuf>,
    /// Send one prompt, print the answer, and exit
    #[arg(long, short = 'p')]
    prompt: Option<String>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = config::load_settings(args.config.as_deref())?;
    if let Some(model) = args.model {
        settings.model = model;
    }
    if let Some(api_base) = args.api_base {
        settings.api_base = api_base;
    }
    tracing::debug!(?settings, "settings loaded");
    let model = config::build_model(&settings)
        .context("cannot start without a usable model configuration")?;

    let session = Arc::new(ChatSession::new(model));
    let repl = Repl::new(Arc::clone(&session));
    if !args.images.is_empty() {
        repl.stage(&args.images).await;
    }

    match args.prompt {
        Some(prompt) => match repl.send_and_render(&prompt).await? {
            Some(TurnOutcome::Completed { .. }) => Ok(ExitCode::SUCCESS),
            _ => Ok(ExitCode::FAILURE),
        },
        None => {
            repl.run().await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
