//! # skein
//!
//! Streams a chat completion for one prompt and prints every choice.
//! With a single choice the deltas are printed as they arrive; with several,
//! each choice is collected concurrently and printed in discovery order.

#![deny(unsafe_code)]

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use futures::StreamExt;
use secrecy::SecretString;
use skein_core::logging::{LogFormat, init_subscriber};
use skein_llm::{
    ApiFlavor, ChatCompletionsClient, ChatCompletionsRequest, ChatMessage, ClientConfig,
    StreamingSession,
};
use skein_settings::{ClientSettings, SkeinSettings};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Stream a chat completion.
#[derive(Parser, Debug)]
#[command(name = "skein", about = "Stream a chat completion and print every choice")]
struct Cli {
    /// Settings file (defaults to `~/.skein/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// System message sent before the prompt.
    #[arg(long)]
    system: Option<String>,

    /// Number of choices to generate.
    #[arg(short = 'n', long = "choices", default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=16))]
    choices: u32,

    /// Generation limit per choice.
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Sampling temperature.
    #[arg(long)]
    temperature: Option<f32>,

    /// Log filter when `RUST_LOG` is unset (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,

    /// User prompt.
    prompt: String,
}

impl Cli {
    fn request(&self) -> ChatCompletionsRequest {
        let mut messages = Vec::new();
        if let Some(system) = &self.system {
            messages.push(ChatMessage::system(system.clone()));
        }
        messages.push(ChatMessage::user(self.prompt.clone()));
        ChatCompletionsRequest {
            n: (self.choices > 1).then_some(self.choices),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            ..ChatCompletionsRequest::new(messages)
        }
    }
}

fn client_config(settings: &ClientSettings, api_key: SecretString) -> ClientConfig {
    ClientConfig {
        flavor: settings.flavor,
        endpoint: settings.endpoint.clone(),
        deployment: settings.deployment.clone(),
        api_version: settings.api_version.clone(),
        api_key,
        read_timeout: Duration::from_millis(settings.read_timeout_ms),
        connect_timeout: Duration::from_millis(settings.connect_timeout_ms),
    }
}

fn api_key() -> Result<SecretString> {
    let key = std::env::var("SKEIN_API_KEY")
        .or_else(|_| std::env::var("OPENAI_API_KEY"))
        .context("no API key: set SKEIN_API_KEY or OPENAI_API_KEY")?;
    if key.trim().is_empty() {
        bail!("API key is empty");
    }
    Ok(SecretString::from(key))
}

fn load_settings(path: Option<&PathBuf>) -> Result<SkeinSettings> {
    match path {
        Some(path) => skein_settings::load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display())),
        None => skein_settings::load_settings().context("Failed to load settings"),
    }
}

/// Print the only choice's deltas as they arrive.
async fn print_live(session: &StreamingSession, cancel: &CancellationToken) -> Result<()> {
    let mut choices = session.choices(cancel.clone());
    let Some(choice) = choices.next().await else {
        bail!("the response contained no choices");
    };
    let choice = choice?;

    let mut stdout = std::io::stdout().lock();
    let mut deltas = choice.deltas(cancel.clone());
    while let Some(delta) = deltas.next().await {
        if let Some(content) = delta?.content() {
            stdout.write_all(content.as_bytes())?;
            stdout.flush()?;
        }
    }
    writeln!(stdout)?;
    debug!(finish_reason = ?choice.finish_reason(), "choice finished");
    Ok(())
}

/// Collect every choice concurrently, then print them in discovery order.
async fn print_collected(session: &StreamingSession, cancel: &CancellationToken) -> Result<()> {
    let mut choices = session.choices(cancel.clone());
    let mut tasks = Vec::new();
    while let Some(choice) = choices.next().await {
        let choice = choice?;
        let cancel = cancel.clone();
        tasks.push(tokio::spawn(async move { choice.collect_message(&cancel).await }));
    }

    let mut stdout = std::io::stdout().lock();
    for task in tasks {
        let message = task.await.context("choice task panicked")??;
        let reason = message.finish_reason.as_ref().map_or("none", |r| r.as_str());
        writeln!(stdout, "--- choice {} ({reason}) ---", message.index)?;
        writeln!(stdout, "{}", message.content)?;
        if let Some(call) = &message.function_call {
            writeln!(
                stdout,
                "function_call: {}({})",
                call.name.as_deref().unwrap_or("?"),
                call.arguments
            )?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = load_settings(cli.settings.as_ref())?;
    let level = cli.log_level.as_deref().unwrap_or(&settings.logging.level);
    let format = if cli.json_logs { LogFormat::Json } else { LogFormat::Compact };
    let _ = init_subscriber(level, format);

    let config = client_config(&settings.client, api_key()?);
    let client = ChatCompletionsClient::new(config).context("Failed to build client")?;
    info!(
        endpoint = %settings.client.endpoint,
        deployment = %settings.client.deployment,
        choices = cli.choices,
        "starting completion"
    );

    let session = client
        .stream_chat(&cli.request())
        .await
        .context("Completion request failed")?;

    let _ = tokio::spawn({
        let session = session.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupted, closing stream");
                session.close();
            }
        }
    });

    let cancel = CancellationToken::new();
    if cli.choices == 1 {
        print_live(&session, &cancel).await?;
    } else {
        print_collected(&session, &cancel).await?;
    }

    let metadata = session.metadata();
    debug!(
        id = %metadata.id,
        frames = metadata.frame_count,
        choices = session.choice_count(),
        "completion finished"
    );
    Ok(())
}
