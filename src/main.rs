//! Mailwire command-line client.
//!
//! Sends single messages or JSON batches through the send API and signs or
//! verifies webhook payloads with the configured secret. Results are printed
//! to stdout as JSON; logs go to stderr.

#![forbid(unsafe_code)]

mod config;

use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mailwire_client::EmailClient;
use mailwire_core::{Address, Message, SendResult};
use mailwire_webhook::{WebhookEvent, WebhookHandler};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::Config;

#[derive(Debug, Parser)]
#[command(name = "mailwire", version, about = "Transactional email API client")]
struct Cli {
    /// Configuration file (defaults to ./mailwire.toml if present)
    #[arg(long, global = true, env = "MAILWIRE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send one message built from flags
    Send(SendArgs),
    /// Send a JSON array of messages as one batch
    SendBatch {
        /// File containing a JSON array of messages
        file: PathBuf,
    },
    /// Print the signature of a webhook payload
    Sign {
        /// Payload file
        file: PathBuf,
    },
    /// Verify a webhook payload and print its events
    Verify {
        /// Payload file
        file: PathBuf,
        /// Signature header value, with or without the `sha256=` prefix
        #[arg(long)]
        signature: String,
    },
}

#[derive(Debug, clap::Args)]
struct SendArgs {
    /// Sender, e.g. "Acme <noreply@acme.test>"
    #[arg(long)]
    from: String,
    /// Primary recipient (repeatable)
    #[arg(long, required = true)]
    to: Vec<String>,
    /// Carbon-copy recipient (repeatable)
    #[arg(long)]
    cc: Vec<String>,
    /// Blind carbon-copy recipient (repeatable)
    #[arg(long)]
    bcc: Vec<String>,
    /// Subject line
    #[arg(long)]
    subject: Option<String>,
    /// Plain-text body
    #[arg(long)]
    text: Option<String>,
    /// HTML body
    #[arg(long)]
    html: Option<String>,
    /// Server-side template id
    #[arg(long)]
    template: Option<String>,
    /// Reporting tag (repeatable)
    #[arg(long)]
    tag: Vec<String>,
}

impl SendArgs {
    fn into_message(self) -> Message {
        let mut builder = Message::builder().from(address(&self.from));
        for to in &self.to {
            builder = builder.to(address(to));
        }
        for cc in &self.cc {
            builder = builder.cc(address(cc));
        }
        for bcc in &self.bcc {
            builder = builder.bcc(address(bcc));
        }
        if let Some(subject) = self.subject {
            builder = builder.subject(subject);
        }
        if let Some(text) = self.text {
            builder = builder.text(text);
        }
        if let Some(html) = self.html {
            builder = builder.html(html);
        }
        if let Some(template) = self.template {
            builder = builder.template(template);
        }
        for tag in self.tag {
            builder = builder.tag(tag);
        }
        builder.build()
    }
}

/// Accepts `Name <email>` forms; anything unparseable is passed through so
/// the client reports it as a validation failure.
fn address(raw: &str) -> Address {
    raw.parse().unwrap_or_else(|_| Address::new(raw))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    init_tracing(&config.log_level);

    info!(
        base_url = %config.base_url,
        api_token = %config.api_token_masked(),
        max_retries = config.max_retries,
        "Configuration loaded"
    );

    match cli.command {
        Command::Send(args) => {
            let results = send(&config, vec![args.into_message()]).await?;
            match results.first() {
                Some(result) => print_json(result)?,
                None => print_json(&results)?,
            }
            Ok(exit_code(&results))
        },
        Command::SendBatch { file } => {
            let messages = read_messages(&file).await?;
            let results = send(&config, messages).await?;
            print_json(&results)?;
            Ok(exit_code(&results))
        },
        Command::Sign { file } => {
            let payload = read_payload(&file).await?;
            let signature = webhook_handler(&config)?.sign(&payload)?;
            println!("{}{signature}", mailwire_webhook::SIGNATURE_PREFIX);
            Ok(ExitCode::SUCCESS)
        },
        Command::Verify { file, signature } => {
            let payload = read_payload(&file).await?;
            verify(&webhook_handler(&config)?, &payload, &signature)
        },
    }
}

/// Initializes tracing with environment-based configuration.
///
/// `RUST_LOG` takes precedence over the configured level.
fn init_tracing(default_filter: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

async fn send(config: &Config, messages: Vec<Message>) -> Result<Vec<SendResult>> {
    let client =
        EmailClient::new(config.to_client_config()).context("Failed to create email client")?;

    let results = client.send_batch(&messages).await.context("Send failed")?;
    let failed = results.iter().filter(|result| !result.success).count();
    if failed > 0 {
        warn!(failed, total = results.len(), "Some messages were not accepted");
    }

    Ok(results)
}

fn exit_code(results: &[SendResult]) -> ExitCode {
    if results.iter().all(|result| result.success) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn verify(handler: &WebhookHandler, payload: &[u8], signature: &str) -> Result<ExitCode> {
    if !handler.verify(payload, signature) {
        warn!("Webhook signature mismatch");
        eprintln!("signature mismatch");
        return Ok(ExitCode::FAILURE);
    }

    let events = handler.parse(payload).context("Failed to parse webhook payload")?.into_events();
    info!(events = events.len(), "Webhook payload verified");

    let events = events.iter().map(WebhookEvent::to_json).collect::<Vec<_>>();
    print_json(&events)?;
    Ok(ExitCode::SUCCESS)
}

fn webhook_handler(config: &Config) -> Result<WebhookHandler> {
    if config.webhook_secret.is_none() {
        anyhow::bail!("webhook_secret is not configured (set MAILWIRE_WEBHOOK_SECRET)");
    }
    Ok(config.to_webhook_handler())
}

async fn read_payload(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path).await.with_context(|| format!("Failed to read {}", path.display()))
}

async fn read_messages(path: &Path) -> Result<Vec<Message>> {
    let payload = read_payload(path).await?;
    let value: Value = serde_json::from_slice(&payload)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;

    match value {
        Value::Array(_) => serde_json::from_value(value)
            .with_context(|| format!("{} does not contain a list of messages", path.display())),
        _ => anyhow::bail!("{} must contain a JSON array of messages", path.display()),
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    let output = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{output}");
    Ok(())
}
