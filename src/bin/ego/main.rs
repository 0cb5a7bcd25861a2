#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    missing_docs,
    rustdoc::broken_intra_doc_links,
    rustdoc::missing_crate_level_docs
)]

//! Sends a single email through one of the supported providers

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use ego::{
    domain::communication::{
        backend::Backend,
        email::{Address, Attachment, Email, Recipient},
    },
    infrastructure::{
        email::{
            DummyBackend, MandrillBackend, MandrillConfig, PostageAppBackend, PostageAppConfig,
            SendGridBackend, SendGridConfig,
        },
        http::{HttpClientConfig, ReqwestTransport},
    },
};
use tracing::info;

/// Command-line arguments / environment variables
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Args {
    /// The outgoing HTTP client configuration
    #[clap(flatten)]
    pub http: HttpClientConfig,

    /// The message to send
    #[clap(flatten)]
    pub message: MessageArgs,

    /// The provider to send through
    #[command(subcommand)]
    pub provider: Provider,
}

/// Supported providers
#[derive(Debug, Subcommand)]
pub enum Provider {
    /// Send through Mandrill
    Mandrill(MandrillConfig),

    /// Send through SendGrid
    #[command(name = "sendgrid")]
    SendGrid(SendGridConfig),

    /// Send through PostageApp
    #[command(name = "postageapp")]
    PostageApp(PostageAppConfig),

    /// Log the message instead of sending it
    Dummy,
}

/// Message fields
#[derive(Debug, Parser)]
pub struct MessageArgs {
    /// Sender, as `Name <address>` or a bare address
    #[arg(long)]
    pub from: Address,

    /// Reply-To address
    #[arg(long)]
    pub reply_to: Option<Address>,

    /// Primary recipient (repeatable)
    #[arg(long, required = true)]
    pub to: Vec<Address>,

    /// Carbon copy recipient (repeatable)
    #[arg(long)]
    pub cc: Vec<Address>,

    /// Blind carbon copy recipient (repeatable)
    #[arg(long)]
    pub bcc: Vec<Address>,

    /// Subject line
    #[arg(long, default_value = "")]
    pub subject: String,

    /// Plain text body
    #[arg(long, default_value = "")]
    pub text: String,

    /// HTML body
    #[arg(long, default_value = "")]
    pub html: String,

    /// Tag (repeatable)
    #[arg(long)]
    pub tag: Vec<String>,

    /// Provider-hosted template name
    #[arg(long)]
    pub template: Option<String>,

    /// Template variable as `key=value` (repeatable)
    #[arg(long = "var", value_parser = parse_key_value)]
    pub vars: Vec<(String, String)>,

    /// Custom header as `name=value` (repeatable)
    #[arg(long = "header", value_parser = parse_key_value)]
    pub headers: Vec<(String, String)>,

    /// File to attach (repeatable)
    #[arg(long = "attach")]
    pub attachments: Vec<PathBuf>,

    /// Scheduled delivery time, RFC 3339
    #[arg(long, value_parser = parse_send_at)]
    pub send_at: Option<DateTime<Utc>>,
}

impl MessageArgs {
    fn into_email(self) -> Result<Email> {
        let mut email = Email::new(self.from);

        email.reply_to = self.reply_to;
        email.to = self.to.into_iter().map(Recipient::new).collect();
        email.cc = self.cc.into_iter().map(Recipient::new).collect();
        email.bcc = self.bcc.into_iter().map(Recipient::new).collect();
        email.subject = self.subject;
        email.text_body = self.text;
        email.html_body = self.html;
        email.tags = self.tag;
        email.template_id = self.template;
        email.template_context = self.vars.into_iter().collect();
        email.headers = self.headers.into_iter().collect();
        email.delivery_time = self.send_at;

        for path in self.attachments {
            let mimetype = mime_guess::from_path(&path)
                .first()
                .map(|mime| mime.to_string())
                .unwrap_or_else(|| "application/octet-stream".to_string());

            let attachment = Attachment::from_path(&path, mimetype)
                .with_context(|| format!("failed to open {}", path.display()))?;

            email.attachments.push(attachment);
        }

        Ok(email)
    }
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.trim().to_string(), value.to_string()))
        .filter(|(key, _)| !key.is_empty())
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))
}

fn parse_send_at(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|e| e.to_string())
}

fn backend(provider: Provider, http: &HttpClientConfig) -> Result<Box<dyn Backend>> {
    let backend: Box<dyn Backend> = match provider {
        Provider::Mandrill(config) => Box::new(MandrillBackend::new(
            config,
            Arc::new(ReqwestTransport::new(http)?),
        )),
        Provider::SendGrid(config) => Box::new(SendGridBackend::new(
            config,
            Arc::new(ReqwestTransport::new(http)?),
        )),
        Provider::PostageApp(config) => Box::new(PostageAppBackend::new(
            config,
            Arc::new(ReqwestTransport::new(http)?),
        )),
        Provider::Dummy => Box::new(DummyBackend::with_tracing()),
    };

    Ok(backend)
}

#[mutants::skip]
#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine, credentials can come from the environment
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Failed to load environment: {}", e);

            return Err(e.into());
        }
    }

    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let backend = backend(args.provider, &args.http)?;
    let mut email = args.message.into_email()?;

    backend
        .send(&mut email)
        .await
        .with_context(|| format!("{} refused the email", backend.name()))?;

    info!(provider = backend.name(), recipients = email.to.len(), "email sent");

    Ok(())
}
