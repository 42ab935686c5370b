//! Plex CLI - run one multiplexed envelope against the built-in handlers.
//!
//! ```text
//! plex [--xml|--json] [--timeout <millis>] [FILE]
//! ```
//!
//! The envelope is read from FILE, or stdin when FILE is absent or `-`.
//! The response envelope goes to stdout; logs and fatal errors go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use plex_config::PlexConfig;
use plex_core::{Multiplexer, RequestMeta, Settings, format_error};
use plex_dispatch::HandlerRegistry;
use plex_types::Format;

fn init_tracing(config_level: Option<&str>) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config_level.unwrap_or("info")))
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    // stdout carries the response; logs must stay off it.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

/// Run one multiplexed call envelope against the built-in handlers.
#[derive(Debug, Parser)]
#[command(name = "plex", version, long_about = None)]
struct Cli {
    /// Parse and answer the envelope as XML
    #[arg(long, group = "format")]
    xml: bool,

    /// Parse and answer the envelope as JSON
    #[arg(long, group = "format")]
    json: bool,

    /// Deadline in milliseconds when the envelope sets no connection-timeout (negative waits forever)
    #[arg(long, value_name = "MILLIS", allow_hyphen_values = true)]
    timeout: Option<i64>,

    /// Envelope file; stdin when absent or `-`
    input: Option<PathBuf>,
}

impl Cli {
    fn format(&self) -> Option<Format> {
        if self.xml {
            Some(Format::Xml)
        } else if self.json {
            Some(Format::Json)
        } else {
            None
        }
    }

    fn input(&self) -> Option<&PathBuf> {
        self.input.as_ref().filter(|path| path.as_os_str() != "-")
    }

    fn settings(&self, config: Option<&PlexConfig>) -> Settings {
        let mut settings = Settings::from_config(config);
        if let Some(format) = self.format() {
            settings.default_format = format;
        }
        if let Some(timeout) = self.timeout {
            settings.default_timeout_ms = timeout;
        }
        settings
    }
}

async fn read_input(input: Option<&PathBuf>) -> Result<String> {
    match input {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut text = String::new();
            tokio::io::stdin()
                .read_to_string(&mut text)
                .await
                .context("failed to read stdin")?;
            Ok(text)
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = PlexConfig::load();
    let level = config
        .as_ref()
        .ok()
        .and_then(Option::as_ref)
        .and_then(|config| config.log.as_ref())
        .and_then(plex_config::LogConfig::level);
    init_tracing(level.as_deref());
    let config = match config {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(path = %err.path().display(), "Ignoring config: {err}");
            None
        }
    };

    let settings = cli.settings(config.as_ref());
    let text = read_input(cli.input()).await?;
    let format = settings.default_format;
    let mux = Multiplexer::new(Arc::new(HandlerRegistry::with_builtins()?), settings);

    match mux.handle(&text, format, &RequestMeta::default()).await {
        Ok(response) => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(response.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            eprintln!("{}", format_error(&err));
            Ok(ExitCode::FAILURE)
        }
    }
}
