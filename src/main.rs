mod cache;
mod commands;
mod config;
mod error;
mod gateway;
mod models;
mod profile;
mod roster;
mod scroll;
mod search;
mod session;
#[cfg(test)]
mod testing;
mod tui;
mod validate;

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use commands::{App, Flow, ShellLine};
use config::{Config, LogFormat};
use gateway::HttpGateway;

#[derive(Parser)]
#[command(name = "jobboard")]
#[command(about = "Job board client - search, save and apply to jobs, or manage postings")]
struct Cli {
    /// Backend base URL (overrides JOBBOARD_API_URL)
    #[arg(long)]
    api_url: Option<String>,

    /// Jobs per search page (overrides JOBBOARD_PAGE_SIZE)
    #[arg(long)]
    page_size: Option<usize>,

    /// Log output format
    #[arg(long, value_enum)]
    log_format: Option<LogArg>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogArg {
    Text,
    Json,
}

/// Logs go to stderr so command output stays readable.
fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("jobboard=warn"));
    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(url) = &cli.api_url {
        config = config.with_api_url(url)?;
    }
    if let Some(size) = cli.page_size.filter(|n| *n > 0) {
        config.page_size = size;
    }
    match cli.log_format {
        Some(LogArg::Json) => config.log_format = LogFormat::Json,
        Some(LogArg::Text) => config.log_format = LogFormat::Text,
        None => {}
    }

    init_tracing(config.log_format);
    info!(api_url = %config.api_url, page_size = config.page_size, "starting");

    let backend = Arc::new(HttpGateway::new(&config).context("Failed to build HTTP client")?);
    let mut app = App::new(config, backend);
    app.start().await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("jobboard> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let words = match commands::split_line(&line) {
            Ok(words) if words.is_empty() => continue,
            Ok(words) => words,
            Err(e) => {
                println!("error: {}", e);
                continue;
            }
        };
        let command = match ShellLine::try_parse_from(words) {
            Ok(parsed) => parsed.command,
            Err(e) => {
                // Help and usage errors both land here.
                let _ = e.print();
                continue;
            }
        };
        match app.dispatch(command).await {
            Ok(Flow::Quit) => break,
            Ok(Flow::Continue) => {}
            Err(e) => commands::report(&e),
        }
    }

    Ok(())
}
