mod capture;
mod cli;
mod config;
mod error;
mod forward;
mod gate;
mod orchestrator;
mod registry;
mod server;
mod state_machine;
mod ui;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use capture::CaptureRunner;
use cli::{Cli, Command};
use config::AgentConfig;
use forward::ForwardClient;
use gate::AdmissionGate;
use orchestrator::Pipeline;
use registry::JobRegistry;
use server::AppState;
use ui::CaptureProgress;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AgentConfig::load(cli.config.as_deref())?;
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    init_logging(&config, cli.verbose);

    match cli.command {
        Command::Serve { port } => {
            if let Some(port) = port {
                config.port = port;
            }
            run_server(config).await
        }
        Command::Capture { output } => run_capture(config, output.as_deref()).await,
        Command::Status { url } => {
            let url = match url {
                Some(url) => url,
                None => format!("http://{}", config.listen_addr()?),
            };
            show_status(&url).await
        }
    }
}

fn init_logging(config: &AgentConfig, verbose: bool) {
    // RUST_LOG wins unless --verbose asked for debug explicitly.
    let filter = if verbose {
        EnvFilter::new(&config.logging.level)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    match config.logging.format.as_str() {
        "json" => builder.json().init(),
        _ => builder.pretty().init(),
    }
}

async fn run_server(config: AgentConfig) -> Result<()> {
    tracing::info!("Starting capture-agent v{}", env!("CARGO_PKG_VERSION"));

    let runner = CaptureRunner::new(config.capture.clone());
    let sender = ForwardClient::new(&config.forward).context("failed to build HTTP client")?;
    tracing::info!("Capture command: {}", runner.command_line());
    tracing::info!(
        "Forward target: {} (timeout {}s)",
        config.forward.url,
        config.forward.timeout_secs
    );

    let pipeline = Pipeline::new(
        Arc::new(JobRegistry::new(config.jobs.reap_delay())),
        Arc::new(AdmissionGate::new()),
        Arc::new(runner),
        Arc::new(sender),
    );

    server::serve(&config, AppState::new(pipeline)).await?;
    Ok(())
}

async fn run_capture(config: AgentConfig, output: Option<&Path>) -> Result<()> {
    let runner = CaptureRunner::new(config.capture);
    let progress = CaptureProgress::start(&format!("Capturing: {}", runner.command_line()));

    let result = match runner.run().await {
        Ok(result) => result,
        Err(e) => {
            progress.failure(&format!("Capture failed: {e}"));
            return Err(e.into());
        }
    };
    progress.success(&format!(
        "Captured {} bytes in {} ms",
        result.payload.len(),
        result.duration_ms
    ));

    match output {
        Some(path) => {
            let bytes = STANDARD
                .decode(result.payload.as_bytes())
                .context("payload is not valid base64")?;
            tokio::fs::write(path, &bytes)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), bytes = bytes.len(), "Artifact saved");
        }
        None => println!("{}", result.payload),
    }
    Ok(())
}

async fn show_status(base_url: &str) -> Result<()> {
    let url = format!("{}/status", base_url.trim_end_matches('/'));
    let progress = CaptureProgress::start(&format!("Querying {url}"));

    let response = reqwest::get(&url)
        .await
        .and_then(reqwest::Response::error_for_status);
    let status: serde_json::Value = match response {
        Ok(response) => response
            .json()
            .await
            .context("agent returned a non-JSON status")?,
        Err(e) => {
            progress.failure(&format!("Agent unreachable at {base_url}"));
            return Err(error::AgentError::Http(e).into());
        }
    };

    if status["isProcessing"] == true {
        progress.warn("A capture is in progress");
    }
    progress.success("Agent is up");
    progress.print_status(&status);
    Ok(())
}
