use std::sync::Arc;

use anyhow::Context;
use sharemirror::config::{EndpointConfig, SyncConfig};
use sharemirror::sync::SyncEngine;
use sharemirror_core::ShareClient;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CliMode {
    Run,
    Help,
}

fn parse_cli_mode<I>(args: I) -> anyhow::Result<CliMode>
where
    I: IntoIterator<Item = String>,
{
    let mut mode = CliMode::Run;
    for arg in args.into_iter().skip(1) {
        match arg.as_str() {
            "--help" | "-h" => mode = CliMode::Help,
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(mode)
}

fn print_help() {
    println!("Usage: sharemirror");
    println!("  Mirrors the source share onto the destination share.");
    println!("  Endpoints and credentials are read from SHAREMIRROR_* environment variables");
    println!("  (a .env file in the working directory is honored).");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn connect(endpoint: &EndpointConfig, role: &str) -> anyhow::Result<ShareClient> {
    ShareClient::new(
        &endpoint.base_url,
        endpoint.share.clone(),
        endpoint.credential.clone(),
    )
    .with_context(|| format!("invalid {role} endpoint {}", endpoint.base_url))
}

async fn wait_for_enter() -> anyhow::Result<()> {
    println!("Press Enter to exit.");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("failed to read from stdin")?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    if parse_cli_mode(std::env::args())? == CliMode::Help {
        print_help();
        return Ok(());
    }
    init_tracing();

    let config = SyncConfig::from_env().context("invalid configuration")?;
    let source = connect(&config.source, "source")?;
    let destination = connect(&config.destination, "destination")?;
    info!(
        source = %format!("{}/{}", config.source.base_url, config.source.share),
        destination = %format!("{}/{}", config.destination.base_url, config.destination.share),
        workers = config.workers,
        max_in_flight = config.max_in_flight,
        "starting sync"
    );

    let engine = SyncEngine::new(
        Arc::new(source),
        Arc::new(destination),
        config.sync_options(),
    );
    let result = engine.run().await;
    match &result {
        Ok(_) => println!("Sync complete."),
        Err(err) => error!(%err, "sync did not complete"),
    }

    if config.pause_on_exit {
        wait_for_enter().await?;
    }
    result.map(|_| ()).context("sync failed")
}
