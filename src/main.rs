//! roadwatch - traffic, routing and roadworks lookups
//!
//! Every command prints its result as JSON on stdout. Logs go to stderr and
//! are filtered with `RUST_LOG` (default `roadwatch=info`).

use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use roadwatch::cli::{CacheAction, Cli, Command};
use roadwatch::config::load_config;
use roadwatch::refresh::{RefreshHandle, RefreshMessage};
use roadwatch::service::GeoService;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("roadwatch=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_daemon(service: &GeoService) {
    let mut handle = RefreshHandle::spawn(service.scheduler().clone());
    info!(config = ?service.scheduler().config(), "Refresh loop started");

    loop {
        tokio::select! {
            message = handle.receiver.recv() => match message {
                Some(RefreshMessage::RefreshCompleted { roadworks, next_due_at }) => {
                    info!(roadworks, %next_due_at, "Roadworks refreshed");
                }
                Some(RefreshMessage::RefreshError(e)) => warn!(error = %e, "Roadworks refresh failed"),
                Some(RefreshMessage::NotDue { next_due_at }) => info!(%next_due_at, "Roadworks refresh not due"),
                Some(RefreshMessage::Busy) => info!("Roadworks refresh already running"),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping refresh loop");
                break;
            }
        }
    }
    handle.shutdown().await;
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(cli.config.as_deref())?;
    let service = GeoService::from_config(&config)?;

    match cli.command {
        Command::Search { query, near } => print_json(&service.search(&query, near).await?)?,
        Command::Reverse { lat, lon } => print_json(&service.reverse(lat, lon).await?)?,
        Command::Nearby { lat, lon, radius_km } => print_json(&service.get_nearby(lat, lon, radius_km).await?)?,
        Command::Route { from, to, mode } => print_json(&service.get_route(from, to, mode).await?)?,
        Command::Refresh => {
            let count = service.refresh_now().await?;
            print_json(&serde_json::json!({ "roadworks": count }))?;
        }
        Command::Tiles => print_json(&service.tile_source().await)?,
        Command::Cache { action } => match action {
            CacheAction::Clear => {
                service.cache().clear_all();
                print_json(&serde_json::json!({ "cleared": "all" }))?;
            }
            CacheAction::ClearExpired => {
                let removed = service.cache().clear_expired();
                print_json(&serde_json::json!({ "removed": removed }))?;
            }
        },
        Command::Daemon => run_daemon(&service).await,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
