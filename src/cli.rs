//! Command-line interface parsing for roadwatch
//!
//! Each subcommand maps onto one service operation. Points are given as
//! `LAT,LON` pairs.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::geo::LatLon;
use crate::provider::TravelMode;

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// The point is not two comma-separated numbers
    #[error("Invalid point: '{0}'. Expected LAT,LON, e.g. 49.2827,-123.1207")]
    InvalidPoint(String),
}

/// roadwatch - traffic, routing and roadworks lookups with offline fallback
#[derive(Parser, Debug)]
#[command(name = "roadwatch")]
#[command(about = "Traffic, routing and roadworks lookups with offline fallback")]
#[command(version)]
pub struct Cli {
    /// TOML config file; `roadwatch.toml` in the working directory is used when present
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Geocode an address or place name
    Search {
        query: String,
        /// Rank results near this point
        #[arg(long, value_name = "LAT,LON", value_parser = parse_point_arg, allow_hyphen_values = true)]
        near: Option<LatLon>,
    },
    /// Look up the address at a position
    Reverse {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
    },
    /// Traffic conditions, incidents and roadworks around a position
    Nearby {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
        #[arg(long, default_value_t = 5.0)]
        radius_km: f64,
    },
    /// Plan a route between two points
    Route {
        #[arg(value_name = "FROM", value_parser = parse_point_arg, allow_hyphen_values = true)]
        from: LatLon,
        #[arg(value_name = "TO", value_parser = parse_point_arg, allow_hyphen_values = true)]
        to: LatLon,
        #[arg(long, value_enum, default_value_t = TravelMode::Car)]
        mode: TravelMode,
    },
    /// Scrape the roadworks feed now
    Refresh,
    /// Show the map tile endpoint in use
    Tiles,
    /// Manage the local cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Run the roadworks refresh loop until interrupted
    Daemon,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAction {
    /// Remove every cached entry
    Clear,
    /// Remove only expired entries
    ClearExpired,
}

/// Parses a `LAT,LON` pair
///
/// Range checks are left to the service so every entry point reports them
/// the same way.
pub fn parse_point(s: &str) -> Result<LatLon, CliError> {
    let invalid = || CliError::InvalidPoint(s.to_string());
    let (lat, lon) = s.split_once(',').ok_or_else(invalid)?;
    let lat = lat.trim().parse::<f64>().map_err(|_| invalid())?;
    let lon = lon.trim().parse::<f64>().map_err(|_| invalid())?;
    Ok(LatLon { lat, lon })
}

fn parse_point_arg(s: &str) -> Result<LatLon, String> {
    parse_point(s).map_err(|e| e.to_string())
}
