//! Normalized data shapes produced by every provider adapter

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::{LatLon, ManeuverStep};

/// Whether a candidate is a plain address or a point of interest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    Address,
    Poi,
}

/// Address parts; missing parts are empty strings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressFields {
    /// Single-line formatted address
    pub line: String,
    pub street: String,
    pub house_number: String,
    pub city: String,
    pub postal_code: String,
    pub country_code: String,
}

/// Point-of-interest details; missing parts are empty
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoiFields {
    pub name: String,
    pub phone: String,
    pub website: String,
    pub categories: Vec<String>,
}

/// A geocoding match in the common shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoCandidate {
    pub position: LatLon,
    pub address: AddressFields,
    pub poi: Option<PoiFields>,
    pub kind: CandidateKind,
    /// Provider relevance normalized to 0..=1
    pub relevance_score: f64,
    /// Provider that produced the match
    pub provider: String,
    /// Ordinal supplied by the provider, if any
    pub provider_rank: Option<u32>,
}

impl GeoCandidate {
    /// Text used for matching against a query: the POI name, else the address line
    pub fn label(&self) -> &str {
        match &self.poi {
            Some(poi) if !poi.name.is_empty() => &poi.name,
            _ => &self.address.line,
        }
    }
}

/// Travel mode for routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TravelMode {
    #[default]
    Car,
    Bicycle,
    Pedestrian,
}

impl TravelMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TravelMode::Car => "car",
            TravelMode::Bicycle => "bicycle",
            TravelMode::Pedestrian => "pedestrian",
        }
    }
}

/// A provider route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutePath {
    pub points: Vec<LatLon>,
    pub steps: Vec<ManeuverStep>,
    pub distance_m: Option<f64>,
    pub duration_s: Option<f64>,
}

/// Category of a traffic incident
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentCategory {
    Accident,
    Jam,
    Roadworks,
    LaneClosed,
    RoadClosed,
    Hazard,
    Weather,
    Unknown,
}

/// A traffic incident near the area of interest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    pub id: String,
    pub position: LatLon,
    pub category: IncidentCategory,
    /// Magnitude of delay, 0 (unknown) to 4 (road closed)
    pub severity: u8,
    pub description: String,
    pub road: Option<String>,
    pub delay_seconds: Option<u32>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

/// Coarse congestion level derived from speeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Congestion {
    Free,
    Moderate,
    Heavy,
    Closed,
}

/// Traffic flow at a point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficConditions {
    pub current_speed_kmh: f64,
    pub free_flow_speed_kmh: f64,
    /// Provider confidence, 0..=1
    pub confidence: f64,
    pub road_closure: bool,
    pub congestion: Congestion,
}

/// A municipal roadworks record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Roadwork {
    pub id: String,
    pub position: LatLon,
    pub description: String,
    pub status: String,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

/// A raster tile endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileSource {
    pub provider: String,
    /// URL with `{z}`, `{x}` and `{y}` placeholders
    pub url_template: String,
    pub attribution: String,
    pub max_zoom: u8,
}

impl TileSource {
    /// Fills in the template for one tile
    pub fn tile_url(&self, z: u8, x: u32, y: u32) -> String {
        self.url_template
            .replace("{z}", &z.to_string())
            .replace("{x}", &x.to_string())
            .replace("{y}", &y.to_string())
    }
}

/// A geocoding request
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub text: String,
    pub bias: Option<LatLon>,
    pub limit: usize,
}
