//! Coordinates, distances and route geometry
//!
//! Distances are in meters throughout. Point-to-point distances use the
//! haversine formula; the simplifier measures chord distances in a local
//! equirectangular projection, which is accurate at street scale.

pub mod simplify;
pub mod turns;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use simplify::{interpolate, prepare_for_display, reduce, smooth, smooth_passes, GeometryOptions};
pub use turns::{extract_turns, ManeuverKind, ManeuverStep, TurnIndicator};

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Meters per degree of latitude (and of longitude at the equator)
pub const METERS_PER_DEGREE: f64 = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;

/// Errors for malformed geographic input
///
/// These indicate a caller bug rather than a network condition and are the
/// only errors the public service surface returns.
#[derive(Debug, Error, PartialEq)]
pub enum GeoError {
    #[error("Invalid coordinates: lat={lat}, lon={lon}")]
    InvalidCoordinates { lat: f64, lon: f64 },

    #[error("Invalid radius: {0} km")]
    InvalidRadius(f64),

    #[error("Search query is empty")]
    EmptyQuery,
}

/// A WGS84 position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    /// Creates a validated position
    pub fn new(lat: f64, lon: f64) -> Result<Self, GeoError> {
        if is_valid(lat, lon) {
            Ok(Self { lat, lon })
        } else {
            Err(GeoError::InvalidCoordinates { lat, lon })
        }
    }

    /// Creates a position from provider `[lon, lat]` order, if valid
    pub fn from_lon_lat(pair: [f64; 2]) -> Option<Self> {
        Self::new(pair[1], pair[0]).ok()
    }

    /// Great-circle distance to `other` in meters
    pub fn distance_m(&self, other: &LatLon) -> f64 {
        haversine_m(*self, *other)
    }
}

/// Whether `lat`/`lon` are finite and inside their valid ranges
pub fn is_valid(lat: f64, lon: f64) -> bool {
    lat.is_finite() && lon.is_finite() && (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)
}

/// Haversine distance between two positions in meters
pub fn haversine_m(a: LatLon, b: LatLon) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Converts a tolerance expressed in degrees to meters (0.00008° ≈ 8.9 m)
pub fn degrees_to_meters(degrees: f64) -> f64 {
    degrees * METERS_PER_DEGREE
}

/// Axis-aligned box in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl BoundingBox {
    /// Box enclosing a circle of `radius_m` around `center`
    pub fn around(center: LatLon, radius_m: f64) -> Self {
        let d_lat = radius_m / METERS_PER_DEGREE;
        let cos = center.lat.to_radians().cos().max(1e-6);
        let d_lon = (radius_m / (METERS_PER_DEGREE * cos)).min(180.0);
        Self {
            south: (center.lat - d_lat).max(-90.0),
            west: (center.lon - d_lon).max(-180.0),
            north: (center.lat + d_lat).min(90.0),
            east: (center.lon + d_lon).min(180.0),
        }
    }

    pub fn contains(&self, p: LatLon) -> bool {
        p.lat >= self.south && p.lat <= self.north && p.lon >= self.west && p.lon <= self.east
    }
}
