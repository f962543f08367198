//! roadwatch library
//!
//! Geospatial data layer: geocoding, routing, traffic and roadworks behind
//! provider fallback chains and a two-tier TTL cache.

pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
pub mod fetch;
pub mod geo;
pub mod provider;
pub mod refresh;
pub mod service;
