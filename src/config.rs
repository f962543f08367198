//! Configuration loader: merges defaults, an optional TOML file, `.env` and
//! environment variables, in increasing priority.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::{BoundingBox, GeometryOptions};
use crate::provider::nominatim::NOMINATIM_BASE_URL;
use crate::provider::osrm::OSRM_BASE_URL;
use crate::provider::roadworks::DEFAULT_ROADWORKS_URL;
use crate::provider::tomtom::TOMTOM_BASE_URL;
use crate::refresh::RefreshConfig;

/// File looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "roadwatch.toml";

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config:\n - {}", .0.join("\n - "))]
    Invalid(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    /// Directory for the durable tier; the platform cache dir when unset
    pub dir: Option<PathBuf>,
    /// Byte quota for the durable tier
    pub quota_bytes: Option<u64>,
    pub default_ttl_secs: u64,
    pub geocode_ttl_secs: u64,
    pub route_ttl_secs: u64,
    pub traffic_ttl_secs: u64,
    pub tiles_ttl_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            dir: None,
            quota_bytes: None,
            default_ttl_secs: 300,
            geocode_ttl_secs: 24 * 60 * 60,
            route_ttl_secs: 15 * 60,
            traffic_ttl_secs: 2 * 60,
            tiles_ttl_secs: 60 * 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersSection {
    /// TomTom key; TomTom is skipped in every chain when empty
    pub tomtom_api_key: String,
    pub tomtom_base_url: String,
    pub nominatim_base_url: String,
    pub osrm_base_url: String,
    pub roadworks_url: String,
    /// Per-call timeout for provider requests
    pub timeout_ms: u64,
}

impl Default for ProvidersSection {
    fn default() -> Self {
        Self {
            tomtom_api_key: String::new(),
            tomtom_base_url: TOMTOM_BASE_URL.to_string(),
            nominatim_base_url: NOMINATIM_BASE_URL.to_string(),
            osrm_base_url: OSRM_BASE_URL.to_string(),
            roadworks_url: DEFAULT_ROADWORKS_URL.to_string(),
            timeout_ms: 4_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub limit: usize,
    /// Candidates inside this box get a ranking bonus
    pub home_region: Option<BoundingBox>,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            limit: 10,
            home_region: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshSection {
    pub enabled: bool,
    pub wake_interval_secs: u64,
    pub refresh_interval_secs: u64,
    pub min_retry_interval_secs: u64,
    pub scrape_timeout_secs: u64,
    pub roadworks_ttl_secs: u64,
}

impl Default for RefreshSection {
    fn default() -> Self {
        let defaults = RefreshConfig::default();
        Self {
            enabled: defaults.enabled,
            wake_interval_secs: defaults.wake_interval.as_secs(),
            refresh_interval_secs: defaults.refresh_interval.as_secs(),
            min_retry_interval_secs: defaults.min_retry_interval.as_secs(),
            scrape_timeout_secs: defaults.scrape_timeout.as_secs(),
            roadworks_ttl_secs: defaults.roadworks_ttl.as_secs(),
        }
    }
}

/// Full configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheSection,
    pub providers: ProvidersSection,
    pub search: SearchSection,
    pub geometry: GeometryOptions,
    pub refresh: RefreshSection,
}

impl Config {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.providers.timeout_ms)
    }

    pub fn refresh_config(&self) -> RefreshConfig {
        let r = &self.refresh;
        RefreshConfig {
            wake_interval: Duration::from_secs(r.wake_interval_secs),
            refresh_interval: Duration::from_secs(r.refresh_interval_secs),
            min_retry_interval: Duration::from_secs(r.min_retry_interval_secs),
            scrape_timeout: Duration::from_secs(r.scrape_timeout_secs),
            roadworks_ttl: Duration::from_secs(r.roadworks_ttl_secs),
            enabled: r.enabled,
        }
    }
}

fn parse_bool(raw: &str) -> bool {
    let lowered = raw.trim().to_ascii_lowercase();
    lowered != "0" && lowered != "false" && lowered != "no" && lowered != "off"
}

fn parse_positive_u64(raw: &str, env_name: &str) -> Result<u64, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::Invalid(vec![format!("{env_name} must be an integer > 0")])),
    }
}

/// Applies environment overrides read through `var`
fn apply_env(config: &mut Config, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
    if let Some(key) = var("TOMTOM_API_KEY") {
        config.providers.tomtom_api_key = key.trim().to_string();
    }
    if let Some(dir) = var("ROADWATCH_CACHE_DIR") {
        config.cache.dir = Some(PathBuf::from(dir));
    }
    if let Some(raw) = var("ROADWATCH_CACHE_QUOTA_BYTES") {
        config.cache.quota_bytes = Some(parse_positive_u64(&raw, "ROADWATCH_CACHE_QUOTA_BYTES")?);
    }
    if let Some(raw) = var("ROADWATCH_TIMEOUT_MS") {
        config.providers.timeout_ms = parse_positive_u64(&raw, "ROADWATCH_TIMEOUT_MS")?;
    }
    if let Some(url) = var("ROADWATCH_ROADWORKS_URL") {
        config.providers.roadworks_url = url;
    }
    if let Some(url) = var("ROADWATCH_NOMINATIM_URL") {
        config.providers.nominatim_base_url = url;
    }
    if let Some(url) = var("ROADWATCH_OSRM_URL") {
        config.providers.osrm_base_url = url;
    }
    if let Some(raw) = var("ROADWATCH_REFRESH_ENABLED") {
        config.refresh.enabled = parse_bool(&raw);
    }
    Ok(())
}

/// Checks every value and reports all problems at once
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut issues: Vec<String> = Vec::new();

    let ttls = [
        ("cache.default_ttl_secs", config.cache.default_ttl_secs),
        ("cache.geocode_ttl_secs", config.cache.geocode_ttl_secs),
        ("cache.route_ttl_secs", config.cache.route_ttl_secs),
        ("cache.traffic_ttl_secs", config.cache.traffic_ttl_secs),
        ("cache.tiles_ttl_secs", config.cache.tiles_ttl_secs),
    ];
    for (name, value) in ttls {
        if value == 0 {
            issues.push(format!("{name} must be > 0"));
        }
    }

    if config.providers.timeout_ms == 0 {
        issues.push("providers.timeout_ms must be > 0".into());
    }
    if config.providers.roadworks_url.trim().is_empty() {
        issues.push("providers.roadworks_url must not be empty".into());
    }

    if !(1..=100).contains(&config.search.limit) {
        issues.push("search.limit must be in [1,100]".into());
    }
    if let Some(region) = config.search.home_region {
        let corners_valid =
            crate::geo::is_valid(region.south, region.west) && crate::geo::is_valid(region.north, region.east);
        if !corners_valid || region.south >= region.north || region.west >= region.east {
            issues.push("search.home_region must have south < north and west < east within range".into());
        }
    }

    let g = &config.geometry;
    if !g.tolerance_m.is_finite() || g.tolerance_m <= 0.0 {
        issues.push("geometry.tolerance_m must be > 0".into());
    }
    if g.max_points < 2 {
        issues.push("geometry.max_points must be >= 2".into());
    }
    if g.density == 0 {
        issues.push("geometry.density must be >= 1".into());
    }
    if !(0.0..=1.0).contains(&g.smoothing) {
        issues.push("geometry.smoothing must be in [0,1]".into());
    }

    let r = &config.refresh;
    if r.wake_interval_secs == 0 {
        issues.push("refresh.wake_interval_secs must be > 0".into());
    }
    if r.refresh_interval_secs == 0 {
        issues.push("refresh.refresh_interval_secs must be > 0".into());
    }
    if r.scrape_timeout_secs == 0 {
        issues.push("refresh.scrape_timeout_secs must be > 0".into());
    }
    if r.roadworks_ttl_secs == 0 {
        issues.push("refresh.roadworks_ttl_secs must be > 0".into());
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Invalid(issues))
    }
}

/// Parses TOML text over the defaults
pub fn parse_config(contents: &str) -> Result<Config, ConfigError> {
    Ok(toml::from_str(contents)?)
}

/// Loads configuration from `path` (or `roadwatch.toml` if present), `.env`
/// and the environment, then validates it
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    let default_path = Path::new(DEFAULT_CONFIG_FILE);
    let path = match path {
        Some(path) => Some(path),
        None if default_path.exists() => Some(default_path),
        None => None,
    };

    let mut config = match path {
        Some(path) => {
            let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            tracing::debug!(path = %path.display(), "Loaded config file");
            parse_config(&contents)?
        }
        None => Config::default(),
    };

    apply_env(&mut config, |name| std::env::var(name).ok())?;
    validate_config(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();

        assert!(validate_config(&config).is_ok());
        assert_eq!(config.provider_timeout(), Duration::from_secs(4));
        assert_eq!(config.refresh_config().refresh_interval, Duration::from_secs(86_400));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = parse_config(
            r#"
            [providers]
            timeout_ms = 1500

            [geometry]
            max_points = 50

            [search.home_region]
            south = 49.19
            west = -123.23
            north = 49.32
            east = -123.02
            "#,
        )
        .unwrap();

        assert_eq!(config.providers.timeout_ms, 1500);
        assert_eq!(config.providers.osrm_base_url, OSRM_BASE_URL);
        assert_eq!(config.geometry.max_points, 50);
        assert_eq!(config.geometry.density, 3);
        assert!(config.search.home_region.is_some());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        assert!(matches!(parse_config("[providers\ntimeout_ms = 1"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();

        apply_env(
            &mut config,
            env(&[
                ("TOMTOM_API_KEY", " abc123 "),
                ("ROADWATCH_TIMEOUT_MS", "2500"),
                ("ROADWATCH_REFRESH_ENABLED", "off"),
                ("ROADWATCH_CACHE_DIR", "/tmp/roadwatch"),
            ]),
        )
        .unwrap();

        assert_eq!(config.providers.tomtom_api_key, "abc123");
        assert_eq!(config.providers.timeout_ms, 2500);
        assert!(!config.refresh.enabled);
        assert_eq!(config.cache.dir, Some(PathBuf::from("/tmp/roadwatch")));
    }

    #[test]
    fn test_bad_env_number_is_rejected() {
        let mut config = Config::default();

        let err = apply_env(&mut config, env(&[("ROADWATCH_TIMEOUT_MS", "soon")])).unwrap_err();

        assert!(err.to_string().contains("ROADWATCH_TIMEOUT_MS"));
    }

    #[test]
    fn test_validation_collects_every_issue() {
        let mut config = Config::default();
        config.providers.timeout_ms = 0;
        config.search.limit = 0;
        config.geometry.smoothing = 1.5;
        config.refresh.wake_interval_secs = 0;

        let err = validate_config(&config).unwrap_err();

        match &err {
            ConfigError::Invalid(issues) => assert_eq!(issues.len(), 4),
            other => panic!("unexpected {other:?}"),
        }
        assert!(err.to_string().starts_with("Invalid config:\n - providers.timeout_ms"));
    }

    #[test]
    fn test_inverted_home_region_is_invalid() {
        let mut config = Config::default();
        config.search.home_region = Some(BoundingBox {
            south: 49.3,
            west: -123.0,
            north: 49.1,
            east: -123.2,
        });

        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_load_config_reads_given_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[search]\nlimit = 3\n").unwrap();

        let config = load_config(Some(&path)).unwrap();

        assert_eq!(config.search.limit, 3);
    }

    #[test]
    fn test_load_config_missing_file_is_read_error() {
        let err = load_config(Some(Path::new("/nonexistent/roadwatch.toml"))).unwrap_err();

        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
