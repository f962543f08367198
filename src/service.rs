//! Geospatial service facade
//!
//! The single entry point for callers. Inputs are validated up front and a
//! malformed coordinate, radius or query is the only error returned; provider
//! trouble shows up as the `freshness` of the result instead.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cache::{DiskStore, DurableStore, TtlCache};
use crate::config::{CacheSection, Config};
use crate::fetch::{request_signature, Fetched, Orchestrator, ProviderCall};
use crate::geo::{extract_turns, prepare_for_display, BoundingBox, GeoError, GeometryOptions, LatLon, TurnIndicator};
use crate::provider::http::build_client;
use crate::provider::{
    osm_fallback, search_or_autocomplete, GeoCandidate, Geocoder, HttpRoadworksFeed, HttpTileProbe, Incident,
    NominatimClient, OsrmClient, ProviderError, RankedCandidate, Roadwork, RoutePath, Router, Scorer, SearchQuery,
    TileProbe, TileSource, TomTomClient, TrafficConditions, TrafficFeed, TravelMode,
};
use crate::refresh::{RefreshError, RefreshScheduler, ROADWORKS_KEY, ROADWORKS_NAMESPACE};

const GEOCODE_NAMESPACE: &str = "geocode";
const REVERSE_NAMESPACE: &str = "reverse";
const ROUTE_NAMESPACE: &str = "route";
const TRAFFIC_NAMESPACE: &str = "traffic";
const INCIDENTS_NAMESPACE: &str = "incidents";
const TILES_NAMESPACE: &str = "tiles";

/// Largest accepted search radius
pub const MAX_RADIUS_KM: f64 = 200.0;

/// Provider chains, each in fallback order
pub struct Providers {
    pub geocoders: Vec<Arc<dyn Geocoder>>,
    pub routers: Vec<Arc<dyn Router>>,
    pub traffic: Option<Arc<dyn TrafficFeed>>,
    /// Tile endpoints to probe; raw OpenStreetMap is always appended last
    pub tile_sources: Vec<TileSource>,
    pub tile_probe: Arc<dyn TileProbe>,
}

/// Cache lifetimes per kind of result
#[derive(Debug, Clone)]
pub struct CacheTtls {
    pub geocode: Duration,
    pub route: Duration,
    pub traffic: Duration,
    pub tiles: Duration,
}

impl From<&CacheSection> for CacheTtls {
    fn from(section: &CacheSection) -> Self {
        Self {
            geocode: Duration::from_secs(section.geocode_ttl_secs),
            route: Duration::from_secs(section.route_ttl_secs),
            traffic: Duration::from_secs(section.traffic_ttl_secs),
            tiles: Duration::from_secs(section.tiles_ttl_secs),
        }
    }
}

/// Tunables that are not provider wiring
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub scorer: Scorer,
    pub geometry: GeometryOptions,
    pub ttls: CacheTtls,
    pub search_limit: usize,
}

/// Traffic picture around a point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyReport {
    pub center: LatLon,
    pub radius_km: f64,
    pub conditions: Fetched<TrafficConditions>,
    /// Incidents within the radius, nearest first
    pub incidents: Fetched<Vec<Incident>>,
    /// Roadworks within the radius, nearest first
    pub roadworks: Fetched<Vec<Roadwork>>,
}

/// A route ready for drawing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayRoute {
    pub points: Vec<LatLon>,
    pub turns: Vec<TurnIndicator>,
    pub distance_m: Option<f64>,
    pub duration_s: Option<f64>,
    /// Point count before simplification
    pub source_points: usize,
}

impl DisplayRoute {
    /// Runs the geometry pipeline and turn extraction over a provider route
    pub fn from_path(path: &RoutePath, opts: &GeometryOptions) -> Self {
        Self {
            points: prepare_for_display(&path.points, opts),
            turns: extract_turns(&path.steps),
            distance_m: path.distance_m,
            duration_s: path.duration_s,
            source_points: path.points.len(),
        }
    }
}

/// Keeps items within `radius_m` of `center`, nearest first
fn within_radius<T>(items: Vec<T>, center: LatLon, radius_m: f64, position: impl Fn(&T) -> LatLon) -> Vec<T> {
    let mut near: Vec<(f64, T)> = items
        .into_iter()
        .map(|item| (center.distance_m(&position(&item)), item))
        .filter(|(distance, _)| *distance <= radius_m)
        .collect();
    near.sort_by(|a, b| a.0.total_cmp(&b.0));
    near.into_iter().map(|(_, item)| item).collect()
}

fn validate_radius(radius_km: f64) -> Result<f64, GeoError> {
    if radius_km.is_finite() && radius_km > 0.0 && radius_km <= MAX_RADIUS_KM {
        Ok(radius_km)
    } else {
        Err(GeoError::InvalidRadius(radius_km))
    }
}

/// Builds the cache tier and the scheduler-state store
///
/// The state store lives outside the cache directory so clearing the cache
/// keeps the refresh backoff.
fn durable_stores(section: &CacheSection) -> (Option<Arc<dyn DurableStore>>, Option<Arc<dyn DurableStore>>) {
    let (cache_store, state_store) = match &section.dir {
        Some(dir) => (
            Some(DiskStore::with_dir(dir.clone())),
            Some(DiskStore::with_dir(dir.join("state"))),
        ),
        None => (DiskStore::new(), DiskStore::in_data_dir()),
    };
    if cache_store.is_none() {
        warn!("No cache directory available, cache is memory-only");
    }

    let cache_store = cache_store.map(|store| match section.quota_bytes {
        Some(quota) => store.with_quota(quota),
        None => store,
    });
    (
        cache_store.map(|s| Arc::new(s) as Arc<dyn DurableStore>),
        state_store.map(|s| Arc::new(s) as Arc<dyn DurableStore>),
    )
}

/// Geospatial data layer entry point
pub struct GeoService {
    orchestrator: Orchestrator,
    providers: Providers,
    scheduler: Arc<RefreshScheduler>,
    options: ServiceOptions,
}

impl GeoService {
    pub fn new(
        orchestrator: Orchestrator,
        providers: Providers,
        scheduler: Arc<RefreshScheduler>,
        options: ServiceOptions,
    ) -> Self {
        Self {
            orchestrator,
            providers,
            scheduler,
            options,
        }
    }

    /// Wires the real HTTP providers from configuration
    ///
    /// TomTom is left out of every chain when no API key is configured.
    pub fn from_config(config: &Config) -> Result<Self, ProviderError> {
        let http = build_client()?;
        let (durable, state_store) = durable_stores(&config.cache);
        let cache = Arc::new(
            TtlCache::new(durable).with_default_ttl(Duration::from_secs(config.cache.default_ttl_secs)),
        );

        let p = &config.providers;
        let tomtom = (!p.tomtom_api_key.is_empty()).then(|| {
            Arc::new(TomTomClient::new(http.clone(), p.tomtom_api_key.as_str()).with_base_url(p.tomtom_base_url.as_str()))
        });
        if tomtom.is_none() {
            info!("No TomTom API key configured, using open providers only");
        }
        let nominatim = Arc::new(NominatimClient::new(http.clone()).with_base_url(p.nominatim_base_url.as_str()));
        let osrm = Arc::new(OsrmClient::new(http.clone()).with_base_url(p.osrm_base_url.as_str()));

        let mut geocoders: Vec<Arc<dyn Geocoder>> = Vec::new();
        let mut routers: Vec<Arc<dyn Router>> = Vec::new();
        let mut tile_sources = Vec::new();
        if let Some(tomtom) = &tomtom {
            geocoders.push(tomtom.clone());
            routers.push(tomtom.clone());
            tile_sources.push(tomtom.tile_source());
        }
        geocoders.push(nominatim);
        routers.push(osrm);

        let providers = Providers {
            geocoders,
            routers,
            traffic: tomtom.map(|t| t as Arc<dyn TrafficFeed>),
            tile_sources,
            tile_probe: Arc::new(HttpTileProbe::new(http.clone())),
        };

        let feed = Arc::new(HttpRoadworksFeed::new(http, p.roadworks_url.as_str()));
        let scheduler = Arc::new(RefreshScheduler::new(feed, cache.clone(), state_store, config.refresh_config()));

        let options = ServiceOptions {
            scorer: Scorer::new(config.search.home_region),
            geometry: config.geometry.clone(),
            ttls: CacheTtls::from(&config.cache),
            search_limit: config.search.limit,
        };

        Ok(Self::new(
            Orchestrator::new(cache, config.provider_timeout()),
            providers,
            scheduler,
            options,
        ))
    }

    pub fn cache(&self) -> &Arc<TtlCache> {
        self.orchestrator.cache()
    }

    pub fn scheduler(&self) -> &Arc<RefreshScheduler> {
        &self.scheduler
    }

    /// Traffic conditions, incidents and roadworks around a point
    ///
    /// Conditions and incidents are fetched in parallel and settle
    /// independently. Roadworks come from the refresh cache and may be stale.
    pub async fn get_nearby(&self, lat: f64, lon: f64, radius_km: f64) -> Result<NearbyReport, GeoError> {
        let center = LatLon::new(lat, lon)?;
        let radius_km = validate_radius(radius_km)?;
        let radius_m = radius_km * 1000.0;
        let area = BoundingBox::around(center, radius_m);

        let point_sig = request_signature(&[("lat", lat.to_string()), ("lon", lon.to_string())]);
        let area_sig = request_signature(&[
            ("lat", lat.to_string()),
            ("lon", lon.to_string()),
            ("radius_km", radius_km.to_string()),
        ]);

        let feed = self.providers.traffic.as_deref();
        let condition_calls = feed
            .into_iter()
            .map(|f| ProviderCall::new(f.name(), f.conditions(center)))
            .collect();
        let incident_calls = feed
            .into_iter()
            .map(|f| ProviderCall::new(f.name(), f.incidents(area)))
            .collect();

        let ttl = self.options.ttls.traffic;
        let (conditions, incidents) = futures::join!(
            self.orchestrator
                .fetch_with_fallback(TRAFFIC_NAMESPACE, &point_sig, ttl, condition_calls),
            self.orchestrator
                .fetch_with_fallback::<Vec<Incident>>(INCIDENTS_NAMESPACE, &area_sig, ttl, incident_calls),
        );

        let roadworks = self.cached_roadworks();

        Ok(NearbyReport {
            center,
            radius_km,
            conditions,
            incidents: incidents.map(|list| within_radius(list, center, radius_m, |i| i.position)),
            roadworks: roadworks.map(|list| within_radius(list, center, radius_m, |r| r.position)),
        })
    }

    fn cached_roadworks(&self) -> Fetched<Vec<Roadwork>> {
        self.cache()
            .peek::<Vec<Roadwork>>(ROADWORKS_NAMESPACE, ROADWORKS_KEY)
            .map(Fetched::from_cache)
            .unwrap_or_else(Fetched::unavailable)
    }

    /// Forward geocoding, ranked best first
    pub async fn search(&self, text: &str, bias: Option<LatLon>) -> Result<Fetched<Vec<RankedCandidate>>, GeoError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(GeoError::EmptyQuery);
        }
        if let Some(b) = bias {
            LatLon::new(b.lat, b.lon)?;
        }

        let limit = self.options.search_limit;
        let query = SearchQuery {
            text: text.to_string(),
            bias,
            limit,
        };
        let mut params = vec![("q", text.to_string()), ("limit", limit.to_string())];
        if let Some(b) = bias {
            params.push(("lat", b.lat.to_string()));
            params.push(("lon", b.lon.to_string()));
        }
        let signature = request_signature(&params);

        let calls = self
            .providers
            .geocoders
            .iter()
            .map(|g| ProviderCall::new(g.name(), search_or_autocomplete(g.as_ref(), &query)))
            .collect();
        let fetched: Fetched<Vec<GeoCandidate>> = self
            .orchestrator
            .fetch_with_fallback(GEOCODE_NAMESPACE, &signature, self.options.ttls.geocode, calls)
            .await;

        Ok(fetched.map(|candidates| {
            let mut ranked = self.options.scorer.rank(candidates, text, bias);
            ranked.truncate(limit);
            ranked
        }))
    }

    /// Reverse geocoding
    pub async fn reverse(&self, lat: f64, lon: f64) -> Result<Fetched<Vec<GeoCandidate>>, GeoError> {
        let position = LatLon::new(lat, lon)?;
        let signature = request_signature(&[("lat", lat.to_string()), ("lon", lon.to_string())]);

        let calls = self
            .providers
            .geocoders
            .iter()
            .map(|g| ProviderCall::new(g.name(), g.reverse(position)))
            .collect();

        Ok(self
            .orchestrator
            .fetch_with_fallback(REVERSE_NAMESPACE, &signature, self.options.ttls.geocode, calls)
            .await)
    }

    /// Route between two points, simplified for display with turn markers
    ///
    /// The first route of the first provider that answers is used, and the
    /// processed result is what gets cached.
    pub async fn get_route(
        &self,
        origin: LatLon,
        destination: LatLon,
        mode: TravelMode,
    ) -> Result<Fetched<DisplayRoute>, GeoError> {
        let origin = LatLon::new(origin.lat, origin.lon)?;
        let destination = LatLon::new(destination.lat, destination.lon)?;
        let signature = request_signature(&[
            ("from_lat", origin.lat.to_string()),
            ("from_lon", origin.lon.to_string()),
            ("to_lat", destination.lat.to_string()),
            ("to_lon", destination.lon.to_string()),
            ("mode", mode.as_str().to_string()),
        ]);

        let geometry = &self.options.geometry;
        let calls = self
            .providers
            .routers
            .iter()
            .map(|router| {
                ProviderCall::new(router.name(), async move {
                    let routes = router.route(origin, destination, mode).await?;
                    let first = routes
                        .first()
                        .ok_or_else(|| ProviderError::no_results(router.name()))?;
                    Ok::<_, ProviderError>(DisplayRoute::from_path(first, geometry))
                })
            })
            .collect();

        Ok(self
            .orchestrator
            .fetch_with_fallback(ROUTE_NAMESPACE, &signature, self.options.ttls.route, calls)
            .await)
    }

    /// Scrapes roadworks now, outside the schedule
    pub async fn refresh_now(&self) -> Result<usize, RefreshError> {
        self.scheduler.refresh_now().await
    }

    /// First tile endpoint that answers a probe; raw OpenStreetMap otherwise
    pub async fn tile_source(&self) -> Fetched<TileSource> {
        let probe = self.providers.tile_probe.as_ref();
        let mut calls: Vec<ProviderCall<'_, TileSource>> = self
            .providers
            .tile_sources
            .iter()
            .map(|source| {
                ProviderCall::new(source.provider.as_str(), async move {
                    probe.probe(source).await?;
                    Ok::<_, ProviderError>(source.clone())
                })
            })
            .collect();
        let osm = osm_fallback();
        calls.push(ProviderCall::new(osm.provider.clone(), async move { Ok(osm) }));

        self.orchestrator
            .fetch_with_fallback(TILES_NAMESPACE, "default", self.options.ttls.tiles, calls)
            .await
    }
}
