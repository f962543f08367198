//! TomTom Search, Routing, Traffic and Map API client

use futures::future::FutureExt;
use reqwest::Client;

use super::error::ProviderError;
use super::http::{join_url, send_json};
use super::types::{GeoCandidate, Incident, RoutePath, SearchQuery, TileSource, TrafficConditions, TravelMode};
use super::{non_empty, normalize, Geocoder, ProviderFuture, Router, TrafficFeed};
use crate::geo::{BoundingBox, LatLon};

const PROVIDER: &str = "tomtom";

/// Base URL for all TomTom APIs
pub const TOMTOM_BASE_URL: &str = "https://api.tomtom.com";

/// Fields requested from the incident details endpoint
const INCIDENT_FIELDS: &str = "{incidents{type,geometry{type,coordinates},properties{id,iconCategory,\
magnitudeOfDelay,events{description,code},startTime,endTime,from,to,delay,roadNumbers}}}";

/// Client for the TomTom APIs
#[derive(Debug, Clone)]
pub struct TomTomClient {
    http_client: Client,
    api_key: String,
    /// Base URL (allows override for testing)
    base_url: String,
}

impl TomTomClient {
    pub fn new(http_client: Client, api_key: impl Into<String>) -> Self {
        Self {
            http_client,
            api_key: api_key.into(),
            base_url: TOMTOM_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Raster tile endpoint for the basic map style
    pub fn tile_source(&self) -> TileSource {
        TileSource {
            provider: PROVIDER.to_string(),
            url_template: format!(
                "{}?key={}",
                self.url("map/1/tile/basic/main/{z}/{x}/{y}.png"),
                self.api_key
            ),
            attribution: "© TomTom".to_string(),
            max_zoom: 22,
        }
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    /// Search endpoint with the query text as an encoded path segment
    fn search_url(&self, text: &str) -> String {
        self.url(&format!("search/2/search/{}.json", urlencoding::encode(text.trim())))
    }

    async fn geocode(&self, query: &SearchQuery, typeahead: bool) -> Result<Vec<GeoCandidate>, ProviderError> {
        let url = self.search_url(&query.text);
        let mut params = vec![
            ("key", self.api_key.clone()),
            ("limit", query.limit.to_string()),
            ("typeahead", typeahead.to_string()),
        ];
        if let Some(bias) = query.bias {
            params.push(("lat", bias.lat.to_string()));
            params.push(("lon", bias.lon.to_string()));
        }

        let payload = send_json(PROVIDER, self.http_client.get(url).query(&params)).await?;
        non_empty(PROVIDER, normalize::tomtom_geocode(&payload))
    }

    async fn reverse_geocode(&self, position: LatLon) -> Result<Vec<GeoCandidate>, ProviderError> {
        let url = self.url(&format!("search/2/reverseGeocode/{},{}.json", position.lat, position.lon));
        let request = self.http_client.get(url).query(&[("key", self.api_key.as_str())]);

        let payload = send_json(PROVIDER, request).await?;
        non_empty(PROVIDER, normalize::tomtom_reverse(&payload))
    }

    async fn calculate_route(
        &self,
        origin: LatLon,
        destination: LatLon,
        mode: TravelMode,
    ) -> Result<Vec<RoutePath>, ProviderError> {
        let url = self.url(&format!(
            "routing/1/calculateRoute/{},{}:{},{}/json",
            origin.lat, origin.lon, destination.lat, destination.lon
        ));
        let request = self.http_client.get(url).query(&[
            ("key", self.api_key.as_str()),
            ("travelMode", mode.as_str()),
            ("instructionsType", "coded"),
            ("routeRepresentation", "polyline"),
        ]);

        let payload = send_json(PROVIDER, request).await?;
        non_empty(PROVIDER, normalize::tomtom_route(&payload))
    }

    async fn flow_segment(&self, at: LatLon) -> Result<TrafficConditions, ProviderError> {
        let url = self.url("traffic/services/4/flowSegmentData/absolute/10/json");
        let point = format!("{},{}", at.lat, at.lon);
        let request = self.http_client.get(url).query(&[
            ("key", self.api_key.as_str()),
            ("point", point.as_str()),
            ("unit", "KMPH"),
        ]);

        let payload = send_json(PROVIDER, request).await?;
        normalize::tomtom_flow(&payload).ok_or_else(|| ProviderError::no_results(PROVIDER))
    }

    /// Incidents inside `area`; an empty list is a valid answer here
    async fn incident_details(&self, area: BoundingBox) -> Result<Vec<Incident>, ProviderError> {
        let url = self.url("traffic/services/5/incidentDetails");
        let bbox = format!("{},{},{},{}", area.west, area.south, area.east, area.north);
        let request = self.http_client.get(url).query(&[
            ("key", self.api_key.as_str()),
            ("bbox", bbox.as_str()),
            ("fields", INCIDENT_FIELDS),
            ("language", "en-GB"),
            ("timeValidityFilter", "present"),
        ]);

        let payload = send_json(PROVIDER, request).await?;
        if !payload["incidents"].is_array() {
            return Err(ProviderError::no_results(PROVIDER));
        }
        Ok(normalize::tomtom_incidents(&payload))
    }
}

impl Geocoder for TomTomClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn search<'a>(&'a self, query: &'a SearchQuery) -> ProviderFuture<'a, Vec<GeoCandidate>> {
        self.geocode(query, false).boxed()
    }

    fn autocomplete<'a>(&'a self, query: &'a SearchQuery) -> ProviderFuture<'a, Vec<GeoCandidate>> {
        self.geocode(query, true).boxed()
    }

    fn reverse(&self, position: LatLon) -> ProviderFuture<'_, Vec<GeoCandidate>> {
        self.reverse_geocode(position).boxed()
    }
}

impl Router for TomTomClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn route(&self, origin: LatLon, destination: LatLon, mode: TravelMode) -> ProviderFuture<'_, Vec<RoutePath>> {
        self.calculate_route(origin, destination, mode).boxed()
    }
}

impl TrafficFeed for TomTomClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn conditions(&self, at: LatLon) -> ProviderFuture<'_, TrafficConditions> {
        self.flow_segment(at).boxed()
    }

    fn incidents(&self, area: BoundingBox) -> ProviderFuture<'_, Vec<Incident>> {
        self.incident_details(area).boxed()
    }
}
