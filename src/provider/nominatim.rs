//! Nominatim (OpenStreetMap) geocoding client

use futures::future::FutureExt;
use reqwest::Client;

use super::error::ProviderError;
use super::http::{join_url, send_json};
use super::types::{GeoCandidate, SearchQuery};
use super::{non_empty, normalize, Geocoder, ProviderFuture};
use crate::geo::{BoundingBox, LatLon};

const PROVIDER: &str = "nominatim";

pub const NOMINATIM_BASE_URL: &str = "https://nominatim.openstreetmap.org";

/// Radius of the preferred viewbox drawn around a bias location
const BIAS_RADIUS_M: f64 = 50_000.0;

/// Client for the public Nominatim API
#[derive(Debug, Clone)]
pub struct NominatimClient {
    http_client: Client,
    base_url: String,
}

impl NominatimClient {
    pub fn new(http_client: Client) -> Self {
        Self {
            http_client,
            base_url: NOMINATIM_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn search_places(&self, query: &SearchQuery) -> Result<Vec<GeoCandidate>, ProviderError> {
        let mut params = vec![
            ("q", query.text.trim().to_string()),
            ("format", "jsonv2".to_string()),
            ("addressdetails", "1".to_string()),
            ("extratags", "1".to_string()),
            ("limit", query.limit.to_string()),
        ];
        // viewbox prefers, but does not restrict to, the area
        if let Some(bias) = query.bias {
            params.push(("viewbox", viewbox(BoundingBox::around(bias, BIAS_RADIUS_M))));
        }

        let request = self.http_client.get(join_url(&self.base_url, "search")).query(&params);
        let payload = send_json(PROVIDER, request).await?;
        non_empty(PROVIDER, normalize::nominatim_geocode(&payload))
    }

    async fn reverse_place(&self, position: LatLon) -> Result<Vec<GeoCandidate>, ProviderError> {
        let request = self.http_client.get(join_url(&self.base_url, "reverse")).query(&[
            ("lat", position.lat.to_string()),
            ("lon", position.lon.to_string()),
            ("format", "jsonv2".to_string()),
            ("addressdetails", "1".to_string()),
        ]);

        let payload = send_json(PROVIDER, request).await?;
        non_empty(PROVIDER, normalize::nominatim_geocode(&payload))
    }
}

/// Nominatim `viewbox` parameter: `left,top,right,bottom`
fn viewbox(area: BoundingBox) -> String {
    format!("{},{},{},{}", area.west, area.north, area.east, area.south)
}

impl Geocoder for NominatimClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn search<'a>(&'a self, query: &'a SearchQuery) -> ProviderFuture<'a, Vec<GeoCandidate>> {
        self.search_places(query).boxed()
    }

    fn reverse(&self, position: LatLon) -> ProviderFuture<'_, Vec<GeoCandidate>> {
        self.reverse_place(position).boxed()
    }
}
