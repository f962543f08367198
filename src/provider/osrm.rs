//! OSRM routing client

use futures::future::FutureExt;
use reqwest::Client;
use serde_json::Value;

use super::error::ProviderError;
use super::http::join_url;
use super::types::{RoutePath, TravelMode};
use super::{non_empty, normalize, ProviderFuture, Router};
use crate::geo::LatLon;

const PROVIDER: &str = "osrm";

pub const OSRM_BASE_URL: &str = "https://router.project-osrm.org";

/// Client for an OSRM `route` service
#[derive(Debug, Clone)]
pub struct OsrmClient {
    http_client: Client,
    base_url: String,
}

fn profile(mode: TravelMode) -> &'static str {
    match mode {
        TravelMode::Car => "driving",
        TravelMode::Bicycle => "cycling",
        TravelMode::Pedestrian => "foot",
    }
}

/// Interprets an OSRM answer
///
/// OSRM reports failures through a `code` field in the body, sometimes with
/// a 400 status. `NoRoute`/`NoSegment` mean the points cannot be connected.
fn classify(status: u16, body: &str) -> Result<Vec<RoutePath>, ProviderError> {
    let payload: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    match payload["code"].as_str().unwrap_or_default() {
        "Ok" => non_empty(PROVIDER, normalize::osrm_route(&payload)),
        "NoRoute" | "NoSegment" => Err(ProviderError::no_results(PROVIDER)),
        _ if !(200..300).contains(&status) => Err(ProviderError::from_status(PROVIDER, status, body)),
        _ => Err(ProviderError::Upstream {
            provider: PROVIDER.to_string(),
            status,
        }),
    }
}

impl OsrmClient {
    pub fn new(http_client: Client) -> Self {
        Self {
            http_client,
            base_url: OSRM_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn fetch_route(
        &self,
        origin: LatLon,
        destination: LatLon,
        mode: TravelMode,
    ) -> Result<Vec<RoutePath>, ProviderError> {
        let url = join_url(
            &self.base_url,
            &format!(
                "route/v1/{}/{},{};{},{}",
                profile(mode),
                origin.lon,
                origin.lat,
                destination.lon,
                destination.lat
            ),
        );
        let response = self
            .http_client
            .get(url)
            .query(&[("overview", "full"), ("geometries", "geojson"), ("steps", "true")])
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        classify(status, &body)
    }
}

impl Router for OsrmClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn route(&self, origin: LatLon, destination: LatLon, mode: TravelMode) -> ProviderFuture<'_, Vec<RoutePath>> {
        self.fetch_route(origin, destination, mode).boxed()
    }
}
