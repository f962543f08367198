//! Municipal roadworks open-data feed

use futures::future::FutureExt;
use reqwest::Client;

use super::error::ProviderError;
use super::http::send_json;
use super::types::Roadwork;
use super::{non_empty, normalize, ProviderFuture, RoadworksSource};

const PROVIDER: &str = "roadworks";

/// Vancouver Open Data road projects dataset
pub const DEFAULT_ROADWORKS_URL: &str =
    "https://opendata.vancouver.ca/api/explore/v2.1/catalog/datasets/road-ahead-upcoming-projects/records?limit=100";

/// Scrapes roadworks from a JSON or GeoJSON endpoint
#[derive(Debug, Clone)]
pub struct HttpRoadworksFeed {
    http_client: Client,
    url: String,
}

impl HttpRoadworksFeed {
    pub fn new(http_client: Client, url: impl Into<String>) -> Self {
        Self {
            http_client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn fetch_all(&self) -> Result<Vec<Roadwork>, ProviderError> {
        let payload = send_json(PROVIDER, self.http_client.get(&self.url)).await?;
        non_empty(PROVIDER, normalize::roadworks(&payload))
    }
}

impl RoadworksSource for HttpRoadworksFeed {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn scrape(&self) -> ProviderFuture<'_, Vec<Roadwork>> {
        self.fetch_all().boxed()
    }
}
