//! Raster tile endpoint probing

use futures::future::FutureExt;
use reqwest::Client;

use super::error::ProviderError;
use super::types::TileSource;
use super::{ProviderFuture, TileProbe};

/// Raw OpenStreetMap tiles, the last resort for the map layer
pub fn osm_fallback() -> TileSource {
    TileSource {
        provider: "osm".to_string(),
        url_template: "https://tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
        attribution: "© OpenStreetMap contributors".to_string(),
        max_zoom: 19,
    }
}

/// Probes a tile source by fetching one low-zoom tile
#[derive(Debug, Clone)]
pub struct HttpTileProbe {
    http_client: Client,
}

impl HttpTileProbe {
    pub fn new(http_client: Client) -> Self {
        Self { http_client }
    }

    async fn fetch_tile(&self, source: &TileSource) -> Result<(), ProviderError> {
        let response = self.http_client.get(source.tile_url(1, 0, 0)).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ProviderError::from_status(&source.provider, status.as_u16(), ""))
        }
    }
}

impl TileProbe for HttpTileProbe {
    fn probe<'a>(&'a self, source: &'a TileSource) -> ProviderFuture<'a, ()> {
        self.fetch_tile(source).boxed()
    }
}
