//! Provider adapters
//!
//! Each external provider sits behind a small trait so the fetch orchestrator
//! and the tests can swap in fakes. Trait methods return boxed futures; the
//! HTTP clients normalize every payload into the types in `types` before
//! returning, and an answer with nothing usable in it is reported as
//! `ProviderError::NoResults`.

pub mod error;
pub mod http;
pub mod nominatim;
pub mod normalize;
pub mod osrm;
pub mod roadworks;
pub mod score;
pub mod tiles;
pub mod tomtom;
pub mod types;

use futures::future::{BoxFuture, FutureExt};
use tracing::info;

use crate::geo::{BoundingBox, LatLon};

pub use error::ProviderError;
pub use nominatim::NominatimClient;
pub use osrm::OsrmClient;
pub use roadworks::HttpRoadworksFeed;
pub use score::{RankedCandidate, Scorer};
pub use tiles::{osm_fallback, HttpTileProbe};
pub use tomtom::TomTomClient;
pub use types::{
    AddressFields, CandidateKind, Congestion, GeoCandidate, Incident, IncidentCategory, PoiFields, Roadwork,
    RoutePath, SearchQuery, TileSource, TrafficConditions, TravelMode,
};

/// Shorthand for the boxed futures returned by provider traits
pub type ProviderFuture<'a, T> = BoxFuture<'a, Result<T, ProviderError>>;

/// Forward and reverse geocoding
pub trait Geocoder: Send + Sync {
    fn name(&self) -> &str;

    /// Full search form
    fn search<'a>(&'a self, query: &'a SearchQuery) -> ProviderFuture<'a, Vec<GeoCandidate>>;

    /// Lighter typeahead form, used after a structural rejection of `search`
    fn autocomplete<'a>(&'a self, _query: &'a SearchQuery) -> ProviderFuture<'a, Vec<GeoCandidate>> {
        let provider = self.name().to_string();
        async move {
            Err(ProviderError::Structural {
                provider,
                reason: "autocomplete is not supported".to_string(),
            })
        }
        .boxed()
    }

    fn reverse(&self, position: LatLon) -> ProviderFuture<'_, Vec<GeoCandidate>>;
}

/// Turn-by-turn routing
pub trait Router: Send + Sync {
    fn name(&self) -> &str;

    fn route(&self, origin: LatLon, destination: LatLon, mode: TravelMode) -> ProviderFuture<'_, Vec<RoutePath>>;
}

/// Live traffic flow and incidents
pub trait TrafficFeed: Send + Sync {
    fn name(&self) -> &str;

    fn conditions(&self, at: LatLon) -> ProviderFuture<'_, TrafficConditions>;

    fn incidents(&self, area: BoundingBox) -> ProviderFuture<'_, Vec<Incident>>;
}

/// Source of the municipal roadworks list
pub trait RoadworksSource: Send + Sync {
    fn name(&self) -> &str;

    fn scrape(&self) -> ProviderFuture<'_, Vec<Roadwork>>;
}

/// Checks that a tile endpoint answers
pub trait TileProbe: Send + Sync {
    fn probe<'a>(&'a self, source: &'a TileSource) -> ProviderFuture<'a, ()>;
}

/// Runs the full search form, retrying once with autocomplete on a structural rejection
pub async fn search_or_autocomplete(
    geocoder: &dyn Geocoder,
    query: &SearchQuery,
) -> Result<Vec<GeoCandidate>, ProviderError> {
    match geocoder.search(query).await {
        Err(e) if e.is_structural() => {
            info!(provider = geocoder.name(), error = %e, "Search form rejected, retrying as autocomplete");
            geocoder.autocomplete(query).await
        }
        other => other,
    }
}

/// Turns an empty list into `NoResults` so fallback chains move on
pub(crate) fn non_empty<T>(provider: &str, items: Vec<T>) -> Result<Vec<T>, ProviderError> {
    if items.is_empty() {
        Err(ProviderError::no_results(provider))
    } else {
        Ok(items)
    }
}
