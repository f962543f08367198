//! Resilient fetch orchestration
//!
//! Checks the cache, then calls providers in their configured order, each
//! raced against a timer. The first success is written back to the cache.
//! When every provider fails the last cached value is returned even if it
//! has expired, and only when there is none is the result `Unavailable`.
//! Failures never surface as errors from here.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::{CachedData, TtlCache};
use crate::provider::ProviderError;

/// How current a returned value is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    /// Fetched from a provider just now
    Live,
    /// Served from cache, younger than half its TTL
    Cached,
    /// Served from cache, past half its TTL
    Aging,
    /// Expired cache entry returned because every provider failed
    Stale,
    /// Nothing available
    Unavailable,
}

/// A value together with where it came from and how old it is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fetched<T> {
    pub value: Option<T>,
    pub freshness: Freshness,
    /// Provider name, or `cache`
    pub source: Option<String>,
    pub age_seconds: Option<u64>,
}

impl<T> Fetched<T> {
    pub fn live(value: T, source: impl Into<String>) -> Self {
        Self {
            value: Some(value),
            freshness: Freshness::Live,
            source: Some(source.into()),
            age_seconds: Some(0),
        }
    }

    /// Wraps a cache read, classifying it by age
    pub fn from_cache(hit: CachedData<T>) -> Self {
        let freshness = if hit.is_expired {
            Freshness::Stale
        } else if hit.is_fresh {
            Freshness::Cached
        } else {
            Freshness::Aging
        };
        Self {
            value: Some(hit.value),
            freshness,
            source: Some("cache".to_string()),
            age_seconds: Some(hit.age_seconds),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            value: None,
            freshness: Freshness::Unavailable,
            source: None,
            age_seconds: None,
        }
    }

    /// Transforms the value, keeping the metadata
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetched<U> {
        Fetched {
            value: self.value.map(f),
            freshness: self.freshness,
            source: self.source,
            age_seconds: self.age_seconds,
        }
    }
}

/// One provider attempt, not yet started
pub struct ProviderCall<'a, T> {
    pub provider: String,
    pub call: BoxFuture<'a, Result<T, ProviderError>>,
}

impl<'a, T> ProviderCall<'a, T> {
    pub fn new(
        provider: impl Into<String>,
        call: impl Future<Output = Result<T, ProviderError>> + Send + 'a,
    ) -> Self {
        Self {
            provider: provider.into(),
            call: call.boxed(),
        }
    }
}

/// Builds a deterministic cache key from request parameters
///
/// Pairs are sorted by key. Values that parse as numbers are rounded to five
/// decimals (about a meter), everything else is trimmed and lowercased.
pub fn request_signature(params: &[(&str, String)]) -> String {
    let mut pairs: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| {
            let v = v.trim();
            let v = match v.parse::<f64>() {
                Ok(n) if n.is_finite() => format!("{:.5}", n),
                _ => v.to_lowercase(),
            };
            (k.to_string(), v)
        })
        .collect();
    pairs.sort();

    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Runs provider calls with timeouts, fallback and cache write-back
#[derive(Debug, Clone)]
pub struct Orchestrator {
    cache: Arc<TtlCache>,
    timeout: Duration,
}

impl Orchestrator {
    pub fn new(cache: Arc<TtlCache>, timeout: Duration) -> Self {
        Self { cache, timeout }
    }

    pub fn cache(&self) -> &Arc<TtlCache> {
        &self.cache
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs one call against the per-call timer
    ///
    /// On timeout the call's future is dropped, so a late response is
    /// discarded.
    pub async fn race<T>(&self, call: ProviderCall<'_, T>) -> Result<T, ProviderError> {
        match tokio::time::timeout(self.timeout, call.call).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                provider: call.provider,
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    /// Tries each call in order until one succeeds, without touching the cache
    pub async fn first_success<T>(&self, calls: Vec<ProviderCall<'_, T>>) -> Result<(String, T), ProviderError> {
        let mut last_error = None;

        for call in calls {
            let provider = call.provider.clone();
            match self.race(call).await {
                Ok(value) => return Ok((provider, value)),
                Err(e) => {
                    info!(provider = %provider, error = %e, "Provider failed, trying next");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ProviderError::no_results("none")))
    }

    /// Cache-first fetch with ordered provider fallback
    ///
    /// A valid cache entry is returned without network access. Otherwise the
    /// calls run strictly in order and the first success is cached under
    /// `namespace`/`signature` with `ttl`. If all fail, an expired entry is
    /// returned as `Stale`, else the result is `Unavailable`.
    pub async fn fetch_with_fallback<T>(
        &self,
        namespace: &str,
        signature: &str,
        ttl: Duration,
        calls: Vec<ProviderCall<'_, T>>,
    ) -> Fetched<T>
    where
        T: Serialize + DeserializeOwned,
    {
        // peek keeps an expired entry around as the stale fallback
        let cached = self.cache.peek::<T>(namespace, signature);
        let stale = match cached {
            Some(hit) if !hit.is_expired => {
                debug!(namespace, signature, age = hit.age_seconds, "Serving from cache");
                return Fetched::from_cache(hit);
            }
            other => other,
        };

        match self.first_success(calls).await {
            Ok((provider, value)) => {
                if let Err(e) = self.cache.set_with_ttl(namespace, signature, &value, ttl) {
                    warn!(namespace, error = %e, "Failed to cache provider result");
                }
                Fetched::live(value, provider)
            }
            Err(e) => match stale {
                Some(old) => {
                    warn!(namespace, error = %e, age = old.age_seconds, "All providers failed, serving stale data");
                    Fetched::from_cache(old)
                }
                None => {
                    warn!(namespace, error = %e, "All providers failed and nothing is cached");
                    Fetched::unavailable()
                }
            },
        }
    }
}
