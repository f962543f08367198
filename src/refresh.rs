//! Background roadworks refresh
//!
//! The scheduler wakes on an interval and re-scrapes the roadworks feed when
//! the last success is older than the refresh interval and the last error is
//! older than the minimum retry interval. At most one scrape runs at a time;
//! the automatic loop and manual refreshes share the same guard.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cache::{DurableStore, TtlCache};
use crate::clock::SharedClock;
use crate::provider::{ProviderError, RoadworksSource};

/// Cache namespace and key holding the latest roadworks list
pub const ROADWORKS_NAMESPACE: &str = "roadworks";
pub const ROADWORKS_KEY: &str = "all";

/// Durable record holding the scheduler state
pub const SCRAPE_STATE_KEY: &str = "refresh:scrape_state";

/// Errors returned to manual refresh callers
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("A roadworks refresh is already running")]
    Busy,

    #[error("Roadworks scrape failed: {0}")]
    Scrape(#[from] ProviderError),
}

/// Timestamps of the last scrape outcomes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeState {
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error_at: Option<DateTime<Utc>>,
}

/// Configuration for the refresh loop
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// How often the loop wakes to check whether a scrape is due
    pub wake_interval: Duration,
    /// Minimum age of the last success before scraping again
    pub refresh_interval: Duration,
    /// Minimum age of the last error before retrying
    pub min_retry_interval: Duration,
    /// Upper bound on a single scrape
    pub scrape_timeout: Duration,
    /// TTL of the cached roadworks list
    pub roadworks_ttl: Duration,
    /// Whether the background loop runs at all
    pub enabled: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            wake_interval: Duration::from_secs(60 * 60),
            refresh_interval: Duration::from_secs(24 * 60 * 60),
            min_retry_interval: Duration::from_secs(6 * 60 * 60),
            scrape_timeout: Duration::from_secs(60),
            roadworks_ttl: Duration::from_secs(48 * 60 * 60),
            enabled: true,
        }
    }
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::days(365 * 100))
}

fn elapsed_since(now: DateTime<Utc>, then: DateTime<Utc>) -> Duration {
    (now - then).to_std().unwrap_or(Duration::ZERO)
}

/// Whether a scrape is due at `now`
pub fn should_scrape(state: &ScrapeState, now: DateTime<Utc>, config: &RefreshConfig) -> bool {
    let stale = match state.last_success_at {
        None => true,
        Some(at) => elapsed_since(now, at) >= config.refresh_interval,
    };
    let retry_allowed = match state.last_error_at {
        None => true,
        Some(at) => elapsed_since(now, at) >= config.min_retry_interval,
    };
    stale && retry_allowed
}

/// Earliest time at which `should_scrape` turns true; `now` if it already is
pub fn next_due_at(state: &ScrapeState, now: DateTime<Utc>, config: &RefreshConfig) -> DateTime<Utc> {
    let after_success = state.last_success_at.map(|at| at + to_chrono(config.refresh_interval));
    let after_error = state.last_error_at.map(|at| at + to_chrono(config.min_retry_interval));
    [after_success, after_error].into_iter().flatten().fold(now, |a, b| a.max(b))
}

/// Messages published by the background loop after each wake
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshMessage {
    /// A scrape ran and stored this many roadworks
    RefreshCompleted {
        roadworks: usize,
        next_due_at: DateTime<Utc>,
    },
    /// A scrape ran and failed
    RefreshError(String),
    /// Nothing was due
    NotDue { next_due_at: DateTime<Utc> },
    /// Another scrape was already running
    Busy,
}

/// Clears the in-flight flag when dropped, including on cancellation
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Roadworks refresh scheduler
pub struct RefreshScheduler {
    source: Arc<dyn RoadworksSource>,
    cache: Arc<TtlCache>,
    /// Where the scrape state is persisted, kept apart from the cache tiers
    state_store: Option<Arc<dyn DurableStore>>,
    clock: SharedClock,
    config: RefreshConfig,
    state: Mutex<ScrapeState>,
    in_flight: AtomicBool,
}

impl std::fmt::Debug for RefreshScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshScheduler")
            .field("source", &self.source.name())
            .field("config", &self.config)
            .field("state", &self.state())
            .field("in_flight", &self.is_in_flight())
            .finish()
    }
}

impl RefreshScheduler {
    /// Creates a scheduler, restoring any persisted scrape state
    ///
    /// Time is read from the cache's clock.
    pub fn new(
        source: Arc<dyn RoadworksSource>,
        cache: Arc<TtlCache>,
        state_store: Option<Arc<dyn DurableStore>>,
        config: RefreshConfig,
    ) -> Self {
        let state = state_store.as_deref().map(load_state).unwrap_or_default();
        debug!(?state, "Loaded scrape state");

        Self {
            source,
            clock: cache.clock().clone(),
            cache,
            state_store,
            config,
            state: Mutex::new(state),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &RefreshConfig {
        &self.config
    }

    /// Snapshot of the current scrape state
    pub fn state(&self) -> ScrapeState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn next_due_at(&self) -> DateTime<Utc> {
        next_due_at(&self.state(), self.clock.now(), &self.config)
    }

    fn try_begin(&self) -> Option<InFlightGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(&self.in_flight))
    }

    fn update_state(&self, f: impl FnOnce(&mut ScrapeState)) -> ScrapeState {
        let snapshot = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            f(&mut state);
            state.clone()
        };

        if let Some(store) = &self.state_store {
            match serde_json::to_string(&snapshot) {
                Ok(raw) => {
                    if let Err(e) = store.save(SCRAPE_STATE_KEY, &raw) {
                        warn!(error = %e, "Failed to persist scrape state");
                    }
                }
                Err(e) => warn!(error = %e, "Failed to encode scrape state"),
            }
        }
        snapshot
    }

    /// Runs one scrape; the caller holds the in-flight guard
    async fn scrape(&self) -> Result<usize, RefreshError> {
        let timeout = self.config.scrape_timeout;
        let result = match tokio::time::timeout(timeout, self.source.scrape()).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                provider: self.source.name().to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        };
        let now = self.clock.now();

        match result {
            Ok(roadworks) => {
                if let Err(e) =
                    self.cache
                        .set_with_ttl(ROADWORKS_NAMESPACE, ROADWORKS_KEY, &roadworks, self.config.roadworks_ttl)
                {
                    warn!(error = %e, "Failed to cache roadworks");
                }
                let state = self.update_state(|s| {
                    s.last_success_at = Some(now);
                    s.last_error_at = None;
                });
                info!(
                    count = roadworks.len(),
                    next_due_at = %next_due_at(&state, now, &self.config),
                    "Roadworks refreshed"
                );
                Ok(roadworks.len())
            }
            Err(e) => {
                self.update_state(|s| s.last_error_at = Some(now));
                Err(RefreshError::Scrape(e))
            }
        }
    }

    /// One wake of the background loop
    ///
    /// Skips when nothing is due or another scrape is running. Failures are
    /// logged and reported in the returned message, never raised.
    pub async fn tick(&self) -> RefreshMessage {
        let now = self.clock.now();
        let state = self.state();
        if !should_scrape(&state, now, &self.config) {
            let next = next_due_at(&state, now, &self.config);
            debug!(next_due_at = %next, "Roadworks refresh not due");
            return RefreshMessage::NotDue { next_due_at: next };
        }

        let Some(_guard) = self.try_begin() else {
            debug!("Roadworks refresh already running, skipping tick");
            return RefreshMessage::Busy;
        };

        match self.scrape().await {
            Ok(roadworks) => RefreshMessage::RefreshCompleted {
                roadworks,
                next_due_at: self.next_due_at(),
            },
            Err(e) => {
                warn!(error = %e, "Scheduled roadworks refresh failed");
                RefreshMessage::RefreshError(e.to_string())
            }
        }
    }

    /// Scrapes immediately, ignoring the schedule
    ///
    /// Returns the number of roadworks stored.
    pub async fn refresh_now(&self) -> Result<usize, RefreshError> {
        let _guard = self.try_begin().ok_or(RefreshError::Busy)?;
        self.scrape().await
    }
}

fn load_state(store: &dyn DurableStore) -> ScrapeState {
    match store.load(SCRAPE_STATE_KEY) {
        Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(error = %e, "Ignoring unreadable scrape state");
            ScrapeState::default()
        }),
        Ok(None) => ScrapeState::default(),
        Err(e) => {
            warn!(error = %e, "Failed to read scrape state");
            ScrapeState::default()
        }
    }
}

/// Handle for controlling the background refresh loop
pub struct RefreshHandle {
    /// Channel for receiving refresh messages
    pub receiver: mpsc::Receiver<RefreshMessage>,
    shutdown_tx: mpsc::Sender<()>,
}

impl RefreshHandle {
    /// Spawns the wake loop
    ///
    /// The first wake happens immediately so an overdue refresh runs at
    /// startup. When the scheduler is disabled no task is spawned.
    pub fn spawn(scheduler: Arc<RefreshScheduler>) -> Self {
        let (msg_tx, msg_rx) = mpsc::channel(32);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        if scheduler.config.enabled {
            let wake_interval = scheduler.config.wake_interval;

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(wake_interval);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            let message = scheduler.tick().await;
                            if msg_tx.send(message).await.is_err() {
                                debug!("Refresh receiver dropped, stopping loop");
                                break;
                            }
                        }
                        _ = shutdown_rx.recv() => {
                            break;
                        }
                    }
                }
            });
        }

        Self {
            receiver: msg_rx,
            shutdown_tx,
        }
    }

    /// Stops the background loop
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}
