//! Resilient fetch orchestration
//!
//! Ties the cache store, failure tracker, relay pool, and mode controller
//! into a single read path: cache first, then a direct fetch, then relay
//! fallback when the failure looks like a sandbox restriction, then the
//! stale cache entry as a last resort. This ordering maximizes the chance
//! of returning something to the UI while still tracking genuine failures
//! for mode-switching.
//!
//! Cancellation: dropping the returned future aborts any in-flight HTTP
//! request, and tracker updates only happen after an await completes, so an
//! abandoned request never counts as a failure.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{CacheStore, Lookup};
use crate::failsafe::FailureTracker;
use crate::mode::ModeController;
use crate::relay::RelayPool;
use crate::Result;

/// Per-call request descriptor, constructed by a domain repository
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Cache key (see [`crate::cache::cache_key`])
    pub cache_key: String,
    /// TTL applied when the fetched payload is cached
    pub ttl: Duration,
    /// Target URL for relay fallback; `None` disables the relay path
    pub relay_target: Option<String>,
}

/// Interface a domain repository exposes to the orchestrator
#[async_trait]
pub trait DomainSource: Send + Sync {
    /// Request parameters (location, feed URL, ...)
    type Params: Send + Sync;

    /// Fetch the payload directly from the origin
    async fn fetch_direct(&self, params: &Self::Params) -> Result<Value>;

    /// Origin URL to route through a relay, if relaying applies
    fn relay_target(&self, params: &Self::Params) -> Option<String>;

    /// Cache key for these parameters
    fn cache_key(&self, params: &Self::Params) -> String;

    /// TTL for these parameters
    fn ttl(&self, params: &Self::Params) -> Duration;
}

/// Resilient fetch orchestrator
///
/// Explicitly constructed and shared by the domain repositories; holds no
/// global state.
pub struct ResilientFetcher {
    cache: Arc<CacheStore>,
    tracker: Arc<FailureTracker>,
    relays: Arc<RelayPool>,
    mode: Arc<ModeController>,
}

impl ResilientFetcher {
    /// Create an orchestrator over the shared resilience components
    #[must_use]
    pub fn new(
        cache: Arc<CacheStore>,
        tracker: Arc<FailureTracker>,
        relays: Arc<RelayPool>,
        mode: Arc<ModeController>,
    ) -> Self {
        Self {
            cache,
            tracker,
            relays,
            mode,
        }
    }

    /// Execute one resilient fetch
    ///
    /// 1. A fresh cache hit returns immediately, with no network activity
    ///    and no tracker interaction.
    /// 2. On miss or expiry, `fetch_direct` runs; success refreshes the
    ///    cache and clears the failure window.
    /// 3. A direct failure suggestive of a sandbox restriction falls back to
    ///    the relay pool, iterating endpoints in preference order.
    /// 4. When every path fails the failure is recorded (possibly tripping
    ///    offline mode) and the expired cache entry, if any, is served with
    ///    its original timestamps; otherwise the last error surfaces.
    ///
    /// Validation errors (`DuplicateEntry`, `InvalidUrl`, `Config`) are not
    /// fetch failures: they skip the tracker and the stale fallback entirely.
    ///
    /// # Errors
    ///
    /// Returns a validation error unconditionally, or the last fetch error
    /// when no cached value exists at all.
    #[tracing::instrument(
        skip(self, fetch_direct),
        fields(cache_key = %request.cache_key, request_id = %uuid::Uuid::new_v4())
    )]
    pub async fn fetch<F, Fut>(&self, request: &FetchRequest, fetch_direct: F) -> Result<Value>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Value>> + Send,
    {
        let stale = match self.cache.lookup(&request.cache_key) {
            Lookup::Fresh(value) => {
                debug!("Cache hit");
                return Ok(value);
            }
            Lookup::Stale { value, cached_at } => Some((value, cached_at)),
            Lookup::Miss => None,
        };

        let mut last_err = match fetch_direct().await {
            Ok(value) => return Ok(self.complete(request, value)),
            Err(e) => e,
        };

        if last_err.suggests_sandbox_block() {
            if let Some(target) = &request.relay_target {
                debug!(error = %last_err, "Direct fetch failed, trying relay fallback");
                for endpoint in self.relays.in_preference_order() {
                    match self.relays.fetch_through(&endpoint, target).await {
                        Ok(body) => {
                            return Ok(self.complete(request, parse_payload(body)));
                        }
                        Err(e) => last_err = e,
                    }
                }
            }
        }

        // Domain-level validation errors are not fetch failures: they are
        // surfaced directly, never recorded, and never masked by a stale entry.
        let Some(kind) = last_err.failure_kind() else {
            return Err(last_err);
        };
        if self.tracker.record_failure(kind) {
            self.mode
                .go_offline("consecutive fetch failures reached the trip threshold");
        }

        match stale {
            Some((value, cached_at)) => {
                warn!(
                    %cached_at,
                    error = %last_err,
                    "All fetch paths failed, serving stale cache entry"
                );
                Ok(value)
            }
            None => Err(last_err),
        }
    }

    /// Resilient fetch driven by a [`DomainSource`] implementation
    ///
    /// # Errors
    ///
    /// Same contract as [`ResilientFetcher::fetch`].
    pub async fn fetch_from<D: DomainSource>(
        &self,
        source: &D,
        params: &D::Params,
    ) -> Result<Value> {
        let request = FetchRequest {
            cache_key: source.cache_key(params),
            ttl: source.ttl(params),
            relay_target: source.relay_target(params),
        };
        self.fetch(&request, || source.fetch_direct(params)).await
    }

    fn complete(&self, request: &FetchRequest, value: Value) -> Value {
        self.cache
            .set(&request.cache_key, value.clone(), request.ttl);
        self.tracker.record_success();
        value
    }
}

/// Convert a relayed response body into a cacheable payload
///
/// Relayed bodies are raw text; JSON payloads are parsed, anything else
/// (feed XML, plain text) is carried as a JSON string for the domain
/// repository to interpret.
fn parse_payload(body: String) -> Value {
    serde_json::from_str(&body).unwrap_or(Value::String(body))
}
