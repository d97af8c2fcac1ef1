//! Relay endpoint pool with health probing and ordered fallback selection
//!
//! When direct network access is blocked (typically by a browser sandbox),
//! requests are routed through one of several public relay services. Each
//! relay has its own convention for embedding the target URL, so the wrap
//! rule is stored per endpoint. Selection prefers the first healthy endpoint
//! in list order, primary first; the pool is a single-shot selector and
//! exhaustive fallback iteration belongs to the orchestrator.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use futures::future::join_all;
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{RelayConfig, RelayEndpointConfig};
use crate::{Error, Result};

/// Endpoint-specific rule for embedding a target URL into a relayed request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WrapScheme {
    /// Target URL-encoded into a query parameter: `base?param=<target>`
    QueryParam {
        /// Query parameter name
        param: String,
    },
    /// Target appended to the relay path: `base/<target>`
    PathAppend,
    /// Query parameter embedding plus a JSON response envelope
    /// (`{"contents": "<raw body>"}`) that must be unwrapped
    JsonEnvelope {
        /// Query parameter name
        param: String,
    },
}

/// A single relay endpoint with its health flag
pub struct RelayEndpoint {
    name: String,
    base_url: String,
    scheme: WrapScheme,
    healthy: AtomicBool,
    last_checked: Mutex<Option<Instant>>,
}

impl RelayEndpoint {
    fn new(config: &RelayEndpointConfig) -> Self {
        Self {
            name: config.name.clone(),
            base_url: config.base_url.clone(),
            scheme: config.scheme.clone(),
            // Optimistic until the first probe says otherwise
            healthy: AtomicBool::new(true),
            last_checked: Mutex::new(None),
        }
    }

    /// Endpoint name used in logs
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the health flag; never blocks on an in-flight probe
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    /// When this endpoint was last probed, if ever
    #[must_use]
    pub fn last_checked(&self) -> Option<Instant> {
        *self.last_checked.lock()
    }

    fn set_healthy(&self, healthy: bool) {
        let was = self.healthy.swap(healthy, Ordering::Relaxed);
        if was != healthy {
            if healthy {
                info!(relay = %self.name, "Relay endpoint recovered");
            } else {
                warn!(relay = %self.name, "Relay endpoint marked unhealthy");
            }
        }
    }

    /// Apply this endpoint's URL transformation to `target`
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint's base URL does not parse.
    pub fn wrap(&self, target: &str) -> Result<String> {
        match &self.scheme {
            WrapScheme::QueryParam { param } | WrapScheme::JsonEnvelope { param } => {
                let mut url = Url::parse(&self.base_url)?;
                url.query_pairs_mut().append_pair(param, target);
                Ok(url.to_string())
            }
            WrapScheme::PathAppend => {
                Url::parse(&self.base_url)?;
                Ok(format!(
                    "{}/{}",
                    self.base_url.trim_end_matches('/'),
                    target
                ))
            }
        }
    }

    /// Undo any response envelope this endpoint applies
    fn unwrap_body(&self, body: String) -> Result<String> {
        match &self.scheme {
            WrapScheme::JsonEnvelope { .. } => {
                let envelope: Value = serde_json::from_str(&body).map_err(|_| {
                    Error::IncompatibleResponse(format!(
                        "relay '{}' did not return a JSON envelope",
                        self.name
                    ))
                })?;
                envelope
                    .get("contents")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| {
                        Error::IncompatibleResponse(format!(
                            "relay '{}' envelope is missing \"contents\"",
                            self.name
                        ))
                    })
            }
            WrapScheme::QueryParam { .. } | WrapScheme::PathAppend => Ok(body),
        }
    }
}

/// Ordered pool of relay endpoints; index 0 is the primary
pub struct RelayPool {
    endpoints: Vec<Arc<RelayEndpoint>>,
    client: Client,
    probe_target: String,
    probe_timeout: Duration,
}

impl RelayPool {
    /// Create a pool from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if an endpoint URL is malformed or the HTTP client
    /// cannot be built.
    pub fn new(config: &RelayConfig) -> Result<Self> {
        let endpoints = config
            .endpoints
            .iter()
            .map(|c| {
                Url::parse(&c.base_url)?;
                Ok(Arc::new(RelayEndpoint::new(c)))
            })
            .collect::<Result<Vec<_>>>()?;

        let client = Client::builder()
            .timeout(config.fetch_timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build relay HTTP client: {e}")))?;

        Ok(Self {
            endpoints,
            client,
            probe_target: config.probe_target.clone(),
            probe_timeout: config.probe_timeout,
        })
    }

    /// Select the first healthy endpoint in list order
    ///
    /// When none are healthy the primary is returned as a last-resort guess,
    /// since health checks can themselves be unreliable. Returns `None` only
    /// for an empty pool.
    #[must_use]
    pub fn select(&self) -> Option<Arc<RelayEndpoint>> {
        self.endpoints
            .iter()
            .find(|e| e.is_healthy())
            .or_else(|| self.endpoints.first())
            .map(Arc::clone)
    }

    /// All endpoints ordered for fallback iteration: healthy ones in list
    /// order, then unhealthy ones in list order
    #[must_use]
    pub fn in_preference_order(&self) -> Vec<Arc<RelayEndpoint>> {
        let (healthy, unhealthy): (Vec<_>, Vec<_>) = self
            .endpoints
            .iter()
            .map(Arc::clone)
            .partition(|e| e.is_healthy());
        healthy.into_iter().chain(unhealthy).collect()
    }

    /// Fetch `target` through a specific endpoint
    ///
    /// A failure marks the endpoint unhealthy immediately rather than
    /// waiting for the next scheduled probe; a success marks it healthy.
    ///
    /// # Errors
    ///
    /// Returns the classified fetch error, including envelope mismatches.
    pub async fn fetch_through(&self, endpoint: &RelayEndpoint, target: &str) -> Result<String> {
        let wrapped = endpoint.wrap(target)?;
        debug!(relay = endpoint.name(), target, "Fetching through relay");

        let result = match self.fetch_raw(&wrapped).await {
            Ok(body) => endpoint.unwrap_body(body),
            Err(e) => Err(e),
        };

        match &result {
            Ok(_) => endpoint.set_healthy(true),
            Err(e) => {
                warn!(relay = endpoint.name(), error = %e, "Relay fetch failed");
                endpoint.set_healthy(false);
            }
        }
        result
    }

    /// Single-shot fetch through the currently selected endpoint
    ///
    /// # Errors
    ///
    /// Returns an error for an empty pool or a failed relayed fetch; the
    /// caller decides whether to retry against the next-best endpoint.
    pub async fn fetch_through_best(&self, target: &str) -> Result<String> {
        let endpoint = self
            .select()
            .ok_or_else(|| Error::Config("relay pool has no endpoints".into()))?;
        self.fetch_through(&endpoint, target).await
    }

    async fn fetch_raw(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::ServerError {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.text().await?)
    }

    /// Probe every endpoint against the known-good target
    ///
    /// Probes run concurrently and independently; a slow endpoint does not
    /// delay the verdict on the others.
    pub async fn check_health(&self) {
        let probes = self.endpoints.iter().map(|e| self.probe(Arc::clone(e)));
        join_all(probes).await;
    }

    async fn probe(&self, endpoint: Arc<RelayEndpoint>) {
        let healthy = match endpoint.wrap(&self.probe_target) {
            Ok(wrapped) => matches!(
                tokio::time::timeout(self.probe_timeout, self.client.get(&wrapped).send()).await,
                Ok(Ok(response)) if response.status().is_success()
            ),
            Err(_) => false,
        };
        endpoint.set_healthy(healthy);
        *endpoint.last_checked.lock() = Some(Instant::now());
        debug!(relay = endpoint.name(), healthy, "Health probe completed");
    }

    /// Spawn the recurring health-check loop
    ///
    /// The first round runs immediately at startup; subsequent rounds run on
    /// `interval` until the shutdown channel fires.
    pub fn spawn_health_loop(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        let pool = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        pool.check_health().await;
                    }
                    _ = shutdown.recv() => {
                        debug!("Relay health loop stopped");
                        break;
                    }
                }
            }
        })
    }

    /// Number of endpoints in the pool
    #[must_use]
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Whether the pool has no endpoints
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
