//! Gateway service wiring and background maintenance
//!
//! `DataGateway` is the explicitly constructed service instance the host
//! application creates at startup and hands to its domain repositories.
//! There are no lazily-initialized globals; lifecycle is `new` → `start` →
//! `shutdown`.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::cache::CacheStore;
use crate::config::Config;
use crate::failsafe::FailureTracker;
use crate::mode::ModeController;
use crate::orchestrator::ResilientFetcher;
use crate::relay::RelayPool;
use crate::Result;

/// Shared resilience core wired from configuration
pub struct DataGateway {
    config: Config,
    cache: Arc<CacheStore>,
    tracker: Arc<FailureTracker>,
    relays: Arc<RelayPool>,
    mode: Arc<ModeController>,
    fetcher: Arc<ResilientFetcher>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl DataGateway {
    /// Construct the gateway from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the relay pool cannot be built.
    pub fn new(config: Config) -> Result<Self> {
        let cache = Arc::new(CacheStore::new());
        let tracker = Arc::new(FailureTracker::new(&config.failure));
        let relays = Arc::new(RelayPool::new(&config.relay)?);
        let mode = Arc::new(ModeController::new(Arc::clone(&tracker)));
        let fetcher = Arc::new(ResilientFetcher::new(
            Arc::clone(&cache),
            Arc::clone(&tracker),
            Arc::clone(&relays),
            Arc::clone(&mode),
        ));
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            cache,
            tracker,
            relays,
            mode,
            fetcher,
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Start background maintenance: the relay health-check loop (with an
    /// immediate first round) and the opportunistic cache cleanup loop
    pub fn start(&self) {
        info!(
            relays = self.relays.len(),
            health_interval = ?self.config.relay.health_check_interval,
            "Starting gateway background tasks"
        );

        let health = Arc::clone(&self.relays).spawn_health_loop(
            self.config.relay.health_check_interval,
            self.shutdown_tx.subscribe(),
        );

        let cache = Arc::clone(&self.cache);
        let horizon = self.config.cache.cleanup_horizon;
        let interval = self.config.cache.cleanup_interval;
        let mut shutdown = self.shutdown_tx.subscribe();
        let cleanup = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        cache.purge_older_than(horizon);
                    }
                    _ = shutdown.recv() => {
                        debug!("Cache cleanup loop stopped");
                        break;
                    }
                }
            }
        });

        self.tasks.lock().extend([health, cleanup]);
    }

    /// Stop background tasks and wait for them to finish
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                if e.is_panic() {
                    error!(error = %e, "Background task panicked");
                }
            }
        }
        info!("Gateway stopped");
    }

    /// The shared cache store
    #[must_use]
    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// The shared failure tracker
    #[must_use]
    pub fn tracker(&self) -> &Arc<FailureTracker> {
        &self.tracker
    }

    /// The relay pool
    #[must_use]
    pub fn relays(&self) -> &Arc<RelayPool> {
        &self.relays
    }

    /// The mode controller
    #[must_use]
    pub fn mode(&self) -> &Arc<ModeController> {
        &self.mode
    }

    /// The resilient fetch orchestrator
    #[must_use]
    pub fn fetcher(&self) -> &Arc<ResilientFetcher> {
        &self.fetcher
    }

    /// The effective configuration
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::Mode;

    #[tokio::test]
    async fn test_gateway_wires_shared_components() {
        let gateway = DataGateway::new(Config::default()).unwrap();

        assert_eq!(gateway.mode().mode(), Mode::Online);
        assert!(gateway.cache().is_empty());
        assert_eq!(gateway.relays().len(), 3);
        assert_eq!(gateway.tracker().consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_without_start_is_safe() {
        let gateway = DataGateway::new(Config::default()).unwrap();
        gateway.shutdown().await;
    }
}
