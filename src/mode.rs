//! Online/offline mode supervision
//!
//! A two-state supervisor owning the failure tracker's trip signal. Going
//! offline happens on a trip or by explicit request; coming back online only
//! ever happens through an explicit reconnection attempt, never on a timer,
//! so a still-down service is not hammered in a tight loop. Offline is a
//! legitimate, stable operating mode, not an error state.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::failsafe::FailureTracker;

/// Current operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Live network-backed repositories are active
    Online,
    /// Local-substitute repositories are active
    Offline,
}

/// Connectivity probe against the underlying cloud/document store,
/// consulted by reconnection attempts
#[async_trait]
pub trait StoreProbe: Send + Sync {
    /// Whether the store answers at all
    async fn is_available(&self) -> bool;
    /// Whether the current session is still authenticated
    async fn is_authenticated(&self) -> bool;
}

/// Two-state mode supervisor with observable transitions
///
/// Transitions are serialized under a mutex and published through a
/// [`watch`] channel, so every subscriber sees each transition exactly once
/// and no reader ever observes a torn state. Repositories read the mode at
/// the start of each operation rather than caching it.
pub struct ModeController {
    mode_tx: watch::Sender<Mode>,
    tracker: Arc<FailureTracker>,
    transition_lock: Mutex<()>,
}

impl ModeController {
    /// Create a controller in the initial `Online` state
    #[must_use]
    pub fn new(tracker: Arc<FailureTracker>) -> Self {
        let (mode_tx, _) = watch::channel(Mode::Online);
        Self {
            mode_tx,
            tracker,
            transition_lock: Mutex::new(()),
        }
    }

    /// Current mode
    #[must_use]
    pub fn mode(&self) -> Mode {
        *self.mode_tx.borrow()
    }

    /// Whether the application is currently degraded
    #[must_use]
    pub fn is_offline(&self) -> bool {
        self.mode() == Mode::Offline
    }

    /// Subscribe to mode transitions
    ///
    /// The receiver immediately holds the current mode; the UI layer can
    /// await changes instead of polling.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Mode> {
        self.mode_tx.subscribe()
    }

    /// Transition to `Offline`, either trip-driven or by manual request
    ///
    /// Resets the failure tracker so the just-tripped window does not
    /// immediately re-trip after recovery. Idempotent when already offline.
    pub fn go_offline(&self, reason: &str) {
        let _guard = self.transition_lock.lock();
        if *self.mode_tx.borrow() == Mode::Offline {
            return;
        }
        warn!(reason, "Entering offline mode");
        self.tracker.reset();
        let _ = self.mode_tx.send_replace(Mode::Offline);
    }

    /// Attempt to return online via a connectivity probe
    ///
    /// Reconnection is inherently speculative: a failed probe leaves the
    /// application offline and is reported as `false`, never as an error.
    /// Returns `true` if the application is online afterwards.
    pub async fn try_reconnect(&self, probe: &dyn StoreProbe) -> bool {
        if self.mode() == Mode::Online {
            return true;
        }

        // Probe outside the transition lock; only the flip is serialized.
        let reachable = probe.is_available().await && probe.is_authenticated().await;
        if !reachable {
            info!("Reconnection probe failed, staying offline");
            return false;
        }

        let _guard = self.transition_lock.lock();
        if *self.mode_tx.borrow() == Mode::Online {
            return true;
        }
        info!("Reconnection probe succeeded, returning online");
        self.tracker.reset();
        let _ = self.mode_tx.send_replace(Mode::Online);
        true
    }
}
