//! Consecutive-failure tracking within a sliding time window
//!
//! A time-bounded window (rather than a fixed-size ring buffer) avoids false
//! trips from failures that are merely spread far apart, while still reacting
//! quickly to a genuine outage: with the defaults, 3 failures inside 5
//! minutes signal a trip. A single success fully clears the window, since
//! the goal is detecting sustained unavailability, not occasional blips.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::FailureTrackerConfig;
use crate::error::FailureKind;

/// A single recorded fetch failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureRecord {
    /// When the failure was recorded
    pub at: Instant,
    /// Failure classification
    pub kind: FailureKind,
}

/// Sliding-window consecutive-failure counter with a trip threshold
pub struct FailureTracker {
    threshold: u32,
    window: Duration,
    state: Mutex<WindowState>,
}

#[derive(Default)]
struct WindowState {
    consecutive: u32,
    window_start: Option<Instant>,
    /// Recent failures inside the window, pruned lazily on each record
    records: VecDeque<FailureRecord>,
}

impl FailureTracker {
    /// Create a tracker from configuration
    #[must_use]
    pub fn new(config: &FailureTrackerConfig) -> Self {
        Self {
            threshold: config.threshold,
            window: config.window,
            state: Mutex::new(WindowState::default()),
        }
    }

    /// Record a failed resilient fetch
    ///
    /// If the current window has expired, the consecutive count restarts at
    /// zero before this failure is applied. Returns `true` when the count
    /// reaches the trip threshold, signaling the mode controller.
    pub fn record_failure(&self, kind: FailureKind) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock();

        let window_expired = state
            .window_start
            .is_none_or(|start| now.duration_since(start) > self.window);
        if window_expired {
            state.consecutive = 0;
            state.window_start = Some(now);
        }

        state.consecutive += 1;
        state.records.push_back(FailureRecord { at: now, kind });
        let window = self.window;
        state
            .records
            .retain(|r| now.duration_since(r.at) <= window);

        let tripped = state.consecutive >= self.threshold;
        if tripped {
            warn!(
                consecutive = state.consecutive,
                threshold = self.threshold,
                ?kind,
                "Failure threshold reached"
            );
        } else {
            debug!(
                consecutive = state.consecutive,
                threshold = self.threshold,
                ?kind,
                "Fetch failure recorded"
            );
        }
        tripped
    }

    /// Record a successful fetch, fully clearing the window
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        if state.consecutive > 0 {
            debug!(
                cleared = state.consecutive,
                "Fetch succeeded, failure window cleared"
            );
        }
        *state = WindowState::default();
    }

    /// Explicitly clear the window
    ///
    /// Called after a mode transition so the just-tripped window cannot
    /// immediately re-trip once the application recovers.
    pub fn reset(&self) {
        *self.state.lock() = WindowState::default();
        debug!("Failure tracker reset");
    }

    /// Current consecutive-failure count
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.state.lock().consecutive
    }

    /// Failures recorded within the current window, oldest first
    #[must_use]
    pub fn recent_failures(&self) -> Vec<FailureRecord> {
        let now = Instant::now();
        let window = self.window;
        self.state
            .lock()
            .records
            .iter()
            .filter(|r| now.duration_since(r.at) <= window)
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(threshold: u32, window: Duration) -> FailureTracker {
        FailureTracker::new(&FailureTrackerConfig { threshold, window })
    }

    #[test]
    fn test_trips_at_threshold_within_window() {
        let tracker = tracker(3, Duration::from_secs(300));

        assert!(!tracker.record_failure(FailureKind::Network));
        assert!(!tracker.record_failure(FailureKind::Timeout));
        assert!(tracker.record_failure(FailureKind::Network));
    }

    #[test]
    fn test_window_expiry_restarts_count() {
        let tracker = tracker(3, Duration::from_millis(20));

        assert!(!tracker.record_failure(FailureKind::Network));
        assert!(!tracker.record_failure(FailureKind::Network));

        // Third failure arrives after the window has expired, so the count
        // restarts and no trip is signaled.
        std::thread::sleep(Duration::from_millis(30));
        assert!(!tracker.record_failure(FailureKind::Network));
        assert_eq!(tracker.consecutive_failures(), 1);
    }

    #[test]
    fn test_single_success_clears_window() {
        let tracker = tracker(3, Duration::from_secs(300));

        tracker.record_failure(FailureKind::Network);
        tracker.record_failure(FailureKind::Network);
        tracker.record_success();
        assert!(!tracker.record_failure(FailureKind::Network));
        assert!(!tracker.record_failure(FailureKind::Network));
        assert_eq!(tracker.consecutive_failures(), 2);
    }

    #[test]
    fn test_reset_clears_state() {
        let tracker = tracker(2, Duration::from_secs(300));

        tracker.record_failure(FailureKind::ServerError);
        tracker.reset();
        assert_eq!(tracker.consecutive_failures(), 0);
        assert!(tracker.recent_failures().is_empty());
        assert!(!tracker.record_failure(FailureKind::ServerError));
    }

    #[test]
    fn test_trip_repeats_past_threshold() {
        let tracker = tracker(2, Duration::from_secs(300));

        assert!(!tracker.record_failure(FailureKind::Network));
        assert!(tracker.record_failure(FailureKind::Network));
        // Still at or above threshold until something clears the window
        assert!(tracker.record_failure(FailureKind::Network));
    }

    #[test]
    fn test_recent_failures_are_pruned_lazily() {
        let tracker = tracker(10, Duration::from_millis(20));

        tracker.record_failure(FailureKind::Network);
        std::thread::sleep(Duration::from_millis(30));
        tracker.record_failure(FailureKind::Timeout);

        let recent = tracker.recent_failures();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].kind, FailureKind::Timeout);
    }
}
