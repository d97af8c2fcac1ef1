//! Live/substitute repository switching driven by the mode controller
//!
//! Instead of a boolean checked inside every method, the active
//! implementation is modeled as a tagged variant selected by the current
//! mode. A domain repository holds both implementations and reads the mode
//! at the start of each operation via [`ModeSwitched::active`].

use tokio::sync::watch;

use crate::mode::{Mode, ModeController};

/// The implementation currently in effect for a domain repository
#[derive(Debug)]
pub enum ActiveRepo<'a, L, S> {
    /// Live network-backed implementation
    Live(&'a L),
    /// Local-substitute implementation used while offline
    Substitute(&'a S),
}

/// Pair of live and substitute implementations selected by mode
///
/// The mode is read through a [`watch`] receiver, so a transition becomes
/// fully visible to every holder on its next operation; there is no
/// half-applied state.
pub struct ModeSwitched<L, S> {
    live: L,
    substitute: S,
    mode_rx: watch::Receiver<Mode>,
}

impl<L, S> ModeSwitched<L, S> {
    /// Bundle a live and a substitute implementation under a controller
    #[must_use]
    pub fn new(live: L, substitute: S, controller: &ModeController) -> Self {
        Self {
            live,
            substitute,
            mode_rx: controller.subscribe(),
        }
    }

    /// The implementation matching the current mode
    #[must_use]
    pub fn active(&self) -> ActiveRepo<'_, L, S> {
        match *self.mode_rx.borrow() {
            Mode::Online => ActiveRepo::Live(&self.live),
            Mode::Offline => ActiveRepo::Substitute(&self.substitute),
        }
    }

    /// The live implementation, regardless of mode
    #[must_use]
    pub fn live(&self) -> &L {
        &self.live
    }

    /// The substitute implementation, regardless of mode
    #[must_use]
    pub fn substitute(&self) -> &S {
        &self.substitute
    }
}
