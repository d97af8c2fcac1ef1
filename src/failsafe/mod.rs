//! Failsafe mechanisms: consecutive-failure tracking and trip signaling

mod tracker;

pub use tracker::{FailureRecord, FailureTracker};
