//! Resilient data-access gateway for dashboard clients
//!
//! Keeps a dashboard usable when the external services it depends on (a
//! weather API, feed servers, a cloud document store) are slow, unreachable,
//! or blocked by browser sandboxing.
//!
//! # Components
//!
//! - **Cache store**: TTL-keyed cache shared by the data domains, with lazy
//!   eviction and a stale-on-error read path
//! - **Failure tracker**: sliding-window consecutive-failure counter that
//!   trips the degraded-mode switch
//! - **Relay pool**: health-checked proxy endpoints with ordered fallback
//!   selection for sandboxed environments
//! - **Mode controller**: online/offline supervisor with observable
//!   transitions and explicit reconnection
//! - **Orchestrator**: the resilient fetch algorithm tying it all together
//!
//! Domain logic (weather, feeds), UI, and the document-store client stay
//! outside this crate behind narrow interfaces.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod config;
pub mod error;
pub mod failsafe;
pub mod gateway;
pub mod mode;
pub mod orchestrator;
pub mod relay;
pub mod repository;

pub use error::{Error, FailureKind, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// # Errors
///
/// Currently infallible; returns `Result` so callers keep a stable
/// signature if subscriber installation gains failure modes.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
