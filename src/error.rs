//! Error types for the data-access gateway

use thiserror::Error;

/// Result type alias for the gateway
pub type Result<T> = std::result::Result<T, Error>;

/// Gateway errors
///
/// The first five variants form the transient-fetch taxonomy consumed by the
/// failure tracker; `DuplicateEntry` and `InvalidUrl` are domain-level
/// validation errors surfaced directly to the caller and never recorded as
/// fetch failures.
#[derive(Error, Debug)]
pub enum Error {
    /// Connection-level failure (DNS, refused, reset, or an opaque browser
    /// network error)
    #[error("Network error: {0}")]
    Network(String),

    /// Request exceeded its bounded timeout
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Upstream returned a non-success HTTP status
    #[error("Server returned status {status} for {url}")]
    ServerError {
        /// HTTP status code
        status: u16,
        /// Request URL
        url: String,
    },

    /// Payload does not match the expected schema
    #[error("Incompatible response: {0}")]
    IncompatibleResponse(String),

    /// Direct access forbidden, strongly suggestive of a sandbox restriction
    #[error("Direct access blocked: {0}")]
    RelayBlocked(String),

    /// Domain-level validation: the entry already exists
    #[error("Duplicate entry: {entry}")]
    DuplicateEntry {
        /// The offending value (e.g. a feed URL already present)
        entry: String,
        /// Human-readable suggestion for UI messaging
        suggestion: String,
    },

    /// Malformed URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Classification of a failed resilient fetch, recorded by the failure tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Connection-level failure (includes blocked direct access)
    Network,
    /// Bounded timeout exceeded
    Timeout,
    /// Non-success HTTP status
    ServerError,
    /// Payload did not match the expected schema
    IncompatibleResponse,
}

impl Error {
    /// Create a duplicate-entry error with a suggestion for the user
    pub fn duplicate(entry: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::DuplicateEntry {
            entry: entry.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Whether this failure may be caused by a cross-origin/sandboxing
    /// restriction, making a relay attempt worthwhile
    ///
    /// Browser sandboxes surface blocked requests as opaque connection-level
    /// errors, so plain `Network` failures qualify alongside the explicit
    /// `RelayBlocked` classification. Timeouts and server errors do not: the
    /// origin was reachable, a relay would only repeat the failure.
    #[must_use]
    pub fn suggests_sandbox_block(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RelayBlocked(_))
    }

    /// Map this error into the tracker's failure taxonomy
    ///
    /// Returns `None` for domain-level validation and configuration errors,
    /// which must not count toward the degraded-mode trip threshold.
    #[must_use]
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Network(_) | Self::RelayBlocked(_) => Some(FailureKind::Network),
            Self::Timeout(_) => Some(FailureKind::Timeout),
            Self::ServerError { .. } => Some(FailureKind::ServerError),
            Self::IncompatibleResponse(_) | Self::Json(_) => {
                Some(FailureKind::IncompatibleResponse)
            }
            Self::DuplicateEntry { .. } | Self::InvalidUrl(_) | Self::Config(_) => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if let Some(status) = err.status() {
            Self::ServerError {
                status: status.as_u16(),
                url: err.url().map(ToString::to_string).unwrap_or_default(),
            }
        } else {
            Self::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kind_mapping() {
        assert_eq!(
            Error::Network("refused".into()).failure_kind(),
            Some(FailureKind::Network)
        );
        assert_eq!(
            Error::RelayBlocked("cors".into()).failure_kind(),
            Some(FailureKind::Network)
        );
        assert_eq!(
            Error::Timeout("10s".into()).failure_kind(),
            Some(FailureKind::Timeout)
        );
        assert_eq!(
            Error::ServerError {
                status: 502,
                url: "https://example.com".into()
            }
            .failure_kind(),
            Some(FailureKind::ServerError)
        );
        assert_eq!(
            Error::IncompatibleResponse("not a feed".into()).failure_kind(),
            Some(FailureKind::IncompatibleResponse)
        );
    }

    #[test]
    fn test_validation_errors_have_no_failure_kind() {
        assert_eq!(
            Error::duplicate("https://a.example/feed", "already added").failure_kind(),
            None
        );
        assert_eq!(Error::Config("bad".into()).failure_kind(), None);
    }

    #[test]
    fn test_sandbox_block_classification() {
        assert!(Error::Network("opaque".into()).suggests_sandbox_block());
        assert!(Error::RelayBlocked("403".into()).suggests_sandbox_block());
        assert!(!Error::Timeout("30s".into()).suggests_sandbox_block());
        assert!(
            !Error::ServerError {
                status: 500,
                url: String::new()
            }
            .suggests_sandbox_block()
        );
    }

    #[test]
    fn test_duplicate_entry_display() {
        let err = Error::duplicate(
            "https://news.example/rss",
            "This feed is already in your list",
        );
        assert_eq!(err.to_string(), "Duplicate entry: https://news.example/rss");
        if let Error::DuplicateEntry { suggestion, .. } = err {
            assert_eq!(suggestion, "This feed is already in your list");
        } else {
            panic!("expected DuplicateEntry");
        }
    }
}
