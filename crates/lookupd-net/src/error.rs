//! Error types for the networking layer.

use thiserror::Error;

/// Networking errors.
///
/// Payloads are plain strings so that errors can be cloned and handed to
/// every caller that shares one coalesced upstream fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetError {
    /// Name resolution failed.
    #[error("resolve failed: {0}")]
    ResolveFailed(String),
    /// The address is unusable (malformed, empty record set, or rejected).
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    /// TCP connect failed.
    #[error("dial failed: {0}")]
    DialFailed(String),
    /// TLS handshake failed.
    #[error("TLS handshake failed: {0}")]
    HandshakeFailed(String),
    /// The operation did not finish before its deadline.
    #[error("deadline exceeded")]
    DeadlineExceeded,
    /// The operation was abandoned before it produced a result.
    #[error("operation canceled")]
    Canceled,
    /// Internal state contradicted an invariant.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    /// The HTTP exchange with an upstream failed after connecting.
    #[error("upstream error: {0}")]
    Upstream(String),
}

impl NetError {
    /// Create a resolve error for `host`.
    pub fn resolve(host: &str, cause: impl std::fmt::Display) -> Self {
        Self::ResolveFailed(format!("{host}: {cause}"))
    }

    /// Create a dial error for `target`.
    pub fn dial(target: impl std::fmt::Display, cause: impl std::fmt::Display) -> Self {
        Self::DialFailed(format!("{target}: {cause}"))
    }

    /// Whether this error is a deadline expiry.
    pub fn is_deadline(&self) -> bool {
        matches!(self, Self::DeadlineExceeded)
    }
}

impl From<tokio::time::error::Elapsed> for NetError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::DeadlineExceeded
    }
}

impl From<hyper_util::client::legacy::Error> for NetError {
    /// Recover a dialer error from the client error's source chain, falling
    /// back to [`NetError::Upstream`].
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        let mut source: Option<&(dyn std::error::Error + 'static)> = Some(&err);
        while let Some(current) = source {
            if let Some(net) = current.downcast_ref::<NetError>() {
                return net.clone();
            }
            source = current.source();
        }
        Self::Upstream(err.to_string())
    }
}

impl From<hyper::Error> for NetError {
    fn from(err: hyper::Error) -> Self {
        Self::Upstream(err.to_string())
    }
}

impl From<http::Error> for NetError {
    fn from(err: http::Error) -> Self {
        Self::InvalidAddress(err.to_string())
    }
}

/// A specialized Result type for networking operations.
pub type Result<T> = std::result::Result<T, NetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            NetError::resolve("example.com", "no records").to_string(),
            "resolve failed: example.com: no records"
        );
        assert_eq!(NetError::DeadlineExceeded.to_string(), "deadline exceeded");
        assert!(NetError::DeadlineExceeded.is_deadline());
        assert!(!NetError::Canceled.is_deadline());
    }
}
