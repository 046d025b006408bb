//! Error types for the lookup service.

use lookupd_net::NetError;
use thiserror::Error;

/// Lookup service errors.
///
/// Cloneable so one failed upstream fetch can be handed to every caller that
/// joined it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The configuration file is missing, malformed or fails validation.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
    /// Resolving, dialing or talking to an upstream failed.
    #[error(transparent)]
    Net(#[from] NetError),
    /// The upstream answered with a non-success status.
    #[error("upstream returned HTTP {status}")]
    UpstreamHttp {
        /// Status code sent by the upstream.
        status: u16,
    },
    /// The upstream body did not match the extraction pattern.
    #[error("empty")]
    NotFound,
    /// The inbound request body could not be decoded.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// A URL built from a template is not a valid URL.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl Error {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigInvalid(message.into())
    }

    /// Whether the upstream simply had nothing matching the query.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::ConfigInvalid(err.to_string())
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Self::ConfigInvalid(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::Net(NetError::DeadlineExceeded)
    }
}

/// Result type for lookup operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Error::NotFound.to_string(), "empty");
        assert_eq!(
            Error::UpstreamHttp { status: 503 }.to_string(),
            "upstream returned HTTP 503"
        );
        assert_eq!(
            Error::from(NetError::DeadlineExceeded).to_string(),
            "deadline exceeded"
        );
    }

    #[test]
    fn test_conversions() {
        let err: Error = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, Error::BadRequest(_)));

        let err: Error = url::Url::parse("not a url").unwrap_err().into();
        assert!(matches!(err, Error::InvalidUrl(_)));

        let err: Error = toml::from_str::<toml::Value>("= 1").unwrap_err().into();
        assert!(matches!(err, Error::ConfigInvalid(_)));
    }
}
