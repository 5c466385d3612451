//! Error types for biblionetka-meta.
//!
//! Uses `thiserror` for structured error definitions. Every failure in the
//! identify flow degrades to "skip and continue" at the smallest granularity,
//! so these types mostly travel as far as a log line.

use thiserror::Error;

/// Failure of a single HTTP request.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The request did not complete within the configured timeout.
    #[error("Request timed out: {url}")]
    Timeout { url: String },

    /// Connection, TLS or body decoding failure.
    #[error("Download failed: {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Server answered with a non-success status.
    #[error("HTTP {status}: {url}")]
    Status { url: String, status: u16 },
}

impl FetchError {
    /// Classifies a reqwest error raised while requesting `url`.
    pub fn from_reqwest(url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else {
            Self::Network {
                url: url.to_string(),
                source,
            }
        }
    }

    /// Returns true if the request failed because of the timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Structural problems with a fetched page or the URL it came from.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    /// The book detail node matched zero or several elements.
    #[error("Expected exactly one book detail node, found {count}")]
    AmbiguousStructure { count: usize },

    /// The page URL does not carry a book id.
    #[error("Invalid book URL: {0}")]
    InvalidUrl(String),

    /// A required field is missing and there is nothing to fall back on.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}

/// Page-level error: the page yields no record.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Error type for configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read or write the config file
    #[error("Failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse config file
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// Invalid configuration value
    #[error("Invalid config value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Config directory not found
    #[error("Could not determine config directory")]
    NoConfigDir,
}
