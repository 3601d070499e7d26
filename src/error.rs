use crate::catalog::Interface;
use crate::service::ServiceType;
use std::sync::Arc;
use thiserror::Error;

/// Main error type for the authenticated request pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// The identity backend rejected the credentials or could not be reached.
    ///
    /// Every caller waiting on the same in-flight fetch receives a clone of
    /// the same underlying error.
    #[error("failed to fetch token: {0}")]
    TokenFetch(#[source] Arc<Error>),

    /// The service catalog has no endpoint for the requested combination
    #[error("no {interface} endpoint for service {service_type} in region {region}")]
    EndpointNotFound {
        service_type: ServiceType,
        region: String,
        interface: Interface,
    },

    /// Non-success HTTP status where the caller asked for it to be interpreted
    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    /// HTTP client error
    #[error("HTTP client error: {0}")]
    Transport(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Request building error
    #[error("failed to build request: {0}")]
    RequestBuild(String),

    /// Missing or invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// The operation was cancelled by its caller
    #[error("operation cancelled")]
    Cancelled,

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a new HTTP error
    pub fn http(status: u16, body: String) -> Self {
        Error::Http { status, body }
    }

    /// Get the HTTP status code carried by this error, looking through
    /// token fetch failures.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(*status),
            Error::Transport(e) => e.status().map(|s| s.as_u16()),
            Error::TokenFetch(inner) => inner.status_code(),
            _ => None,
        }
    }

    /// Check if this error is a not found error (404)
    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }

    /// Check if this error is an authentication failure (401)
    pub fn is_unauthorized(&self) -> bool {
        self.status_code() == Some(401)
    }

    /// Check if the operation was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;
