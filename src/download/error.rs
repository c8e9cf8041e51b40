//! Error types for the content fetch service.
//!
//! Every remote failure is mapped to a variant carrying the file identifier or
//! URL involved, so the export engine can log it and move on to the next
//! identifier without inspecting HTTP details.

use thiserror::Error;

use crate::validation::ValidationError;

/// Errors that can occur while authenticating or fetching content.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Login request was rejected or could not be sent.
    #[error("authentication failed{}: {message}", status.map(|s| format!(" with HTTP {s}")).unwrap_or_default())]
    Authentication {
        /// HTTP status of the login response, if one was received.
        status: Option<u16>,
        /// What went wrong.
        message: String,
    },

    /// Content request answered 401: credential missing or expired.
    #[error("authentication required or token expired fetching {file_id}")]
    AuthRequired {
        /// Requested file identifier.
        file_id: String,
    },

    /// Content request answered 404.
    #[error("content not found for {file_id}")]
    NotFound {
        /// Requested file identifier.
        file_id: String,
    },

    /// Content request answered 429.
    #[error("rate limit exceeded fetching {file_id}")]
    RateLimited {
        /// Requested file identifier.
        file_id: String,
        /// The Retry-After header value, if present.
        retry_after: Option<String>,
    },

    /// Content request answered 5xx.
    #[error("server error HTTP {status} fetching {file_id}")]
    Server {
        /// Requested file identifier.
        file_id: String,
        /// The HTTP status code.
        status: u16,
    },

    /// Content request answered any other non-2xx status.
    #[error("API request failed with HTTP {status} fetching {file_id}")]
    Api {
        /// Requested file identifier.
        file_id: String,
        /// The HTTP status code.
        status: u16,
    },

    /// Network-level error (DNS resolution, connection refused, TLS, body read).
    #[error("network error requesting {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout requesting {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// An endpoint URL could not be built from the API base URL.
    #[error("invalid endpoint URL {url}: {source}")]
    InvalidUrl {
        /// The path that failed to join.
        url: String,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    /// The file identifier or token was rejected before any request was made.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl FetchError {
    /// Creates an authentication error.
    pub fn authentication(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Authentication {
            status,
            message: message.into(),
        }
    }

    /// Maps a non-2xx content response to its variant.
    pub fn from_status(file_id: impl Into<String>, status: u16, retry_after: Option<String>) -> Self {
        let file_id = file_id.into();
        match status {
            401 => Self::AuthRequired { file_id },
            404 => Self::NotFound { file_id },
            429 => Self::RateLimited {
                file_id,
                retry_after,
            },
            500..=599 => Self::Server { file_id, status },
            _ => Self::Api { file_id, status },
        }
    }

    /// Maps a transport failure, separating timeouts from other network errors.
    pub fn transport(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout { url: url.into() }
        } else {
            Self::Network {
                url: url.into(),
                source,
            }
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// HTTP status associated with this error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Authentication { status, .. } => *status,
            Self::AuthRequired { .. } => Some(401),
            Self::NotFound { .. } => Some(404),
            Self::RateLimited { .. } => Some(429),
            Self::Server { status, .. } | Self::Api { status, .. } => Some(*status),
            Self::Network { .. }
            | Self::Timeout { .. }
            | Self::InvalidUrl { .. }
            | Self::ClientBuild(_)
            | Self::Validation(_) => None,
        }
    }
}
