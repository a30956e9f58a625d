//! Error type for Confluence API calls.

use thiserror::Error;

/// Failure of a single API call. Classified so the exporter can decide what a failure means
/// for the current node without looking at HTTP details.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Page not found: {url}")]
    NotFound { url: String },

    #[error("Credentials rejected (HTTP {status}) at {url}. Check email and token.")]
    Auth { status: u16, url: String },

    /// Server-side or rate-limit failure (5xx, 429) that may succeed later.
    #[error("HTTP {status} when fetching: {url}")]
    Transient { status: u16, url: String },

    #[error("Network error: could not reach {url}: {source}")]
    Network { url: String, source: reqwest::Error },

    #[error("Unexpected HTTP {status} when fetching: {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("Failed to read response body from {url}: {source}")]
    BodyRead { url: String, source: reqwest::Error },

    #[error("Malformed response from {url}: {reason}")]
    Malformed { url: String, reason: String },
}

impl ApiError {
    /// Network errors, 5xx and 429: worth retrying, and never the caller's fault.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ApiError::Transient { .. } | ApiError::Network { .. } | ApiError::BodyRead { .. }
        )
    }

    /// The server was never reached (DNS, connect, TLS, timeout).
    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Network { .. })
    }

    pub(crate) fn from_status(status: u16, url: &str) -> Self {
        let url = url.to_string();
        match status {
            401 | 403 => ApiError::Auth { status, url },
            404 => ApiError::NotFound { url },
            429 | 500..=599 => ApiError::Transient { status, url },
            _ => ApiError::UnexpectedStatus { status, url },
        }
    }
}
