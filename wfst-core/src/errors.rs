//! Error types for the WFS client
//!
//! Every public operation returns [`WfsResult`]. The variants follow the
//! failure classes a caller has to react to differently:
//!
//! - **Configuration**: bad identifier or unusable layer metadata, raised before
//!   any request is sent
//! - **Network** / **Cancelled**: the request never produced a response
//! - **Upstream**: the backend or WFS server answered with a non-2xx status
//! - **Format**: a body could not be decoded at all
//! - **Protocol**: an OGC exception or per-feature failure inside a 2xx answer
//!
//! # Examples
//!
//! ```rust
//! use wfst::errors::WfsError;
//!
//! let err = WfsError::Upstream { status: 503, body: None };
//! assert!(err.is_retryable_read());
//!
//! let err = WfsError::Configuration("layer id cannot be empty".to_string());
//! assert_eq!(err.error_code(), "CONFIGURATION");
//! ```

use thiserror::Error;

/// Failures surfaced by the metadata resolver, feature reader and
/// transaction builder.
#[derive(Debug, Error)]
pub enum WfsError {
    /// Invalid or missing identifier, unresolvable type name
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Transport failure or timeout
    #[error("network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// The caller cancelled the operation while a request was in flight
    #[error("operation cancelled")]
    Cancelled,

    /// Non-2xx HTTP status from the backend or the WFS server
    #[error("upstream returned HTTP {status}{}", body_suffix(.body))]
    Upstream { status: u16, body: Option<String> },

    /// JSON or XML that could not be parsed
    #[error("format error: {0}")]
    Format(String),

    /// OGC exception or per-feature message embedded in a 2xx response
    #[error("protocol error: {0}")]
    Protocol(String),
}

fn body_suffix(body: &Option<String>) -> String {
    match body.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => format!(": {}", text),
        _ => String::new(),
    }
}

impl WfsError {
    pub fn network(message: impl Into<String>) -> Self {
        WfsError::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Stable machine-readable code for the variant
    pub fn error_code(&self) -> &'static str {
        match self {
            WfsError::Configuration(_) => "CONFIGURATION",
            WfsError::Network { .. } => "NETWORK",
            WfsError::Cancelled => "CANCELLED",
            WfsError::Upstream { .. } => "UPSTREAM",
            WfsError::Format(_) => "FORMAT",
            WfsError::Protocol(_) => "PROTOCOL",
        }
    }

    /// True for failures where no response reached the caller
    pub fn is_network(&self) -> bool {
        matches!(self, WfsError::Network { .. } | WfsError::Cancelled)
    }

    /// Whether a caller may safely repeat a read that failed this way.
    ///
    /// Only meaningful for reads: transactions may have partially applied
    /// upstream and are never safe to repeat blindly.
    pub fn is_retryable_read(&self) -> bool {
        match self {
            WfsError::Network { .. } => true,
            WfsError::Upstream { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// HTTP status carried by an upstream failure
    pub fn status(&self) -> Option<u16> {
        match self {
            WfsError::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for WfsError {
    fn from(err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("request timed out: {}", err)
        } else {
            err.to_string()
        };
        WfsError::Network {
            message,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for WfsError {
    fn from(err: serde_json::Error) -> Self {
        WfsError::Format(format!("invalid JSON: {}", err))
    }
}

impl From<quick_xml::Error> for WfsError {
    fn from(err: quick_xml::Error) -> Self {
        WfsError::Format(format!("invalid XML: {}", err))
    }
}

/// Result type alias for client operations
pub type WfsResult<T> = Result<T, WfsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_display_includes_body() {
        let err = WfsError::Upstream {
            status: 403,
            body: Some("forbidden".to_string()),
        };
        assert_eq!(err.to_string(), "upstream returned HTTP 403: forbidden");
        assert_eq!(err.status(), Some(403));

        let err = WfsError::Upstream {
            status: 500,
            body: None,
        };
        assert_eq!(err.to_string(), "upstream returned HTTP 500");
    }

    #[test]
    fn test_retryable_reads() {
        assert!(WfsError::network("connection reset").is_retryable_read());
        assert!(WfsError::Upstream { status: 502, body: None }.is_retryable_read());
        assert!(!WfsError::Upstream { status: 404, body: None }.is_retryable_read());
        assert!(!WfsError::Cancelled.is_retryable_read());
        assert!(!WfsError::Protocol("denied".to_string()).is_retryable_read());
        assert!(!WfsError::Configuration("bad id".to_string()).is_retryable_read());
    }

    #[test]
    fn test_cancelled_counts_as_network_failure() {
        assert!(WfsError::Cancelled.is_network());
        assert_eq!(WfsError::Cancelled.error_code(), "CANCELLED");
    }

    #[test]
    fn test_json_error_maps_to_format() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: WfsError = err.into();
        assert_eq!(err.error_code(), "FORMAT");
    }
}
