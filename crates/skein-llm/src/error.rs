//! Request-level errors of the HTTP client.

use serde::Deserialize;
use skein_core::StreamError;

/// Result type for client operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors that can occur before a streaming session is open.
///
/// Once a session exists, failures travel as [`StreamError`] through the
/// choice tracks instead.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The service returned a non-success status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error description.
        message: String,
        /// Vendor error code, when the body carried one.
        code: Option<String>,
    },

    /// The key was rejected.
    #[error("Auth error: {message}")]
    Auth {
        /// Error description.
        message: String,
    },

    /// Rate limited by the service.
    #[error("Rate limited: retry after {retry_after_ms}ms")]
    RateLimited {
        /// Suggested retry delay in milliseconds (0 when not advertised).
        retry_after_ms: u64,
        /// Error description.
        message: String,
    },

    /// The client was configured with values no request can be built from.
    #[error("invalid client configuration: {message}")]
    InvalidConfig {
        /// Error description.
        message: String,
    },

    /// The stream failed.
    #[error(transparent)]
    Stream(#[from] StreamError),
}

impl ProviderError {
    /// Classify a non-success response.
    pub fn from_status(status: u16, body: &str, retry_after: Option<&str>) -> Self {
        let (message, code) = parse_api_error(body, status);
        match status {
            401 | 403 => Self::Auth { message },
            429 => Self::RateLimited {
                retry_after_ms: retry_after.and_then(parse_retry_after_header).unwrap_or(0),
                message,
            },
            _ => Self::Api {
                status,
                message,
                code,
            },
        }
    }

    /// Whether reissuing the request could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| s.is_server_error())
            }
            Self::RateLimited { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Stream(e) => e.is_retryable(),
            Self::Json(_) | Self::Auth { .. } | Self::InvalidConfig { .. } => false,
        }
    }

    /// Error category string for logging.
    pub fn category(&self) -> &str {
        match self {
            Self::Http(_) => "network",
            Self::Json(_) => "parse",
            Self::Api { .. } => "api",
            Self::Auth { .. } => "auth",
            Self::RateLimited { .. } => "rate_limit",
            Self::InvalidConfig { .. } => "config",
            Self::Stream(e) => e.error_kind(),
        }
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

/// Extract `(message, code)` from a vendor error body.
///
/// Falls back to the raw body (or the status) when it is not the usual
/// `{"error": {"message", "code"}}` envelope.
fn parse_api_error(body: &str, status: u16) -> (String, Option<String>) {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
        let code = envelope.error.code.and_then(|c| match c {
            serde_json::Value::String(s) => Some(s),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        });
        let message = envelope
            .error
            .message
            .unwrap_or_else(|| format!("HTTP {status}"));
        return (message, code);
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        (format!("HTTP {status}"), None)
    } else {
        (trimmed.to_string(), None)
    }
}

/// Parse a `Retry-After` header value (seconds or HTTP-date) into milliseconds.
pub fn parse_retry_after_header(value: &str) -> Option<u64> {
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Some(seconds.saturating_mul(1000));
    }
    let date = chrono::DateTime::parse_from_rfc2822(value.trim()).ok()?;
    let delay_ms = date
        .signed_duration_since(chrono::Utc::now())
        .num_milliseconds();
    Some(u64::try_from(delay_ms).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn unauthorized_maps_to_auth() {
        let body = r#"{"error":{"message":"Incorrect API key provided","code":"invalid_api_key"}}"#;
        let err = ProviderError::from_status(401, body, None);
        assert_matches!(err, ProviderError::Auth { ref message } if message == "Incorrect API key provided");
        assert!(!err.is_retryable());
        assert_eq!(err.category(), "auth");
    }

    #[test]
    fn too_many_requests_reads_retry_after() {
        let err = ProviderError::from_status(429, "{}", Some("3"));
        assert_matches!(err, ProviderError::RateLimited { retry_after_ms: 3000, .. });
        assert!(err.is_retryable());
    }

    #[test]
    fn too_many_requests_without_header() {
        let err = ProviderError::from_status(429, "", None);
        assert_matches!(err, ProviderError::RateLimited { retry_after_ms: 0, ref message } if message == "HTTP 429");
    }

    #[test]
    fn api_error_keeps_vendor_code() {
        let body = r#"{"error":{"message":"The model does not exist","code":"model_not_found"}}"#;
        let err = ProviderError::from_status(404, body, None);
        assert_matches!(
            err,
            ProviderError::Api { status: 404, ref code, .. } if code.as_deref() == Some("model_not_found")
        );
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "API error (404): The model does not exist");
    }

    #[test]
    fn numeric_code_is_stringified() {
        let body = r#"{"error":{"message":"boom","code":500}}"#;
        let err = ProviderError::from_status(500, body, None);
        assert_matches!(err, ProviderError::Api { ref code, .. } if code.as_deref() == Some("500"));
        assert!(err.is_retryable());
    }

    #[test]
    fn plain_text_body_becomes_message() {
        let err = ProviderError::from_status(502, "Bad Gateway\n", None);
        assert_matches!(err, ProviderError::Api { ref message, code: None, .. } if message == "Bad Gateway");
    }

    #[test]
    fn stream_errors_delegate() {
        let err = ProviderError::from(StreamError::Transport("reset".into()));
        assert!(err.is_retryable());
        assert_eq!(err.category(), "transport");
        assert_eq!(err.to_string(), "transport error: reset");
    }

    #[test]
    fn retry_after_parsing() {
        assert_eq!(parse_retry_after_header("120"), Some(120_000));
        assert_eq!(parse_retry_after_header("Thu, 01 Jan 1970 00:00:00 GMT"), Some(0));
        assert_eq!(parse_retry_after_header("soon"), None);
    }
}
