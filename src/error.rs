use std::time::Duration;
use thiserror::Error;

/// Type alias for Result with GmailError
pub type Result<T> = std::result::Result<T, GmailError>;

/// Errors raised while talking to Gmail or preparing an organizer run
#[derive(Error, Debug)]
pub enum GmailError {
    /// Gmail API returned an error
    #[error("Gmail API error: {0}")]
    ApiError(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Rate limit exceeded - should retry after specified seconds
    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    /// Connection issues, timeouts
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Server returned 5xx error
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// Resource not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden (403)
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// Message came back without the fields we asked for
    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    /// Label listing, creation or lookup failed
    #[error("Label error: {0}")]
    LabelError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl GmailError {
    /// Check if the error is transient and the call may be repeated
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GmailError::RateLimitExceeded { .. }
                | GmailError::ServerError { .. }
                | GmailError::NetworkError(_)
        )
    }

    /// Server-requested wait before the next attempt, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GmailError::RateLimitExceeded { retry_after } => {
                Some(Duration::from_secs(*retry_after))
            }
            _ => None,
        }
    }
}

/// Seconds to wait according to a `Retry-After` header.
///
/// Accepts both delay-seconds (`"120"`) and HTTP-date forms. Missing,
/// unparseable or already-elapsed values fall back to 5 seconds.
fn parse_retry_after_header<B>(response: &hyper::Response<B>) -> u64 {
    const DEFAULT_RETRY_AFTER: u64 = 5;

    let Some(raw) = response
        .headers()
        .get(hyper::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
    else {
        return DEFAULT_RETRY_AFTER;
    };

    if let Ok(seconds) = raw.trim().parse::<u64>() {
        return seconds;
    }

    httpdate::parse_http_date(raw)
        .ok()
        .and_then(|at| at.duration_since(std::time::SystemTime::now()).ok())
        .map(|wait| wait.as_secs())
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

impl From<google_gmail1::Error> for GmailError {
    fn from(error: google_gmail1::Error) -> Self {
        match error {
            google_gmail1::Error::Failure(ref response) => {
                let status = response.status();
                let status_code = status.as_u16();
                let message = format!(
                    "HTTP {}: {}",
                    status_code,
                    status.canonical_reason().unwrap_or("Unknown")
                );

                match status_code {
                    429 => GmailError::RateLimitExceeded {
                        retry_after: parse_retry_after_header(response),
                    },
                    404 => GmailError::NotFound(message),
                    400 => GmailError::BadRequest(message),
                    401 => GmailError::AuthError(message),
                    403 => GmailError::Forbidden(message),
                    500..=599 => GmailError::ServerError {
                        status: status_code,
                        message,
                    },
                    _ => GmailError::ApiError(message),
                }
            }
            google_gmail1::Error::BadRequest(ref err) => GmailError::BadRequest(err.to_string()),
            google_gmail1::Error::HttpError(ref err) => {
                GmailError::NetworkError(format!("Connection error: {}", err))
            }
            google_gmail1::Error::Io(err) => GmailError::NetworkError(err.to_string()),
            google_gmail1::Error::MissingToken(ref err) => GmailError::AuthError(err.to_string()),
            _ => GmailError::ApiError(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_with_retry_after(value: &str) -> hyper::Response<()> {
        let mut response = hyper::Response::builder().status(429).body(()).unwrap();
        response.headers_mut().insert(
            hyper::header::RETRY_AFTER,
            hyper::header::HeaderValue::from_str(value).unwrap(),
        );
        response
    }

    #[test]
    fn test_transient_errors() {
        assert!(GmailError::RateLimitExceeded { retry_after: 5 }.is_transient());
        assert!(GmailError::ServerError {
            status: 503,
            message: "Service unavailable".to_string(),
        }
        .is_transient());
        assert!(GmailError::NetworkError("reset by peer".to_string()).is_transient());
    }

    #[test]
    fn test_permanent_errors() {
        assert!(!GmailError::BadRequest("Invalid query".to_string()).is_transient());
        assert!(!GmailError::NotFound("msg123".to_string()).is_transient());
        assert!(!GmailError::Forbidden("Access denied".to_string()).is_transient());
        assert!(!GmailError::LabelError("duplicate".to_string()).is_transient());
    }

    #[test]
    fn test_retry_after_only_for_rate_limits() {
        let limited = GmailError::RateLimitExceeded { retry_after: 7 };
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(GmailError::NetworkError("x".to_string()).retry_after(), None);
    }

    #[test]
    fn test_error_display() {
        let display = GmailError::RateLimitExceeded { retry_after: 10 }.to_string();
        assert!(display.contains("Rate limit exceeded"));
        assert!(display.contains("10 seconds"));

        let display = GmailError::LabelError("no id for 'Work'".to_string()).to_string();
        assert_eq!(display, "Label error: no id for 'Work'");
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        assert_eq!(parse_retry_after_header(&response_with_retry_after("120")), 120);
        assert_eq!(parse_retry_after_header(&response_with_retry_after("0")), 0);
    }

    #[test]
    fn test_parse_retry_after_fallbacks() {
        let missing = hyper::Response::builder().status(429).body(()).unwrap();
        assert_eq!(parse_retry_after_header(&missing), 5);
        assert_eq!(parse_retry_after_header(&response_with_retry_after("soon")), 5);

        let past = std::time::SystemTime::now() - Duration::from_secs(60);
        let past = httpdate::fmt_http_date(past);
        assert_eq!(parse_retry_after_header(&response_with_retry_after(&past)), 5);
    }

    #[test]
    fn test_parse_retry_after_http_date() {
        let future = std::time::SystemTime::now() + Duration::from_secs(60);
        let future = httpdate::fmt_http_date(future);

        let wait = parse_retry_after_header(&response_with_retry_after(&future));
        assert!((58..=61).contains(&wait), "expected ~60, got {}", wait);
    }
}
