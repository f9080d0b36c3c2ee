//! Typed error taxonomy for API calls
//!
//! Every failed call yields exactly one `ApiError`. The first eight variants
//! are classified API outcomes; the rest are transport-level failures that
//! never reached a classifiable response.

use std::collections::BTreeMap;
use std::time::Duration;

/// Errors returned by the API client and its transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("authentication failed{}", detail(.message))]
    Auth { message: String },

    #[error("resource not found{}", detail(.message))]
    NotFound { message: String },

    #[error("payment required{}", detail(.message))]
    PaymentRequired { message: String },

    #[error("permission denied{}", detail(.message))]
    PermissionDenied { message: String },

    #[error("validation error: {}", format_fields(.fields))]
    Validation {
        status: u16,
        fields: BTreeMap<String, Vec<String>>,
    },

    #[error("{}", rate_limit_message(.retries, .reset))]
    RateLimit {
        retries: u32,
        /// Time until the bucket refills, from `x-rate-limit-reset`.
        reset: Option<Duration>,
        limit: Option<u64>,
        remaining: Option<u64>,
    },

    #[error("circuit breaker open after {failures} consecutive failures")]
    CircuitOpen { failures: u32 },

    #[error("{}", generic_message(.status, .code, .message))]
    Generic {
        status: u16,
        code: String,
        message: String,
        /// Raw response body, kept for diagnostics.
        body: String,
    },

    #[error("network error: {0}")]
    Network(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("decode response: {0}")]
    Decode(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    /// HTTP status behind a classified error, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Auth { .. } => Some(401),
            ApiError::PaymentRequired { .. } => Some(402),
            ApiError::PermissionDenied { .. } => Some(403),
            ApiError::NotFound { .. } => Some(404),
            ApiError::RateLimit { .. } => Some(429),
            ApiError::Validation { status, .. } | ApiError::Generic { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// True when the upstream answered with a 5xx after retries ran out.
    pub fn is_server_error(&self) -> bool {
        matches!(self, ApiError::Generic { status, .. } if *status >= 500)
    }

    /// Whether the caller may reasonably try the same call again later.
    pub fn is_retryable(&self) -> bool {
        self.is_server_error()
            || matches!(
                self,
                ApiError::RateLimit { .. } | ApiError::CircuitOpen { .. } | ApiError::Network(_)
            )
    }

    /// Short stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Auth { .. } => "auth",
            ApiError::NotFound { .. } => "not_found",
            ApiError::PaymentRequired { .. } => "payment_required",
            ApiError::PermissionDenied { .. } => "permission_denied",
            ApiError::Validation { .. } => "validation",
            ApiError::RateLimit { .. } => "rate_limit",
            ApiError::CircuitOpen { .. } => "circuit_open",
            ApiError::Generic { .. } => "api",
            ApiError::Network(_) => "network",
            ApiError::Cancelled => "cancelled",
            ApiError::Decode(_) => "decode",
            ApiError::InvalidRequest(_) => "invalid_request",
        }
    }
}

/// Result alias for API operations.
pub type Result<T> = std::result::Result<T, ApiError>;

fn detail(message: &str) -> String {
    if message.is_empty() {
        String::new()
    } else {
        format!(": {message}")
    }
}

fn format_fields(fields: &BTreeMap<String, Vec<String>>) -> String {
    fields
        .iter()
        .map(|(field, msgs)| format!("{field}: {}", msgs.join(", ")))
        .collect::<Vec<_>>()
        .join("; ")
}

fn rate_limit_message(retries: &u32, reset: &Option<Duration>) -> String {
    match reset {
        Some(reset) if !reset.is_zero() => format!(
            "rate limit exceeded, retry after {reset:?} (attempted {retries} retries)"
        ),
        _ => format!("rate limit exceeded after {retries} retries"),
    }
}

fn generic_message(status: &u16, code: &str, message: &str) -> String {
    if !message.is_empty() {
        format!("API error {status}: {message}")
    } else if !code.is_empty() {
        format!("API error {status}: {code}")
    } else {
        format!("API error {status}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_prefers_message_then_code() {
        let err = ApiError::Generic {
            status: 400,
            code: "bad_request".into(),
            message: "name is too long".into(),
            body: String::new(),
        };
        assert_eq!(err.to_string(), "API error 400: name is too long");

        let err = ApiError::Generic {
            status: 400,
            code: "bad_request".into(),
            message: String::new(),
            body: String::new(),
        };
        assert_eq!(err.to_string(), "API error 400: bad_request");

        let err = ApiError::Generic {
            status: 500,
            code: String::new(),
            message: String::new(),
            body: String::new(),
        };
        assert_eq!(err.to_string(), "API error 500");
    }

    #[test]
    fn validation_lists_fields_in_order() {
        let mut fields = BTreeMap::new();
        fields.insert("price".to_string(), vec!["must be positive".to_string()]);
        fields.insert(
            "name".to_string(),
            vec!["required".to_string(), "too short".to_string()],
        );
        let err = ApiError::Validation { status: 422, fields };
        assert_eq!(
            err.to_string(),
            "validation error: name: required, too short; price: must be positive"
        );
    }

    #[test]
    fn rate_limit_mentions_reset_when_known() {
        let err = ApiError::RateLimit {
            retries: 5,
            reset: Some(Duration::from_millis(1500)),
            limit: Some(40),
            remaining: Some(0),
        };
        assert!(err.to_string().contains("retry after 1.5s"), "got: {err}");

        let err = ApiError::RateLimit {
            retries: 5,
            reset: None,
            limit: None,
            remaining: None,
        };
        assert_eq!(err.to_string(), "rate limit exceeded after 5 retries");
    }

    #[test]
    fn auth_message_is_optional() {
        assert_eq!(
            ApiError::Auth { message: String::new() }.to_string(),
            "authentication failed"
        );
        assert_eq!(
            ApiError::Auth { message: "token revoked".into() }.to_string(),
            "authentication failed: token revoked"
        );
    }

    #[test]
    fn server_errors_are_retryable_client_errors_are_not() {
        let server = ApiError::Generic {
            status: 503,
            code: String::new(),
            message: String::new(),
            body: String::new(),
        };
        assert!(server.is_server_error());
        assert!(server.is_retryable());

        let client = ApiError::Generic {
            status: 400,
            code: String::new(),
            message: String::new(),
            body: String::new(),
        };
        assert!(!client.is_server_error());
        assert!(!client.is_retryable());

        assert!(ApiError::CircuitOpen { failures: 5 }.is_retryable());
        assert!(!ApiError::NotFound { message: String::new() }.is_retryable());
    }

    #[test]
    fn status_maps_fixed_variants() {
        assert_eq!(ApiError::Auth { message: String::new() }.status(), Some(401));
        assert_eq!(
            ApiError::PermissionDenied { message: String::new() }.status(),
            Some(403)
        );
        assert_eq!(ApiError::Cancelled.status(), None);
    }
}
