//! Error types for the authorization flow

use std::time::Duration;

/// Errors from credential loading, the loopback callback and token exchange.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No client credentials are configured. Distinct from a malformed file
    /// so the flow can fall back to a broker.
    #[error("OAuth client credentials missing: {0}")]
    CredentialsMissing(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("cannot listen for the callback on 127.0.0.1:{port}: {message}")]
    Bind { port: u16, message: String },

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("state mismatch (possible CSRF attack)")]
    StateMismatch,

    #[error("missing authorization code")]
    MissingCode,

    #[error("broker callback did not include a token")]
    MissingToken,

    #[error("authorization error: {0}")]
    Provider(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("no access token in response")]
    NoAccessToken,

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("authorization timed out after {0:?}")]
    Timeout(Duration),

    #[error("authorization cancelled")]
    Cancelled,
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
