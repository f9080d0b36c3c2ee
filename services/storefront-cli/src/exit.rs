//! Stable exit codes and user-facing error messages
//!
//! Scripts branch on the exit code, so the numbers never change meaning.
//! `storefront exit-codes` prints the table.

use std::io::Write;

use storefront_api::ApiError;

/// Process exit status for every outcome the CLI distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Ok,
    Error,
    Usage,
    AuthRequired,
    NotFound,
    PermissionDenied,
    RateLimited,
    Retryable,
    Config,
    Cancelled,
    PaymentRequired,
    Validation,
}

impl ExitCode {
    pub const ALL: [ExitCode; 12] = [
        ExitCode::Ok,
        ExitCode::Error,
        ExitCode::Usage,
        ExitCode::AuthRequired,
        ExitCode::NotFound,
        ExitCode::PermissionDenied,
        ExitCode::RateLimited,
        ExitCode::Retryable,
        ExitCode::Config,
        ExitCode::Cancelled,
        ExitCode::PaymentRequired,
        ExitCode::Validation,
    ];

    pub fn code(self) -> i32 {
        match self {
            ExitCode::Ok => 0,
            ExitCode::Error => 1,
            ExitCode::Usage => 2,
            ExitCode::AuthRequired => 3,
            ExitCode::NotFound => 4,
            ExitCode::PermissionDenied => 5,
            ExitCode::RateLimited => 6,
            ExitCode::Retryable => 7,
            ExitCode::Config => 8,
            ExitCode::Cancelled => 9,
            ExitCode::PaymentRequired => 10,
            ExitCode::Validation => 11,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ExitCode::Ok => "ok",
            ExitCode::Error => "error",
            ExitCode::Usage => "usage",
            ExitCode::AuthRequired => "auth_required",
            ExitCode::NotFound => "not_found",
            ExitCode::PermissionDenied => "permission_denied",
            ExitCode::RateLimited => "rate_limited",
            ExitCode::Retryable => "retryable",
            ExitCode::Config => "config",
            ExitCode::Cancelled => "cancelled",
            ExitCode::PaymentRequired => "payment_required",
            ExitCode::Validation => "validation",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ExitCode::Ok => "Success",
            ExitCode::Error => "Generic error",
            ExitCode::Usage => "Invalid usage / bad arguments",
            ExitCode::AuthRequired => "Authentication required (HTTP 401)",
            ExitCode::NotFound => "Resource not found (HTTP 404)",
            ExitCode::PermissionDenied => "Permission denied (HTTP 403)",
            ExitCode::RateLimited => "Rate limited (HTTP 429)",
            ExitCode::Retryable => "Retryable server error (HTTP 5xx, circuit open)",
            ExitCode::Config => "Missing config or credentials",
            ExitCode::Cancelled => "User cancelled",
            ExitCode::PaymentRequired => "Payment required (HTTP 402)",
            ExitCode::Validation => "Validation error (HTTP 422)",
        }
    }
}

/// Bad arguments detected after parsing (e.g. a `--data` value that is not JSON).
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct UsageError(pub String);

/// Pick the exit code for the first typed error in the chain.
pub fn classify(err: &anyhow::Error) -> ExitCode {
    for cause in err.chain() {
        if let Some(api) = cause.downcast_ref::<ApiError>() {
            return from_api(api);
        }
        if let Some(auth) = cause.downcast_ref::<storefront_auth::Error>() {
            return from_auth(auth);
        }
        if cause.downcast_ref::<common::Error>().is_some() {
            return ExitCode::Config;
        }
        if cause.downcast_ref::<UsageError>().is_some() {
            return ExitCode::Usage;
        }
    }
    ExitCode::Error
}

fn from_api(err: &ApiError) -> ExitCode {
    match err {
        ApiError::Auth { .. } => ExitCode::AuthRequired,
        ApiError::NotFound { .. } => ExitCode::NotFound,
        ApiError::PaymentRequired { .. } => ExitCode::PaymentRequired,
        ApiError::PermissionDenied { .. } => ExitCode::PermissionDenied,
        ApiError::Validation { .. } => ExitCode::Validation,
        ApiError::RateLimit { .. } => ExitCode::RateLimited,
        ApiError::CircuitOpen { .. } => ExitCode::Retryable,
        ApiError::Generic { status, .. } if *status >= 500 => ExitCode::Retryable,
        ApiError::Cancelled => ExitCode::Cancelled,
        ApiError::InvalidRequest(_) => ExitCode::Usage,
        ApiError::Generic { .. } | ApiError::Network(_) | ApiError::Decode(_) => ExitCode::Error,
    }
}

fn from_auth(err: &storefront_auth::Error) -> ExitCode {
    use storefront_auth::Error;
    match err {
        Error::CredentialsMissing(_) | Error::InvalidCredentials(_) | Error::CredentialParse(_) => {
            ExitCode::Config
        }
        Error::Cancelled => ExitCode::Cancelled,
        _ => ExitCode::Error,
    }
}

/// Message shown on stderr for a failed command.
pub fn user_message(err: &anyhow::Error) -> String {
    for cause in err.chain() {
        if let Some(api) = cause.downcast_ref::<ApiError>() {
            return api_message(api);
        }
        if let Some(storefront_auth::Error::CredentialsMissing(_)) =
            cause.downcast_ref::<storefront_auth::Error>()
        {
            return "OAuth client credentials missing.\n\
                    Create an app in the partner portal and save its credentials.\n\
                    Then run: storefront auth credentials <credentials.json>\n\
                    Or log in through a broker: storefront auth login --broker-url <url>"
                .into();
        }
    }
    format!("{err:#}")
}

fn api_message(err: &ApiError) -> String {
    match err {
        ApiError::Generic {
            status, message, ..
        } => {
            if message.is_empty() {
                format!("API error (HTTP {status})")
            } else {
                format!("API error (HTTP {status}): {message}")
            }
        }
        ApiError::Auth { .. } => {
            "Authentication failed. Check your access token or run: storefront auth login".into()
        }
        ApiError::RateLimit { retries, .. } => format!(
            "Rate limit exceeded after {retries} retries. Try again in a few seconds."
        ),
        ApiError::Validation { .. } => {
            let mut message = err.to_string();
            if let Some(first) = message.get_mut(0..1) {
                first.make_ascii_uppercase();
            }
            message
        }
        ApiError::PaymentRequired { .. } => {
            "Store access suspended (payment required). Check your subscription.".into()
        }
        ApiError::PermissionDenied { message } if message.is_empty() => "Permission denied".into(),
        ApiError::PermissionDenied { message } => format!("Permission denied: {message}"),
        ApiError::CircuitOpen { .. } => {
            "API temporarily unavailable (circuit breaker open). Try again shortly.".into()
        }
        other => other.to_string(),
    }
}

/// Print the exit code table, as text or as a JSON array.
pub fn print_table(out: &mut impl Write, json: bool) -> std::io::Result<()> {
    if json {
        let rows: Vec<_> = ExitCode::ALL
            .iter()
            .map(|code| {
                serde_json::json!({
                    "code": code.code(),
                    "name": code.name(),
                    "description": code.description(),
                })
            })
            .collect();
        let text = serde_json::to_string_pretty(&rows).map_err(std::io::Error::other)?;
        writeln!(out, "{text}")
    } else {
        for code in ExitCode::ALL {
            writeln!(out, "{:>3}  {:<18} {}", code.code(), code.name(), code.description())?;
        }
        Ok(())
    }
}
