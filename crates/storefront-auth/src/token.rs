//! Authorization-code exchange
//!
//! The native flow trades the callback's `code` for an access token with a
//! form POST carrying the app credentials. Tokens do not expire and there is
//! no refresh grant.

use common::Secret;
use reqwest::StatusCode;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::credentials::ClientCredentials;
use crate::error::{Error, Result};

/// Token granted to the CLI, from either flow.
#[derive(Debug, Clone)]
pub struct TokenResult {
    pub access_token: Secret<String>,
    pub token_type: String,
    pub scope: String,
    /// Store the token is bound to (`user_id` on the wire).
    pub account_id: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    token_type: String,
    #[serde(default)]
    scope: String,
    #[serde(default, deserialize_with = "string_or_number")]
    user_id: String,
}

/// `user_id` arrives as a JSON number or a string depending on the endpoint.
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "user_id must be a string or number, got {other}"
        ))),
    }
}

/// Exchange an authorization code at `token_url`.
pub async fn exchange_code(
    client: &reqwest::Client,
    token_url: &str,
    credentials: &ClientCredentials,
    code: &str,
) -> Result<TokenResult> {
    let response = client
        .post(token_url)
        .form(&[
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.expose().as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token exchange request failed: {e}")))?;

    let status = response.status();
    if status != StatusCode::OK {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::TokenExchange(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    let token = response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid token response: {e}")))?;

    if token.access_token.is_empty() {
        return Err(Error::NoAccessToken);
    }

    Ok(TokenResult {
        access_token: Secret::from(token.access_token),
        token_type: token.token_type,
        scope: token.scope,
        account_id: token.user_id,
    })
}

/// Pull the authorization code out of a pasted redirect URL. Input that is
/// not a URL with a `code` parameter is taken as the bare code.
pub fn extract_code(input: &str) -> Result<String> {
    let input = input.trim();
    let from_url = reqwest::Url::parse(input).ok().and_then(|url| {
        url.query_pairs()
            .find(|(key, _)| key == "code")
            .map(|(_, value)| value.into_owned())
    });

    match from_url {
        Some(code) if !code.is_empty() => Ok(code),
        _ if !input.is_empty() && !input.contains("://") => Ok(input.to_string()),
        _ => Err(Error::MissingCode),
    }
}
