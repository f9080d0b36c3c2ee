//! Browser-based authorization flow
//!
//! One attempt runs through these states:
//! 1. Choose the flow: an explicit broker URL wins; otherwise load client
//!    credentials, falling back to the default broker when none exist
//! 2. Bind the loopback listener and open the authorize URL in the browser
//! 3. Race the callback against the deadline and cancellation
//! 4. Native only: exchange the code for a token within the same deadline
//!
//! The listener is shut down before `run` returns, whatever the outcome.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::browser::BrowserLauncher;
use crate::callback::{CallbackMode, CallbackOutcome, CallbackServer};
use crate::constants::{AUTHORIZE_BASE_URL, CALLBACK_PORT, DEFAULT_TIMEOUT, TOKEN_ENDPOINT};
use crate::credentials::{ClientCredentials, CredentialSource};
use crate::error::{Error, Result};
use crate::state::generate_state;
use crate::token::{TokenResult, exchange_code, extract_code};

/// Provider URLs, overridable for tests and staging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    pub authorize_base: String,
    pub token_url: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            authorize_base: AUTHORIZE_BASE_URL.to_string(),
            token_url: TOKEN_ENDPOINT.to_string(),
        }
    }
}

/// Which variant of the flow an attempt runs.
#[derive(Debug, Clone)]
pub enum FlowKind {
    /// A remote broker holds the app secret and hands back a finished token.
    Broker { url: String },
    /// The CLI holds the app credentials and exchanges the code itself.
    Native { credentials: ClientCredentials },
}

/// Per-attempt settings.
#[derive(Debug, Clone)]
pub struct FlowOptions {
    /// Broker requested explicitly; skips credential loading.
    pub broker_url: Option<String>,
    /// Broker used only when no client credentials are configured.
    pub default_broker_url: Option<String>,
    pub callback_port: u16,
    pub timeout: Duration,
    pub cancel: Option<CancellationToken>,
}

impl Default for FlowOptions {
    fn default() -> Self {
        Self {
            broker_url: None,
            default_broker_url: None,
            callback_port: CALLBACK_PORT,
            timeout: DEFAULT_TIMEOUT,
            cancel: None,
        }
    }
}

/// Runs authorization attempts with injected collaborators.
pub struct AuthorizationFlow {
    credentials: Arc<dyn CredentialSource>,
    browser: Arc<dyn BrowserLauncher>,
    http: reqwest::Client,
    endpoints: ProviderEndpoints,
}

impl AuthorizationFlow {
    pub fn new(credentials: Arc<dyn CredentialSource>, browser: Arc<dyn BrowserLauncher>) -> Self {
        Self {
            credentials,
            browser,
            http: reqwest::Client::new(),
            endpoints: ProviderEndpoints::default(),
        }
    }

    pub fn with_endpoints(mut self, endpoints: ProviderEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Pick broker or native for this attempt.
    pub async fn choose(&self, options: &FlowOptions) -> Result<FlowKind> {
        if let Some(url) = &options.broker_url {
            return Ok(FlowKind::Broker { url: url.clone() });
        }

        match self.credentials.load().await {
            Ok(credentials) => Ok(FlowKind::Native { credentials }),
            Err(Error::CredentialsMissing(reason)) => match &options.default_broker_url {
                Some(url) => {
                    info!(broker = %url, "no client credentials, using default broker");
                    Ok(FlowKind::Broker { url: url.clone() })
                }
                None => Err(Error::CredentialsMissing(reason)),
            },
            Err(e) => Err(e),
        }
    }

    /// Run one authorization attempt to completion.
    pub async fn run(&self, options: FlowOptions) -> Result<TokenResult> {
        let kind = self.choose(&options).await?;
        let deadline = Deadline::new(options.timeout, options.cancel.clone());

        let mode = match &kind {
            FlowKind::Broker { .. } => CallbackMode::Broker,
            FlowKind::Native { .. } => CallbackMode::Native {
                state: generate_state(),
            },
        };

        let mut server = CallbackServer::bind(options.callback_port, mode.clone()).await?;
        let result = self.complete(&kind, &mode, &mut server, &deadline).await;
        server.shutdown().await;

        match &result {
            Ok(token) => info!(account_id = %token.account_id, "authorization complete"),
            Err(e) => warn!(error = %e, "authorization failed"),
        }
        result
    }

    async fn complete(
        &self,
        kind: &FlowKind,
        mode: &CallbackMode,
        server: &mut CallbackServer,
        deadline: &Deadline,
    ) -> Result<TokenResult> {
        let url = self.authorize_url(kind, mode, server)?;
        info!(url = %url, "opening browser for authorization");
        if let Err(e) = self.browser.open(url.as_str()) {
            warn!(error = %e, "could not open browser, visit the URL manually");
        }

        let outcome = deadline.race(server.recv()).await?;

        match (kind, outcome) {
            (_, CallbackOutcome::Token(token)) => Ok(TokenResult {
                access_token: token.access_token,
                token_type: "bearer".into(),
                scope: String::new(),
                account_id: token.user_id,
            }),
            (FlowKind::Native { credentials }, CallbackOutcome::Code(code)) => {
                info!("authorization received, exchanging code");
                deadline
                    .race(exchange_code(&self.http, &self.endpoints.token_url, credentials, &code))
                    .await
            }
            (FlowKind::Broker { .. }, CallbackOutcome::Code(_)) => Err(Error::MissingToken),
        }
    }

    fn authorize_url(&self, kind: &FlowKind, mode: &CallbackMode, server: &CallbackServer) -> Result<Url> {
        match (kind, mode) {
            (FlowKind::Broker { url }, _) => broker_start_url(url, server.port()),
            (FlowKind::Native { credentials }, CallbackMode::Native { state }) => {
                let mut url = self.app_authorize_url(&credentials.client_id)?;
                url.query_pairs_mut()
                    .append_pair("redirect_uri", &server.redirect_uri())
                    .append_pair("state", state);
                Ok(url)
            }
            (FlowKind::Native { .. }, CallbackMode::Broker) => {
                Err(Error::InvalidUrl("native flow requires a state token".into()))
            }
        }
    }

    /// Authorize page for manual completion, without redirect or state.
    pub async fn manual_authorize_url(&self) -> Result<Url> {
        let credentials = self.credentials.load().await?;
        self.app_authorize_url(&credentials.client_id)
    }

    /// Finish a manual authorization from a pasted redirect URL or bare code.
    /// The exchange is bounded by `options.timeout` and `options.cancel`.
    pub async fn complete_manual(&self, input: &str, options: &FlowOptions) -> Result<TokenResult> {
        let code = extract_code(input)?;
        let credentials = self.credentials.load().await?;
        let deadline = Deadline::new(options.timeout, options.cancel.clone());
        deadline
            .race(exchange_code(&self.http, &self.endpoints.token_url, &credentials, &code))
            .await
    }

    fn app_authorize_url(&self, client_id: &str) -> Result<Url> {
        let raw = format!(
            "{}/{client_id}/authorize",
            self.endpoints.authorize_base.trim_end_matches('/')
        );
        Url::parse(&raw).map_err(|e| Error::InvalidUrl(format!("{raw}: {e}")))
    }
}

/// `<broker>/start?port=N`
fn broker_start_url(broker: &str, port: u16) -> Result<Url> {
    let raw = format!("{}/start", broker.trim_end_matches('/'));
    let mut url = Url::parse(&raw).map_err(|e| Error::InvalidUrl(format!("{raw}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::InvalidUrl(format!("broker must be http or https: {broker}")));
    }
    url.query_pairs_mut().append_pair("port", &port.to_string());
    Ok(url)
}

/// Shared deadline and cancellation for every wait in one attempt.
struct Deadline {
    at: Instant,
    total: Duration,
    cancel: Option<CancellationToken>,
}

impl Deadline {
    fn new(total: Duration, cancel: Option<CancellationToken>) -> Self {
        Self {
            at: Instant::now() + total,
            total,
            cancel,
        }
    }

    async fn race<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        let timed = tokio::time::timeout_at(self.at, fut);
        let outcome = match &self.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => return Err(Error::Cancelled),
                outcome = timed => outcome,
            },
            None => timed.await,
        };
        outcome.map_err(|_| Error::Timeout(self.total))?
    }
}
