//! Retrying HTTP transport
//!
//! Wraps an [`HttpSend`] with the circuit breaker, bounded retries for 429,
//! 5xx and connection failures, and error classification. Every non-2xx
//! response leaves the transport as a typed [`ApiError`]; 2xx responses are
//! returned untouched.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode, Url};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backoff::{RetryPolicy, RetryReason};
use crate::circuit::CircuitBreaker;
use crate::classify::classify;
use crate::error::{ApiError, Result};
use crate::metrics;
use crate::rate_limit::RateLimitInfo;

/// A fully-buffered request that can be rebuilt for every attempt.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl ApiRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    fn build(&self, timeout: Option<Duration>) -> reqwest::Request {
        let mut request = reqwest::Request::new(self.method.clone(), self.url.clone());
        *request.headers_mut() = self.headers.clone();
        if let Some(body) = &self.body {
            *request.body_mut() = Some(reqwest::Body::from(body.clone()));
        }
        *request.timeout_mut() = timeout;
        request
    }
}

/// The underlying sender the transport retries through.
///
/// Returns a boxed future so the trait stays object-safe behind `Arc<dyn HttpSend>`.
pub trait HttpSend: Send + Sync {
    fn send(
        &self,
        request: reqwest::Request,
    ) -> Pin<Box<dyn Future<Output = reqwest::Result<reqwest::Response>> + Send + '_>>;
}

impl HttpSend for reqwest::Client {
    fn send(
        &self,
        request: reqwest::Request,
    ) -> Pin<Box<dyn Future<Output = reqwest::Result<reqwest::Response>> + Send + '_>> {
        Box::pin(self.execute(request))
    }
}

/// Retry, breaker and classification layer shared by every request of a client.
#[derive(Clone)]
pub struct RetryTransport {
    sender: Arc<dyn HttpSend>,
    breaker: Arc<CircuitBreaker>,
    policy: RetryPolicy,
    timeout: Option<Duration>,
    cancel: Option<CancellationToken>,
}

impl RetryTransport {
    pub fn new(sender: Arc<dyn HttpSend>, breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            sender,
            breaker,
            policy: RetryPolicy::default(),
            timeout: None,
            cancel: None,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Per-attempt timeout applied on top of the sender's own.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Abort in-flight sends and backoff waits when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Send `request`, retrying 429, 5xx and connection failures within the
    /// policy bounds.
    pub async fn send(&self, request: &ApiRequest) -> Result<reqwest::Response> {
        let mut rate_limit_retries = 0;
        let mut server_retries = 0;
        let mut network_retries = 0;

        loop {
            if self.breaker.is_open() {
                return Err(ApiError::CircuitOpen {
                    failures: self.breaker.failures(),
                });
            }

            debug!(method = %request.method, url = %request.url, "sending request");
            let sent = self
                .cancellable(self.sender.send(request.build(self.timeout)))
                .await?;

            let response = match sent {
                Ok(response) => response,
                Err(err) => {
                    self.record_failure();
                    if network_retries < self.policy.max_retries(RetryReason::Network) {
                        self.wait(RetryReason::Network, network_retries, None, request)
                            .await?;
                        network_retries += 1;
                        continue;
                    }
                    return Err(ApiError::Network(error_chain(&err)));
                }
            };

            let status = response.status();
            metrics::record_request(status.as_u16());

            if status.is_success() {
                self.breaker.record_success();
                return Ok(response);
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                if rate_limit_retries < self.policy.max_retries(RetryReason::RateLimited) {
                    self.wait(
                        RetryReason::RateLimited,
                        rate_limit_retries,
                        Some(response.headers()),
                        request,
                    )
                    .await?;
                    rate_limit_retries += 1;
                    continue;
                }
                let info = RateLimitInfo::from_headers(response.headers());
                self.record_failure();
                return Err(ApiError::RateLimit {
                    retries: rate_limit_retries,
                    reset: info.reset,
                    limit: info.limit,
                    remaining: info.remaining,
                });
            }

            if status.is_server_error() {
                if server_retries < self.policy.max_retries(RetryReason::ServerError) {
                    self.wait(
                        RetryReason::ServerError,
                        server_retries,
                        Some(response.headers()),
                        request,
                    )
                    .await?;
                    server_retries += 1;
                    continue;
                }
                self.record_failure();
            }

            let body = self.read_body(response).await?;
            let err = classify(status.as_u16(), &body);
            debug!(status = status.as_u16(), kind = err.kind(), "request failed");
            return Err(err);
        }
    }

    async fn wait(
        &self,
        reason: RetryReason,
        attempt: u32,
        headers: Option<&HeaderMap>,
        request: &ApiRequest,
    ) -> Result<()> {
        let delay = self.policy.backoff(reason, attempt, headers);
        warn!(
            reason = reason.label(),
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            url = %request.url,
            "retrying request"
        );
        metrics::record_retry(reason);
        self.cancellable(tokio::time::sleep(delay)).await
    }

    async fn read_body(&self, response: reqwest::Response) -> Result<Bytes> {
        Ok(self
            .cancellable(response.bytes())
            .await?
            .unwrap_or_default())
    }

    async fn cancellable<F: Future>(&self, fut: F) -> Result<F::Output> {
        match &self.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(ApiError::Cancelled),
                out = fut => Ok(out),
            },
            None => Ok(fut.await),
        }
    }

    fn record_failure(&self) {
        if self.breaker.record_failure() {
            metrics::record_circuit_opened();
        }
    }
}

fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
