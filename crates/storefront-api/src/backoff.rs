//! Retry bounds and backoff computation

use std::time::Duration;

use rand::RngExt;
use reqwest::header::HeaderMap;

use crate::rate_limit;

/// Retry bounds and base delay for the transport.
///
/// Every bound is finite so that no request retries forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after a 429 (attempts = retries + 1).
    pub max_retries_rate_limit: u32,
    /// Retries after a 5xx.
    pub max_retries_server: u32,
    /// Retries after a connection-level failure.
    pub max_retries_network: u32,
    /// First exponential step; doubled on each retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries_rate_limit: 5,
            max_retries_server: 2,
            max_retries_network: 2,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Which failure the wait is for. Only 429s honour the bucket reset header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    RateLimited,
    ServerError,
    Network,
}

impl RetryReason {
    pub fn label(self) -> &'static str {
        match self {
            RetryReason::RateLimited => "rate_limited",
            RetryReason::ServerError => "server_error",
            RetryReason::Network => "network",
        }
    }
}

impl RetryPolicy {
    pub fn max_retries(&self, reason: RetryReason) -> u32 {
        match reason {
            RetryReason::RateLimited => self.max_retries_rate_limit,
            RetryReason::ServerError => self.max_retries_server,
            RetryReason::Network => self.max_retries_network,
        }
    }

    /// Delay before retry number `attempt` (zero-based).
    ///
    /// Priority: `x-rate-limit-reset` (ms, 429 only), then `Retry-After`
    /// (seconds), then `base_delay * 2^attempt` plus up to 50% jitter.
    pub fn backoff(&self, reason: RetryReason, attempt: u32, headers: Option<&HeaderMap>) -> Duration {
        if let Some(headers) = headers {
            if reason == RetryReason::RateLimited {
                if let Some(reset) = rate_limit::reset_after(headers) {
                    return reset;
                }
            }
            if let Some(after) = rate_limit::retry_after(headers) {
                return after;
            }
        }
        self.exponential(attempt)
    }

    fn exponential(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.saturating_mul(1u32 << attempt.min(16));
        let max_jitter = u64::try_from(delay.as_nanos() / 2).unwrap_or(u64::MAX);
        let jitter = if max_jitter == 0 {
            0
        } else {
            rand::rng().random_range(0..=max_jitter)
        };
        delay.saturating_add(Duration::from_nanos(jitter))
    }
}
