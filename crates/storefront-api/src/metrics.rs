//! Transport metrics
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! embedding binary installs a recorder.
//!
//! - `storefront_api_requests_total` (counter): label `status`
//! - `storefront_api_retries_total` (counter): label `reason`
//! - `storefront_api_circuit_opened_total` (counter)

use crate::backoff::RetryReason;

/// Record one completed HTTP attempt with its status code.
pub fn record_request(status: u16) {
    metrics::counter!("storefront_api_requests_total", "status" => status.to_string())
        .increment(1);
}

/// Record a retry scheduled by the transport.
pub fn record_retry(reason: RetryReason) {
    metrics::counter!("storefront_api_retries_total", "reason" => reason.label()).increment(1);
}

/// Record the breaker transitioning to open.
pub fn record_circuit_opened() {
    metrics::counter!("storefront_api_circuit_opened_total").increment(1);
}
