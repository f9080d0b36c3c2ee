//! Resilient client for the storefront REST API
//!
//! Requests flow `Client` -> `RetryTransport` -> `CircuitBreaker` +
//! `classify`. The API is rate limited with a leaky bucket and paginates with
//! `Link` headers; this crate absorbs both so callers see either a successful
//! response or exactly one typed `ApiError`.
//!
//! Request flow:
//! 1. `Client` composes `{base}/{store_id}/{path}` and injects the
//!    `Authentication: bearer <token>` header
//! 2. `RetryTransport` fails fast while the breaker is open
//! 3. 429, 5xx and connection failures are retried with bounded backoff
//! 4. Any other non-2xx response is classified and returned immediately
//! 5. `pagination::collect_all()` repeats the GET while a `next` link exists

pub mod backoff;
pub mod circuit;
pub mod classify;
pub mod client;
pub mod error;
pub mod metrics;
pub mod pagination;
pub mod rate_limit;
pub mod transport;

pub use backoff::{RetryPolicy, RetryReason};
pub use circuit::CircuitBreaker;
pub use classify::classify;
pub use client::{Client, ClientBuilder, DEFAULT_BASE_URL, DEFAULT_USER_AGENT, Query};
pub use error::{ApiError, Result};
pub use pagination::{PageLinks, collect_all, collect_all_json, parse_link_header};
pub use rate_limit::RateLimitInfo;
pub use transport::{ApiRequest, HttpSend, RetryTransport};
