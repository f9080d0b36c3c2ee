//! Leaky-bucket rate-limit headers
//!
//! Every response carries the bucket state in three headers. The reset value
//! is the time until the bucket refills, in **milliseconds**.

use std::time::Duration;

use reqwest::header::HeaderMap;

pub const HEADER_LIMIT: &str = "x-rate-limit-limit";
pub const HEADER_REMAINING: &str = "x-rate-limit-remaining";
pub const HEADER_RESET: &str = "x-rate-limit-reset";

/// Bucket state reported by a response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
    pub reset: Option<Duration>,
}

impl RateLimitInfo {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            limit: header_u64(headers, HEADER_LIMIT),
            remaining: header_u64(headers, HEADER_REMAINING),
            reset: reset_after(headers),
        }
    }
}

/// Time until refill from `x-rate-limit-reset`, ignoring zero and garbage.
pub fn reset_after(headers: &HeaderMap) -> Option<Duration> {
    header_u64(headers, HEADER_RESET)
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}

/// Standard `Retry-After` in whole seconds.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    header_u64(headers, reqwest::header::RETRY_AFTER.as_str())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn reset_is_read_as_milliseconds() {
        let map = headers(&[(HEADER_RESET, "3000")]);
        assert_eq!(reset_after(&map), Some(Duration::from_secs(3)));
    }

    #[test]
    fn parses_full_bucket_state() {
        let map = headers(&[
            (HEADER_LIMIT, "40"),
            (HEADER_REMAINING, "0"),
            (HEADER_RESET, "250"),
        ]);
        assert_eq!(
            RateLimitInfo::from_headers(&map),
            RateLimitInfo {
                limit: Some(40),
                remaining: Some(0),
                reset: Some(Duration::from_millis(250)),
            }
        );
    }

    #[test]
    fn garbage_and_zero_values_are_absent() {
        let map = headers(&[(HEADER_RESET, "soon"), ("retry-after", "0")]);
        assert_eq!(reset_after(&map), None);
        assert_eq!(retry_after(&map), None);
        assert_eq!(RateLimitInfo::from_headers(&HeaderMap::new()), RateLimitInfo::default());
    }

    #[test]
    fn retry_after_is_seconds() {
        let map = headers(&[("retry-after", " 5 ")]);
        assert_eq!(retry_after(&map), Some(Duration::from_secs(5)));
    }
}
