use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";
pub const LIMIT_HEADER: &str = "x-ratelimit-limit";

/// Quota state reported by the service for one response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSnapshot {
    pub remaining: Option<u64>,
    pub reset_at: Option<DateTime<Utc>>,
    pub limit: Option<u64>,
    pub status_code: u16,
    pub path: String,
}

impl RateLimitSnapshot {
    /// Parse the quota headers of a response.
    ///
    /// Returns `None` unless at least one of the headers holds a valid value;
    /// present-but-malformed headers count as absent.
    pub fn parse(headers: &HeaderMap, status_code: u16, path: &str) -> Option<Self> {
        let remaining = header_u64(headers, REMAINING_HEADER);
        let limit = header_u64(headers, LIMIT_HEADER);
        let reset_at = headers
            .get(RESET_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0));

        if remaining.is_none() && limit.is_none() && reset_at.is_none() {
            return None;
        }

        Some(Self {
            remaining,
            reset_at,
            limit,
            status_code,
            path: path.to_string(),
        })
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

/// Wait mandated by a `Retry-After` header given in (possibly fractional) seconds
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let secs = headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()?;

    // negative, NaN, infinite and out-of-range values count as absent
    Duration::try_from_secs_f64(secs).ok()
}

/// Keeps the most recent quota snapshot seen on any response
#[derive(Debug, Default)]
pub struct RateLimitTracker {
    latest: RwLock<Option<RateLimitSnapshot>>,
}

impl RateLimitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `headers` and remember the snapshot if one was produced
    pub fn record(&self, headers: &HeaderMap, status_code: u16, path: &str) -> Option<RateLimitSnapshot> {
        let snapshot = RateLimitSnapshot::parse(headers, status_code, path)?;
        debug!(
            remaining = ?snapshot.remaining,
            limit = ?snapshot.limit,
            status = status_code,
            path,
            "Recorded rate limit snapshot"
        );
        match self.latest.write() {
            Ok(mut latest) => *latest = Some(snapshot.clone()),
            Err(_) => warn!(path, "Rate limit tracker lock poisoned, snapshot not kept"),
        }
        Some(snapshot)
    }

    pub fn latest(&self) -> Option<RateLimitSnapshot> {
        self.latest.read().ok()?.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderName, HeaderValue};

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_static(value),
            );
        }
        map
    }

    #[test]
    fn test_parse_all_headers() {
        let map = headers(&[
            ("X-RateLimit-Remaining", "42"),
            ("X-RateLimit-Reset", "1700000000"),
            ("X-RateLimit-Limit", "100"),
        ]);

        let snapshot = RateLimitSnapshot::parse(&map, 200, "/v1/albums").unwrap();
        assert_eq!(snapshot.remaining, Some(42));
        assert_eq!(snapshot.limit, Some(100));
        assert_eq!(snapshot.reset_at.unwrap().timestamp(), 1_700_000_000);
        assert_eq!(snapshot.status_code, 200);
        assert_eq!(snapshot.path, "/v1/albums");
    }

    #[test]
    fn test_partial_headers_produce_snapshot() {
        let map = headers(&[("X-RateLimit-Remaining", "0")]);

        let snapshot = RateLimitSnapshot::parse(&map, 429, "/v1/search").unwrap();
        assert!(snapshot.is_exhausted());
        assert_eq!(snapshot.limit, None);
        assert_eq!(snapshot.reset_at, None);
    }

    #[test]
    fn test_no_headers_no_snapshot() {
        assert!(RateLimitSnapshot::parse(&HeaderMap::new(), 200, "/").is_none());
    }

    #[test]
    fn test_malformed_headers_no_snapshot() {
        let map = headers(&[
            ("X-RateLimit-Remaining", "lots"),
            ("X-RateLimit-Reset", "tomorrow"),
            ("X-RateLimit-Limit", "-1"),
        ]);

        assert!(RateLimitSnapshot::parse(&map, 200, "/").is_none());
    }

    #[test]
    fn test_retry_after_seconds() {
        assert_eq!(retry_after(&headers(&[("Retry-After", "2")])), Some(Duration::from_secs(2)));
        assert_eq!(
            retry_after(&headers(&[("Retry-After", "0.5")])),
            Some(Duration::from_millis(500))
        );
        assert_eq!(retry_after(&headers(&[("Retry-After", "soon")])), None);
        assert_eq!(retry_after(&headers(&[("Retry-After", "-1")])), None);
        assert_eq!(retry_after(&headers(&[("Retry-After", "NaN")])), None);
        assert_eq!(retry_after(&headers(&[("Retry-After", "inf")])), None);
        assert_eq!(retry_after(&headers(&[("Retry-After", "1e20")])), None);
        assert_eq!(retry_after(&headers(&[("Retry-After", "1e300")])), None);
        assert_eq!(retry_after(&HeaderMap::new()), None);
    }

    #[test]
    fn test_tracker_survives_poisoned_lock() {
        let tracker = std::sync::Arc::new(RateLimitTracker::new());
        let poisoner = std::sync::Arc::clone(&tracker);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.latest.write().unwrap();
            panic!("poison the tracker lock");
        })
        .join();

        let snapshot = tracker.record(&headers(&[("X-RateLimit-Remaining", "7")]), 200, "/a");
        assert_eq!(snapshot.unwrap().remaining, Some(7));
        assert!(tracker.latest().is_none());
    }

    #[test]
    fn test_tracker_keeps_latest() {
        let tracker = RateLimitTracker::new();
        assert!(tracker.latest().is_none());

        tracker.record(&headers(&[("X-RateLimit-Remaining", "5")]), 200, "/a");
        tracker.record(&HeaderMap::new(), 200, "/b");
        tracker.record(&headers(&[("X-RateLimit-Remaining", "4")]), 200, "/c");

        let latest = tracker.latest().unwrap();
        assert_eq!(latest.remaining, Some(4));
        assert_eq!(latest.path, "/c");
    }
}
