//! Cache-expiry bookkeeping for loaded tiles.
//!
//! Tiles carry the `Cache-Control` / `Expires` headers of the response they
//! were built from. The external tile cache uses [`ExpiryState::timeout`] to
//! schedule a refresh; servers that keep answering with already-expired data
//! are backed off exponentially.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Minimum delay before refetching a tile whose new expiry only moved
/// forward by a small amount (clock skew between client and server).
pub const CLOCK_SKEW_RETRY_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest timer the refresh scheduler accepts (2^31 - 1 ms).
const MAX_TIMEOUT_MS: i64 = i32::MAX as i64;

/// Caching headers of a fetched resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpiryData {
    /// Raw `Cache-Control` header
    pub cache_control: Option<String>,
    /// Raw `Expires` header
    pub expires: Option<String>,
}

impl ExpiryData {
    /// Creates expiry data from optional header values.
    pub fn new(cache_control: Option<&str>, expires: Option<&str>) -> Self {
        Self {
            cache_control: cache_control.map(str::to_string),
            expires: expires.map(str::to_string),
        }
    }

    /// Returns true if neither header was present.
    pub fn is_empty(&self) -> bool {
        self.cache_control.is_none() && self.expires.is_none()
    }
}

/// Extracts `max-age` (seconds) from a `Cache-Control` header.
pub fn max_age(cache_control: &str) -> Option<u64> {
    cache_control.split(',').find_map(|directive| {
        let (name, value) = directive.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("max-age") {
            value.trim().trim_matches('"').parse().ok()
        } else {
            None
        }
    })
}

/// Parses an HTTP date (`Sun, 06 Nov 1994 08:49:37 GMT`).
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

/// Per-tile expiry state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpiryState {
    expiration_time: Option<DateTime<Utc>>,
    expired_request_count: u32,
}

impl ExpiryState {
    /// When the tile data stops being fresh, if known.
    pub fn expiration_time(&self) -> Option<DateTime<Utc>> {
        self.expiration_time
    }

    /// Consecutive responses that arrived already expired.
    pub fn expired_request_count(&self) -> u32 {
        self.expired_request_count
    }

    /// Applies the caching headers of a new response.
    ///
    /// Returns true if the response was already expired on arrival.
    pub fn apply(&mut self, data: &ExpiryData, now: DateTime<Utc>) -> bool {
        let prior = self.expiration_time;

        if let Some(age) = data.cache_control.as_deref().and_then(max_age) {
            // An age past chrono's range means the data never expires
            self.expiration_time = i64::try_from(age)
                .ok()
                .and_then(chrono::Duration::try_seconds)
                .and_then(|age| now.checked_add_signed(age));
        } else if let Some(expires) = data.expires.as_deref().and_then(parse_http_date) {
            self.expiration_time = Some(expires);
        }

        let Some(expiration) = self.expiration_time else {
            return false;
        };

        let is_expired = if expiration > now {
            false
        } else {
            match prior {
                None => true,
                Some(prior) if expiration < prior => true,
                Some(prior) => {
                    let delta = expiration - prior;
                    if delta.is_zero() {
                        true
                    } else {
                        let skew = chrono::Duration::from_std(CLOCK_SKEW_RETRY_TIMEOUT)
                            .unwrap_or_else(|_| chrono::Duration::seconds(30));
                        self.expiration_time = now.checked_add_signed(delta.max(skew));
                        false
                    }
                }
            }
        };

        if is_expired {
            self.expired_request_count += 1;
        } else {
            self.expired_request_count = 0;
        }
        is_expired
    }

    /// Delay until the tile should be refreshed.
    ///
    /// After repeated expired responses the delay grows as
    /// `1s * 2^(count - 1)`.
    pub fn timeout(&self, now: DateTime<Utc>) -> Option<Duration> {
        let expiration = self.expiration_time?;
        if self.expired_request_count > 0 {
            let exponent = (self.expired_request_count - 1).min(31);
            return Some(Duration::from_millis(1000u64 << exponent));
        }
        let millis = (expiration - now).num_milliseconds().clamp(0, MAX_TIMEOUT_MS);
        Some(Duration::from_millis(millis as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_max_age_parsing() {
        assert_eq!(max_age("public, max-age=3600"), Some(3600));
        assert_eq!(max_age("max-age=\"60\", must-revalidate"), Some(60));
        assert_eq!(max_age("no-cache"), None);
    }

    #[test]
    fn test_http_date_parsing() {
        let date = parse_http_date("Wed, 01 May 2024 13:00:00 GMT").unwrap();
        assert_eq!(date, Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap());
        assert!(parse_http_date("yesterday").is_none());
    }

    #[test]
    fn test_cache_control_sets_expiration() {
        let mut state = ExpiryState::default();
        let expired = state.apply(&ExpiryData::new(Some("max-age=60"), None), now());
        assert!(!expired);
        assert_eq!(state.timeout(now()), Some(Duration::from_secs(60)));
        assert_eq!(state.expired_request_count(), 0);
    }

    #[test]
    fn test_out_of_range_max_age_never_expires() {
        let mut state = ExpiryState::default();
        for header in ["max-age=99999999999999", "max-age=18446744073709551615"] {
            let expired = state.apply(&ExpiryData::new(Some(header), None), now());
            assert!(!expired, "{}", header);
            assert_eq!(state.expiration_time(), None);
            assert_eq!(state.timeout(now()), None);
        }
    }

    #[test]
    fn test_cache_control_wins_over_expires() {
        let mut state = ExpiryState::default();
        state.apply(
            &ExpiryData::new(Some("max-age=10"), Some("Wed, 01 May 2024 18:00:00 GMT")),
            now(),
        );
        assert_eq!(state.timeout(now()), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_already_expired_response_backs_off() {
        let mut state = ExpiryState::default();
        let stale = ExpiryData::new(None, Some("Wed, 01 May 2024 11:00:00 GMT"));

        assert!(state.apply(&stale, now()));
        assert_eq!(state.expired_request_count(), 1);
        assert_eq!(state.timeout(now()), Some(Duration::from_secs(1)));

        // Same expiry again: still expired, backoff doubles
        assert!(state.apply(&stale, now()));
        assert_eq!(state.expired_request_count(), 2);
        assert_eq!(state.timeout(now()), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_clock_skew_pushes_expiration_forward() {
        let mut state = ExpiryState::default();
        state.apply(
            &ExpiryData::new(None, Some("Wed, 01 May 2024 11:00:00 GMT")),
            now(),
        );
        // Expiry advanced by 5s but is still in the past
        let expired = state.apply(
            &ExpiryData::new(None, Some("Wed, 01 May 2024 11:00:05 GMT")),
            now(),
        );
        assert!(!expired);
        assert_eq!(state.expired_request_count(), 0);
        assert_eq!(state.timeout(now()), Some(CLOCK_SKEW_RETRY_TIMEOUT));
    }

    #[test]
    fn test_no_headers_leaves_state_untouched() {
        let mut state = ExpiryState::default();
        assert!(!state.apply(&ExpiryData::default(), now()));
        assert!(state.timeout(now()).is_none());
    }
}
