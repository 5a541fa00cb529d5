//! HTTP cache freshness module
//!
//! Freshness lifetime, current age and revalidation verdicts for stored
//! responses, following RFC 7234 §4.2 with `stale-while-revalidate`
//! (RFC 5861) as a grace window.

use chrono::{DateTime, TimeDelta, Utc};

use super::date::parse_http_date;
use super::headers::ResponseHeaders;
use super::util;
use crate::config::FreshnessConfig;

/// Whether a stored response can be used as is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationType {
    /// Fresh: serve from cache
    None,
    /// Stale but inside the grace window: serve, then revalidate
    Asynchronous,
    /// Revalidate before use
    Synchronous,
}

/// How long a response is fresh, and how long past that it may still be
/// served while revalidating
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FreshnessLifetimes {
    pub freshness: TimeDelta,
    pub staleness: TimeDelta,
}

/// Tunables for freshness computation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    /// Share of `Date - Last-Modified` used as heuristic freshness
    pub heuristic_percent: u8,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self {
            heuristic_percent: 10,
        }
    }
}

impl From<&FreshnessConfig> for FreshnessPolicy {
    fn from(config: &FreshnessConfig) -> Self {
        Self {
            heuristic_percent: config.heuristic_percent.min(100),
        }
    }
}

fn saturating_add(a: TimeDelta, b: TimeDelta) -> TimeDelta {
    a.checked_add(&b).unwrap_or(TimeDelta::MAX)
}

impl ResponseHeaders {
    /// Seconds value of `Cache-Control: <directive>=N`
    ///
    /// The first well-formed occurrence wins. Values too large for a
    /// duration are clamped to the maximum.
    pub fn cache_control_directive(&self, directive: &str) -> Option<TimeDelta> {
        let n = directive.len();
        let mut iter = 0;
        while let Some(value) = self.enumerate_header(&mut iter, "cache-control") {
            let bytes = value.as_bytes();
            if bytes.len() <= n
                || !bytes[..n].eq_ignore_ascii_case(directive.as_bytes())
                || bytes[n] != b'='
            {
                continue;
            }
            let seconds = value[n + 1..].trim_matches(' ');
            if seconds.is_empty() || !seconds.bytes().all(|b| b.is_ascii_digit()) {
                continue;
            }
            let seconds = seconds.parse::<i64>().unwrap_or(i64::MAX);
            return Some(TimeDelta::try_seconds(seconds).unwrap_or(TimeDelta::MAX));
        }
        None
    }

    pub fn max_age_value(&self) -> Option<TimeDelta> {
        self.cache_control_directive("max-age")
    }

    pub fn stale_while_revalidate_value(&self) -> Option<TimeDelta> {
        self.cache_control_directive("stale-while-revalidate")
    }

    /// `Age` in seconds; overflowing values saturate.
    pub fn age_value(&self) -> Option<TimeDelta> {
        let value = self.first_value("age")?;
        if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let seconds = value
            .parse::<u64>()
            .map_or(u32::MAX, |v| u32::try_from(v).unwrap_or(u32::MAX));
        Some(TimeDelta::seconds(i64::from(seconds)))
    }

    /// First value of `name` as an HTTP-date.
    ///
    /// `Expires: 0` is the traditional "already expired" marker and maps
    /// to the earliest representable time.
    pub fn time_valued_header(&self, name: &str) -> Option<DateTime<Utc>> {
        let value = self.first_value(name)?;
        if name.eq_ignore_ascii_case("expires") && value == "0" {
            return Some(DateTime::<Utc>::MIN_UTC);
        }
        parse_http_date(value)
    }

    pub fn date_value(&self) -> Option<DateTime<Utc>> {
        self.time_valued_header("date")
    }

    pub fn last_modified_value(&self) -> Option<DateTime<Utc>> {
        self.time_valued_header("last-modified")
    }

    pub fn expires_value(&self) -> Option<DateTime<Utc>> {
        self.time_valued_header("expires")
    }

    pub fn has_validators(&self) -> bool {
        util::has_validators(
            self.version(),
            self.first_value("etag").unwrap_or_default(),
            self.first_value("last-modified").unwrap_or_default(),
        )
    }

    pub fn has_strong_validators(&self) -> bool {
        util::has_strong_validators(
            self.version(),
            self.first_value("etag").unwrap_or_default(),
            self.first_value("last-modified").unwrap_or_default(),
            self.first_value("date").unwrap_or_default(),
        )
    }

    /// Freshness and staleness lifetimes (RFC 7234 §4.2.1)
    pub fn freshness_lifetimes(
        &self,
        response_time: DateTime<Utc>,
        policy: FreshnessPolicy,
    ) -> FreshnessLifetimes {
        let mut lifetimes = FreshnessLifetimes::default();

        if self.has_header_value("cache-control", "no-cache")
            || self.has_header_value("cache-control", "no-store")
            || self.has_header_value("pragma", "no-cache")
        {
            return lifetimes;
        }

        let must_revalidate = self.has_header_value("cache-control", "must-revalidate");
        if !must_revalidate {
            if let Some(staleness) = self.stale_while_revalidate_value() {
                lifetimes.staleness = staleness;
            }
        }

        if let Some(max_age) = self.max_age_value() {
            lifetimes.freshness = max_age;
            return lifetimes;
        }

        let date = self.date_value().unwrap_or(response_time);

        if let Some(expires) = self.expires_value() {
            if expires > date {
                lifetimes.freshness = expires - date;
            }
            return lifetimes;
        }

        if matches!(self.response_code(), 200 | 203 | 206) && !must_revalidate {
            if let Some(last_modified) = self.last_modified_value() {
                if last_modified <= date {
                    let elapsed = (date - last_modified).num_milliseconds();
                    let share = i128::from(elapsed) * i128::from(policy.heuristic_percent) / 100;
                    lifetimes.freshness =
                        TimeDelta::milliseconds(i64::try_from(share).unwrap_or(i64::MAX));
                    return lifetimes;
                }
            }
        }

        if matches!(self.response_code(), 300 | 301 | 308 | 410)
            && !self.has_header_value("cache-control", "private")
        {
            lifetimes.freshness = TimeDelta::MAX;
            lifetimes.staleness = TimeDelta::zero();
        }
        lifetimes
    }

    /// Current age of the stored response (RFC 7234 §4.2.3)
    pub fn current_age(
        &self,
        request_time: DateTime<Utc>,
        response_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> TimeDelta {
        let date = self.date_value().unwrap_or(response_time);
        let age = self.age_value().unwrap_or_else(TimeDelta::zero);

        let apparent_age = (response_time - date).max(TimeDelta::zero());
        let response_delay = response_time - request_time;
        let corrected_age = saturating_add(age, response_delay);
        let initial_age = apparent_age.max(corrected_age);
        let resident_time = now - response_time;
        saturating_add(initial_age, resident_time)
    }

    /// Revalidation verdict at `now` for a response fetched by a request
    /// sent at `request_time` and answered at `response_time`.
    pub fn requires_validation(
        &self,
        request_time: DateTime<Utc>,
        response_time: DateTime<Utc>,
        now: DateTime<Utc>,
        policy: FreshnessPolicy,
    ) -> ValidationType {
        let lifetimes = self.freshness_lifetimes(response_time, policy);
        if lifetimes.freshness.is_zero() && lifetimes.staleness.is_zero() {
            return ValidationType::Synchronous;
        }

        let age = self.current_age(request_time, response_time, now);
        if lifetimes.freshness > age {
            return ValidationType::None;
        }
        if saturating_add(lifetimes.freshness, lifetimes.staleness) > age {
            return ValidationType::Asynchronous;
        }
        ValidationType::Synchronous
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn headers(wire: &str) -> ResponseHeaders {
        ResponseHeaders::from_wire(wire.as_bytes())
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2007, 11, 28, h, m, s).unwrap()
    }

    fn verdict(wire: &str, now: DateTime<Utc>) -> ValidationType {
        let t = at(0, 40, 9);
        headers(wire).requires_validation(t, t, now, FreshnessPolicy::default())
    }

    #[test]
    fn test_max_age_fresh_then_stale() {
        let wire = "HTTP/1.1 200 OK\nDate: Wed, 28 Nov 2007 00:40:09 GMT\nCache-Control: max-age=10000\n\n";
        assert_eq!(verdict(wire, at(0, 40, 9)), ValidationType::None);
        assert_eq!(verdict(wire, at(5, 0, 0)), ValidationType::Synchronous);
    }

    #[test]
    fn test_stale_while_revalidate_window() {
        let wire = "HTTP/1.1 200 OK\nDate: Wed, 28 Nov 2007 00:40:09 GMT\nCache-Control: max-age=60, stale-while-revalidate=3600\n\n";
        assert_eq!(verdict(wire, at(0, 40, 30)), ValidationType::None);
        assert_eq!(verdict(wire, at(0, 50, 0)), ValidationType::Asynchronous);
        assert_eq!(verdict(wire, at(2, 0, 0)), ValidationType::Synchronous);
    }

    #[test]
    fn test_must_revalidate_cancels_grace() {
        let wire = "HTTP/1.1 200 OK\nDate: Wed, 28 Nov 2007 00:40:09 GMT\nCache-Control: max-age=60, stale-while-revalidate=3600, must-revalidate\n\n";
        assert_eq!(verdict(wire, at(0, 50, 0)), ValidationType::Synchronous);
    }

    #[test]
    fn test_no_cache_forces_validation() {
        for wire in [
            "HTTP/1.1 200 OK\nCache-Control: no-cache, max-age=10000\n\n",
            "HTTP/1.1 200 OK\nCache-Control: no-store, max-age=10000\n\n",
            "HTTP/1.1 200 OK\nPragma: no-cache\nCache-Control: max-age=10000\n\n",
        ] {
            assert_eq!(verdict(wire, at(0, 40, 9)), ValidationType::Synchronous);
        }
    }

    #[test]
    fn test_expires() {
        let wire = "HTTP/1.1 200 OK\nDate: Wed, 28 Nov 2007 00:40:09 GMT\nExpires: Wed, 28 Nov 2007 01:00:00 GMT\n\n";
        let lifetimes = headers(wire).freshness_lifetimes(at(0, 40, 9), FreshnessPolicy::default());
        assert_eq!(lifetimes.freshness, TimeDelta::seconds(19 * 60 + 51));

        let wire = "HTTP/1.1 200 OK\nDate: Wed, 28 Nov 2007 00:40:09 GMT\nExpires: 0\n\n";
        let lifetimes = headers(wire).freshness_lifetimes(at(0, 40, 9), FreshnessPolicy::default());
        assert!(lifetimes.freshness.is_zero());
    }

    #[test]
    fn test_heuristic_freshness() {
        let wire = "HTTP/1.1 200 OK\nDate: Wed, 28 Nov 2007 10:00:00 GMT\nLast-Modified: Wed, 28 Nov 2007 00:00:00 GMT\n\n";
        let h = headers(wire);
        let lifetimes = h.freshness_lifetimes(at(10, 0, 0), FreshnessPolicy::default());
        assert_eq!(lifetimes.freshness, TimeDelta::hours(1));

        let lifetimes = h.freshness_lifetimes(
            at(10, 0, 0),
            FreshnessPolicy {
                heuristic_percent: 20,
            },
        );
        assert_eq!(lifetimes.freshness, TimeDelta::hours(2));

        let not_ok = "HTTP/1.1 404 Not Found\nDate: Wed, 28 Nov 2007 10:00:00 GMT\nLast-Modified: Wed, 28 Nov 2007 00:00:00 GMT\n\n";
        let lifetimes = headers(not_ok).freshness_lifetimes(at(10, 0, 0), FreshnessPolicy::default());
        assert!(lifetimes.freshness.is_zero());
    }

    #[test]
    fn test_permanent_codes_never_expire() {
        for code in [300, 301, 308, 410] {
            let wire = format!("HTTP/1.1 {code} X\n\n");
            let lifetimes = headers(&wire).freshness_lifetimes(at(0, 0, 0), FreshnessPolicy::default());
            assert_eq!(lifetimes.freshness, TimeDelta::MAX);
        }
        let private = headers("HTTP/1.1 301 Moved\nCache-Control: private\n\n")
            .freshness_lifetimes(at(0, 0, 0), FreshnessPolicy::default());
        assert!(private.freshness.is_zero());

        let verdict = headers("HTTP/1.1 301 Moved\n\n").requires_validation(
            at(0, 0, 0),
            at(0, 0, 0),
            at(23, 0, 0),
            FreshnessPolicy::default(),
        );
        assert_eq!(verdict, ValidationType::None);
    }

    #[test]
    fn test_no_lifetime_is_synchronous() {
        assert_eq!(verdict("HTTP/1.1 200 OK\n\n", at(0, 40, 9)), ValidationType::Synchronous);
    }

    #[test]
    fn test_current_age() {
        let h = headers("HTTP/1.1 200 OK\nDate: Wed, 28 Nov 2007 00:40:09 GMT\nAge: 100\n\n");
        let age = h.current_age(at(0, 40, 9), at(0, 40, 12), at(0, 41, 12));
        assert_eq!(age, TimeDelta::seconds(103 + 60));

        let h = headers("HTTP/1.1 200 OK\nDate: Wed, 28 Nov 2007 00:30:09 GMT\n\n");
        let age = h.current_age(at(0, 40, 9), at(0, 40, 9), at(0, 40, 9));
        assert_eq!(age, TimeDelta::minutes(10));
    }

    #[test]
    fn test_cache_control_directive_parsing() {
        let h = headers("HTTP/1.1 200 OK\nCache-Control: max-age=abc, MAX-AGE = 5, max-age=  7 , max-age=9\n\n");
        assert_eq!(h.max_age_value(), Some(TimeDelta::seconds(7)));

        let h = headers("HTTP/1.1 200 OK\nCache-Control: max-age=99999999999999999999999\n\n");
        assert_eq!(h.max_age_value(), Some(TimeDelta::MAX));

        let h = headers("HTTP/1.1 200 OK\nCache-Control: max-age\n\n");
        assert_eq!(h.max_age_value(), None);
    }

    #[test]
    fn test_age_value() {
        assert_eq!(
            headers("HTTP/1.1 200 OK\nAge: 10\n\n").age_value(),
            Some(TimeDelta::seconds(10))
        );
        assert_eq!(
            headers("HTTP/1.1 200 OK\nAge: 99999999999\n\n").age_value(),
            Some(TimeDelta::seconds(i64::from(u32::MAX)))
        );
        assert_eq!(headers("HTTP/1.1 200 OK\nAge: -1\n\n").age_value(), None);
        assert_eq!(headers("HTTP/1.1 200 OK\nAge: 1.5\n\n").age_value(), None);
    }

    #[test]
    fn test_strong_validators_from_headers() {
        let h = headers("HTTP/1.1 200 OK\nETag: \"abc\"\n\n");
        assert!(h.has_strong_validators());
        let h = headers("HTTP/1.1 200 OK\nETag: W/\"abc\"\n\n");
        assert!(h.has_validators());
        assert!(!h.has_strong_validators());
    }
}
