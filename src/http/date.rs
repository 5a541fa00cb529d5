//! HTTP-date parsing
//!
//! Accepts IMF-fixdate, RFC 850 and asctime forms. A missing or unknown
//! zone is read as GMT, which is also how a stray `UTC` suffix is treated.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Formats tried after zone suffixes have been stripped.
const NAIVE_FORMATS: &[&str] = &[
    "%a, %d %b %Y %H:%M:%S",
    "%A, %d-%b-%y %H:%M:%S",
    "%A, %d-%b-%Y %H:%M:%S",
    "%a %b %e %H:%M:%S %Y",
    "%d %b %Y %H:%M:%S",
    "%d-%b-%Y %H:%M:%S",
];

const ZONE_SUFFIXES: &[&str] = &[" GMT", " UTC", " UT", " Z"];

/// Parse an HTTP-date into UTC
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.with_timezone(&Utc));
    }

    let mut naive = value;
    for suffix in ZONE_SUFFIXES {
        if let Some(stripped) = strip_suffix_ignore_case(naive, suffix) {
            naive = stripped.trim_end();
            break;
        }
    }

    parse_naive(naive).or_else(|| {
        // An inconsistent weekday should not invalidate an otherwise valid date.
        let (_, without_weekday) = naive.split_once(',')?;
        parse_naive(without_weekday.trim_start())
    })
}

fn parse_naive(value: &str) -> Option<DateTime<Utc>> {
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

fn strip_suffix_ignore_case<'a>(value: &'a str, suffix: &str) -> Option<&'a str> {
    let split = value.len().checked_sub(suffix.len())?;
    if !value.is_char_boundary(split) {
        return None;
    }
    let (head, tail) = value.split_at(split);
    tail.eq_ignore_ascii_case(suffix).then_some(head)
}
