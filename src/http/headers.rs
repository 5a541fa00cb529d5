//! Response header store
//!
//! [`ResponseHeaders`] owns one normalized header block and an index of
//! parsed `(name, value)` spans into it. The block is the single source of
//! truth: every edit rebuilds it and re-derives the index, so persisting a
//! response is a matter of filtering lines out of the block.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::ops::Range;

use super::range::HttpByteRange;
use super::util::{
    self, assemble_raw_headers, is_non_coalescing_header, is_valid_header_name,
    is_valid_header_value, parse_content_range_for_206, ContentType, HeaderLines, ValueSpans,
};
use super::version::HttpVersion;
use crate::logger::{log_debug, log_warning};

/// Headers a 304 must never overwrite in the stored response.
const NON_UPDATED_HEADERS: &[&str] = &[
    "connection",
    "proxy-connection",
    "keep-alive",
    "www-authenticate",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "content-location",
    "content-md5",
    "etag",
    "content-encoding",
    "content-range",
    "content-type",
    "content-length",
    "content-security-policy",
    "x-frame-options",
    "x-xss-protection",
];

const NON_UPDATED_HEADER_PREFIXES: &[&str] = &["x-content-", "x-webkit-"];

const COOKIE_HEADERS: &[&str] = &["set-cookie", "set-cookie2", "clear-site-data"];
const CHALLENGE_HEADERS: &[&str] = &["www-authenticate", "proxy-authenticate"];
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "proxy-connection",
    "keep-alive",
    "trailer",
    "transfer-encoding",
    "upgrade",
];
const RANGE_HEADERS: &[&str] = &["content-range"];
const SECURITY_STATE_HEADERS: &[&str] = &["strict-transport-security"];

/// Which header classes to strip when serializing for storage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct PersistOptions {
    /// Names listed in `Cache-Control: no-cache="..."`
    pub sans_non_cacheable: bool,
    pub sans_cookies: bool,
    pub sans_challenges: bool,
    pub sans_hop_by_hop: bool,
    pub sans_ranges: bool,
    pub sans_security_state: bool,
}

impl PersistOptions {
    /// Keep everything.
    pub const RAW: Self = Self {
        sans_non_cacheable: false,
        sans_cookies: false,
        sans_challenges: false,
        sans_hop_by_hop: false,
        sans_ranges: false,
        sans_security_state: false,
    };

    /// What a disk cache stores.
    pub const FOR_CACHE: Self = Self {
        sans_non_cacheable: true,
        sans_cookies: true,
        sans_challenges: true,
        sans_hop_by_hop: true,
        sans_ranges: true,
        sans_security_state: true,
    };
}

/// One indexed header value; an empty name marks a continuation of the
/// previous entry (a further comma-separated value from the same line).
#[derive(Debug, Clone, PartialEq, Eq)]
struct ParsedHeader {
    name: Range<usize>,
    value: Range<usize>,
}

impl ParsedHeader {
    fn is_continuation(&self) -> bool {
        self.name.is_empty()
    }
}

/// Parsed HTTP response headers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHeaders {
    raw_headers: String,
    parsed: Vec<ParsedHeader>,
    response_code: i32,
    http_version: HttpVersion,
}

impl ResponseHeaders {
    /// Build from an already assembled block (`\0`-terminated lines).
    pub fn new(raw_input: &str) -> Self {
        let mut headers = Self {
            raw_headers: String::new(),
            parsed: Vec::new(),
            response_code: -1,
            http_version: HttpVersion::default(),
        };
        headers.parse(raw_input);
        headers
    }

    /// Build from a wire-format header block.
    pub fn from_wire(input: &[u8]) -> Self {
        Self::new(&assemble_raw_headers(input))
    }

    /// Build from a CRLF- or LF-delimited block; `None` if it contains NUL.
    pub fn try_create(input: &str) -> Option<Self> {
        if input.contains('\0') {
            return None;
        }
        let normalized = input.replace('\n', "\0").replace('\r', "");
        let mut block = normalized;
        while !block.ends_with("\0\0") {
            block.push('\0');
        }
        Some(Self::new(&block))
    }

    /// Restore headers written by [`ResponseHeaders::persist`].
    pub fn from_persisted(persisted: &str) -> Self {
        Self::new(persisted)
    }

    /// The normalized block, including the status line.
    pub fn raw_headers(&self) -> &str {
        &self.raw_headers
    }

    pub const fn response_code(&self) -> i32 {
        self.response_code
    }

    pub const fn version(&self) -> HttpVersion {
        self.http_version
    }

    /// Normalized status line, e.g. `HTTP/1.1 206 Partial Content`
    pub fn status_line(&self) -> &str {
        let end = self.raw_headers.find('\0').unwrap_or(self.raw_headers.len());
        &self.raw_headers[..end]
    }

    /// Reason phrase following the status code, possibly empty.
    pub fn status_text(&self) -> &str {
        self.status_line()
            .splitn(3, ' ')
            .nth(2)
            .unwrap_or_default()
    }

    fn parse(&mut self, raw_input: &str) {
        self.raw_headers.clear();
        self.parsed.clear();

        let line_end = raw_input.find('\0');
        let has_headers =
            line_end.is_some_and(|e| e + 1 < raw_input.len() && raw_input.as_bytes()[e + 1] != 0);
        let status_line = &raw_input[..line_end.unwrap_or(raw_input.len())];
        self.parse_status_line(status_line, has_headers);
        self.raw_headers.push('\0');

        let Some(line_end) = line_end else {
            self.raw_headers.push('\0');
            return;
        };

        let headers_begin = self.raw_headers.len();
        self.raw_headers.push_str(&raw_input[line_end + 1..]);
        while !self.raw_headers.ends_with("\0\0") {
            self.raw_headers.push('\0');
        }

        let lines: Vec<(Range<usize>, Range<usize>)> =
            HeaderLines::new(&self.raw_headers[headers_begin..], b"\0")
                .map(|line| {
                    (
                        headers_begin + line.name.start..headers_begin + line.name.end,
                        headers_begin + line.value.start..headers_begin + line.value.end,
                    )
                })
                .collect();
        for (name, value) in lines {
            self.add_parsed_header(name, value);
        }
    }

    fn add_parsed_header(&mut self, name: Range<usize>, value: Range<usize>) {
        let name_str = &self.raw_headers[name.clone()];
        let value_str = &self.raw_headers[value.clone()];
        if value.is_empty() || is_non_coalescing_header(name_str) || !value_str.contains(',') {
            self.parsed.push(ParsedHeader { name, value });
            return;
        }

        let spans: Vec<Range<usize>> = ValueSpans::new(value_str, b',', false)
            .map(|span| value.start + span.start..value.start + span.end)
            .collect();
        for (i, span) in spans.into_iter().enumerate() {
            let entry_name = if i == 0 {
                name.clone()
            } else {
                span.end..span.end
            };
            self.parsed.push(ParsedHeader {
                name: entry_name,
                value: span,
            });
        }
    }

    fn parse_status_line(&mut self, line: &str, has_headers: bool) {
        let parsed_version = parse_version(line);
        self.http_version = if parsed_version == HttpVersion::HTTP_0_9 && !has_headers {
            HttpVersion::HTTP_0_9
        } else if parsed_version == HttpVersion::HTTP_2_0 {
            HttpVersion::HTTP_2_0
        } else if parsed_version >= HttpVersion::HTTP_1_1 {
            HttpVersion::HTTP_1_1
        } else {
            HttpVersion::HTTP_1_0
        };
        if parsed_version != self.http_version {
            log_debug(&format!(
                "normalized status line version {parsed_version} to {}",
                self.http_version
            ));
        }

        self.raw_headers = self.http_version.to_string();

        match line.find(' ') {
            None => {
                log_debug("missing response status; assuming 200 OK");
                self.raw_headers.push_str(" 200 OK");
                self.response_code = 200;
            }
            Some(p) => {
                self.response_code = parse_status(&line[p + 1..], &mut self.raw_headers);
            }
        }
    }

    fn find_header(&self, from: usize, name: &str) -> Option<usize> {
        (from..self.parsed.len()).find(|&i| {
            let entry = &self.parsed[i];
            !entry.is_continuation() && self.raw_headers[entry.name.clone()].eq_ignore_ascii_case(name)
        })
    }

    /// Index one past the last continuation of the entry at `i`.
    fn line_end(&self, i: usize) -> usize {
        let mut k = i + 1;
        while k < self.parsed.len() && self.parsed[k].is_continuation() {
            k += 1;
        }
        k
    }

    /// Next header line (name, full value) at or after `*iter`.
    ///
    /// Continuation entries are folded back into the line they came from.
    pub fn enumerate_header_lines(&self, iter: &mut usize) -> Option<(&str, &str)> {
        let i = *iter;
        let entry = self.parsed.get(i)?;
        let k = self.line_end(i);
        let value_end = self.parsed[k - 1].value.end;
        let value = &self.raw_headers[entry.value.start..value_end];
        *iter = k;
        Some((&self.raw_headers[entry.name.clone()], value))
    }

    /// All header lines in order.
    pub fn header_lines(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        let mut iter = 0;
        std::iter::from_fn(move || self.enumerate_header_lines(&mut iter))
    }

    /// Next value of `name` after the cursor; a fresh cursor is `0`.
    pub fn enumerate_header(&self, iter: &mut usize, name: &str) -> Option<&str> {
        let i = if *iter == 0 {
            self.find_header(0, name)?
        } else {
            let i = *iter;
            if i >= self.parsed.len() {
                return None;
            }
            if self.parsed[i].is_continuation() {
                i
            } else {
                self.find_header(i, name)?
            }
        };
        *iter = i + 1;
        Some(&self.raw_headers[self.parsed[i].value.clone()])
    }

    /// Every value of `name`, comma-split.
    pub fn values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        let mut iter = 0;
        std::iter::from_fn(move || self.enumerate_header(&mut iter, name))
    }

    /// First value of `name`.
    pub fn first_value(&self, name: &str) -> Option<&str> {
        let mut iter = 0;
        self.enumerate_header(&mut iter, name)
    }

    /// All lines for `name`, joined with `, `.
    pub fn get_normalized_header(&self, name: &str) -> Option<String> {
        let mut out: Option<String> = None;
        let mut from = 0;
        while let Some(i) = self.find_header(from, name) {
            let k = self.line_end(i);
            let value = &self.raw_headers[self.parsed[i].value.start..self.parsed[k - 1].value.end];
            match out.as_mut() {
                Some(joined) => {
                    joined.push_str(", ");
                    joined.push_str(value);
                }
                None => out = Some(value.to_string()),
            }
            from = k;
        }
        out
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.find_header(0, name).is_some()
    }

    /// Whether any value of `name` equals `value` (case-insensitive).
    pub fn has_header_value(&self, name: &str, value: &str) -> bool {
        self.values(name).any(|v| v.eq_ignore_ascii_case(value))
    }

    fn push_line(raw: &mut String, name: &str, value: &str) {
        let _ = write!(raw, "{name}: {value}\0");
    }

    /// Rebuild from `new_raw` (status line plus any new lines, `\0`-
    /// terminated) followed by every existing line not named in `to_remove`.
    fn merge_with_headers(&mut self, mut new_raw: String, to_remove: &HashSet<String>) {
        for (name, value) in self.header_lines() {
            if !to_remove.contains(&name.to_ascii_lowercase()) {
                Self::push_line(&mut new_raw, name, value);
            }
        }
        new_raw.push('\0');
        self.parse(&new_raw);
    }

    fn status_line_block(&self) -> String {
        let mut raw = self.status_line().to_string();
        raw.push('\0');
        raw
    }

    /// Drop every line of `name`.
    pub fn remove_header(&mut self, name: &str) {
        self.remove_headers(&[name]);
    }

    pub fn remove_headers(&mut self, names: &[&str]) {
        let to_remove: HashSet<String> = names.iter().map(|n| n.to_ascii_lowercase()).collect();
        let status = self.status_line_block();
        self.merge_with_headers(status, &to_remove);
    }

    /// Drop lines whose name and full value both match.
    pub fn remove_header_line(&mut self, name: &str, value: &str) {
        let mut new_raw = self.status_line_block();
        for (n, v) in self.header_lines() {
            if !(n.eq_ignore_ascii_case(name) && v.eq_ignore_ascii_case(value)) {
                Self::push_line(&mut new_raw, n, v);
            }
        }
        new_raw.push('\0');
        self.parse(&new_raw);
    }

    /// Append `name: value`; invalid input is dropped.
    pub fn add_header(&mut self, name: &str, value: &str) {
        if !is_valid_header_name(name) || !is_valid_header_value(value) {
            log_warning(&format!("refusing to add malformed header {name:?}"));
            return;
        }
        let mut new_raw = self.raw_headers.clone();
        new_raw.pop();
        Self::push_line(&mut new_raw, name, value);
        new_raw.push('\0');
        self.parse(&new_raw);
    }

    /// Replace every line of `name` with a single `name: value`.
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.remove_header(name);
        self.add_header(name, value);
    }

    /// Swap the status line; version and code are re-derived from it.
    pub fn replace_status_line(&mut self, new_status: &str) {
        let mut new_raw = new_status.to_string();
        new_raw.push('\0');
        self.merge_with_headers(new_raw, &HashSet::new());
    }

    /// Rewrite the range headers to describe `byte_range` of a resource of
    /// `resource_size` bytes, optionally turning the response into a 206.
    pub fn update_with_new_range(
        &mut self,
        byte_range: &HttpByteRange,
        resource_size: i64,
        replace_status_line: bool,
    ) {
        let (Some(start), Some(end)) = (
            byte_range.first_byte_position(),
            byte_range.last_byte_position(),
        ) else {
            log_warning("cannot describe a range without resolved bounds");
            return;
        };

        self.remove_headers(&["content-length", "content-range"]);
        if replace_status_line {
            self.replace_status_line("HTTP/1.1 206 Partial Content");
        }
        self.add_header(
            "Content-Range",
            &format!("bytes {start}-{end}/{resource_size}"),
        );
        self.add_header("Content-Length", &(end - start + 1).to_string());
    }

    /// Merge the headers of a 304 into this stored response.
    ///
    /// Every header the 304 carries replaces the stored one unless it is
    /// on the protected list. A replaced header keeps the position of its
    /// first stored occurrence; names new to the store go last.
    pub fn update(&mut self, new_headers: &Self) {
        let mut incoming: Vec<(String, &str, &str)> = Vec::new();
        for (name, value) in new_headers.header_lines() {
            let lower = name.to_ascii_lowercase();
            if should_update_header(&lower) {
                incoming.push((lower, name, value));
            }
        }
        if incoming.is_empty() {
            return;
        }
        let updated: HashSet<&str> = incoming.iter().map(|(l, _, _)| l.as_str()).collect();

        let mut new_raw = self.status_line_block();
        let mut emitted: HashSet<String> = HashSet::new();
        for (name, value) in self.header_lines() {
            let lower = name.to_ascii_lowercase();
            if !updated.contains(lower.as_str()) {
                Self::push_line(&mut new_raw, name, value);
                continue;
            }
            if emitted.insert(lower.clone()) {
                for (_, n, v) in incoming.iter().filter(|(l, _, _)| *l == lower) {
                    Self::push_line(&mut new_raw, n, v);
                }
            }
        }
        for (_, n, v) in incoming.iter().filter(|(l, _, _)| !emitted.contains(l)) {
            Self::push_line(&mut new_raw, n, v);
        }
        new_raw.push('\0');
        self.parse(&new_raw);
    }

    /// Serialize for storage, stripping the header classes `options` names.
    pub fn persist(&self, options: PersistOptions) -> String {
        if options == PersistOptions::RAW {
            return self.raw_headers.clone();
        }

        let mut filter: HashSet<String> = HashSet::new();
        if options.sans_non_cacheable {
            self.add_non_cacheable_headers(&mut filter);
        }
        for (enabled, names) in [
            (options.sans_cookies, COOKIE_HEADERS),
            (options.sans_challenges, CHALLENGE_HEADERS),
            (options.sans_hop_by_hop, HOP_BY_HOP_HEADERS),
            (options.sans_ranges, RANGE_HEADERS),
            (options.sans_security_state, SECURITY_STATE_HEADERS),
        ] {
            if enabled {
                filter.extend(names.iter().map(|n| (*n).to_string()));
            }
        }

        let mut out = self.status_line_block();
        for (name, value) in self.header_lines() {
            if !filter.contains(&name.to_ascii_lowercase()) {
                Self::push_line(&mut out, name, value);
            }
        }
        out.push('\0');
        out
    }

    fn add_non_cacheable_headers(&self, filter: &mut HashSet<String>) {
        const PREFIX: &str = "no-cache=\"";
        for value in self.values("cache-control") {
            let Some(prefix) = value.get(..PREFIX.len()) else {
                continue;
            };
            if !prefix.eq_ignore_ascii_case(PREFIX) || value.len() <= PREFIX.len() {
                continue;
            }
            let Some(names) = value[PREFIX.len()..].strip_suffix('"') else {
                continue;
            };
            filter.extend(
                util::values(names, b',', true).map(str::to_ascii_lowercase),
            );
        }
    }

    /// Lowercased media type and charset from every `Content-Type` value.
    pub fn content_type(&self) -> ContentType {
        let mut content_type = ContentType::default();
        for value in self.values("content-type") {
            content_type.merge(value);
        }
        content_type
    }

    /// `(mime_type, charset)`, each empty when absent.
    pub fn mime_type_and_charset(&self) -> (String, String) {
        let content_type = self.content_type();
        (content_type.mime_type, content_type.charset)
    }

    pub fn mime_type(&self) -> Option<String> {
        let content_type = self.content_type();
        (!content_type.mime_type.is_empty()).then_some(content_type.mime_type)
    }

    pub fn charset(&self) -> Option<String> {
        let content_type = self.content_type();
        (!content_type.charset.is_empty()).then_some(content_type.charset)
    }

    pub const fn is_redirect_code(code: i32) -> bool {
        matches!(code, 301 | 302 | 303 | 307 | 308)
    }

    /// Redirect target when this is a redirect with a usable `Location`.
    ///
    /// Non-ASCII bytes in the target are percent-escaped.
    pub fn is_redirect(&self) -> Option<String> {
        if !Self::is_redirect_code(self.response_code) {
            return None;
        }
        let location = self.values("location").find(|v| !v.is_empty())?;
        let mut escaped = String::with_capacity(location.len());
        for b in location.bytes() {
            if b.is_ascii() {
                escaped.push(char::from(b));
            } else {
                let _ = write!(escaped, "%{b:02X}");
            }
        }
        Some(escaped)
    }

    /// Whether the connection may be reused after this response.
    pub fn is_keep_alive(&self) -> bool {
        if self.http_version < HttpVersion::HTTP_1_0 {
            return false;
        }
        for name in ["connection", "proxy-connection"] {
            for value in self.values(name) {
                if value.eq_ignore_ascii_case("keep-alive") {
                    return true;
                }
                if value.eq_ignore_ascii_case("close") {
                    return false;
                }
            }
        }
        self.http_version != HttpVersion::HTTP_1_0
    }

    pub fn is_chunk_encoded(&self) -> bool {
        self.http_version >= HttpVersion::HTTP_1_1
            && self.has_header_value("transfer-encoding", "chunked")
    }

    /// First value of `name` as a non-negative integer.
    pub fn int64_header_value(&self, name: &str) -> Option<i64> {
        let value = self.first_value(name)?;
        if value.is_empty() || value.starts_with('+') {
            return None;
        }
        value.parse::<i64>().ok().filter(|v| *v >= 0)
    }

    pub fn content_length(&self) -> Option<i64> {
        self.int64_header_value("content-length")
    }

    /// `(first, last, total)` from a 206's `Content-Range`.
    ///
    /// When `Content-Length` is present it must agree with the range length,
    /// zero included.
    pub fn content_range_for_206(&self) -> Option<(i64, i64, i64)> {
        let value = self.get_normalized_header("content-range")?;
        let (first, last, total) = parse_content_range_for_206(&value).ok()?;
        if let Some(length) = self.content_length() {
            if length != last - first + 1 {
                log_debug(&format!(
                    "Content-Length {length} disagrees with Content-Range {value}"
                ));
                return None;
            }
        }
        Some((first, last, total))
    }
}

fn should_update_header(lower_name: &str) -> bool {
    !NON_UPDATED_HEADERS.contains(&lower_name)
        && !NON_UPDATED_HEADER_PREFIXES
            .iter()
            .any(|p| lower_name.starts_with(p))
}

/// Version from a status line; `0.0` when malformed.
fn parse_version(line: &str) -> HttpVersion {
    let b = line.as_bytes();
    if b.len() < 4 || !b[..4].eq_ignore_ascii_case(b"http") {
        return HttpVersion::default();
    }
    if b.get(4) != Some(&b'/') {
        return HttpVersion::default();
    }
    let Some(dot) = b[4..].iter().position(|&c| c == b'.').map(|p| p + 4) else {
        return HttpVersion::default();
    };
    match (b.get(5), b.get(dot + 1)) {
        (Some(major), Some(minor)) if major.is_ascii_digit() && minor.is_ascii_digit() => {
            HttpVersion::new(u16::from(major - b'0'), u16::from(minor - b'0'))
        }
        _ => HttpVersion::default(),
    }
}

/// Append the normalized status code and reason to `out`, returning the
/// code. Missing digits mean 200; large codes saturate.
fn parse_status(status: &str, out: &mut String) -> i32 {
    let status = status.trim_start_matches(' ');
    let digits_end = status
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(status.len());
    if digits_end == 0 {
        out.push_str(" 200");
        return 200;
    }

    out.push(' ');
    out.push_str(&status[..digits_end]);
    let code = status[..digits_end].bytes().fold(0_i64, |acc, d| {
        (acc * 10 + i64::from(d - b'0')).min(i64::from(i32::MAX))
    });

    let text = status[digits_end..].trim_start_matches(' ').trim_end_matches(' ');
    if !text.is_empty() {
        out.push(' ');
        out.push_str(text);
    }
    i32::try_from(code).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(wire: &str) -> ResponseHeaders {
        ResponseHeaders::from_wire(wire.as_bytes())
    }

    fn lines(h: &ResponseHeaders) -> Vec<(String, String)> {
        h.header_lines()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect()
    }

    fn readable(raw: &str) -> String {
        raw.replace('\0', "\n")
    }

    #[test]
    fn test_status_line_normalization() {
        let cases = [
            ("HTTP/1.1 200 OK\n\n", "HTTP/1.1 200 OK", 200, HttpVersion::HTTP_1_1),
            ("HTTP/1.0 404 Not Found  \n\n", "HTTP/1.0 404 Not Found", 404, HttpVersion::HTTP_1_0),
            ("HTTP/1.5 200 OK\n\n", "HTTP/1.1 200 OK", 200, HttpVersion::HTTP_1_1),
            ("HTTP/2.0 200\n\n", "HTTP/2.0 200", 200, HttpVersion::HTTP_2_0),
            ("HTTP/0.9 200 OK\n\n", "HTTP/0.9 200 OK", 200, HttpVersion::HTTP_0_9),
            ("HTTP/0.9 200 OK\nFoo: 1\n\n", "HTTP/1.0 200 OK", 200, HttpVersion::HTTP_1_0),
            ("HTTP/1.1\n\n", "HTTP/1.1 200 OK", 200, HttpVersion::HTTP_1_1),
            ("HTTP/1.1 OK\n\n", "HTTP/1.1 200", 200, HttpVersion::HTTP_1_1),
            ("HTTP 404 Oops\n\n", "HTTP/1.0 404 Oops", 404, HttpVersion::HTTP_1_0),
            ("HTTP/1.1   206   Partial\n\n", "HTTP/1.1 206 Partial", 206, HttpVersion::HTTP_1_1),
        ];
        for (input, status, code, version) in cases {
            let h = headers(input);
            assert_eq!(h.status_line(), status, "input {input:?}");
            assert_eq!(h.response_code(), code, "input {input:?}");
            assert_eq!(h.version(), version, "input {input:?}");
        }
    }

    #[test]
    fn test_status_code_saturates() {
        let h = headers("HTTP/1.1 99999999999999 Big\n\n");
        assert_eq!(h.response_code(), i32::MAX);
    }

    #[test]
    fn test_status_text() {
        assert_eq!(headers("HTTP/1.1 206 Partial Content\n\n").status_text(), "Partial Content");
        assert_eq!(headers("HTTP/1.1 200\n\n").status_text(), "");
    }

    #[test]
    fn test_raw_block_shape() {
        let h = headers("HTTP/1.1 200 OK\r\nFoo: 1\r\n\r\n");
        assert_eq!(h.raw_headers(), "HTTP/1.1 200 OK\0Foo: 1\0\0");
    }

    #[test]
    fn test_comma_values_split_into_continuations() {
        let h = headers("HTTP/1.1 200 OK\nCache-Control: private, max-age=60\nFoo: a\n\n");
        let values: Vec<_> = h.values("cache-control").collect();
        assert_eq!(values, vec!["private", "max-age=60"]);
        assert_eq!(
            lines(&h),
            vec![
                ("Cache-Control".into(), "private, max-age=60".into()),
                ("Foo".into(), "a".into()),
            ]
        );
    }

    #[test]
    fn test_non_coalescing_headers_stay_whole() {
        let h = headers("HTTP/1.1 200 OK\nDate: Wed, 28 Nov 2007 00:40:09 GMT\nSet-Cookie: a=1, b=2\n\n");
        assert_eq!(h.first_value("date"), Some("Wed, 28 Nov 2007 00:40:09 GMT"));
        let cookies: Vec<_> = h.values("set-cookie").collect();
        assert_eq!(cookies, vec!["a=1, b=2"]);
    }

    #[test]
    fn test_enumerate_header_across_lines() {
        let h = headers("HTTP/1.1 200 OK\nVary: a, b\nOther: x\nvary: c\n\n");
        let mut iter = 0;
        let mut seen = Vec::new();
        while let Some(v) = h.enumerate_header(&mut iter, "Vary") {
            seen.push(v);
        }
        assert_eq!(seen, vec!["a", "b", "c"]);
        assert_eq!(h.get_normalized_header("vary").as_deref(), Some("a, b, c"));
        assert_eq!(h.get_normalized_header("missing"), None);
    }

    #[test]
    fn test_empty_value_is_kept() {
        let h = headers("HTTP/1.1 200 OK\nFoo:\nBar: ,\n\n");
        assert_eq!(h.first_value("foo"), Some(""));
        assert!(h.has_header("foo"));
        let bars: Vec<_> = h.values("bar").collect();
        assert_eq!(bars, vec!["", ""]);
    }

    #[test]
    fn test_has_header_value() {
        let h = headers("HTTP/1.1 200 OK\nCache-Control: NO-Store, private\n\n");
        assert!(h.has_header_value("cache-control", "no-store"));
        assert!(!h.has_header_value("cache-control", "no-cache"));
    }

    #[test]
    fn test_try_create() {
        let h = ResponseHeaders::try_create("HTTP/1.1 200 OK\r\nFoo: 1\r\n").unwrap();
        assert_eq!(h.first_value("foo"), Some("1"));
        assert!(ResponseHeaders::try_create("HTTP/1.1 200 OK\r\nFoo: \01\r\n").is_none());
    }

    #[test]
    fn test_add_and_remove() {
        let mut h = headers("HTTP/1.1 200 OK\nFoo: 1\nBar: 2\nfoo: 3\n\n");
        h.remove_header("FOO");
        assert_eq!(lines(&h), vec![("Bar".into(), "2".into())]);

        h.add_header("Baz", "x, y");
        assert_eq!(h.values("baz").collect::<Vec<_>>(), vec!["x", "y"]);

        h.add_header("Bad Name", "v");
        h.add_header("Bad", "a\r\nInjected: 1");
        assert!(!h.has_header("injected"));
        assert_eq!(h.header_lines().count(), 2);
    }

    #[test]
    fn test_remove_header_line() {
        let mut h = headers("HTTP/1.1 200 OK\nFoo: 1\nFoo: 2\n\n");
        h.remove_header_line("foo", "2");
        assert_eq!(lines(&h), vec![("Foo".into(), "1".into())]);
    }

    #[test]
    fn test_set_header() {
        let mut h = headers("HTTP/1.1 200 OK\nContent-Length: 10\nFoo: 1\ncontent-length: 20\n\n");
        h.set_header("Content-Length", "30");
        assert_eq!(h.content_length(), Some(30));
        assert_eq!(h.header_lines().count(), 2);
    }

    #[test]
    fn test_replace_status_line() {
        let mut h = headers("HTTP/1.1 206 Partial Content\nFoo: 1\n\n");
        h.replace_status_line("HTTP/1.1 200 OK");
        assert_eq!(h.response_code(), 200);
        assert_eq!(h.first_value("foo"), Some("1"));
    }

    #[test]
    fn test_update_with_new_range() {
        let mut h = headers(
            "HTTP/1.1 200 OK\nContent-Length: 1000\nContent-Range: bytes 0-999/1000\nETag: \"x\"\n\n",
        );
        let mut range = HttpByteRange::bounded(100, 599);
        assert!(range.compute_bounds(1000));
        h.update_with_new_range(&range, 1000, true);
        assert_eq!(
            readable(h.raw_headers()),
            "HTTP/1.1 206 Partial Content\nETag: \"x\"\nContent-Range: bytes 100-599/1000\nContent-Length: 500\n\n"
        );
    }

    #[test]
    fn test_update_merges_304() {
        let mut stored = headers(
            "HTTP/1.1 200 OK\nDate: Wed, 28 Nov 2007 00:40:09 GMT\nETag: \"a\"\nCache-Control: max-age=1\nContent-Length: 10\nX-Content-Options: a\n\n",
        );
        let not_modified = headers(
            "HTTP/1.1 304 Not Modified\nETag: \"b\"\nCache-Control: max-age=100\nDate: Wed, 28 Nov 2007 01:40:09 GMT\nX-New: 1\nContent-Length: 0\nX-Content-Options: b\n\n",
        );
        stored.update(&not_modified);
        assert_eq!(
            readable(stored.raw_headers()),
            "HTTP/1.1 200 OK\nDate: Wed, 28 Nov 2007 01:40:09 GMT\nETag: \"a\"\nCache-Control: max-age=100\nContent-Length: 10\nX-Content-Options: a\nX-New: 1\n\n"
        );
    }

    #[test]
    fn test_update_replaces_all_occurrences_at_first_position() {
        let mut stored = headers("HTTP/1.1 200 OK\nFoo: 1\nBar: x\nFoo: 2\n\n");
        let fresh = headers("HTTP/1.1 304 Not Modified\nFoo: 3\nFoo: 4\n\n");
        stored.update(&fresh);
        assert_eq!(
            lines(&stored),
            vec![
                ("Foo".into(), "3".into()),
                ("Foo".into(), "4".into()),
                ("Bar".into(), "x".into()),
            ]
        );
    }

    #[test]
    fn test_persist_for_cache() {
        let h = headers(
            "HTTP/1.1 200 OK\nCache-Control: no-cache=\"X-Secret, foo\"\nX-Secret: s\nSet-Cookie: a=b\nConnection: close\nContent-Range: bytes 0-1/2\nStrict-Transport-Security: max-age=1\nWWW-Authenticate: Basic\nKeep: me\n\n",
        );
        let persisted = h.persist(PersistOptions::FOR_CACHE);
        assert_eq!(
            readable(&persisted),
            "HTTP/1.1 200 OK\nCache-Control: no-cache=\"X-Secret, foo\"\nKeep: me\n\n"
        );

        let restored = ResponseHeaders::from_persisted(&persisted);
        assert_eq!(restored.first_value("keep"), Some("me"));
        assert_eq!(h.persist(PersistOptions::RAW), h.raw_headers());
    }

    #[test]
    fn test_persist_single_class() {
        let h = headers("HTTP/1.1 200 OK\nSet-Cookie: a=b\nConnection: close\n\n");
        let options = PersistOptions {
            sans_cookies: true,
            ..PersistOptions::default()
        };
        assert_eq!(
            readable(&h.persist(options)),
            "HTTP/1.1 200 OK\nConnection: close\n\n"
        );
    }

    #[test]
    fn test_mime_type_and_charset() {
        let h = headers("HTTP/1.1 200 OK\nContent-Type: text/HTML; charset=UTF-8\nContent-Type: text/html\n\n");
        assert_eq!(h.mime_type().as_deref(), Some("text/html"));
        assert_eq!(h.charset().as_deref(), Some("utf-8"));
        assert_eq!(
            h.mime_type_and_charset(),
            ("text/html".to_string(), "utf-8".to_string())
        );

        let h = headers("HTTP/1.1 200 OK\n\n");
        assert_eq!(h.mime_type(), None);
        assert_eq!(h.charset(), None);
    }

    #[test]
    fn test_is_redirect() {
        let h = headers("HTTP/1.1 301 Moved\nLocation: \nLocation: /caf\u{e9}\n\n");
        assert_eq!(h.is_redirect().as_deref(), Some("/caf%C3%A9"));

        let h = headers("HTTP/1.1 200 OK\nLocation: /x\n\n");
        assert_eq!(h.is_redirect(), None);

        let h = headers("HTTP/1.1 302 Found\n\n");
        assert_eq!(h.is_redirect(), None);
    }

    #[test]
    fn test_is_keep_alive() {
        assert!(headers("HTTP/1.1 200 OK\n\n").is_keep_alive());
        assert!(!headers("HTTP/1.0 200 OK\n\n").is_keep_alive());
        assert!(headers("HTTP/1.0 200 OK\nConnection: keep-alive\n\n").is_keep_alive());
        assert!(!headers("HTTP/1.1 200 OK\nConnection: close\n\n").is_keep_alive());
        assert!(!headers("HTTP/1.1 200 OK\nProxy-Connection: close\n\n").is_keep_alive());
        assert!(!headers("HTTP/0.9 200 OK\n\n").is_keep_alive());
    }

    #[test]
    fn test_is_chunk_encoded() {
        assert!(headers("HTTP/1.1 200 OK\nTransfer-Encoding: chunked\n\n").is_chunk_encoded());
        assert!(!headers("HTTP/1.0 200 OK\nTransfer-Encoding: chunked\n\n").is_chunk_encoded());
    }

    #[test]
    fn test_content_length() {
        assert_eq!(headers("HTTP/1.1 200 OK\nContent-Length: 10\n\n").content_length(), Some(10));
        assert_eq!(headers("HTTP/1.1 200 OK\nContent-Length: +10\n\n").content_length(), None);
        assert_eq!(headers("HTTP/1.1 200 OK\nContent-Length: -1\n\n").content_length(), None);
        assert_eq!(headers("HTTP/1.1 200 OK\nContent-Length: ten\n\n").content_length(), None);
        assert_eq!(headers("HTTP/1.1 200 OK\nContent-Length:\n\n").content_length(), None);
        assert_eq!(headers("HTTP/1.1 200 OK\n\n").content_length(), None);
    }

    #[test]
    fn test_content_range_for_206() {
        let h = headers("HTTP/1.1 206 Partial\nContent-Range: bytes 0-49/100\nContent-Length: 50\n\n");
        assert_eq!(h.content_range_for_206(), Some((0, 49, 100)));

        let h = headers("HTTP/1.1 206 Partial\nContent-Range: bytes 0-49/100\nContent-Length: 10\n\n");
        assert_eq!(h.content_range_for_206(), None);

        let h = headers("HTTP/1.1 206 Partial\nContent-Range: bytes 0-49/100\n\n");
        assert_eq!(h.content_range_for_206(), Some((0, 49, 100)));
    }

    #[test]
    fn test_content_range_rejects_zero_content_length() {
        let h = headers("HTTP/1.1 206 Partial\nContent-Range: bytes 0-49/100\nContent-Length: 0\n\n");
        assert_eq!(h.content_range_for_206(), None);

        let h = headers("HTTP/1.1 206 Partial\nContent-Range: bytes 7-7/8\nContent-Length: 1\n\n");
        assert_eq!(h.content_range_for_206(), Some((7, 7, 8)));
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let inputs = [
            "HTTP/1.1 200 OK\nCache-Control: max-age=10,\n  private\nVary: Accept, Cookie\n\n",
            "HTTP/1.1   206   Partial\nContent-Range: bytes 0-9/20\nSet-Cookie: a=1\nSet-Cookie: b=2\n\n",
            "HTTP/1.0 404\nWarning: 199 x, 299 y\n\tz\nX-Empty:\n\n",
            "HTTP/0.9 200 OK\n\n",
        ];
        for input in inputs {
            let h = headers(input);
            let again = ResponseHeaders::new(h.raw_headers());
            assert_eq!(again, h, "input {input:?}");
            assert_eq!(again.raw_headers(), h.raw_headers(), "input {input:?}");

            let restored = ResponseHeaders::from_persisted(&h.persist(PersistOptions::RAW));
            assert_eq!(restored, h, "input {input:?}");
        }
    }
}
