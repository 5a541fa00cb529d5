//! Raw header primitives
//!
//! Stateless helpers shared by the header store, the Vary fingerprint and
//! the range reconciler: header block assembly, line and value tokenizers,
//! quoting, and the small grammars for ranges, media types and codings.

use std::collections::BTreeSet;
use std::ops::Range;

use chrono::TimeDelta;

use super::date::parse_http_date;
use super::error::{ParseError, Result};
use super::range::HttpByteRange;
use super::version::HttpVersion;
use crate::logger::log_debug;

/// Header names that are never split on commas.
const NON_COALESCING_HEADERS: &[&str] = &[
    "date",
    "expires",
    "last-modified",
    "location",
    "retry-after",
    "set-cookie",
    "www-authenticate",
    "proxy-authenticate",
    "strict-transport-security",
];

/// Case-insensitive search for `http` tolerates this much leading junk.
const STATUS_LINE_SLOP: usize = 4;

/// Linear whitespace: space or horizontal tab
pub const fn is_lws(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

/// Strip leading and trailing LWS
pub fn trim_lws(s: &str) -> &str {
    s.trim_matches(|c| c == ' ' || c == '\t')
}

fn trim_lws_bytes(s: &[u8]) -> &[u8] {
    let start = s.iter().position(|&b| !is_lws(b)).unwrap_or(s.len());
    let end = s.iter().rposition(|&b| !is_lws(b)).map_or(start, |p| p + 1);
    &s[start..end]
}

/// Narrow `range` over `s` so it excludes surrounding LWS.
fn trim_lws_range(s: &[u8], mut range: Range<usize>) -> Range<usize> {
    while range.start < range.end && is_lws(s[range.start]) {
        range.start += 1;
    }
    while range.end > range.start && is_lws(s[range.end - 1]) {
        range.end -= 1;
    }
    range
}

/// RFC 7230 `tchar`
pub const fn is_token_char(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'!' | b'#'
                | b'$'
                | b'%'
                | b'&'
                | b'\''
                | b'*'
                | b'+'
                | b'-'
                | b'.'
                | b'^'
                | b'_'
                | b'`'
                | b'|'
                | b'~'
        )
}

pub fn is_token(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(is_token_char)
}

pub fn is_valid_header_name(name: &str) -> bool {
    is_token(name)
}

/// Values may not carry line terminators or NULs.
pub fn is_valid_header_value(value: &str) -> bool {
    !value.bytes().any(|b| matches!(b, b'\0' | b'\r' | b'\n'))
}

pub fn is_non_coalescing_header(name: &str) -> bool {
    NON_COALESCING_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}

/// Find where a status line starts, allowing a little leading junk.
pub fn locate_start_of_status_line(buf: &[u8]) -> Option<usize> {
    const HTTP: &[u8] = b"http";
    if buf.len() < HTTP.len() {
        return None;
    }
    let last = (buf.len() - HTTP.len()).min(STATUS_LINE_SLOP);
    (0..=last).find(|&i| buf[i..i + HTTP.len()].eq_ignore_ascii_case(HTTP))
}

fn locate_end_of_headers_helper(
    buf: &[u8],
    start: usize,
    mut was_lf: bool,
    mut last_c: u8,
) -> Option<usize> {
    for (i, &c) in buf.iter().enumerate().skip(start) {
        if c == b'\n' {
            if was_lf {
                return Some(i + 1);
            }
            was_lf = true;
        } else if c != b'\r' || last_c != b'\n' {
            was_lf = false;
        }
        last_c = c;
    }
    None
}

/// Offset just past the blank line that ends a header block.
///
/// Bare LF and CRLF line endings are both accepted.
pub fn locate_end_of_headers(buf: &[u8], start: usize) -> Option<usize> {
    locate_end_of_headers_helper(buf, start, false, 0)
}

/// Like [`locate_end_of_headers`], but the buffer may end immediately
/// (an empty trailer block is a lone line break).
pub fn locate_end_of_additional_headers(buf: &[u8], start: usize) -> Option<usize> {
    locate_end_of_headers_helper(buf, start, true, b'\n')
}

fn is_line_segment_continuable(line: &[u8]) -> bool {
    let Some(colon) = line.iter().position(|&b| b == b':') else {
        return false;
    };
    let name = &line[..colon];
    !name.is_empty() && !is_lws(name[0])
}

/// Normalize a header block read off the wire.
///
/// The result has the status line first, one header per segment, folded
/// continuation lines joined with a single space, embedded NULs removed,
/// every segment terminated by `\0` and a final extra `\0`.
///
/// Bytes that are not valid UTF-8 (Latin-1 filenames, say) are replaced
/// with U+FFFD, so such a block does not round-trip byte for byte.
pub fn assemble_raw_headers(input: &[u8]) -> String {
    let input = locate_start_of_status_line(input).map_or(input, |start| &input[start..]);

    let status_end = input
        .iter()
        .position(|&b| b == b'\r' || b == b'\n')
        .unwrap_or(input.len());

    let mut raw = Vec::with_capacity(input.len() + 2);
    raw.extend_from_slice(&input[..status_end]);

    let mut prev_line_continuable = false;
    for line in input[status_end..]
        .split(|&b| b == b'\r' || b == b'\n')
        .filter(|line| !line.is_empty())
    {
        if prev_line_continuable && is_lws(line[0]) {
            raw.push(b' ');
            raw.extend_from_slice(trim_lws_bytes(line));
        } else {
            raw.push(b'\n');
            raw.extend_from_slice(line);
            prev_line_continuable = is_line_segment_continuable(line);
        }
    }

    raw.extend_from_slice(b"\n\n");
    raw.retain(|&b| b != b'\0');
    for b in &mut raw {
        if *b == b'\n' {
            *b = b'\0';
        }
    }

    String::from_utf8_lossy(&raw).into_owned()
}

/// One well-formed `name: value` line, with spans relative to the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderLine<'a> {
    input: &'a str,
    pub name: Range<usize>,
    pub value: Range<usize>,
}

impl<'a> HeaderLine<'a> {
    pub fn name(&self) -> &'a str {
        &self.input[self.name.clone()]
    }

    pub fn value(&self) -> &'a str {
        &self.input[self.value.clone()]
    }
}

/// Iterates well-formed header lines, silently skipping malformed ones.
#[derive(Debug, Clone)]
pub struct HeaderLines<'a> {
    input: &'a str,
    delimiters: &'a [u8],
    pos: usize,
}

impl<'a> HeaderLines<'a> {
    pub const fn new(input: &'a str, delimiters: &'a [u8]) -> Self {
        Self {
            input,
            delimiters,
            pos: 0,
        }
    }
}

impl<'a> Iterator for HeaderLines<'a> {
    type Item = HeaderLine<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let bytes = self.input.as_bytes();
        loop {
            while self.pos < bytes.len() && self.delimiters.contains(&bytes[self.pos]) {
                self.pos += 1;
            }
            if self.pos >= bytes.len() {
                return None;
            }

            let line_start = self.pos;
            let line_end = bytes[line_start..]
                .iter()
                .position(|b| self.delimiters.contains(b))
                .map_or(bytes.len(), |p| line_start + p);
            self.pos = line_end;

            let Some(colon) = bytes[line_start..line_end]
                .iter()
                .position(|&b| b == b':')
                .map(|p| line_start + p)
            else {
                log_debug("skipping header line without a colon");
                continue;
            };

            if colon == line_start || is_lws(bytes[line_start]) {
                log_debug("skipping header line with an empty or indented name");
                continue;
            }

            let name = trim_lws_range(bytes, line_start..colon);
            if !is_token(&self.input[name.clone()]) {
                log_debug("skipping header line with an invalid name");
                continue;
            }

            let value = trim_lws_range(bytes, colon + 1..line_end);
            return Some(HeaderLine {
                input: self.input,
                name,
                value,
            });
        }
    }
}

/// Header lines of `block`, split on any byte in `delimiters`.
pub const fn header_lines<'a>(block: &'a str, delimiters: &'a [u8]) -> HeaderLines<'a> {
    HeaderLines::new(block, delimiters)
}

/// Quote-aware value splitter yielding spans of the input.
///
/// Separators inside double quotes are ignored, and a backslash inside
/// quotes escapes the next byte. Every span is LWS-trimmed.
#[derive(Debug, Clone)]
pub struct ValueSpans<'a> {
    input: &'a [u8],
    delimiter: u8,
    ignore_empty: bool,
    pos: usize,
    done: bool,
}

impl<'a> ValueSpans<'a> {
    pub const fn new(input: &'a str, delimiter: u8, ignore_empty: bool) -> Self {
        Self {
            input: input.as_bytes(),
            delimiter,
            ignore_empty,
            pos: 0,
            done: false,
        }
    }
}

impl Iterator for ValueSpans<'_> {
    type Item = Range<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let start = self.pos;
            let mut in_quote = false;
            let mut i = start;
            let mut end = None;
            while i < self.input.len() {
                let b = self.input[i];
                if in_quote {
                    if b == b'\\' {
                        i += 1;
                    } else if b == b'"' {
                        in_quote = false;
                    }
                } else if b == b'"' {
                    in_quote = true;
                } else if b == self.delimiter {
                    end = Some(i);
                    break;
                }
                i += 1;
            }

            let span = match end {
                Some(end) => {
                    self.pos = end + 1;
                    start..end
                }
                None => {
                    self.done = true;
                    start..self.input.len()
                }
            };

            let span = trim_lws_range(self.input, span);
            if self.ignore_empty && span.is_empty() {
                continue;
            }
            return Some(span);
        }
        None
    }
}

/// Split `input` into trimmed values, see [`ValueSpans`].
pub fn values(input: &str, delimiter: u8, ignore_empty: bool) -> impl Iterator<Item = &str> {
    ValueSpans::new(input, delimiter, ignore_empty).map(move |span| &input[span])
}

/// Wrap `s` in double quotes, escaping `\` and `"`.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

fn unquote_impl(s: &str, strict: bool) -> Option<String> {
    let bytes = s.as_bytes();
    if bytes.len() < 2 {
        return None;
    }
    let open = bytes[0];
    if open != b'"' && (strict || open != b'\'') {
        return None;
    }
    if bytes[bytes.len() - 1] != open {
        return None;
    }

    let inner = &s[1..s.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut prev_escape = false;
    for c in inner.chars() {
        if c == '\\' && !prev_escape {
            prev_escape = true;
            continue;
        }
        if strict && !prev_escape && c == '"' {
            return None;
        }
        prev_escape = false;
        out.push(c);
    }

    // An escape consuming the closing quote leaves the string unterminated.
    if strict && prev_escape {
        return None;
    }
    Some(out)
}

/// Strict unquote: requires a double-quoted string with no unescaped
/// interior quote and no escaped terminal quote.
pub fn strict_unquote(s: &str) -> Result<String> {
    unquote_impl(s, true).ok_or_else(|| ParseError::InvalidQuotedString(s.to_string()))
}

/// Lenient unquote: accepts single or double quotes and returns the input
/// unchanged when it is not quoted.
pub fn unquote(s: &str) -> String {
    unquote_impl(s, false).unwrap_or_else(|| s.to_string())
}

/// Media type state carried across several `Content-Type` values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentType {
    pub mime_type: String,
    pub charset: String,
    pub had_charset: bool,
    pub boundary: Option<String>,
}

impl ContentType {
    pub fn parse(value: &str) -> Self {
        let mut content_type = Self::default();
        content_type.merge(value);
        content_type
    }

    /// Fold one more `Content-Type` value into the accumulated state.
    ///
    /// A repeated media type keeps the earlier charset unless the new value
    /// names one; a different media type resets it.
    pub fn merge(&mut self, content_type: &str) {
        let bytes = content_type.as_bytes();
        let len = bytes.len();

        let type_val = bytes.iter().position(|&b| !is_lws(b)).unwrap_or(len);
        let type_end = bytes[type_val..]
            .iter()
            .position(|&b| is_lws(b) || b == b';' || b == b'(')
            .map_or(len, |p| type_val + p);

        let mut charset_value: Option<String> = None;
        let mut type_has_charset = false;
        let mut type_has_boundary = false;

        let mut param_start = bytes[type_end..]
            .iter()
            .position(|&b| b == b';')
            .map(|p| type_end + p);

        while let Some(semi) = param_start {
            let mut cur = semi + 1;
            while cur < len && is_lws(bytes[cur]) {
                cur += 1;
            }
            let name_start = cur;
            while cur < len && bytes[cur] != b';' && bytes[cur] != b'=' {
                cur += 1;
            }
            if cur >= len || bytes[cur] == b';' {
                param_start = (cur < len).then_some(cur);
                continue;
            }
            let name = &content_type[name_start..cur];

            cur += 1;
            while cur < len && is_lws(bytes[cur]) {
                cur += 1;
            }
            if cur >= len || bytes[cur] == b';' {
                param_start = (cur < len).then_some(cur);
                continue;
            }

            let param_value: String;
            if bytes[cur] == b'"' {
                cur += 1;
                let mut unescaped = Vec::new();
                while cur < len && bytes[cur] != b'"' {
                    if bytes[cur] == b'\\' && cur + 1 < len {
                        cur += 1;
                    }
                    unescaped.push(bytes[cur]);
                    cur += 1;
                }
                param_value = trim_lws(&String::from_utf8_lossy(&unescaped)).to_string();
                param_start = bytes[cur.min(len)..]
                    .iter()
                    .position(|&b| b == b';')
                    .map(|p| cur + p);
            } else {
                let value_start = cur;
                let value_end = bytes[cur..]
                    .iter()
                    .position(|&b| b == b';')
                    .map_or(len, |p| cur + p);
                param_value = trim_lws(&content_type[value_start..value_end]).to_string();
                param_start = (value_end < len).then_some(value_end);
            }

            if !type_has_charset && name.eq_ignore_ascii_case("charset") {
                type_has_charset = true;
                charset_value = Some(param_value);
            } else if !type_has_boundary && name.eq_ignore_ascii_case("boundary") {
                type_has_boundary = true;
                self.boundary = Some(param_value);
            }
        }

        let media_type = &content_type[type_val..type_end];
        if media_type.is_empty() || media_type == "*/*" || !media_type.contains('/') {
            return;
        }

        let eq = !self.mime_type.is_empty() && self.mime_type.eq_ignore_ascii_case(media_type);
        if !eq {
            self.mime_type = media_type.to_ascii_lowercase();
        }
        if (!eq && self.had_charset) || type_has_charset {
            self.had_charset = true;
            self.charset = charset_value.unwrap_or_default().to_ascii_lowercase();
        }
    }
}

/// Parse a `Range` request header value into byte ranges.
pub fn parse_range_header(value: &str) -> Result<Vec<HttpByteRange>> {
    let Some((unit, ranges)) = value.split_once('=') else {
        return Err(ParseError::MalformedRange(value.to_string()));
    };
    let unit = trim_lws(unit);
    if !unit.eq_ignore_ascii_case("bytes") {
        return Err(ParseError::UnsupportedUnit(unit.to_string()));
    }

    let mut parsed = Vec::new();
    for spec in values(ranges, b',', true) {
        let Some((first, last)) = spec.split_once('-') else {
            return Err(ParseError::MalformedRange(spec.to_string()));
        };
        let first = trim_lws(first);
        let last = trim_lws(last);

        let mut range = HttpByteRange::default();
        if !first.is_empty() {
            range.set_first_byte_position(parse_position(first, spec)?);
        }
        if !last.is_empty() {
            let n = parse_position(last, spec)?;
            if range.has_first_byte_position() {
                range.set_last_byte_position(n);
            } else {
                range.set_suffix_length(n);
            }
        } else if !range.has_first_byte_position() {
            return Err(ParseError::MalformedRange(spec.to_string()));
        }

        if !range.is_valid() {
            return Err(ParseError::MalformedRange(spec.to_string()));
        }
        parsed.push(range);
    }

    if parsed.is_empty() {
        return Err(ParseError::MalformedRange(value.to_string()));
    }
    Ok(parsed)
}

fn parse_position(digits: &str, spec: &str) -> Result<i64> {
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::MalformedRange(spec.to_string()));
    }
    digits
        .parse()
        .map_err(|_| ParseError::MalformedRange(spec.to_string()))
}

/// Parse `bytes first-last/total` as sent with a 206 response.
///
/// Requires `0 <= first <= last < total`; unknown totals and unsatisfied
/// ranges (`*`) are rejected.
pub fn parse_content_range_for_206(value: &str) -> Result<(i64, i64, i64)> {
    let invalid = || ParseError::InvalidContentRange(value.to_string());
    let value = trim_lws(value);

    let (unit, rest) = value.split_once(' ').ok_or_else(invalid)?;
    if !trim_lws(unit).eq_ignore_ascii_case("bytes") {
        return Err(invalid());
    }
    let (first, rest) = rest.split_once('-').ok_or_else(invalid)?;
    let (last, total) = rest.split_once('/').ok_or_else(invalid)?;

    let number = |s: &str| -> Result<i64> {
        let s = trim_lws(s);
        if s.starts_with('+') {
            return Err(invalid());
        }
        s.parse().map_err(|_| invalid())
    };
    let first = number(first)?;
    let last = number(last)?;
    let total = number(total)?;

    if first < 0 || last < first || total <= last {
        return Err(invalid());
    }
    Ok((first, last, total))
}

/// Parse `Accept-Encoding` into the set of acceptable codings.
///
/// Returns `None` when the value is malformed. Codings with `q=0` are left
/// out; `identity` is always acceptable and legacy `x-` aliases are mirrored.
pub fn parse_accept_encoding(value: &str) -> Option<BTreeSet<String>> {
    if value.contains('"') {
        return None;
    }

    let mut allowed = BTreeSet::new();
    for entry in value.split(',').map(trim_lws).filter(|e| !e.is_empty()) {
        let Some((encoding, params)) = entry.split_once(';') else {
            if entry.bytes().any(is_lws) {
                return None;
            }
            allowed.insert(entry.to_ascii_lowercase());
            continue;
        };

        let encoding = trim_lws(encoding);
        if encoding.bytes().any(is_lws) {
            return None;
        }
        let params = trim_lws(params);
        let Some(qvalue) = params
            .get(..2)
            .filter(|p| p.eq_ignore_ascii_case("q="))
            .map(|_| trim_lws(&params[2..]))
        else {
            return None;
        };
        if qvalue.is_empty() {
            return None;
        }

        if qvalue.starts_with('1') {
            if !"1.000".starts_with(qvalue) {
                return None;
            }
            allowed.insert(encoding.to_ascii_lowercase());
            continue;
        }
        if !qvalue.starts_with('0') {
            return None;
        }
        if qvalue.len() == 1 {
            continue;
        }
        let q = qvalue.as_bytes();
        if q.len() < 3 || q.len() > 5 || q[1] != b'.' {
            return None;
        }
        let mut nonzero = false;
        for &d in &q[2..] {
            if !d.is_ascii_digit() {
                return None;
            }
            nonzero |= d != b'0';
        }
        if nonzero {
            allowed.insert(encoding.to_ascii_lowercase());
        }
    }

    if allowed.is_empty() {
        allowed.insert("*".to_string());
        return Some(allowed);
    }

    allowed.insert("identity".to_string());
    for (a, b) in [("gzip", "x-gzip"), ("compress", "x-compress")] {
        if allowed.contains(a) || allowed.contains(b) {
            allowed.insert(a.to_string());
            allowed.insert(b.to_string());
        }
    }
    Some(allowed)
}

/// Parse `Content-Encoding` into the set of applied codings.
pub fn parse_content_encoding(value: &str) -> Option<BTreeSet<String>> {
    if value.contains('"') {
        return None;
    }
    let mut used = BTreeSet::new();
    for part in value.split(',').map(trim_lws) {
        if part == "*" || !is_token(part) {
            return None;
        }
        used.insert(part.to_ascii_lowercase());
    }
    Some(used)
}

/// Whether a response carries any validator usable for revalidation.
pub fn has_validators(version: HttpVersion, etag: &str, last_modified: &str) -> bool {
    if version < HttpVersion::HTTP_1_0 {
        return false;
    }
    if parse_http_date(last_modified).is_some() {
        return true;
    }
    if version == HttpVersion::HTTP_1_0 {
        return false;
    }
    !etag.is_empty()
}

/// Whether a response carries a strong validator (RFC 7232 §2.2.2).
///
/// A Last-Modified date qualifies only when it is at least 60 seconds
/// older than the Date header.
pub fn has_strong_validators(
    version: HttpVersion,
    etag: &str,
    last_modified: &str,
    date: &str,
) -> bool {
    if !has_validators(version, etag, last_modified) || version < HttpVersion::HTTP_1_1 {
        return false;
    }

    let etag = trim_lws(etag);
    if !etag.is_empty() {
        let weak = etag
            .split_once('/')
            .is_some_and(|(prefix, _)| trim_lws(prefix).eq_ignore_ascii_case("w"));
        if !weak {
            return true;
        }
    }

    let (Some(last_modified), Some(date)) =
        (parse_http_date(last_modified), parse_http_date(date))
    else {
        return false;
    };
    date - last_modified >= TimeDelta::seconds(60)
}
