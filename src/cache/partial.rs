//! Byte-range reconciliation
//!
//! [`PartialData`] splits one client range request into sub-ranges that are
//! served either from a (possibly sparse) cache entry or from the network,
//! and rewrites the final response headers so the client sees exactly the
//! range it asked for.
//!
//! A caller drives it in a loop:
//! 1. [`PartialData::should_validate_cache`] probes what is cached next
//! 2. [`PartialData::prepare_cache_validation`] picks the next sub-range
//! 3. read it from the cache or fetch it, then report the byte count
//!
//! until the probe reports [`CacheProbe::Finished`].

use hyper::body::Bytes;
use hyper::header::{HeaderValue, RANGE};
use hyper::HeaderMap;

use super::{
    AvailableRange, CacheError, CacheOp, PendingOp, RangeError, SparseCacheStore, DATA_STREAM,
};
use crate::config::RangeConfig;
use crate::http::util::parse_range_header;
use crate::http::{HttpByteRange, ParseError, ResponseHeaders};
use crate::logger::{
    self, log_debug, log_error, log_info, log_warning, RangeTraceEntry, TraceSource,
};

/// Outcome of [`PartialData::should_validate_cache`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheProbe {
    /// The whole requested range has been handled
    Finished,
    /// The cached extent is known; call `prepare_cache_validation`
    Ready,
    /// The store answers later; await `wait_for_cache_probe` first
    Pending,
}

/// Per-transaction range state
#[derive(Debug)]
pub struct PartialData {
    /// Range being served, resolved against the resource once known
    byte_range: HttpByteRange,
    /// Range exactly as the client sent it
    user_byte_range: HttpByteRange,
    extra_headers: HeaderMap,
    current_range_start: i64,
    /// 0 while unknown
    current_range_end: i64,
    cached_start: i64,
    cached_min_len: i64,
    /// 0 while unknown
    resource_size: i64,
    max_chunk_len: i64,
    resume_truncated: bool,
    range_present: bool,
    final_range: bool,
    sparse_entry: bool,
    truncated: bool,
    initial_validation: bool,
    range_requested: bool,
    pending_probe: Option<PendingOp<AvailableRange>>,
}

impl Default for PartialData {
    fn default() -> Self {
        Self::new(&RangeConfig::default())
    }
}

impl PartialData {
    pub fn new(config: &RangeConfig) -> Self {
        Self {
            byte_range: HttpByteRange::default(),
            user_byte_range: HttpByteRange::default(),
            extra_headers: HeaderMap::new(),
            current_range_start: 0,
            current_range_end: 0,
            cached_start: 0,
            cached_min_len: 0,
            resource_size: 0,
            max_chunk_len: config.max_chunk_len.clamp(1, i64::from(i32::MAX)),
            resume_truncated: config.resume_truncated,
            range_present: false,
            final_range: false,
            sparse_entry: true,
            truncated: false,
            initial_validation: false,
            range_requested: false,
            pending_probe: None,
        }
    }

    /// Take the single byte range from the request's `Range` header.
    ///
    /// A request carrying any `Range` header counts as range-requested even
    /// when the value cannot be handled.
    pub fn init(&mut self, headers: &HeaderMap) -> Result<(), RangeError> {
        let Some(value) = headers.get(RANGE) else {
            self.range_requested = false;
            return Err(RangeError::NotARangeRequest);
        };
        self.range_requested = true;

        let value = value
            .to_str()
            .map_err(|_| ParseError::MalformedRange("non-ASCII Range header".to_string()))?;
        let ranges = parse_range_header(value)?;
        let [range] = ranges[..] else {
            return Err(ParseError::MultipleRanges(ranges.len()).into());
        };
        if !range.is_valid() {
            return Err(ParseError::MalformedRange(value.to_string()).into());
        }

        self.byte_range = range;
        self.user_byte_range = range;
        self.current_range_start = range.first_byte_position().unwrap_or(-1);
        log_debug(&format!(
            "range start: {} end: {:?}",
            self.current_range_start,
            range.last_byte_position()
        ));
        Ok(())
    }

    /// Remember the request headers to send with every sub-request.
    pub fn set_headers(&mut self, headers: &HeaderMap) {
        self.extra_headers = headers.clone();
    }

    /// Rebuild the request headers for the remainder of the user's range.
    pub fn restore_headers(&self, headers: &mut HeaderMap) {
        headers.clone_from(&self.extra_headers);
        if self.truncated || !self.byte_range.is_valid() {
            return;
        }

        let end = self
            .byte_range
            .suffix_length()
            .or_else(|| self.byte_range.last_byte_position())
            .unwrap_or(-1);
        let range = if self.current_range_start < 0 {
            HttpByteRange::suffix(end)
        } else {
            HttpByteRange::bounded(self.current_range_start, end)
        };
        set_range_header(headers, &range);
    }

    /// Length of the next sub-range, at most one chunk.
    fn next_range_len(&self) -> i64 {
        let remaining = self.byte_range.last_byte_position().map_or(
            i64::from(i32::MAX),
            |last| last - self.current_range_start + 1,
        );
        remaining.min(self.max_chunk_len)
    }

    /// Find out how much of the next sub-range is cached.
    ///
    /// Only one probe may be outstanding; a second call while one is pending
    /// fails with [`CacheError::OperationInProgress`].
    pub fn should_validate_cache(
        &mut self,
        store: &mut (impl SparseCacheStore + ?Sized),
    ) -> Result<CacheProbe, CacheError> {
        if self.pending_probe.is_some() {
            return Err(CacheError::OperationInProgress);
        }

        let mut len = self.next_range_len();
        if len == 0 {
            return Ok(CacheProbe::Finished);
        }

        if self.sparse_entry {
            return match store.get_available_range(self.current_range_start, len) {
                CacheOp::Ready(range) => self.on_available_range(Ok(range)).map(|()| CacheProbe::Ready),
                CacheOp::Pending(op) => {
                    self.pending_probe = Some(op);
                    Ok(CacheProbe::Pending)
                }
                CacheOp::Failed(err) => self.on_available_range(Err(err)).map(|()| CacheProbe::Ready),
            };
        }

        if !self.truncated {
            if self
                .byte_range
                .first_byte_position()
                .is_some_and(|first| first >= self.resource_size)
            {
                len = 0;
            }
            self.cached_min_len = len;
            self.cached_start = self.current_range_start;
        }

        if self.cached_min_len < 0 {
            return Err(CacheError::InvalidArgument("negative cached length"));
        }
        Ok(CacheProbe::Ready)
    }

    fn on_available_range(&mut self, result: Result<AvailableRange, CacheError>) -> Result<(), CacheError> {
        match result {
            Ok(range) if range.len >= 0 => {
                self.cached_start = range.start;
                self.cached_min_len = range.len;
                Ok(())
            }
            Ok(range) => {
                log_error(&format!(
                    "store reported {} cached bytes at {}",
                    range.len, range.start
                ));
                Err(CacheError::InvalidArgument("negative cached length"))
            }
            Err(err) => {
                log_warning(&format!(
                    "cache probe at {} failed: {err}",
                    self.current_range_start
                ));
                Err(err)
            }
        }
    }

    /// Wait for a pending probe; returns at once when none is outstanding.
    pub async fn wait_for_cache_probe(&mut self) -> Result<(), CacheError> {
        let Some(op) = self.pending_probe.take() else {
            return Ok(());
        };
        let result = op.wait().await;
        self.on_available_range(result)
    }

    /// Poll a pending probe; `None` while the store is still working.
    pub fn try_complete_cache_probe(&mut self) -> Option<Result<(), CacheError>> {
        let result = self.pending_probe.as_mut()?.try_take()?;
        self.pending_probe = None;
        Some(self.on_available_range(result))
    }

    /// Pick the next sub-range from the last probe and write its `Range`
    /// header into `headers`, which are reset to the caller's extra headers.
    pub fn prepare_cache_validation(&mut self, headers: &mut HeaderMap) {
        debug_assert!(self.current_range_start >= 0);
        let len = self.next_range_len();

        headers.clone_from(&self.extra_headers);
        self.range_present = false;

        if self.cached_min_len == 0 {
            // Nothing else stored.
            self.final_range = true;
            self.current_range_end = self.byte_range.last_byte_position().unwrap_or(0);
            self.cached_start = self.current_range_end + 1;
        } else if self.current_range_start == self.cached_start {
            self.range_present = true;
            self.current_range_end = self.cached_start + self.cached_min_len - 1;
            if len == self.cached_min_len {
                self.final_range = true;
            }
        } else {
            self.current_range_end = self.cached_start - 1;
        }

        let range = if self.byte_range.has_last_byte_position() || self.current_range_end > 0 {
            HttpByteRange::bounded(self.current_range_start, self.current_range_end)
        } else {
            HttpByteRange::right_unbounded(self.current_range_start)
        };
        set_range_header(headers, &range);

        if logger::trace_enabled() {
            let source = if self.range_present {
                TraceSource::Cache
            } else {
                TraceSource::Network
            };
            let mut entry = RangeTraceEntry::new(
                "prepare_cache_validation",
                self.current_range_start,
                range.last_byte_position().unwrap_or(-1),
                source,
            );
            entry.cached_start = self.cached_start;
            entry.cached_len = self.cached_min_len;
            entry.resource_size = self.resource_size;
            entry.final_range = self.final_range;
            logger::log_range_trace(&entry);
        }
    }

    /// Whether the current sub-range is served from the cache.
    pub const fn is_current_range_cached(&self) -> bool {
        self.range_present
    }

    pub const fn is_last_range(&self) -> bool {
        self.final_range
    }

    /// Load size and entry shape from the headers stored with the entry.
    ///
    /// Returns `false` when the entry cannot be used for this request. A
    /// truncated whole-body entry is set up for a one-byte probe at the
    /// truncation point.
    pub fn update_from_stored_headers(
        &mut self,
        headers: &ResponseHeaders,
        store: &(impl SparseCacheStore + ?Sized),
        truncated: bool,
        writing_in_progress: bool,
    ) -> bool {
        self.resource_size = 0;
        if truncated {
            debug_assert_eq!(headers.response_code(), 200);
            if !self.resume_truncated || self.byte_range.is_valid() {
                return false;
            }
            if !headers.has_strong_validators() {
                return false;
            }
            let Some(total_length) = headers.content_length().filter(|l| *l > 0) else {
                return false;
            };

            let current_len = store.data_size(DATA_STREAM);
            self.truncated = true;
            self.initial_validation = true;
            self.sparse_entry = false;
            self.byte_range.set_first_byte_position(current_len);
            self.resource_size = total_length;
            self.current_range_start = current_len;
            self.cached_min_len = current_len;
            self.cached_start = current_len + 1;
            log_info(&format!(
                "resuming truncated entry at {current_len} of {total_length} bytes"
            ));
            return true;
        }

        self.sparse_entry = headers.response_code() == 206;
        if writing_in_progress || self.sparse_entry {
            // Stored 206s carry the resource size as Content-Length.
            let Some(length) = headers.content_length().filter(|l| *l > 0) else {
                return false;
            };
            self.resource_size = length;
            if self.sparse_entry && !store.could_be_sparse() {
                return false;
            }
        } else {
            self.resource_size = store.data_size(DATA_STREAM);
        }
        log_debug(&format!("stored resource size: {}", self.resource_size));
        true
    }

    /// Restart a truncated entry from the first byte.
    pub fn set_range_to_start_download(&mut self) {
        debug_assert!(self.truncated && !self.sparse_entry);
        self.current_range_start = 0;
        self.cached_start = 0;
        self.initial_validation = false;
    }

    /// Resolve the requested range against the known resource size.
    pub fn is_requested_range_ok(&mut self) -> bool {
        if self.byte_range.is_valid() {
            if !self.byte_range.compute_bounds(self.resource_size) {
                return false;
            }
            if self.truncated {
                return true;
            }
            if self.current_range_start < 0 {
                self.current_range_start = self.byte_range.first_byte_position().unwrap_or(-1);
            }
        } else {
            // Not a range request, but the stored data is partial.
            self.current_range_start = 0;
            self.byte_range.set_last_byte_position(self.resource_size - 1);
        }

        let ok = self.current_range_start >= 0;
        if !ok {
            self.current_range_start = 0;
        }
        ok
    }

    /// Check a network response against the sub-range that was requested.
    pub fn response_headers_ok(&mut self, headers: &ResponseHeaders) -> bool {
        if headers.response_code() == 304 {
            if !self.byte_range.is_valid() || self.truncated {
                return true;
            }
            return self.byte_range.has_first_byte_position()
                && self.byte_range.has_last_byte_position();
        }

        let Some((start, end, total_length)) = headers.content_range_for_206() else {
            log_warning("range response without a usable Content-Range");
            return false;
        };
        if total_length <= 0 {
            return false;
        }

        if self.resource_size == 0 {
            self.resource_size = total_length;
            if !self.byte_range.has_first_byte_position() {
                self.byte_range.set_first_byte_position(start);
                self.current_range_start = start;
            }
            if !self.byte_range.has_last_byte_position() {
                self.byte_range.set_last_byte_position(end);
            }
        } else if self.resource_size != total_length {
            log_warning(&format!(
                "resource size changed from {} to {total_length}",
                self.resource_size
            ));
            return false;
        }

        if self.truncated && !self.byte_range.has_last_byte_position() {
            self.byte_range.set_last_byte_position(end);
        }

        if start != self.current_range_start {
            log_warning(&format!(
                "range response starts at {start}, expected {}",
                self.current_range_start
            ));
            return false;
        }

        if self.current_range_end == 0 {
            // Nothing was cached; trust the first answer.
            let Some(last) = self.byte_range.last_byte_position() else {
                return false;
            };
            self.current_range_end = last;
            if self.current_range_end >= self.resource_size {
                self.current_range_end = end;
                self.byte_range.set_last_byte_position(end);
            }
        }

        if end != self.current_range_end {
            log_warning(&format!(
                "range response ends at {end}, expected {}",
                self.current_range_end
            ));
            return false;
        }
        true
    }

    /// Present the user's range and the true resource size in `headers`.
    ///
    /// On failure the response becomes a 416.
    pub fn fix_response_headers(&self, headers: &mut ResponseHeaders, success: bool) {
        if self.truncated {
            return;
        }

        if !success {
            headers.replace_status_line("HTTP/1.1 416 Requested Range Not Satisfiable");
            headers.set_header(
                "Content-Range",
                &format!("bytes 0-0/{}", self.resource_size),
            );
            headers.set_header("Content-Length", "0");
            return;
        }

        if self.byte_range.is_valid() && self.resource_size != 0 {
            headers.update_with_new_range(&self.byte_range, self.resource_size, !self.sparse_entry);
        } else {
            if headers.response_code() == 206 {
                headers.replace_status_line("HTTP/1.1 200 OK");
            }
            headers.remove_header("Content-Range");
            headers.set_header("Content-Length", &self.resource_size.to_string());
        }
    }

    /// Store the whole resource size as `Content-Length`.
    pub fn fix_content_length(&self, headers: &mut ResponseHeaders) {
        headers.set_header("Content-Length", &self.resource_size.to_string());
    }

    /// Read up to `len` cached bytes at the cursor.
    pub fn cache_read(
        &self,
        store: &mut (impl SparseCacheStore + ?Sized),
        len: usize,
    ) -> CacheOp<Bytes> {
        let cached = usize::try_from(self.cached_min_len).unwrap_or(0);
        let read_len = len.min(cached);
        if read_len == 0 {
            return CacheOp::Ready(Bytes::new());
        }

        if self.sparse_entry {
            return store.read_sparse(self.current_range_start, read_len);
        }
        match dense_offset(self.current_range_start) {
            Ok(offset) => store.read_data(DATA_STREAM, offset, read_len),
            Err(err) => CacheOp::Failed(err),
        }
    }

    /// Write network bytes at the cursor.
    pub fn cache_write(
        &self,
        store: &mut (impl SparseCacheStore + ?Sized),
        data: Bytes,
    ) -> CacheOp<usize> {
        if self.sparse_entry {
            return store.write_sparse(self.current_range_start, data);
        }
        match dense_offset(self.current_range_start) {
            Ok(offset) => store.write_data(DATA_STREAM, offset, data, true),
            Err(err) => CacheOp::Failed(err),
        }
    }

    /// Advance past `result` bytes read from the cache.
    pub fn on_cache_read_completed(&mut self, result: i64) {
        if result > 0 {
            self.current_range_start += result;
            self.cached_min_len -= result;
            debug_assert!(self.cached_min_len >= 0);
        }
    }

    /// Advance past `result` bytes received from the network.
    pub fn on_network_read_completed(&mut self, result: i64) {
        if result > 0 {
            self.current_range_start += result;
        }
    }

    /// Whether the next request is the one-byte resumption probe.
    pub const fn initial_validation(&self) -> bool {
        self.initial_validation
    }

    pub const fn range_requested(&self) -> bool {
        self.range_requested
    }

    pub const fn byte_range(&self) -> &HttpByteRange {
        &self.byte_range
    }

    pub const fn user_byte_range(&self) -> &HttpByteRange {
        &self.user_byte_range
    }

    pub const fn current_range_start(&self) -> i64 {
        self.current_range_start
    }

    pub const fn current_range_end(&self) -> i64 {
        self.current_range_end
    }

    pub const fn cached_start(&self) -> i64 {
        self.cached_start
    }

    pub const fn cached_min_len(&self) -> i64 {
        self.cached_min_len
    }

    pub const fn resource_size(&self) -> i64 {
        self.resource_size
    }

    pub const fn is_sparse_entry(&self) -> bool {
        self.sparse_entry
    }

    pub const fn is_truncated(&self) -> bool {
        self.truncated
    }
}

/// Dense streams are addressed with 32-bit offsets.
fn dense_offset(position: i64) -> Result<usize, CacheError> {
    if position > i64::from(i32::MAX) {
        return Err(CacheError::InvalidArgument("offset beyond 32-bit dense stream"));
    }
    usize::try_from(position).map_err(|_| CacheError::InvalidArgument("negative offset"))
}

fn set_range_header(headers: &mut HeaderMap, range: &HttpByteRange) {
    if let Ok(value) = HeaderValue::try_from(range.header_value()) {
        headers.insert(RANGE, value);
    }
}
