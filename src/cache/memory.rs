//! In-memory cache entry
//!
//! A [`SparseCacheStore`] backed by plain vectors for the dense streams and
//! an ordered map of extents for sparse data. Operations complete
//! immediately unless the entry is switched to deferred mode, in which case
//! they return pending handles that [`MemoryEntry::run_pending`] completes.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use hyper::body::Bytes;

use super::{pending, AvailableRange, CacheError, CacheOp, SparseCacheStore};

const STREAM_COUNT: usize = 3;

type Deferred = Box<dyn FnOnce() + Send>;

/// One cache entry held in memory
#[derive(Default)]
pub struct MemoryEntry {
    streams: [Vec<u8>; STREAM_COUNT],
    /// Disjoint, non-adjacent extents keyed by start offset
    sparse: BTreeMap<i64, Bytes>,
    sparse_capable: bool,
    deferred: bool,
    queued: VecDeque<Deferred>,
    fail_next: Option<i32>,
}

impl fmt::Debug for MemoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryEntry")
            .field("stream_sizes", &self.streams.iter().map(Vec::len).collect::<Vec<_>>())
            .field("sparse_extents", &self.sparse.len())
            .field("sparse_capable", &self.sparse_capable)
            .field("deferred", &self.deferred)
            .field("queued", &self.queued.len())
            .finish_non_exhaustive()
    }
}

fn to_index(value: i64) -> Result<usize, CacheError> {
    usize::try_from(value).map_err(|_| CacheError::InvalidArgument("negative offset or length"))
}

fn extent_end(start: i64, data: &Bytes) -> i64 {
    start.saturating_add(i64::try_from(data.len()).unwrap_or(i64::MAX))
}

impl MemoryEntry {
    /// Empty entry able to hold sparse data.
    pub fn sparse() -> Self {
        Self {
            sparse_capable: true,
            ..Self::default()
        }
    }

    /// Entry whose body stream already holds `body`.
    pub fn dense(body: &[u8]) -> Self {
        let mut entry = Self::default();
        entry.streams[super::DATA_STREAM] = body.to_vec();
        entry
    }

    /// Deliver results through pending handles instead of immediately.
    pub fn set_deferred(&mut self, deferred: bool) {
        self.deferred = deferred;
    }

    /// Make the next operation fail with storage error `code`.
    pub fn fail_next(&mut self, code: i32) {
        self.fail_next = Some(code);
    }

    /// Complete every queued deferred operation; returns how many ran.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Some(task) = self.queued.pop_front() {
            task();
            ran += 1;
        }
        ran
    }

    pub fn pending_count(&self) -> usize {
        self.queued.len()
    }

    fn finish<T: Send + 'static>(&mut self, result: Result<T, CacheError>) -> CacheOp<T> {
        let result = match self.fail_next.take() {
            Some(code) => Err(CacheError::Storage(code)),
            None => result,
        };
        if !self.deferred {
            return result.into();
        }
        let (completion, op) = pending();
        self.queued.push_back(Box::new(move || {
            completion.complete(result);
        }));
        CacheOp::Pending(op)
    }

    /// Extent holding byte `offset`, if any.
    fn extent_at(&self, offset: i64) -> Option<(i64, &Bytes)> {
        self.sparse
            .range(..=offset)
            .next_back()
            .filter(|(start, data)| extent_end(**start, data) > offset)
            .map(|(start, data)| (*start, data))
    }

    fn available_range(&self, offset: i64, len: i64) -> Result<AvailableRange, CacheError> {
        if offset < 0 || len < 0 {
            return Err(CacheError::InvalidArgument("negative offset or length"));
        }
        let window_end = offset.saturating_add(len);
        let hit = self.extent_at(offset).or_else(|| {
            self.sparse
                .range(offset..window_end)
                .next()
                .map(|(start, data)| (*start, data))
        });
        let Some((start, data)) = hit else {
            return Ok(AvailableRange { start: offset, len: 0 });
        };

        let first = start.max(offset);
        let last = extent_end(start, data).min(window_end);
        Ok(AvailableRange {
            start: first,
            len: (last - first).max(0),
        })
    }

    fn sparse_read(&self, offset: i64, len: usize) -> Result<Bytes, CacheError> {
        to_index(offset)?;
        let Some((start, data)) = self.extent_at(offset) else {
            return Ok(Bytes::new());
        };
        let begin = to_index(offset - start)?;
        let end = begin.saturating_add(len).min(data.len());
        Ok(data.slice(begin..end))
    }

    /// Store `data` at `offset`, merging it with every extent it overlaps or
    /// touches. Newer bytes win.
    fn sparse_write(&mut self, offset: i64, data: &[u8]) -> Result<usize, CacheError> {
        if !self.sparse_capable {
            return Err(CacheError::InvalidArgument("entry cannot hold sparse data"));
        }
        to_index(offset)?;
        let end = i64::try_from(data.len())
            .ok()
            .and_then(|len| offset.checked_add(len))
            .ok_or(CacheError::InvalidArgument("write past the addressable range"))?;
        if data.is_empty() {
            return Ok(0);
        }

        let touching: Vec<i64> = self
            .sparse
            .range(..=end)
            .rev()
            .take_while(|(start, existing)| extent_end(**start, existing) >= offset)
            .map(|(start, _)| *start)
            .collect();

        let mut merged_start = offset;
        let mut merged_end = end;
        for start in &touching {
            if let Some(existing) = self.sparse.get(start) {
                merged_start = merged_start.min(*start);
                merged_end = merged_end.max(extent_end(*start, existing));
            }
        }

        let mut merged = vec![0u8; to_index(merged_end - merged_start)?];
        for start in touching {
            if let Some(existing) = self.sparse.remove(&start) {
                let at = to_index(start - merged_start)?;
                merged[at..at + existing.len()].copy_from_slice(&existing);
            }
        }
        let at = to_index(offset - merged_start)?;
        merged[at..at + data.len()].copy_from_slice(data);
        self.sparse.insert(merged_start, Bytes::from(merged));
        Ok(data.len())
    }

    fn stream(&self, stream: usize) -> Result<&Vec<u8>, CacheError> {
        self.streams
            .get(stream)
            .ok_or(CacheError::InvalidArgument("no such stream"))
    }

    fn dense_write(
        &mut self,
        stream: usize,
        offset: usize,
        data: &[u8],
        truncate: bool,
    ) -> Result<usize, CacheError> {
        let buf = self
            .streams
            .get_mut(stream)
            .ok_or(CacheError::InvalidArgument("no such stream"))?;
        let end = offset
            .checked_add(data.len())
            .ok_or(CacheError::InvalidArgument("write past the addressable range"))?;
        if buf.len() < end {
            buf.resize(end, 0);
        }
        buf[offset..end].copy_from_slice(data);
        if truncate {
            buf.truncate(end);
        }
        Ok(data.len())
    }
}

impl SparseCacheStore for MemoryEntry {
    fn get_available_range(&mut self, offset: i64, len: i64) -> CacheOp<AvailableRange> {
        let result = self.available_range(offset, len);
        self.finish(result)
    }

    fn read_sparse(&mut self, offset: i64, len: usize) -> CacheOp<Bytes> {
        let result = self.sparse_read(offset, len);
        self.finish(result)
    }

    fn write_sparse(&mut self, offset: i64, data: Bytes) -> CacheOp<usize> {
        let result = self.sparse_write(offset, &data);
        self.finish(result)
    }

    fn read_data(&mut self, stream: usize, offset: usize, len: usize) -> CacheOp<Bytes> {
        let result = self.stream(stream).map(|buf| {
            let begin = offset.min(buf.len());
            let end = begin.saturating_add(len).min(buf.len());
            Bytes::copy_from_slice(&buf[begin..end])
        });
        self.finish(result)
    }

    fn write_data(
        &mut self,
        stream: usize,
        offset: usize,
        data: Bytes,
        truncate: bool,
    ) -> CacheOp<usize> {
        let result = self.dense_write(stream, offset, &data, truncate);
        self.finish(result)
    }

    fn data_size(&self, stream: usize) -> i64 {
        self.streams
            .get(stream)
            .map_or(0, |buf| i64::try_from(buf.len()).unwrap_or(i64::MAX))
    }

    fn could_be_sparse(&self) -> bool {
        self.sparse_capable
    }
}
