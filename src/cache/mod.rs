//! Cache-side plumbing for byte-range reconciliation
//!
//! The storage engine itself lives outside this crate. [`SparseCacheStore`]
//! is the interface it exposes; every operation reports through
//! [`CacheOp`], which is either ready, pending on a [`Completion`], or failed.

pub mod memory;
pub mod partial;

use hyper::body::Bytes;
use thiserror::Error;
use tokio::sync::oneshot;

pub use memory::MemoryEntry;
pub use partial::{CacheProbe, PartialData};

/// Stream holding the response body of a dense entry
pub const DATA_STREAM: usize = 1;

/// Errors reported by the cache layer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// Storage engine failure, carrying its (negative) status code
    #[error("cache storage failure (code {0})")]
    Storage(i32),

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("a cache operation is already in flight")]
    OperationInProgress,

    #[error("cache operation aborted before completion")]
    Aborted,
}

/// Why a request cannot be handled as a byte-range transaction
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("request has no Range header")]
    NotARangeRequest,

    #[error("unsupported Range header: {0}")]
    Unsupported(#[from] crate::http::ParseError),
}

/// Result of a cache operation that may finish later
#[derive(Debug)]
pub enum CacheOp<T> {
    Ready(T),
    Pending(PendingOp<T>),
    Failed(CacheError),
}

impl<T> CacheOp<T> {
    /// Wait for the outcome, however it is delivered.
    pub async fn resolve(self) -> Result<T, CacheError> {
        match self {
            Self::Ready(value) => Ok(value),
            Self::Pending(pending) => pending.wait().await,
            Self::Failed(err) => Err(err),
        }
    }

    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }
}

impl<T> From<Result<T, CacheError>> for CacheOp<T> {
    fn from(result: Result<T, CacheError>) -> Self {
        match result {
            Ok(value) => Self::Ready(value),
            Err(err) => Self::Failed(err),
        }
    }
}

/// Handle to an operation still running in the store
///
/// Dropping the handle cancels interest: the store's later completion is
/// discarded.
#[derive(Debug)]
pub struct PendingOp<T> {
    receiver: oneshot::Receiver<Result<T, CacheError>>,
}

impl<T> PendingOp<T> {
    pub async fn wait(self) -> Result<T, CacheError> {
        self.receiver.await.unwrap_or(Err(CacheError::Aborted))
    }

    /// Non-blocking poll; `None` while the operation is still running.
    pub fn try_take(&mut self) -> Option<Result<T, CacheError>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(CacheError::Aborted)),
        }
    }
}

/// Producer side of a [`PendingOp`], held by the store
#[derive(Debug)]
pub struct Completion<T> {
    sender: oneshot::Sender<Result<T, CacheError>>,
}

impl<T> Completion<T> {
    /// Deliver the outcome. Returns `false` if the consumer went away.
    pub fn complete(self, result: Result<T, CacheError>) -> bool {
        self.sender.send(result).is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        self.sender.is_closed()
    }
}

/// A linked completion/pending pair.
pub fn pending<T>() -> (Completion<T>, PendingOp<T>) {
    let (sender, receiver) = oneshot::channel();
    (Completion { sender }, PendingOp { receiver })
}

/// Contiguous cached extent reported by a sparse probe
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AvailableRange {
    pub start: i64,
    pub len: i64,
}

/// Storage engine interface consumed by [`PartialData`]
///
/// Offsets are absolute byte positions in the resource. Any method may
/// finish immediately or hand back a pending operation.
pub trait SparseCacheStore {
    /// First cached extent within `[offset, offset + len)`; `len == 0` when
    /// nothing there is cached.
    fn get_available_range(&mut self, offset: i64, len: i64) -> CacheOp<AvailableRange>;

    fn read_sparse(&mut self, offset: i64, len: usize) -> CacheOp<Bytes>;

    /// Returns the number of bytes written.
    fn write_sparse(&mut self, offset: i64, data: Bytes) -> CacheOp<usize>;

    fn read_data(&mut self, stream: usize, offset: usize, len: usize) -> CacheOp<Bytes>;

    /// Returns the number of bytes written; `truncate` drops anything past
    /// the end of the write.
    fn write_data(
        &mut self,
        stream: usize,
        offset: usize,
        data: Bytes,
        truncate: bool,
    ) -> CacheOp<usize>;

    fn data_size(&self, stream: usize) -> i64;

    /// Whether the entry can hold sparse data at all.
    fn could_be_sparse(&self) -> bool;
}
