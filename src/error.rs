//! Page cache error types.

use crate::page::PageId;
use thiserror::Error;

/// Errors that can occur in the page cache.
///
/// Apart from [`Error::Io`], every variant is an expected outcome of normal
/// operation rather than a fault: callers race for a bounded pool and probe
/// for pages that may not be cached.
#[derive(Error, Debug)]
pub enum Error {
    #[error("buffer pool exhausted: all frames are pinned")]
    PoolExhausted,

    #[error("invalid page id")]
    InvalidPageId,

    #[error("page {0} is not in the buffer pool")]
    PageNotCached(PageId),

    #[error("page {0} is pinned and cannot be deleted")]
    PagePinned(PageId),

    #[error("page {0} is not pinned")]
    PageNotPinned(PageId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for page cache operations.
pub type Result<T> = std::result::Result<T, Error>;
