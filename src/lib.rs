//! Page cache core: buffer pool manager, extendible hash page table, LRU
//! replacement.

pub mod buffer;
pub mod disk;
pub mod error;
pub mod hash;
pub mod page;
pub mod wal;

pub use buffer::lru::LruReplacer;
pub use buffer::replacer::{FrameId, Replacer};
pub use buffer::{BufferPoolManager, PageGuard, PageRef};
pub use disk::DiskManager;
pub use error::{Error, Result};
pub use hash::ExtendibleHashTable;
pub use page::{Page, PageId, INVALID_PAGE_ID, PAGE_SIZE};
pub use wal::{Lsn, WalManager};
