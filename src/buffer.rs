pub mod lru;
pub mod replacer;

use crate::disk::DiskManager;
use crate::error::{Error, Result};
use crate::hash::ExtendibleHashTable;
use crate::page::{Page, PageId, INVALID_PAGE_ID, PAGE_SIZE};
use crate::wal::WalManager;
use log::{debug, trace, warn};
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use replacer::{FrameId, Replacer};
use std::collections::VecDeque;
use std::sync::Arc;

/// Shared handle to a frame. The holder of a pin may read and write the
/// payload through the frame's lock; the pool guarantees the frame is not
/// evicted while pinned.
///
/// Release any payload guard before calling back into the pool for the same
/// page (`unpin_page`, `flush_page`): pool operations take the frame lock
/// themselves.
pub type PageRef = Arc<RwLock<Page>>;

/// Bucket capacity of the page table.
const PAGE_TABLE_BUCKET_SIZE: usize = 32;

/// A fixed-capacity cache of disk pages.
///
/// The pool owns `pool_size` frames created at construction and reused for
/// its whole lifetime. A page table (extendible hash) maps resident page ids
/// to frames, a free list holds never-used frames, and a replacer tracks
/// unpinned residents for eviction. Victims are taken from the free list
/// before the replacer is consulted.
///
/// Every public operation runs under one coarse latch, including the disk
/// I/O it issues. The manager is a cheap `Clone` handle over shared state.
#[derive(Clone)]
pub struct BufferPoolManager {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    frames: Vec<PageRef>,
    page_table: ExtendibleHashTable<PageId, FrameId>,
    replacer: Box<dyn Replacer>,
    latch: Mutex<PoolCore>,
    wal: Option<Arc<WalManager>>,
}

struct PoolCore {
    free_list: VecDeque<FrameId>,
    disk: DiskManager,
}

impl BufferPoolManager {
    /// Create a pool of `pool_size` frames over `disk`, with logging
    /// disabled.
    pub fn new(disk: DiskManager, replacer: Box<dyn Replacer>, pool_size: usize) -> Self {
        Self::build(disk, replacer, pool_size, None)
    }

    /// As [`BufferPoolManager::new`], but flushing `wal` before every
    /// dirty-page writeback.
    pub fn new_with_wal(
        disk: DiskManager,
        replacer: Box<dyn Replacer>,
        pool_size: usize,
        wal: Arc<WalManager>,
    ) -> Self {
        Self::build(disk, replacer, pool_size, Some(wal))
    }

    fn build(
        disk: DiskManager,
        replacer: Box<dyn Replacer>,
        pool_size: usize,
        wal: Option<Arc<WalManager>>,
    ) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                frames: (0..pool_size)
                    .map(|_| Arc::new(RwLock::new(Page::new())))
                    .collect(),
                page_table: ExtendibleHashTable::new(PAGE_TABLE_BUCKET_SIZE),
                replacer,
                latch: Mutex::new(PoolCore {
                    free_list: (0..pool_size).collect(),
                    disk,
                }),
                wal,
            }),
        }
    }

    /// Number of frames in the pool.
    pub fn pool_size(&self) -> usize {
        self.inner.frames.len()
    }

    /// Fetch `page_id` into the pool and pin it.
    ///
    /// A hit pins the resident frame. A miss evicts a victim (writing it back
    /// if dirty), reads the page from disk, and returns the frame with one
    /// pin. Fails with [`Error::PoolExhausted`] when every frame is pinned.
    pub fn fetch_page(&self, page_id: PageId) -> Result<PageRef> {
        if page_id == INVALID_PAGE_ID {
            return Err(Error::InvalidPageId);
        }
        let mut core = self.inner.latch.lock();

        if let Some(frame_id) = self.inner.page_table.find(&page_id) {
            let mut page = self.inner.frames[frame_id].write();
            let pin_count = page.pin_count() + 1;
            page.set_pin_count(pin_count);
            trace!("fetch hit: {} in frame {}", page_id, frame_id);
            drop(page);
            self.inner.replacer.erase(frame_id);
            return Ok(Arc::clone(&self.inner.frames[frame_id]));
        }

        let frame_id = self.acquire_victim(&mut core)?;
        let mut page = self.inner.frames[frame_id].write();

        if page.is_dirty() {
            if let Some(old_id) = page.page_id() {
                self.write_back(&mut core, old_id, page.data())?;
            }
        }
        if let Some(old_id) = page.page_id() {
            self.inner.page_table.remove(&old_id);
        }
        self.inner.replacer.erase(frame_id);

        page.reset();
        page.set_page_id(Some(page_id));
        page.set_pin_count(1);
        if let Err(err) = core.disk.read_page(page_id, page.data_mut()) {
            page.reset();
            core.free_list.push_back(frame_id);
            return Err(err);
        }
        drop(page);

        self.inner.page_table.insert(page_id, frame_id);
        trace!("fetch miss: {} into frame {}", page_id, frame_id);
        Ok(Arc::clone(&self.inner.frames[frame_id]))
    }

    /// Drop one pin on `page_id`, recording `is_dirty`.
    ///
    /// The dirty bit only accumulates: an unpin with `false` never clears a
    /// dirty frame. When the pin count reaches zero the frame becomes
    /// evictable.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<()> {
        let _core = self.inner.latch.lock();

        let frame_id = self
            .inner
            .page_table
            .find(&page_id)
            .ok_or(Error::PageNotCached(page_id))?;
        let mut page = self.inner.frames[frame_id].write();
        if page.pin_count() == 0 {
            return Err(Error::PageNotPinned(page_id));
        }

        let pin_count = page.pin_count() - 1;
        page.set_pin_count(pin_count);
        let dirty = page.is_dirty() | is_dirty;
        page.set_dirty(dirty);
        if page.pin_count() == 0 {
            self.inner.replacer.insert(frame_id);
            trace!("{} became evictable in frame {}", page_id, frame_id);
        }
        Ok(())
    }

    /// Write `page_id`'s payload to disk and clear its dirty bit. Pin state
    /// and replacer membership are untouched.
    pub fn flush_page(&self, page_id: PageId) -> Result<()> {
        if page_id == INVALID_PAGE_ID {
            return Err(Error::InvalidPageId);
        }
        let mut core = self.inner.latch.lock();

        let frame_id = self
            .inner
            .page_table
            .find(&page_id)
            .ok_or(Error::PageNotCached(page_id))?;
        let mut page = self.inner.frames[frame_id].write();
        self.write_back(&mut core, page_id, page.data())?;
        page.set_dirty(false);
        Ok(())
    }

    /// Write back every dirty resident page and clear its dirty bit.
    pub fn flush_all_pages(&self) -> Result<()> {
        let mut core = self.inner.latch.lock();

        for frame in &self.inner.frames {
            let mut page = frame.write();
            if page.is_dirty() {
                if let Some(page_id) = page.page_id() {
                    self.write_back(&mut core, page_id, page.data())?;
                    page.set_dirty(false);
                }
            }
        }
        Ok(())
    }

    /// Drop `page_id` from the pool and deallocate it on disk.
    ///
    /// Succeeds trivially when the page is not cached. Fails with
    /// [`Error::PagePinned`] while any pin is held. A dirty page is written
    /// back first so deallocation observes a quiescent page.
    pub fn delete_page(&self, page_id: PageId) -> Result<()> {
        let mut core = self.inner.latch.lock();

        let Some(frame_id) = self.inner.page_table.find(&page_id) else {
            return Ok(());
        };
        let mut page = self.inner.frames[frame_id].write();
        if page.pin_count() != 0 {
            return Err(Error::PagePinned(page_id));
        }

        if page.is_dirty() {
            self.write_back(&mut core, page_id, page.data())?;
        }
        self.inner.page_table.remove(&page_id);
        self.inner.replacer.erase(frame_id);
        core.disk.deallocate_page(page_id);

        page.reset();
        drop(page);
        core.free_list.push_back(frame_id);
        debug!("deleted {}, frame {} freed", page_id, frame_id);
        Ok(())
    }

    /// Allocate a fresh page on disk and pin it in a zeroed frame.
    pub fn new_page(&self) -> Result<(PageId, PageRef)> {
        let mut core = self.inner.latch.lock();

        let frame_id = self.acquire_victim(&mut core)?;
        let mut page = self.inner.frames[frame_id].write();

        if page.is_dirty() {
            if let Some(old_id) = page.page_id() {
                self.write_back(&mut core, old_id, page.data())?;
            }
        }
        if let Some(old_id) = page.page_id() {
            self.inner.page_table.remove(&old_id);
        }

        let page_id = match core.disk.allocate_page() {
            Ok(page_id) => page_id,
            Err(err) => {
                page.reset();
                core.free_list.push_back(frame_id);
                return Err(err);
            }
        };

        self.inner.page_table.insert(page_id, frame_id);
        page.reset();
        page.set_page_id(Some(page_id));
        page.set_pin_count(1);
        drop(page);

        trace!("new page {} in frame {}", page_id, frame_id);
        Ok((page_id, Arc::clone(&self.inner.frames[frame_id])))
    }

    /// Fetch `page_id` behind a guard that unpins on drop.
    pub fn fetch_page_guarded(&self, page_id: PageId) -> Result<PageGuard> {
        let page = self.fetch_page(page_id)?;
        Ok(PageGuard {
            pool: self.clone(),
            page,
            page_id,
            dirty: false,
        })
    }

    /// As [`BufferPoolManager::new_page`], behind a guard that unpins on
    /// drop.
    pub fn new_page_guarded(&self) -> Result<PageGuard> {
        let (page_id, page) = self.new_page()?;
        Ok(PageGuard {
            pool: self.clone(),
            page,
            page_id,
            dirty: false,
        })
    }

    /// Take a victim frame, preferring the free list over the replacer.
    fn acquire_victim(&self, core: &mut PoolCore) -> Result<FrameId> {
        if let Some(frame_id) = core.free_list.pop_front() {
            return Ok(frame_id);
        }
        let frame_id = self.inner.replacer.victim().ok_or(Error::PoolExhausted)?;
        debug!("evicting frame {}", frame_id);
        Ok(frame_id)
    }

    /// Persist one page image, flushing the log first so the image never
    /// reaches disk ahead of its records.
    fn write_back(
        &self,
        core: &mut PoolCore,
        page_id: PageId,
        data: &[u8; PAGE_SIZE],
    ) -> Result<()> {
        if let Some(wal) = &self.inner.wal {
            wal.flush()?;
        }
        core.disk.write_page(page_id, data)?;
        debug!("wrote back {}", page_id);
        Ok(())
    }
}

/// A pinned page that unpins itself on drop.
///
/// Payload access through [`PageGuard::write`] marks the guard dirty, so the
/// drop-time unpin reports the page as modified.
pub struct PageGuard {
    pool: BufferPoolManager,
    page: PageRef,
    page_id: PageId,
    dirty: bool,
}

impl PageGuard {
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Lock the frame for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, Page> {
        self.page.read()
    }

    /// Lock the frame for writing and mark the guard dirty.
    pub fn write(&mut self) -> RwLockWriteGuard<'_, Page> {
        self.dirty = true;
        self.page.write()
    }

    /// Mark the guard dirty without taking the write lock.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        if let Err(err) = self.pool.unpin_page(self.page_id, self.dirty) {
            warn!("unpin of {} on guard drop failed: {}", self.page_id, err);
        }
    }
}
