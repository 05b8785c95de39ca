use crate::error::Result;
use crate::page::{PageId, PAGE_SIZE};
use log::debug;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Manages page-granular I/O against a single database file.
///
/// Page `i` occupies bytes `[i * PAGE_SIZE, (i + 1) * PAGE_SIZE)` of the file.
/// Deallocated page ids are remembered and handed out again by
/// [`DiskManager::allocate_page`] before the file is extended.
pub struct DiskManager {
    file: File,
    free_ids: Vec<PageId>,
}

impl DiskManager {
    /// Create a new database file, truncating any existing one.
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            file,
            free_ids: Vec::new(),
        })
    }

    /// Open an existing database file.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        Ok(Self {
            file,
            free_ids: Vec::new(),
        })
    }

    /// Read a page's contents into `buf`, which must be exactly `PAGE_SIZE`
    /// bytes.
    pub fn read_page(&mut self, page_id: PageId, buf: &mut [u8]) -> Result<()> {
        if buf.len() != PAGE_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("buffer size must be {}, got {}", PAGE_SIZE, buf.len()),
            )
            .into());
        }

        let offset = Self::page_offset(page_id);
        let file_size = self.file.metadata()?.len();
        if offset >= file_size {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("page {} does not exist", page_id.0),
            )
            .into());
        }

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    /// Persist `data` under `page_id`, extending the file if necessary.
    pub fn write_page(&mut self, page_id: PageId, data: &[u8]) -> Result<()> {
        if data.len() != PAGE_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("data size must be {}, got {}", PAGE_SIZE, data.len()),
            )
            .into());
        }

        let offset = Self::page_offset(page_id);
        let file_size = self.file.metadata()?.len();
        if offset >= file_size {
            self.file.set_len(offset + PAGE_SIZE as u64)?;
        }

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Hand out a fresh page id, reusing a deallocated one if available.
    pub fn allocate_page(&mut self) -> Result<PageId> {
        if let Some(page_id) = self.free_ids.pop() {
            debug!("reusing deallocated page {}", page_id);
            return Ok(page_id);
        }

        let page_id = PageId(self.num_pages()?);
        self.file
            .set_len((page_id.0 as u64 + 1) * PAGE_SIZE as u64)?;
        debug!("allocated page {}", page_id);
        Ok(page_id)
    }

    /// Release a page id for reuse. The backing bytes are retained until the
    /// id is allocated again.
    pub fn deallocate_page(&mut self, page_id: PageId) {
        debug!("deallocated page {}", page_id);
        self.free_ids.push(page_id);
    }

    /// Number of page slots currently backed by the file.
    pub fn num_pages(&self) -> Result<u32> {
        let file_size = self.file.metadata()?.len();
        Ok((file_size / PAGE_SIZE as u64) as u32)
    }

    fn page_offset(page_id: PageId) -> u64 {
        page_id.0 as u64 * PAGE_SIZE as u64
    }
}
