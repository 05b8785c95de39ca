use super::Lsn;
use crate::error::Result;
use log::debug;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Append-only write-ahead log.
///
/// Records are buffered in memory by [`WalManager::append`] and made durable
/// by [`WalManager::flush`]. The buffer pool flushes the log before writing
/// any dirty page back, so no page image reaches disk ahead of the log
/// records describing it.
///
/// Record framing on disk: an 8-byte LSN, a 4-byte payload length, then the
/// payload, all little-endian.
pub struct WalManager {
    inner: Mutex<WalInner>,
}

struct WalInner {
    file: File,
    /// Records appended but not yet durable.
    buffer: Vec<u8>,
    next_lsn: Lsn,
    flushed_lsn: Lsn,
}

impl WalManager {
    /// Create a new log file, truncating any existing one.
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            inner: Mutex::new(WalInner {
                file,
                buffer: Vec::new(),
                next_lsn: 1,
                flushed_lsn: 0,
            }),
        })
    }

    /// Buffer a record, returning its assigned LSN. The record is not durable
    /// until [`WalManager::flush`] returns.
    pub fn append(&self, payload: &[u8]) -> Result<Lsn> {
        let mut inner = self.inner.lock();
        let lsn = inner.next_lsn;
        inner.next_lsn += 1;

        inner.buffer.extend_from_slice(&lsn.to_le_bytes());
        inner
            .buffer
            .extend_from_slice(&(payload.len() as u32).to_le_bytes());
        inner.buffer.extend_from_slice(payload);
        Ok(lsn)
    }

    /// Persist all buffered records and sync the file.
    pub fn flush(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.buffer.is_empty() {
            let buffer = std::mem::take(&mut inner.buffer);
            inner.file.write_all(&buffer)?;
            inner.file.sync_all()?;
            debug!("flushed {} bytes of log", buffer.len());
        }
        inner.flushed_lsn = inner.next_lsn - 1;
        Ok(())
    }

    /// Highest LSN known durable.
    pub fn flushed_lsn(&self) -> Lsn {
        self.inner.lock().flushed_lsn
    }
}
