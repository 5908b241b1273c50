// In-memory device backend
//
// Sparse: only pages that were written with non-zero data are stored, so a
// multi-gigabyte device costs nothing until it is written. Every primitive is
// recorded in an operation log and most of them can be made to fail, which is
// what the pipeline tests use to check ordering and failure handling.

use super::{BlockIo, DeviceKind, DeviceStat};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const PAGE_SIZE: u64 = 4096;

/// One primitive issued against a [`MemDevice`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOp {
    Discard { start: u64, len: u64 },
    Write { offset: u64, len: u64 },
    ResetZone { start: u64, len: u64 },
    Sync,
}

#[derive(Debug, Default)]
struct MemState {
    pages: BTreeMap<u64, Box<[u8]>>,
    ops: Vec<IoOp>,
    discards_done: usize,
}

impl MemState {
    fn write_bytes(&mut self, offset: u64, data: &[u8]) {
        let mut pos = 0usize;
        while pos < data.len() {
            let abs = offset + pos as u64;
            let page = abs / PAGE_SIZE;
            let in_page = (abs % PAGE_SIZE) as usize;
            let count = (PAGE_SIZE as usize - in_page).min(data.len() - pos);
            let chunk = &data[pos..pos + count];

            if let Some(existing) = self.pages.get_mut(&page) {
                existing[in_page..in_page + count].copy_from_slice(chunk);
            } else if chunk.iter().any(|&b| b != 0) {
                let mut fresh = vec![0u8; PAGE_SIZE as usize].into_boxed_slice();
                fresh[in_page..in_page + count].copy_from_slice(chunk);
                self.pages.insert(page, fresh);
            }

            pos += count;
        }
    }

    fn read_bytes(&self, offset: u64, buf: &mut [u8]) {
        let mut pos = 0usize;
        while pos < buf.len() {
            let abs = offset + pos as u64;
            let page = abs / PAGE_SIZE;
            let in_page = (abs % PAGE_SIZE) as usize;
            let count = (PAGE_SIZE as usize - in_page).min(buf.len() - pos);

            match self.pages.get(&page) {
                Some(existing) => {
                    buf[pos..pos + count].copy_from_slice(&existing[in_page..in_page + count])
                }
                None => buf[pos..pos + count].fill(0),
            }

            pos += count;
        }
    }

    /// Make `[start, start + len)` read back as zeros
    fn clear_range(&mut self, start: u64, len: u64) {
        if len == 0 {
            return;
        }
        let end = start + len;
        let first = start / PAGE_SIZE;
        let last = (end - 1) / PAGE_SIZE;

        let touched: Vec<u64> = self.pages.range(first..=last).map(|(k, _)| *k).collect();
        for page in touched {
            let page_start = page * PAGE_SIZE;
            let page_end = page_start + PAGE_SIZE;
            if start <= page_start && end >= page_end {
                self.pages.remove(&page);
            } else if let Some(existing) = self.pages.get_mut(&page) {
                let from = start.max(page_start) - page_start;
                let to = end.min(page_end) - page_start;
                existing[from as usize..to as usize].fill(0);
            }
        }
    }
}

/// Sparse in-memory block device with an operation log and fault injection
#[derive(Debug)]
pub struct MemDevice {
    path: PathBuf,
    kind: DeviceKind,
    size: u64,
    discard_supported: bool,
    fail_discard_after: Option<usize>,
    fail_writes: bool,
    short_writes: bool,
    fail_zone_reset: bool,
    fail_stat: bool,
    fail_sync: bool,
    state: Mutex<MemState>,
}

impl MemDevice {
    fn new(path: impl Into<PathBuf>, kind: DeviceKind, size: u64) -> Self {
        Self {
            path: path.into(),
            kind,
            size,
            discard_supported: true,
            fail_discard_after: None,
            fail_writes: false,
            short_writes: false,
            fail_zone_reset: false,
            fail_stat: false,
            fail_sync: false,
            state: Mutex::new(MemState::default()),
        }
    }

    /// A device that stats as a regular file of `size` bytes
    pub fn regular_file(path: impl Into<PathBuf>, size: u64) -> Self {
        Self::new(path, DeviceKind::RegularFile, size)
    }

    /// A device that stats as a block device reporting `size` bytes
    pub fn block_device(path: impl Into<PathBuf>, size: u64) -> Self {
        Self::new(path, DeviceKind::BlockDevice, size)
    }

    /// A handle that is neither a regular file nor a block device
    pub fn character_device(path: impl Into<PathBuf>) -> Self {
        Self::new(path, DeviceKind::Other, 0)
    }

    /// Reject every discard, including the zero-length capability probe
    pub fn without_discard(mut self) -> Self {
        self.discard_supported = false;
        self
    }

    /// Accept `count` non-empty discards, fail every one after that
    pub fn fail_discard_after(mut self, count: usize) -> Self {
        self.fail_discard_after = Some(count);
        self
    }

    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    /// Every write stores only the first half of the buffer
    pub fn short_writes(mut self) -> Self {
        self.short_writes = true;
        self
    }

    pub fn failing_zone_reset(mut self) -> Self {
        self.fail_zone_reset = true;
        self
    }

    pub fn failing_stat(mut self) -> Self {
        self.fail_stat = true;
        self
    }

    pub fn failing_sync(mut self) -> Self {
        self.fail_sync = true;
        self
    }

    fn lock(&self) -> MutexGuard<'_, MemState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seed device content without going through the operation log
    pub fn fill(&self, offset: u64, data: &[u8]) {
        self.lock().write_bytes(offset, data);
    }

    /// Copy `len` bytes of device content starting at `offset`
    pub fn contents(&self, offset: u64, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        self.lock().read_bytes(offset, &mut buf);
        buf
    }

    pub fn is_zeroed(&self, offset: u64, len: usize) -> bool {
        self.contents(offset, len).iter().all(|&b| b == 0)
    }

    pub fn ops(&self) -> Vec<IoOp> {
        self.lock().ops.clone()
    }

    /// Discards with a non-zero length, as `(start, len)`
    pub fn discards(&self) -> Vec<(u64, u64)> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                IoOp::Discard { start, len } if len > 0 => Some((start, len)),
                _ => None,
            })
            .collect()
    }

    pub fn writes(&self) -> Vec<(u64, u64)> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                IoOp::Write { offset, len } => Some((offset, len)),
                _ => None,
            })
            .collect()
    }

    pub fn zone_resets(&self) -> Vec<(u64, u64)> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                IoOp::ResetZone { start, len } => Some((start, len)),
                _ => None,
            })
            .collect()
    }

    fn check_range(&self, start: u64, len: u64) -> std::io::Result<()> {
        match start.checked_add(len) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(std::io::Error::from_raw_os_error(libc::EINVAL)),
        }
    }
}

impl BlockIo for MemDevice {
    fn path(&self) -> &Path {
        &self.path
    }

    fn stat(&self) -> std::io::Result<DeviceStat> {
        if self.fail_stat {
            return Err(std::io::Error::from_raw_os_error(libc::EBADF));
        }

        let len = match self.kind {
            DeviceKind::RegularFile => self.size,
            _ => 0,
        };
        Ok(DeviceStat {
            kind: self.kind,
            len,
        })
    }

    fn kernel_size(&self) -> std::io::Result<u64> {
        match self.kind {
            DeviceKind::BlockDevice => Ok(self.size),
            _ => Err(std::io::Error::from_raw_os_error(libc::ENOTTY)),
        }
    }

    fn discard(&self, start: u64, len: u64) -> std::io::Result<()> {
        if !self.discard_supported {
            return Err(std::io::Error::from_raw_os_error(libc::EOPNOTSUPP));
        }
        self.check_range(start, len)?;

        let mut state = self.lock();
        state.ops.push(IoOp::Discard { start, len });
        if len == 0 {
            return Ok(());
        }
        if let Some(limit) = self.fail_discard_after {
            if state.discards_done >= limit {
                return Err(std::io::Error::from_raw_os_error(libc::EIO));
            }
        }

        state.discards_done += 1;
        state.clear_range(start, len);
        Ok(())
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> std::io::Result<usize> {
        if self.fail_writes {
            return Err(std::io::Error::from_raw_os_error(libc::EIO));
        }
        if offset >= self.size {
            return Err(std::io::Error::from_raw_os_error(libc::ENOSPC));
        }

        let available = (self.size - offset).min(buf.len() as u64) as usize;
        let count = if self.short_writes {
            available / 2
        } else {
            available
        };

        let mut state = self.lock();
        state.ops.push(IoOp::Write {
            offset,
            len: count as u64,
        });
        state.write_bytes(offset, &buf[..count]);
        Ok(count)
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
        if offset >= self.size {
            return Ok(0);
        }

        let count = (self.size - offset).min(buf.len() as u64) as usize;
        self.lock().read_bytes(offset, &mut buf[..count]);
        Ok(count)
    }

    fn sync(&self) -> std::io::Result<()> {
        if self.fail_sync {
            return Err(std::io::Error::from_raw_os_error(libc::EIO));
        }
        self.lock().ops.push(IoOp::Sync);
        Ok(())
    }

    fn reset_zone_range(&self, start: u64, len: u64) -> std::io::Result<()> {
        if self.fail_zone_reset {
            return Err(std::io::Error::from_raw_os_error(libc::EIO));
        }
        self.check_range(start, len)?;

        let mut state = self.lock();
        state.ops.push(IoOp::ResetZone { start, len });
        state.clear_range(start, len);
        Ok(())
    }
}
