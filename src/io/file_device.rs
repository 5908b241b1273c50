// File and block device backend

use super::{BlockIo, DeviceKind, DeviceStat};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::{FileExt, FileTypeExt};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

const SECTOR_SHIFT: u32 = 9;

mod ioctl {
    use nix::{ioctl_read, ioctl_write_ptr, ioctl_write_ptr_bad, request_code_none};

    /// `struct blk_zone_range` from linux/blkzoned.h, in 512 byte sectors
    #[repr(C)]
    pub struct BlkZoneRange {
        pub sector: u64,
        pub nr_sectors: u64,
    }

    // BLKGETSIZE64 = _IOR(0x12, 114, size_t)
    ioctl_read!(blk_getsize64, 0x12, 114, u64);

    // BLKDISCARD = _IO(0x12, 119) but takes a pointer to { start, len }
    ioctl_write_ptr_bad!(blk_discard, request_code_none!(0x12, 119), [u64; 2]);

    // BLKRESETZONE = _IOW(0x12, 131, struct blk_zone_range)
    ioctl_write_ptr!(blk_reset_zone, 0x12, 131, BlkZoneRange);
}

/// Kernel-reported size of an open block device
pub(crate) fn kernel_size_of(file: &File) -> std::io::Result<u64> {
    let mut size = 0u64;
    // SAFETY: `size` is a valid u64 the ioctl writes into
    unsafe { ioctl::blk_getsize64(file.as_raw_fd(), &mut size) }?;
    Ok(size)
}

/// A real file or block device opened read-write
#[derive(Debug)]
pub struct FileDevice {
    file: File,
    path: PathBuf,
}

impl FileDevice {
    /// Open `path` for reading and writing
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        Ok(Self::from_file(file, path))
    }

    /// Open `path` for inspection only; every write fails with `EBADF`
    pub fn open_read_only(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;

        Ok(Self::from_file(file, path))
    }

    /// Wrap a handle the caller already opened
    pub fn from_file(file: File, path: impl Into<PathBuf>) -> Self {
        Self {
            file,
            path: path.into(),
        }
    }
}

impl BlockIo for FileDevice {
    fn path(&self) -> &Path {
        &self.path
    }

    fn stat(&self) -> std::io::Result<DeviceStat> {
        let metadata = self.file.metadata()?;
        let file_type = metadata.file_type();

        let kind = if file_type.is_file() {
            DeviceKind::RegularFile
        } else if file_type.is_block_device() {
            DeviceKind::BlockDevice
        } else {
            DeviceKind::Other
        };

        Ok(DeviceStat {
            kind,
            len: metadata.len(),
        })
    }

    fn kernel_size(&self) -> std::io::Result<u64> {
        kernel_size_of(&self.file)
    }

    fn discard(&self, start: u64, len: u64) -> std::io::Result<()> {
        let range = [start, len];
        // SAFETY: `range` outlives the call and matches the kernel's u64[2]
        unsafe { ioctl::blk_discard(self.file.as_raw_fd(), &range) }?;
        Ok(())
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> std::io::Result<usize> {
        // pwrite, no seeking
        self.file.write_at(buf, offset)
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
        self.file.read_at(buf, offset)
    }

    fn sync(&self) -> std::io::Result<()> {
        self.file.sync_all()
    }

    fn reset_zone_range(&self, start: u64, len: u64) -> std::io::Result<()> {
        let range = ioctl::BlkZoneRange {
            sector: start >> SECTOR_SHIFT,
            nr_sectors: len >> SECTOR_SHIFT,
        };
        // SAFETY: `range` is a properly laid out blk_zone_range
        unsafe { ioctl::blk_reset_zone(self.file.as_raw_fd(), &range) }?;
        Ok(())
    }
}
