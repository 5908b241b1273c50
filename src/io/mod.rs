pub mod file_device;
pub mod mem_device;
pub mod sysfs;


// Re-exports
pub use file_device::FileDevice;
pub use mem_device::{IoOp, MemDevice};
pub use sysfs::{partition_size, queue_param};

use serde::{Deserialize, Serialize};
use std::path::Path;

/// What kind of object an open handle refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceKind {
    RegularFile,
    BlockDevice,
    Other,
}

/// The subset of `fstat` the preparation pipeline looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStat {
    pub kind: DeviceKind,
    /// File length; meaningless for block devices
    pub len: u64,
}

/// Low-level primitives on an open device handle.
///
/// All offsets and lengths are in bytes. Implementations must not seek: every
/// operation is positioned.
pub trait BlockIo: Send + Sync {
    /// Path the handle was opened from, used for diagnostics and sysfs lookups
    fn path(&self) -> &Path;

    fn stat(&self) -> std::io::Result<DeviceStat>;

    /// Size reported by the kernel for a block device (`BLKGETSIZE64`)
    fn kernel_size(&self) -> std::io::Result<u64>;

    /// Discard (TRIM) `[start, start + len)` in a single command
    fn discard(&self, start: u64, len: u64) -> std::io::Result<()>;

    fn write_at(&self, buf: &[u8], offset: u64) -> std::io::Result<usize>;

    fn read_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<usize>;

    /// Force written data to stable storage
    fn sync(&self) -> std::io::Result<()>;

    /// Reset the write pointer of the zone(s) covering `[start, start + len)`
    fn reset_zone_range(&self, start: u64, len: u64) -> std::io::Result<()>;

    fn display_path(&self) -> String {
        self.path().display().to_string()
    }
}

/// Size of the device in bytes, 0 when it cannot be determined.
///
/// Regular files report their length, block devices the kernel size; anything
/// else (character devices, pipes) has no usable size.
pub fn device_size(io: &dyn BlockIo, stat: &DeviceStat) -> u64 {
    match stat.kind {
        DeviceKind::RegularFile => stat.len,
        DeviceKind::BlockDevice => io.kernel_size().unwrap_or(0),
        DeviceKind::Other => 0,
    }
}

/// Partition size of an already open handle, 0 on failure
pub fn partition_size_of(io: &dyn BlockIo) -> u64 {
    io.kernel_size().unwrap_or(0)
}

/// Read until `buf` is full, EOF counts as an error
pub fn read_exact_at(io: &dyn BlockIo, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    let mut done = 0;
    while done < buf.len() {
        match io.read_at(&mut buf[done..], offset + done as u64) {
            Ok(0) => return Err(std::io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => done += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
