/// Image files standing in for real devices
///
/// A mock device is a temporary regular file, either filled with a data
/// pattern to look used or sparse for multi-gigabyte sizes.
use devprep::FileDevice;
use std::io::{Seek, SeekFrom, Write};
use tempfile::NamedTempFile;

/// Byte the used-looking images are filled with
pub const USED_PATTERN: u8 = 0xAB;

pub struct MockDevice {
    pub temp_file: NamedTempFile,
    size: u64,
}

impl MockDevice {
    /// A `size_mb` image filled with [`USED_PATTERN`]
    pub fn used(size_mb: u64) -> std::io::Result<Self> {
        let mut temp_file = NamedTempFile::new()?;

        let size = size_mb * 1024 * 1024;
        let chunk = vec![USED_PATTERN; 1024 * 1024];
        for _ in 0..size_mb {
            temp_file.write_all(&chunk)?;
        }

        temp_file.flush()?;
        temp_file.seek(SeekFrom::Start(0))?;

        Ok(Self { temp_file, size })
    }

    /// A sparse image of `size` bytes that reads back as zeros
    #[allow(dead_code)]
    pub fn sparse(size: u64) -> std::io::Result<Self> {
        let temp_file = NamedTempFile::new()?;
        temp_file.as_file().set_len(size)?;

        Ok(Self { temp_file, size })
    }

    pub fn path(&self) -> &std::path::Path {
        self.temp_file.path()
    }

    pub fn size_bytes(&self) -> u64 {
        self.size
    }

    /// Overwrite bytes at `offset`, e.g. to plant a signature
    #[allow(dead_code)]
    pub fn plant(&self, offset: u64, data: &[u8]) -> std::io::Result<()> {
        use std::os::unix::fs::FileExt;
        self.temp_file.as_file().write_all_at(data, offset)
    }

    /// Open the image read-write
    pub fn open(&self) -> std::io::Result<FileDevice> {
        FileDevice::open(self.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_used_device_size() {
        let mock = MockDevice::used(2).unwrap();
        assert_eq!(mock.size_bytes(), 2 * 1024 * 1024);
        assert_eq!(std::fs::metadata(mock.path()).unwrap().len(), 2 * 1024 * 1024);
    }
}
