// Partition size and request-queue parameter lookups

use super::file_device::kernel_size_of;
use std::fs::{self, File};
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::{Path, PathBuf};

/// Read the partition size of `path` with `BLKGETSIZE64`, 0 on any failure
pub fn partition_size(path: impl AsRef<Path>) -> u64 {
    let file = match File::open(path.as_ref()) {
        Ok(file) => file,
        Err(_) => return 0,
    };

    kernel_size_of(&file).unwrap_or(0)
}

/// Sysfs directory of the whole disk `path` belongs to.
///
/// Partitions are resolved to their parent disk since only the disk has a
/// `queue/` directory.
pub(crate) fn whole_disk_dir(path: &Path) -> std::io::Result<PathBuf> {
    let metadata = fs::metadata(path)?;
    if !metadata.file_type().is_block_device() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} is not a block device", path.display()),
        ));
    }

    let rdev = metadata.rdev();
    let dev_dir = PathBuf::from(format!(
        "/sys/dev/block/{}:{}",
        nix::sys::stat::major(rdev),
        nix::sys::stat::minor(rdev)
    ));
    let dev_dir = fs::canonicalize(dev_dir)?;

    if dev_dir.join("partition").exists() {
        if let Some(parent) = dev_dir.parent() {
            return Ok(parent.to_path_buf());
        }
    }

    Ok(dev_dir)
}

/// Read `/sys/block/<disk>/queue/<param>` for the disk `path` lives on.
///
/// Returns `None` when the device, the disk or the parameter cannot be
/// resolved. The value is returned trimmed.
pub fn queue_param(path: impl AsRef<Path>, param: &str) -> Option<String> {
    let disk = whole_disk_dir(path.as_ref()).ok()?;
    let value = fs::read_to_string(disk.join("queue").join(param)).ok()?;

    Some(value.trim().to_string())
}
