// Built-in magic table probe
//
// Checks a fixed list of well-known superblock magics in priority order (RAID
// and volume managers before the filesystems they may contain) and reports
// the first one present.

use super::{Signature, SignatureProbe};
use crate::io::{device_size, BlockIo};
use crate::{PrepError, PrepResult};

/// A magic string at a fixed byte offset from the start of the device
#[derive(Debug, Clone, Copy)]
pub struct MagicEntry {
    pub name: &'static str,
    pub offset: u64,
    pub magic: &'static [u8],
}

const fn entry(name: &'static str, offset: u64, magic: &'static [u8]) -> MagicEntry {
    MagicEntry {
        name,
        offset,
        magic,
    }
}

pub const KNOWN_MAGICS: &[MagicEntry] = &[
    // md superblock 1.1 at the start, 1.2 at 4 KiB
    entry("linux_raid_member", 0, &[0xfc, 0x4e, 0x2b, 0xa9]),
    entry("linux_raid_member", 4096, &[0xfc, 0x4e, 0x2b, 0xa9]),
    entry("LVM2_member", 512 + 24, b"LVM2 001"),
    entry("crypto_LUKS", 0, b"LUKS\xba\xbe"),
    entry(
        "bcache",
        4096 + 24,
        &[
            0xc6, 0x85, 0x73, 0xf6, 0x4e, 0x1a, 0x45, 0xca, 0x82, 0x65, 0xf5, 0x7f, 0x48, 0xba,
            0x6d, 0x81,
        ],
    ),
    entry("btrfs", 65536 + 64, b"_BHRfS_M"),
    entry("xfs", 0, b"XFSB"),
    entry("ext4", 1024 + 56, &[0x53, 0xef]),
    entry("f2fs", 1024, &[0x10, 0x20, 0xf5, 0xf2]),
    entry("swap", 4096 - 10, b"SWAPSPACE2"),
    entry("swap", 4096 - 10, b"SWAP-SPACE"),
    entry("iso9660", 32769, b"CD001"),
    entry("ntfs", 3, b"NTFS    "),
    entry("vfat", 82, b"FAT32   "),
    entry("vfat", 54, b"FAT16   "),
    entry("vfat", 54, b"FAT12   "),
    entry("gpt", 512, b"EFI PART"),
];

/// Probe backed by [`KNOWN_MAGICS`]
#[derive(Debug, Clone, Copy, Default)]
pub struct MagicProbe;

impl MagicProbe {
    fn matches(io: &dyn BlockIo, entry: &MagicEntry, size: u64) -> PrepResult<bool> {
        let len = entry.magic.len() as u64;
        if entry.offset + len > size {
            return Ok(false);
        }

        let mut buf = vec![0u8; entry.magic.len()];
        let read = io
            .read_at(&mut buf, entry.offset)
            .map_err(|e| PrepError::Probe {
                path: io.display_path(),
                reason: format!("read at offset {} failed: {}", entry.offset, e),
            })?;

        Ok(read == buf.len() && buf == entry.magic)
    }
}

impl SignatureProbe for MagicProbe {
    fn probe(&self, io: &dyn BlockIo) -> PrepResult<Option<Signature>> {
        let stat = io.stat().map_err(|e| PrepError::Probe {
            path: io.display_path(),
            reason: format!("stat failed: {}", e),
        })?;
        let size = device_size(io, &stat);

        for entry in KNOWN_MAGICS {
            if Self::matches(io, entry, size)? {
                tracing::debug!(
                    device = %io.display_path(),
                    signature = entry.name,
                    offset = entry.offset,
                    "Found signature"
                );
                return Ok(Some(Signature {
                    name: entry.name.to_string(),
                    offset: entry.offset,
                    len: entry.magic.len() as u64,
                }));
            }
        }

        Ok(None)
    }
}
