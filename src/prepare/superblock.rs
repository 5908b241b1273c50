// Superblock mirror locations
//
// The primary superblock sits at 64 KiB, the copies at 16 KiB shifted left by
// 12 bits per mirror: 64 MiB and 256 GiB. Stale copies at any of these offsets
// make a device look like an existing filesystem member.

use crate::units::{SZ_16K, SZ_4K, SZ_64K};

/// Bytes reserved for each superblock copy
pub const SUPER_INFO_SIZE: u64 = SZ_4K;

pub const SUPER_MIRROR_MAX: usize = 3;

const SUPER_MIRROR_SHIFT: usize = 12;

/// Byte offset of superblock copy `mirror`
pub const fn sb_offset(mirror: usize) -> u64 {
    if mirror > 0 {
        SZ_16K << (SUPER_MIRROR_SHIFT * mirror)
    } else {
        SZ_64K
    }
}

/// Every superblock slot, in ascending order
pub const SUPER_MIRROR_OFFSETS: [u64; SUPER_MIRROR_MAX] = [sb_offset(0), sb_offset(1), sb_offset(2)];
