#![allow(dead_code)]
//! Common test helper functions

use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::Path;

/// Read `len` bytes at `offset` from an image file
pub fn read_region(path: &Path, offset: u64, len: usize) -> std::io::Result<Vec<u8>> {
    let file = File::open(path)?;
    let mut buffer = vec![0u8; len];
    file.read_exact_at(&mut buffer, offset)?;
    Ok(buffer)
}

/// Verify that a region contains only zeros
pub fn region_is_zeroed(path: &Path, offset: u64, len: usize) -> std::io::Result<bool> {
    Ok(read_region(path, offset, len)?.iter().all(|&b| b == 0))
}

/// Verify that a region contains only `byte`
pub fn region_is_filled(path: &Path, offset: u64, len: usize, byte: u8) -> std::io::Result<bool> {
    Ok(read_region(path, offset, len)?.iter().all(|&b| b == byte))
}
