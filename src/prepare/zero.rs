// Zero-fill of device regions
//
// Every zero-fill issued while preparing a device goes through a
// `RegionWriter`. Which writer is used is decided once from the zone
// information, so a direct write can never reach a sequential zone.

use crate::io::BlockIo;
use crate::units::SZ_1K;
use crate::zones::{reset_zone, zone_is_sequential, ZoneInfo};
use crate::{PrepError, PrepResult};

/// Disk labels live in the first KiB on SPARC and must survive
pub const RESERVED_HEADER_BYTES: u64 = SZ_1K;

/// Lower bound for zeroing on the current target
pub const fn default_reserved_floor() -> u64 {
    if cfg!(any(
        target_arch = "sparc",
        target_arch = "sparc64",
        feature = "reserve-disk-label"
    )) {
        RESERVED_HEADER_BYTES
    } else {
        0
    }
}

/// Write zeros to the given range [start, start + len).
///
/// One buffer, one positioned write: a short write is an error, nothing is
/// retried.
pub fn zero_blocks(io: &dyn BlockIo, start: u64, len: u64) -> PrepResult<()> {
    if len == 0 {
        return Ok(());
    }

    let size = usize::try_from(len).map_err(|_| PrepError::OutOfMemory { len })?;
    let mut buf = Vec::new();
    buf.try_reserve_exact(size)
        .map_err(|_| PrepError::OutOfMemory { len })?;
    buf.resize(size, 0u8);

    let written = io.write_at(&buf, start)?;
    if written != size {
        return Err(PrepError::ShortWrite {
            offset: start,
            written,
            expected: size,
        });
    }

    Ok(())
}

/// Clears a byte range on a device
pub trait RegionWriter {
    fn zero_range(&self, io: &dyn BlockIo, start: u64, len: u64) -> PrepResult<()>;

    fn name(&self) -> &'static str;
}

/// Plain overwrite, for devices without sequential zones
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectWriter;

impl RegionWriter for DirectWriter {
    fn zero_range(&self, io: &dyn BlockIo, start: u64, len: u64) -> PrepResult<()> {
        zero_blocks(io, start, len)
    }

    fn name(&self) -> &'static str {
        "direct"
    }
}

/// Walks the range zone by zone: conventional parts are overwritten, every
/// sequential zone touched is reset instead
#[derive(Debug, Clone, Copy)]
pub struct ZoneAwareWriter<'z> {
    zones: &'z ZoneInfo,
}

impl<'z> ZoneAwareWriter<'z> {
    pub fn new(zones: &'z ZoneInfo) -> Self {
        Self { zones }
    }
}

impl RegionWriter for ZoneAwareWriter<'_> {
    fn zero_range(&self, io: &dyn BlockIo, start: u64, len: u64) -> PrepResult<()> {
        let zone_size = self.zones.zone_size;
        if zone_size == 0 {
            return zero_blocks(io, start, len);
        }

        let mut offset = start;
        let mut remaining = len;

        while remaining > 0 {
            // Never let one write cross a zone boundary
            let count = remaining.min(zone_size - offset % zone_size);

            match self.zones.zone_at(offset) {
                Some(zone) if zone_is_sequential(Some(self.zones), offset) => {
                    reset_zone(io, zone)?
                }
                _ => zero_blocks(io, offset, count)?,
            }

            offset += count;
            remaining -= count;
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "zone-aware"
    }
}

/// Pick the writer for a device: host-managed zone layouts need the
/// zone-aware one, everything else is written directly
pub fn writer_for(zones: Option<&ZoneInfo>) -> Box<dyn RegionWriter + '_> {
    match zones {
        Some(info) if info.is_host_managed() => Box::new(ZoneAwareWriter::new(info)),
        _ => Box::new(DirectWriter),
    }
}

/// Zeroes ranges without ever writing past the usable size or below the
/// reserved floor
pub struct ClampedZeroer<'z> {
    writer: Box<dyn RegionWriter + 'z>,
    dev_size: u64,
    reserved_floor: u64,
}

impl<'z> ClampedZeroer<'z> {
    pub fn new(zones: Option<&'z ZoneInfo>, dev_size: u64) -> Self {
        Self {
            writer: writer_for(zones),
            dev_size,
            reserved_floor: default_reserved_floor(),
        }
    }

    pub fn with_reserved_floor(mut self, floor: u64) -> Self {
        self.reserved_floor = floor;
        self
    }

    pub fn writer_name(&self) -> &'static str {
        self.writer.name()
    }

    /// The range actually written for a request of `[start, start + len)`
    pub fn clamp(&self, start: u64, len: u64) -> (u64, u64) {
        let end = start.saturating_add(len);

        let start = start.max(self.reserved_floor).min(self.dev_size);
        let end = end.max(self.reserved_floor).min(self.dev_size);

        (start, end - start)
    }

    pub fn zero(&self, io: &dyn BlockIo, start: u64, len: u64) -> PrepResult<()> {
        let (start, len) = self.clamp(start, len);
        if len == 0 {
            return Ok(());
        }

        tracing::trace!(
            device = %io.display_path(),
            start,
            len,
            writer = self.writer.name(),
            "Zeroing region"
        );
        self.writer.zero_range(io, start, len)
    }
}
