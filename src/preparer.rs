// Device preparer - runs the fixed preparation protocol on an open device
//
// Sizes the device, resets zones or discards, clears the header, the
// superblock mirrors and optionally the tail, then removes any signature a
// probe still finds. The caller keeps ownership of the handle.

use crate::io::{device_size, BlockIo};
use crate::prepare::{
    default_reserved_floor, ChunkedEraser, ClampedZeroer, SignatureWiper, WipeOutcome,
    SUPER_INFO_SIZE, SUPER_MIRROR_OFFSETS,
};
use crate::probe::{MagicProbe, SignatureProbe};
use crate::units::{pretty_size, SZ_2M};
use crate::zones::{reset_all_zones, SysfsZoneReporter, ZoneInfo, ZoneReporter};
use crate::{PrepError, PrepFlags, PrepResult};
use serde::Serialize;

/// Bytes cleared at the start and, with `zero_end`, at the end of the device
pub const ZERO_DEV_BYTES: u64 = SZ_2M;

/// What happened to the full-device discard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardOutcome {
    NotRequested,
    /// The zero-length probe was rejected
    Unsupported,
    Completed { chunks: u64 },
    /// A chunk failed; the remaining chunks were not issued
    Failed,
}

/// Result of a successful preparation
#[derive(Debug, Clone, Serialize)]
pub struct PrepReport {
    pub device: String,
    /// Size as reported by the device
    pub device_size: u64,
    /// Size after applying the caller maximum
    pub usable_bytes: u64,
    pub zoned: bool,
    pub zones_reset: Option<usize>,
    pub discard: DiscardOutcome,
    pub signature: WipeOutcome,
}

pub struct DevicePreparer<'a> {
    zone_reporter: &'a dyn ZoneReporter,
    probe: &'a dyn SignatureProbe,
    reserved_floor: u64,
}

impl<'a> DevicePreparer<'a> {
    pub fn new(zone_reporter: &'a dyn ZoneReporter, probe: &'a dyn SignatureProbe) -> Self {
        Self {
            zone_reporter,
            probe,
            reserved_floor: default_reserved_floor(),
        }
    }

    /// Bytes at the start of the device that are never written
    pub fn with_reserved_floor(mut self, floor: u64) -> Self {
        self.reserved_floor = floor;
        self
    }

    /// Prepare `io` for a new filesystem.
    ///
    /// `max_bytes` caps the usable size; `None` or `Some(0)` use the whole
    /// device. Every failure is fatal and no size is returned with it.
    pub fn prepare(
        &self,
        io: &dyn BlockIo,
        max_bytes: Option<u64>,
        flags: PrepFlags,
    ) -> PrepResult<PrepReport> {
        let device = io.display_path();

        let stat = io.stat().map_err(|source| PrepError::Stat {
            path: device.clone(),
            source,
        })?;

        let dev_size = device_size(io, &stat);
        if dev_size == 0 {
            return Err(PrepError::UnknownSize { path: device });
        }

        let usable = match max_bytes {
            Some(max) if max > 0 && max < dev_size => max,
            _ => dev_size,
        };

        tracing::info!(
            device = %device,
            device_size = dev_size,
            usable,
            zoned = flags.zoned,
            discard = flags.wants_discard(),
            "Preparing device"
        );

        let mut zones: Option<ZoneInfo> = None;
        let mut zones_reset = None;
        let mut discard = DiscardOutcome::NotRequested;

        if flags.zoned {
            let mut info = self
                .zone_reporter
                .load_zone_info(io)?
                .ok_or_else(|| PrepError::ZoneInfo {
                    path: device.clone(),
                    reason: "device is not zoned".to_string(),
                })?;

            if flags.verbose {
                println!(
                    "Resetting device zones {} ({} zones) ...",
                    device,
                    info.nr_zones()
                );
            }
            zones_reset = Some(reset_all_zones(io, &mut info)?);
            zones = Some(info);
        } else if flags.discard {
            discard = self.discard_device(io, usable, flags.verbose);
        }

        let zeroer = ClampedZeroer::new(zones.as_ref(), usable)
            .with_reserved_floor(self.reserved_floor);
        tracing::debug!(device = %device, writer = zeroer.writer_name(), "Selected region writer");

        Self::clear_metadata(io, &zeroer, usable, flags.zero_end).map_err(|source| {
            PrepError::ZeroFill {
                path: device.clone(),
                source: Box::new(source),
            }
        })?;

        let signature = SignatureWiper::new(self.probe).wipe(io, zones.as_ref(), usable)?;
        if flags.verbose {
            if let WipeOutcome::Wiped(sig) = &signature {
                println!(
                    "Wiped {} signature at offset {} on {}",
                    sig.name, sig.offset, device
                );
            }
        }

        tracing::info!(device = %device, usable, "Device prepared");

        Ok(PrepReport {
            device,
            device_size: dev_size,
            usable_bytes: usable,
            zoned: zones.is_some(),
            zones_reset,
            discard,
            signature,
        })
    }

    /// Full-device TRIM, advisory: a rejected probe or a failed chunk is
    /// logged and preparation continues
    fn discard_device(&self, io: &dyn BlockIo, usable: u64, verbose: bool) -> DiscardOutcome {
        if !ChunkedEraser::probe_support(io) {
            return DiscardOutcome::Unsupported;
        }

        if verbose {
            println!(
                "Performing full device TRIM {} ({}) ...",
                io.display_path(),
                pretty_size(usable)
            );
        }

        match ChunkedEraser::discard_blocks(io, 0, usable) {
            Ok(chunks) => {
                tracing::debug!(device = %io.display_path(), chunks, "Discard completed");
                DiscardOutcome::Completed { chunks }
            }
            Err(e) => {
                tracing::warn!(device = %io.display_path(), error = %e, "Discard failed, continuing");
                DiscardOutcome::Failed
            }
        }
    }

    /// Header, superblock mirrors and optionally the tail, stopping at the
    /// first failure
    fn clear_metadata(
        io: &dyn BlockIo,
        zeroer: &ClampedZeroer<'_>,
        usable: u64,
        zero_end: bool,
    ) -> PrepResult<()> {
        zeroer.zero(io, 0, ZERO_DEV_BYTES)?;

        for &offset in SUPER_MIRROR_OFFSETS.iter() {
            zeroer.zero(io, offset, SUPER_INFO_SIZE)?;
        }

        if zero_end {
            zeroer.zero(io, usable.saturating_sub(ZERO_DEV_BYTES), ZERO_DEV_BYTES)?;
        }

        Ok(())
    }
}

/// Prepare a device with the stock Linux zone reporter and the built-in
/// signature table, returning the usable size in bytes
pub fn prepare_device(io: &dyn BlockIo, max_bytes: Option<u64>, flags: PrepFlags) -> PrepResult<u64> {
    let reporter = SysfsZoneReporter::default();
    let probe = MagicProbe;

    DevicePreparer::new(&reporter, &probe)
        .prepare(io, max_bytes, flags)
        .map(|report| report.usable_bytes)
}

#[cfg(test)]
mod preparer_tests;
