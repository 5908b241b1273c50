// Removal of a stale on-disk signature
//
// After the header and the superblock mirrors are cleared a probe still may
// find something (a RAID or partition-table magic outside the zeroed ranges).
// The first hit is overwritten with zeros or, in a sequential zone, wiped by
// resetting the zone.

use crate::io::BlockIo;
use crate::probe::{Signature, SignatureProbe};
use crate::zones::{reset_zone, zone_is_sequential, ZoneInfo};
use crate::{PrepError, PrepResult};
use serde::Serialize;

/// Upper bound on the bytes cleared for a single signature
pub const SIGNATURE_SCRATCH_SIZE: usize = 8192;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WipeOutcome {
    NotFound,
    Wiped(Signature),
}

pub struct SignatureWiper<'a> {
    probe: &'a dyn SignatureProbe,
}

impl<'a> SignatureWiper<'a> {
    pub fn new(probe: &'a dyn SignatureProbe) -> Self {
        Self { probe }
    }

    /// Probe the device and erase the first signature found, then flush.
    ///
    /// Nothing at or past `usable` is touched: a signature starting there is
    /// left alone and one crossing it is only cleared up to `usable`.
    pub fn wipe(
        &self,
        io: &dyn BlockIo,
        zones: Option<&ZoneInfo>,
        usable: u64,
    ) -> PrepResult<WipeOutcome> {
        self.wipe_inner(io, zones, usable)
            .map_err(|source| PrepError::SignatureWipe {
                path: io.display_path(),
                source: Box::new(source),
            })
    }

    fn wipe_inner(
        &self,
        io: &dyn BlockIo,
        zones: Option<&ZoneInfo>,
        usable: u64,
    ) -> PrepResult<WipeOutcome> {
        let signature = match self.probe.probe(io)? {
            Some(sig) if sig.len > 0 => sig,
            _ => return Ok(WipeOutcome::NotFound),
        };

        if signature.offset >= usable {
            tracing::debug!(
                device = %io.display_path(),
                signature = %signature.name,
                offset = signature.offset,
                usable,
                "Signature beyond usable size, left in place"
            );
            return Ok(WipeOutcome::NotFound);
        }

        let len = signature
            .len
            .min(SIGNATURE_SCRATCH_SIZE as u64)
            .min(usable - signature.offset) as usize;

        match zones.and_then(|info| info.zone_at(signature.offset)) {
            Some(zone) if zone_is_sequential(zones, signature.offset) => {
                if zone.start + zone.len > usable {
                    tracing::debug!(
                        device = %io.display_path(),
                        signature = %signature.name,
                        zone = zone.zone_number,
                        usable,
                        "Signature zone extends past usable size, left in place"
                    );
                    return Ok(WipeOutcome::NotFound);
                }
                reset_zone(io, zone)?
            }
            _ => {
                let scratch = [0u8; SIGNATURE_SCRATCH_SIZE];
                let written = io.write_at(&scratch[..len], signature.offset)?;
                if written != len {
                    return Err(PrepError::ShortWrite {
                        offset: signature.offset,
                        written,
                        expected: len,
                    });
                }
            }
        }

        io.sync()?;

        tracing::info!(
            device = %io.display_path(),
            signature = %signature.name,
            offset = signature.offset,
            len,
            "Wiped existing signature"
        );
        Ok(WipeOutcome::Wiped(signature))
    }
}
