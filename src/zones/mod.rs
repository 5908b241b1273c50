// Zoned block device support
//
// Host-managed zoned devices (SMR disks, ZNS namespaces) only accept writes at
// the write pointer of a sequential zone. Anything that wants to clear data
// inside such a zone has to reset the whole zone instead of overwriting it.

pub mod report;

pub use report::{parse_blkzone_report, SysfsZoneReporter};

use crate::io::BlockIo;
use crate::{PrepError, PrepResult};
use serde::{Deserialize, Serialize};

/// Zone model types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZoneModel {
    /// Host-Managed: writes into sequential zones must be sequential
    HostManaged,

    /// Host-Aware: can write randomly but performs better with sequential writes
    HostAware,

    /// Drive-Managed: drive handles zones internally, appears as a normal disk
    DriveManaged,
}

/// Type of zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZoneType {
    /// Conventional zone - supports random writes
    Conventional,

    /// Sequential write required zone
    SequentialWriteRequired,

    /// Sequential write preferred zone
    SequentialWritePreferred,
}

/// Zone state/condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZoneCondition {
    /// Conventional zones have no write pointer
    NotWritePointer,
    Empty,
    ImplicitlyOpen,
    ExplicitlyOpen,
    Closed,
    ReadOnly,
    Full,
    Offline,
}

/// A single zone, positions in bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub zone_number: u32,
    pub zone_type: ZoneType,
    pub zone_condition: ZoneCondition,
    pub start: u64,
    pub len: u64,
    pub write_pointer: u64,
}

impl Zone {
    /// Only sequential-write-required zones reject random writes
    pub fn is_sequential(&self) -> bool {
        self.zone_type == ZoneType::SequentialWriteRequired
    }

    /// Check if zone needs to be reset before it can be written from its start
    pub fn needs_reset(&self) -> bool {
        self.zone_type != ZoneType::Conventional && self.zone_condition != ZoneCondition::Empty
    }

    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.start && offset - self.start < self.len
    }
}

/// Zone layout of a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneInfo {
    pub model: ZoneModel,
    /// Size of every zone in bytes
    pub zone_size: u64,
    pub zones: Vec<Zone>,
}

impl ZoneInfo {
    pub fn new(model: ZoneModel, zone_size: u64, zones: Vec<Zone>) -> Self {
        Self {
            model,
            zone_size,
            zones,
        }
    }

    /// Conventional zones laid over a device that has none, e.g. an image file
    pub fn emulated(device_size: u64, zone_size: u64) -> Self {
        let zones = if zone_size == 0 {
            Vec::new()
        } else {
            (0..device_size.div_ceil(zone_size))
                .map(|i| {
                    let start = i * zone_size;
                    Zone {
                        zone_number: i as u32,
                        zone_type: ZoneType::Conventional,
                        zone_condition: ZoneCondition::NotWritePointer,
                        start,
                        len: zone_size.min(device_size - start),
                        write_pointer: start,
                    }
                })
                .collect()
        };

        Self::new(ZoneModel::HostManaged, zone_size, zones)
    }

    pub fn nr_zones(&self) -> usize {
        self.zones.len()
    }

    pub fn is_host_managed(&self) -> bool {
        self.model == ZoneModel::HostManaged
    }

    /// Index of the zone holding `offset`
    pub fn zone_index(&self, offset: u64) -> Option<usize> {
        if self.zone_size == 0 {
            return None;
        }
        let index = usize::try_from(offset / self.zone_size).ok()?;
        (index < self.zones.len()).then_some(index)
    }

    /// Zone holding `offset`; a short last zone does not cover its tail
    pub fn zone_at(&self, offset: u64) -> Option<&Zone> {
        self.zone_index(offset)
            .map(|i| &self.zones[i])
            .filter(|zone| zone.contains(offset))
    }

    pub fn conventional_count(&self) -> usize {
        self.zones
            .iter()
            .filter(|z| z.zone_type == ZoneType::Conventional)
            .count()
    }

    pub fn sequential_count(&self) -> usize {
        self.zones.iter().filter(|z| z.is_sequential()).count()
    }
}

/// Whether `offset` falls in a zone that only accepts sequential writes.
///
/// No zone information, or a device that is not zoned, means everything is
/// randomly writable.
pub fn zone_is_sequential(zones: Option<&ZoneInfo>, offset: u64) -> bool {
    match zones {
        Some(info) if info.model != ZoneModel::DriveManaged => {
            info.zone_at(offset).is_some_and(Zone::is_sequential)
        }
        _ => false,
    }
}

/// Reset the write pointer of one zone
pub fn reset_zone(io: &dyn BlockIo, zone: &Zone) -> PrepResult<()> {
    tracing::debug!(
        device = %io.display_path(),
        zone = zone.zone_number,
        start = zone.start,
        "Resetting zone"
    );

    io.reset_zone_range(zone.start, zone.len)
        .map_err(|source| PrepError::ZoneReset {
            path: io.display_path(),
            offset: zone.start,
            source,
        })
}

/// Reset every non-empty sequential zone and flush.
///
/// Zone conditions in `zones` are updated as each reset succeeds; the first
/// failure aborts.
pub fn reset_all_zones(io: &dyn BlockIo, zones: &mut ZoneInfo) -> PrepResult<usize> {
    let mut reset = 0;

    for zone in zones.zones.iter_mut().filter(|z| z.needs_reset()) {
        reset_zone(io, zone)?;
        zone.zone_condition = ZoneCondition::Empty;
        zone.write_pointer = zone.start;
        reset += 1;
    }

    io.sync().map_err(|source| PrepError::ZoneReset {
        path: io.display_path(),
        offset: 0,
        source,
    })?;

    tracing::info!(device = %io.display_path(), reset, "Device zones reset");
    Ok(reset)
}

/// Source of zone information for a device
pub trait ZoneReporter {
    /// Zone layout of the device, `None` when it is not zoned
    fn load_zone_info(&self, io: &dyn BlockIo) -> PrepResult<Option<ZoneInfo>>;
}
