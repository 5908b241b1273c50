// Zone information from sysfs and `blkzone report`

use super::{Zone, ZoneCondition, ZoneInfo, ZoneModel, ZoneReporter, ZoneType};
use crate::io::{sysfs, BlockIo, DeviceKind};
use crate::units::SZ_256M;
use crate::{PrepError, PrepResult};
use regex::Regex;
use std::process::Command;
use std::sync::OnceLock;

const SECTOR_SIZE: u64 = 512;

/// Zone size used when a regular file is prepared in zoned mode
pub const DEFAULT_EMULATED_ZONE_SIZE: u64 = SZ_256M;

fn blkzone_line() -> &'static Regex {
    static LINE: OnceLock<Regex> = OnceLock::new();
    // start: 0x000080000, len 0x080000, cap 0x080000, wptr 0x000000 reset:0 non-seq:0, zcond: 1(em) [type: 2(SEQ_WRITE_REQUIRED)]
    LINE.get_or_init(|| {
        Regex::new(
            r"start:\s*0x(?P<start>[0-9a-fA-F]+),\s*len\s+0x(?P<len>[0-9a-fA-F]+),.*?wptr\s+0x(?P<wptr>[0-9a-fA-F]+).*?zcond:\s*(?P<cond>\d+)\(\w*\)\s*\[type:\s*(?P<type>\d+)\((?P<type_name>\w+)\)\]",
        )
        .expect("blkzone line pattern is valid")
    })
}

fn parse_condition(code: u32) -> Option<ZoneCondition> {
    match code {
        0x0 => Some(ZoneCondition::NotWritePointer),
        0x1 => Some(ZoneCondition::Empty),
        0x2 => Some(ZoneCondition::ImplicitlyOpen),
        0x3 => Some(ZoneCondition::ExplicitlyOpen),
        0x4 => Some(ZoneCondition::Closed),
        0xD => Some(ZoneCondition::ReadOnly),
        0xE => Some(ZoneCondition::Full),
        0xF => Some(ZoneCondition::Offline),
        _ => None,
    }
}

fn parse_type(code: u32) -> Option<ZoneType> {
    match code {
        1 => Some(ZoneType::Conventional),
        2 => Some(ZoneType::SequentialWriteRequired),
        3 => Some(ZoneType::SequentialWritePreferred),
        _ => None,
    }
}

fn hex(value: &str) -> Option<u64> {
    u64::from_str_radix(value, 16).ok()
}

/// Parse the output of `blkzone report` into zones with byte positions.
///
/// blkzone prints positions in 512 byte sectors and the write pointer relative
/// to the zone start.
pub fn parse_blkzone_report(output: &str) -> Result<Vec<Zone>, String> {
    let mut zones = Vec::new();

    for line in output.lines().filter(|l| l.contains("start:")) {
        let caps = blkzone_line()
            .captures(line)
            .ok_or_else(|| format!("unrecognized zone line: {}", line.trim()))?;

        let start = hex(&caps["start"]).ok_or("bad zone start")?;
        let len = hex(&caps["len"]).ok_or("bad zone length")?;
        let wptr = hex(&caps["wptr"]).ok_or("bad write pointer")?;

        let cond_code: u32 = caps["cond"].parse().map_err(|_| "bad zone condition")?;
        let type_code: u32 = caps["type"].parse().map_err(|_| "bad zone type")?;

        let zone_condition = parse_condition(cond_code)
            .ok_or_else(|| format!("unknown zone condition {}", cond_code))?;
        let zone_type = parse_type(type_code)
            .ok_or_else(|| format!("unknown zone type {}({})", type_code, &caps["type_name"]))?;

        zones.push(Zone {
            zone_number: zones.len() as u32,
            zone_type,
            zone_condition,
            start: start * SECTOR_SIZE,
            len: len * SECTOR_SIZE,
            write_pointer: (start + wptr) * SECTOR_SIZE,
        });
    }

    Ok(zones)
}

/// Loads zone layouts the way the kernel exposes them.
///
/// The model and zone size come from `/sys/block/<disk>/queue/{zoned,chunk_sectors}`,
/// the zone list from `blkzone report`. Regular files get emulated
/// conventional zones so they can be prepared in zoned mode.
#[derive(Debug, Clone)]
pub struct SysfsZoneReporter {
    pub emulated_zone_size: u64,
}

impl Default for SysfsZoneReporter {
    fn default() -> Self {
        Self {
            emulated_zone_size: DEFAULT_EMULATED_ZONE_SIZE,
        }
    }
}

impl SysfsZoneReporter {
    fn zone_error(io: &dyn BlockIo, reason: impl Into<String>) -> PrepError {
        PrepError::ZoneInfo {
            path: io.display_path(),
            reason: reason.into(),
        }
    }

    /// Zone model from sysfs, `None` for devices that are not zoned
    fn detect_zone_model(io: &dyn BlockIo) -> Option<ZoneModel> {
        match sysfs::queue_param(io.path(), "zoned")?.as_str() {
            "host-managed" => Some(ZoneModel::HostManaged),
            "host-aware" => Some(ZoneModel::HostAware),
            _ => None,
        }
    }

    fn report_zones(io: &dyn BlockIo) -> PrepResult<Vec<Zone>> {
        let output = Command::new("blkzone")
            .arg("report")
            .arg(io.path())
            .output()
            .map_err(|e| Self::zone_error(io, format!("blkzone failed: {}", e)))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(Self::zone_error(
                io,
                format!("blkzone report failed: {}", error.trim()),
            ));
        }

        parse_blkzone_report(&String::from_utf8_lossy(&output.stdout))
            .map_err(|reason| Self::zone_error(io, reason))
    }
}

impl ZoneReporter for SysfsZoneReporter {
    fn load_zone_info(&self, io: &dyn BlockIo) -> PrepResult<Option<ZoneInfo>> {
        let stat = io
            .stat()
            .map_err(|e| Self::zone_error(io, format!("stat failed: {}", e)))?;

        match stat.kind {
            DeviceKind::RegularFile => Ok(Some(ZoneInfo::emulated(
                stat.len,
                self.emulated_zone_size,
            ))),
            DeviceKind::BlockDevice => {
                let model = match Self::detect_zone_model(io) {
                    Some(model) => model,
                    None => return Ok(None),
                };

                let chunk_sectors: u64 = sysfs::queue_param(io.path(), "chunk_sectors")
                    .and_then(|v| v.parse().ok())
                    .filter(|&v| v > 0)
                    .ok_or_else(|| Self::zone_error(io, "zone size not reported"))?;

                let zones = Self::report_zones(io)?;
                if zones.is_empty() {
                    return Err(Self::zone_error(io, "no zones found on device"));
                }

                tracing::debug!(
                    device = %io.display_path(),
                    model = ?model,
                    zones = zones.len(),
                    "Loaded zone information"
                );

                Ok(Some(ZoneInfo::new(
                    model,
                    chunk_sectors * SECTOR_SIZE,
                    zones,
                )))
            }
            DeviceKind::Other => Err(Self::zone_error(io, "not a block device or file")),
        }
    }
}
