// Tests for the device preparer
//
// Everything runs against MemDevice, so multi-gigabyte devices and failing
// primitives can be exercised without hardware.

use super::*;
use crate::io::{IoOp, MemDevice};
use crate::probe::Signature;
use crate::units::{SZ_1G, SZ_1M, SZ_64K};
use crate::zones::{Zone, ZoneCondition, ZoneModel, ZoneType};
use anyhow::Result;

const PLANTED_OFFSET: u64 = 4 * SZ_1M;
const PLANTED_MAGIC: &[u8] = b"_PLANTED";

// ==================== TEST DOUBLES ====================

struct StaticZones(Option<ZoneInfo>);

impl ZoneReporter for StaticZones {
    fn load_zone_info(&self, _io: &dyn BlockIo) -> PrepResult<Option<ZoneInfo>> {
        Ok(self.0.clone())
    }
}

struct BrokenZones;

impl ZoneReporter for BrokenZones {
    fn load_zone_info(&self, io: &dyn BlockIo) -> PrepResult<Option<ZoneInfo>> {
        Err(PrepError::ZoneInfo {
            path: io.display_path(),
            reason: "report failed".to_string(),
        })
    }
}

/// Finds `PLANTED_MAGIC` at `PLANTED_OFFSET`
struct PlantedProbe;

impl SignatureProbe for PlantedProbe {
    fn probe(&self, io: &dyn BlockIo) -> PrepResult<Option<Signature>> {
        let mut buf = [0u8; 8];
        let read = io.read_at(&mut buf, PLANTED_OFFSET)?;

        Ok((read == buf.len() && buf == PLANTED_MAGIC).then(|| Signature {
            name: "planted".to_string(),
            offset: PLANTED_OFFSET,
            len: PLANTED_MAGIC.len() as u64,
        }))
    }
}

fn preparer<'a>(zones: &'a dyn ZoneReporter) -> DevicePreparer<'a> {
    DevicePreparer::new(zones, &PlantedProbe).with_reserved_floor(0)
}

/// 64 MiB zones: one conventional, then sequential zones
fn smr_layout(device_size: u64) -> ZoneInfo {
    let zone_size = 64 * SZ_1M;
    let zones = (0..device_size / zone_size)
        .map(|i| {
            let start = i * zone_size;
            let (zone_type, zone_condition) = match i {
                0 => (ZoneType::Conventional, ZoneCondition::NotWritePointer),
                1 | 2 => (ZoneType::SequentialWriteRequired, ZoneCondition::Full),
                _ => (ZoneType::SequentialWriteRequired, ZoneCondition::Empty),
            };
            Zone {
                zone_number: i as u32,
                zone_type,
                zone_condition,
                start,
                len: zone_size,
                write_pointer: start,
            }
        })
        .collect();
    ZoneInfo::new(ZoneModel::HostManaged, zone_size, zones)
}

// ==================== DISCARD BRANCH ====================

#[test]
fn test_ten_gib_file_with_discard() -> Result<()> {
    let dev = MemDevice::regular_file("disk.img", 10 * SZ_1G);
    let zones = StaticZones(None);

    let report = preparer(&zones).prepare(&dev, None, PrepFlags::discard())?;

    assert_eq!(report.usable_bytes, 10 * SZ_1G);
    assert_eq!(report.device_size, 10 * SZ_1G);
    assert_eq!(report.discard, DiscardOutcome::Completed { chunks: 10 });
    assert_eq!(report.signature, WipeOutcome::NotFound);
    assert!(!report.zoned);
    assert_eq!(dev.discards().len(), 10);
    assert_eq!(
        dev.writes(),
        vec![(0, ZERO_DEV_BYTES), (SZ_64K, SUPER_INFO_SIZE), (64 * SZ_1M, SUPER_INFO_SIZE)]
    );
    Ok(())
}

#[test]
fn test_discard_precedes_zeroing() -> Result<()> {
    let dev = MemDevice::block_device("/dev/sdz", 2 * SZ_1G);
    let zones = StaticZones(None);

    preparer(&zones).prepare(&dev, None, PrepFlags::discard())?;

    let ops = dev.ops();
    let last_discard = ops
        .iter()
        .rposition(|op| matches!(op, IoOp::Discard { .. }))
        .unwrap();
    let first_write = ops
        .iter()
        .position(|op| matches!(op, IoOp::Write { .. }))
        .unwrap();
    assert!(last_discard < first_write);
    Ok(())
}

#[test]
fn test_discard_unsupported_is_skipped() -> Result<()> {
    let dev = MemDevice::regular_file("disk.img", SZ_1G).without_discard();
    dev.fill(0, &[0xEE; 8192]);
    dev.fill(SZ_64K, &[0xEE; 4096]);
    let zones = StaticZones(None);

    let report = preparer(&zones).prepare(&dev, None, PrepFlags::discard())?;

    assert_eq!(report.discard, DiscardOutcome::Unsupported);
    assert!(dev.discards().is_empty());
    assert!(dev.is_zeroed(0, 8192));
    assert!(dev.is_zeroed(SZ_64K, 4096));
    Ok(())
}

#[test]
fn test_discard_failure_is_advisory() -> Result<()> {
    let dev = MemDevice::block_device("/dev/sdz", 4 * SZ_1G).fail_discard_after(2);
    let zones = StaticZones(None);

    let report = preparer(&zones).prepare(&dev, None, PrepFlags::discard())?;

    assert_eq!(report.discard, DiscardOutcome::Failed);
    assert_eq!(report.usable_bytes, 4 * SZ_1G);
    // Two accepted chunks, the failing third, nothing after it
    assert_eq!(dev.discards().len(), 3);
    assert!(!dev.writes().is_empty());
    Ok(())
}

#[test]
fn test_no_discard_requested() -> Result<()> {
    let dev = MemDevice::block_device("/dev/sdz", SZ_1G);
    let zones = StaticZones(None);

    let report = preparer(&zones).prepare(&dev, None, PrepFlags::default())?;

    assert_eq!(report.discard, DiscardOutcome::NotRequested);
    assert!(!dev.ops().iter().any(|op| matches!(op, IoOp::Discard { .. })));
    Ok(())
}

// ==================== SIZING ====================

#[test]
fn test_max_bytes_caps_usable_size() -> Result<()> {
    let dev = MemDevice::block_device("/dev/sdz", 10 * SZ_1G);
    let zones = StaticZones(None);
    let flags = PrepFlags::discard().with_zero_end();

    let report = preparer(&zones).prepare(&dev, Some(SZ_1G), flags)?;

    assert_eq!(report.usable_bytes, SZ_1G);
    assert_eq!(report.device_size, 10 * SZ_1G);
    assert_eq!(dev.discards(), vec![(0, SZ_1G)]);
    for (offset, len) in dev.writes() {
        assert!(offset + len <= SZ_1G);
    }
    assert!(dev.writes().contains(&(SZ_1G - ZERO_DEV_BYTES, ZERO_DEV_BYTES)));
    Ok(())
}

#[test]
fn test_max_bytes_zero_or_larger_means_whole_device() -> Result<()> {
    let zones = StaticZones(None);

    for max in [Some(0), Some(20 * SZ_1G), None] {
        let dev = MemDevice::block_device("/dev/sdz", 2 * SZ_1G);
        let report = preparer(&zones).prepare(&dev, max, PrepFlags::default())?;
        assert_eq!(report.usable_bytes, 2 * SZ_1G);
    }
    Ok(())
}

#[test]
fn test_stat_failure() {
    let dev = MemDevice::block_device("/dev/sdz", SZ_1G).failing_stat();
    let zones = StaticZones(None);

    let err = preparer(&zones)
        .prepare(&dev, None, PrepFlags::discard())
        .unwrap_err();

    assert!(matches!(err, PrepError::Stat { ref path, .. } if path == "/dev/sdz"));
    assert!(dev.ops().is_empty());
}

#[test]
fn test_zero_sized_device() {
    let dev = MemDevice::block_device("/dev/sdz", 0);
    let zones = StaticZones(None);

    let err = preparer(&zones)
        .prepare(&dev, None, PrepFlags::discard())
        .unwrap_err();

    assert!(matches!(err, PrepError::UnknownSize { .. }));
    assert!(dev.ops().is_empty());
}

#[test]
fn test_character_device_has_no_size() {
    let dev = MemDevice::character_device("/dev/tty0");
    let zones = StaticZones(None);

    let err = preparer(&zones)
        .prepare(&dev, Some(SZ_1G), PrepFlags::default())
        .unwrap_err();

    assert_eq!(err.to_string(), "unable to determine size of /dev/tty0");
}

// ==================== ZEROING ====================

#[test]
fn test_zero_end_on_small_device() -> Result<()> {
    let dev = MemDevice::regular_file("small.img", SZ_1M);
    dev.fill(0, &vec![0xAA; SZ_1M as usize]);
    let zones = StaticZones(None);
    let flags = PrepFlags::default().with_zero_end();

    let report = preparer(&zones).prepare(&dev, None, flags)?;

    assert_eq!(report.usable_bytes, SZ_1M);
    assert!(dev.is_zeroed(0, SZ_1M as usize));
    assert_eq!(
        dev.writes(),
        vec![(0, SZ_1M), (SZ_64K, SUPER_INFO_SIZE), (0, SZ_1M)]
    );
    Ok(())
}

#[test]
fn test_reserved_floor_keeps_disk_label() -> Result<()> {
    let dev = MemDevice::regular_file("label.img", 8 * SZ_1M);
    dev.fill(0, &[0x5A; 1024]);
    let zones = StaticZones(None);

    DevicePreparer::new(&zones, &PlantedProbe)
        .with_reserved_floor(1024)
        .prepare(&dev, None, PrepFlags::default())?;

    assert_eq!(dev.contents(0, 1024), vec![0x5A; 1024]);
    assert_eq!(dev.writes()[0], (1024, ZERO_DEV_BYTES - 1024));
    Ok(())
}

#[test]
fn test_short_write_fails_preparation() {
    let dev = MemDevice::regular_file("disk.img", SZ_1G).short_writes();
    let zones = StaticZones(None);

    let err = preparer(&zones)
        .prepare(&dev, None, PrepFlags::default())
        .unwrap_err();

    match err {
        PrepError::ZeroFill { path, source } => {
            assert_eq!(path, "disk.img");
            assert!(matches!(*source, PrepError::ShortWrite { offset: 0, .. }));
        }
        other => panic!("unexpected error: {}", other),
    }
    // The mirrors are not attempted after the header failed
    assert_eq!(dev.writes().len(), 1);
}

#[test]
fn test_write_error_fails_preparation() {
    let dev = MemDevice::regular_file("disk.img", SZ_1G).failing_writes();
    let zones = StaticZones(None);

    let err = preparer(&zones)
        .prepare(&dev, None, PrepFlags::discard())
        .unwrap_err();

    assert!(err.to_string().starts_with("failed to zero device 'disk.img'"));
}

// ==================== ZONED BRANCH ====================

#[test]
fn test_zoned_device_resets_instead_of_writing() -> Result<()> {
    let size = 256 * SZ_1M;
    let dev = MemDevice::block_device("/dev/sdz", size);
    let zones = StaticZones(Some(smr_layout(size)));
    let flags = PrepFlags::zoned().with_zero_end();

    let report = preparer(&zones).prepare(&dev, None, flags)?;

    assert!(report.zoned);
    assert_eq!(report.zones_reset, Some(2));
    assert_eq!(report.discard, DiscardOutcome::NotRequested);
    assert_eq!(
        dev.zone_resets(),
        vec![
            (64 * SZ_1M, 64 * SZ_1M),
            (128 * SZ_1M, 64 * SZ_1M),
            (64 * SZ_1M, 64 * SZ_1M),
            (192 * SZ_1M, 64 * SZ_1M),
        ]
    );
    for (offset, len) in dev.writes() {
        assert!(offset + len <= 64 * SZ_1M, "write at {} hit a sequential zone", offset);
    }
    Ok(())
}

#[test]
fn test_zoned_wins_over_discard() -> Result<()> {
    let size = 256 * SZ_1M;
    let dev = MemDevice::block_device("/dev/sdz", size);
    let zones = StaticZones(Some(smr_layout(size)));
    let flags = PrepFlags {
        zoned: true,
        discard: true,
        ..Default::default()
    };

    let report = preparer(&zones).prepare(&dev, None, flags)?;

    assert_eq!(report.discard, DiscardOutcome::NotRequested);
    assert!(!dev.ops().iter().any(|op| matches!(op, IoOp::Discard { .. })));
    Ok(())
}

#[test]
fn test_zone_reset_failure_precedes_any_write() {
    let size = 256 * SZ_1M;
    let dev = MemDevice::block_device("/dev/sdz", size).failing_zone_reset();
    let zones = StaticZones(Some(smr_layout(size)));
    let flags = PrepFlags::zoned().with_zero_end();

    let err = preparer(&zones).prepare(&dev, None, flags).unwrap_err();

    assert!(matches!(err, PrepError::ZoneReset { offset, .. } if offset == 64 * SZ_1M));
    assert!(dev.writes().is_empty());
}

#[test]
fn test_zoned_without_zone_info_is_fatal() {
    let dev = MemDevice::block_device("/dev/sdz", SZ_1G);
    let zones = StaticZones(None);

    let err = preparer(&zones)
        .prepare(&dev, None, PrepFlags::zoned())
        .unwrap_err();

    assert!(matches!(err, PrepError::ZoneInfo { .. }));
    assert!(dev.ops().is_empty());
}

#[test]
fn test_zone_report_failure_is_fatal() {
    let dev = MemDevice::block_device("/dev/sdz", SZ_1G);

    let err = preparer(&BrokenZones)
        .prepare(&dev, None, PrepFlags::zoned())
        .unwrap_err();

    assert!(err.to_string().contains("report failed"));
    assert!(dev.ops().is_empty());
}

// ==================== SIGNATURES ====================

#[test]
fn test_planted_signature_wiped_then_gone() -> Result<()> {
    let dev = MemDevice::regular_file("disk.img", SZ_1G);
    dev.fill(PLANTED_OFFSET, PLANTED_MAGIC);
    let zones = StaticZones(None);

    let first = preparer(&zones).prepare(&dev, None, PrepFlags::default())?;
    assert!(matches!(first.signature, WipeOutcome::Wiped(ref s) if s.offset == PLANTED_OFFSET));
    assert!(dev.is_zeroed(PLANTED_OFFSET, PLANTED_MAGIC.len()));
    assert_eq!(dev.ops().last(), Some(&IoOp::Sync));

    let second = preparer(&zones).prepare(&dev, None, PrepFlags::default())?;
    assert_eq!(second.signature, WipeOutcome::NotFound);
    Ok(())
}

#[test]
fn test_signature_past_max_bytes_is_untouched() -> Result<()> {
    let dev = MemDevice::regular_file("disk.img", SZ_1M);
    dev.fill(SZ_64K + 64, b"_BHRfS_M");
    let zones = StaticZones(None);

    let report = DevicePreparer::new(&zones, &MagicProbe)
        .with_reserved_floor(0)
        .prepare(&dev, Some(SZ_64K), PrepFlags::default().with_zero_end())?;

    assert_eq!(report.usable_bytes, SZ_64K);
    assert_eq!(report.signature, WipeOutcome::NotFound);
    for (offset, len) in dev.writes() {
        assert!(offset + len <= SZ_64K, "write [{}, {}) past usable size", offset, offset + len);
    }
    assert_eq!(dev.contents(SZ_64K + 64, 8), b"_BHRfS_M".to_vec());
    Ok(())
}

#[test]
fn test_prepare_device_returns_usable_bytes() -> Result<()> {
    let dev = MemDevice::regular_file("disk.img", 3 * SZ_1G);

    assert_eq!(prepare_device(&dev, Some(SZ_1G), PrepFlags::discard())?, SZ_1G);
    assert_eq!(prepare_device(&dev, None, PrepFlags::default())?, 3 * SZ_1G);
    Ok(())
}

#[test]
fn test_report_serializes() -> Result<()> {
    let dev = MemDevice::regular_file("disk.img", SZ_1G);
    let zones = StaticZones(None);

    let report = preparer(&zones).prepare(&dev, None, PrepFlags::discard())?;
    let json = serde_json::to_value(&report)?;

    assert_eq!(json["usable_bytes"], SZ_1G);
    assert_eq!(json["discard"]["completed"]["chunks"], 1);
    assert_eq!(json["signature"]["status"], "not_found");
    Ok(())
}
