// Building blocks of device preparation
//
// - discard.rs: chunked TRIM over a byte range
// - zero.rs: zero-fill, zone-aware writers and the clamped zeroer
// - superblock.rs: fixed superblock mirror locations
// - signature.rs: probe-and-erase of existing signatures

pub mod discard;
pub mod signature;
pub mod superblock;
pub mod zero;

pub use discard::{ChunkedEraser, DISCARD_CHUNK_SIZE};
pub use signature::{SignatureWiper, WipeOutcome, SIGNATURE_SCRATCH_SIZE};
pub use superblock::{sb_offset, SUPER_INFO_SIZE, SUPER_MIRROR_MAX, SUPER_MIRROR_OFFSETS};
pub use zero::{
    default_reserved_floor, writer_for, zero_blocks, ClampedZeroer, DirectWriter, RegionWriter,
    ZoneAwareWriter, RESERVED_HEADER_BYTES,
};
