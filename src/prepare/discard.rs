use crate::io::BlockIo;
use crate::units::SZ_1G;
use crate::{PrepError, PrepResult};

/// Largest range handed to a single discard command
pub const DISCARD_CHUNK_SIZE: u64 = SZ_1G;

pub struct ChunkedEraser;

impl ChunkedEraser {
    /// Zero-length discard at offset 0: succeeds only if the device accepts
    /// discard at all
    pub fn probe_support(io: &dyn BlockIo) -> bool {
        match io.discard(0, 0) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(device = %io.display_path(), error = %e, "Discard not supported");
                false
            }
        }
    }

    /// Discard the given range in one go
    pub fn discard_range(io: &dyn BlockIo, start: u64, len: u64) -> PrepResult<()> {
        io.discard(start, len)
            .map_err(|source| PrepError::Discard { start, len, source })
    }

    /// Discard `[start, start + len)` in chunks of at most
    /// [`DISCARD_CHUNK_SIZE`], stopping at the first failed chunk.
    ///
    /// Returns the number of discard commands issued.
    pub fn discard_blocks(io: &dyn BlockIo, mut start: u64, mut len: u64) -> PrepResult<u64> {
        let mut chunks = 0;

        while len > 0 {
            let chunk_size = len.min(DISCARD_CHUNK_SIZE);

            Self::discard_range(io, start, chunk_size)?;
            chunks += 1;
            len -= chunk_size;
            start += chunk_size;
        }

        Ok(chunks)
    }
}
