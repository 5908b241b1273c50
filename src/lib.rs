// Allow uppercase acronyms for industry-standard terms like TRIM, SMR, GPT
#![allow(clippy::upper_case_acronyms)]

pub mod config;
pub mod io;
pub mod prepare;
pub mod preparer;
pub mod probe;
pub mod units;
pub mod zones;

// Re-export the main preparation entry points for convenience
pub use io::{BlockIo, DeviceKind, DeviceStat, FileDevice, MemDevice};
pub use preparer::{prepare_device, DevicePreparer, DiscardOutcome, PrepReport};
pub use probe::{ProbeBackend, Signature, SignatureProbe};
pub use zones::{ZoneInfo, ZoneModel, ZoneReporter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PrepError {
    #[error("unable to stat {path}: {source}")]
    Stat {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to determine size of {path}")]
    UnknownSize { path: String },

    #[error("zoned: unable to load zone information of {path}: {reason}")]
    ZoneInfo { path: String, reason: String },

    #[error("zoned: failed to reset zone at offset {offset} of {path}: {source}")]
    ZoneReset {
        path: String,
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to zero device '{path}': {source}")]
    ZeroFill {
        path: String,
        #[source]
        source: Box<PrepError>,
    },

    #[error("cannot wipe existing superblock on {path}: {source}")]
    SignatureWipe {
        path: String,
        #[source]
        source: Box<PrepError>,
    },

    #[error("signature probe failed on {path}: {reason}")]
    Probe { path: String, reason: String },

    #[error("discard of {len} bytes at offset {start} failed: {source}")]
    Discard {
        start: u64,
        len: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot allocate a {len} byte zero buffer")]
    OutOfMemory { len: u64 },

    #[error("short write at offset {offset}: wrote {written} of {expected} bytes")]
    ShortWrite {
        offset: u64,
        written: usize,
        expected: usize,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<::config::ConfigError> for PrepError {
    fn from(err: ::config::ConfigError) -> Self {
        PrepError::Config(err.to_string())
    }
}

pub type PrepResult<T> = Result<T, PrepError>;

/// Options recognized by [`DevicePreparer`].
///
/// `zoned` and `discard` select mutually exclusive branches: a zoned device
/// gets its zones reset and is never discarded, so `zoned` wins when both are
/// set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepFlags {
    pub zoned: bool,
    pub discard: bool,
    pub verbose: bool,
    pub zero_end: bool,
}

impl PrepFlags {
    pub fn discard() -> Self {
        Self {
            discard: true,
            ..Default::default()
        }
    }

    pub fn zoned() -> Self {
        Self {
            zoned: true,
            ..Default::default()
        }
    }

    pub fn with_zero_end(mut self) -> Self {
        self.zero_end = true;
        self
    }

    pub fn with_verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    /// True when the discard branch will actually be taken
    pub fn wants_discard(&self) -> bool {
        self.discard && !self.zoned
    }
}
