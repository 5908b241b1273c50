// Filesystem / RAID / partition table signature probing

pub mod magic;
pub mod wipefs;

pub use magic::{MagicProbe, KNOWN_MAGICS};
pub use wipefs::{parse_wipefs_json, WipefsProbe};

use crate::io::BlockIo;
use crate::PrepResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A magic signature found on a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Detected type, e.g. `btrfs` or `linux_raid_member`
    pub name: String,
    /// Byte offset of the magic
    pub offset: u64,
    /// Length of the magic in bytes
    pub len: u64,
}

/// Finds the first known signature on a device
pub trait SignatureProbe {
    /// `Ok(None)` when nothing recognizable is stored on the device
    fn probe(&self, io: &dyn BlockIo) -> PrepResult<Option<Signature>>;
}

/// Which probe implementation to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeBackend {
    /// Built-in magic table, reads the device directly
    #[default]
    Magic,
    /// util-linux `wipefs`
    Wipefs,
}

impl FromStr for ProbeBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "magic" => Ok(ProbeBackend::Magic),
            "wipefs" => Ok(ProbeBackend::Wipefs),
            other => Err(format!("unknown probe backend: {}", other)),
        }
    }
}

impl fmt::Display for ProbeBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeBackend::Magic => write!(f, "magic"),
            ProbeBackend::Wipefs => write!(f, "wipefs"),
        }
    }
}

/// Instantiate the probe for `backend`
pub fn probe_for(backend: ProbeBackend) -> Box<dyn SignatureProbe> {
    match backend {
        ProbeBackend::Magic => Box::new(MagicProbe),
        ProbeBackend::Wipefs => Box::new(WipefsProbe::default()),
    }
}
