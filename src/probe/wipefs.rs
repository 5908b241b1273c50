// Probe through util-linux `wipefs`

use super::{Signature, SignatureProbe};
use crate::io::BlockIo;
use crate::{PrepError, PrepResult};
use serde_json::Value;
use std::process::Command;

/// Lists signatures with `wipefs --json` and reports the first one
#[derive(Debug, Clone)]
pub struct WipefsProbe {
    pub program: String,
}

impl Default for WipefsProbe {
    fn default() -> Self {
        Self {
            program: "wipefs".to_string(),
        }
    }
}

/// wipefs prints offsets as `0x438` strings, lengths as strings or numbers
/// depending on the util-linux version
fn json_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => match s.strip_prefix("0x") {
            Some(hex) => u64::from_str_radix(hex, 16).ok(),
            None => s.parse().ok(),
        },
        _ => None,
    }
}

/// Parse `wipefs --json --output OFFSET,LENGTH,TYPE` output.
///
/// An empty document means no signatures.
pub fn parse_wipefs_json(output: &str) -> Result<Option<Signature>, String> {
    if output.trim().is_empty() {
        return Ok(None);
    }

    let doc: Value =
        serde_json::from_str(output).map_err(|e| format!("invalid wipefs output: {}", e))?;
    let first = match doc["signatures"].as_array().and_then(|s| s.first()) {
        Some(first) => first,
        None => return Ok(None),
    };

    let offset = json_u64(&first["offset"]).ok_or("signature without offset")?;
    let len = json_u64(&first["length"]).ok_or("signature without length")?;
    let name = first["type"].as_str().unwrap_or("unknown").to_string();

    Ok(Some(Signature { name, offset, len }))
}

impl SignatureProbe for WipefsProbe {
    fn probe(&self, io: &dyn BlockIo) -> PrepResult<Option<Signature>> {
        let output = Command::new(&self.program)
            .args(["--json", "--output", "OFFSET,LENGTH,TYPE"])
            .arg(io.path())
            .output()
            .map_err(|e| PrepError::Probe {
                path: io.display_path(),
                reason: format!("{} failed: {}", self.program, e),
            })?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(PrepError::Probe {
                path: io.display_path(),
                reason: format!("{} failed: {}", self.program, error.trim()),
            });
        }

        parse_wipefs_json(&String::from_utf8_lossy(&output.stdout)).map_err(|reason| {
            PrepError::Probe {
                path: io.display_path(),
                reason,
            }
        })
    }
}
