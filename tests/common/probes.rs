#![allow(dead_code)]
//! Scripted signature probes

use devprep::{BlockIo, Signature, SignatureProbe};

/// Reports a signature whenever `magic` is stored at `offset`
pub struct PlantedSignatureProbe {
    pub name: &'static str,
    pub offset: u64,
    pub magic: &'static [u8],
}

impl SignatureProbe for PlantedSignatureProbe {
    fn probe(&self, io: &dyn BlockIo) -> devprep::PrepResult<Option<Signature>> {
        let mut buf = vec![0u8; self.magic.len()];
        let read = io.read_at(&mut buf, self.offset)?;

        Ok((read == buf.len() && buf == self.magic).then(|| Signature {
            name: self.name.to_string(),
            offset: self.offset,
            len: self.magic.len() as u64,
        }))
    }
}
