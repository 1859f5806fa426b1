//! Sparse program image: what loaders produce, what the assembler emits and
//! what the simulator and disassembler are fed from.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, ensure, Result};
use serde::Serialize;

use crate::memory::Bus;

/// A contiguous run of bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub base: u32,
    pub bytes: Vec<u8>,
}

impl Segment {
    pub fn end(&self) -> u64 {
        self.base as u64 + self.bytes.len() as u64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramImage {
    bytes: BTreeMap<u32, u8>,
    /// Entry point, if the source format carried one.
    pub start: Option<u32>,
}

impl ProgramImage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw binary placed at `base`.
    pub fn from_bytes(base: u32, data: &[u8]) -> Self {
        let mut img = Self::new();
        img.write_bytes(base, data);
        img
    }

    /// Raw binary file, optionally skipping a header and truncating.
    pub fn load_raw(path: &Path, base: u32, skip: usize, len: Option<usize>) -> Result<Self> {
        let file = std::fs::read(path)?;
        ensure!(skip <= file.len(), "skip exceeds file size");
        let mut payload = &file[skip..];
        if let Some(lim) = len {
            ensure!(lim <= payload.len(), "length exceeds remaining file size after skip");
            payload = &payload[..lim];
        }
        Ok(Self::from_bytes(base, payload))
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Number of populated bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn set(&mut self, addr: u32, v: u8) {
        self.bytes.insert(addr, v);
    }

    pub fn write_bytes(&mut self, base: u32, data: &[u8]) {
        for (i, b) in data.iter().enumerate() {
            self.bytes.insert(base.wrapping_add(i as u32), *b);
        }
    }

    /// Big-endian words, as the assembler produces them.
    pub fn write_words(&mut self, base: u32, words: &[u16]) {
        for (i, w) in words.iter().enumerate() {
            self.write_bytes(base.wrapping_add(2 * i as u32), &w.to_be_bytes());
        }
    }

    pub fn get(&self, addr: u32) -> Option<u8> {
        self.bytes.get(&addr).copied()
    }

    pub fn is_mapped(&self, addr: u32) -> bool {
        self.bytes.contains_key(&addr)
    }

    /// Lowest and one-past-highest populated address.
    pub fn bounds(&self) -> Option<(u32, u64)> {
        let lo = *self.bytes.keys().next()?;
        let hi = *self.bytes.keys().next_back()?;
        Some((lo, hi as u64 + 1))
    }

    /// Coalesce into address-ordered contiguous segments.
    pub fn segments(&self) -> Vec<Segment> {
        let mut out: Vec<Segment> = Vec::new();
        for (&addr, &b) in &self.bytes {
            match out.last_mut() {
                Some(seg) if seg.end() == addr as u64 => seg.bytes.push(b),
                _ => out.push(Segment { base: addr, bytes: vec![b] }),
            }
        }
        out
    }

    /// Copy every populated byte onto `bus`.
    pub fn copy_to(&self, bus: &mut dyn Bus) -> Result<()> {
        for seg in self.segments() {
            for (i, b) in seg.bytes.iter().enumerate() {
                bus.write_u8(seg.base.wrapping_add(i as u32), *b)?;
            }
        }
        Ok(())
    }

    fn byte(&self, addr: u32) -> Result<u8> {
        self.get(addr).ok_or_else(|| anyhow!("address {addr:#010x} is not part of the image"))
    }
}

/// Read-only views plus writes that extend the image; unmapped reads fail.
impl Bus for ProgramImage {
    fn read_u8(&mut self, addr: u32) -> Result<u8> {
        self.byte(addr)
    }
    fn read_u16(&mut self, addr: u32) -> Result<u16> {
        Ok(u16::from_be_bytes([self.byte(addr)?, self.byte(addr.wrapping_add(1))?]))
    }
    fn read_u32(&mut self, addr: u32) -> Result<u32> {
        Ok(((self.read_u16(addr)? as u32) << 16) | self.read_u16(addr.wrapping_add(2))? as u32)
    }
    fn write_u8(&mut self, addr: u32, val: u8) -> Result<()> {
        self.set(addr, val);
        Ok(())
    }
    fn write_u16(&mut self, addr: u32, val: u16) -> Result<()> {
        self.write_bytes(addr, &val.to_be_bytes());
        Ok(())
    }
    fn write_u32(&mut self, addr: u32, val: u32) -> Result<()> {
        self.write_bytes(addr, &val.to_be_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::LinearMemory;

    #[test]
    fn segments_coalesce() {
        let mut img = ProgramImage::from_bytes(0x100, &[1, 2, 3]);
        img.write_bytes(0x103, &[4]);
        img.write_bytes(0x200, &[9, 9]);
        let segs = img.segments();
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0], Segment { base: 0x100, bytes: vec![1, 2, 3, 4] });
        assert_eq!(segs[1].base, 0x200);
        assert_eq!(img.bounds(), Some((0x100, 0x202)));
    }

    #[test]
    fn reads_are_big_endian_and_bounded() {
        let mut img = ProgramImage::new();
        img.write_words(0x10, &[0x4E71, 0x1234]);
        assert_eq!(img.read_u32(0x10).unwrap(), 0x4E71_1234);
        assert!(img.read_u16(0x13).is_err());
    }

    #[test]
    fn copies_onto_a_bus() {
        let img = ProgramImage::from_bytes(4, &[0xAA, 0xBB]);
        let mut mem = LinearMemory::new(8);
        img.copy_to(&mut mem).unwrap();
        assert_eq!(mem.mem, vec![0, 0, 0, 0, 0xAA, 0xBB, 0, 0]);
    }

    #[test]
    fn raw_loader_skips_and_truncates() {
        let path = std::env::temp_dir().join(format!("cf_raw_{}.bin", std::process::id()));
        std::fs::write(&path, [0u8, 1, 2, 3, 4, 5]).unwrap();
        let img = ProgramImage::load_raw(&path, 0x1000, 2, Some(3)).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(img.segments(), vec![Segment { base: 0x1000, bytes: vec![2, 3, 4] }]);
    }
}
