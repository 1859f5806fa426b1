use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Byte-addressable view of the simulated address space.
///
/// ColdFire is big-endian; every multi-byte accessor reads and writes the most
/// significant byte at the lowest address.
pub trait Bus {
    fn read_u8(&mut self, addr: u32) -> Result<u8>;
    fn read_u16(&mut self, addr: u32) -> Result<u16>;
    fn read_u32(&mut self, addr: u32) -> Result<u32>;
    fn write_u8(&mut self, addr: u32, val: u8) -> Result<()>;
    fn write_u16(&mut self, addr: u32, val: u16) -> Result<()>;
    fn write_u32(&mut self, addr: u32, val: u32) -> Result<()>;
}

/// Flat RAM mapped at `base`.
#[derive(Clone, Serialize, Deserialize)]
pub struct LinearMemory {
    pub mem: Vec<u8>,
    pub base: u32,
}

impl LinearMemory {
    pub fn new(size: usize) -> Self {
        Self {
            mem: vec![0; size],
            base: 0,
        }
    }

    pub fn with_base(size: usize, base: u32) -> Self {
        Self {
            mem: vec![0; size],
            base,
        }
    }

    pub fn end(&self) -> u64 {
        self.base as u64 + self.mem.len() as u64
    }

    fn offset(&self, addr: u32, len: usize) -> Result<usize> {
        let off = addr.wrapping_sub(self.base) as usize;
        if addr < self.base || off + len > self.mem.len() {
            bail!("address {addr:#010x} (+{len}) outside memory [{:#010x}, {:#x})", self.base, self.end());
        }
        Ok(off)
    }

    fn load_be_u16(&self, off: usize) -> u16 {
        u16::from_be_bytes([self.mem[off], self.mem[off + 1]])
    }
    fn load_be_u32(&self, off: usize) -> u32 {
        u32::from_be_bytes([
            self.mem[off],
            self.mem[off + 1],
            self.mem[off + 2],
            self.mem[off + 3],
        ])
    }
    fn store_be_u16(&mut self, off: usize, v: u16) {
        self.mem[off..off + 2].copy_from_slice(&v.to_be_bytes());
    }
    fn store_be_u32(&mut self, off: usize, v: u32) {
        self.mem[off..off + 4].copy_from_slice(&v.to_be_bytes());
    }
}

impl Bus for LinearMemory {
    fn read_u8(&mut self, addr: u32) -> Result<u8> {
        let off = self.offset(addr, 1)?;
        Ok(self.mem[off])
    }
    fn read_u16(&mut self, addr: u32) -> Result<u16> {
        let off = self.offset(addr, 2)?;
        Ok(self.load_be_u16(off))
    }
    fn read_u32(&mut self, addr: u32) -> Result<u32> {
        let off = self.offset(addr, 4)?;
        Ok(self.load_be_u32(off))
    }
    fn write_u8(&mut self, addr: u32, val: u8) -> Result<()> {
        let off = self.offset(addr, 1)?;
        self.mem[off] = val;
        Ok(())
    }
    fn write_u16(&mut self, addr: u32, val: u16) -> Result<()> {
        let off = self.offset(addr, 2)?;
        self.store_be_u16(off, val);
        Ok(())
    }
    fn write_u32(&mut self, addr: u32, val: u32) -> Result<()> {
        let off = self.offset(addr, 4)?;
        self.store_be_u32(off, val);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn big_endian_layout() {
        let mut m = LinearMemory::new(8);
        m.write_u32(0, 0x1122_3344).unwrap();
        assert_eq!(m.mem[..4], [0x11, 0x22, 0x33, 0x44]);
        assert_eq!(m.read_u16(2).unwrap(), 0x3344);
    }

    #[test]
    fn out_of_range_is_an_error() {
        let mut m = LinearMemory::with_base(4, 0x100);
        assert!(m.read_u8(0xFF).is_err());
        assert!(m.read_u32(0x101).is_err());
        assert!(m.read_u32(0x100).is_ok());
    }
}
