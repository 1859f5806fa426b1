use crate::cpu::Trap;
use crate::memory::Bus;

/// Source of the opcode word and its extension words.
///
/// The cursor advances as extension words are pulled; it is independent of
/// the CPU's committed program counter.
pub trait InstructionStream {
    /// The already-fetched first word.
    fn opcode(&self) -> u16;
    /// Address of the opcode word.
    fn address(&self) -> u32;
    /// Address the next extension word would be read from.
    fn cursor(&self) -> u32;
    fn next_word(&mut self) -> Result<u16, Trap>;

    fn next_long(&mut self) -> Result<u32, Trap> {
        let hi = self.next_word()? as u32;
        let lo = self.next_word()? as u32;
        Ok((hi << 16) | lo)
    }

    fn next_word_signed(&mut self) -> Result<i16, Trap> {
        Ok(self.next_word()? as i16)
    }

    fn next_long_signed(&mut self) -> Result<i32, Trap> {
        Ok(self.next_long()? as i32)
    }

    /// Extension words consumed so far.
    fn consumed(&self) -> u32 {
        self.cursor().wrapping_sub(self.address()).wrapping_sub(2) / 2
    }

    /// Called right before a PC-relative operand's extension word is read.
    fn mark_pc_relative(&mut self) {}
}

/// Stream over already-encoded words, e.g. assembler output.
pub struct SliceStream<'a> {
    words: &'a [u16],
    address: u32,
    pos: usize,
}

impl<'a> SliceStream<'a> {
    /// `words[0]` is the opcode word located at `address`.
    pub fn new(words: &'a [u16], address: u32) -> Option<Self> {
        if words.is_empty() {
            return None;
        }
        Some(Self { words, address, pos: 1 })
    }
}

impl InstructionStream for SliceStream<'_> {
    fn opcode(&self) -> u16 {
        self.words[0]
    }
    fn address(&self) -> u32 {
        self.address
    }
    fn cursor(&self) -> u32 {
        self.address.wrapping_add(2 * self.pos as u32)
    }
    fn next_word(&mut self) -> Result<u16, Trap> {
        let addr = self.cursor();
        let w = *self.words.get(self.pos).ok_or_else(|| Trap::Bus {
            addr,
            source: anyhow::anyhow!("instruction truncated after {} word(s)", self.pos),
        })?;
        self.pos += 1;
        Ok(w)
    }
}

/// Read-only stream over a bus, used by the disassembler.
pub struct BusStream<'a> {
    bus: &'a mut dyn Bus,
    address: u32,
    opcode: u16,
    cursor: u32,
}

impl<'a> BusStream<'a> {
    pub fn new(bus: &'a mut dyn Bus, address: u32) -> Result<Self, Trap> {
        let opcode = bus
            .read_u16(address)
            .map_err(|source| Trap::Bus { addr: address, source })?;
        Ok(Self {
            bus,
            address,
            opcode,
            cursor: address.wrapping_add(2),
        })
    }
}

impl InstructionStream for BusStream<'_> {
    fn opcode(&self) -> u16 {
        self.opcode
    }
    fn address(&self) -> u32 {
        self.address
    }
    fn cursor(&self) -> u32 {
        self.cursor
    }
    fn next_word(&mut self) -> Result<u16, Trap> {
        let addr = self.cursor;
        let w = self
            .bus
            .read_u16(addr)
            .map_err(|source| Trap::Bus { addr, source })?;
        self.cursor = addr.wrapping_add(2);
        Ok(w)
    }
}
