//! Per-instruction execution context.
//!
//! A `Context` borrows the CPU and the bus for the duration of one Execute.
//! Extension words are pulled through its own cursor; the committed PC is
//! only written back by `Cpu::step` once Execute succeeded. Memory writes are
//! journalled so a faulting instruction can be rolled back.

use crate::cpu::{Cpu, Fault, Trap};
use crate::ea::{locate, Ea, Location, SpecialReg};
use crate::error::LogicError;
use crate::exception::Exception;
use crate::isa::Size;
use crate::memory::Bus;
use crate::stream::InstructionStream;

pub struct Context<'a> {
    pub cpu: &'a mut Cpu,
    bus: &'a mut dyn Bus,
    pc: u32,
    opcode: u16,
    cursor: u32,
    pc_base: u32,
    jump: Option<u32>,
    /// Overwritten memory as `(addr, size, old value)`, oldest first.
    journal: Vec<(u32, Size, u32)>,
}

impl<'a> Context<'a> {
    pub fn new(cpu: &'a mut Cpu, bus: &'a mut dyn Bus, pc: u32, opcode: u16) -> Self {
        let cursor = pc.wrapping_add(2);
        Self { cpu, bus, pc, opcode, cursor, pc_base: cursor, jump: None, journal: Vec::new() }
    }

    /// Address of the instruction following the one being executed, valid
    /// once all extension words have been read.
    pub fn next_pc(&self) -> u32 {
        self.cursor
    }

    /// Resolve `ea` for execution, applying any postincrement/predecrement.
    pub fn resolve(&mut self, ea: &Ea, size: Size) -> Result<Location, Fault> {
        let r = locate(self.cpu, ea, size, self.pc_base)?;
        if let Some((reg, value)) = r.update {
            self.cpu.a[reg as usize] = value;
        }
        Ok(r.loc)
    }

    pub fn read(&mut self, loc: Location, size: Size) -> Result<u32, Fault> {
        Ok(match loc {
            Location::Data(r) => self.cpu.d[r as usize] & size.mask(),
            Location::Addr(r) => self.cpu.a[r as usize] & size.mask(),
            Location::Mem(addr) => self.read_mem(addr, size)?,
            Location::Imm(v) => v & size.mask(),
            Location::Special(reg) => self.read_special(reg)?,
        })
    }

    /// Data registers keep their untouched upper bits; address registers
    /// always receive the sign-extended long.
    pub fn write(&mut self, loc: Location, size: Size, v: u32) -> Result<(), Fault> {
        match loc {
            Location::Data(r) => {
                let old = self.cpu.d[r as usize];
                self.cpu.d[r as usize] = (old & !size.mask()) | (v & size.mask());
            }
            Location::Addr(r) => self.cpu.a[r as usize] = size.sign_extend(v),
            Location::Mem(addr) => self.write_mem(addr, size, v)?,
            Location::Special(reg) => self.write_special(reg, v)?,
            Location::Imm(_) => {
                return Err(LogicError::Undecodable {
                    opcode: self.opcode,
                    detail: "write to an immediate operand".into(),
                }
                .into())
            }
        }
        Ok(())
    }

    pub fn read_ea(&mut self, ea: &Ea, size: Size) -> Result<u32, Fault> {
        let loc = self.resolve(ea, size)?;
        self.read(loc, size)
    }

    pub fn write_ea(&mut self, ea: &Ea, size: Size, v: u32) -> Result<(), Fault> {
        let loc = self.resolve(ea, size)?;
        self.write(loc, size, v)
    }

    /// Read-modify-write helper: the EA is resolved once, so a postincrement
    /// destination is only stepped once.
    pub fn modify_ea(&mut self, ea: &Ea, size: Size, f: impl FnOnce(&mut Self, u32) -> u32) -> Result<u32, Fault> {
        let loc = self.resolve(ea, size)?;
        let old = self.read(loc, size)?;
        let new = f(self, old);
        self.write(loc, size, new)?;
        Ok(new)
    }

    /// Plain effective address of a control-mode operand (LEA, PEA, JMP).
    pub fn address_of(&mut self, ea: &Ea) -> Result<u32, Fault> {
        match self.resolve(ea, Size::Long)? {
            Location::Mem(addr) => Ok(addr),
            _ => Err(LogicError::NotAddressable { ea: *ea }.into()),
        }
    }

    pub fn read_mem(&mut self, addr: u32, size: Size) -> Result<u32, Fault> {
        let r = match size {
            Size::Byte => self.bus.read_u8(addr).map(u32::from),
            Size::Word => self.bus.read_u16(addr).map(u32::from),
            Size::Long => self.bus.read_u32(addr),
        };
        Ok(r.map_err(|source| Trap::Bus { addr, source })?)
    }

    fn store(&mut self, addr: u32, size: Size, v: u32) -> Result<(), Trap> {
        let r = match size {
            Size::Byte => self.bus.write_u8(addr, v as u8),
            Size::Word => self.bus.write_u16(addr, v as u16),
            Size::Long => self.bus.write_u32(addr, v),
        };
        r.map_err(|source| Trap::Bus { addr, source })
    }

    pub fn write_mem(&mut self, addr: u32, size: Size, v: u32) -> Result<(), Fault> {
        let old = self.read_mem(addr, size)?;
        self.store(addr, size, v)?;
        self.journal.push((addr, size, old));
        Ok(())
    }

    pub fn push_u32(&mut self, v: u32) -> Result<(), Fault> {
        let sp = self.cpu.a[7].wrapping_sub(4);
        self.write_mem(sp, Size::Long, v)?;
        self.cpu.a[7] = sp;
        Ok(())
    }

    pub fn pull_u32(&mut self) -> Result<u32, Fault> {
        Ok(self.cpu.pull_u32(self.bus)?)
    }

    pub fn read_special(&mut self, reg: SpecialReg) -> Result<u32, Fault> {
        Ok(match reg {
            SpecialReg::Sr => self.cpu.sr() as u32,
            SpecialReg::Ccr => self.cpu.ccr() as u32,
            SpecialReg::Usp => self.cpu.usp(),
            SpecialReg::Control(code) => self
                .cpu
                .control(code)
                .ok_or(Fault::Exception(Exception::IllegalInstruction))?,
            SpecialReg::Cache(_) => return Err(LogicError::NotAddressable { ea: Ea::Special(reg) }.into()),
        })
    }

    pub fn write_special(&mut self, reg: SpecialReg, v: u32) -> Result<(), Fault> {
        match reg {
            SpecialReg::Sr => self.cpu.set_sr(v as u16),
            SpecialReg::Ccr => self.cpu.set_ccr(v as u8),
            SpecialReg::Usp => self.cpu.set_usp(v),
            SpecialReg::Control(code) => {
                if !self.cpu.set_control(code, v) {
                    return Err(Exception::IllegalInstruction.into());
                }
            }
            SpecialReg::Cache(_) => return Err(LogicError::NotAddressable { ea: Ea::Special(reg) }.into()),
        }
        Ok(())
    }

    /// Transfer control; the committed PC becomes `target` instead of the
    /// address following this instruction.
    pub fn jump(&mut self, target: u32) {
        self.jump = Some(target);
    }

    /// Consume the context and return the PC to commit.
    pub fn finish(self) -> u32 {
        self.jump.unwrap_or(self.cursor)
    }

    /// Restore every memory location this instruction wrote, newest first.
    /// Registers are the caller's business.
    pub fn rollback(mut self) -> Result<(), Trap> {
        while let Some((addr, size, old)) = self.journal.pop() {
            self.store(addr, size, old)?;
        }
        Ok(())
    }
}

impl InstructionStream for Context<'_> {
    fn opcode(&self) -> u16 {
        self.opcode
    }

    fn address(&self) -> u32 {
        self.pc
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

    fn mark_pc_relative(&mut self) {
        self.pc_base = self.cursor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CpuConfig;
    use crate::memory::LinearMemory;

    #[test]
    fn postincrement_applies_once_per_resolve() {
        let mut cpu = Cpu::new(CpuConfig::default());
        let mut mem = LinearMemory::new(0x100);
        cpu.a[0] = 0x10;
        mem.write_u16(0x10, 0xBEEF).unwrap();
        let mut ctx = Context::new(&mut cpu, &mut mem, 0, 0);
        assert_eq!(ctx.read_ea(&Ea::PostInc(0), Size::Word).unwrap(), 0xBEEF);
        assert_eq!(ctx.cpu.a[0], 0x12);
    }

    #[test]
    fn sized_register_writes() {
        let mut cpu = Cpu::new(CpuConfig::default());
        let mut mem = LinearMemory::new(0x10);
        cpu.d[0] = 0x1234_5678;
        let mut ctx = Context::new(&mut cpu, &mut mem, 0, 0);
        ctx.write(Location::Data(0), Size::Byte, 0xAB).unwrap();
        ctx.write(Location::Addr(1), Size::Word, 0x8000).unwrap();
        assert_eq!(ctx.cpu.d[0], 0x1234_56AB);
        assert_eq!(ctx.cpu.a[1], 0xFFFF_8000);
    }

    #[test]
    fn rollback_restores_written_memory() {
        let mut cpu = Cpu::new(CpuConfig::default());
        let mut mem = LinearMemory::new(0x100);
        mem.write_u32(0x40, 0x1111_1111).unwrap();
        cpu.a[7] = 0x48;
        let mut ctx = Context::new(&mut cpu, &mut mem, 0, 0);
        ctx.write_mem(0x40, Size::Word, 0xBEEF).unwrap();
        ctx.push_u32(0xDEAD_BEEF).unwrap();
        assert!(ctx.write_mem(0x100, Size::Long, 0).is_err());
        ctx.rollback().unwrap();
        assert_eq!(mem.read_u32(0x40).unwrap(), 0x1111_1111);
        assert_eq!(mem.read_u32(0x44).unwrap(), 0);
    }

    #[test]
    fn jump_overrides_cursor() {
        let mut cpu = Cpu::new(CpuConfig::default());
        let mut mem = LinearMemory::new(0x10);
        let mut ctx = Context::new(&mut cpu, &mut mem, 4, 0);
        ctx.next_word().unwrap();
        assert_eq!(ctx.next_pc(), 8);
        ctx.jump(0x100);
        assert_eq!(ctx.finish(), 0x100);
    }
}
