use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cpu::{Cpu, RunState, Sr, Trap};
use crate::memory::Bus;

/// Simulated CPU exceptions, delivered through the vector table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Exception {
    AccessError,
    AddressError,
    IllegalInstruction,
    DivideByZero,
    PrivilegeViolation,
    Trace,
    LineA,
    LineF,
    FormatError,
    /// TRAP #0-15.
    Trap(u8),
}

impl Exception {
    pub fn vector(self) -> u32 {
        match self {
            Exception::AccessError => 2,
            Exception::AddressError => 3,
            Exception::IllegalInstruction => 4,
            Exception::DivideByZero => 5,
            Exception::PrivilegeViolation => 8,
            Exception::Trace => 9,
            Exception::LineA => 10,
            Exception::LineF => 11,
            Exception::FormatError => 14,
            Exception::Trap(n) => 32 + (n as u32 & 0xF),
        }
    }

    /// TRAP stacks the address of the following instruction; faults stack
    /// the address of the faulting one.
    pub fn stacks_next_pc(self) -> bool {
        matches!(self, Exception::Trap(_))
    }
}

/// Build the first longword of a ColdFire exception frame.
pub fn frame_word(misalign: u32, vector: u32, sr: u16) -> u32 {
    ((4 | (misalign & 3)) << 28) | ((vector & 0xFF) << 18) | sr as u32
}

impl Cpu {
    /// Take an exception: switch to supervisor mode, align the SSP, stack
    /// `fault_pc` and the format/vector word, then load the handler address.
    ///
    /// The frame and the handler are fetched before anything is committed,
    /// so a bus error here leaves the CPU as it was.
    pub fn enter_exception(&mut self, bus: &mut dyn Bus, exc: Exception, fault_pc: u32) -> Result<(), Trap> {
        let old_sr = self.sr();
        let mut sr = Sr::from_bits_truncate(old_sr);
        sr.insert(Sr::S);
        sr.remove(Sr::T | Sr::M);

        let ssp = self.ssp();
        let misalign = ssp & 3;
        let frame_sp = (ssp & !3).wrapping_sub(8);
        let pc_slot = frame_sp.wrapping_add(4);

        let slot = self.vbr().wrapping_add(exc.vector() * 4);
        let handler = bus
            .read_u32(slot)
            .map_err(|source| Trap::Bus { addr: slot, source })?;
        let saved = bus
            .read_u32(pc_slot)
            .map_err(|source| Trap::Bus { addr: pc_slot, source })?;
        bus.write_u32(pc_slot, fault_pc)
            .map_err(|source| Trap::Bus { addr: pc_slot, source })?;
        if let Err(source) = bus.write_u32(frame_sp, frame_word(misalign, exc.vector(), old_sr)) {
            bus.write_u32(pc_slot, saved)
                .map_err(|source| Trap::Bus { addr: pc_slot, source })?;
            return Err(Trap::Bus { addr: frame_sp, source });
        }

        debug!(
            ?exc,
            fault_pc = format_args!("{fault_pc:#010x}"),
            handler = format_args!("{handler:#010x}"),
            "exception"
        );
        self.set_sr(sr.bits());
        self.a[7] = frame_sp;
        self.pc = handler;
        if self.state == RunState::Stopped {
            self.state = RunState::Running;
        }
        Ok(())
    }
}
