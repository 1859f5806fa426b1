use anyhow::Error;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::context::Context;
use crate::error::LogicError;
use crate::exception::Exception;
use crate::isa::IsaTier;
use crate::memory::Bus;
use crate::registry::Registry;
use crate::stream::InstructionStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuConfig {
    pub isa: IsaTier,
    /// Bytes of RAM the runner maps at address 0.
    pub memory_size: usize,
    /// VBR value installed by `Cpu::new`.
    pub reset_vbr: u32,
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self {
            isa: IsaTier::C,
            memory_size: 16 * 1024 * 1024,
            reset_vbr: 0,
        }
    }
}

bitflags! {
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sr: u16 {
const C = 1 << 0; // Carry
const V = 1 << 1; // Overflow
const Z = 1 << 2; // Zero
const N = 1 << 3; // Negative
const X = 1 << 4; // Extend
const IPL = 0x0700; // Interrupt priority mask
const M = 1 << 12; // Master/interrupt state
const S = 1 << 13; // Supervisor
const T = 1 << 15; // Trace
const CCR = 0x001F;
}
}

/// Cooperative execution state checked by the run loop between steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Running,
    Stopped,
    Halted,
}

/// MOVEC-addressable control registers: `(code, name)`.
pub const CONTROL_REGS: [(u16, &str); 13] = [
    (0x002, "cacr"),
    (0x003, "asid"),
    (0x004, "acr0"),
    (0x005, "acr1"),
    (0x006, "acr2"),
    (0x007, "acr3"),
    (0x008, "mmubar"),
    (0x801, "vbr"),
    (0xC00, "rombar0"),
    (0xC01, "rombar1"),
    (0xC04, "rambar0"),
    (0xC05, "rambar1"),
    (0xC0F, "mbar"),
];

pub const VBR: u16 = 0x801;

pub fn control_reg_name(code: u16) -> Option<&'static str> {
    CONTROL_REGS.iter().find(|(c, _)| *c == code).map(|(_, n)| *n)
}

pub fn control_reg_code(name: &str) -> Option<u16> {
    CONTROL_REGS
        .iter()
        .find(|(_, n)| n.eq_ignore_ascii_case(name))
        .map(|(c, _)| *c)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cpu {
    pub pc: u32,       // Program Counter
    pub d: [u32; 8],   // Data registers
    pub a: [u32; 8],   // Address registers, A7 is the active stack pointer
    sr: Sr,            // Status register
    other_sp: u32,     // USP while supervisor, SSP while user
    control: [u32; CONTROL_REGS.len()],
    pub state: RunState,
    pub cfg: CpuConfig,
}

/// Failures raised outside modelled execution. All of them stop the
/// simulation except `Reserved`, which `step` takes as an illegal instruction.
#[derive(thiserror::Error, Debug)]
pub enum Trap {
    #[error("Bus error at {addr:#010x}: {source}")]
    Bus { addr: u32, #[source] source: Error },
    #[error(transparent)]
    Logic(#[from] LogicError),
    /// The opcode word is claimed but an extension word is outside the
    /// instruction's encoding.
    #[error("{opcode:#06x} at {addr:#010x}: reserved encoding ({detail})")]
    Reserved { opcode: u16, addr: u32, detail: String },
    #[error("{mnemonic} at {pc:#010x} is recognized but not simulated")]
    Unsimulated { mnemonic: &'static str, pc: u32 },
}

/// Outcome of a failed Execute: either a simulated CPU exception, which
/// `step` delivers through the vector table, or a host-level trap.
#[derive(thiserror::Error, Debug)]
pub enum Fault {
    #[error("CPU exception: {0:?}")]
    Exception(Exception),
    #[error(transparent)]
    Trap(#[from] Trap),
}

impl Trap {
    pub fn reserved(s: &dyn InstructionStream, detail: impl Into<String>) -> Self {
        Trap::Reserved { opcode: s.opcode(), addr: s.address(), detail: detail.into() }
    }
}

impl From<LogicError> for Fault {
    fn from(e: LogicError) -> Self {
        Fault::Trap(Trap::Logic(e))
    }
}

impl From<Exception> for Fault {
    fn from(e: Exception) -> Self {
        Fault::Exception(e)
    }
}

impl Cpu {
    pub fn new(cfg: CpuConfig) -> Self {
        let mut cpu = Self {
            pc: 0,
            d: [0; 8],
            a: [0; 8],
            sr: Sr::S | Sr::IPL,
            other_sp: 0,
            control: [0; CONTROL_REGS.len()],
            state: RunState::Running,
            cfg,
        };
        cpu.set_control(VBR, cfg.reset_vbr);
        cpu
    }

    /// Supervisor-mode reset to an explicit entry point.
    pub fn reset(&mut self, reset_pc: u32) {
        self.sr = Sr::S | Sr::IPL;
        self.pc = reset_pc;
        self.state = RunState::Running;
    }

    /// Reset from the vector table: SSP from VBR+0, PC from VBR+4.
    pub fn reset_from_vectors(&mut self, bus: &mut dyn Bus) -> Result<(), Trap> {
        let vbr = self.vbr();
        let ssp = bus.read_u32(vbr).map_err(|source| Trap::Bus { addr: vbr, source })?;
        let addr = vbr.wrapping_add(4);
        let pc = bus.read_u32(addr).map_err(|source| Trap::Bus { addr, source })?;
        self.reset(pc);
        self.a[7] = ssp;
        Ok(())
    }

    pub fn sr(&self) -> u16 {
        self.sr.bits()
    }

    /// Install a new status register, swapping stack pointers when S changes.
    pub fn set_sr(&mut self, value: u16) {
        let new = Sr::from_bits_truncate(value);
        if new.contains(Sr::S) != self.sr.contains(Sr::S) {
            std::mem::swap(&mut self.a[7], &mut self.other_sp);
        }
        self.sr = new;
    }

    pub fn ccr(&self) -> u8 {
        (self.sr & Sr::CCR).bits() as u8
    }

    pub fn set_ccr(&mut self, value: u8) {
        self.sr = (self.sr & !Sr::CCR) | Sr::from_bits_truncate(value as u16 & Sr::CCR.bits());
    }

    pub fn flag(&self, f: Sr) -> bool {
        self.sr.contains(f)
    }

    pub fn set_flag(&mut self, f: Sr, on: bool) {
        self.sr.set(f, on);
    }

    pub fn is_supervisor(&self) -> bool {
        self.sr.contains(Sr::S)
    }

    pub fn usp(&self) -> u32 {
        if self.is_supervisor() { self.other_sp } else { self.a[7] }
    }

    pub fn set_usp(&mut self, v: u32) {
        if self.is_supervisor() {
            self.other_sp = v;
        } else {
            self.a[7] = v;
        }
    }

    pub fn ssp(&self) -> u32 {
        if self.is_supervisor() { self.a[7] } else { self.other_sp }
    }

    pub fn control(&self, code: u16) -> Option<u32> {
        CONTROL_REGS
            .iter()
            .position(|(c, _)| *c == code)
            .map(|i| self.control[i])
    }

    /// Returns false for codes this CPU has no register for.
    pub fn set_control(&mut self, code: u16, v: u32) -> bool {
        match CONTROL_REGS.iter().position(|(c, _)| *c == code) {
            Some(i) => {
                self.control[i] = v;
                true
            }
            None => false,
        }
    }

    pub fn vbr(&self) -> u32 {
        self.control(VBR).unwrap_or(0)
    }

    pub fn pull_u32(&mut self, bus: &mut dyn Bus) -> Result<u32, Trap> {
        let sp = self.a[7];
        let v = bus.read_u32(sp).map_err(|source| Trap::Bus { addr: sp, source })?;
        self.a[7] = sp.wrapping_add(4);
        Ok(v)
    }

    pub fn enter_stop_state(&mut self) {
        debug!(pc = format_args!("{:#010x}", self.pc), "entering stop state");
        self.state = RunState::Stopped;
    }

    pub fn halt(&mut self) {
        debug!(pc = format_args!("{:#010x}", self.pc), "halted");
        self.state = RunState::Halted;
    }

    /// Execute one instruction.
    ///
    /// Simulated CPU exceptions are taken internally; an `Err` is a host-level
    /// problem. Either way a faulting instruction leaves neither registers nor
    /// memory partly updated.
    pub fn step<B: Bus>(&mut self, bus: &mut B, registry: &Registry) -> Result<RunState, Trap> {
        if self.state != RunState::Running {
            return Ok(self.state);
        }
        let pc = self.pc;
        let opcode = bus
            .read_u16(pc)
            .map_err(|source| Trap::Bus { addr: pc, source })?;

        let Some(insn) = registry.lookup(opcode, self.cfg.isa) else {
            let exc = match opcode >> 12 {
                0xA => Exception::LineA,
                0xF => Exception::LineF,
                _ => Exception::IllegalInstruction,
            };
            self.enter_exception(bus, exc, pc)?;
            return Ok(self.state);
        };
        let def = insn.def();
        if def.privileged && !self.is_supervisor() {
            self.enter_exception(bus, Exception::PrivilegeViolation, pc)?;
            return Ok(self.state);
        }
        trace!(pc = format_args!("{pc:#010x}"), opcode = format_args!("{opcode:#06x}"), mnemonic = def.mnemonic, "execute");

        let saved = self.clone();
        let mut ctx = Context::new(self, bus, pc, opcode);
        let result = match insn.execute(&mut ctx) {
            Err(Fault::Trap(Trap::Reserved { detail, .. })) => {
                debug!(pc = format_args!("{pc:#010x}"), %detail, "reserved encoding");
                Err(Fault::Exception(Exception::IllegalInstruction))
            }
            r => r,
        };
        let next = match result {
            Ok(()) => ctx.finish(),
            Err(_) => {
                let next = ctx.next_pc();
                if let Err(t) = ctx.rollback() {
                    *self = saved;
                    return Err(t);
                }
                next
            }
        };
        match result {
            Ok(()) => {
                self.pc = next;
                Ok(self.state)
            }
            Err(Fault::Exception(exc)) => {
                *self = saved;
                let fault_pc = if exc.stacks_next_pc() { next } else { pc };
                self.enter_exception(bus, exc, fault_pc)?;
                Ok(self.state)
            }
            Err(Fault::Trap(t)) => {
                *self = saved;
                Err(t)
            }
        }
    }

    /// Run until the CPU stops, halts, or `max_steps` instructions executed.
    pub fn run<B: Bus>(&mut self, bus: &mut B, registry: &Registry, max_steps: u64) -> Result<(RunState, u64), Trap> {
        let mut n = 0;
        while n < max_steps {
            let state = self.step(bus, registry)?;
            n += 1;
            if state != RunState::Running {
                return Ok((state, n));
            }
        }
        Ok((self.state, n))
    }
}
