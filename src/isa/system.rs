//! System control: status-register moves, MOVEC, exceptions and returns,
//! STOP/HALT, and the cache/debug opcodes that are recognized but not run.

use tracing::warn;

use crate::context::Context;
use crate::cpu::{Fault, Trap};
use crate::ea::{Ea, Modes, SpecialReg};
use crate::error::AsmError;
use crate::exception::Exception;
use crate::isa::{
    addr_reg, ea6, immediate, low_ea, need, none, undecodable, Decoded, Encoding, Flow, InstrDef, Instruction,
    IsaTier, Operands, Size,
};
use crate::stencil::{CacheStencil, MovecExt, RegStencil, SizedEaStencil, VectorStencil};
use crate::stream::InstructionStream;

const W: &[Size] = &[Size::Word];
const L: &[Size] = &[Size::Long];

fn no_operands(m: &'static str, ops: &Operands) -> Result<(), AsmError> {
    none(m, "source", ops.src)?;
    none(m, "destination", ops.dst)
}

/// Opcodes without operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bare {
    Nop,
    Illegal,
    Halt,
    Rte,
}

struct Simple {
    def: InstrDef,
    kind: Bare,
}

impl Instruction for Simple {
    fn def(&self) -> &InstrDef {
        &self.def
    }

    fn decode(&self, s: &mut dyn InstructionStream) -> Result<Decoded, Trap> {
        Ok(Decoded::new(s, self.def.mnemonic, None))
    }

    fn execute(&self, ctx: &mut Context<'_>) -> Result<(), Fault> {
        match self.kind {
            Bare::Nop => Ok(()),
            Bare::Illegal => Err(Exception::IllegalInstruction.into()),
            Bare::Halt => {
                ctx.cpu.halt();
                Ok(())
            }
            Bare::Rte => {
                let frame = ctx.pull_u32()?;
                let pc = ctx.pull_u32()?;
                let format = frame >> 28;
                if !(4..=7).contains(&format) {
                    return Err(Exception::FormatError.into());
                }
                ctx.cpu.a[7] = ctx.cpu.a[7].wrapping_add(format & 3);
                ctx.cpu.set_sr(frame as u16);
                ctx.jump(pc);
                Ok(())
            }
        }
    }

    fn plan(&self, _name: &str, ops: &Operands) -> Result<Encoding, AsmError> {
        no_operands(self.def.mnemonic, ops)?;
        Ok(Encoding::new(self.def.opcode))
    }
}

/// STOP `#sr`: load SR and wait for an interrupt.
struct Stop {
    def: InstrDef,
}

impl Instruction for Stop {
    fn def(&self) -> &InstrDef {
        &self.def
    }

    fn decode(&self, s: &mut dyn InstructionStream) -> Result<Decoded, Trap> {
        let sr = s.next_word()? as u32;
        Ok(Decoded::new(s, self.def.mnemonic, None).with_src(Ea::Immediate(sr)))
    }

    fn execute(&self, ctx: &mut Context<'_>) -> Result<(), Fault> {
        let d = self.decode(ctx)?;
        let sr = ctx.read_ea(&d.src()?, Size::Word)?;
        ctx.cpu.set_sr(sr as u16);
        ctx.cpu.enter_stop_state();
        Ok(())
    }

    fn plan(&self, _name: &str, ops: &Operands) -> Result<Encoding, AsmError> {
        let m = self.def.mnemonic;
        let sr = immediate(m, "source", ops.src)?;
        none(m, "destination", ops.dst)?;
        Ok(Encoding::new(self.def.opcode).word(sr as u16))
    }
}

/// TRAP `#0..15`.
struct TrapVector {
    def: InstrDef,
}

impl Instruction for TrapVector {
    fn def(&self) -> &InstrDef {
        &self.def
    }

    fn decode(&self, s: &mut dyn InstructionStream) -> Result<Decoded, Trap> {
        let n = VectorStencil(s.opcode()).vector() as u32;
        Ok(Decoded::new(s, self.def.mnemonic, None).with_src(Ea::Immediate(n)))
    }

    fn execute(&self, ctx: &mut Context<'_>) -> Result<(), Fault> {
        let n = VectorStencil(ctx.opcode()).vector() as u8;
        Err(Exception::Trap(n).into())
    }

    fn plan(&self, _name: &str, ops: &Operands) -> Result<Encoding, AsmError> {
        let m = self.def.mnemonic;
        let n = immediate(m, "vector", ops.src)?;
        none(m, "destination", ops.dst)?;
        if n > 15 {
            return Err(AsmError::range(m, n as i64, "trap vector must be 0..15"));
        }
        Ok(Encoding::new(VectorStencil(self.def.opcode).set_vector(n as u16).0))
    }
}

/// MOVE to/from SR and CCR.
struct MoveStatus {
    def: InstrDef,
    reg: SpecialReg,
    to_special: bool,
}

impl Instruction for MoveStatus {
    fn def(&self) -> &InstrDef {
        &self.def
    }

    fn decode(&self, s: &mut dyn InstructionStream) -> Result<Decoded, Trap> {
        let special = Ea::Special(self.reg);
        let d = if self.to_special {
            let src = low_ea(s, Size::Word)?;
            Decoded::new(s, self.def.mnemonic, Some(Size::Word)).with_src(src).with_dst(special)
        } else {
            let reg = RegStencil(s.opcode()).reg() as u8;
            Decoded::new(s, self.def.mnemonic, Some(Size::Word))
                .with_src(special)
                .with_dst(Ea::DataReg(reg))
        };
        Ok(d)
    }

    fn execute(&self, ctx: &mut Context<'_>) -> Result<(), Fault> {
        let d = self.decode(ctx)?;
        let v = ctx.read_ea(&d.src()?, Size::Word)?;
        ctx.write_ea(&d.dst()?, Size::Word, v)
    }

    fn plan(&self, _name: &str, ops: &Operands) -> Result<Encoding, AsmError> {
        let m = self.def.mnemonic;
        self.def.pick_size(ops.size)?;
        let special = Ea::Special(self.reg);
        if self.to_special {
            if ops.dst != Some(special) {
                return Err(match ops.dst {
                    Some(other) => AsmError::illegal(m, "destination", &other, "status register expected"),
                    None => AsmError::MissingOperand { mnemonic: m, which: "destination" },
                });
            }
            let src = need(m, "source", ops.src, self.def.src_modes)?;
            Ok(Encoding::new(self.def.opcode | ea6(m, "source", &src)?).ea(src, Size::Word))
        } else {
            if ops.src != Some(special) {
                return Err(match ops.src {
                    Some(other) => AsmError::illegal(m, "source", &other, "status register expected"),
                    None => AsmError::MissingOperand { mnemonic: m, which: "source" },
                });
            }
            let reg = crate::isa::data_reg(m, "destination", ops.dst)?;
            Ok(Encoding::new(RegStencil(self.def.opcode).set_reg(reg).0))
        }
    }
}

/// MOVE USP: transfer between an address register and the user stack pointer.
struct MoveUsp {
    def: InstrDef,
    to_usp: bool,
}

impl Instruction for MoveUsp {
    fn def(&self) -> &InstrDef {
        &self.def
    }

    fn decode(&self, s: &mut dyn InstructionStream) -> Result<Decoded, Trap> {
        let reg = Ea::AddrReg(RegStencil(s.opcode()).reg() as u8);
        let usp = Ea::Special(SpecialReg::Usp);
        let d = Decoded::new(s, self.def.mnemonic, Some(Size::Long));
        Ok(if self.to_usp { d.with_src(reg).with_dst(usp) } else { d.with_src(usp).with_dst(reg) })
    }

    fn execute(&self, ctx: &mut Context<'_>) -> Result<(), Fault> {
        let d = self.decode(ctx)?;
        let v = ctx.read_ea(&d.src()?, Size::Long)?;
        ctx.write_ea(&d.dst()?, Size::Long, v)
    }

    fn plan(&self, _name: &str, ops: &Operands) -> Result<Encoding, AsmError> {
        let m = self.def.mnemonic;
        self.def.pick_size(ops.size)?;
        let usp = Some(Ea::Special(SpecialReg::Usp));
        let (reg_op, usp_op, reg_which) = if self.to_usp {
            (ops.src, ops.dst, "source")
        } else {
            (ops.dst, ops.src, "destination")
        };
        if usp_op != usp {
            return Err(match usp_op {
                Some(other) => AsmError::illegal(m, "operand", &other, "usp expected"),
                None => AsmError::MissingOperand { mnemonic: m, which: "usp" },
            });
        }
        let reg = addr_reg(m, reg_which, reg_op)?;
        Ok(Encoding::new(RegStencil(self.def.opcode).set_reg(reg).0))
    }
}

/// MOVEC `Rn,Rc`. Control registers are write-only from the program.
struct MoveControl {
    def: InstrDef,
}

impl Instruction for MoveControl {
    fn def(&self) -> &InstrDef {
        &self.def
    }

    fn decode(&self, s: &mut dyn InstructionStream) -> Result<Decoded, Trap> {
        let ext = MovecExt(s.next_word()?);
        let reg = ext.reg() as u8;
        let src = if ext.da() != 0 { Ea::AddrReg(reg) } else { Ea::DataReg(reg) };
        Ok(Decoded::new(s, self.def.mnemonic, Some(Size::Long))
            .with_src(src)
            .with_dst(Ea::Special(SpecialReg::Control(ext.code()))))
    }

    fn execute(&self, ctx: &mut Context<'_>) -> Result<(), Fault> {
        let d = self.decode(ctx)?;
        let v = ctx.read_ea(&d.src()?, Size::Long)?;
        let Ea::Special(reg) = d.dst()? else {
            return Err(undecodable(d.opcode, "control register").into());
        };
        ctx.write_special(reg, v)
    }

    fn plan(&self, _name: &str, ops: &Operands) -> Result<Encoding, AsmError> {
        let m = self.def.mnemonic;
        self.def.pick_size(ops.size)?;
        let src = need(m, "source", ops.src, Modes::DN | Modes::AN)?;
        let (da, reg) = match src {
            Ea::AddrReg(r) => (1, r),
            Ea::DataReg(r) => (0, r),
            other => return Err(AsmError::illegal(m, "source", &other, "register expected")),
        };
        let code = match ops.dst {
            Some(Ea::Special(SpecialReg::Control(code))) if code <= 0xFFF => code,
            Some(other) => return Err(AsmError::illegal(m, "destination", &other, "control register expected")),
            None => return Err(AsmError::MissingOperand { mnemonic: m, which: "destination" }),
        };
        let ext = MovecExt(0).set_da(da).set_reg(reg as u16).set_code(code);
        Ok(Encoding::new(self.def.opcode).word(ext.0))
    }
}

/// Cache and debug opcodes outside the simulated core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unsim {
    Cpushl,
    Intouch,
    Wddata,
    Strldsr,
}

struct Unsimulated {
    def: InstrDef,
    kind: Unsim,
}

impl Instruction for Unsimulated {
    fn def(&self) -> &InstrDef {
        &self.def
    }

    fn decode(&self, s: &mut dyn InstructionStream) -> Result<Decoded, Trap> {
        let m = self.def.mnemonic;
        let op = s.opcode();
        Ok(match self.kind {
            Unsim::Cpushl => {
                let c = CacheStencil(op);
                Decoded::new(s, m, None)
                    .with_src(Ea::Special(SpecialReg::Cache(c.cache() as u8)))
                    .with_dst(Ea::Indirect(c.reg() as u8))
            }
            Unsim::Intouch => Decoded::new(s, m, None).with_dst(Ea::Indirect(RegStencil(op).reg() as u8)),
            Unsim::Wddata => {
                let size = Size::from_bits2(SizedEaStencil(op).size())
                    .ok_or_else(|| undecodable(op, "wddata size 11"))?;
                let dst = low_ea(s, size)?;
                Decoded::new(s, m, Some(size)).with_dst(dst)
            }
            Unsim::Strldsr => {
                if s.next_word()? != 0x46FC {
                    return Err(Trap::reserved(s, "strldsr without its move-to-sr word"));
                }
                let sr = s.next_word()? as u32;
                Decoded::new(s, m, None).with_src(Ea::Immediate(sr))
            }
        })
    }

    fn execute(&self, ctx: &mut Context<'_>) -> Result<(), Fault> {
        let d = self.decode(ctx)?;
        warn!(mnemonic = d.mnemonic, pc = format_args!("{:#010x}", d.address), "instruction not simulated");
        Err(Trap::Unsimulated { mnemonic: d.mnemonic, pc: d.address }.into())
    }

    fn plan(&self, _name: &str, ops: &Operands) -> Result<Encoding, AsmError> {
        let m = self.def.mnemonic;
        match self.kind {
            Unsim::Cpushl => {
                let cache = match ops.src {
                    Some(Ea::Special(SpecialReg::Cache(c))) if (1..=3).contains(&c) => c,
                    Some(other) => return Err(AsmError::illegal(m, "cache", &other, "dc, ic or bc expected")),
                    None => return Err(AsmError::MissingOperand { mnemonic: m, which: "cache" }),
                };
                let reg = indirect_reg(m, ops.dst)?;
                Ok(Encoding::new(CacheStencil(self.def.opcode).set_cache(cache as u16).set_reg(reg).0))
            }
            Unsim::Intouch => {
                none(m, "source", ops.src)?;
                let reg = indirect_reg(m, ops.dst)?;
                Ok(Encoding::new(RegStencil(self.def.opcode).set_reg(reg).0))
            }
            Unsim::Wddata => {
                let size = self.def.pick_size(ops.size)?;
                none(m, "source", ops.src)?;
                let dst = need(m, "destination", ops.dst, self.def.dst_modes)?;
                let op = SizedEaStencil(self.def.opcode).set_size(size.bits2());
                Ok(Encoding::new(op.0 | ea6(m, "destination", &dst)?).ea(dst, size))
            }
            Unsim::Strldsr => {
                let sr = immediate(m, "source", ops.src)?;
                none(m, "destination", ops.dst)?;
                Ok(Encoding::new(self.def.opcode).word(0x46FC).word(sr as u16))
            }
        }
    }
}

fn indirect_reg(m: &'static str, ea: Option<Ea>) -> Result<u16, AsmError> {
    match need(m, "destination", ea, Modes::IND)? {
        Ea::Indirect(r) => Ok(r as u16),
        other => Err(AsmError::illegal(m, "destination", &other, "(An) expected")),
    }
}

pub(crate) fn register(v: &mut Vec<Box<dyn Instruction>>) {
    for (name, opcode, kind, flow, privileged) in [
        ("nop", 0x4E71u16, Bare::Nop, Flow::Next, false),
        ("illegal", 0x4AFC, Bare::Illegal, Flow::Stop, false),
        ("halt", 0x4AC8, Bare::Halt, Flow::Stop, true),
        ("rte", 0x4E73, Bare::Rte, Flow::Return, true),
    ] {
        let def = InstrDef::new(name, opcode, 0).flow(flow);
        let def = if privileged { def.privileged() } else { def };
        v.push(Box::new(Simple { def, kind }));
    }
    v.push(Box::new(Stop { def: InstrDef::new("stop", 0x4E72, 0).privileged().flow(Flow::Stop) }));
    v.push(Box::new(TrapVector { def: InstrDef::new("trap", 0x4E40, 0x000F) }));

    v.push(Box::new(MoveStatus {
        def: InstrDef::new("move", 0x40C0, 0x0007).sizes(W).default_size(Size::Word).privileged(),
        reg: SpecialReg::Sr,
        to_special: false,
    }));
    v.push(Box::new(MoveStatus {
        def: InstrDef::new("move", 0x46C0, 0x003F)
            .sizes(W)
            .default_size(Size::Word)
            .src(Modes::DN | Modes::IMM)
            .privileged(),
        reg: SpecialReg::Sr,
        to_special: true,
    }));
    v.push(Box::new(MoveStatus {
        def: InstrDef::new("move", 0x42C0, 0x0007).sizes(W).default_size(Size::Word),
        reg: SpecialReg::Ccr,
        to_special: false,
    }));
    v.push(Box::new(MoveStatus {
        def: InstrDef::new("move", 0x44C0, 0x003F)
            .sizes(W)
            .default_size(Size::Word)
            .src(Modes::DN | Modes::IMM),
        reg: SpecialReg::Ccr,
        to_special: true,
    }));
    for (opcode, to_usp) in [(0x4E60u16, true), (0x4E68, false)] {
        v.push(Box::new(MoveUsp {
            def: InstrDef::new("move", opcode, 0x0007).isa(IsaTier::B).sizes(L).privileged(),
            to_usp,
        }));
    }
    v.push(Box::new(MoveControl { def: InstrDef::new("movec", 0x4E7B, 0).sizes(L).privileged() }));

    v.push(Box::new(Unsimulated {
        def: InstrDef::new("cpushl", 0xF428, 0x00C7).privileged().exclude(0x00C0, 0),
        kind: Unsim::Cpushl,
    }));
    v.push(Box::new(Unsimulated {
        def: InstrDef::new("intouch", 0xF428, 0x0007).isa(IsaTier::B).privileged(),
        kind: Unsim::Intouch,
    }));
    v.push(Box::new(Unsimulated {
        def: InstrDef::new("wddata", 0xFB00, 0x00FF)
            .sizes(&[Size::Byte, Size::Word, Size::Long])
            .dst(Modes::MEM_ALT)
            .exclude(0x00C0, 0x00C0),
        kind: Unsim::Wddata,
    }));
    v.push(Box::new(Unsimulated {
        def: InstrDef::new("strldsr", 0x40E7, 0).isa(IsaTier::C).privileged(),
        kind: Unsim::Strldsr,
    }));
}
