//! Bitwise logic: AND, OR, EOR in register/EA and immediate forms, and NOT.

use crate::context::Context;
use crate::cpu::{Fault, Trap};
use crate::ea::{read_ea, Ea, Modes};
use crate::error::AsmError;
use crate::isa::{data_reg, ea6, immediate, low_ea, need, none, Decoded, Encoding, InstrDef, Instruction, Operands, Size};
use crate::stencil::{RegEaStencil, RegStencil};
use crate::stream::InstructionStream;

const L: &[Size] = &[Size::Long];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogicOp {
    And,
    Or,
    Eor,
}

impl LogicOp {
    fn apply(self, a: u32, b: u32) -> u32 {
        match self {
            LogicOp::And => a & b,
            LogicOp::Or => a | b,
            LogicOp::Eor => a ^ b,
        }
    }
}

/// `op <ea>,Dn` / `op Dn,<ea>`, always long on this core.
struct RegEa {
    def: InstrDef,
    op: LogicOp,
    to_reg: bool,
}

impl Instruction for RegEa {
    fn def(&self) -> &InstrDef {
        &self.def
    }

    fn decode(&self, s: &mut dyn InstructionStream) -> Result<Decoded, Trap> {
        let reg = Ea::DataReg(RegEaStencil(s.opcode()).reg() as u8);
        let ea = low_ea(s, Size::Long)?;
        let d = Decoded::new(s, self.def.mnemonic, Some(Size::Long));
        Ok(if self.to_reg { d.with_src(ea).with_dst(reg) } else { d.with_src(reg).with_dst(ea) })
    }

    fn execute(&self, ctx: &mut Context<'_>) -> Result<(), Fault> {
        let d = self.decode(ctx)?;
        let (src, dst) = (d.src()?, d.dst()?);
        let b = ctx.read_ea(&src, Size::Long)?;
        let op = self.op;
        let r = ctx.modify_ea(&dst, Size::Long, |_, a| op.apply(a, b))?;
        ctx.cpu.set_logic_flags(r, Size::Long);
        Ok(())
    }

    fn plan(&self, _name: &str, ops: &Operands) -> Result<Encoding, AsmError> {
        let m = self.def.mnemonic;
        let size = self.def.pick_size(ops.size)?;
        let (reg, ea, which) = if self.to_reg {
            let ea = need(m, "source", ops.src, self.def.src_modes)?;
            (data_reg(m, "destination", ops.dst)?, ea, "source")
        } else {
            let reg = data_reg(m, "source", ops.src)?;
            (reg, need(m, "destination", ops.dst, self.def.dst_modes)?, "destination")
        };
        let st = RegEaStencil(self.def.opcode).set_reg(reg);
        Ok(Encoding::new(st.0 | ea6(m, which, &ea)?).ea(ea, size))
    }
}

/// ANDI/ORI/EORI `#imm,Dn`.
struct Immediate {
    def: InstrDef,
    op: LogicOp,
}

impl Instruction for Immediate {
    fn def(&self) -> &InstrDef {
        &self.def
    }

    fn decode(&self, s: &mut dyn InstructionStream) -> Result<Decoded, Trap> {
        let reg = RegStencil(s.opcode()).reg() as u8;
        let imm = read_ea(7, 4, Size::Long, s)?;
        Ok(Decoded::new(s, self.def.mnemonic, Some(Size::Long))
            .with_src(imm)
            .with_dst(Ea::DataReg(reg)))
    }

    fn execute(&self, ctx: &mut Context<'_>) -> Result<(), Fault> {
        let d = self.decode(ctx)?;
        let b = ctx.read_ea(&d.src()?, Size::Long)?;
        let op = self.op;
        let r = ctx.modify_ea(&d.dst()?, Size::Long, |_, a| op.apply(a, b))?;
        ctx.cpu.set_logic_flags(r, Size::Long);
        Ok(())
    }

    fn plan(&self, _name: &str, ops: &Operands) -> Result<Encoding, AsmError> {
        let m = self.def.mnemonic;
        let size = self.def.pick_size(ops.size)?;
        let imm = immediate(m, "source", ops.src)?;
        let reg = data_reg(m, "destination", ops.dst)?;
        Ok(Encoding::new(RegStencil(self.def.opcode).set_reg(reg).0).ea(Ea::Immediate(imm), size))
    }
}

struct Not {
    def: InstrDef,
}

impl Instruction for Not {
    fn def(&self) -> &InstrDef {
        &self.def
    }

    fn decode(&self, s: &mut dyn InstructionStream) -> Result<Decoded, Trap> {
        let reg = RegStencil(s.opcode()).reg() as u8;
        Ok(Decoded::new(s, self.def.mnemonic, Some(Size::Long)).with_dst(Ea::DataReg(reg)))
    }

    fn execute(&self, ctx: &mut Context<'_>) -> Result<(), Fault> {
        let d = self.decode(ctx)?;
        let r = ctx.modify_ea(&d.dst()?, Size::Long, |_, a| !a)?;
        ctx.cpu.set_logic_flags(r, Size::Long);
        Ok(())
    }

    fn plan(&self, _name: &str, ops: &Operands) -> Result<Encoding, AsmError> {
        let m = self.def.mnemonic;
        self.def.pick_size(ops.size)?;
        none(m, "source", ops.src)?;
        let reg = data_reg(m, "destination", ops.dst)?;
        Ok(Encoding::new(RegStencil(self.def.opcode).set_reg(reg).0))
    }
}

pub(crate) fn register(v: &mut Vec<Box<dyn Instruction>>) {
    use LogicOp::*;

    for (name, base, op) in [("and", 0xC000u16, And), ("or", 0x8000, Or)] {
        v.push(Box::new(RegEa {
            def: InstrDef::new(name, base | 0x0080, 0x0E3F).sizes(L).src(Modes::DATA),
            op,
            to_reg: true,
        }));
        v.push(Box::new(RegEa {
            def: InstrDef::new(name, base | 0x0180, 0x0E3F).sizes(L).dst(Modes::MEM_ALT),
            op,
            to_reg: false,
        }));
    }
    v.push(Box::new(RegEa {
        def: InstrDef::new("eor", 0xB180, 0x0E3F).sizes(L).dst(Modes::DATA_ALT),
        op: Eor,
        to_reg: false,
    }));

    for (name, opcode, op) in [("andi", 0x0280u16, And), ("ori", 0x0080, Or), ("eori", 0x0A80, Eor)] {
        v.push(Box::new(Immediate {
            def: InstrDef::new(name, opcode, 0x0007).sizes(L).dst(Modes::DN),
            op,
        }));
    }

    v.push(Box::new(Not { def: InstrDef::new("not", 0x4680, 0x0007).sizes(L) }));
}
