//! Single-bit manipulation: BTST, BCHG, BCLR, BSET with the bit number taken
//! from an extension word or from a data register.
//!
//! A data-register destination is 32 bits wide and the bit number is taken
//! modulo 32; every other destination is a byte and the number is modulo 8.

use crate::context::Context;
use crate::cpu::{Fault, Trap};
use crate::ea::{Ea, Modes};
use crate::error::AsmError;
use crate::isa::{data_reg, ea6, low_ea, need, Decoded, Encoding, InstrDef, Instruction, Operands, Size};
use crate::stencil::RegEaStencil;
use crate::stream::InstructionStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BitOp {
    Tst,
    Chg,
    Clr,
    Set,
}

impl BitOp {
    fn field(self) -> u16 {
        match self {
            BitOp::Tst => 0,
            BitOp::Chg => 1,
            BitOp::Clr => 2,
            BitOp::Set => 3,
        }
    }
}

fn width_for(dst: &Ea) -> Size {
    if matches!(dst, Ea::DataReg(_)) {
        Size::Long
    } else {
        Size::Byte
    }
}

/// Shared by all eight forms.
fn apply(ctx: &mut Context<'_>, op: BitOp, bit: u32, dst: &Ea) -> Result<(), Fault> {
    let size = width_for(dst);
    let mask = 1u32 << (bit % size.bits());
    let loc = ctx.resolve(dst, size)?;
    let v = ctx.read(loc, size)?;
    ctx.cpu.set_zero_flag(v & mask == 0);
    let new = match op {
        BitOp::Tst => return Ok(()),
        BitOp::Chg => v ^ mask,
        BitOp::Clr => v & !mask,
        BitOp::Set => v | mask,
    };
    ctx.write(loc, size, new)
}

fn check_size(m: &'static str, requested: Option<Size>, dst: &Ea) -> Result<(), AsmError> {
    match requested {
        Some(s) if s != width_for(dst) => Err(AsmError::BadSize { mnemonic: m, size: s.suffix() }),
        _ => Ok(()),
    }
}

/// `Bxxx #n,<ea>`: bit number in an extension word ahead of the EA's own.
struct StaticBit {
    def: InstrDef,
    op: BitOp,
}

impl Instruction for StaticBit {
    fn def(&self) -> &InstrDef {
        &self.def
    }

    fn decode(&self, s: &mut dyn InstructionStream) -> Result<Decoded, Trap> {
        let bit = match s.next_word()? {
            w if w > 0xFF => return Err(Trap::reserved(s, "bit number with a nonzero high byte")),
            w => w as u32,
        };
        let dst = low_ea(s, Size::Byte)?;
        Ok(Decoded::new(s, self.def.mnemonic, Some(width_for(&dst)))
            .with_src(Ea::Immediate(bit))
            .with_dst(dst))
    }

    fn execute(&self, ctx: &mut Context<'_>) -> Result<(), Fault> {
        let d = self.decode(ctx)?;
        let Ea::Immediate(bit) = d.src()? else {
            return Err(crate::isa::undecodable(d.opcode, "static bit number").into());
        };
        apply(ctx, self.op, bit, &d.dst()?)
    }

    fn plan(&self, _name: &str, ops: &Operands) -> Result<Encoding, AsmError> {
        let m = self.def.mnemonic;
        let bit = crate::isa::immediate(m, "source", ops.src)?;
        if bit > 0xFF {
            return Err(AsmError::range(m, bit as i64, "bit number must fit in a byte"));
        }
        let dst = need(m, "destination", ops.dst, self.def.dst_modes)?;
        check_size(m, ops.size, &dst)?;
        Ok(Encoding::new(self.def.opcode | ea6(m, "destination", &dst)?)
            .word(bit as u16)
            .ea(dst, Size::Byte))
    }
}

/// `Bxxx Dn,<ea>`.
struct DynamicBit {
    def: InstrDef,
    op: BitOp,
}

impl Instruction for DynamicBit {
    fn def(&self) -> &InstrDef {
        &self.def
    }

    fn decode(&self, s: &mut dyn InstructionStream) -> Result<Decoded, Trap> {
        let reg = RegEaStencil(s.opcode()).reg() as u8;
        let dst = low_ea(s, Size::Byte)?;
        Ok(Decoded::new(s, self.def.mnemonic, Some(width_for(&dst)))
            .with_src(Ea::DataReg(reg))
            .with_dst(dst))
    }

    fn execute(&self, ctx: &mut Context<'_>) -> Result<(), Fault> {
        let d = self.decode(ctx)?;
        let Ea::DataReg(r) = d.src()? else {
            return Err(crate::isa::undecodable(d.opcode, "bit number register").into());
        };
        let bit = ctx.cpu.d[r as usize];
        apply(ctx, self.op, bit, &d.dst()?)
    }

    fn plan(&self, _name: &str, ops: &Operands) -> Result<Encoding, AsmError> {
        let m = self.def.mnemonic;
        let reg = data_reg(m, "source", ops.src)?;
        let dst = need(m, "destination", ops.dst, self.def.dst_modes)?;
        check_size(m, ops.size, &dst)?;
        let st = RegEaStencil(self.def.opcode).set_reg(reg);
        Ok(Encoding::new(st.0 | ea6(m, "destination", &dst)?).ea(dst, Size::Byte))
    }
}

pub(crate) fn register(v: &mut Vec<Box<dyn Instruction>>) {
    let static_modes = Modes::DN | Modes::IND | Modes::POSTINC | Modes::PREDEC | Modes::DISP;
    for (name, op) in [("btst", BitOp::Tst), ("bchg", BitOp::Chg), ("bclr", BitOp::Clr), ("bset", BitOp::Set)] {
        let dynamic_modes = if op == BitOp::Tst { Modes::DATA & !Modes::IMM } else { Modes::DATA_ALT };
        v.push(Box::new(DynamicBit {
            def: InstrDef::new(name, 0x0100 | (op.field() << 6), 0x0E3F)
                .sizes(&[Size::Byte, Size::Long])
                .dst(dynamic_modes),
            op,
        }));
        v.push(Box::new(StaticBit {
            def: InstrDef::new(name, 0x0800 | (op.field() << 6), 0x003F)
                .sizes(&[Size::Byte, Size::Long])
                .dst(static_modes),
            op,
        }));
    }
}
