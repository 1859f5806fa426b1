//! Register shifts: ASL, ASR, LSL, LSR by an immediate or a register count.

use crate::context::Context;
use crate::cpu::{Fault, Sr, Trap};
use crate::ea::Ea;
use crate::error::AsmError;
use crate::isa::{data_reg, Decoded, Encoding, InstrDef, Instruction, Operands, Size};
use crate::stencil::ShiftStencil;
use crate::stream::InstructionStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShiftKind {
    Asl,
    Asr,
    Lsl,
    Lsr,
}

/// Result and last bit shifted out, for a count of 1..=63.
fn shift(kind: ShiftKind, v: u32, count: u32) -> (u32, bool) {
    match kind {
        ShiftKind::Asl | ShiftKind::Lsl => {
            let wide = (v as u64) << count;
            (wide as u32, (wide >> 32) & 1 != 0)
        }
        ShiftKind::Lsr => {
            let wide = v as u64;
            ((wide >> count) as u32, (wide >> (count - 1)) & 1 != 0)
        }
        ShiftKind::Asr => {
            let wide = v as i32 as i64;
            ((wide >> count) as u32, (wide >> (count - 1)) & 1 != 0)
        }
    }
}

struct Shift {
    def: InstrDef,
    kind: ShiftKind,
}

impl Instruction for Shift {
    fn def(&self) -> &InstrDef {
        &self.def
    }

    fn decode(&self, s: &mut dyn InstructionStream) -> Result<Decoded, Trap> {
        let st = ShiftStencil(s.opcode());
        let src = if st.ir() != 0 {
            Ea::DataReg(st.count() as u8)
        } else {
            // A zero count field encodes eight.
            Ea::Immediate(match st.count() {
                0 => 8,
                n => n as u32,
            })
        };
        Ok(Decoded::new(s, self.def.mnemonic, Some(Size::Long))
            .with_src(src)
            .with_dst(Ea::DataReg(st.reg() as u8)))
    }

    fn execute(&self, ctx: &mut Context<'_>) -> Result<(), Fault> {
        let d = self.decode(ctx)?;
        let count = match d.src()? {
            Ea::DataReg(r) => ctx.cpu.d[r as usize] % 64,
            Ea::Immediate(n) => n,
            other => return Err(crate::isa::undecodable(d.opcode, format!("shift count {other:?}")).into()),
        };
        let loc = ctx.resolve(&d.dst()?, Size::Long)?;
        let v = ctx.read(loc, Size::Long)?;
        if count == 0 {
            ctx.cpu.set_logic_flags(v, Size::Long);
            return Ok(());
        }
        let (r, carry) = shift(self.kind, v, count);
        ctx.write(loc, Size::Long, r)?;
        ctx.cpu.set_logic_flags(r, Size::Long);
        ctx.cpu.set_flag(Sr::C, carry);
        ctx.cpu.set_flag(Sr::X, carry);
        Ok(())
    }

    fn plan(&self, _name: &str, ops: &Operands) -> Result<Encoding, AsmError> {
        let m = self.def.mnemonic;
        self.def.pick_size(ops.size)?;
        let dst = data_reg(m, "destination", ops.dst)?;
        let st = ShiftStencil(self.def.opcode).set_reg(dst);
        let st = match ops.src {
            Some(Ea::DataReg(r)) => st.set_ir(1).set_count(r as u16),
            Some(Ea::Immediate(n)) if (1..=8).contains(&n) => st.set_ir(0).set_count((n & 7) as u16),
            Some(Ea::Immediate(n)) => return Err(AsmError::range(m, n as i64, "immediate shift count must be 1..8")),
            Some(other) => return Err(AsmError::illegal(m, "source", &other, "count must be #1..8 or a data register")),
            None => return Err(AsmError::MissingOperand { mnemonic: m, which: "source" }),
        };
        Ok(Encoding::new(st.0))
    }
}

pub(crate) fn register(v: &mut Vec<Box<dyn Instruction>>) {
    for (name, opcode, kind) in [
        ("asl", 0xE180u16, ShiftKind::Asl),
        ("asr", 0xE080, ShiftKind::Asr),
        ("lsl", 0xE188, ShiftKind::Lsl),
        ("lsr", 0xE088, ShiftKind::Lsr),
    ] {
        v.push(Box::new(Shift {
            def: InstrDef::new(name, opcode, 0x0E27).sizes(&[Size::Long]),
            kind,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carries_and_large_counts() {
        assert_eq!(shift(ShiftKind::Lsl, 0x8000_0001, 1), (0x0000_0002, true));
        assert_eq!(shift(ShiftKind::Lsr, 0x0000_0003, 1), (0x0000_0001, true));
        assert_eq!(shift(ShiftKind::Asr, 0x8000_0000, 4), (0xF800_0000, false));
        assert_eq!(shift(ShiftKind::Asr, 0x8000_0000, 40), (0xFFFF_FFFF, true));
        assert_eq!(shift(ShiftKind::Lsl, 0xFFFF_FFFF, 33), (0, false));
        assert_eq!(shift(ShiftKind::Lsr, 0x8000_0000, 32), (0, true));
    }
}
