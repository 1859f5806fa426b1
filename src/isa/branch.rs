//! Program control: Bcc/BRA/BSR, Scc, TPF, JMP, JSR and RTS.

use crate::context::Context;
use crate::cpu::{Cpu, Fault, Sr, Trap};
use crate::ea::{Ea, Modes};
use crate::error::AsmError;
use crate::isa::{data_reg, ea6, immediate, need, none, undecodable, Decoded, Encoding, Flow, InstrDef, Instruction, IsaTier, Operands, Size};
use crate::stencil::{BranchStencil, CondRegStencil, RegStencil};
use crate::stream::InstructionStream;

/// Condition codes in encoding order. Index 1 is BSR for branches and
/// "false" for Scc.
const CONDITIONS: [&str; 16] = [
    "t", "f", "hi", "ls", "cc", "cs", "ne", "eq", "vc", "vs", "pl", "mi", "ge", "lt", "gt", "le",
];

const BRANCH_NAMES: [&str; 16] = [
    "bra", "bsr", "bhi", "bls", "bcc", "bcs", "bne", "beq", "bvc", "bvs", "bpl", "bmi", "bge", "blt", "bgt", "ble",
];

const SET_NAMES: [&str; 16] = [
    "st", "sf", "shi", "sls", "scc", "scs", "sne", "seq", "svc", "svs", "spl", "smi", "sge", "slt", "sgt", "sle",
];

fn aliases_for(cond: usize, set: bool) -> &'static [&'static str] {
    match (cond, set) {
        (4, false) => &["bhs"],
        (5, false) => &["blo"],
        (4, true) => &["shs"],
        (5, true) => &["slo"],
        _ => &[],
    }
}

/// Evaluate condition `cond` (0..=15) against the CCR.
pub fn condition(cpu: &Cpu, cond: u16) -> bool {
    let (c, v, z, n) = (cpu.flag(Sr::C), cpu.flag(Sr::V), cpu.flag(Sr::Z), cpu.flag(Sr::N));
    match cond & 0xF {
        0 => true,
        1 => false,
        2 => !c && !z,
        3 => c || z,
        4 => !c,
        5 => c,
        6 => !z,
        7 => z,
        8 => !v,
        9 => v,
        10 => !n,
        11 => n,
        12 => n == v,
        13 => n != v,
        14 => !z && n == v,
        _ => z || n != v,
    }
}

pub fn condition_name(cond: u16) -> &'static str {
    CONDITIONS[(cond & 0xF) as usize]
}

/// Whether `offset` fits the displacement encoding of `size`. A zero offset
/// is never accepted, and -1 collides with the long-form marker byte.
pub fn offset_fits(offset: i32, size: Size) -> bool {
    if offset == 0 {
        return false;
    }
    match size {
        Size::Byte => offset != -1 && (-128..=127).contains(&offset),
        Size::Word => (-0x8000..=0x7FFF).contains(&offset),
        Size::Long => true,
    }
}

/// Bcc/BRA/BSR with an 8-bit displacement, or a 16-bit one when the byte is 0.
struct Branch {
    def: InstrDef,
    cond: u16,
}

impl Branch {
    fn relative(m: &'static str, ops: &Operands) -> Result<i32, AsmError> {
        none(m, "destination", ops.dst)?;
        match ops.src {
            Some(Ea::Relative(off)) => Ok(off),
            Some(other) => Err(AsmError::illegal(m, "target", &other, "branch target expected")),
            None => Err(AsmError::MissingOperand { mnemonic: m, which: "target" }),
        }
    }
}

fn take_branch(ctx: &mut Context<'_>, d: &Decoded, cond: u16) -> Result<(), Fault> {
    let Ea::Relative(off) = d.src()? else {
        return Err(undecodable(d.opcode, "branch displacement").into());
    };
    let target = d.address.wrapping_add(2).wrapping_add(off as u32);
    if cond == 1 {
        let ret = ctx.next_pc();
        ctx.push_u32(ret)?;
        ctx.jump(target);
    } else if condition(ctx.cpu, cond) {
        ctx.jump(target);
    }
    Ok(())
}

impl Instruction for Branch {
    fn def(&self) -> &InstrDef {
        &self.def
    }

    fn decode(&self, s: &mut dyn InstructionStream) -> Result<Decoded, Trap> {
        let disp = BranchStencil(s.opcode()).disp();
        let (size, off) = if disp == 0 {
            (Size::Word, s.next_word_signed()? as i32)
        } else {
            (Size::Byte, disp as u8 as i8 as i32)
        };
        Ok(Decoded::new(s, self.def.mnemonic, Some(size)).with_src(Ea::Relative(off)))
    }

    fn execute(&self, ctx: &mut Context<'_>) -> Result<(), Fault> {
        let d = self.decode(ctx)?;
        take_branch(ctx, &d, self.cond)
    }

    fn plan(&self, _name: &str, ops: &Operands) -> Result<Encoding, AsmError> {
        let m = self.def.mnemonic;
        let off = Self::relative(m, ops)?;
        let size = match ops.size {
            Some(Size::Long) => return Err(AsmError::BadSize { mnemonic: m, size: 'l' }),
            Some(s) => s,
            None if offset_fits(off, Size::Byte) => Size::Byte,
            None => Size::Word,
        };
        if !offset_fits(off, size) {
            return Err(AsmError::range(m, off as i64, format!("does not fit a .{} displacement", size.suffix())));
        }
        let op = BranchStencil(self.def.opcode);
        Ok(match size {
            Size::Byte => Encoding::new(op.set_disp(off as u8 as u16).0),
            _ => Encoding::new(op.0).word(off as u16),
        })
    }

    fn is_relative_offset_valid(&self, offset: i32, size: Option<Size>) -> bool {
        match size {
            Some(s @ (Size::Byte | Size::Word)) => offset_fits(offset, s),
            Some(Size::Long) => false,
            None => offset_fits(offset, Size::Byte) || offset_fits(offset, Size::Word),
        }
    }
}

/// The 32-bit displacement form, introduced with ISA_B.
struct LongBranch {
    def: InstrDef,
    cond: u16,
}

impl Instruction for LongBranch {
    fn def(&self) -> &InstrDef {
        &self.def
    }

    fn decode(&self, s: &mut dyn InstructionStream) -> Result<Decoded, Trap> {
        let off = s.next_long_signed()?;
        Ok(Decoded::new(s, self.def.mnemonic, Some(Size::Long)).with_src(Ea::Relative(off)))
    }

    fn execute(&self, ctx: &mut Context<'_>) -> Result<(), Fault> {
        let d = self.decode(ctx)?;
        take_branch(ctx, &d, self.cond)
    }

    fn plan(&self, _name: &str, ops: &Operands) -> Result<Encoding, AsmError> {
        let m = self.def.mnemonic;
        let off = Branch::relative(m, ops)?;
        match ops.size {
            None | Some(Size::Long) => {}
            Some(s) => return Err(AsmError::BadSize { mnemonic: m, size: s.suffix() }),
        }
        if !offset_fits(off, Size::Long) {
            return Err(AsmError::range(m, off as i64, "zero displacement"));
        }
        Ok(Encoding::new(self.def.opcode).long(off as u32))
    }

    fn is_relative_offset_valid(&self, offset: i32, size: Option<Size>) -> bool {
        matches!(size, None | Some(Size::Long)) && offset_fits(offset, Size::Long)
    }
}

/// Scc `Dn`: low byte becomes all ones or all zeros.
struct SetCond {
    def: InstrDef,
}

impl Instruction for SetCond {
    fn def(&self) -> &InstrDef {
        &self.def
    }

    fn decode(&self, s: &mut dyn InstructionStream) -> Result<Decoded, Trap> {
        let reg = CondRegStencil(s.opcode()).reg() as u8;
        Ok(Decoded::new(s, self.def.mnemonic, Some(Size::Byte)).with_dst(Ea::DataReg(reg)))
    }

    fn execute(&self, ctx: &mut Context<'_>) -> Result<(), Fault> {
        let d = self.decode(ctx)?;
        let v = if condition(ctx.cpu, CondRegStencil(d.opcode).cond()) { 0xFF } else { 0 };
        ctx.write_ea(&d.dst()?, Size::Byte, v)
    }

    fn plan(&self, _name: &str, ops: &Operands) -> Result<Encoding, AsmError> {
        let m = self.def.mnemonic;
        self.def.pick_size(ops.size)?;
        none(m, "source", ops.src)?;
        let reg = data_reg(m, "destination", ops.dst)?;
        Ok(Encoding::new(CondRegStencil(self.def.opcode).set_reg(reg).0))
    }
}

/// TPF: a trap-never that skips 0, 1 or 2 extension words.
struct TrapFalse {
    def: InstrDef,
}

impl Instruction for TrapFalse {
    fn def(&self) -> &InstrDef {
        &self.def
    }

    fn decode(&self, s: &mut dyn InstructionStream) -> Result<Decoded, Trap> {
        let (size, imm) = match RegStencil(s.opcode()).reg() {
            2 => (Some(Size::Word), Some(s.next_word()? as u32)),
            3 => (Some(Size::Long), Some(s.next_long()?)),
            _ => (None, None),
        };
        let d = Decoded::new(s, self.def.mnemonic, size);
        Ok(match imm {
            Some(v) => d.with_src(Ea::Immediate(v)),
            None => d,
        })
    }

    fn execute(&self, ctx: &mut Context<'_>) -> Result<(), Fault> {
        self.decode(ctx)?;
        Ok(())
    }

    fn plan(&self, _name: &str, ops: &Operands) -> Result<Encoding, AsmError> {
        let m = self.def.mnemonic;
        none(m, "destination", ops.dst)?;
        let op = RegStencil(self.def.opcode);
        match ops.size {
            None => {
                none(m, "source", ops.src)?;
                Ok(Encoding::new(op.set_reg(4).0))
            }
            Some(Size::Word) => {
                let v = immediate(m, "source", ops.src)?;
                Ok(Encoding::new(op.set_reg(2).0).word(v as u16))
            }
            Some(Size::Long) => {
                let v = immediate(m, "source", ops.src)?;
                Ok(Encoding::new(op.set_reg(3).0).long(v))
            }
            Some(s) => Err(AsmError::BadSize { mnemonic: m, size: s.suffix() }),
        }
    }
}

/// JMP/JSR `<ea>`.
struct Jump {
    def: InstrDef,
    call: bool,
}

impl Instruction for Jump {
    fn def(&self) -> &InstrDef {
        &self.def
    }

    fn decode(&self, s: &mut dyn InstructionStream) -> Result<Decoded, Trap> {
        let target = crate::isa::low_ea(s, Size::Long)?;
        Ok(Decoded::new(s, self.def.mnemonic, None).with_src(target))
    }

    fn execute(&self, ctx: &mut Context<'_>) -> Result<(), Fault> {
        let d = self.decode(ctx)?;
        let target = ctx.address_of(&d.src()?)?;
        if self.call {
            let ret = ctx.next_pc();
            ctx.push_u32(ret)?;
        }
        ctx.jump(target);
        Ok(())
    }

    fn plan(&self, _name: &str, ops: &Operands) -> Result<Encoding, AsmError> {
        let m = self.def.mnemonic;
        let target = need(m, "target", ops.src, self.def.src_modes)?;
        none(m, "destination", ops.dst)?;
        Ok(Encoding::new(self.def.opcode | ea6(m, "target", &target)?).ea(target, Size::Long))
    }
}

struct Return {
    def: InstrDef,
}

impl Instruction for Return {
    fn def(&self) -> &InstrDef {
        &self.def
    }

    fn decode(&self, s: &mut dyn InstructionStream) -> Result<Decoded, Trap> {
        Ok(Decoded::new(s, self.def.mnemonic, None))
    }

    fn execute(&self, ctx: &mut Context<'_>) -> Result<(), Fault> {
        let target = ctx.pull_u32()?;
        ctx.jump(target);
        Ok(())
    }

    fn plan(&self, _name: &str, ops: &Operands) -> Result<Encoding, AsmError> {
        let m = self.def.mnemonic;
        none(m, "source", ops.src)?;
        none(m, "destination", ops.dst)?;
        Ok(Encoding::new(self.def.opcode))
    }
}

pub(crate) fn register(v: &mut Vec<Box<dyn Instruction>>) {
    for (cond, name) in BRANCH_NAMES.iter().enumerate() {
        let flow = match cond {
            0 => Flow::Branch,
            1 => Flow::Call,
            _ => Flow::CondBranch,
        };
        let opcode = 0x6000 | ((cond as u16) << 8);
        v.push(Box::new(Branch {
            def: InstrDef::new(name, opcode, 0x00FF)
                .aliases(aliases_for(cond, false))
                .sizes(&[Size::Byte, Size::Word])
                .flow(flow)
                .exclude(0x00FF, 0x00FF),
            cond: cond as u16,
        }));
        v.push(Box::new(LongBranch {
            def: InstrDef::new(name, opcode | 0x00FF, 0)
                .aliases(aliases_for(cond, false))
                .isa(IsaTier::B)
                .sizes(&[Size::Long])
                .flow(flow),
            cond: cond as u16,
        }));
    }
    for (cond, name) in SET_NAMES.iter().enumerate() {
        v.push(Box::new(SetCond {
            def: InstrDef::new(name, 0x50C0 | ((cond as u16) << 8), 0x0007)
                .aliases(aliases_for(cond, true))
                .sizes(&[Size::Byte])
                .default_size(Size::Byte),
        }));
    }
    v.push(Box::new(TrapFalse {
        def: InstrDef::new("tpf", 0x51F8, 0x0007)
            .sizes(&[Size::Word, Size::Long])
            .exclude(0x0007, 0)
            .exclude(0x0007, 1)
            .exclude(0x0007, 5)
            .exclude(0x0007, 6)
            .exclude(0x0007, 7),
    }));
    v.push(Box::new(Jump {
        def: InstrDef::new("jmp", 0x4EC0, 0x003F).src(Modes::CONTROL).flow(Flow::Indirect),
        call: false,
    }));
    v.push(Box::new(Jump {
        def: InstrDef::new("jsr", 0x4E80, 0x003F).src(Modes::CONTROL).flow(Flow::Call),
        call: true,
    }));
    v.push(Box::new(Return { def: InstrDef::new("rts", 0x4E75, 0).flow(Flow::Return) }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CpuConfig;

    #[test]
    fn offsets_by_size() {
        assert!(!offset_fits(0, Size::Byte));
        assert!(!offset_fits(0, Size::Word));
        assert!(!offset_fits(0, Size::Long));
        assert!(!offset_fits(-1, Size::Byte));
        assert!(offset_fits(-1, Size::Word));
        assert!(offset_fits(127, Size::Byte));
        assert!(!offset_fits(128, Size::Byte));
        assert!(offset_fits(130, Size::Word));
        assert!(!offset_fits(0x8000, Size::Word));
    }

    #[test]
    fn signed_conditions() {
        let mut cpu = Cpu::new(CpuConfig::default());
        cpu.set_ccr(0x08); // N
        assert!(condition(&cpu, 13)); // lt
        assert!(!condition(&cpu, 12)); // ge
        cpu.set_ccr(0x0A); // N and V
        assert!(condition(&cpu, 14)); // gt
        assert_eq!(condition_name(7), "eq");
    }
}
