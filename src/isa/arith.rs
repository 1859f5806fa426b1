//! Integer arithmetic: ADD/SUB/CMP and their address, immediate, quick and
//! extended forms, plus NEG, NEGX, CLR, TST and the sign extensions.

use crate::context::Context;
use crate::cpu::{Fault, Sr, Trap};
use crate::ea::{read_ea, Ea, Location, Modes};
use crate::error::AsmError;
use crate::flags::AluOp;
use crate::isa::{
    data_reg, ea6, immediate, low_ea, need, none, Decoded, Encoding, InstrDef, Instruction, IsaTier, Operands, Size,
};
use crate::stencil::{QuickStencil, RegEaStencil, RegStencil, SizedEaStencil};
use crate::stream::InstructionStream;

const B: &[Size] = &[Size::Byte];
const W: &[Size] = &[Size::Word];
const L: &[Size] = &[Size::Long];
const BWL: &[Size] = &[Size::Byte, Size::Word, Size::Long];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArithOp {
    Add,
    Sub,
    Cmp,
}

impl ArithOp {
    fn apply(self, dst: u32, src: u32) -> u32 {
        match self {
            ArithOp::Add => dst.wrapping_add(src),
            ArithOp::Sub | ArithOp::Cmp => dst.wrapping_sub(src),
        }
    }

    fn alu(self) -> AluOp {
        match self {
            ArithOp::Add => AluOp::Add,
            ArithOp::Sub => AluOp::Sub,
            ArithOp::Cmp => AluOp::Cmp,
        }
    }
}

/// `op <ea>,Dn` and `op Dn,<ea>` at a fixed size.
struct RegEa {
    def: InstrDef,
    op: ArithOp,
    size: Size,
    to_reg: bool,
}

impl Instruction for RegEa {
    fn def(&self) -> &InstrDef {
        &self.def
    }

    fn decode(&self, s: &mut dyn InstructionStream) -> Result<Decoded, Trap> {
        let reg = Ea::DataReg(RegEaStencil(s.opcode()).reg() as u8);
        let ea = low_ea(s, self.size)?;
        let d = Decoded::new(s, self.def.mnemonic, Some(self.size));
        Ok(if self.to_reg { d.with_src(ea).with_dst(reg) } else { d.with_src(reg).with_dst(ea) })
    }

    fn execute(&self, ctx: &mut Context<'_>) -> Result<(), Fault> {
        let d = self.decode(ctx)?;
        let (src, dst) = (d.src()?, d.dst()?);
        let size = self.size;
        let b = ctx.read_ea(&src, size)?;
        let loc = ctx.resolve(&dst, size)?;
        let a = ctx.read(loc, size)?;
        let r = self.op.apply(a, b);
        if self.op != ArithOp::Cmp {
            ctx.write(loc, size, r)?;
        }
        ctx.cpu.set_all_flags(r, a, b, size, false, self.op.alu());
        Ok(())
    }

    fn plan(&self, _name: &str, ops: &Operands) -> Result<Encoding, AsmError> {
        let m = self.def.mnemonic;
        let size = self.def.pick_size(ops.size)?;
        if self.to_reg {
            let src = need(m, "source", ops.src, self.def.src_modes)?;
            if size == Size::Byte && src.mode() == Modes::AN {
                return Err(AsmError::illegal(m, "source", &src, "byte access to an address register"));
            }
            let reg = data_reg(m, "destination", ops.dst)?;
            let st = RegEaStencil(self.def.opcode).set_reg(reg);
            Ok(Encoding::new(st.0 | ea6(m, "source", &src)?).ea(src, size))
        } else {
            let reg = data_reg(m, "source", ops.src)?;
            let dst = need(m, "destination", ops.dst, self.def.dst_modes)?;
            let st = RegEaStencil(self.def.opcode).set_reg(reg);
            Ok(Encoding::new(st.0 | ea6(m, "destination", &dst)?).ea(dst, size))
        }
    }
}

/// ADDA/SUBA/CMPA: the source is sign-extended to 32 bits; only CMPA
/// touches the flags.
struct AddrEa {
    def: InstrDef,
    op: ArithOp,
    size: Size,
}

impl Instruction for AddrEa {
    fn def(&self) -> &InstrDef {
        &self.def
    }

    fn decode(&self, s: &mut dyn InstructionStream) -> Result<Decoded, Trap> {
        let reg = RegEaStencil(s.opcode()).reg() as u8;
        let ea = low_ea(s, self.size)?;
        Ok(Decoded::new(s, self.def.mnemonic, Some(self.size))
            .with_src(ea)
            .with_dst(Ea::AddrReg(reg)))
    }

    fn execute(&self, ctx: &mut Context<'_>) -> Result<(), Fault> {
        let d = self.decode(ctx)?;
        let (src, dst) = (d.src()?, d.dst()?);
        let b = self.size.sign_extend(ctx.read_ea(&src, self.size)?);
        let Ea::AddrReg(r) = dst else {
            return Err(crate::isa::undecodable(d.opcode, "address register destination expected").into());
        };
        let a = ctx.cpu.a[r as usize];
        let result = self.op.apply(a, b);
        match self.op {
            ArithOp::Cmp => ctx.cpu.set_all_flags(result, a, b, Size::Long, false, AluOp::Cmp),
            _ => ctx.cpu.a[r as usize] = result,
        }
        Ok(())
    }

    fn plan(&self, _name: &str, ops: &Operands) -> Result<Encoding, AsmError> {
        let m = self.def.mnemonic;
        let size = self.def.pick_size(ops.size)?;
        let src = need(m, "source", ops.src, self.def.src_modes)?;
        let reg = crate::isa::addr_reg(m, "destination", ops.dst)?;
        let st = RegEaStencil(self.def.opcode).set_reg(reg);
        Ok(Encoding::new(st.0 | ea6(m, "source", &src)?).ea(src, size))
    }
}

/// ADDI/SUBI/CMPI `#imm,Dn`. Compares truncate the register to the
/// operand size first.
struct Immediate {
    def: InstrDef,
    op: ArithOp,
    size: Size,
}

impl Instruction for Immediate {
    fn def(&self) -> &InstrDef {
        &self.def
    }

    fn decode(&self, s: &mut dyn InstructionStream) -> Result<Decoded, Trap> {
        let reg = RegStencil(s.opcode()).reg() as u8;
        let imm = read_ea(7, 4, self.size, s)?;
        Ok(Decoded::new(s, self.def.mnemonic, Some(self.size))
            .with_src(imm)
            .with_dst(Ea::DataReg(reg)))
    }

    fn execute(&self, ctx: &mut Context<'_>) -> Result<(), Fault> {
        let d = self.decode(ctx)?;
        let (src, dst) = (d.src()?, d.dst()?);
        let b = ctx.read_ea(&src, self.size)?;
        let loc = ctx.resolve(&dst, self.size)?;
        let a = ctx.read(loc, self.size)?;
        let r = self.op.apply(a, b);
        if self.op != ArithOp::Cmp {
            ctx.write(loc, self.size, r)?;
        }
        ctx.cpu.set_all_flags(r, a, b, self.size, false, self.op.alu());
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

/// ADDQ/SUBQ `#1..8,<ea>`. An address-register destination is plain
/// pointer arithmetic and leaves the flags alone.
struct Quick {
    def: InstrDef,
    op: ArithOp,
}

impl Instruction for Quick {
    fn def(&self) -> &InstrDef {
        &self.def
    }

    fn decode(&self, s: &mut dyn InstructionStream) -> Result<Decoded, Trap> {
        let data = match QuickStencil(s.opcode()).data() {
            0 => 8,
            n => n as u32,
        };
        let ea = low_ea(s, Size::Long)?;
        Ok(Decoded::new(s, self.def.mnemonic, Some(Size::Long))
            .with_src(Ea::Immediate(data))
            .with_dst(ea))
    }

    fn execute(&self, ctx: &mut Context<'_>) -> Result<(), Fault> {
        let d = self.decode(ctx)?;
        let (src, dst) = (d.src()?, d.dst()?);
        let Ea::Immediate(b) = src else {
            return Err(crate::isa::undecodable(d.opcode, "quick data").into());
        };
        let loc = ctx.resolve(&dst, Size::Long)?;
        let a = ctx.read(loc, Size::Long)?;
        let r = self.op.apply(a, b);
        ctx.write(loc, Size::Long, r)?;
        if !matches!(loc, Location::Addr(_)) {
            ctx.cpu.set_all_flags(r, a, b, Size::Long, false, self.op.alu());
        }
        Ok(())
    }

    fn plan(&self, _name: &str, ops: &Operands) -> Result<Encoding, AsmError> {
        let m = self.def.mnemonic;
        let size = self.def.pick_size(ops.size)?;
        let data = immediate(m, "source", ops.src)?;
        if !(1..=8).contains(&data) {
            return Err(AsmError::range(m, data as i64, "quick data must be 1..8"));
        }
        let dst = need(m, "destination", ops.dst, self.def.dst_modes)?;
        let st = QuickStencil(self.def.opcode).set_data((data & 7) as u16);
        Ok(Encoding::new(st.0 | ea6(m, "destination", &dst)?).ea(dst, size))
    }
}

/// ADDX/SUBX `Dy,Dx`: the X flag is an extra operand and Z only clears.
struct Extended {
    def: InstrDef,
    op: ArithOp,
}

impl Instruction for Extended {
    fn def(&self) -> &InstrDef {
        &self.def
    }

    fn decode(&self, s: &mut dyn InstructionStream) -> Result<Decoded, Trap> {
        let st = RegEaStencil(s.opcode());
        Ok(Decoded::new(s, self.def.mnemonic, Some(Size::Long))
            .with_src(Ea::DataReg(st.ea_reg() as u8))
            .with_dst(Ea::DataReg(st.reg() as u8)))
    }

    fn execute(&self, ctx: &mut Context<'_>) -> Result<(), Fault> {
        let d = self.decode(ctx)?;
        let (src, dst) = (d.src()?, d.dst()?);
        let b = ctx.read_ea(&src, Size::Long)?;
        let loc = ctx.resolve(&dst, Size::Long)?;
        let a = ctx.read(loc, Size::Long)?;
        let x = ctx.cpu.flag(Sr::X) as u32;
        let r = self.op.apply(self.op.apply(a, b), x);
        ctx.write(loc, Size::Long, r)?;
        ctx.cpu.set_all_flags(r, a, b, Size::Long, true, self.op.alu());
        Ok(())
    }

    fn plan(&self, _name: &str, ops: &Operands) -> Result<Encoding, AsmError> {
        let m = self.def.mnemonic;
        self.def.pick_size(ops.size)?;
        let y = data_reg(m, "source", ops.src)?;
        let x = data_reg(m, "destination", ops.dst)?;
        Ok(Encoding::new(RegEaStencil(self.def.opcode).set_reg(x).set_ea_reg(y).0))
    }
}

/// NEG/NEGX `Dn`.
struct Negate {
    def: InstrDef,
    extend: bool,
}

impl Instruction for Negate {
    fn def(&self) -> &InstrDef {
        &self.def
    }

    fn decode(&self, s: &mut dyn InstructionStream) -> Result<Decoded, Trap> {
        let reg = RegStencil(s.opcode()).reg() as u8;
        Ok(Decoded::new(s, self.def.mnemonic, Some(Size::Long)).with_dst(Ea::DataReg(reg)))
    }

    fn execute(&self, ctx: &mut Context<'_>) -> Result<(), Fault> {
        let d = self.decode(ctx)?;
        let dst = d.dst()?;
        let loc = ctx.resolve(&dst, Size::Long)?;
        let b = ctx.read(loc, Size::Long)?;
        let x = if self.extend { ctx.cpu.flag(Sr::X) as u32 } else { 0 };
        let r = 0u32.wrapping_sub(b).wrapping_sub(x);
        ctx.write(loc, Size::Long, r)?;
        ctx.cpu.set_all_flags(r, 0, b, Size::Long, self.extend, AluOp::Neg);
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

/// CLR and TST share the `ss` + EA layout.
struct SizedUnary {
    def: InstrDef,
    clear: bool,
}

impl Instruction for SizedUnary {
    fn def(&self) -> &InstrDef {
        &self.def
    }

    fn decode(&self, s: &mut dyn InstructionStream) -> Result<Decoded, Trap> {
        let op = s.opcode();
        let size = Size::from_bits2(SizedEaStencil(op).size()).ok_or_else(|| crate::isa::undecodable(op, "size 11"))?;
        let ea = low_ea(s, size)?;
        let d = Decoded::new(s, self.def.mnemonic, Some(size));
        Ok(if self.clear { d.with_dst(ea) } else { d.with_src(ea) })
    }

    fn execute(&self, ctx: &mut Context<'_>) -> Result<(), Fault> {
        let d = self.decode(ctx)?;
        let size = d.size_or_long();
        if self.clear {
            ctx.write_ea(&d.dst()?, size, 0)?;
            ctx.cpu.set_logic_flags(0, size);
        } else {
            let v = ctx.read_ea(&d.src()?, size)?;
            ctx.cpu.set_logic_flags(v, size);
        }
        Ok(())
    }

    fn plan(&self, _name: &str, ops: &Operands) -> Result<Encoding, AsmError> {
        let m = self.def.mnemonic;
        let size = self.def.pick_size(ops.size)?;
        let (which, ea, modes) = if self.clear {
            none(m, "source", ops.src)?;
            ("destination", ops.dst, self.def.dst_modes)
        } else {
            none(m, "destination", ops.dst)?;
            ("source", ops.src, self.def.src_modes)
        };
        let ea = need(m, which, ea, modes)?;
        if size == Size::Byte && ea.mode() == Modes::AN {
            return Err(AsmError::illegal(m, which, &ea, "byte access to an address register"));
        }
        let st = SizedEaStencil(self.def.opcode).set_size(size.bits2());
        Ok(Encoding::new(st.0 | ea6(m, which, &ea)?).ea(ea, size))
    }
}

/// EXT.W, EXT.L and EXTB.L.
struct Extend {
    def: InstrDef,
    from: Size,
    to: Size,
}

impl Instruction for Extend {
    fn def(&self) -> &InstrDef {
        &self.def
    }

    fn decode(&self, s: &mut dyn InstructionStream) -> Result<Decoded, Trap> {
        let reg = RegStencil(s.opcode()).reg() as u8;
        Ok(Decoded::new(s, self.def.mnemonic, Some(self.to)).with_dst(Ea::DataReg(reg)))
    }

    fn execute(&self, ctx: &mut Context<'_>) -> Result<(), Fault> {
        let d = self.decode(ctx)?;
        let dst = d.dst()?;
        let loc = ctx.resolve(&dst, self.to)?;
        let v = self.from.sign_extend(ctx.read(loc, self.from)?);
        ctx.write(loc, self.to, v)?;
        ctx.cpu.set_logic_flags(v, self.to);
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
    use ArithOp::*;

    for (name, base, op) in [("add", 0xD000u16, Add), ("sub", 0x9000, Sub)] {
        v.push(Box::new(RegEa {
            def: InstrDef::new(name, base | 0x0080, 0x0E3F).sizes(L).src(Modes::ALL),
            op,
            size: Size::Long,
            to_reg: true,
        }));
        v.push(Box::new(RegEa {
            def: InstrDef::new(name, base | 0x0180, 0x0E3F).sizes(L).dst(Modes::MEM_ALT),
            op,
            size: Size::Long,
            to_reg: false,
        }));
        let a_name = if op == Add { "adda" } else { "suba" };
        v.push(Box::new(AddrEa {
            def: InstrDef::new(a_name, base | 0x01C0, 0x0E3F).sizes(L).src(Modes::ALL),
            op,
            size: Size::Long,
        }));
    }

    v.push(Box::new(RegEa {
        def: InstrDef::new("cmp", 0xB080, 0x0E3F).sizes(L).src(Modes::ALL),
        op: Cmp,
        size: Size::Long,
        to_reg: true,
    }));
    v.push(Box::new(RegEa {
        def: InstrDef::new("cmp", 0xB000, 0x0E3F).isa(IsaTier::B).sizes(B).src(Modes::DATA),
        op: Cmp,
        size: Size::Byte,
        to_reg: true,
    }));
    v.push(Box::new(RegEa {
        def: InstrDef::new("cmp", 0xB040, 0x0E3F).isa(IsaTier::B).sizes(W).src(Modes::ALL),
        op: Cmp,
        size: Size::Word,
        to_reg: true,
    }));
    v.push(Box::new(AddrEa {
        def: InstrDef::new("cmpa", 0xB1C0, 0x0E3F).sizes(L).src(Modes::ALL),
        op: Cmp,
        size: Size::Long,
    }));
    v.push(Box::new(AddrEa {
        def: InstrDef::new("cmpa", 0xB0C0, 0x0E3F).isa(IsaTier::B).sizes(W).src(Modes::ALL),
        op: Cmp,
        size: Size::Word,
    }));

    for (name, opcode, op, size, isa) in [
        ("addi", 0x0680u16, Add, Size::Long, IsaTier::A),
        ("subi", 0x0480, Sub, Size::Long, IsaTier::A),
        ("cmpi", 0x0C80, Cmp, Size::Long, IsaTier::A),
        ("cmpi", 0x0C00, Cmp, Size::Byte, IsaTier::B),
        ("cmpi", 0x0C40, Cmp, Size::Word, IsaTier::B),
    ] {
        let sizes = match size {
            Size::Byte => B,
            Size::Word => W,
            Size::Long => L,
        };
        v.push(Box::new(Immediate {
            def: InstrDef::new(name, opcode, 0x0007).isa(isa).sizes(sizes).dst(Modes::DN),
            op,
            size,
        }));
    }

    v.push(Box::new(Quick {
        def: InstrDef::new("addq", 0x5080, 0x0E3F).sizes(L).dst(Modes::ALTERABLE),
        op: Add,
    }));
    v.push(Box::new(Quick {
        def: InstrDef::new("subq", 0x5180, 0x0E3F).sizes(L).dst(Modes::ALTERABLE),
        op: Sub,
    }));
    v.push(Box::new(Extended { def: InstrDef::new("addx", 0xD180, 0x0E07).sizes(L), op: Add }));
    v.push(Box::new(Extended { def: InstrDef::new("subx", 0x9180, 0x0E07).sizes(L), op: Sub }));

    v.push(Box::new(Negate { def: InstrDef::new("neg", 0x4480, 0x0007).sizes(L), extend: false }));
    v.push(Box::new(Negate { def: InstrDef::new("negx", 0x4080, 0x0007).sizes(L), extend: true }));

    v.push(Box::new(SizedUnary {
        def: InstrDef::new("clr", 0x4200, 0x00FF)
            .sizes(BWL)
            .dst(Modes::DATA_ALT)
            .exclude(0x00C0, 0x00C0),
        clear: true,
    }));
    v.push(Box::new(SizedUnary {
        def: InstrDef::new("tst", 0x4A00, 0x00FF)
            .sizes(BWL)
            .src(Modes::ALL)
            .exclude(0x00C0, 0x00C0)
            .exclude(0x00F8, 0x0008),
        clear: false,
    }));

    v.push(Box::new(Extend {
        def: InstrDef::new("ext", 0x4880, 0x0007).sizes(W).default_size(Size::Word),
        from: Size::Byte,
        to: Size::Word,
    }));
    v.push(Box::new(Extend {
        def: InstrDef::new("ext", 0x48C0, 0x0007).sizes(L),
        from: Size::Word,
        to: Size::Long,
    }));
    v.push(Box::new(Extend {
        def: InstrDef::new("extb", 0x49C0, 0x0007).sizes(L),
        from: Size::Byte,
        to: Size::Long,
    }));
}
