//! Data movement: MOVE and its address/quick/extending variants, MOVEM,
//! LEA, PEA, SWAP and the LINK/UNLK frame pair.

use bitvec::prelude::*;

use crate::context::Context;
use crate::cpu::{Fault, Trap};
use crate::ea::{read_ea, Ea, Modes};
use crate::error::AsmError;
use crate::isa::{
    addr_reg, data_reg, ea6, immediate, low_ea, need, none, undecodable, Decoded, EaSlot, Encoding, InstrDef,
    Instruction, IsaTier, Operands, Size,
};
use crate::stencil::{MoveStencil, MoveqStencil, QuickStencil, RegEaStencil, RegStencil};
use crate::stream::InstructionStream;

const L: &[Size] = &[Size::Long];

/// ColdFire restricts which source/destination pairs one MOVE can encode:
/// sources with an extension word limit the destination to forms without one
/// (or, for a 16-bit displacement source, to a 16-bit displacement).
pub fn move_pair_ok(src: Modes, dst: Modes) -> bool {
    if Modes::SIMPLE.contains(src) {
        true
    } else if (Modes::DISP | Modes::PC_DISP).contains(src) {
        (Modes::SIMPLE | Modes::DISP).contains(dst)
    } else {
        Modes::SIMPLE.contains(dst)
    }
}

fn sizes_of(size: Size) -> &'static [Size] {
    match size {
        Size::Byte => &[Size::Byte],
        Size::Word => &[Size::Word],
        Size::Long => &[Size::Long],
    }
}

struct Move {
    def: InstrDef,
    size: Size,
    /// The ISA_B `#imm,(d16,An)` form, which the pair rule otherwise refuses.
    imm_to_disp: bool,
}

impl Instruction for Move {
    fn def(&self) -> &InstrDef {
        &self.def
    }

    fn accepts(&self, word: u16) -> bool {
        let m = MoveStencil(word);
        let (Some(src), Some(dst)) = (
            Modes::from_field(m.src_mode(), m.src_reg()),
            Modes::from_field(m.dst_mode(), m.dst_reg()),
        ) else {
            return false;
        };
        if self.imm_to_disp {
            return src == Modes::IMM && dst == Modes::DISP;
        }
        !(self.size == Size::Byte && src == Modes::AN) && move_pair_ok(src, dst)
    }

    fn decode(&self, s: &mut dyn InstructionStream) -> Result<Decoded, Trap> {
        let m = MoveStencil(s.opcode());
        let src = low_ea(s, self.size)?;
        let dst = read_ea(m.dst_mode(), m.dst_reg(), self.size, s)?;
        Ok(Decoded::new(s, self.def.mnemonic, Some(self.size)).with_src(src).with_dst(dst))
    }

    fn execute(&self, ctx: &mut Context<'_>) -> Result<(), Fault> {
        let d = self.decode(ctx)?;
        let v = ctx.read_ea(&d.src()?, self.size)?;
        ctx.write_ea(&d.dst()?, self.size, v)?;
        ctx.cpu.set_logic_flags(v, self.size);
        Ok(())
    }

    fn plan(&self, _name: &str, ops: &Operands) -> Result<Encoding, AsmError> {
        let m = self.def.mnemonic;
        let size = self.def.pick_size(ops.size)?;
        let src = need(m, "source", ops.src, self.def.src_modes)?;
        let dst = need(m, "destination", ops.dst, self.def.dst_modes)?;
        if size == Size::Byte && src.mode() == Modes::AN {
            return Err(AsmError::illegal(m, "source", &src, "byte access to an address register"));
        }
        if !self.imm_to_disp && !move_pair_ok(src.mode(), dst.mode()) {
            return Err(AsmError::illegal(m, "destination", &dst, "combination with this source needs too many extension words"));
        }
        let (sm, sr) = src.field().unwrap_or_default();
        let (dm, dr) = dst.field().unwrap_or_default();
        let st = MoveStencil(self.def.opcode)
            .set_src_mode(sm)
            .set_src_reg(sr)
            .set_dst_mode(dm)
            .set_dst_reg(dr);
        Ok(Encoding::new(st.0).ea(src, size).ea(dst, size))
    }
}

/// MOVEA: sign-extends into the address register, flags untouched.
struct MoveA {
    def: InstrDef,
    size: Size,
}

impl Instruction for MoveA {
    fn def(&self) -> &InstrDef {
        &self.def
    }

    fn decode(&self, s: &mut dyn InstructionStream) -> Result<Decoded, Trap> {
        let reg = RegEaStencil(s.opcode()).reg() as u8;
        let src = low_ea(s, self.size)?;
        Ok(Decoded::new(s, self.def.mnemonic, Some(self.size))
            .with_src(src)
            .with_dst(Ea::AddrReg(reg)))
    }

    fn execute(&self, ctx: &mut Context<'_>) -> Result<(), Fault> {
        let d = self.decode(ctx)?;
        let v = ctx.read_ea(&d.src()?, self.size)?;
        ctx.write_ea(&d.dst()?, self.size, v)
    }

    fn plan(&self, _name: &str, ops: &Operands) -> Result<Encoding, AsmError> {
        let m = self.def.mnemonic;
        let size = self.def.pick_size(ops.size)?;
        let src = need(m, "source", ops.src, self.def.src_modes)?;
        let reg = addr_reg(m, "destination", ops.dst)?;
        let st = RegEaStencil(self.def.opcode).set_reg(reg);
        Ok(Encoding::new(st.0 | ea6(m, "source", &src)?).ea(src, size))
    }
}

/// MOVEQ `#-128..127,Dn`.
struct MoveQ {
    def: InstrDef,
}

impl Instruction for MoveQ {
    fn def(&self) -> &InstrDef {
        &self.def
    }

    fn decode(&self, s: &mut dyn InstructionStream) -> Result<Decoded, Trap> {
        let st = MoveqStencil(s.opcode());
        Ok(Decoded::new(s, self.def.mnemonic, Some(Size::Long))
            .with_src(Ea::Immediate(Size::Byte.sign_extend(st.data() as u32)))
            .with_dst(Ea::DataReg(st.reg() as u8)))
    }

    fn execute(&self, ctx: &mut Context<'_>) -> Result<(), Fault> {
        let d = self.decode(ctx)?;
        let v = ctx.read_ea(&d.src()?, Size::Long)?;
        ctx.write_ea(&d.dst()?, Size::Long, v)?;
        ctx.cpu.set_logic_flags(v, Size::Long);
        Ok(())
    }

    fn plan(&self, _name: &str, ops: &Operands) -> Result<Encoding, AsmError> {
        let m = self.def.mnemonic;
        self.def.pick_size(ops.size)?;
        let v = immediate(m, "source", ops.src)? as i32;
        if !(-128..=127).contains(&v) {
            return Err(AsmError::range(m, v as i64, "moveq data must be -128..127"));
        }
        let reg = data_reg(m, "destination", ops.dst)?;
        Ok(Encoding::new(MoveqStencil(self.def.opcode).set_reg(reg).set_data(v as u8 as u16).0))
    }
}

/// MOV3Q `#-1,1..7,<ea>`: a data field of zero stands for -1.
struct Mov3Q {
    def: InstrDef,
}

impl Instruction for Mov3Q {
    fn def(&self) -> &InstrDef {
        &self.def
    }

    fn decode(&self, s: &mut dyn InstructionStream) -> Result<Decoded, Trap> {
        let v = match QuickStencil(s.opcode()).data() {
            0 => u32::MAX,
            n => n as u32,
        };
        let dst = low_ea(s, Size::Long)?;
        Ok(Decoded::new(s, self.def.mnemonic, Some(Size::Long))
            .with_src(Ea::Immediate(v))
            .with_dst(dst))
    }

    fn execute(&self, ctx: &mut Context<'_>) -> Result<(), Fault> {
        let d = self.decode(ctx)?;
        let v = ctx.read_ea(&d.src()?, Size::Long)?;
        ctx.write_ea(&d.dst()?, Size::Long, v)?;
        ctx.cpu.set_logic_flags(v, Size::Long);
        Ok(())
    }

    fn plan(&self, _name: &str, ops: &Operands) -> Result<Encoding, AsmError> {
        let m = self.def.mnemonic;
        self.def.pick_size(ops.size)?;
        let data = match immediate(m, "source", ops.src)? as i32 {
            -1 => 0,
            n @ 1..=7 => n as u16,
            n => return Err(AsmError::range(m, n as i64, "mov3q data must be -1 or 1..7")),
        };
        let dst = need(m, "destination", ops.dst, self.def.dst_modes)?;
        let st = QuickStencil(self.def.opcode).set_data(data);
        Ok(Encoding::new(st.0 | ea6(m, "destination", &dst)?).ea(dst, Size::Long))
    }
}

/// MVS/MVZ: sign- or zero-extend a byte or word into a data register.
struct MoveExtend {
    def: InstrDef,
    signed: bool,
}

impl MoveExtend {
    fn size_of(word: u16) -> Size {
        if word & 0x0040 != 0 {
            Size::Word
        } else {
            Size::Byte
        }
    }
}

impl Instruction for MoveExtend {
    fn def(&self) -> &InstrDef {
        &self.def
    }

    fn decode(&self, s: &mut dyn InstructionStream) -> Result<Decoded, Trap> {
        let size = Self::size_of(s.opcode());
        let reg = RegEaStencil(s.opcode()).reg() as u8;
        let src = low_ea(s, size)?;
        Ok(Decoded::new(s, self.def.mnemonic, Some(size))
            .with_src(src)
            .with_dst(Ea::DataReg(reg)))
    }

    fn execute(&self, ctx: &mut Context<'_>) -> Result<(), Fault> {
        let d = self.decode(ctx)?;
        let size = d.size_or_long();
        let raw = ctx.read_ea(&d.src()?, size)?;
        let v = if self.signed { size.sign_extend(raw) } else { raw };
        ctx.write_ea(&d.dst()?, Size::Long, v)?;
        ctx.cpu.set_logic_flags(v, Size::Long);
        Ok(())
    }

    fn plan(&self, _name: &str, ops: &Operands) -> Result<Encoding, AsmError> {
        let m = self.def.mnemonic;
        let size = self.def.pick_size(ops.size)?;
        let src = need(m, "source", ops.src, self.def.src_modes)?;
        let reg = data_reg(m, "destination", ops.dst)?;
        let size_bit = if size == Size::Word { 0x0040 } else { 0 };
        let st = RegEaStencil(self.def.opcode).set_reg(reg);
        Ok(Encoding::new(st.0 | size_bit | ea6(m, "source", &src)?).ea(src, size))
    }
}

/// MOVEM.L between a register list and `(An)` or `(d16,An)`.
struct MoveM {
    def: InstrDef,
    to_memory: bool,
}

impl Instruction for MoveM {
    fn def(&self) -> &InstrDef {
        &self.def
    }

    fn decode(&self, s: &mut dyn InstructionStream) -> Result<Decoded, Trap> {
        let mask = s.next_word()?;
        let ea = low_ea(s, Size::Long)?;
        let d = Decoded::new(s, self.def.mnemonic, Some(Size::Long));
        Ok(if self.to_memory {
            d.with_src(Ea::RegList(mask)).with_dst(ea)
        } else {
            d.with_src(ea).with_dst(Ea::RegList(mask))
        })
    }

    fn execute(&self, ctx: &mut Context<'_>) -> Result<(), Fault> {
        let d = self.decode(ctx)?;
        let (list, ea) = if self.to_memory { (d.src()?, d.dst()?) } else { (d.dst()?, d.src()?) };
        let Ea::RegList(mask) = list else {
            return Err(undecodable(d.opcode, "register list").into());
        };
        let mut addr = ctx.address_of(&ea)?;
        for i in mask.view_bits::<Lsb0>().iter_ones() {
            if self.to_memory {
                let v = if i < 8 { ctx.cpu.d[i] } else { ctx.cpu.a[i - 8] };
                ctx.write_mem(addr, Size::Long, v)?;
            } else {
                let v = ctx.read_mem(addr, Size::Long)?;
                if i < 8 {
                    ctx.cpu.d[i] = v;
                } else {
                    ctx.cpu.a[i - 8] = v;
                }
            }
            addr = addr.wrapping_add(4);
        }
        Ok(())
    }

    fn plan(&self, _name: &str, ops: &Operands) -> Result<Encoding, AsmError> {
        let m = self.def.mnemonic;
        self.def.pick_size(ops.size)?;
        let (list, ea, which) = if self.to_memory {
            (ops.src, need(m, "destination", ops.dst, self.def.dst_modes)?, "destination")
        } else {
            (ops.dst, need(m, "source", ops.src, self.def.src_modes)?, "source")
        };
        let mask = match list {
            Some(Ea::RegList(mask)) => mask,
            Some(other) => return Err(AsmError::illegal(m, "register list", &other, "register list expected")),
            None => return Err(AsmError::MissingOperand { mnemonic: m, which: "register list" }),
        };
        Ok(Encoding::new(self.def.opcode | ea6(m, which, &ea)?)
            .word(mask)
            .ea(ea, Size::Long))
    }
}

/// LEA `<ea>,An` and PEA `<ea>`.
struct LoadAddress {
    def: InstrDef,
    push: bool,
}

impl Instruction for LoadAddress {
    fn def(&self) -> &InstrDef {
        &self.def
    }

    fn decode(&self, s: &mut dyn InstructionStream) -> Result<Decoded, Trap> {
        let reg = RegEaStencil(s.opcode()).reg() as u8;
        let src = low_ea(s, Size::Long)?;
        let d = Decoded::new(s, self.def.mnemonic, None).with_src(src);
        Ok(if self.push { d } else { d.with_dst(Ea::AddrReg(reg)) })
    }

    fn execute(&self, ctx: &mut Context<'_>) -> Result<(), Fault> {
        let d = self.decode(ctx)?;
        let addr = ctx.address_of(&d.src()?)?;
        if self.push {
            ctx.push_u32(addr)
        } else {
            ctx.write_ea(&d.dst()?, Size::Long, addr)
        }
    }

    fn plan(&self, _name: &str, ops: &Operands) -> Result<Encoding, AsmError> {
        let m = self.def.mnemonic;
        let src = need(m, "source", ops.src, self.def.src_modes)?;
        let mut op = self.def.opcode | ea6(m, "source", &src)?;
        if self.push {
            none(m, "destination", ops.dst)?;
        } else {
            op = RegEaStencil(op).set_reg(addr_reg(m, "destination", ops.dst)?).0;
        }
        Ok(Encoding::new(op).ea(src, Size::Long))
    }
}

struct Swap {
    def: InstrDef,
}

impl Instruction for Swap {
    fn def(&self) -> &InstrDef {
        &self.def
    }

    fn decode(&self, s: &mut dyn InstructionStream) -> Result<Decoded, Trap> {
        let reg = RegStencil(s.opcode()).reg() as u8;
        Ok(Decoded::new(s, self.def.mnemonic, Some(Size::Word)).with_dst(Ea::DataReg(reg)))
    }

    fn execute(&self, ctx: &mut Context<'_>) -> Result<(), Fault> {
        let d = self.decode(ctx)?;
        let r = ctx.modify_ea(&d.dst()?, Size::Long, |_, v| v.rotate_left(16))?;
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

/// LINK `An,#d16` / UNLK `An`.
struct Frame {
    def: InstrDef,
    link: bool,
}

impl Instruction for Frame {
    fn def(&self) -> &InstrDef {
        &self.def
    }

    fn decode(&self, s: &mut dyn InstructionStream) -> Result<Decoded, Trap> {
        let reg = Ea::AddrReg(RegStencil(s.opcode()).reg() as u8);
        if self.link {
            let disp = read_ea(7, 4, Size::Word, s)?;
            Ok(Decoded::new(s, self.def.mnemonic, Some(Size::Word)).with_src(reg).with_dst(disp))
        } else {
            Ok(Decoded::new(s, self.def.mnemonic, None).with_dst(reg))
        }
    }

    fn execute(&self, ctx: &mut Context<'_>) -> Result<(), Fault> {
        let d = self.decode(ctx)?;
        if self.link {
            let (Ea::AddrReg(r), Ea::Immediate(disp)) = (d.src()?, d.dst()?) else {
                return Err(undecodable(d.opcode, "link operands").into());
            };
            let old = ctx.cpu.a[r as usize];
            ctx.push_u32(old)?;
            let sp = ctx.cpu.a[7];
            ctx.cpu.a[r as usize] = sp;
            ctx.cpu.a[7] = sp.wrapping_add(Size::Word.sign_extend(disp));
        } else {
            let Ea::AddrReg(r) = d.dst()? else {
                return Err(undecodable(d.opcode, "unlk operand").into());
            };
            ctx.cpu.a[7] = ctx.cpu.a[r as usize];
            let v = ctx.pull_u32()?;
            ctx.cpu.a[r as usize] = v;
        }
        Ok(())
    }

    fn plan(&self, _name: &str, ops: &Operands) -> Result<Encoding, AsmError> {
        let m = self.def.mnemonic;
        if self.link {
            self.def.pick_size(ops.size)?;
            let reg = addr_reg(m, "source", ops.src)?;
            let disp = immediate(m, "displacement", ops.dst)?;
            if !(-0x8000..=0xFFFF).contains(&(disp as i32)) {
                return Err(AsmError::range(m, disp as i32 as i64, "displacement must fit in 16 bits"));
            }
            Ok(Encoding::new(RegStencil(self.def.opcode).set_reg(reg).0).word(disp as u16))
        } else {
            none(m, "source", ops.src)?;
            let reg = addr_reg(m, "register", ops.dst)?;
            Ok(Encoding::new(RegStencil(self.def.opcode).set_reg(reg).0))
        }
    }
}

pub(crate) fn register(v: &mut Vec<Box<dyn Instruction>>) {
    for (opcode, size) in [(0x2000u16, Size::Long), (0x3000, Size::Word), (0x1000, Size::Byte)] {
        v.push(Box::new(Move {
            def: InstrDef::new("move", opcode, 0x0FFF)
                .sizes(sizes_of(size))
                .src(Modes::ALL)
                .dst(Modes::DATA_ALT)
                .slot(EaSlot::Move),
            size,
            imm_to_disp: false,
        }));
    }
    for (opcode, size) in [(0x3000u16, Size::Word), (0x1000, Size::Byte)] {
        v.push(Box::new(Move {
            def: InstrDef::new("move", opcode, 0x0FFF)
                .isa(IsaTier::B)
                .sizes(sizes_of(size))
                .src(Modes::IMM)
                .dst(Modes::DISP)
                .slot(EaSlot::Move),
            size,
            imm_to_disp: true,
        }));
    }
    for (opcode, size) in [(0x2040u16, Size::Long), (0x3040, Size::Word)] {
        v.push(Box::new(MoveA {
            def: InstrDef::new("movea", opcode, 0x0E3F)
                .aliases(&["move"])
                .sizes(sizes_of(size))
                .src(Modes::ALL),
            size,
        }));
    }
    v.push(Box::new(MoveQ { def: InstrDef::new("moveq", 0x7000, 0x0EFF).sizes(L) }));
    v.push(Box::new(Mov3Q {
        def: InstrDef::new("mov3q", 0xA140, 0x0E3F)
            .isa(IsaTier::B)
            .sizes(L)
            .dst(Modes::ALTERABLE),
    }));
    for (name, opcode, signed) in [("mvs", 0x7100u16, true), ("mvz", 0x7180, false)] {
        v.push(Box::new(MoveExtend {
            def: InstrDef::new(name, opcode, 0x0E7F)
                .isa(IsaTier::B)
                .sizes(&[Size::Byte, Size::Word])
                .default_size(Size::Word)
                .src(Modes::DATA),
            signed,
        }));
    }
    let movem_modes = Modes::IND | Modes::DISP;
    v.push(Box::new(MoveM {
        def: InstrDef::new("movem", 0x48C0, 0x003F).sizes(L).dst(movem_modes),
        to_memory: true,
    }));
    v.push(Box::new(MoveM {
        def: InstrDef::new("movem", 0x4CC0, 0x003F).sizes(L).src(movem_modes),
        to_memory: false,
    }));
    v.push(Box::new(LoadAddress {
        def: InstrDef::new("lea", 0x41C0, 0x0E3F).src(Modes::CONTROL),
        push: false,
    }));
    v.push(Box::new(LoadAddress {
        def: InstrDef::new("pea", 0x4840, 0x003F).src(Modes::CONTROL),
        push: true,
    }));
    v.push(Box::new(Swap { def: InstrDef::new("swap", 0x4840, 0x0007).sizes(&[Size::Word]).default_size(Size::Word) }));
    v.push(Box::new(Frame {
        def: InstrDef::new("link", 0x4E50, 0x0007).sizes(&[Size::Word]).default_size(Size::Word),
        link: true,
    }));
    v.push(Box::new(Frame { def: InstrDef::new("unlk", 0x4E58, 0x0007), link: false }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stencil::EaStencil;

    #[test]
    fn move_combinations() {
        assert!(move_pair_ok(Modes::POSTINC, Modes::ABS_L));
        assert!(move_pair_ok(Modes::DISP, Modes::DISP));
        assert!(!move_pair_ok(Modes::DISP, Modes::ABS_W));
        assert!(!move_pair_ok(Modes::IMM, Modes::DISP));
        assert!(move_pair_ok(Modes::ABS_L, Modes::PREDEC));
        assert_eq!(EaStencil(0x2219).ea_mode(), 3);
    }
}
