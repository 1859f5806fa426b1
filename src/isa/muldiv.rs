//! Multiply and divide: the 16x16 word forms and the 32-bit MUL.L/DIV.L/REM.L
//! forms that carry their register selection in an extension word.

use crate::context::Context;
use crate::cpu::{Fault, Sr, Trap};
use crate::ea::{Ea, Modes};
use crate::error::AsmError;
use crate::exception::Exception;
use crate::isa::{data_reg, ea6, low_ea, need, undecodable, Decoded, Encoding, InstrDef, Instruction, Operands, Size};
use crate::stencil::{MulDivExt, RegEaStencil};
use crate::stream::InstructionStream;

/// Quotient and remainder, or `None` when the quotient does not fit in
/// `bits` bits. The divisor is non-zero.
fn divide(dividend: u32, divisor: u32, signed: bool, bits: u32) -> Option<(u32, u32)> {
    if signed {
        let (a, b) = (dividend as i32 as i64, divisor as i32 as i64);
        let (q, r) = (a / b, a % b);
        let limit = 1i64 << (bits - 1);
        (-limit..limit).contains(&q).then_some((q as u32, r as u32))
    } else {
        let (a, b) = (dividend as u64, divisor as u64);
        let (q, r) = (a / b, a % b);
        (q < (1u64 << bits)).then_some((q as u32, r as u32))
    }
}

fn set_div_flags(ctx: &mut Context<'_>, quotient: Option<u32>, size: Size) {
    match quotient {
        Some(q) => ctx.cpu.set_logic_flags(q, size),
        None => {
            ctx.cpu.set_flag(Sr::V, true);
            ctx.cpu.set_flag(Sr::C, false);
        }
    }
}

/// MULU.W/MULS.W and DIVU.W/DIVS.W `<ea>,Dn`.
struct WordForm {
    def: InstrDef,
    signed: bool,
    divide: bool,
}

impl Instruction for WordForm {
    fn def(&self) -> &InstrDef {
        &self.def
    }

    fn decode(&self, s: &mut dyn InstructionStream) -> Result<Decoded, Trap> {
        let reg = RegEaStencil(s.opcode()).reg() as u8;
        let src = low_ea(s, Size::Word)?;
        Ok(Decoded::new(s, self.def.mnemonic, Some(Size::Word))
            .with_src(src)
            .with_dst(Ea::DataReg(reg)))
    }

    fn execute(&self, ctx: &mut Context<'_>) -> Result<(), Fault> {
        let d = self.decode(ctx)?;
        let src = ctx.read_ea(&d.src()?, Size::Word)?;
        let Ea::DataReg(r) = d.dst()? else {
            return Err(undecodable(d.opcode, "data register destination expected").into());
        };
        let dn = ctx.cpu.d[r as usize];
        if self.divide {
            let divisor = if self.signed { Size::Word.sign_extend(src) } else { src };
            if divisor == 0 {
                return Err(Exception::DivideByZero.into());
            }
            let result = divide(dn, divisor, self.signed, 16);
            if let Some((q, rem)) = result {
                ctx.cpu.d[r as usize] = (rem << 16) | (q & 0xFFFF);
            }
            set_div_flags(ctx, result.map(|(q, _)| q), Size::Word);
        } else {
            let product = if self.signed {
                (Size::Word.sign_extend(dn) as i32).wrapping_mul(Size::Word.sign_extend(src) as i32) as u32
            } else {
                (dn & 0xFFFF) * src
            };
            ctx.cpu.d[r as usize] = product;
            ctx.cpu.set_logic_flags(product, Size::Long);
        }
        Ok(())
    }

    fn plan(&self, _name: &str, ops: &Operands) -> Result<Encoding, AsmError> {
        let m = self.def.mnemonic;
        self.def.pick_size(ops.size)?;
        let src = need(m, "source", ops.src, self.def.src_modes)?;
        let reg = data_reg(m, "destination", ops.dst)?;
        let st = RegEaStencil(self.def.opcode).set_reg(reg);
        Ok(Encoding::new(st.0 | ea6(m, "source", &src)?).ea(src, Size::Word))
    }
}

/// MULU.L/MULS.L `<ea>,Dl`: low 32 bits of the product, V always clear.
struct MulLong {
    def: InstrDef,
}

impl Instruction for MulLong {
    fn def(&self) -> &InstrDef {
        &self.def
    }

    fn decode(&self, s: &mut dyn InstructionStream) -> Result<Decoded, Trap> {
        let ext = MulDivExt(s.next_word()?);
        if ext.0 & 0x0400 != 0 {
            return Err(Trap::reserved(s, "64-bit product form"));
        }
        if ext.0 & !0x7C00 != 0 {
            return Err(Trap::reserved(s, "nonzero reserved bits in the multiply extension word"));
        }
        let src = low_ea(s, Size::Long)?;
        let name = if ext.signed() != 0 { "muls" } else { "mulu" };
        Ok(Decoded::new(s, name, Some(Size::Long))
            .with_src(src)
            .with_dst(Ea::DataReg(ext.dq() as u8)))
    }

    fn execute(&self, ctx: &mut Context<'_>) -> Result<(), Fault> {
        let d = self.decode(ctx)?;
        let src = ctx.read_ea(&d.src()?, Size::Long)?;
        let Ea::DataReg(r) = d.dst()? else {
            return Err(undecodable(d.opcode, "data register destination expected").into());
        };
        // The low 32 bits are the same for signed and unsigned operands.
        let product = ctx.cpu.d[r as usize].wrapping_mul(src);
        ctx.cpu.d[r as usize] = product;
        ctx.cpu.set_logic_flags(product, Size::Long);
        Ok(())
    }

    fn plan(&self, name: &str, ops: &Operands) -> Result<Encoding, AsmError> {
        let m = self.def.mnemonic;
        self.def.pick_size(ops.size)?;
        let signed = name.eq_ignore_ascii_case("muls");
        let src = need(m, "source", ops.src, self.def.src_modes)?;
        let reg = data_reg(m, "destination", ops.dst)?;
        let ext = MulDivExt(0).set_dq(reg).set_signed(signed as u16);
        Ok(Encoding::new(self.def.opcode | ea6(m, "source", &src)?)
            .word(ext.0)
            .ea(src, Size::Long))
    }
}

/// DIVU.L/DIVS.L `<ea>,Dx` (quotient) and REMU.L/REMS.L `<ea>,Dw:Dx`
/// (remainder into Dw, Dx unchanged). The form is chosen by whether the
/// two extension-word registers coincide.
struct DivLong {
    def: InstrDef,
}

impl Instruction for DivLong {
    fn def(&self) -> &InstrDef {
        &self.def
    }

    fn decode(&self, s: &mut dyn InstructionStream) -> Result<Decoded, Trap> {
        let ext = MulDivExt(s.next_word()?);
        if ext.0 & 0x0400 != 0 {
            return Err(Trap::reserved(s, "64-bit dividend form"));
        }
        if ext.0 & !0x7C07 != 0 {
            return Err(Trap::reserved(s, "nonzero reserved bits in the divide extension word"));
        }
        let src = low_ea(s, Size::Long)?;
        let signed = ext.signed() != 0;
        let (q, r) = (ext.dq() as u8, ext.dr() as u8);
        let (name, dst) = match (q == r, signed) {
            (true, false) => ("divu", Ea::DataReg(q)),
            (true, true) => ("divs", Ea::DataReg(q)),
            (false, false) => ("remu", Ea::RegPair(r, q)),
            (false, true) => ("rems", Ea::RegPair(r, q)),
        };
        Ok(Decoded::new(s, name, Some(Size::Long)).with_src(src).with_dst(dst))
    }

    fn execute(&self, ctx: &mut Context<'_>) -> Result<(), Fault> {
        let d = self.decode(ctx)?;
        let divisor = ctx.read_ea(&d.src()?, Size::Long)?;
        if divisor == 0 {
            return Err(Exception::DivideByZero.into());
        }
        let signed = d.mnemonic.ends_with('s');
        let (into_rem, q_reg) = match d.dst()? {
            Ea::DataReg(q) => (None, q),
            Ea::RegPair(r, q) => (Some(r), q),
            _ => return Err(undecodable(d.opcode, "divide destination").into()),
        };
        let result = divide(ctx.cpu.d[q_reg as usize], divisor, signed, 32);
        if let Some((q, rem)) = result {
            match into_rem {
                None => ctx.cpu.d[q_reg as usize] = q,
                Some(r) => ctx.cpu.d[r as usize] = rem,
            }
        }
        set_div_flags(ctx, result.map(|(q, _)| q), Size::Long);
        Ok(())
    }

    fn plan(&self, name: &str, ops: &Operands) -> Result<Encoding, AsmError> {
        let m = self.def.mnemonic;
        self.def.pick_size(ops.size)?;
        let name = name.to_ascii_lowercase();
        let signed = name.ends_with('s');
        let src = need(m, "source", ops.src, self.def.src_modes)?;
        let (q, r) = if name.starts_with("rem") {
            match ops.dst {
                Some(Ea::RegPair(r, q)) if r != q => (q as u16, r as u16),
                Some(other) => {
                    return Err(AsmError::illegal(m, "destination", &other, "remainder form needs Dw:Dx with Dw != Dx"))
                }
                None => return Err(AsmError::MissingOperand { mnemonic: m, which: "destination" }),
            }
        } else {
            let q = data_reg(m, "destination", ops.dst)?;
            (q, q)
        };
        let ext = MulDivExt(0).set_dq(q).set_dr(r).set_signed(signed as u16);
        Ok(Encoding::new(self.def.opcode | ea6(m, "source", &src)?)
            .word(ext.0)
            .ea(src, Size::Long))
    }
}

pub(crate) fn register(v: &mut Vec<Box<dyn Instruction>>) {
    let w: &'static [Size] = &[Size::Word];
    let long_modes = Modes::DN | Modes::IND | Modes::POSTINC | Modes::PREDEC | Modes::DISP;

    for (name, opcode, signed, divide) in [
        ("mulu", 0xC0C0u16, false, false),
        ("muls", 0xC1C0, true, false),
        ("divu", 0x80C0, false, true),
        ("divs", 0x81C0, true, true),
    ] {
        v.push(Box::new(WordForm {
            def: InstrDef::new(name, opcode, 0x0E3F).sizes(w).src(Modes::DATA),
            signed,
            divide,
        }));
    }
    v.push(Box::new(MulLong {
        def: InstrDef::new("mulu", 0x4C00, 0x003F)
            .aliases(&["muls"])
            .sizes(&[Size::Long])
            .src(long_modes),
    }));
    v.push(Box::new(DivLong {
        def: InstrDef::new("divu", 0x4C40, 0x003F)
            .aliases(&["divs", "remu", "rems"])
            .sizes(&[Size::Long])
            .src(long_modes),
    }));
}
