//! Effective-address descriptors, addressing-mode sets and the resolver.
//!
//! Decoding an EA (`read_ea`) only pulls extension words; it never looks at
//! register state. Locating an EA (`locate`) computes the operand location from
//! a register snapshot and reports the address-register update that
//! postincrement/predecrement would perform, without applying it. The execute
//! path applies that update exactly once (see `Context::resolve`); inspection
//! simply drops it.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::cpu::{Cpu, Trap};
use crate::error::{AsmError, LogicError};
use crate::isa::Size;
use crate::stencil::BriefExt;
use crate::stream::InstructionStream;

bitflags! {
    /// Set of addressing modes, used for legality checks.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Modes: u16 {
        const DN = 1 << 0;
        const AN = 1 << 1;
        const IND = 1 << 2;
        const POSTINC = 1 << 3;
        const PREDEC = 1 << 4;
        const DISP = 1 << 5;
        const INDEX = 1 << 6;
        const ABS_W = 1 << 7;
        const ABS_L = 1 << 8;
        const PC_DISP = 1 << 9;
        const PC_INDEX = 1 << 10;
        const IMM = 1 << 11;

        const ALL = 0x0FFF;
        const DATA = Self::ALL.bits() & !Self::AN.bits();
        const MEMORY = Self::ALL.bits() & !(Self::DN.bits() | Self::AN.bits());
        const CONTROL = Self::IND.bits() | Self::DISP.bits() | Self::INDEX.bits()
            | Self::ABS_W.bits() | Self::ABS_L.bits() | Self::PC_DISP.bits() | Self::PC_INDEX.bits();
        const ALTERABLE = Self::DN.bits() | Self::AN.bits() | Self::IND.bits() | Self::POSTINC.bits()
            | Self::PREDEC.bits() | Self::DISP.bits() | Self::INDEX.bits() | Self::ABS_W.bits() | Self::ABS_L.bits();
        const DATA_ALT = Self::ALTERABLE.bits() & !Self::AN.bits();
        const MEM_ALT = Self::DATA_ALT.bits() & !Self::DN.bits();
        /// Register plus the three register-indirect forms without extension words.
        const SIMPLE = Self::DN.bits() | Self::AN.bits() | Self::IND.bits() | Self::POSTINC.bits() | Self::PREDEC.bits();
    }
}

impl Modes {
    /// Mode flag for a raw 6-bit EA field; `None` for the reserved mode-7 slots.
    pub fn from_field(mode: u16, reg: u16) -> Option<Modes> {
        Some(match mode & 7 {
            0 => Modes::DN,
            1 => Modes::AN,
            2 => Modes::IND,
            3 => Modes::POSTINC,
            4 => Modes::PREDEC,
            5 => Modes::DISP,
            6 => Modes::INDEX,
            _ => match reg & 7 {
                0 => Modes::ABS_W,
                1 => Modes::ABS_L,
                2 => Modes::PC_DISP,
                3 => Modes::PC_INDEX,
                4 => Modes::IMM,
                _ => return None,
            },
        })
    }
}

/// Index register of the brief extension format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReg {
    pub addr: bool,
    pub reg: u8,
    pub long: bool,
    pub scale: u8,
}

impl IndexReg {
    pub fn data(reg: u8, scale: u8) -> Self {
        Self { addr: false, reg, long: true, scale }
    }

    pub fn address(reg: u8, scale: u8) -> Self {
        Self { addr: true, reg, long: true, scale }
    }

    fn value(&self, cpu: &Cpu) -> u32 {
        let raw = if self.addr { cpu.a[self.reg as usize] } else { cpu.d[self.reg as usize] };
        let v = if self.long { raw } else { raw as u16 as i16 as i32 as u32 };
        v.wrapping_mul(self.scale as u32)
    }
}

/// Registers that only appear as explicit operands of system instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpecialReg {
    Sr,
    Ccr,
    Usp,
    /// MOVEC control register by its 12-bit code.
    Control(u16),
    /// Cache selector of CPUSHL: 1 data, 2 instruction, 3 both.
    Cache(u8),
}

/// Effective-address descriptor, shared by the disassembler and the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ea {
    DataReg(u8),
    AddrReg(u8),
    Indirect(u8),
    PostInc(u8),
    PreDec(u8),
    Disp { reg: u8, disp: i16 },
    Index { reg: u8, disp: i8, index: IndexReg },
    AbsShort(i16),
    AbsLong(u32),
    PcDisp(i16),
    PcIndex { disp: i8, index: IndexReg },
    Immediate(u32),
    /// MOVEM mask, bit 0 = D0 .. bit 15 = A7.
    RegList(u16),
    /// Branch displacement measured from the address of the opcode word + 2.
    Relative(i32),
    /// `Dw:Dx` of REMU/REMS: remainder register, then dividend register.
    RegPair(u8, u8),
    Special(SpecialReg),
}

impl Ea {
    /// Addressing-mode flag; empty for operands that are not EA-field encodable.
    pub fn mode(&self) -> Modes {
        match self {
            Ea::DataReg(_) => Modes::DN,
            Ea::AddrReg(_) => Modes::AN,
            Ea::Indirect(_) => Modes::IND,
            Ea::PostInc(_) => Modes::POSTINC,
            Ea::PreDec(_) => Modes::PREDEC,
            Ea::Disp { .. } => Modes::DISP,
            Ea::Index { .. } => Modes::INDEX,
            Ea::AbsShort(_) => Modes::ABS_W,
            Ea::AbsLong(_) => Modes::ABS_L,
            Ea::PcDisp(_) => Modes::PC_DISP,
            Ea::PcIndex { .. } => Modes::PC_INDEX,
            Ea::Immediate(_) => Modes::IMM,
            Ea::RegList(_) | Ea::Relative(_) | Ea::RegPair(..) | Ea::Special(_) => Modes::empty(),
        }
    }

    /// The `(mode, reg)` pair of the 6-bit EA field.
    pub fn field(&self) -> Option<(u16, u16)> {
        Some(match *self {
            Ea::DataReg(r) => (0, r as u16),
            Ea::AddrReg(r) => (1, r as u16),
            Ea::Indirect(r) => (2, r as u16),
            Ea::PostInc(r) => (3, r as u16),
            Ea::PreDec(r) => (4, r as u16),
            Ea::Disp { reg, .. } => (5, reg as u16),
            Ea::Index { reg, .. } => (6, reg as u16),
            Ea::AbsShort(_) => (7, 0),
            Ea::AbsLong(_) => (7, 1),
            Ea::PcDisp(_) => (7, 2),
            Ea::PcIndex { .. } => (7, 3),
            Ea::Immediate(_) => (7, 4),
            Ea::RegList(_) | Ea::Relative(_) | Ea::RegPair(..) | Ea::Special(_) => return None,
        })
    }

    /// Field packed as `mmmrrr`.
    pub fn field6(&self) -> Option<u16> {
        self.field().map(|(m, r)| (m << 3) | r)
    }

    /// Number of extension words this operand occupies at `size`.
    pub fn ext_words(&self, size: Size) -> u32 {
        match self {
            Ea::Disp { .. } | Ea::Index { .. } | Ea::AbsShort(_) | Ea::PcDisp(_) | Ea::PcIndex { .. } => 1,
            Ea::AbsLong(_) => 2,
            Ea::Immediate(_) => {
                if size == Size::Long {
                    2
                } else {
                    1
                }
            }
            _ => 0,
        }
    }

    pub fn is_register(&self) -> bool {
        matches!(self, Ea::DataReg(_) | Ea::AddrReg(_))
    }
}

fn scale_code(scale: u8) -> Option<u16> {
    match scale {
        1 => Some(0),
        2 => Some(1),
        4 => Some(2),
        8 => Some(3),
        _ => None,
    }
}

fn brief(disp: i8, index: &IndexReg) -> Option<u16> {
    let w = BriefExt(0)
        .set_da(index.addr as u16)
        .set_reg(index.reg as u16)
        .set_long(index.long as u16)
        .set_scale(scale_code(index.scale)?)
        .set_disp(disp as u8 as u16);
    Some(w.0)
}

fn index_from(ext: BriefExt) -> IndexReg {
    IndexReg {
        addr: ext.da() != 0,
        reg: ext.reg() as u8,
        long: ext.long() != 0,
        scale: 1 << ext.scale(),
    }
}

/// Brief extension word; bit 8 selects the full format, which ColdFire lacks.
fn brief_ext(s: &mut dyn InstructionStream) -> Result<BriefExt, Trap> {
    let ext = BriefExt(s.next_word()?);
    if ext.0 & 0x0100 != 0 {
        return Err(Trap::reserved(s, "full-format extension word"));
    }
    Ok(ext)
}

/// Pull the extension words of a raw EA field and build its descriptor.
pub fn read_ea(mode: u16, reg: u16, size: Size, s: &mut dyn InstructionStream) -> Result<Ea, Trap> {
    let r = reg as u8;
    Ok(match mode & 7 {
        0 => Ea::DataReg(r),
        1 => Ea::AddrReg(r),
        2 => Ea::Indirect(r),
        3 => Ea::PostInc(r),
        4 => Ea::PreDec(r),
        5 => Ea::Disp { reg: r, disp: s.next_word_signed()? },
        6 => {
            let ext = brief_ext(s)?;
            Ea::Index { reg: r, disp: ext.disp() as u8 as i8, index: index_from(ext) }
        }
        _ => match reg & 7 {
            0 => Ea::AbsShort(s.next_word_signed()?),
            1 => Ea::AbsLong(s.next_long()?),
            2 => {
                s.mark_pc_relative();
                Ea::PcDisp(s.next_word_signed()?)
            }
            3 => {
                s.mark_pc_relative();
                let ext = brief_ext(s)?;
                Ea::PcIndex { disp: ext.disp() as u8 as i8, index: index_from(ext) }
            }
            4 => Ea::Immediate(match size {
                Size::Byte => match s.next_word()? {
                    w if w > 0xFF => return Err(Trap::reserved(s, "byte immediate with a nonzero high byte")),
                    w => w as u32,
                },
                Size::Word => s.next_word()? as u32,
                Size::Long => s.next_long()?,
            }),
            _ => {
                return Err(LogicError::Undecodable {
                    opcode: s.opcode(),
                    detail: format!("reserved effective address 7/{reg}"),
                }
                .into())
            }
        },
    })
}

/// Append the extension words of `ea` to `out`.
pub fn write_ea_ext(ea: &Ea, size: Size, out: &mut Vec<u16>) -> Result<(), AsmError> {
    match *ea {
        Ea::Disp { disp, .. } | Ea::PcDisp(disp) | Ea::AbsShort(disp) => out.push(disp as u16),
        Ea::Index { disp, ref index, .. } | Ea::PcIndex { disp, ref index } => {
            let w = brief(disp, index).ok_or_else(|| AsmError::OutOfRange {
                mnemonic: "<ea>",
                value: index.scale as i64,
                detail: "index scale must be 1, 2, 4 or 8".into(),
            })?;
            out.push(w);
        }
        Ea::AbsLong(v) => {
            out.push((v >> 16) as u16);
            out.push(v as u16);
        }
        Ea::Immediate(v) => match size {
            Size::Byte => out.push(v as u8 as u16),
            Size::Word => out.push(v as u16),
            Size::Long => {
                out.push((v >> 16) as u16);
                out.push(v as u16);
            }
        },
        _ => {}
    }
    Ok(())
}

/// Resolved operand location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Data(u8),
    Addr(u8),
    Mem(u32),
    Imm(u32),
    Special(SpecialReg),
}

/// A location plus the address-register write-back that reaching it implies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub loc: Location,
    pub update: Option<(u8, u32)>,
}

fn step_for(size: Size, reg: u8) -> u32 {
    match size {
        Size::Byte if reg == 7 => 2,
        s => s.bytes(),
    }
}

/// Compute where `ea` points without touching any state.
///
/// `pc_base` is the address of the operand's first extension word, which is
/// what PC-relative modes are relative to.
pub fn locate(cpu: &Cpu, ea: &Ea, size: Size, pc_base: u32) -> Result<Resolved, LogicError> {
    let mem = |addr: u32| Resolved { loc: Location::Mem(addr), update: None };
    Ok(match *ea {
        Ea::DataReg(r) => Resolved { loc: Location::Data(r), update: None },
        Ea::AddrReg(r) => Resolved { loc: Location::Addr(r), update: None },
        Ea::Indirect(r) => mem(cpu.a[r as usize]),
        Ea::PostInc(r) => {
            let addr = cpu.a[r as usize];
            Resolved {
                loc: Location::Mem(addr),
                update: Some((r, addr.wrapping_add(step_for(size, r)))),
            }
        }
        Ea::PreDec(r) => {
            let addr = cpu.a[r as usize].wrapping_sub(step_for(size, r));
            Resolved { loc: Location::Mem(addr), update: Some((r, addr)) }
        }
        Ea::Disp { reg, disp } => mem(cpu.a[reg as usize].wrapping_add(disp as i32 as u32)),
        Ea::Index { reg, disp, index } => mem(
            cpu.a[reg as usize]
                .wrapping_add(disp as i32 as u32)
                .wrapping_add(index.value(cpu)),
        ),
        Ea::AbsShort(v) => mem(v as i32 as u32),
        Ea::AbsLong(v) => mem(v),
        Ea::PcDisp(disp) => mem(pc_base.wrapping_add(disp as i32 as u32)),
        Ea::PcIndex { disp, index } => mem(
            pc_base
                .wrapping_add(disp as i32 as u32)
                .wrapping_add(index.value(cpu)),
        ),
        Ea::Immediate(v) => Resolved { loc: Location::Imm(v), update: None },
        Ea::Special(s) => Resolved { loc: Location::Special(s), update: None },
        Ea::RegList(_) | Ea::Relative(_) | Ea::RegPair(..) => {
            return Err(LogicError::NotAddressable { ea: *ea });
        }
    })
}

/// Side-effect-free resolution for debuggers and listings.
pub fn inspect(cpu: &Cpu, ea: &Ea, size: Size, pc_base: u32) -> Result<Location, LogicError> {
    locate(cpu, ea, size, pc_base).map(|r| r.loc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CpuConfig;

    #[test]
    fn mode_sets_compose() {
        assert!(Modes::DATA.contains(Modes::IMM));
        assert!(!Modes::DATA.contains(Modes::AN));
        assert!(!Modes::MEM_ALT.contains(Modes::DN));
        assert!(!Modes::CONTROL.contains(Modes::POSTINC));
        assert_eq!(Modes::from_field(7, 5), None);
    }

    #[test]
    fn inspect_does_not_write_back() {
        let mut cpu = Cpu::new(CpuConfig::default());
        cpu.a[2] = 0x100;
        let r = locate(&cpu, &Ea::PreDec(2), Size::Long, 0).unwrap();
        assert_eq!(r.loc, Location::Mem(0xFC));
        assert_eq!(r.update, Some((2, 0xFC)));
        assert_eq!(inspect(&cpu, &Ea::PostInc(2), Size::Word, 0).unwrap(), Location::Mem(0x100));
        assert_eq!(cpu.a[2], 0x100);
    }

    #[test]
    fn reserved_extension_bits_are_refused() {
        use crate::stream::SliceStream;
        let mut s = SliceStream::new(&[0x103C, 0x1A04], 0).unwrap();
        assert!(matches!(read_ea(7, 4, Size::Byte, &mut s), Err(Trap::Reserved { opcode: 0x103C, .. })));
        let mut s = SliceStream::new(&[0x103C, 0x0004], 0).unwrap();
        assert_eq!(read_ea(7, 4, Size::Byte, &mut s).unwrap(), Ea::Immediate(4));
        let mut s = SliceStream::new(&[0x2030, 0x0900], 0).unwrap();
        assert!(matches!(read_ea(6, 0, Size::Long, &mut s), Err(Trap::Reserved { .. })));
    }

    #[test]
    fn byte_stack_pointer_steps_by_two() {
        let mut cpu = Cpu::new(CpuConfig::default());
        cpu.a[7] = 0x200;
        let r = locate(&cpu, &Ea::PostInc(7), Size::Byte, 0).unwrap();
        assert_eq!(r.update, Some((7, 0x202)));
    }

    #[test]
    fn scaled_index() {
        let mut cpu = Cpu::new(CpuConfig::default());
        cpu.a[0] = 0x1000;
        cpu.d[1] = 3;
        let ea = Ea::Index { reg: 0, disp: -4, index: IndexReg::data(1, 4) };
        assert_eq!(inspect(&cpu, &ea, Size::Long, 0).unwrap(), Location::Mem(0x1000 - 4 + 12));
    }
}
