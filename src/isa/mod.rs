//! Instruction catalog: definitions, the capability trait and the shared
//! decode/encode plumbing every family module builds on.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::cpu::{Fault, Trap};
use crate::ea::{read_ea, write_ea_ext, Ea, Modes};
use crate::error::{AsmError, LogicError};
use crate::stencil::{EaStencil, MoveStencil};
use crate::stream::InstructionStream;

pub mod arith;
pub mod bits;
pub mod branch;
pub mod logic;
pub mod moves;
pub mod muldiv;
pub mod shift;
pub mod system;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Size {
    Byte,
    Word,
    Long,
}

impl Size {
    pub fn bytes(self) -> u32 {
        match self {
            Size::Byte => 1,
            Size::Word => 2,
            Size::Long => 4,
        }
    }

    pub fn bits(self) -> u32 {
        self.bytes() * 8
    }

    pub fn mask(self) -> u32 {
        match self {
            Size::Byte => 0xFF,
            Size::Word => 0xFFFF,
            Size::Long => 0xFFFF_FFFF,
        }
    }

    pub fn msb(self) -> u32 {
        1 << (self.bits() - 1)
    }

    pub fn sign_extend(self, v: u32) -> u32 {
        match self {
            Size::Byte => v as u8 as i8 as i32 as u32,
            Size::Word => v as u16 as i16 as i32 as u32,
            Size::Long => v,
        }
    }

    /// The common `ss` size field: 00 byte, 01 word, 10 long.
    pub fn from_bits2(v: u16) -> Option<Size> {
        match v & 3 {
            0 => Some(Size::Byte),
            1 => Some(Size::Word),
            2 => Some(Size::Long),
            _ => None,
        }
    }

    pub fn bits2(self) -> u16 {
        match self {
            Size::Byte => 0,
            Size::Word => 1,
            Size::Long => 2,
        }
    }

    pub fn suffix(self) -> char {
        match self {
            Size::Byte => 'b',
            Size::Word => 'w',
            Size::Long => 'l',
        }
    }

    /// `.s` (short branch) is accepted as a synonym for `.b`.
    pub fn from_suffix(c: char) -> Option<Size> {
        match c.to_ascii_lowercase() {
            'b' | 's' => Some(Size::Byte),
            'w' => Some(Size::Word),
            'l' => Some(Size::Long),
            _ => None,
        }
    }
}

/// Hardware feature tiers; each is a superset of the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum IsaTier {
    A,
    B,
    #[default]
    C,
}

impl IsaTier {
    pub const ALL: [IsaTier; 3] = [IsaTier::A, IsaTier::B, IsaTier::C];

    pub fn letter(self) -> char {
        match self {
            IsaTier::A => 'A',
            IsaTier::B => 'B',
            IsaTier::C => 'C',
        }
    }
}

impl fmt::Display for IsaTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ISA_{}", self.letter())
    }
}

impl FromStr for IsaTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        let t = t
            .strip_prefix("isa_")
            .or_else(|| t.strip_prefix("ISA_"))
            .unwrap_or(t);
        match t {
            "a" | "A" => Ok(IsaTier::A),
            "b" | "B" => Ok(IsaTier::B),
            "c" | "C" => Ok(IsaTier::C),
            _ => Err(format!("unknown ISA tier `{s}` (expected A, B or C)")),
        }
    }
}

/// Control-flow class of an instruction, used by listings and flow analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Flow {
    Next,
    Branch,
    CondBranch,
    Call,
    /// Computed jump or call through an EA.
    Indirect,
    Return,
    Stop,
}

/// Which register-checked operand the opcode's EA field(s) encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EaSlot {
    None,
    /// Low six bits, checked against `src_modes`.
    Src,
    /// Low six bits, checked against `dst_modes`.
    Dst,
    /// MOVE: low six bits are the source, bits 11..6 the mirrored destination.
    Move,
}

/// Static description of one registered opcode pattern.
#[derive(Debug, Clone)]
pub struct InstrDef {
    pub mnemonic: &'static str,
    pub aliases: &'static [&'static str],
    pub opcode: u16,
    /// Bits that select operands rather than the instruction.
    pub var_mask: u16,
    pub isa: IsaTier,
    pub sizes: &'static [Size],
    pub default_size: Option<Size>,
    pub src_modes: Modes,
    pub dst_modes: Modes,
    pub slot: EaSlot,
    pub privileged: bool,
    pub flow: Flow,
    /// `(mask, value)` pairs of words that belong to other instructions.
    pub exclusions: Vec<(u16, u16)>,
}

impl InstrDef {
    pub fn new(mnemonic: &'static str, opcode: u16, var_mask: u16) -> Self {
        Self {
            mnemonic,
            aliases: &[],
            opcode,
            var_mask,
            isa: IsaTier::A,
            sizes: &[],
            default_size: None,
            src_modes: Modes::empty(),
            dst_modes: Modes::empty(),
            slot: EaSlot::None,
            privileged: false,
            flow: Flow::Next,
            exclusions: Vec::new(),
        }
    }

    pub fn aliases(mut self, aliases: &'static [&'static str]) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn isa(mut self, isa: IsaTier) -> Self {
        self.isa = isa;
        self
    }

    /// Unsized assembly requests pick `.l` when it is one of `sizes`.
    pub fn sizes(mut self, sizes: &'static [Size]) -> Self {
        self.sizes = sizes;
        self.default_size = sizes.contains(&Size::Long).then_some(Size::Long);
        self
    }

    pub fn default_size(mut self, size: Size) -> Self {
        self.default_size = Some(size);
        self
    }

    pub fn src(mut self, modes: Modes) -> Self {
        self.src_modes = modes;
        if self.slot == EaSlot::None {
            self.slot = EaSlot::Src;
        }
        self
    }

    pub fn dst(mut self, modes: Modes) -> Self {
        self.dst_modes = modes;
        if self.slot == EaSlot::None {
            self.slot = EaSlot::Dst;
        }
        self
    }

    /// Override which operand the EA field(s) encode.
    pub fn slot(mut self, slot: EaSlot) -> Self {
        self.slot = slot;
        self
    }

    pub fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }

    pub fn flow(mut self, flow: Flow) -> Self {
        self.flow = flow;
        self
    }

    pub fn exclude(mut self, mask: u16, value: u16) -> Self {
        self.exclusions.push((mask, value));
        self
    }

    /// Number of fixed bits; the registry prefers the largest.
    pub fn specificity(&self) -> u32 {
        (!self.var_mask).count_ones()
    }

    pub fn answers_to(&self, name: &str) -> bool {
        self.mnemonic.eq_ignore_ascii_case(name) || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }

    /// Fixed bits, exclusions and EA-mode legality. ISA filtering and the
    /// per-instruction `accepts` hook are applied by the registry.
    pub fn matches(&self, word: u16) -> bool {
        if (word & !self.var_mask) != (self.opcode & !self.var_mask) {
            return false;
        }
        if self.exclusions.iter().any(|&(m, v)| word & m == v) {
            return false;
        }
        let low = EaStencil(word);
        let low_ok = |modes: Modes| Modes::from_field(low.ea_mode(), low.ea_reg()).is_some_and(|m| modes.contains(m));
        match self.slot {
            EaSlot::None => true,
            EaSlot::Src => low_ok(self.src_modes),
            EaSlot::Dst => low_ok(self.dst_modes),
            EaSlot::Move => {
                let m = MoveStencil(word);
                low_ok(self.src_modes)
                    && Modes::from_field(m.dst_mode(), m.dst_reg()).is_some_and(|d| self.dst_modes.contains(d))
            }
        }
    }

    /// Resolve the requested assembly size against what this form supports.
    pub fn pick_size(&self, requested: Option<Size>) -> Result<Size, AsmError> {
        match requested {
            Some(s) if self.sizes.contains(&s) => Ok(s),
            Some(s) => Err(AsmError::BadSize { mnemonic: self.mnemonic, size: s.suffix() }),
            None => self.default_size.ok_or(AsmError::SizeRequired { mnemonic: self.mnemonic }),
        }
    }
}

/// Operands as handed to the encoder, and as recovered by Decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operands {
    pub size: Option<Size>,
    pub src: Option<Ea>,
    pub dst: Option<Ea>,
}

impl Operands {
    pub fn new(size: Option<Size>, src: Option<Ea>, dst: Option<Ea>) -> Self {
        Self { size, src, dst }
    }
}

/// Result of decoding one instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decoded {
    pub mnemonic: &'static str,
    pub size: Option<Size>,
    pub opcode: u16,
    pub address: u32,
    pub src: Option<Ea>,
    pub dst: Option<Ea>,
    /// Extension words after the opcode word.
    pub ext_words: u32,
}

impl Decoded {
    /// Snapshot the stream position; call once all extension words are read.
    pub fn new(s: &dyn InstructionStream, mnemonic: &'static str, size: Option<Size>) -> Self {
        Self {
            mnemonic,
            size,
            opcode: s.opcode(),
            address: s.address(),
            src: None,
            dst: None,
            ext_words: s.consumed(),
        }
    }

    pub fn with_src(mut self, ea: Ea) -> Self {
        self.src = Some(ea);
        self
    }

    pub fn with_dst(mut self, ea: Ea) -> Self {
        self.dst = Some(ea);
        self
    }

    /// Encoded length in bytes.
    pub fn len(&self) -> u32 {
        2 + 2 * self.ext_words
    }

    pub fn operands(&self) -> Operands {
        Operands { size: self.size, src: self.src, dst: self.dst }
    }

    pub fn src(&self) -> Result<Ea, LogicError> {
        self.src.ok_or(LogicError::MissingOperand { mnemonic: self.mnemonic, which: "source" })
    }

    pub fn dst(&self) -> Result<Ea, LogicError> {
        self.dst.ok_or(LogicError::MissingOperand { mnemonic: self.mnemonic, which: "destination" })
    }

    /// Operand size, long when the form is unsized.
    pub fn size_or_long(&self) -> Size {
        self.size.unwrap_or(Size::Long)
    }
}

/// One piece of encoded output following the opcode word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ext {
    Word(u16),
    Long(u32),
    Ea(Ea, Size),
}

/// Planned encoding: both CalcSize and Encode are derived from this, so
/// they cannot disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoding {
    pub opword: u16,
    pub ext: Vec<Ext>,
}

impl Encoding {
    pub fn new(opword: u16) -> Self {
        Self { opword, ext: Vec::new() }
    }

    pub fn word(mut self, w: u16) -> Self {
        self.ext.push(Ext::Word(w));
        self
    }

    pub fn long(mut self, v: u32) -> Self {
        self.ext.push(Ext::Long(v));
        self
    }

    pub fn ea(mut self, ea: Ea, size: Size) -> Self {
        self.ext.push(Ext::Ea(ea, size));
        self
    }

    pub fn len_bytes(&self) -> u32 {
        let words: u32 = self
            .ext
            .iter()
            .map(|e| match e {
                Ext::Word(_) => 1,
                Ext::Long(_) => 2,
                Ext::Ea(ea, size) => ea.ext_words(*size),
            })
            .sum();
        2 + 2 * words
    }

    pub fn emit(&self, out: &mut Vec<u16>) -> Result<(), AsmError> {
        out.push(self.opword);
        for e in &self.ext {
            match e {
                Ext::Word(w) => out.push(*w),
                Ext::Long(v) => {
                    out.push((v >> 16) as u16);
                    out.push(*v as u16);
                }
                Ext::Ea(ea, size) => write_ea_ext(ea, *size, out)?,
            }
        }
        Ok(())
    }
}

/// Capability set of a registered instruction.
pub trait Instruction: Send + Sync {
    fn def(&self) -> &InstrDef;

    /// Extra word-level legality beyond what `InstrDef::matches` checks.
    fn accepts(&self, _word: u16) -> bool {
        true
    }

    fn decode(&self, s: &mut dyn InstructionStream) -> Result<Decoded, Trap>;

    fn execute(&self, ctx: &mut Context<'_>) -> Result<(), Fault>;

    /// Plan the encoding of `ops` under `name` (the mnemonic or one of its
    /// aliases). Simulation-only entries keep this default.
    fn plan(&self, _name: &str, _ops: &Operands) -> Result<Encoding, AsmError> {
        Err(AsmError::NotAssemblable { mnemonic: self.def().mnemonic })
    }

    fn calc_size(&self, name: &str, ops: &Operands) -> Result<u32, AsmError> {
        Ok(self.plan(name, ops)?.len_bytes())
    }

    fn encode(&self, name: &str, ops: &Operands, out: &mut Vec<u16>) -> Result<(), AsmError> {
        self.plan(name, ops)?.emit(out)
    }

    /// Whether a branch displacement (from opcode address + 2) can be
    /// represented at `size`, or at any size this form supports if `None`.
    fn is_relative_offset_valid(&self, _offset: i32, _size: Option<Size>) -> bool {
        false
    }
}

/// Every family's definitions, in registration order.
pub fn catalog() -> Vec<Box<dyn Instruction>> {
    let mut v: Vec<Box<dyn Instruction>> = Vec::new();
    arith::register(&mut v);
    logic::register(&mut v);
    shift::register(&mut v);
    bits::register(&mut v);
    muldiv::register(&mut v);
    moves::register(&mut v);
    branch::register(&mut v);
    system::register(&mut v);
    v
}

// Shared helpers for the family modules.

/// Decode the EA in the opcode's low six bits.
pub(crate) fn low_ea(s: &mut dyn InstructionStream, size: Size) -> Result<Ea, Trap> {
    let st = EaStencil(s.opcode());
    read_ea(st.ea_mode(), st.ea_reg(), size, s)
}

pub(crate) fn undecodable(opcode: u16, detail: impl Into<String>) -> Trap {
    Trap::Logic(LogicError::Undecodable { opcode, detail: detail.into() })
}

/// Require an operand and check it against `modes`.
pub(crate) fn need(mnemonic: &'static str, which: &'static str, ea: Option<Ea>, modes: Modes) -> Result<Ea, AsmError> {
    let ea = ea.ok_or(AsmError::MissingOperand { mnemonic, which })?;
    if !modes.contains(ea.mode()) || ea.mode().is_empty() {
        return Err(AsmError::illegal(mnemonic, which, &ea, "addressing mode not allowed here"));
    }
    Ok(ea)
}

pub(crate) fn none(mnemonic: &'static str, which: &'static str, ea: Option<Ea>) -> Result<(), AsmError> {
    match ea {
        None => Ok(()),
        Some(ea) => Err(AsmError::ExtraOperand { mnemonic, which, ea: format!("{ea}") }),
    }
}

/// The 6-bit field of an operand already checked with `need`.
pub(crate) fn ea6(mnemonic: &'static str, which: &'static str, ea: &Ea) -> Result<u16, AsmError> {
    ea.field6()
        .ok_or_else(|| AsmError::illegal(mnemonic, which, ea, "not encodable in an EA field"))
}

pub(crate) fn data_reg(mnemonic: &'static str, which: &'static str, ea: Option<Ea>) -> Result<u16, AsmError> {
    match need(mnemonic, which, ea, Modes::DN)? {
        Ea::DataReg(r) => Ok(r as u16),
        other => Err(AsmError::illegal(mnemonic, which, &other, "data register expected")),
    }
}

pub(crate) fn addr_reg(mnemonic: &'static str, which: &'static str, ea: Option<Ea>) -> Result<u16, AsmError> {
    match need(mnemonic, which, ea, Modes::AN)? {
        Ea::AddrReg(r) => Ok(r as u16),
        other => Err(AsmError::illegal(mnemonic, which, &other, "address register expected")),
    }
}

pub(crate) fn immediate(mnemonic: &'static str, which: &'static str, ea: Option<Ea>) -> Result<u32, AsmError> {
    match need(mnemonic, which, ea, Modes::IMM)? {
        Ea::Immediate(v) => Ok(v),
        other => Err(AsmError::illegal(mnemonic, which, &other, "immediate expected")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_fields() {
        assert_eq!(Size::from_bits2(2), Some(Size::Long));
        assert_eq!(Size::from_bits2(3), None);
        assert_eq!(Size::Word.sign_extend(0x8000), 0xFFFF_8000);
        assert_eq!(Size::from_suffix('s'), Some(Size::Byte));
    }

    #[test]
    fn isa_tiers_are_ordered() {
        assert!(IsaTier::A < IsaTier::B && IsaTier::B < IsaTier::C);
        assert_eq!("isa_b".parse::<IsaTier>(), Ok(IsaTier::B));
        assert!("d".parse::<IsaTier>().is_err());
    }

    #[test]
    fn slot_checks_reject_illegal_modes() {
        let def = InstrDef::new("clr", 0x4200, 0x00FF).sizes(&[Size::Byte, Size::Word, Size::Long]).dst(Modes::DATA_ALT);
        assert!(def.matches(0x4280)); // clr.l d0
        assert!(!def.matches(0x4288)); // a0 is not data-alterable
        assert!(!def.matches(0x42BC)); // #imm
    }

    #[test]
    fn encoding_length_matches_emitted_words() {
        let enc = Encoding::new(0x0680).ea(Ea::Immediate(0x1234_5678), Size::Long).word(7);
        let mut out = Vec::new();
        enc.emit(&mut out).unwrap();
        assert_eq!(enc.len_bytes() as usize, out.len() * 2);
        assert_eq!(out, vec![0x0680, 0x1234, 0x5678, 7]);
    }
}
