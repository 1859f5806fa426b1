//! The instruction registry: built once, read-only afterwards.

use std::collections::HashMap;

use tracing::debug;

use crate::cpu::Trap;
use crate::error::{AsmError, LogicError};
use crate::isa::{catalog, Decoded, Instruction, IsaTier, Operands, Size};
use crate::stream::InstructionStream;

pub struct Registry {
    insns: Vec<Box<dyn Instruction>>,
    /// Per top nibble, indices into `insns` ordered most specific first.
    buckets: [Vec<usize>; 16],
    by_mnemonic: HashMap<String, Vec<usize>>,
}

impl Registry {
    /// Build the full catalog. Call once at startup.
    pub fn build() -> Self {
        Self::from_instructions(catalog())
    }

    /// Build and reject catalogs where two definitions of equal specificity
    /// claim the same word on the same ISA tier.
    pub fn build_checked() -> Result<Self, LogicError> {
        let r = Self::build();
        r.verify()?;
        Ok(r)
    }

    pub fn from_instructions(insns: Vec<Box<dyn Instruction>>) -> Self {
        let mut buckets: [Vec<usize>; 16] = Default::default();
        let mut by_mnemonic: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, insn) in insns.iter().enumerate() {
            let def = insn.def();
            for (nibble, bucket) in buckets.iter_mut().enumerate() {
                let top = (nibble as u16) << 12;
                if (top ^ def.opcode) & !def.var_mask & 0xF000 == 0 {
                    bucket.push(i);
                }
            }
            for name in std::iter::once(&def.mnemonic).chain(def.aliases.iter()) {
                by_mnemonic.entry(name.to_ascii_lowercase()).or_default().push(i);
            }
        }
        for bucket in &mut buckets {
            // Stable: equal specificity keeps registration order.
            bucket.sort_by_key(|&i| std::cmp::Reverse(insns[i].def().specificity()));
        }
        debug!(definitions = insns.len(), "registry built");
        Self { insns, buckets, by_mnemonic }
    }

    pub fn len(&self) -> usize {
        self.insns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Instruction> + '_ {
        self.insns.iter().map(|b| b.as_ref())
    }

    fn claims(insn: &dyn Instruction, word: u16, isa: IsaTier) -> bool {
        let def = insn.def();
        def.isa <= isa && def.matches(word) && insn.accepts(word)
    }

    /// Most specific definition for `word` visible on `isa`.
    pub fn lookup(&self, word: u16, isa: IsaTier) -> Option<&dyn Instruction> {
        self.buckets[(word >> 12) as usize]
            .iter()
            .map(|&i| self.insns[i].as_ref())
            .find(|insn| Self::claims(*insn, word, isa))
    }

    /// Decode the instruction at the stream position; `None` if no
    /// definition claims the opcode word or its extension words hold a
    /// reserved encoding.
    pub fn decode(&self, s: &mut dyn InstructionStream, isa: IsaTier) -> Result<Option<Decoded>, Trap> {
        match self.lookup(s.opcode(), isa) {
            Some(insn) => match insn.decode(s) {
                Ok(d) => Ok(Some(d)),
                Err(Trap::Reserved { .. }) => Ok(None),
                Err(t) => Err(t),
            },
            None => Ok(None),
        }
    }

    /// Exhaustively check every opcode word on every tier.
    pub fn verify(&self) -> Result<(), LogicError> {
        for isa in IsaTier::ALL {
            for word in 0..=u16::MAX {
                let mut hits = self.buckets[(word >> 12) as usize]
                    .iter()
                    .map(|&i| self.insns[i].as_ref())
                    .filter(|insn| Self::claims(*insn, word, isa));
                let Some(first) = hits.next() else { continue };
                if let Some(second) = hits.next() {
                    if second.def().specificity() == first.def().specificity() {
                        return Err(LogicError::Ambiguous {
                            opcode: word,
                            isa: isa.letter(),
                            first: first.def().mnemonic,
                            second: second.def().mnemonic,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Definitions answering to `mnemonic` (case-insensitive), in
    /// registration order, regardless of tier.
    pub fn by_mnemonic(&self, mnemonic: &str) -> impl Iterator<Item = &dyn Instruction> + '_ {
        self.by_mnemonic
            .get(&mnemonic.to_ascii_lowercase())
            .into_iter()
            .flatten()
            .map(|&i| self.insns[i].as_ref())
    }

    /// First definition for `mnemonic` on `isa` that can represent `ops`.
    pub fn select(&self, mnemonic: &str, ops: &Operands, isa: IsaTier) -> Result<&dyn Instruction, AsmError> {
        let mut seen_any = false;
        let mut first_err: Option<AsmError> = None;
        for insn in self.by_mnemonic(mnemonic) {
            seen_any = true;
            if insn.def().isa > isa {
                continue;
            }
            match insn.plan(mnemonic, ops) {
                Ok(_) => return Ok(insn),
                Err(e) => {
                    // A size mismatch on one form says less than a real
                    // operand problem on another.
                    let weak = matches!(first_err, None | Some(AsmError::BadSize { .. } | AsmError::SizeRequired { .. }));
                    if weak {
                        first_err = Some(e);
                    }
                }
            }
        }
        if !seen_any {
            return Err(AsmError::UnknownMnemonic(mnemonic.to_string()));
        }
        Err(first_err.unwrap_or(AsmError::NotInIsa { mnemonic: mnemonic.to_string(), isa: isa.letter() }))
    }

    /// Smallest displacement size at which some form of `mnemonic` visible
    /// on `isa` can branch by `offset`.
    pub fn branch_size(&self, mnemonic: &str, offset: i32, isa: IsaTier) -> Option<Size> {
        [Size::Byte, Size::Word, Size::Long].into_iter().find(|&size| {
            self.by_mnemonic(mnemonic)
                .any(|insn| insn.def().isa <= isa && insn.is_relative_offset_valid(offset, Some(size)))
        })
    }

    pub fn calc_size(&self, mnemonic: &str, ops: &Operands, isa: IsaTier) -> Result<u32, AsmError> {
        self.select(mnemonic, ops, isa)?.calc_size(mnemonic, ops)
    }

    pub fn encode(&self, mnemonic: &str, ops: &Operands, isa: IsaTier) -> Result<Vec<u16>, AsmError> {
        let mut out = Vec::new();
        self.select(mnemonic, ops, isa)?.encode(mnemonic, ops, &mut out)?;
        Ok(out)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::build()
    }
}
