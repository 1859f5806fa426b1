//! Two-pass assembler driven by the instruction registry.
//!
//! Pass one sizes every statement and binds labels; pass two resolves
//! symbols and encodes. A branch whose target is not yet known in pass one
//! is committed to the word form; a backward one gets the smallest form its
//! displacement fits, so sizes never change between passes.

use std::cell::Cell;
use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use coldfire_rs::ea::Ea;
use coldfire_rs::{AsmError, IsaTier, Operands, ProgramImage, Registry, Size};

use crate::operand::{is_symbol, parse_arg, parse_expr, split_operands, Arg, Expr};

#[derive(thiserror::Error, Debug)]
pub enum AsmLineError {
    #[error("line {line}: {msg}")]
    Syntax { line: usize, msg: String },
    #[error("line {line}: {source}")]
    Encode {
        line: usize,
        #[source]
        source: AsmError,
    },
    #[error("line {line}: undefined symbol `{name}`")]
    Undefined { line: usize, name: String },
    #[error("line {line}: symbol `{name}` defined twice")]
    Duplicate { line: usize, name: String },
}

impl AsmLineError {
    pub fn line(&self) -> usize {
        match self {
            AsmLineError::Syntax { line, .. }
            | AsmLineError::Encode { line, .. }
            | AsmLineError::Undefined { line, .. }
            | AsmLineError::Duplicate { line, .. } => *line,
        }
    }
}

#[derive(Debug, Clone)]
enum Stmt {
    Org(Expr),
    Even,
    Data(Size, Vec<Expr>),
    Insn {
        mnemonic: String,
        size: Option<Size>,
        args: Vec<Arg>,
    },
}

#[derive(Debug, Clone)]
struct Line {
    number: usize,
    label: Option<String>,
    stmt: Option<Stmt>,
}

/// Output of a successful assembly.
#[derive(Debug, Clone)]
pub struct Assembly {
    pub image: ProgramImage,
    pub symbols: BTreeMap<String, u32>,
}

fn syntax(line: usize, msg: impl Into<String>) -> AsmLineError {
    AsmLineError::Syntax { line, msg: msg.into() }
}

/// Drop a `;` comment that is not inside a character literal.
fn strip_comment(text: &str) -> &str {
    let mut quoted = false;
    for (i, c) in text.char_indices() {
        match c {
            '\'' => quoted = !quoted,
            ';' if !quoted => return &text[..i],
            _ => {}
        }
    }
    text
}

fn parse_line(number: usize, text: &str) -> Result<Line, AsmLineError> {
    let mut rest = strip_comment(text).trim();
    let mut label = None;
    if let Some((head, tail)) = rest.split_once(':') {
        let head = head.trim();
        if is_symbol(head) && !head.contains(char::is_whitespace) {
            label = Some(head.to_string());
            rest = tail.trim();
        }
    }
    if rest.is_empty() {
        return Ok(Line { number, label, stmt: None });
    }

    let (word, operands) = match rest.split_once(char::is_whitespace) {
        Some((w, o)) => (w, o.trim()),
        None => (rest, ""),
    };
    let word = word.to_ascii_lowercase();
    let exprs = || -> Result<Vec<Expr>, AsmLineError> {
        split_operands(operands)
            .into_iter()
            .map(|e| parse_expr(e).map_err(|m| syntax(number, m)))
            .collect()
    };
    let stmt = match word.as_str() {
        ".org" => Stmt::Org(parse_expr(operands).map_err(|m| syntax(number, m))?),
        ".even" => Stmt::Even,
        ".byte" | "dc.b" => Stmt::Data(Size::Byte, exprs()?),
        ".word" | "dc.w" => Stmt::Data(Size::Word, exprs()?),
        ".long" | "dc.l" => Stmt::Data(Size::Long, exprs()?),
        w if w.starts_with('.') => return Err(syntax(number, format!("unknown directive `{w}`"))),
        w => {
            let (mnemonic, size) = match w.split_once('.') {
                Some((m, s)) => {
                    let mut chars = s.chars();
                    let size = match (chars.next(), chars.next()) {
                        (Some(c), None) => Size::from_suffix(c),
                        _ => None,
                    };
                    (m, Some(size.ok_or_else(|| syntax(number, format!("bad size suffix `.{s}`")))?))
                }
                None => (w, None),
            };
            let args = split_operands(operands)
                .into_iter()
                .map(|a| parse_arg(a).map_err(|m| syntax(number, m)))
                .collect::<Result<Vec<_>, _>>()?;
            Stmt::Insn { mnemonic: mnemonic.to_string(), size, args }
        }
    };
    Ok(Line { number, label, stmt: Some(stmt) })
}

/// Symbol lookup for one pass. In the sizing pass unknown symbols resolve
/// to a placeholder instead of failing.
struct Resolver<'a> {
    symbols: &'a HashMap<String, u32>,
    strict: bool,
    line: usize,
}

impl Resolver<'_> {
    /// Value of `e`, and whether it is final.
    fn value(&self, e: &Expr) -> Result<(i64, bool), AsmLineError> {
        let Some(name) = &e.symbol else {
            return Ok((e.offset, true));
        };
        match self.symbols.get(name) {
            Some(&addr) => Ok((addr as i64 + e.offset, true)),
            None if self.strict => Err(AsmLineError::Undefined { line: self.line, name: name.clone() }),
            None => Ok((1, false)),
        }
    }

    fn ranged(&self, e: &Expr, lo: i64, hi: i64, what: &str) -> Result<i64, AsmLineError> {
        let (v, _) = self.value(e)?;
        if !(lo..=hi).contains(&v) {
            return Err(syntax(self.line, format!("{what} {v} out of range {lo}..={hi}")));
        }
        Ok(v)
    }
}

fn fits_abs_short(v: i64) -> bool {
    (-0x8000..=0x7FFF).contains(&v) || (0xFFFF_8000..=0xFFFF_FFFF).contains(&v)
}

pub struct Assembler<'r> {
    registry: &'r Registry,
    isa: IsaTier,
}

impl<'r> Assembler<'r> {
    pub fn new(registry: &'r Registry, isa: IsaTier) -> Self {
        Self { registry, isa }
    }

    fn is_branch(&self, mnemonic: &str) -> bool {
        self.registry.by_mnemonic(mnemonic).any(|i| i.def().opcode & 0xF000 == 0x6000)
    }

    /// Lower one parsed operand at `pc`. Returns the operand and whether
    /// every value in it was known.
    fn lower(&self, r: &Resolver<'_>, arg: &Arg, mnemonic: &str, pc: u32) -> Result<(Ea, bool), AsmLineError> {
        let known = Cell::new(true);
        let val = |e: &Expr| -> Result<i64, AsmLineError> {
            let (v, k) = r.value(e)?;
            if !k {
                known.set(false);
            }
            Ok(v)
        };
        let ea = match arg {
            Arg::DataReg(n) if mnemonic == "movem" => Ea::RegList(1 << n),
            Arg::AddrReg(n) if mnemonic == "movem" => Ea::RegList(1 << (8 + n)),
            Arg::DataReg(n) => Ea::DataReg(*n),
            Arg::AddrReg(n) => Ea::AddrReg(*n),
            Arg::Indirect(n) => Ea::Indirect(*n),
            Arg::PostInc(n) => Ea::PostInc(*n),
            Arg::PreDec(n) => Ea::PreDec(*n),
            Arg::Disp(e, reg) => {
                val(e)?;
                Ea::Disp { reg: *reg, disp: r.ranged(e, -0x8000, 0x7FFF, "displacement")? as i16 }
            }
            Arg::Index(e, reg, index) => {
                val(e)?;
                Ea::Index { reg: *reg, disp: r.ranged(e, -0x80, 0x7F, "index displacement")? as i8, index: *index }
            }
            Arg::AbsShort(e) => {
                let v = val(e)?;
                if !fits_abs_short(v) {
                    return Err(syntax(r.line, format!("address {v:#x} does not fit .w")));
                }
                Ea::AbsShort(v as i16)
            }
            Arg::AbsLong(e) => Ea::AbsLong(val(e)? as u32),
            Arg::Bare(e) if self.is_branch(mnemonic) => {
                let target = val(e)?;
                if known.get() {
                    Ea::Relative(target.wrapping_sub(pc as i64 + 2) as i32)
                } else {
                    Ea::Relative(2)
                }
            }
            // Expressions naming a symbol always take the long form, so a
            // label's value cannot change an instruction's size.
            Arg::Bare(e) => {
                let v = val(e)?;
                if e.symbol.is_none() && fits_abs_short(v) {
                    Ea::AbsShort(v as i16)
                } else {
                    Ea::AbsLong(v as u32)
                }
            }
            Arg::PcDisp(e) | Arg::PcIndex(e, _) => {
                let v = val(e)?;
                // Measured from the extension word, assumed to follow the opcode.
                let disp = if e.symbol.is_some() && known.get() { v - (pc as i64 + 2) } else { v };
                match arg {
                    Arg::PcIndex(_, index) => {
                        if !(-0x80..=0x7F).contains(&disp) {
                            return Err(syntax(r.line, format!("pc index displacement {disp} out of range")));
                        }
                        Ea::PcIndex { disp: disp as i8, index: *index }
                    }
                    _ => {
                        if !(-0x8000..=0x7FFF).contains(&disp) {
                            return Err(syntax(r.line, format!("pc displacement {disp} out of range")));
                        }
                        Ea::PcDisp(disp as i16)
                    }
                }
            }
            Arg::Immediate(e) => {
                let v = val(e)?;
                if !(-0x8000_0000..=0xFFFF_FFFF).contains(&v) {
                    return Err(syntax(r.line, format!("immediate {v} does not fit 32 bits")));
                }
                Ea::Immediate(v as u32)
            }
            Arg::RegList(mask) => Ea::RegList(*mask),
            Arg::RegPair(w, x) => Ea::RegPair(*w, *x),
            Arg::Special(s) => Ea::Special(*s),
        };
        Ok((ea, known.get()))
    }

    /// Place a lone operand in whichever slot the mnemonic's forms expect.
    fn arrange(&self, mnemonic: &str, size: Option<Size>, first: Option<Ea>, second: Option<Ea>) -> Result<Operands, AsmError> {
        match (first, second) {
            (Some(only), None) => {
                let as_src = Operands::new(size, Some(only), None);
                let src_err = match self.registry.select(mnemonic, &as_src, self.isa) {
                    Ok(_) => return Ok(as_src),
                    Err(e) => e,
                };
                let as_dst = Operands::new(size, None, Some(only));
                match self.registry.select(mnemonic, &as_dst, self.isa) {
                    Ok(_) => Ok(as_dst),
                    Err(dst_err) => Err(match src_err {
                        AsmError::ExtraOperand { .. } | AsmError::MissingOperand { .. } => dst_err,
                        other => other,
                    }),
                }
            }
            (src, dst) => Ok(Operands::new(size, src, dst)),
        }
    }

    fn operands(
        &self,
        r: &Resolver<'_>,
        mnemonic: &str,
        size: Option<Size>,
        args: &[Arg],
        pc: u32,
    ) -> Result<(Operands, bool), AsmLineError> {
        if args.len() > 2 {
            return Err(syntax(r.line, format!("{mnemonic}: too many operands")));
        }
        let mut eas = Vec::with_capacity(args.len());
        let mut known = true;
        for a in args {
            let (ea, k) = self.lower(r, a, mnemonic, pc)?;
            known &= k;
            eas.push(ea);
        }
        let ops = self
            .arrange(mnemonic, size, eas.first().copied(), eas.get(1).copied())
            .map_err(|source| AsmLineError::Encode { line: r.line, source })?;
        Ok((ops, known))
    }

    pub fn assemble(&self, source: &str) -> Result<Assembly, AsmLineError> {
        let lines = source
            .lines()
            .enumerate()
            .map(|(i, text)| parse_line(i + 1, text))
            .collect::<Result<Vec<_>, _>>()?;

        // Pass 1: sizes and labels.
        let mut symbols: HashMap<String, u32> = HashMap::new();
        let mut sizes: Vec<(Option<Size>, u32)> = Vec::with_capacity(lines.len());
        let mut pc = 0u32;
        for line in &lines {
            if let Some(name) = &line.label {
                if symbols.insert(name.clone(), pc).is_some() {
                    return Err(AsmLineError::Duplicate { line: line.number, name: name.clone() });
                }
            }
            let r = Resolver { symbols: &symbols, strict: false, line: line.number };
            let mut planned = (None, 0);
            match &line.stmt {
                None => {}
                Some(Stmt::Org(e)) => {
                    let strict = Resolver { strict: true, ..r };
                    pc = strict.ranged(e, 0, u32::MAX as i64, ".org address")? as u32;
                }
                Some(Stmt::Even) => pc = (pc + 1) & !1,
                Some(Stmt::Data(size, values)) => pc = pc.wrapping_add(size.bytes() * values.len() as u32),
                Some(Stmt::Insn { mnemonic, size, args }) => {
                    let (mut ops, known) = self.operands(&r, mnemonic, *size, args, pc)?;
                    if size.is_none() && self.is_branch(mnemonic) {
                        ops.size = match ops.src {
                            Some(Ea::Relative(off)) if known => {
                                self.registry.branch_size(mnemonic, off, self.isa).or(Some(Size::Word))
                            }
                            _ => Some(Size::Word),
                        };
                    }
                    let n = self
                        .registry
                        .calc_size(mnemonic, &ops, self.isa)
                        .map_err(|source| AsmLineError::Encode { line: line.number, source })?;
                    planned = (ops.size, n);
                    pc = pc.wrapping_add(n);
                }
            }
            sizes.push(planned);
        }
        debug!(symbols = symbols.len(), "pass 1 done");

        // Pass 2: encode.
        let mut image = ProgramImage::new();
        let mut first: Option<u32> = None;
        pc = 0;
        for (line, &(forced, expected)) in lines.iter().zip(&sizes) {
            let r = Resolver { symbols: &symbols, strict: true, line: line.number };
            match &line.stmt {
                None => {}
                Some(Stmt::Org(e)) => pc = r.value(e)?.0 as u32,
                Some(Stmt::Even) => pc = (pc + 1) & !1,
                Some(Stmt::Data(size, values)) => {
                    first.get_or_insert(pc);
                    let lo = -(size.msb() as i64);
                    let hi = size.mask() as i64;
                    for e in values {
                        let v = r.ranged(e, lo, hi, "value")? as u32;
                        let bytes = v.to_be_bytes();
                        image.write_bytes(pc, &bytes[4 - size.bytes() as usize..]);
                        pc = pc.wrapping_add(size.bytes());
                    }
                }
                Some(Stmt::Insn { mnemonic, size, args }) => {
                    first.get_or_insert(pc);
                    let (mut ops, _) = self.operands(&r, mnemonic, *size, args, pc)?;
                    ops.size = forced;
                    let words = self
                        .registry
                        .encode(mnemonic, &ops, self.isa)
                        .map_err(|source| AsmLineError::Encode { line: line.number, source })?;
                    let n = 2 * words.len() as u32;
                    if n != expected {
                        return Err(syntax(line.number, format!("{mnemonic}: size changed from {expected} to {n} bytes")));
                    }
                    image.write_words(pc, &words);
                    pc = pc.wrapping_add(n);
                }
            }
        }
        image.start = symbols.get("start").copied().or(first);
        Ok(Assembly { image, symbols: symbols.into_iter().collect() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn assemble(src: &str) -> Result<Assembly, AsmLineError> {
        let registry = Registry::build();
        Assembler::new(&registry, IsaTier::C).assemble(src)
    }

    fn bytes(img: &ProgramImage, addr: u32, n: u32) -> Vec<u8> {
        (addr..addr + n).map(|a| img.get(a).unwrap()).collect()
    }

    #[test]
    fn simple_program() {
        let out = assemble("start:  nop      ; idle\n        rts\n").unwrap();
        assert_eq!(bytes(&out.image, 0, 4), vec![0x4E, 0x71, 0x4E, 0x75]);
        assert_eq!(out.image.start, Some(0));
        assert_eq!(out.symbols.get("start"), Some(&0));
    }

    #[test]
    fn forward_branch_takes_word_form() {
        let out = assemble("        bra fwd\n        nop\nfwd:    rts\n").unwrap();
        assert_eq!(bytes(&out.image, 0, 4), vec![0x60, 0x00, 0x00, 0x04]);
        assert_eq!(out.symbols.get("fwd"), Some(&6));
    }

    #[test]
    fn backward_branch_takes_byte_form() {
        let out = assemble("loop:   nop\n        bra loop\n").unwrap();
        assert_eq!(bytes(&out.image, 2, 2), vec![0x60, 0xFC]);
    }

    #[test]
    fn far_backward_branch_takes_long_form() {
        let src = "loop:   nop\n        .org 0x20000\n        bra loop\n";
        let out = assemble(src).unwrap();
        assert_eq!(bytes(&out.image, 0x20000, 6), vec![0x60, 0xFF, 0xFF, 0xFD, 0xFF, 0xFE]);

        let registry = Registry::build();
        let err = Assembler::new(&registry, IsaTier::A).assemble(src).unwrap_err();
        assert!(matches!(err, AsmLineError::Encode { line: 3, source: AsmError::OutOfRange { .. } }), "{err}");
    }

    #[test]
    fn immediate_move() {
        let out = assemble("  move.l #$12345678,d0\n").unwrap();
        assert_eq!(bytes(&out.image, 0, 6), vec![0x20, 0x3C, 0x12, 0x34, 0x56, 0x78]);
    }

    #[test]
    fn data_directives() {
        let src = "  .org 0x100\n  .word 0x1234, -1\n  .byte 1\n  .even\n  .long fwd\nfwd:\n";
        let out = assemble(src).unwrap();
        assert_eq!(bytes(&out.image, 0x100, 5), vec![0x12, 0x34, 0xFF, 0xFF, 0x01]);
        assert_eq!(out.image.get(0x105), None);
        assert_eq!(bytes(&out.image, 0x106, 4), vec![0x00, 0x00, 0x01, 0x0A]);
        assert_eq!(out.image.start, Some(0x100));
    }

    #[test]
    fn errors_carry_line_numbers() {
        let err = assemble("  nop\n  bra nowhere\n").unwrap_err();
        assert!(matches!(err, AsmLineError::Undefined { line: 2, .. }), "{err}");
        let err = assemble("x: nop\nx: nop\n").unwrap_err();
        assert_eq!(err.line(), 2);
        let err = assemble("  frob d0\n").unwrap_err();
        assert!(matches!(err, AsmLineError::Encode { line: 1, source: AsmError::UnknownMnemonic(_) }));
        let err = assemble("  .byte 300\n").unwrap_err();
        assert!(matches!(err, AsmLineError::Syntax { line: 1, .. }));
    }

    #[test]
    fn isa_gates_assembly() {
        let registry = Registry::build();
        let err = Assembler::new(&registry, IsaTier::A).assemble("  mov3q #1,d0\n").unwrap_err();
        assert!(matches!(err, AsmLineError::Encode { source: AsmError::NotInIsa { .. }, .. }), "{err}");
    }
}
