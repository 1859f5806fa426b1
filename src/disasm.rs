//! Motorola-syntax rendering of decoded instructions, and range listings.

use std::fmt;

use serde::Serialize;

use crate::cpu::control_reg_name;
use crate::ea::{Ea, IndexReg, SpecialReg};
use crate::isa::{Decoded, IsaTier};
use crate::memory::Bus;
use crate::registry::Registry;
use crate::stream::BusStream;

fn signed_hex(f: &mut fmt::Formatter<'_>, v: i64) -> fmt::Result {
    if v < 0 {
        write!(f, "-{:#x}", -v)
    } else {
        write!(f, "{v:#x}")
    }
}

impl fmt::Display for IndexReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.addr { 'a' } else { 'd' };
        let size = if self.long { 'l' } else { 'w' };
        write!(f, "{kind}{}.{size}", self.reg)?;
        if self.scale != 1 {
            write!(f, "*{}", self.scale)?;
        }
        Ok(())
    }
}

/// `d0-d3/a5` style register list, bit 0 = D0 .. bit 15 = A7.
fn reg_list(f: &mut fmt::Formatter<'_>, mask: u16) -> fmt::Result {
    let mut first = true;
    let mut i = 0;
    while i < 16 {
        if mask & (1 << i) == 0 {
            i += 1;
            continue;
        }
        // Runs never cross from the data to the address bank.
        let bank_end = if i < 8 { 8 } else { 16 };
        let mut j = i;
        while j + 1 < bank_end && mask & (1 << (j + 1)) != 0 {
            j += 1;
        }
        if !first {
            f.write_str("/")?;
        }
        first = false;
        let name = |r: usize| format!("{}{}", if r < 8 { 'd' } else { 'a' }, r % 8);
        if j > i {
            write!(f, "{}-{}", name(i), name(j))?;
        } else {
            f.write_str(&name(i))?;
        }
        i = j + 1;
    }
    Ok(())
}

impl fmt::Display for SpecialReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            SpecialReg::Sr => f.write_str("sr"),
            SpecialReg::Ccr => f.write_str("ccr"),
            SpecialReg::Usp => f.write_str("usp"),
            SpecialReg::Control(code) => match control_reg_name(code) {
                Some(name) => f.write_str(name),
                None => write!(f, "{code:#05x}"),
            },
            SpecialReg::Cache(c) => f.write_str(match c {
                1 => "dc",
                2 => "ic",
                3 => "bc",
                _ => "nc",
            }),
        }
    }
}

impl fmt::Display for Ea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Ea::DataReg(r) => write!(f, "d{r}"),
            Ea::AddrReg(r) => write!(f, "a{r}"),
            Ea::Indirect(r) => write!(f, "(a{r})"),
            Ea::PostInc(r) => write!(f, "(a{r})+"),
            Ea::PreDec(r) => write!(f, "-(a{r})"),
            Ea::Disp { reg, disp } => write!(f, "({disp},a{reg})"),
            Ea::Index { reg, disp, index } => write!(f, "({disp},a{reg},{index})"),
            Ea::AbsShort(v) => write!(f, "({:#x}).w", v as u16),
            Ea::AbsLong(v) => write!(f, "({v:#x}).l"),
            Ea::PcDisp(disp) => write!(f, "({disp},pc)"),
            Ea::PcIndex { disp, index } => write!(f, "({disp},pc,{index})"),
            Ea::Immediate(v) => write!(f, "#{v:#x}"),
            Ea::RegList(mask) => reg_list(f, mask),
            Ea::Relative(off) => {
                f.write_str("*")?;
                if off >= 0 {
                    f.write_str("+")?;
                }
                signed_hex(f, off as i64)
            }
            Ea::RegPair(w, x) => write!(f, "d{w}:d{x}"),
            Ea::Special(s) => write!(f, "{s}"),
        }
    }
}

/// Render one operand, turning branch displacements into absolute targets.
fn operand(d: &Decoded, ea: &Ea) -> String {
    match *ea {
        Ea::Relative(off) => format!("{:#x}", d.address.wrapping_add(2).wrapping_add(off as u32)),
        _ => ea.to_string(),
    }
}

/// Motorola syntax for one decoded instruction, e.g. `move.l (a0)+,d1`.
pub fn fmt_decoded(d: &Decoded) -> String {
    let mut s = String::from(d.mnemonic);
    if let Some(size) = d.size {
        s.push('.');
        s.push(size.suffix());
    }
    let ops: Vec<String> = [d.src, d.dst].iter().flatten().map(|ea| operand(d, ea)).collect();
    if !ops.is_empty() {
        s.push(' ');
        s.push_str(&ops.join(","));
    }
    s
}

/// Absolute target of a PC-relative branch, if `d` is one.
pub fn branch_target(d: &Decoded) -> Option<u32> {
    match d.src {
        Some(Ea::Relative(off)) => Some(d.address.wrapping_add(2).wrapping_add(off as u32)),
        _ => None,
    }
}

/// One line of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingLine {
    pub address: u32,
    pub words: Vec<u16>,
    pub text: String,
    /// `None` for `dc.w` lines.
    pub decoded: Option<Decoded>,
}

/// Disassemble one instruction at `addr`. Unrecognized or truncated words
/// come back as a one-word `dc.w` line.
pub fn disassemble_one(bus: &mut dyn Bus, registry: &Registry, isa: IsaTier, addr: u32) -> anyhow::Result<ListingLine> {
    let opcode = bus.read_u16(addr)?;
    let decoded = {
        let mut s = BusStream::new(bus, addr)?;
        registry.decode(&mut s, isa).ok().flatten()
    };
    let Some(d) = decoded else {
        return Ok(ListingLine {
            address: addr,
            words: vec![opcode],
            text: format!("dc.w {opcode:#06x}"),
            decoded: None,
        });
    };
    let mut words = Vec::with_capacity(1 + d.ext_words as usize);
    for i in 0..=d.ext_words {
        words.push(bus.read_u16(addr.wrapping_add(2 * i))?);
    }
    Ok(ListingLine { address: addr, words, text: fmt_decoded(&d), decoded: Some(d) })
}

/// Linear listing of `[start, end)`.
pub fn disassemble(bus: &mut dyn Bus, registry: &Registry, isa: IsaTier, start: u32, end: u32) -> anyhow::Result<Vec<ListingLine>> {
    let mut out = Vec::new();
    let mut addr = start;
    while addr < end {
        let line = disassemble_one(bus, registry, isa, addr)?;
        addr = addr.wrapping_add(2 * line.words.len() as u32);
        out.push(line);
    }
    Ok(out)
}
