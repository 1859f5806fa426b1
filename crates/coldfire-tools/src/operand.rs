//! Operand and expression syntax accepted by the assembler.
//!
//! Motorola forms are recognized in both spellings, `(d,An)` and `d(An)`.
//! Values stay unresolved here: an [`Expr`] may name a label that only the
//! second assembler pass knows.

use coldfire_rs::cpu::control_reg_code;
use coldfire_rs::ea::{IndexReg, SpecialReg};

/// `symbol + offset`; plain numbers carry no symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
    pub symbol: Option<String>,
    pub offset: i64,
}

impl Expr {
    pub fn num(v: i64) -> Self {
        Self { symbol: None, offset: v }
    }

    pub fn sym(name: &str, offset: i64) -> Self {
        Self { symbol: Some(name.to_string()), offset }
    }
}

/// A parsed operand, before symbol resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    DataReg(u8),
    AddrReg(u8),
    Indirect(u8),
    PostInc(u8),
    PreDec(u8),
    Disp(Expr, u8),
    Index(Expr, u8, IndexReg),
    AbsShort(Expr),
    AbsLong(Expr),
    /// Expression with no addressing decoration: an absolute address, or
    /// the target of a branch.
    Bare(Expr),
    PcDisp(Expr),
    PcIndex(Expr, IndexReg),
    Immediate(Expr),
    RegList(u16),
    RegPair(u8, u8),
    Special(SpecialReg),
}

pub fn is_symbol(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '.')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// `$1f`, `0x1f`, `%101`, `0b101`, `31` or `'c'`.
pub fn parse_number(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix('$').or_else(|| s.strip_prefix("0x")).or_else(|| s.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).ok();
    }
    if let Some(bin) = s.strip_prefix('%').or_else(|| s.strip_prefix("0b")).or_else(|| s.strip_prefix("0B")) {
        return i64::from_str_radix(bin, 2).ok();
    }
    if let Some(ch) = s.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')) {
        let mut it = ch.chars();
        return match (it.next(), it.next()) {
            (Some(c), None) if c.is_ascii() => Some(c as i64),
            _ => None,
        };
    }
    if s.starts_with(|c: char| c.is_ascii_digit()) {
        return s.parse::<i64>().ok();
    }
    None
}

/// Split on top-level `+`/`-`, folding unary signs into the following term.
fn split_terms(s: &str) -> Vec<(bool, &str)> {
    let mut out = Vec::new();
    let mut neg = false;
    let mut start = 0;
    let mut quoted = false;
    for (i, c) in s.char_indices() {
        match c {
            '\'' => quoted = !quoted,
            '+' | '-' if !quoted => {
                let term = s[start..i].trim();
                if term.is_empty() {
                    if c == '-' {
                        neg = !neg;
                    }
                } else {
                    out.push((neg, term));
                    neg = c == '-';
                }
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push((neg, s[start..].trim()));
    out
}

pub fn parse_expr(s: &str) -> Result<Expr, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty expression".into());
    }
    let mut expr = Expr::num(0);
    for (neg, term) in split_terms(s) {
        if term.is_empty() {
            return Err(format!("dangling operator in `{s}`"));
        }
        if let Some(v) = parse_number(term) {
            expr.offset = if neg { expr.offset - v } else { expr.offset + v };
        } else if is_symbol(term) {
            if neg {
                return Err(format!("symbol `{term}` cannot be subtracted"));
            }
            if expr.symbol.is_some() {
                return Err(format!("more than one symbol in `{s}`"));
            }
            expr.symbol = Some(term.to_string());
        } else {
            return Err(format!("bad term `{term}`"));
        }
    }
    Ok(expr)
}

/// `dN`, `aN`, `sp` or `fp`, as `(is_address, number)`.
fn register(s: &str) -> Option<(bool, u8)> {
    match s {
        "sp" => return Some((true, 7)),
        "fp" => return Some((true, 6)),
        _ => {}
    }
    let b = s.as_bytes();
    if b.len() != 2 || !(b'0'..=b'7').contains(&b[1]) {
        return None;
    }
    let n = b[1] - b'0';
    match b[0] {
        b'd' => Some((false, n)),
        b'a' => Some((true, n)),
        _ => None,
    }
}

fn addr_register(s: &str) -> Option<u8> {
    match register(s) {
        Some((true, n)) => Some(n),
        _ => None,
    }
}

/// `d1`, `a2.l`, `d3.w*4`.
fn index_register(s: &str) -> Result<IndexReg, String> {
    let (reg, scale) = match s.split_once('*') {
        Some((r, sc)) => {
            let sc = sc.trim();
            match sc {
                "1" | "2" | "4" | "8" => (r.trim(), sc.as_bytes()[0] - b'0'),
                _ => return Err(format!("bad index scale `{sc}`")),
            }
        }
        None => (s, 1),
    };
    let (name, long) = match reg.rsplit_once('.') {
        Some((n, "l")) => (n, true),
        Some((n, "w")) => (n, false),
        Some((_, other)) => return Err(format!("bad index size `.{other}`")),
        None => (reg, true),
    };
    let (addr, n) = register(name).ok_or_else(|| format!("bad index register `{name}`"))?;
    Ok(IndexReg { addr, reg: n, long, scale })
}

/// `d0-d3/a5`; a range stays within one register bank.
fn reg_list(s: &str) -> Option<u16> {
    let mut mask = 0u16;
    for part in s.split('/') {
        let part = part.trim();
        let (lo, hi) = match part.split_once('-') {
            Some((a, b)) => (register(a.trim())?, register(b.trim())?),
            None => {
                let r = register(part)?;
                (r, r)
            }
        };
        if lo.0 != hi.0 || lo.1 > hi.1 {
            return None;
        }
        let bank = if lo.0 { 8 } else { 0 };
        for n in lo.1..=hi.1 {
            mask |= 1 << (bank + n);
        }
    }
    Some(mask)
}

fn special(s: &str) -> Option<SpecialReg> {
    Some(match s {
        "sr" => SpecialReg::Sr,
        "ccr" => SpecialReg::Ccr,
        "usp" => SpecialReg::Usp,
        "dc" => SpecialReg::Cache(1),
        "ic" => SpecialReg::Cache(2),
        "bc" => SpecialReg::Cache(3),
        _ => SpecialReg::Control(control_reg_code(s)?),
    })
}

/// Split on commas outside parentheses.
pub fn split_operands(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    let mut quoted = false;
    for (i, c) in s.char_indices() {
        match c {
            '\'' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => depth -= 1,
            ',' if depth == 0 && !quoted => {
                out.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = s[start..].trim();
    if !last.is_empty() || !out.is_empty() {
        out.push(last);
    }
    out
}

/// Everything of the form `disp(base[,index])` or `(disp,base[,index])`.
fn parenthesized(t: &str) -> Result<Arg, String> {
    let open = t.find('(').ok_or_else(|| format!("bad operand `{t}`"))?;
    let prefix = t[..open].trim();
    let inner = &t[open + 1..t.len() - 1];
    let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
    let lower0 = parts[0].to_ascii_lowercase();
    let base_first = lower0 == "pc" || addr_register(&lower0).is_some();

    let (disp, regs) = if !prefix.is_empty() {
        (Some(parse_expr(prefix)?), &parts[..])
    } else if base_first {
        (None, &parts[..])
    } else if parts.len() == 1 {
        if register(&lower0).is_some() {
            return Err(format!("`{}` is not an address register", parts[0]));
        }
        return Ok(Arg::Bare(parse_expr(parts[0])?));
    } else {
        (Some(parse_expr(parts[0])?), &parts[1..])
    };
    let base = regs[0].to_ascii_lowercase();
    let index = match regs.len() {
        1 => None,
        2 => Some(index_register(&regs[1].to_ascii_lowercase())?),
        _ => return Err(format!("too many components in `{t}`")),
    };
    let disp_or_zero = || disp.clone().unwrap_or(Expr::num(0));
    if base == "pc" {
        return Ok(match index {
            None => Arg::PcDisp(disp_or_zero()),
            Some(ix) => Arg::PcIndex(disp_or_zero(), ix),
        });
    }
    let reg = addr_register(&base).ok_or_else(|| format!("`{}` is not an address register", regs[0]))?;
    Ok(match (index, &disp) {
        (None, None) => Arg::Indirect(reg),
        (None, Some(d)) => Arg::Disp(d.clone(), reg),
        (Some(ix), _) => Arg::Index(disp_or_zero(), reg, ix),
    })
}

pub fn parse_arg(s: &str) -> Result<Arg, String> {
    let t = s.trim();
    if t.is_empty() {
        return Err("empty operand".into());
    }
    if let Some(imm) = t.strip_prefix('#') {
        return Ok(Arg::Immediate(parse_expr(imm)?));
    }
    let lower = t.to_ascii_lowercase();
    if let Some((addr, n)) = register(&lower) {
        return Ok(if addr { Arg::AddrReg(n) } else { Arg::DataReg(n) });
    }
    if let Some(sp) = special(&lower) {
        return Ok(Arg::Special(sp));
    }
    if let Some((w, x)) = lower.split_once(':') {
        return match (register(w.trim()), register(x.trim())) {
            (Some((false, w)), Some((false, x))) => Ok(Arg::RegPair(w, x)),
            _ => Err(format!("bad register pair `{t}`")),
        };
    }
    if lower.contains('/') || lower.contains('-') {
        if let Some(mask) = reg_list(&lower) {
            return Ok(Arg::RegList(mask));
        }
    }
    if let Some(inner) = lower.strip_prefix("-(").and_then(|r| r.strip_suffix(')')) {
        return addr_register(inner.trim()).map(Arg::PreDec).ok_or_else(|| format!("bad predecrement `{t}`"));
    }
    if let Some(inner) = lower.strip_prefix('(').and_then(|r| r.strip_suffix(")+")) {
        return addr_register(inner.trim()).map(Arg::PostInc).ok_or_else(|| format!("bad postincrement `{t}`"));
    }
    for (suffix, long) in [(".w", false), (".l", true)] {
        if lower.ends_with(suffix) {
            let body = t[..t.len() - 2].trim();
            let body = body.strip_prefix('(').and_then(|b| b.strip_suffix(')')).unwrap_or(body);
            if register(&body.to_ascii_lowercase()).is_some() {
                return Err(format!("register `{body}` used as an absolute address"));
            }
            let e = parse_expr(body)?;
            return Ok(if long { Arg::AbsLong(e) } else { Arg::AbsShort(e) });
        }
    }
    if t.ends_with(')') {
        return parenthesized(t);
    }
    Ok(Arg::Bare(parse_expr(t)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn numbers_and_expressions() {
        assert_eq!(parse_number("$1F"), Some(0x1F));
        assert_eq!(parse_number("%101"), Some(5));
        assert_eq!(parse_number("'A'"), Some(65));
        assert_eq!(parse_expr("loop+4").unwrap(), Expr::sym("loop", 4));
        assert_eq!(parse_expr("-8").unwrap(), Expr::num(-8));
        assert_eq!(parse_expr("0x10-2").unwrap(), Expr::num(14));
        assert!(parse_expr("a+b").is_err());
        assert!(parse_expr("4-").is_err());
    }

    #[test]
    fn register_forms() {
        assert_eq!(parse_arg("D3").unwrap(), Arg::DataReg(3));
        assert_eq!(parse_arg("sp").unwrap(), Arg::AddrReg(7));
        assert_eq!(parse_arg("(a0)+").unwrap(), Arg::PostInc(0));
        assert_eq!(parse_arg("-(sp)").unwrap(), Arg::PreDec(7));
        assert_eq!(parse_arg("d0-d3/a5").unwrap(), Arg::RegList(0x200F));
        assert_eq!(parse_arg("d1:d0").unwrap(), Arg::RegPair(1, 0));
        assert_eq!(parse_arg("vbr").unwrap(), Arg::Special(SpecialReg::Control(0x801)));
        assert_eq!(parse_arg("bc").unwrap(), Arg::Special(SpecialReg::Cache(3)));
    }

    #[test]
    fn memory_forms() {
        assert_eq!(parse_arg("(a1)").unwrap(), Arg::Indirect(1));
        assert_eq!(parse_arg("(-4,a6)").unwrap(), Arg::Disp(Expr::num(-4), 6));
        assert_eq!(parse_arg("8(a0)").unwrap(), Arg::Disp(Expr::num(8), 0));
        assert_eq!(
            parse_arg("(4,a0,d1.l*2)").unwrap(),
            Arg::Index(Expr::num(4), 0, IndexReg::data(1, 2))
        );
        assert_eq!(parse_arg("(a2,a3)").unwrap(), Arg::Index(Expr::num(0), 2, IndexReg::address(3, 1)));
        assert_eq!(parse_arg("table(pc)").unwrap(), Arg::PcDisp(Expr::sym("table", 0)));
        assert_eq!(parse_arg("($1234).w").unwrap(), Arg::AbsShort(Expr::num(0x1234)));
        assert_eq!(parse_arg("port.l").unwrap(), Arg::AbsLong(Expr::sym("port", 0)));
        assert_eq!(parse_arg("#-1").unwrap(), Arg::Immediate(Expr::num(-1)));
        assert_eq!(parse_arg("done").unwrap(), Arg::Bare(Expr::sym("done", 0)));
        assert!(parse_arg("(d0)").is_err());
    }

    #[test]
    fn operand_splitting_respects_parentheses() {
        assert_eq!(split_operands("(4,a0,d1),d2"), vec!["(4,a0,d1)", "d2"]);
        assert_eq!(split_operands(" "), Vec::<&str>::new());
        assert_eq!(split_operands("#',',d0"), vec!["#','", "d0"]);
    }
}
