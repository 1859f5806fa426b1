//! Condition-code arithmetic.

use crate::cpu::{Cpu, Sr};
use crate::isa::Size;

/// Which arithmetic produced a result; carry and overflow differ per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    /// `a + b`
    Add,
    /// `a - b`
    Sub,
    /// `a - b`, X untouched
    Cmp,
    /// `0 - b`
    Neg,
}

/// Carry and overflow of `result = a op b`, all truncated to `size`.
pub fn carry_overflow(op: AluOp, result: u32, a: u32, b: u32, size: Size) -> (bool, bool) {
    let msb = size.msb();
    let (r, a, b) = (result & size.mask(), a & size.mask(), b & size.mask());
    match op {
        AluOp::Add => {
            let carry = ((a & b) | ((a | b) & !r)) & msb != 0;
            let overflow = (a ^ r) & (b ^ r) & msb != 0;
            (carry, overflow)
        }
        AluOp::Sub | AluOp::Cmp => {
            let borrow = ((b & !a) | (r & !a) | (b & r)) & msb != 0;
            let overflow = (a ^ b) & (a ^ r) & msb != 0;
            (borrow, overflow)
        }
        AluOp::Neg => {
            let borrow = (b | r) & msb != 0;
            let overflow = b & r & msb != 0;
            (borrow, overflow)
        }
    }
}

impl Cpu {
    /// Set N, Z, V, C (and X unless comparing) after an arithmetic result.
    ///
    /// With `extend_used`, Z is only ever cleared, so a chain of extended
    /// operations leaves Z set only when every partial result was zero.
    pub fn set_all_flags(&mut self, result: u32, a: u32, b: u32, size: Size, extend_used: bool, op: AluOp) {
        let (carry, overflow) = carry_overflow(op, result, a, b, size);
        let r = result & size.mask();
        self.set_flag(Sr::N, r & size.msb() != 0);
        if extend_used {
            if r != 0 {
                self.set_flag(Sr::Z, false);
            }
        } else {
            self.set_flag(Sr::Z, r == 0);
        }
        self.set_flag(Sr::V, overflow);
        self.set_flag(Sr::C, carry);
        if op != AluOp::Cmp {
            self.set_flag(Sr::X, carry);
        }
    }

    /// N and Z from the result, V and C cleared, X untouched.
    pub fn set_logic_flags(&mut self, result: u32, size: Size) {
        let r = result & size.mask();
        self.set_flag(Sr::N, r & size.msb() != 0);
        self.set_flag(Sr::Z, r == 0);
        self.set_flag(Sr::V, false);
        self.set_flag(Sr::C, false);
    }

    /// Bit tests only touch Z.
    pub fn set_zero_flag(&mut self, zero: bool) {
        self.set_flag(Sr::Z, zero);
    }
}
