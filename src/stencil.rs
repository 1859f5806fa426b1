//! Named bit-field views over 16-bit instruction and extension words.
//!
//! Every accessor is a shift and a mask on a plain integer, so nothing here
//! depends on how the host numbers bits. Construction never fails; deciding
//! whether a field value makes sense is left to the instruction using it.

use num_traits::PrimInt;

/// Extract `width` bits starting at bit `shift` (bit 0 = least significant).
#[inline]
pub fn field<T: PrimInt>(word: T, shift: usize, width: usize) -> T {
    (word >> shift) & ((T::one() << width) - T::one())
}

/// Return `word` with `width` bits at `shift` replaced by `value`.
#[inline]
pub fn put<T: PrimInt>(word: T, shift: usize, width: usize, value: T) -> T {
    let mask = ((T::one() << width) - T::one()) << shift;
    (word & !mask) | ((value << shift) & mask)
}

/// Sign-extend the low `bits` bits of `v` to 32 bits.
#[inline]
pub fn sign_extend(v: u32, bits: u32) -> u32 {
    let s = 32 - bits;
    ((v << s) as i32 >> s) as u32
}

macro_rules! stencil {
    ($(#[$meta:meta])* $name:ident { $($field:ident / $setter:ident @ $shift:literal : $width:literal),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name(pub u16);

        impl $name {
            $(
                #[inline]
                pub fn $field(self) -> u16 {
                    field(self.0, $shift, $width)
                }

                #[inline]
                pub fn $setter(self, value: u16) -> Self {
                    Self(put(self.0, $shift, $width, value))
                }
            )*
        }

        impl From<u16> for $name {
            fn from(w: u16) -> Self {
                Self(w)
            }
        }
    };
}

stencil! {
    /// `.... .... ..mm mrrr`: a single effective address in the low six bits.
    EaStencil { ea_reg / set_ea_reg @ 0:3, ea_mode / set_ea_mode @ 3:3 }
}

stencil! {
    /// `.... .... ssmm mrrr`: sized single-operand forms (CLR, TST, CMPI).
    SizedEaStencil { ea_reg / set_ea_reg @ 0:3, ea_mode / set_ea_mode @ 3:3, size / set_size @ 6:2 }
}

stencil! {
    /// `.... RRRo oomm mrrr`: register + opmode + effective address.
    RegEaStencil { ea_reg / set_ea_reg @ 0:3, ea_mode / set_ea_mode @ 3:3, opmode / set_opmode @ 6:3, reg / set_reg @ 9:3 }
}

stencil! {
    /// `..ss RRRM MMmm mrrr`: MOVE with its mirrored destination field.
    MoveStencil { src_reg / set_src_reg @ 0:3, src_mode / set_src_mode @ 3:3, dst_mode / set_dst_mode @ 6:3, dst_reg / set_dst_reg @ 9:3, size / set_size @ 12:2 }
}

stencil! {
    /// `0101 DDDs ssmm mrrr`: ADDQ/SUBQ.
    QuickStencil { ea_reg / set_ea_reg @ 0:3, ea_mode / set_ea_mode @ 3:3, size / set_size @ 6:2, sub / set_sub @ 8:1, data / set_data @ 9:3 }
}

stencil! {
    /// `0110 cccc dddd dddd`: Bcc/BRA/BSR.
    BranchStencil { disp / set_disp @ 0:8, cond / set_cond @ 8:4 }
}

stencil! {
    /// `0101 cccc 1100 0rrr`: Scc.
    CondRegStencil { reg / set_reg @ 0:3, mode / set_mode @ 3:3, cond / set_cond @ 8:4 }
}

stencil! {
    /// `1110 cccd ssik krrr`: register shifts.
    ShiftStencil { reg / set_reg @ 0:3, kind / set_kind @ 3:2, ir / set_ir @ 5:1, size / set_size @ 6:2, dir / set_dir @ 8:1, count / set_count @ 9:3 }
}

stencil! {
    /// `0111 RRR0 dddd dddd`: MOVEQ.
    MoveqStencil { data / set_data @ 0:8, bit8 / set_bit8 @ 8:1, reg / set_reg @ 9:3 }
}

stencil! {
    /// `.... .... .... vvvv`: TRAP vector.
    VectorStencil { vector / set_vector @ 0:4 }
}

stencil! {
    /// `.... .... .... .rrr`: register-only forms (SWAP, EXT, LINK, UNLK, NEG).
    RegStencil { reg / set_reg @ 0:3 }
}

stencil! {
    /// `1111 0100 cc1s srrr`: cache maintenance.
    CacheStencil { reg / set_reg @ 0:3, scope / set_scope @ 3:2, cache / set_cache @ 6:2 }
}

stencil! {
    /// Brief extension word: `DRRR Lss0 dddd dddd`.
    BriefExt { disp / set_disp @ 0:8, scale / set_scale @ 9:2, long / set_long @ 11:1, reg / set_reg @ 12:3, da / set_da @ 15:1 }
}

stencil! {
    /// MUL.L/DIV.L extension word: `0QQQ s000 0000 0RRR`.
    MulDivExt { dr / set_dr @ 0:3, signed / set_signed @ 11:1, dq / set_dq @ 12:3 }
}

stencil! {
    /// MOVEC extension word: `ARRR cccc cccc cccc`.
    MovecExt { code / set_code @ 0:12, reg / set_reg @ 12:3, da / set_da @ 15:1 }
}
