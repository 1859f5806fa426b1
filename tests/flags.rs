use proptest::prelude::*;

use coldfire_rs::cpu::Sr;
use coldfire_rs::flags::{carry_overflow, AluOp};
use coldfire_rs::isa::Size;
use coldfire_rs::{Bus, Cpu, CpuConfig, LinearMemory, Registry};

proptest! {
    #[test]
    fn long_add_matches_wide_arithmetic(a: u32, b: u32) {
        let r = a.wrapping_add(b);
        let (carry, overflow) = carry_overflow(AluOp::Add, r, a, b, Size::Long);
        prop_assert_eq!(carry, a.checked_add(b).is_none());
        prop_assert_eq!(overflow, (a as i32).checked_add(b as i32).is_none());
    }

    #[test]
    fn long_sub_matches_wide_arithmetic(a: u32, b: u32) {
        let r = a.wrapping_sub(b);
        let (borrow, overflow) = carry_overflow(AluOp::Sub, r, a, b, Size::Long);
        prop_assert_eq!(borrow, b > a);
        prop_assert_eq!(overflow, (a as i32).checked_sub(b as i32).is_none());
    }

    #[test]
    fn byte_add_only_looks_at_low_bits(a: u8, b: u8, junk: u32) {
        let wide_a = (junk & 0xFFFF_FF00) | a as u32;
        let r = wide_a.wrapping_add(b as u32);
        let (carry, overflow) = carry_overflow(AluOp::Add, r, wide_a, b as u32, Size::Byte);
        prop_assert_eq!(carry, a.checked_add(b).is_none());
        prop_assert_eq!(overflow, (a as i8).checked_add(b as i8).is_none());
    }

    #[test]
    fn negate_borrows_unless_zero(b: u32) {
        let r = 0u32.wrapping_sub(b);
        let (borrow, overflow) = carry_overflow(AluOp::Neg, r, 0, b, Size::Long);
        prop_assert_eq!(borrow, b != 0);
        prop_assert_eq!(overflow, b == 0x8000_0000);
    }

    #[test]
    fn executed_sub_sets_ccr(a: u32, b: u32) {
        let mut mem = LinearMemory::new(0x100);
        mem.write_u16(0, 0x9081).unwrap(); // sub.l d1,d0
        let mut cpu = Cpu::new(CpuConfig::default());
        cpu.reset(0);
        cpu.d[0] = a;
        cpu.d[1] = b;
        cpu.step(&mut mem, &Registry::build()).unwrap();
        let r = a.wrapping_sub(b);
        prop_assert_eq!(cpu.d[0], r);
        prop_assert_eq!(cpu.flag(Sr::Z), r == 0);
        prop_assert_eq!(cpu.flag(Sr::N), (r as i32) < 0);
        prop_assert_eq!(cpu.flag(Sr::C), b > a);
        prop_assert_eq!(cpu.flag(Sr::X), b > a);
    }
}
