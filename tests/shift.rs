use coldfire_rs::cpu::Sr;
use coldfire_rs::{Bus, Cpu, CpuConfig, LinearMemory, Registry};

fn run_one(word: u16, d0: u32, d1: u32, x: bool) -> Cpu {
    let mut mem = LinearMemory::new(0x100);
    mem.write_u16(0, word).unwrap();
    let mut cpu = Cpu::new(CpuConfig::default());
    cpu.reset(0);
    cpu.d[0] = d0;
    cpu.d[1] = d1;
    cpu.set_flag(Sr::X, x);
    cpu.step(&mut mem, &Registry::build()).unwrap();
    cpu
}

#[test]
fn lsl_by_eight_from_zero_count_field() {
    // lsl.l #8,d0
    let cpu = run_one(0xE188, 0x0100_00FF, 0, false);
    assert_eq!(cpu.d[0], 0x0000_FF00);
    assert!(cpu.flag(Sr::C) && cpu.flag(Sr::X));
    assert!(!cpu.flag(Sr::N) && !cpu.flag(Sr::Z) && !cpu.flag(Sr::V));
}

#[test]
fn lsr_shifts_in_zeros() {
    // lsr.l #1,d0
    let cpu = run_one(0xE288, 0x8000_0001, 0, false);
    assert_eq!(cpu.d[0], 0x4000_0000);
    assert!(cpu.flag(Sr::C) && !cpu.flag(Sr::N));
}

#[test]
fn asr_keeps_the_sign() {
    // asr.l #1,d0
    let cpu = run_one(0xE280, 0x8000_0001, 0, false);
    assert_eq!(cpu.d[0], 0xC000_0000);
    assert!(cpu.flag(Sr::C) && cpu.flag(Sr::N));
}

#[test]
fn asl_never_reports_overflow() {
    // asl.l #1,d0: the sign changes but V stays clear
    let cpu = run_one(0xE380, 0x4000_0000, 0, false);
    assert_eq!(cpu.d[0], 0x8000_0000);
    assert!(!cpu.flag(Sr::V) && !cpu.flag(Sr::C));
}

#[test]
fn register_count_beyond_width() {
    // lsl.l d1,d0 with a count of 40
    let cpu = run_one(0xE3A8, 0xFFFF_FFFF, 40, false);
    assert_eq!(cpu.d[0], 0);
    assert!(cpu.flag(Sr::Z) && !cpu.flag(Sr::C));
}

#[test]
fn register_count_is_taken_mod_64() {
    // lsr.l d1,d0 with 64: no shift, C cleared, X kept
    let cpu = run_one(0xE2A8, 0x1234_5678, 64, true);
    assert_eq!(cpu.d[0], 0x1234_5678);
    assert!(!cpu.flag(Sr::C) && cpu.flag(Sr::X));

    // 65 behaves like 1
    let cpu = run_one(0xE2A8, 0x0000_0003, 65, false);
    assert_eq!(cpu.d[0], 1);
    assert!(cpu.flag(Sr::C) && cpu.flag(Sr::X));
}
