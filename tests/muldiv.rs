use coldfire_rs::cpu::Sr;
use coldfire_rs::{Bus, Cpu, CpuConfig, Ea, IsaTier, LinearMemory, Operands, Registry, Size};

const CODE: u32 = 0x1000;

fn run_one(words: &[u16], d0: u32, d1: u32) -> Cpu {
    let mut mem = LinearMemory::new(0x10000);
    for (i, w) in words.iter().enumerate() {
        mem.write_u16(CODE + 2 * i as u32, *w).unwrap();
    }
    let mut cpu = Cpu::new(CpuConfig::default());
    cpu.reset(CODE);
    cpu.a[7] = 0x8000;
    cpu.d[0] = d0;
    cpu.d[1] = d1;
    cpu.step(&mut mem, &Registry::build()).unwrap();
    assert_eq!(cpu.pc, CODE + 2 * words.len() as u32);
    cpu
}

#[test]
fn word_multiplies_use_low_halves() {
    // mulu.w d1,d0
    let cpu = run_one(&[0xC0C1], 0xFFFF_0003, 0x0004_0005);
    assert_eq!(cpu.d[0], 15);

    // muls.w d1,d0
    let cpu = run_one(&[0xC1C1], 0x0000_FFFE, 3);
    assert_eq!(cpu.d[0], (-6i32) as u32);
    assert!(cpu.flag(Sr::N));
}

#[test]
fn word_divides_pack_remainder_high() {
    // divu.w d1,d0
    let cpu = run_one(&[0x80C1], 100, 7);
    assert_eq!(cpu.d[0], 0x0002_000E);
    assert!(!cpu.flag(Sr::V));

    // divs.w d1,d0
    let cpu = run_one(&[0x81C1], (-7i32) as u32, 2);
    assert_eq!(cpu.d[0], 0xFFFF_FFFD);
    assert!(cpu.flag(Sr::N));
}

#[test]
fn word_divide_overflow_keeps_the_dividend() {
    let cpu = run_one(&[0x80C1], 0x0010_0000, 1);
    assert_eq!(cpu.d[0], 0x0010_0000);
    assert!(cpu.flag(Sr::V));
    assert!(!cpu.flag(Sr::C));
}

#[test]
fn long_forms() {
    // muls.l d1,d0
    let cpu = run_one(&[0x4C01, 0x0800], (-3i32) as u32, 7);
    assert_eq!(cpu.d[0], (-21i32) as u32);

    // divu.l d1,d0
    let cpu = run_one(&[0x4C41, 0x0000], 100, 7);
    assert_eq!(cpu.d[0], 14);

    // divs.l d1,d0 cannot represent 0x80000000 / -1
    let cpu = run_one(&[0x4C41, 0x0800], 0x8000_0000, 0xFFFF_FFFF);
    assert_eq!(cpu.d[0], 0x8000_0000);
    assert!(cpu.flag(Sr::V));
}

#[test]
fn remainder_writes_only_dw() {
    // rems.l d1,d2:d0
    let mut mem = LinearMemory::new(0x10000);
    mem.write_u16(CODE, 0x4C41).unwrap();
    mem.write_u16(CODE + 2, 0x0802).unwrap();
    let mut cpu = Cpu::new(CpuConfig::default());
    cpu.reset(CODE);
    cpu.d[0] = (-7i32) as u32;
    cpu.d[1] = 2;
    cpu.d[2] = 0xAAAA_AAAA;
    cpu.step(&mut mem, &Registry::build()).unwrap();
    assert_eq!(cpu.d[2], 0xFFFF_FFFF);
    assert_eq!(cpu.d[0], (-7i32) as u32);
}

#[test]
fn assembling_picks_word_or_long_form() {
    let reg = Registry::build();
    let ops = |size, dst| Operands::new(Some(size), Some(Ea::DataReg(1)), Some(dst));

    assert_eq!(reg.encode("divu", &ops(Size::Word, Ea::DataReg(0)), IsaTier::C).unwrap(), vec![0x80C1]);
    assert_eq!(reg.encode("mulu", &ops(Size::Long, Ea::DataReg(0)), IsaTier::C).unwrap(), vec![0x4C01, 0x0000]);
    assert_eq!(reg.encode("divs", &ops(Size::Long, Ea::DataReg(0)), IsaTier::C).unwrap(), vec![0x4C41, 0x0800]);
    assert_eq!(reg.encode("rems", &ops(Size::Long, Ea::RegPair(2, 0)), IsaTier::C).unwrap(), vec![0x4C41, 0x0802]);
    assert!(reg.encode("rems", &ops(Size::Long, Ea::RegPair(0, 0)), IsaTier::C).is_err());
    assert!(reg.encode("remu", &ops(Size::Long, Ea::DataReg(0)), IsaTier::C).is_err());
}
