use pretty_assertions::assert_eq;

use coldfire_rs::cpu::Sr;
use coldfire_rs::ea::Ea;
use coldfire_rs::isa::branch::condition;
use coldfire_rs::{AsmError, Bus, Cpu, CpuConfig, IsaTier, LinearMemory, Operands, Registry};

const CODE: u32 = 0x1000;

fn setup(words: &[u16]) -> (Cpu, LinearMemory) {
    let mut mem = LinearMemory::new(0x10000);
    for (i, w) in words.iter().enumerate() {
        mem.write_u16(CODE + 2 * i as u32, *w).unwrap();
    }
    let mut cpu = Cpu::new(CpuConfig::default());
    cpu.reset(CODE);
    cpu.a[7] = 0x8000;
    (cpu, mem)
}

fn branch(offset: i32) -> Operands {
    Operands::new(None, Some(Ea::Relative(offset)), None)
}

#[test]
fn short_branch_skips_forward() {
    // bra.s +2 / nop / nop
    let (mut cpu, mut mem) = setup(&[0x6002, 0x4E71, 0x4E71]);
    cpu.step(&mut mem, &Registry::build()).unwrap();
    assert_eq!(cpu.pc, CODE + 4);
}

#[test]
fn word_branch_taken_and_not_taken() {
    // bne.w +0x10
    let (mut cpu, mut mem) = setup(&[0x6600, 0x0010]);
    let reg = Registry::build();
    cpu.set_flag(Sr::Z, false);
    cpu.step(&mut mem, &reg).unwrap();
    assert_eq!(cpu.pc, CODE + 2 + 0x10);

    cpu.pc = CODE;
    cpu.set_flag(Sr::Z, true);
    cpu.step(&mut mem, &reg).unwrap();
    assert_eq!(cpu.pc, CODE + 4, "fall through past the extension word");
}

#[test]
fn subroutine_call_and_return() {
    // bsr.s +4 / nop / nop / rts
    let (mut cpu, mut mem) = setup(&[0x6104, 0x4E71, 0x4E71, 0x4E75]);
    let reg = Registry::build();
    cpu.step(&mut mem, &reg).unwrap();
    assert_eq!(cpu.pc, CODE + 6);
    assert_eq!(cpu.a[7], 0x7FFC);
    assert_eq!(mem.read_u32(0x7FFC).unwrap(), CODE + 2);

    cpu.step(&mut mem, &reg).unwrap();
    assert_eq!(cpu.pc, CODE + 2);
    assert_eq!(cpu.a[7], 0x8000);
}

#[test]
fn jsr_through_address_register() {
    // jsr (a0)
    let (mut cpu, mut mem) = setup(&[0x4E90]);
    cpu.a[0] = 0x2000;
    cpu.step(&mut mem, &Registry::build()).unwrap();
    assert_eq!(cpu.pc, 0x2000);
    assert_eq!(mem.read_u32(0x7FFC).unwrap(), CODE + 2);
}

#[test]
fn set_on_condition() {
    // seq d0 / sne d1
    let (mut cpu, mut mem) = setup(&[0x57C0, 0x56C1]);
    let reg = Registry::build();
    cpu.d[0] = 0x1234_5600;
    cpu.d[1] = 0xFFFF_FFFF;
    cpu.set_flag(Sr::Z, true);
    cpu.step(&mut mem, &reg).unwrap();
    cpu.step(&mut mem, &reg).unwrap();
    assert_eq!(cpu.d[0], 0x1234_56FF);
    assert_eq!(cpu.d[1], 0xFFFF_FF00);
}

#[test]
fn signed_and_unsigned_conditions() {
    let mut cpu = Cpu::new(CpuConfig::default());
    // 3 - 5: borrow and negative
    cpu.set_ccr((Sr::N | Sr::C).bits() as u8);
    assert!(condition(&cpu, 5)); // cs
    assert!(condition(&cpu, 3)); // ls
    assert!(condition(&cpu, 13)); // lt
    assert!(!condition(&cpu, 14)); // gt
    assert!(!condition(&cpu, 2)); // hi
    // 0x80000000 - 1: overflow, result positive
    cpu.set_ccr(Sr::V.bits() as u8);
    assert!(condition(&cpu, 13)); // lt
    assert!(condition(&cpu, 15)); // le
    assert!(condition(&cpu, 4)); // cc
    assert!(!condition(&cpu, 1));
    assert!(condition(&cpu, 0));
}

#[test]
fn unsized_branch_picks_the_shortest_form() {
    let reg = Registry::build();
    assert_eq!(reg.encode("bra", &branch(126), IsaTier::C).unwrap(), vec![0x607E]);
    assert_eq!(reg.encode("bra", &branch(130), IsaTier::C).unwrap(), vec![0x6000, 0x0082]);
    assert_eq!(reg.encode("bhs", &branch(-4), IsaTier::C).unwrap(), vec![0x64FC]);
    // -1 would read as the long-form marker
    assert_eq!(reg.encode("beq", &branch(-1), IsaTier::C).unwrap(), vec![0x6700, 0xFFFF]);
    assert_eq!(
        reg.encode("bsr", &branch(0x1_0000), IsaTier::B).unwrap(),
        vec![0x61FF, 0x0001, 0x0000]
    );
}

#[test]
fn zero_and_out_of_range_offsets() {
    let reg = Registry::build();
    assert!(matches!(reg.encode("bra", &branch(0), IsaTier::C), Err(AsmError::OutOfRange { .. })));
    assert!(matches!(reg.encode("bra", &branch(0x1_0000), IsaTier::A), Err(AsmError::OutOfRange { .. })));
    let forced = Operands::new(Some(coldfire_rs::Size::Byte), Some(Ea::Relative(200)), None);
    assert!(matches!(reg.encode("bra", &forced, IsaTier::C), Err(AsmError::OutOfRange { .. })));
}

#[test]
fn long_branch_runs_on_isa_b() {
    // bra.l +0x100
    let (mut cpu, mut mem) = setup(&[0x60FF, 0x0000, 0x0100]);
    cpu.step(&mut mem, &Registry::build()).unwrap();
    assert_eq!(cpu.pc, CODE + 2 + 0x100);
}
