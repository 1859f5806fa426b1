use coldfire_rs::cpu::Sr;
use coldfire_rs::{Bus, Cpu, CpuConfig, LinearMemory, Registry};

fn setup(words: &[u16]) -> (Cpu, LinearMemory) {
    let mut mem = LinearMemory::new(0x4000);
    for (i, w) in words.iter().enumerate() {
        mem.write_u16(2 * i as u32, *w).unwrap();
    }
    let mut cpu = Cpu::new(CpuConfig::default());
    cpu.reset(0);
    (cpu, mem)
}

#[test]
fn register_bit_numbers_wrap_at_32() {
    // bclr #35,d0
    let (mut cpu, mut mem) = setup(&[0x0880, 0x0023]);
    cpu.d[0] = 0x0000_000F;
    cpu.step(&mut mem, &Registry::build()).unwrap();
    assert_eq!(cpu.d[0], 0x0000_0007);
    assert!(!cpu.flag(Sr::Z), "Z reflects the bit before it was cleared");
    assert_eq!(cpu.pc, 4);
}

#[test]
fn memory_bit_numbers_wrap_at_8() {
    // bset #9,(a0)
    let (mut cpu, mut mem) = setup(&[0x08D0, 0x0009]);
    cpu.a[0] = 0x1000;
    cpu.step(&mut mem, &Registry::build()).unwrap();
    assert_eq!(mem.read_u8(0x1000).unwrap(), 0x02);
    assert_eq!(mem.read_u8(0x1001).unwrap(), 0x00);
    assert!(cpu.flag(Sr::Z));
}

#[test]
fn dynamic_bit_number_from_register() {
    // btst d1,d0 / bchg d1,d0
    let (mut cpu, mut mem) = setup(&[0x0300, 0x0340]);
    let reg = Registry::build();
    cpu.d[0] = 0x0000_0002;
    cpu.d[1] = 33;
    cpu.step(&mut mem, &reg).unwrap();
    assert!(!cpu.flag(Sr::Z));
    assert_eq!(cpu.d[0], 2, "btst does not write");
    cpu.step(&mut mem, &reg).unwrap();
    assert_eq!(cpu.d[0], 0);
    assert!(!cpu.flag(Sr::Z));
}

#[test]
fn bit_ops_touch_only_z() {
    // bset #0,d0 with every flag but Z set
    let (mut cpu, mut mem) = setup(&[0x08C0, 0x0000]);
    cpu.set_ccr(0x1B);
    cpu.step(&mut mem, &Registry::build()).unwrap();
    assert_eq!(cpu.d[0], 1);
    assert_eq!(cpu.ccr(), 0x1F);
}
