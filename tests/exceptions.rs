use coldfire_rs::cpu::Sr;
use coldfire_rs::exception::frame_word;
use coldfire_rs::{Bus, Cpu, CpuConfig, IsaTier, LinearMemory, Registry, RunState, Trap};

const CODE: u32 = 0x1000;
const HANDLER: u32 = 0x3000;
const SSP: u32 = 0x9000;

/// Program at CODE, every vector pointing at HANDLER, supervisor stack at SSP.
fn setup(words: &[u16]) -> (Cpu, LinearMemory) {
    let mut mem = LinearMemory::new(0x10000);
    for v in 0..64 {
        mem.write_u32(v * 4, HANDLER).unwrap();
    }
    for (i, w) in words.iter().enumerate() {
        mem.write_u16(CODE + 2 * i as u32, *w).unwrap();
    }
    let mut cpu = Cpu::new(CpuConfig::default());
    cpu.reset(CODE);
    cpu.a[7] = SSP;
    (cpu, mem)
}

#[test]
fn privileged_instruction_in_user_mode() {
    // move.w #0x2700,sr
    let (mut cpu, mut mem) = setup(&[0x46FC, 0x2700]);
    cpu.set_usp(0x8000);
    cpu.set_sr(0x0000);
    assert_eq!(cpu.a[7], 0x8000);

    cpu.step(&mut mem, &Registry::build()).unwrap();
    assert!(cpu.is_supervisor());
    assert_eq!(cpu.pc, HANDLER);
    assert_eq!(cpu.a[7], SSP - 8);
    assert_eq!(mem.read_u32(SSP - 4).unwrap(), CODE, "fault PC is the instruction itself");
    assert_eq!(mem.read_u32(SSP - 8).unwrap(), frame_word(0, 8, 0x0000));
    assert_eq!(cpu.usp(), 0x8000);
}

#[test]
fn trap_stacks_the_next_instruction() {
    // trap #3
    let (mut cpu, mut mem) = setup(&[0x4E43]);
    mem.write_u32(35 * 4, 0x3400).unwrap();
    cpu.step(&mut mem, &Registry::build()).unwrap();
    assert_eq!(cpu.pc, 0x3400);
    assert_eq!(mem.read_u32(SSP - 4).unwrap(), CODE + 2);
    assert_eq!(mem.read_u32(SSP - 8).unwrap(), frame_word(0, 35, 0x2700));
}

#[test]
fn rte_restores_a_misaligned_stack() {
    // trap #0, handler: rte
    let (mut cpu, mut mem) = setup(&[0x4E40, 0x4E71]);
    mem.write_u16(HANDLER, 0x4E73).unwrap();
    let reg = Registry::build();
    cpu.a[7] = SSP + 2;
    cpu.set_ccr(0x04);

    cpu.step(&mut mem, &reg).unwrap();
    assert_eq!(cpu.a[7], SSP - 8, "stack aligned down before the frame is pushed");
    assert_eq!(mem.read_u32(SSP - 8).unwrap(), 0x6080_2704);

    cpu.step(&mut mem, &reg).unwrap();
    assert_eq!(cpu.pc, CODE + 2);
    assert_eq!(cpu.a[7], SSP + 2);
    assert_eq!(cpu.sr(), 0x2704);
}

#[test]
fn rte_with_a_bad_format_raises_format_error() {
    let (mut cpu, mut mem) = setup(&[0x4E73]);
    mem.write_u32(14 * 4, 0x3800).unwrap();
    // hand-built frame with format 3
    mem.write_u32(SSP - 8, 0x3000_2700).unwrap();
    mem.write_u32(SSP - 4, 0x2000).unwrap();
    cpu.a[7] = SSP - 8;

    cpu.step(&mut mem, &Registry::build()).unwrap();
    assert_eq!(cpu.pc, 0x3800);
    // the failed RTE popped nothing: its own frame sits below the bad one
    assert_eq!(cpu.a[7], SSP - 16);
    assert_eq!(mem.read_u32(SSP - 12).unwrap(), CODE);
}

#[test]
fn divide_by_zero_and_illegal() {
    // divu.w d1,d0 / illegal
    let (mut cpu, mut mem) = setup(&[0x80C1, 0x4AFC]);
    mem.write_u32(5 * 4, 0x3500).unwrap();
    mem.write_u32(4 * 4, 0x3600).unwrap();
    let reg = Registry::build();
    cpu.d[0] = 100;
    cpu.d[1] = 0;

    cpu.step(&mut mem, &reg).unwrap();
    assert_eq!(cpu.pc, 0x3500);
    assert_eq!(cpu.d[0], 100);
    assert_eq!(mem.read_u32(SSP - 4).unwrap(), CODE);

    cpu.pc = CODE + 2;
    cpu.step(&mut mem, &reg).unwrap();
    assert_eq!(cpu.pc, 0x3600);
}

#[test]
fn reserved_extension_words_are_illegal() {
    // strldsr without move-to-sr / move.b #imm,d0 with a nonzero high byte /
    // muls.l d1,d0 with a remainder register set
    let (mut cpu, mut mem) = setup(&[0x40E7, 0x0000, 0x103C, 0x1A04, 0x4C01, 0x0803]);
    mem.write_u32(4 * 4, 0x3C00).unwrap();
    let reg = Registry::build();
    cpu.d[0] = 0x55;

    for at in [CODE, CODE + 4, CODE + 8] {
        cpu.pc = at;
        cpu.a[7] = SSP;
        cpu.step(&mut mem, &reg).unwrap();
        assert_eq!(cpu.pc, 0x3C00, "at {at:#x}");
        assert_eq!(mem.read_u32(SSP - 4).unwrap(), at);
    }
    assert_eq!(cpu.d[0], 0x55);
}

#[test]
fn stacking_bus_error_leaves_the_cpu_as_it_was() {
    let (mut cpu, mut mem) = setup(&[0x4AFC]);
    cpu.a[7] = 0x0002_0000;
    cpu.set_usp(0x7000);
    cpu.set_sr(0x0000);
    assert_eq!(cpu.a[7], 0x7000);

    let err = cpu.step(&mut mem, &Registry::build()).unwrap_err();
    assert!(matches!(err, Trap::Bus { .. }), "{err}");
    assert_eq!(cpu.sr(), 0x0000);
    assert_eq!(cpu.a[7], 0x7000);
    assert_eq!(cpu.ssp(), 0x0002_0000);
    assert_eq!(cpu.pc, CODE);
}

#[test]
fn unclaimed_opcodes_by_line() {
    let (mut cpu, mut mem) = setup(&[0xA000, 0xFFFF, 0x4E7A]);
    mem.write_u32(10 * 4, 0x3A00).unwrap();
    mem.write_u32(11 * 4, 0x3B00).unwrap();
    mem.write_u32(4 * 4, 0x3C00).unwrap();
    let reg = Registry::build();

    cpu.step(&mut mem, &reg).unwrap();
    assert_eq!(cpu.pc, 0x3A00);
    cpu.pc = CODE + 2;
    cpu.step(&mut mem, &reg).unwrap();
    assert_eq!(cpu.pc, 0x3B00);
    cpu.pc = CODE + 4;
    cpu.step(&mut mem, &reg).unwrap();
    assert_eq!(cpu.pc, 0x3C00);
}

#[test]
fn isa_gates_execution() {
    // mov3q #1,d0 is line A on ISA_A
    let (_, mut mem) = setup(&[0xA340]);
    mem.write_u32(10 * 4, 0x3A00).unwrap();
    let reg = Registry::build();

    let mut cpu = Cpu::new(CpuConfig { isa: IsaTier::A, ..CpuConfig::default() });
    cpu.reset(CODE);
    cpu.a[7] = SSP;
    cpu.step(&mut mem, &reg).unwrap();
    assert_eq!(cpu.pc, 0x3A00);

    let mut cpu = Cpu::new(CpuConfig { isa: IsaTier::B, ..CpuConfig::default() });
    cpu.reset(CODE);
    cpu.a[7] = SSP;
    cpu.step(&mut mem, &reg).unwrap();
    assert_eq!(cpu.d[0], 1);
    assert_eq!(cpu.pc, CODE + 2);
}

#[test]
fn stop_waits_and_halt_ends_the_run() {
    // stop #0x2000
    let (mut cpu, mut mem) = setup(&[0x4E72, 0x2000, 0x4AC8]);
    let reg = Registry::build();
    assert_eq!(cpu.step(&mut mem, &reg).unwrap(), RunState::Stopped);
    assert_eq!(cpu.sr(), 0x2000);
    assert_eq!(cpu.step(&mut mem, &reg).unwrap(), RunState::Stopped);
    assert_eq!(cpu.pc, CODE + 4);

    cpu.state = RunState::Running;
    let (state, steps) = cpu.run(&mut mem, &reg, 10).unwrap();
    assert_eq!((state, steps), (RunState::Halted, 1));
}

#[test]
fn unsimulated_opcode_is_a_host_trap() {
    // cpushl bc,(a0)
    let (mut cpu, mut mem) = setup(&[0xF4E8]);
    let err = cpu.step(&mut mem, &Registry::build()).unwrap_err();
    assert!(matches!(err, Trap::Unsimulated { mnemonic: "cpushl", pc: CODE }));
    assert_eq!(cpu.pc, CODE);
    assert_eq!(cpu.a[7], SSP);
}

#[test]
fn reset_from_the_vector_table() {
    let (_, mut mem) = setup(&[0x4E71]);
    mem.write_u32(0, 0x0000_F000).unwrap();
    mem.write_u32(4, CODE).unwrap();
    let mut cpu = Cpu::new(CpuConfig::default());
    cpu.reset_from_vectors(&mut mem).unwrap();
    assert_eq!(cpu.pc, CODE);
    assert_eq!(cpu.a[7], 0xF000);
    assert!(cpu.flag(Sr::S));
    assert_eq!(cpu.sr() & 0x0700, 0x0700);
}
