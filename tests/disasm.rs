use pretty_assertions::assert_eq;

use coldfire_rs::disasm::{disassemble, disassemble_one};
use coldfire_rs::{IsaTier, ProgramImage, Registry};

fn image(base: u32, words: &[u16]) -> ProgramImage {
    let mut img = ProgramImage::new();
    img.write_words(base, words);
    img
}

#[test]
fn linear_listing() {
    let words = [
        0x4E71, // nop
        0x2218, // move.l (a0)+,d1
        0x203C, 0x1234, 0x5678, // move.l #imm,d0
        0x6600, 0x0010, // bne.w
        0x48D7, 0x200F, // movem.l
        0xFFFF, // no instruction
        0x4C41, 0x0802, // rems.l
        0x4E7B, 0x0801, // movec
        0x41FA, 0x0008, // lea (8,pc),a0
        0x4E43, // trap #3
        0x2430, 0x1A04, // move.l (4,a0,d1.l*2),d2
    ];
    let mut img = image(0x1000, &words);
    let lines = disassemble(&mut img, &Registry::build(), IsaTier::C, 0x1000, 0x1026).unwrap();
    let text: Vec<(u32, &str)> = lines.iter().map(|l| (l.address, l.text.as_str())).collect();
    assert_eq!(
        text,
        vec![
            (0x1000, "nop"),
            (0x1002, "move.l (a0)+,d1"),
            (0x1004, "move.l #0x12345678,d0"),
            (0x100A, "bne.w 0x101c"),
            (0x100E, "movem.l d0-d3/a5,(a7)"),
            (0x1012, "dc.w 0xffff"),
            (0x1014, "rems.l d1,d2:d0"),
            (0x1018, "movec.l d0,vbr"),
            (0x101C, "lea (8,pc),a0"),
            (0x1020, "trap #0x3"),
            (0x1022, "move.l (4,a0,d1.l*2),d2"),
        ]
    );
    assert_eq!(lines[2].words, vec![0x203C, 0x1234, 0x5678]);
    assert!(lines[5].decoded.is_none());
}

#[test]
fn truncated_instruction_falls_back_to_data() {
    let mut img = image(0, &[0x203C, 0x1234]);
    let line = disassemble_one(&mut img, &Registry::build(), IsaTier::C, 0).unwrap();
    assert_eq!(line.text, "dc.w 0x203c");
    assert_eq!(line.words, vec![0x203C]);
}

#[test]
fn decoding_follows_the_isa_tier() {
    // mov3q #1,d0
    let mut img = image(0, &[0xA340]);
    let reg = Registry::build();
    assert_eq!(disassemble_one(&mut img, &reg, IsaTier::A, 0).unwrap().text, "dc.w 0xa340");
    assert_eq!(disassemble_one(&mut img, &reg, IsaTier::B, 0).unwrap().text, "mov3q.l #0x1,d0");
}

#[test]
fn unmapped_start_is_an_error() {
    let mut img = image(0x100, &[0x4E71]);
    assert!(disassemble_one(&mut img, &Registry::build(), IsaTier::C, 0x200).is_err());
}
