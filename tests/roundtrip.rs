use pretty_assertions::assert_eq;

use coldfire_rs::stream::SliceStream;
use coldfire_rs::{IsaTier, Registry};

/// Instructions whose decoded form re-encodes to the same words.
const PROGRAMS: &[&[u16]] = &[
    &[0x4E71],                 // nop
    &[0x4AFC],                 // illegal
    &[0x2218],                 // move.l (a0)+,d1
    &[0x203C, 0x1234, 0x5678], // move.l #0x12345678,d0
    &[0x2430, 0x1A04],         // move.l (4,a0,d1.l*2),d2
    &[0x9081],                 // sub.l d1,d0
    &[0x7005],                 // moveq #5,d0
    &[0xA340],                 // mov3q #1,d0
    &[0x6600, 0x0010],         // bne.w
    &[0x60FC],                 // bra.s
    &[0x48D7, 0x200F],         // movem.l d0-d3/a5,(a7)
    &[0x4C01, 0x0800],         // muls.l d1,d0
    &[0x4C41, 0x0802],         // rems.l d1,d2:d0
    &[0x0880, 0x0023],         // bclr #35,d0
    &[0xE3A8],                 // lsl.l d1,d0
    &[0x4E7B, 0x0801],         // movec d0,vbr
    &[0x41FA, 0x0008],         // lea (8,pc),a0
    &[0x4E56, 0xFFF8],         // link a6,#-8
    &[0x4E43],                 // trap #3
];

#[test]
fn decode_then_encode_reproduces_the_words() {
    let reg = Registry::build();
    for words in PROGRAMS {
        let mut s = SliceStream::new(words, 0x1000).unwrap();
        let d = reg.decode(&mut s, IsaTier::C).unwrap().unwrap();
        assert_eq!(d.len(), 2 * words.len() as u32, "{}", d.mnemonic);

        let ops = d.operands();
        let out = reg.encode(d.mnemonic, &ops, IsaTier::C).unwrap();
        assert_eq!(&out[..], *words, "{}", d.mnemonic);
        assert_eq!(reg.calc_size(d.mnemonic, &ops, IsaTier::C).unwrap(), d.len(), "{}", d.mnemonic);
    }
}

/// Every opcode word the catalog claims, followed by plain extension words.
#[test]
fn every_claimed_word_reencodes() {
    use coldfire_rs::Ea;

    let reg = Registry::build();
    let mut checked = 0usize;
    for fill in [0x0000u16, 0x0001] {
        for word in 0..=u16::MAX {
            if reg.lookup(word, IsaTier::C).is_none() {
                continue;
            }
            let words = [word, fill, fill, fill, fill, fill];
            let mut s = SliceStream::new(&words, 0x1000).unwrap();
            let d = match reg.decode(&mut s, IsaTier::C) {
                Ok(Some(d)) => d,
                Ok(None) => continue,
                Err(e) => panic!("{word:#06x}: {e}"),
            };
            // a zero displacement selects the word form and has no encoding of its own
            if d.src == Some(Ea::Relative(0)) {
                continue;
            }
            let n = (d.len() / 2) as usize;
            let ops = d.operands();
            let out = reg
                .encode(d.mnemonic, &ops, IsaTier::C)
                .unwrap_or_else(|e| panic!("{word:#06x} {}: {e}", d.mnemonic));
            assert_eq!(&out[..], &words[..n], "{word:#06x} {}", d.mnemonic);
            assert_eq!(reg.calc_size(d.mnemonic, &ops, IsaTier::C).unwrap(), d.len(), "{word:#06x}");
            checked += 1;
        }
    }
    assert!(checked > 10_000, "only {checked} words checked");
}
