use coldfire_rs::{AsmError, Ea, IsaTier, Operands, Registry, Size};

fn ops(size: Option<Size>, src: Option<Ea>, dst: Option<Ea>) -> Operands {
    Operands::new(size, src, dst)
}

#[test]
fn catalog_has_no_ambiguous_opcodes() {
    let reg = Registry::build_checked().unwrap();
    assert!(!reg.is_empty());
}

#[test]
fn lookup_prefers_the_most_specific_definition() {
    let reg = Registry::build();
    assert_eq!(reg.lookup(0x4E71, IsaTier::C).unwrap().def().mnemonic, "nop");
    // illegal and halt sit inside the tst encoding space
    assert_eq!(reg.lookup(0x4AFC, IsaTier::C).unwrap().def().mnemonic, "illegal");
    assert_eq!(reg.lookup(0x4AC8, IsaTier::C).unwrap().def().mnemonic, "halt");
    assert_eq!(reg.lookup(0x4A80, IsaTier::C).unwrap().def().mnemonic, "tst");
    // swap shares its top bits with pea
    assert_eq!(reg.lookup(0x4841, IsaTier::C).unwrap().def().mnemonic, "swap");
    assert_eq!(reg.lookup(0x4850, IsaTier::C).unwrap().def().mnemonic, "pea");
}

#[test]
fn tiers_filter_lookup() {
    let reg = Registry::build();
    assert!(reg.lookup(0xA340, IsaTier::A).is_none());
    assert_eq!(reg.lookup(0xA340, IsaTier::B).unwrap().def().mnemonic, "mov3q");
    assert!(reg.lookup(0x60FF, IsaTier::A).is_none());
    assert!(reg.lookup(0x60FF, IsaTier::B).is_some());
    // byte and word compares arrived with ISA_B
    assert!(reg.lookup(0xB001, IsaTier::A).is_none());
    assert!(reg.lookup(0xB001, IsaTier::C).is_some());
}

#[test]
fn illegal_modes_are_not_claimed() {
    let reg = Registry::build();
    // move.l d0,#imm
    assert!(reg.lookup(0x29C0, IsaTier::C).is_none());
    // lea d0,a0
    assert!(reg.lookup(0x41C0, IsaTier::C).is_none());
}

#[test]
fn select_reports_the_reason() {
    let reg = Registry::build();
    let d = |r| Some(Ea::DataReg(r));
    assert_eq!(
        reg.encode("frob", &ops(None, d(0), None), IsaTier::C),
        Err(AsmError::UnknownMnemonic("frob".into()))
    );
    assert_eq!(
        reg.encode("mov3q", &ops(None, Some(Ea::Immediate(1)), d(0)), IsaTier::A),
        Err(AsmError::NotInIsa { mnemonic: "mov3q".into(), isa: 'A' })
    );
    assert!(matches!(
        reg.encode("add", &ops(Some(Size::Word), d(1), d(0)), IsaTier::C),
        Err(AsmError::BadSize { size: 'w', .. })
    ));
    assert!(matches!(
        reg.encode("moveq", &ops(Some(Size::Long), Some(Ea::Immediate(200)), d(0)), IsaTier::C),
        Err(AsmError::OutOfRange { value: 200, .. })
    ));
}

#[test]
fn aliases_and_case_select_the_same_form() {
    let reg = Registry::build();
    let o = ops(Some(Size::Long), Some(Ea::AddrReg(1)), Some(Ea::AddrReg(0)));
    // move to an address register is movea
    assert_eq!(reg.encode("move", &o, IsaTier::C).unwrap(), vec![0x2049]);
    assert_eq!(reg.encode("MOVEA", &o, IsaTier::C).unwrap(), vec![0x2049]);
    let cmp_b = ops(Some(Size::Byte), Some(Ea::DataReg(1)), Some(Ea::DataReg(0)));
    assert_eq!(reg.encode("cmp", &cmp_b, IsaTier::B).unwrap(), vec![0xB001]);
    assert!(reg.encode("cmp", &cmp_b, IsaTier::A).is_err());
}

#[test]
fn calc_size_counts_extension_words() {
    let reg = Registry::build();
    let o = ops(Some(Size::Long), Some(Ea::AbsLong(0x1234_5678)), Some(Ea::Disp { reg: 0, disp: 8 }));
    assert!(reg.calc_size("move", &o, IsaTier::C).is_err(), "absolute long to displacement needs too many words");
    let o = ops(Some(Size::Long), Some(Ea::Disp { reg: 1, disp: 4 }), Some(Ea::Disp { reg: 0, disp: 8 }));
    assert_eq!(reg.calc_size("move", &o, IsaTier::C).unwrap(), 6);
    let o = ops(Some(Size::Long), Some(Ea::Immediate(7)), Some(Ea::DataReg(3)));
    assert_eq!(reg.calc_size("move", &o, IsaTier::C).unwrap(), 6);
}

#[test]
fn reserved_extension_words_decode_as_unclaimed() {
    use coldfire_rs::stream::SliceStream;

    let reg = Registry::build();
    let decode = |words: &[u16]| {
        let mut s = SliceStream::new(words, 0x1000).unwrap();
        reg.decode(&mut s, IsaTier::C).unwrap().map(|d| d.mnemonic)
    };
    assert!(reg.lookup(0x40E7, IsaTier::C).is_some());
    assert_eq!(decode(&[0x40E7, 0x0000, 0x2700]), None);
    assert_eq!(decode(&[0x40E7, 0x46FC, 0x2700]), Some("strldsr"));
    assert_eq!(decode(&[0x103C, 0x1A04]), None);
    assert_eq!(decode(&[0x103C, 0x0004]), Some("move"));
    assert_eq!(decode(&[0x0880, 0x0123]), None);
    assert_eq!(decode(&[0x4C01, 0x0C00]), None);
    assert_eq!(decode(&[0x4C41, 0x0812]), None);
}

#[test]
fn branch_sizes_follow_the_displacement() {
    let reg = Registry::build();
    assert_eq!(reg.branch_size("bra", -2, IsaTier::A), Some(Size::Byte));
    assert_eq!(reg.branch_size("bra", 0x100, IsaTier::A), Some(Size::Word));
    assert_eq!(reg.branch_size("bra", -1, IsaTier::A), Some(Size::Word));
    assert_eq!(reg.branch_size("bra", 0x10000, IsaTier::A), None);
    assert_eq!(reg.branch_size("bra", 0x10000, IsaTier::B), Some(Size::Long));
    assert_eq!(reg.branch_size("bra", 0, IsaTier::C), None);
    assert_eq!(reg.branch_size("nop", 2, IsaTier::C), None);
}
