use std::path::PathBuf;

use coldfire_rs::loader::{ihex, load_file, srec, Format, LoadError};
use coldfire_rs::{Cpu, CpuConfig, LinearMemory, ProgramImage, Registry, RunState};

fn temp_file(name: &str, text: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("coldfire_rs_{}_{name}", std::process::id()));
    std::fs::write(&path, text).unwrap();
    path
}

#[test]
fn srecord_file_runs_on_the_cpu() {
    // nop / stop #0x2700, entry 0x1000
    let path = temp_file("prog.s19", "S00600004844521B\nS10910004E714E72270040\nS9031000EC\n");
    let img = load_file(&path, None, 0).unwrap();
    assert_eq!(img.start, Some(0x1000));
    assert_eq!(img.len(), 6);

    let mut mem = LinearMemory::new(0x10000);
    img.copy_to(&mut mem).unwrap();
    let mut cpu = Cpu::new(CpuConfig::default());
    cpu.reset(img.start.unwrap());
    let (state, steps) = cpu.run(&mut mem, &Registry::build(), 100).unwrap();
    assert_eq!((state, steps), (RunState::Stopped, 2));
    let _ = std::fs::remove_file(&path);
}

#[test]
fn intel_hex_detected_by_content() {
    let path = temp_file("prog.txt", ":041000004E714E756A\n:00000001FF\n");
    let img = load_file(&path, None, 0).unwrap();
    assert_eq!(img.get(0x1000), Some(0x4E));
    assert_eq!(img.get(0x1003), Some(0x75));
    assert_eq!(img.get(0x1004), None);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn raw_binary_lands_at_base() {
    let path = temp_file("prog.bin", "Nq");
    let img = load_file(&path, Some(Format::Raw), 0x2000).unwrap();
    assert_eq!(img.get(0x2000), Some(0x4E));
    assert_eq!(img.get(0x2001), Some(b'q'));
    let _ = std::fs::remove_file(&path);
}

#[test]
fn corrupted_checksum_names_the_line() {
    let path = temp_file("bad.hex", ":020000040000FA\n:041000004E714E756B\n:00000001FF\n");
    let err = load_file(&path, None, 0).unwrap_err();
    let load = err.downcast_ref::<LoadError>().unwrap();
    assert_eq!(load.line(), Some(2));
    assert!(matches!(load, LoadError::Checksum { found: 0x6B, expected: 0x6A, .. }));
    let _ = std::fs::remove_file(&path);
}

#[test]
fn intel_hex_needs_an_eof_record() {
    assert!(matches!(ihex::parse(":041000004E714E756A\n"), Err(LoadError::MissingEof)));
}

#[test]
fn saved_images_reload_identically() {
    let mut img = ProgramImage::new();
    img.write_words(0x0001_0000, &[0x4E71, 0x4E75]);
    img.write_bytes(0x20, &[1, 2, 3]);
    img.start = Some(0x0001_0000);

    let back = srec::parse(&srec::save(&img, "t")).unwrap();
    assert_eq!(back.segments(), img.segments());
    assert_eq!(back.start, img.start);

    let back = ihex::parse(&ihex::save(&img)).unwrap();
    assert_eq!(back.segments(), img.segments());
}
