//! Intel HEX (record types 00-05).

use std::fmt::Write as _;

use crate::image::ProgramImage;
use crate::loader::{hex_bytes, LoadError};

const BYTES_PER_RECORD: usize = 16;

/// Parse a whole Intel HEX file. Blank lines are ignored.
pub fn parse(text: &str) -> Result<ProgramImage, LoadError> {
    let mut img = ProgramImage::new();
    let mut upper: u32 = 0;
    let mut seen_eof = false;

    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let rec = raw.trim();
        if rec.is_empty() {
            continue;
        }
        if seen_eof {
            return Err(LoadError::malformed(line, raw, "data after end-of-file record"));
        }
        let digits = rec
            .strip_prefix(':')
            .ok_or_else(|| LoadError::malformed(line, raw, "record does not start with ':'"))?;
        let bytes = hex_bytes(line, raw, digits)?;
        if bytes.len() < 5 {
            return Err(LoadError::malformed(line, raw, "record too short"));
        }
        let count = bytes[0] as usize;
        if bytes.len() != count + 5 {
            return Err(LoadError::malformed(
                line,
                raw,
                format!("length byte says {count} data bytes, record has {}", bytes.len() - 5),
            ));
        }
        let sum = bytes.iter().fold(0u8, |a, b| a.wrapping_add(*b));
        if sum != 0 {
            let found = bytes[bytes.len() - 1];
            let expected = found.wrapping_sub(sum);
            return Err(LoadError::Checksum { line, expected, found });
        }
        let offset = u16::from_be_bytes([bytes[1], bytes[2]]) as u32;
        let data = &bytes[4..4 + count];
        let need = |n: usize| -> Result<(), LoadError> {
            if count == n {
                Ok(())
            } else {
                Err(LoadError::malformed(line, raw, format!("record type {:02X} needs {n} data bytes", bytes[3])))
            }
        };
        match bytes[3] {
            0x00 => img.write_bytes(upper.wrapping_add(offset), data),
            0x01 => seen_eof = true,
            0x02 => {
                need(2)?;
                upper = (u16::from_be_bytes([data[0], data[1]]) as u32) << 4;
            }
            0x03 => {
                need(4)?;
                let cs = u16::from_be_bytes([data[0], data[1]]) as u32;
                let ip = u16::from_be_bytes([data[2], data[3]]) as u32;
                img.start = Some((cs << 4).wrapping_add(ip));
            }
            0x04 => {
                need(2)?;
                upper = (u16::from_be_bytes([data[0], data[1]]) as u32) << 16;
            }
            0x05 => {
                need(4)?;
                img.start = Some(u32::from_be_bytes([data[0], data[1], data[2], data[3]]));
            }
            other => return Err(LoadError::RecordType { line, kind: format!("{other:02X}") }),
        }
    }
    if !seen_eof {
        return Err(LoadError::MissingEof);
    }
    Ok(img)
}

fn record(out: &mut String, kind: u8, offset: u16, data: &[u8]) {
    let mut bytes = vec![data.len() as u8];
    bytes.extend_from_slice(&offset.to_be_bytes());
    bytes.push(kind);
    bytes.extend_from_slice(data);
    let sum = bytes.iter().fold(0u8, |a, b| a.wrapping_add(*b));
    bytes.push(sum.wrapping_neg());
    out.push(':');
    for b in bytes {
        let _ = write!(out, "{b:02X}");
    }
    out.push('\n');
}

/// Render with type-04 upper-address records and an optional type-05 start.
pub fn save(img: &ProgramImage) -> String {
    let mut out = String::new();
    let mut upper: Option<u16> = None;
    for seg in img.segments() {
        let mut addr = seg.base;
        let mut rest = seg.bytes.as_slice();
        while !rest.is_empty() {
            let hi = (addr >> 16) as u16;
            if upper != Some(hi) {
                record(&mut out, 0x04, 0, &hi.to_be_bytes());
                upper = Some(hi);
            }
            // Records never straddle a 64 KiB boundary.
            let room = 0x1_0000 - (addr & 0xFFFF) as usize;
            let n = rest.len().min(BYTES_PER_RECORD).min(room);
            record(&mut out, 0x00, addr as u16, &rest[..n]);
            addr = addr.wrapping_add(n as u32);
            rest = &rest[n..];
        }
    }
    if let Some(start) = img.start {
        record(&mut out, 0x05, 0, &start.to_be_bytes());
    }
    record(&mut out, 0x01, 0, &[]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_with_linear_base_and_start() {
        let text = ":020000040001F9\n:040010004E714E756A\n:0400000500010010E6\n:00000001FF\n";
        let img = parse(text).unwrap();
        assert_eq!(img.get(0x1_0010), Some(0x4E));
        assert_eq!(img.get(0x1_0013), Some(0x75));
        assert_eq!(img.start, Some(0x1_0010));
    }

    #[test]
    fn checksum_mismatch_names_the_line() {
        let text = ":00000001FF\n";
        assert!(parse(text).is_ok());
        let bad = ":020000040001F9\n:040010004E714E756B\n:00000001FF\n";
        match parse(bad) {
            Err(LoadError::Checksum { line, expected, found }) => {
                assert_eq!(line, 2);
                assert_eq!(found, 0x6B);
                assert_eq!(expected, 0x6A);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn save_then_parse() {
        let mut img = ProgramImage::from_bytes(0x0001_FFF8, &(0u8..24).collect::<Vec<_>>());
        img.start = Some(0x0002_0000);
        let text = save(&img);
        assert_eq!(parse(&text).unwrap(), img);
    }
}
