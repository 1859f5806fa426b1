//! Motorola S-record (S0-S3, S5-S9).

use std::fmt::Write as _;

use crate::image::ProgramImage;
use crate::loader::{hex_bytes, LoadError};

const BYTES_PER_RECORD: usize = 16;

/// Address width in bytes for each record type; `None` for S4.
fn addr_len(kind: u8) -> Option<usize> {
    match kind {
        b'0' | b'1' | b'5' | b'9' => Some(2),
        b'2' | b'6' | b'8' => Some(3),
        b'3' | b'7' => Some(4),
        _ => None,
    }
}

pub fn parse(text: &str) -> Result<ProgramImage, LoadError> {
    let mut img = ProgramImage::new();
    let mut data_records: u32 = 0;

    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let rec = raw.trim();
        if rec.is_empty() {
            continue;
        }
        let rest = rec
            .strip_prefix('S')
            .ok_or_else(|| LoadError::malformed(line, raw, "record does not start with 'S'"))?;
        let kind = *rest.as_bytes().first().ok_or_else(|| LoadError::malformed(line, raw, "missing record type"))?;
        let alen = addr_len(kind).ok_or_else(|| LoadError::RecordType { line, kind: format!("S{}", kind as char) })?;
        let bytes = hex_bytes(line, raw, &rest[1..])?;
        let count = *bytes.first().ok_or_else(|| LoadError::malformed(line, raw, "record too short"))? as usize;
        if bytes.len() != count + 1 || count < alen + 1 {
            return Err(LoadError::malformed(line, raw, format!("count byte {count} does not match the record")));
        }
        let sum = bytes[..bytes.len() - 1].iter().fold(0u8, |a, b| a.wrapping_add(*b));
        let expected = !sum;
        let found = bytes[bytes.len() - 1];
        if expected != found {
            return Err(LoadError::Checksum { line, expected, found });
        }
        let addr = bytes[1..1 + alen].iter().fold(0u32, |a, b| (a << 8) | *b as u32);
        let data = &bytes[1 + alen..bytes.len() - 1];
        match kind {
            b'0' => {}
            b'1' | b'2' | b'3' => {
                img.write_bytes(addr, data);
                data_records += 1;
            }
            b'5' | b'6' => {
                if addr != data_records {
                    return Err(LoadError::malformed(
                        line,
                        raw,
                        format!("record count {addr} but {data_records} data records seen"),
                    ));
                }
            }
            _ => img.start = Some(addr),
        }
    }
    Ok(img)
}

fn record(out: &mut String, kind: u8, alen: usize, addr: u32, data: &[u8]) {
    let mut bytes = vec![(alen + data.len() + 1) as u8];
    bytes.extend_from_slice(&addr.to_be_bytes()[4 - alen..]);
    bytes.extend_from_slice(data);
    let sum = bytes.iter().fold(0u8, |a, b| a.wrapping_add(*b));
    bytes.push(!sum);
    let _ = write!(out, "S{}", kind as char);
    for b in bytes {
        let _ = write!(out, "{b:02X}");
    }
    out.push('\n');
}

/// Render with the narrowest address width that covers the image.
pub fn save(img: &ProgramImage, header: &str) -> String {
    let top = img.bounds().map_or(0, |(_, end)| end.saturating_sub(1)).max(img.start.unwrap_or(0) as u64);
    let (data_kind, term_kind, alen) = if top <= 0xFFFF {
        (b'1', b'9', 2)
    } else if top <= 0xFF_FFFF {
        (b'2', b'8', 3)
    } else {
        (b'3', b'7', 4)
    };

    let mut out = String::new();
    record(&mut out, b'0', 2, 0, header.as_bytes());
    let mut n = 0u32;
    for seg in img.segments() {
        for (i, chunk) in seg.bytes.chunks(BYTES_PER_RECORD).enumerate() {
            let addr = seg.base.wrapping_add((i * BYTES_PER_RECORD) as u32);
            record(&mut out, data_kind, alen, addr, chunk);
            n += 1;
        }
    }
    if n <= 0xFFFF {
        record(&mut out, b'5', 2, n, &[]);
    } else {
        record(&mut out, b'6', 3, n, &[]);
    }
    record(&mut out, term_kind, alen, img.start.unwrap_or(0), &[]);
    out
}
