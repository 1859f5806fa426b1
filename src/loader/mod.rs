//! Text program formats: Intel HEX and Motorola S-record, plus raw binary.
//!
//! Loading is all-or-nothing: the first bad record fails the whole file and
//! no partially filled image is returned.

use std::path::Path;

use crate::image::ProgramImage;

pub mod ihex;
pub mod srec;

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("line {line}: {detail} in `{raw}`")]
    Malformed { line: usize, raw: String, detail: String },
    #[error("line {line}: checksum {found:#04x}, expected {expected:#04x}")]
    Checksum { line: usize, expected: u8, found: u8 },
    #[error("line {line}: unsupported record type `{kind}`")]
    RecordType { line: usize, kind: String },
    #[error("missing end-of-file record")]
    MissingEof,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LoadError {
    pub(crate) fn malformed(line: usize, raw: &str, detail: impl Into<String>) -> Self {
        LoadError::Malformed { line, raw: raw.to_string(), detail: detail.into() }
    }

    /// 1-based source line, when the failure is tied to one.
    pub fn line(&self) -> Option<usize> {
        match self {
            LoadError::Malformed { line, .. } | LoadError::Checksum { line, .. } | LoadError::RecordType { line, .. } => {
                Some(*line)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    IntelHex,
    SRecord,
    Raw,
}

impl Format {
    /// Guess from the file extension, falling back to the first byte.
    pub fn detect(path: &Path, head: &[u8]) -> Format {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("hex" | "ihex" | "ihx") => Format::IntelHex,
            Some("srec" | "s19" | "s28" | "s37" | "mot") => Format::SRecord,
            Some("bin") => Format::Raw,
            _ => match head.first() {
                Some(b':') => Format::IntelHex,
                Some(b'S') if head.get(1).is_some_and(|c| c.is_ascii_digit()) => Format::SRecord,
                _ => Format::Raw,
            },
        }
    }
}

/// Decode a pair of hex digits per byte.
pub(crate) fn hex_bytes(line: usize, raw: &str, digits: &str) -> Result<Vec<u8>, LoadError> {
    if !digits.is_ascii() {
        return Err(LoadError::malformed(line, raw, "non-ASCII characters"));
    }
    if digits.len() % 2 != 0 {
        return Err(LoadError::malformed(line, raw, "odd number of hex digits"));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| LoadError::malformed(line, raw, format!("bad hex digits `{}`", &digits[i..i + 2])))
        })
        .collect()
}

/// Load `path` in the given or detected format. Raw files are placed at `base`.
pub fn load_file(path: &Path, format: Option<Format>, base: u32) -> anyhow::Result<ProgramImage> {
    let data = std::fs::read(path)?;
    let format = format.unwrap_or_else(|| Format::detect(path, &data));
    Ok(match format {
        Format::Raw => ProgramImage::from_bytes(base, &data),
        Format::IntelHex => ihex::parse(&String::from_utf8_lossy(&data))?,
        Format::SRecord => srec::parse(&String::from_utf8_lossy(&data))?,
    })
}
