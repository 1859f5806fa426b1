use crate::ea::Ea;

/// Internal-consistency faults: a definition was registered for a bit
/// pattern it cannot handle, or the catalog itself is inconsistent.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LogicError {
    #[error("opcode {opcode:#06x} matched a definition that cannot decode it: {detail}")]
    Undecodable { opcode: u16, detail: String },
    #[error("{mnemonic}: decoded form has no {which} operand")]
    MissingOperand { mnemonic: &'static str, which: &'static str },
    #[error("operand {ea:?} does not name a location")]
    NotAddressable { ea: Ea },
    #[error("opcode {opcode:#06x} on ISA_{isa} matches both {first} and {second}")]
    Ambiguous {
        opcode: u16,
        isa: char,
        first: &'static str,
        second: &'static str,
    },
}

/// Assembly-time failures, reported with the offending mnemonic and operand.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AsmError {
    #[error("unknown mnemonic `{0}`")]
    UnknownMnemonic(String),
    #[error("{mnemonic}: illegal {which} operand {ea}: {detail}")]
    IllegalOperand {
        mnemonic: &'static str,
        which: &'static str,
        ea: String,
        detail: String,
    },
    #[error("{mnemonic}: missing {which} operand")]
    MissingOperand { mnemonic: &'static str, which: &'static str },
    #[error("{mnemonic}: unexpected {which} operand {ea}")]
    ExtraOperand {
        mnemonic: &'static str,
        which: &'static str,
        ea: String,
    },
    #[error("{mnemonic}: size .{size} is not supported")]
    BadSize { mnemonic: &'static str, size: char },
    #[error("{mnemonic}: an explicit size suffix is required")]
    SizeRequired { mnemonic: &'static str },
    #[error("{mnemonic}: value {value} out of range ({detail})")]
    OutOfRange {
        mnemonic: &'static str,
        value: i64,
        detail: String,
    },
    #[error("{mnemonic} has no assembler encoding")]
    NotAssemblable { mnemonic: &'static str },
    #[error("{mnemonic} is not available on ISA_{isa}")]
    NotInIsa { mnemonic: String, isa: char },
}

impl AsmError {
    pub(crate) fn illegal(mnemonic: &'static str, which: &'static str, ea: &Ea, detail: impl Into<String>) -> Self {
        AsmError::IllegalOperand {
            mnemonic,
            which,
            ea: format!("{ea}"),
            detail: detail.into(),
        }
    }

    pub(crate) fn range(mnemonic: &'static str, value: i64, detail: impl Into<String>) -> Self {
        AsmError::OutOfRange {
            mnemonic,
            value,
            detail: detail.into(),
        }
    }
}
