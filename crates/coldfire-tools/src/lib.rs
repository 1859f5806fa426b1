pub mod analyze;
pub mod asm;
pub mod operand;

pub use analyze::{analyze_entries, build_report, Block, EdgeKind, EdgeOut, FunctionOut, Report, Walk};
pub use asm::{AsmLineError, Assembler, Assembly};
