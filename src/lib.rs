pub mod context;
pub mod cpu;
pub mod disasm;
pub mod ea;
pub mod error;
pub mod exception;
pub mod flags;
pub mod image;
pub mod isa;
pub mod loader;
pub mod memory;
pub mod registry;
pub mod stencil;
pub mod stream;

pub use cpu::{Cpu, CpuConfig, Fault, RunState, Trap};
pub use ea::{Ea, Modes};
pub use error::{AsmError, LogicError};
pub use exception::Exception;
pub use image::ProgramImage;
pub use isa::{Decoded, IsaTier, Operands, Size};
pub use memory::{Bus, LinearMemory};
pub use registry::Registry;
