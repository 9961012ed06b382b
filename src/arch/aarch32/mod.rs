//! ARM, formerly an acronym of Acorn RISC Machine, and a quite popular ISA.
//!
//! This only covers the 32-bit ARM instruction set (A32). Thumb code is never
//! emitted or matched by the patch engine.

mod dis;
mod instr;
mod types;

pub use dis::disassemble;
pub use instr::Instruction;
pub use types::*;
