//! SPIR-V word-stream plumbing: binary wrappers, a forward instruction
//! cursor, operand readers, and an instruction builder for the rewriter.
mod bin;
mod instr;

pub use bin::{SpirvBinary, SpirvHeader, HEADER_LEN};
pub use instr::{Instr, InstructionBuilder, Instrs, Operands};
