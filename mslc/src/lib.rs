//! # mslc: modular shader language compiler core.
//!
//! The compiler accepts shader source in a GLSL superset that adds
//! `pipeline`, `sampler_state`, `varying`, and fragment-input declarations
//! plus `[[stage, ...]]` element filters, and produces per-stage SPIR-V with
//! full reflection metadata. This crate is the front-to-middle of that
//! toolchain:
//!
//! - [`parser::Parser`] partitions a preprocessed token stream into
//!   per-stage elements, extracts pipeline/sampler/fragment-input
//!   declarations, and synthesizes per-stage GLSL strings with a line
//!   mapping table for diagnostics.
//! - [`reflect::SpirvProcessor`] reconstructs a reflection view of a
//!   compiled SPIR-V module (structs with layout, uniforms, inputs,
//!   outputs, push constants, compute local size), assigns implicit
//!   interface locations, links inputs against the previous stage's
//!   outputs, and re-emits SPIR-V with explicit decorations.
//! - [`frontend`] is the seam to the reference GLSL front-end and the
//!   SPIR-V optimizer; the compiler core itself owns no I/O.
//!
//! The preprocessor that produces the token stream and the backend emitters
//! that downlevel SPIR-V to GLSL or Metal live outside this crate.
pub use mslc_core::error;
pub use mslc_core::spirv;

pub mod consts;
pub mod frontend;
pub mod instr;
pub mod link;
pub mod parser;
pub mod reflect;
pub mod rewrite;
pub mod values;


pub use mslc_core::output::{Level, Message, Output};
pub use mslc_core::parse::SpirvBinary;
pub use mslc_core::refl::{ArrayInfo, InputOutput, Struct, StructMember, Uniform, UniformType};
pub use mslc_core::stage::{Stage, STAGE_COUNT};
pub use mslc_core::state::{RenderState, SamplerState};
pub use mslc_core::token::{Token, TokenKind, TokenList};
pub use mslc_core::ty::Type;

pub use parser::{
    FragmentInput, FragmentInputGroup, LineMapping, ParseOptions, Parser, Pipeline, Sampler,
};
pub use reflect::{Origin, SpirvProcessor};
pub use rewrite::Strip;
