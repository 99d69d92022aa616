//! Core vocabulary for the modular shader language compiler: tokens produced
//! by the preprocessor, diagnostic accumulation, the reflection data model
//! shared between the parser and the SPIR-V processor, render/sampler state
//! records, and low-level SPIR-V word-stream plumbing.
pub use spirv;

pub mod output;
pub mod parse;
pub mod refl;
pub mod stage;
pub mod state;
pub mod token;
pub mod ty;

/// Error infrastructure.
pub mod error {
    pub use anyhow::{anyhow, bail, ensure, Error, Result};
}
