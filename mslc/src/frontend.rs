//! Seam to the reference GLSL front-end and SPIR-V optimizer.
//!
//! The compiler core owns no I/O and never talks to glslang directly;
//! implementations of [`Frontend`] wrap the real toolchain. What lives here
//! is the process-wide init refcount and the translation of front-end info
//! logs back to original source positions through the parser's line
//! mappings.
use std::sync::atomic::{AtomicUsize, Ordering};

use bitflags::bitflags;

use mslc_core::output::{Level, Output};
use mslc_core::parse::SpirvBinary;
use mslc_core::stage::{Stage, STAGE_COUNT};

use crate::parser::{LineMapping, Pipeline};

bitflags! {
    /// Optimizer passes applied after SPIR-V rewriting.
    pub struct OptimizeFlags: u32 {
        const REMAP_VARIABLES = 0x1;
        const DEAD_CODE_ELIMINATION = 0x2;
        const OPTIMIZE = 0x4;
        const STRIP_DEBUG = 0x8;
    }
}

/// Compiles one stage's synthesized GLSL, links stages into a program, and
/// emits SPIR-V. `emit` returns an empty binary when the program had errors.
pub trait Frontend {
    type Shader;
    type Program;

    fn compile(
        &mut self,
        output: &mut Output,
        base_file_name: &str,
        source: &str,
        line_mappings: &[LineMapping],
        stage: Stage,
        spirv_version: u32,
    ) -> Option<Self::Shader>;

    fn link(
        &mut self,
        output: &mut Output,
        pipeline: &Pipeline,
        shaders: &[Option<Self::Shader>; STAGE_COUNT],
    ) -> Option<Self::Program>;

    fn emit(&mut self, output: &mut Output, program: &Self::Program, stage: Stage) -> SpirvBinary;

    fn optimize(&mut self, spirv: SpirvBinary, flags: OptimizeFlags) -> SpirvBinary;
}

static INIT_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Reference-counted process-wide initialization. `init` runs only on the
/// first of a balanced `initialize`/`shutdown` pair.
pub fn initialize(init: impl FnOnce()) {
    if INIT_COUNT.fetch_add(1, Ordering::SeqCst) == 0 {
        init();
    }
}

/// Counterpart to [`initialize`]; `finish` runs on the last shutdown.
pub fn shutdown(finish: impl FnOnce()) {
    if INIT_COUNT.fetch_sub(1, Ordering::SeqCst) == 1 {
        finish();
    }
}

const IGNORED_MESSAGES: &[&str] = &[
    "No code generated.",
    "most version-specific features are present, but some are missing.",
    "stage:",
    "all default precisions are highp; use precision statements to quiet warning, e.g.:",
    "\"precision mediump int; precision highp float;\"",
];

/// Fold a glslang-style info log into the output, mapping `file:line:`
/// references back through `line_mappings` to original source positions.
/// Lines that can't be translated are attributed to the synthesized file at
/// `default_line`.
pub fn add_front_end_messages(
    output: &mut Output,
    base_file_name: &str,
    line_mappings: &[LineMapping],
    info: &str,
    default_line: u32,
) {
    for raw_line in info.lines() {
        let mut message = raw_line.trim();
        if message.is_empty() || IGNORED_MESSAGES.iter().any(|x| message.ends_with(x)) {
            continue;
        }

        let mut level = Level::Info;
        let mut prefix = "";
        if let Some(rest) = message.strip_prefix("WARNING: ") {
            message = rest;
            level = Level::Warning;
        } else if let Some(rest) = message.strip_prefix("ERROR: ") {
            message = rest;
            level = Level::Error;
        } else if let Some(rest) = message.strip_prefix("INTERNAL ERROR: ") {
            message = rest;
            level = Level::Error;
            prefix = "internal error: ";
        } else if let Some(rest) = message.strip_prefix("UNIMPLEMENTED: ") {
            message = rest;
            level = Level::Error;
            prefix = "unimplemented: ";
        } else if let Some(rest) = message.strip_prefix("NOTE: ") {
            message = rest;
        } else if let Some(rest) = message.strip_prefix("UNKNOWN ERROR: ") {
            message = rest;
            level = Level::Error;
        }

        let mut located = None;
        if let Some(separator) = message.find(':') {
            if let Some(line_len) = message[separator + 1..].find(':') {
                let number = &message[separator + 1..separator + 1 + line_len];
                if let Ok(line) = number.parse::<usize>() {
                    let index = line.wrapping_sub(1);
                    if index < line_mappings.len() {
                        let mapping = &line_mappings[index];
                        let rest_start = separator + 1 + line_len + 1;
                        let rest = message[rest_start..].trim_start();
                        located = Some((mapping.file.as_str(), mapping.line, rest));
                    }
                }
            }
        }

        let (file, line, text) = located.unwrap_or((base_file_name, default_line, message));
        output.add_message(level, file, line, 0, false, format!("{}{}", prefix, text));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn init_refcount_pairs() {
        let mut inits = 0;
        let mut finishes = 0;
        initialize(|| inits += 1);
        initialize(|| inits += 1);
        assert_eq!(inits, 1);
        shutdown(|| finishes += 1);
        assert_eq!(finishes, 0);
        shutdown(|| finishes += 1);
        assert_eq!(finishes, 1);
    }

    #[test]
    fn translates_log_lines_through_mappings() {
        let mappings = vec![
            LineMapping {
                file: "<internal>".to_owned(),
                line: 0,
            },
            LineMapping {
                file: "shader.msl".to_owned(),
                line: 14,
            },
        ];
        let mut output = Output::new();
        add_front_end_messages(
            &mut output,
            "Test.frag",
            &mappings,
            "WARNING: 0:2: 'foo' : deprecated\nERROR: 1 compilation errors.  No code generated.\nERROR: something unlocatable",
            0,
        );

        let messages = output.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].level, Level::Warning);
        assert_eq!(messages[0].file, "shader.msl");
        assert_eq!(messages[0].line, 14);
        assert_eq!(messages[0].text, "'foo' : deprecated");
        assert_eq!(messages[1].level, Level::Error);
        assert_eq!(messages[1].file, "Test.frag");
        assert_eq!(messages[1].line, 0);
        assert_eq!(messages[1].text, "something unlocatable");
    }

    #[test]
    fn drops_noise_lines() {
        let mut output = Output::new();
        add_front_end_messages(
            &mut output,
            "Test.vert",
            &[],
            "Linked vertex stage:\n\nWARNING: Linking vertex stage: all default precisions are highp; use precision statements to quiet warning, e.g.:\n\"precision mediump int; precision highp float;\"",
            0,
        );
        assert!(output.messages().is_empty());
    }
}
