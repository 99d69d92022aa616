//! Source parser: partitions a preprocessed token stream into per-stage
//! elements and synthesizes the per-stage GLSL handed to the reference
//! front-end.
//!
//! The parser never interprets GLSL itself. It tracks bracket nesting to
//! find element boundaries, classifies each element just enough to order the
//! synthesized output (precision and structs first, then the synthetic
//! push-constant block, then the rest), and fully consumes only the
//! constructs the language adds on top of GLSL: `pipeline`, `sampler_state`,
//! `varying`, fragment-input blocks, and `[[stage, ...]]` filters.
use bitflags::bitflags;

use mslc_core::output::Output;
use mslc_core::stage::{input_is_array, Stage, STAGE_COUNT};
use mslc_core::state::{RenderState, SamplerState};
use mslc_core::token::{Token, TokenKind, TokenList};

use crate::consts::{is_opaque_type, INTERNAL_FILE};
use crate::values;

bitflags! {
    pub struct ParseOptions: u32 {
        /// Fold uniform blocks into the synthetic push-constant block.
        const REMOVE_UNIFORM_BLOCKS = 0x1;
        /// Allow `fragment <Type> { ... } <name>;` input declarations.
        const SUPPORTS_FRAGMENT_INPUTS = 0x2;
    }
}

impl Default for ParseOptions {
    fn default() -> ParseOptions {
        ParseOptions::empty()
    }
}

const ELEMENT_COUNT: usize = 5;

/// Ordering class of a top-level element within the synthesized output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Element {
    Precision,
    Struct,
    FreeUniform,
    UniformBlock,
    Default,
}

/// Extra text synthesized in front of a `varying` declaration when it is
/// re-emitted into a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prepend {
    None,
    In,
    InArray,
    Out,
}

#[derive(Debug, Clone, Copy)]
struct TokenRange {
    prepend: Prepend,
    start: usize,
    count: usize,
}

/// Origin of one line of a synthesized shader string. Injected lines carry
/// the `<internal>` file name and line 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineMapping {
    pub file: String,
    pub line: u32,
}

impl LineMapping {
    fn internal() -> LineMapping {
        LineMapping {
            file: INTERNAL_FILE.to_owned(),
            line: 0,
        }
    }
}

/// A named binding of per-stage entry points plus render state. Entry points
/// are token indices into the parser's token list.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    pub token: Option<usize>,
    pub name: String,
    pub entry_points: [Option<usize>; STAGE_COUNT],
    pub render_state: RenderState,
}

#[derive(Debug, Clone)]
pub struct Sampler {
    pub token: usize,
    pub name: String,
    pub state: SamplerState,
}

/// One member of a fragment-input block. The `location` layout qualifier
/// names the subpass attachment to read; the real input location is filled
/// in by the backend.
#[derive(Debug, Clone)]
pub struct FragmentInput {
    pub type_token: usize,
    pub name_token: usize,
    pub ty: String,
    pub name: String,
    pub attachment_index: u32,
    pub fragment_group: u32,
    pub location: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct FragmentInputGroup {
    pub type_token: usize,
    pub name_token: usize,
    pub type_name: String,
    pub instance_name: String,
    pub inputs: Vec<FragmentInput>,
}

/// Partitioned view of one source's token stream. Rebuilt per source.
#[derive(Default)]
pub struct Parser {
    tokens: TokenList,
    options: ParseOptions,
    elements: [[Vec<TokenRange>; STAGE_COUNT]; ELEMENT_COUNT],
    pipelines: Vec<Pipeline>,
    samplers: Vec<Sampler>,
    fragment_inputs: Vec<FragmentInputGroup>,
}

fn token_error(output: &mut Output, tokens: &TokenList, token: &Token, text: impl Into<String>) {
    output.error(tokens.token_file(token), token.line, token.column, text);
}

fn token_note(output: &mut Output, tokens: &TokenList, token: &Token, text: impl Into<String>) {
    output.note(tokens.token_file(token), token.line, token.column, text);
}

fn eof_error(output: &mut Output, tokens: &TokenList) {
    let last = tokens.tokens().last().unwrap();
    token_error(output, tokens, last, "unexpected end of file");
}

/// Advance past whitespace and newlines; an end-of-stream here is an error.
fn skip_whitespace(output: &mut Output, tokens: &TokenList, i: &mut usize) -> bool {
    let toks = tokens.tokens();
    while *i < toks.len() {
        if !toks[*i].is_whitespace() {
            return true;
        }
        *i += 1;
    }
    eof_error(output, tokens);
    false
}

fn stage_from_token(output: &mut Output, tokens: &TokenList, token: &Token) -> Option<Stage> {
    match Stage::from_name(&token.value) {
        Some(stage) => Some(stage),
        None => {
            token_error(
                output,
                tokens,
                token,
                format!("unknown stage type: '{}'", token.value),
            );
            None
        }
    }
}

impl Parser {
    pub fn new() -> Parser {
        Default::default()
    }

    pub fn tokens(&self) -> &TokenList {
        &self.tokens
    }

    /// Mutable access for the preprocessor to fill in.
    pub fn tokens_mut(&mut self) -> &mut TokenList {
        &mut self.tokens
    }

    pub fn pipelines(&self) -> &[Pipeline] {
        &self.pipelines
    }

    pub fn samplers(&self) -> &[Sampler] {
        &self.samplers
    }

    pub fn fragment_inputs(&self) -> &[FragmentInputGroup] {
        &self.fragment_inputs
    }

    /// Entry point identifier a pipeline binds for a stage.
    pub fn entry_point_name(&self, pipeline: &Pipeline, stage: Stage) -> Option<&str> {
        pipeline.entry_points[stage.index()]
            .map(|idx| self.tokens.tokens()[idx].value.as_str())
    }

    /// Partition the token stream. Errors are reported to `output`;
    /// returns false once parsing cannot continue.
    pub fn parse(&mut self, output: &mut Output, options: ParseOptions) -> bool {
        self.options = options;
        for per_element in self.elements.iter_mut() {
            for per_stage in per_element.iter_mut() {
                per_stage.clear();
            }
        }
        self.pipelines.clear();
        self.samplers.clear();
        self.fragment_inputs.clear();

        let Parser {
            ref tokens,
            ref mut elements,
            ref mut pipelines,
            ref mut samplers,
            ref mut fragment_inputs,
            ..
        } = *self;
        let toks = tokens.tokens();
        if toks.is_empty() {
            return true;
        }

        let mut paren_count = 0usize;
        let mut brace_count = 0usize;
        let mut square_count = 0usize;
        let mut element_start = true;
        let mut in_stage_decl = false;
        let mut had_scope = false;
        let mut block_keyword = false;

        let mut last: Option<usize> = None;
        let mut start_paren: Option<usize> = None;
        let mut start_brace: Option<usize> = None;
        let mut start_square: Option<usize> = None;

        let mut range = TokenRange {
            prepend: Prepend::None,
            start: 0,
            count: 0,
        };
        let mut stages: Vec<Stage> = Vec::new();

        let mut i = 0;
        while i < toks.len() {
            let token = &toks[i];
            if token.is_whitespace() {
                i += 1;
                continue;
            }

            // Stage filter bodies only hold stage names and commas.
            if in_stage_decl {
                if square_count != 2 || token.kind == TokenKind::Symbol {
                    let double_comma = last.map_or(false, |x| toks[x].value == ",");
                    if token.value == "]" {
                        // Handled with the other closing brackets below.
                    } else if token.value != "," || double_comma {
                        token_error(
                            output,
                            tokens,
                            token,
                            format!("unexpected token: '{}'", token.value),
                        );
                        return false;
                    }
                } else {
                    match stage_from_token(output, tokens, token) {
                        Some(stage) => stages.push(stage),
                        None => return false,
                    }
                    last = Some(i);
                    i += 1;
                    continue;
                }
            }

            if element_start && token.value == "pipeline" {
                i += 1;
                match Self::read_pipeline(output, tokens, pipelines, &mut i) {
                    Some(pipeline) => pipelines.push(pipeline),
                    None => return false,
                }
                stages.clear();
                range.start = i;
                range.count = 0;
                last = None;
                continue;
            } else if element_start && token.value == "sampler_state" {
                i += 1;
                match Self::read_sampler(output, tokens, samplers, &mut i) {
                    Some(sampler) => samplers.push(sampler),
                    None => return false,
                }
                stages.clear();
                range.start = i;
                range.count = 0;
                last = None;
                continue;
            } else if element_start && token.value == "varying" {
                let varying_idx = i;
                i += 1;
                match Self::read_varying(output, tokens, varying_idx, &mut i) {
                    Some(decls) => {
                        for (stage, decl_range) in decls {
                            elements[Element::Default as usize][stage.index()].push(decl_range);
                        }
                    }
                    None => return false,
                }
                stages.clear();
                range.start = i;
                range.count = 0;
                last = None;
                continue;
            } else if element_start && token.value == "fragment" {
                if !options.contains(ParseOptions::SUPPORTS_FRAGMENT_INPUTS) {
                    token_error(
                        output,
                        tokens,
                        token,
                        "fragment inputs not supported by current target",
                    );
                    return false;
                }
                i += 1;
                match Self::read_fragment_inputs(output, tokens, fragment_inputs, &mut i) {
                    Some(group) => fragment_inputs.push(group),
                    None => return false,
                }
                stages.clear();
                range.start = i;
                range.count = 0;
                last = None;
                continue;
            } else if token.value == "[" {
                if square_count == 0 {
                    start_square = Some(i);
                }
                square_count += 1;

                if square_count == 2 && last.map_or(false, |x| toks[x].value == "[") {
                    if element_start {
                        in_stage_decl = true;
                    } else {
                        token_error(
                            output,
                            tokens,
                            token,
                            "stage declaration must be at the start of an element",
                        );
                        return false;
                    }
                }
            } else {
                element_start = false;
                match token.value.as_str() {
                    "(" => {
                        if paren_count == 0 {
                            start_paren = Some(i);
                        }
                        paren_count += 1;
                    }
                    ")" => {
                        if paren_count == 0 {
                            token_error(output, tokens, token, "encountered ')' without opening '('");
                            return false;
                        }
                        paren_count -= 1;
                    }
                    "{" => {
                        if brace_count == 0 {
                            start_brace = Some(i);
                        }
                        had_scope = true;
                        brace_count += 1;
                    }
                    "}" => {
                        if brace_count == 0 {
                            token_error(output, tokens, token, "encountered '}' without opening '{'");
                            return false;
                        }
                        brace_count -= 1;
                        // Elements like free functions end on their last
                        // closing brace; block declarations wait for the
                        // trailing semicolon.
                        if brace_count == 0 && !block_keyword {
                            Self::end_element(elements, tokens, &mut stages, &mut range, i);
                            element_start = true;
                            had_scope = false;
                        }
                    }
                    "]" => {
                        if square_count == 0 {
                            token_error(output, tokens, token, "encountered ']' without opening '['");
                            return false;
                        }
                        square_count -= 1;
                        if in_stage_decl && square_count == 0 {
                            in_stage_decl = false;
                            range.start = i + 1;
                        }
                    }
                    ";" if paren_count == 0 && brace_count == 0 && square_count == 0 => {
                        Self::end_element(elements, tokens, &mut stages, &mut range, i);
                        element_start = true;
                        had_scope = false;
                        block_keyword = false;
                    }
                    "uniform" | "buffer" | "struct" | "in" | "out" if !had_scope => {
                        block_keyword = true;
                    }
                    _ => {}
                }
            }

            last = Some(i);
            i += 1;
        }

        // Run the end-of-file checks against the final token.
        let last_token = toks.last().unwrap();
        if paren_count > 0 {
            token_error(
                output,
                tokens,
                last_token,
                "reached end of file without terminating ')'",
            );
            if let Some(idx) = start_paren {
                token_note(output, tokens, &toks[idx], "see opening '('");
            }
            return false;
        }
        if brace_count > 0 {
            token_error(
                output,
                tokens,
                last_token,
                "reached end of file without terminating '}'",
            );
            if let Some(idx) = start_brace {
                token_note(output, tokens, &toks[idx], "see opening '{'");
            }
            return false;
        }
        if square_count > 0 {
            token_error(
                output,
                tokens,
                last_token,
                "reached end of file without terminating ']'",
            );
            if let Some(idx) = start_square {
                token_note(output, tokens, &toks[idx], "see opening '['");
            }
            return false;
        }
        if !element_start {
            eof_error(output, tokens);
            return false;
        }

        true
    }

    fn end_element(
        elements: &mut [[Vec<TokenRange>; STAGE_COUNT]; ELEMENT_COUNT],
        tokens: &TokenList,
        stages: &mut Vec<Stage>,
        range: &mut TokenRange,
        index: usize,
    ) {
        range.count = index + 1 - range.start;
        let element = Self::classify_element(tokens, range);
        for stage in Stage::ALL.iter() {
            if stages.is_empty() || stages.contains(stage) {
                elements[element as usize][stage.index()].push(*range);
            }
        }
        stages.clear();
        range.start = index + 1;
        range.count = 0;
        range.prepend = Prepend::None;
    }

    /// Scan an element for the declarations that need reordering: precision
    /// statements, struct declarations, free uniforms of non-opaque types,
    /// and uniform blocks.
    fn classify_element(tokens: &TokenList, range: &TokenRange) -> Element {
        let toks = tokens.tokens();
        let mut is_uniform = false;
        for token in &toks[range.start..range.start + range.count] {
            match token.value.as_str() {
                "precision" => return Element::Precision,
                "struct" => return Element::Struct,
                "uniform" => is_uniform = true,
                "{" => {
                    return if is_uniform {
                        Element::UniformBlock
                    } else {
                        Element::Default
                    };
                }
                _ => {}
            }
            if is_uniform && is_opaque_type(&token.value) {
                return Element::Default;
            }
        }
        if is_uniform {
            Element::FreeUniform
        } else {
            Element::Default
        }
    }

    fn read_pipeline(
        output: &mut Output,
        tokens: &TokenList,
        pipelines: &[Pipeline],
        i: &mut usize,
    ) -> Option<Pipeline> {
        let toks = tokens.tokens();
        if !skip_whitespace(output, tokens, i) {
            return None;
        }

        let name_token = &toks[*i];
        if name_token.kind != TokenKind::Identifier {
            token_error(
                output,
                tokens,
                name_token,
                format!("unexpected token: '{}', expected identifier", name_token.value),
            );
            return None;
        }
        for other in pipelines {
            if other.name == name_token.value {
                token_error(
                    output,
                    tokens,
                    name_token,
                    format!("pipeline of name '{}' already declared", name_token.value),
                );
                if let Some(other_idx) = other.token {
                    token_note(
                        output,
                        tokens,
                        &toks[other_idx],
                        format!("see other declaration of pipeline '{}'", name_token.value),
                    );
                }
                return None;
            }
        }
        let mut pipeline = Pipeline {
            token: Some(*i),
            name: name_token.value.clone(),
            ..Default::default()
        };

        *i += 1;
        if !skip_whitespace(output, tokens, i) {
            return None;
        }
        if toks[*i].value != "{" {
            token_error(
                output,
                tokens,
                &toks[*i],
                format!("unexpected token: '{}', expected '{{'", toks[*i].value),
            );
            return None;
        }
        *i += 1;

        loop {
            if !skip_whitespace(output, tokens, i) {
                return None;
            }
            match toks[*i].value.as_str() {
                ";" => {
                    *i += 1;
                }
                "}" => {
                    *i += 1;
                    return Some(pipeline);
                }
                _ => {
                    let key_idx = *i;
                    let key = &toks[key_idx];
                    if let Some(stage) = Stage::from_name(&key.value) {
                        // stage = entryPoint;
                        *i += 1;
                        if !skip_whitespace(output, tokens, i) {
                            return None;
                        }
                        if toks[*i].value != "=" {
                            token_error(
                                output,
                                tokens,
                                &toks[*i],
                                format!("unexpected token: '{}', expected '='", toks[*i].value),
                            );
                            return None;
                        }
                        *i += 1;
                        if !skip_whitespace(output, tokens, i) {
                            return None;
                        }
                        if toks[*i].kind != TokenKind::Identifier {
                            token_error(
                                output,
                                tokens,
                                &toks[*i],
                                format!("unexpected token: '{}'", toks[*i].value),
                            );
                            return None;
                        }
                        pipeline.entry_points[stage.index()] = Some(*i);
                        *i += 1;
                        if !skip_whitespace(output, tokens, i) {
                            return None;
                        }
                        if toks[*i].value != ";" {
                            token_error(
                                output,
                                tokens,
                                &toks[*i],
                                format!("unexpected token: '{}'", toks[*i].value),
                            );
                            return None;
                        }
                        *i += 1;
                    } else if values::is_render_state_key(&key.value) {
                        *i += 1;
                        if !skip_whitespace(output, tokens, i) {
                            return None;
                        }
                        if toks[*i].value != "=" {
                            token_error(
                                output,
                                tokens,
                                &toks[*i],
                                format!("unexpected token: '{}', expected '='", toks[*i].value),
                            );
                            return None;
                        }
                        *i += 1;
                        if !values::decode_render_state(
                            output,
                            tokens,
                            i,
                            key,
                            &mut pipeline.render_state,
                        ) {
                            return None;
                        }
                    } else {
                        token_error(
                            output,
                            tokens,
                            key,
                            format!(
                                "unknown pipeline stage or render state name: '{}'",
                                key.value
                            ),
                        );
                        return None;
                    }
                }
            }
        }
    }

    fn read_sampler(
        output: &mut Output,
        tokens: &TokenList,
        samplers: &[Sampler],
        i: &mut usize,
    ) -> Option<Sampler> {
        let toks = tokens.tokens();
        if !skip_whitespace(output, tokens, i) {
            return None;
        }

        let name_token = &toks[*i];
        if name_token.kind != TokenKind::Identifier {
            token_error(
                output,
                tokens,
                name_token,
                format!("unexpected token: '{}', expected identifier", name_token.value),
            );
            return None;
        }
        for other in samplers {
            if other.name == name_token.value {
                token_error(
                    output,
                    tokens,
                    name_token,
                    format!("sampler state of name '{}' already declared", name_token.value),
                );
                token_note(
                    output,
                    tokens,
                    &toks[other.token],
                    format!(
                        "see other declaration of sampler state '{}'",
                        name_token.value
                    ),
                );
                return None;
            }
        }
        let mut sampler = Sampler {
            token: *i,
            name: name_token.value.clone(),
            state: SamplerState::default(),
        };

        *i += 1;
        if !skip_whitespace(output, tokens, i) {
            return None;
        }
        if toks[*i].value != "{" {
            token_error(
                output,
                tokens,
                &toks[*i],
                format!("unexpected token: '{}', expected '{{'", toks[*i].value),
            );
            return None;
        }
        *i += 1;

        loop {
            if !skip_whitespace(output, tokens, i) {
                return None;
            }
            match toks[*i].value.as_str() {
                ";" => {
                    *i += 1;
                }
                "}" => {
                    *i += 1;
                    return Some(sampler);
                }
                _ => {
                    let key_idx = *i;
                    let key = &toks[key_idx];
                    if !values::is_sampler_state_key(&key.value) {
                        token_error(
                            output,
                            tokens,
                            key,
                            format!("unknown sampler state name: '{}'", key.value),
                        );
                        return None;
                    }
                    *i += 1;
                    if !skip_whitespace(output, tokens, i) {
                        return None;
                    }
                    if toks[*i].value != "=" {
                        token_error(
                            output,
                            tokens,
                            &toks[*i],
                            format!("unexpected token: '{}', expected '='", toks[*i].value),
                        );
                        return None;
                    }
                    *i += 1;
                    if !values::decode_sampler_state(output, tokens, i, key, &mut sampler.state) {
                        return None;
                    }
                }
            }
        }
    }

    /// `varying (outStage, inStage) { decls }` re-emits each declaration as
    /// an `out` element of the output stage and an `in` element of the input
    /// stage.
    fn read_varying(
        output: &mut Output,
        tokens: &TokenList,
        varying_idx: usize,
        i: &mut usize,
    ) -> Option<Vec<(Stage, TokenRange)>> {
        let toks = tokens.tokens();
        if !skip_whitespace(output, tokens, i) {
            return None;
        }
        if toks[*i].value != "(" {
            token_error(
                output,
                tokens,
                &toks[*i],
                format!("unexpected token: '{}', expected '('", toks[*i].value),
            );
            return None;
        }
        *i += 1;
        if !skip_whitespace(output, tokens, i) {
            return None;
        }
        let out_stage_token = *i;
        let out_stage = stage_from_token(output, tokens, &toks[*i])?;
        if out_stage == Stage::Compute {
            token_error(
                output,
                tokens,
                &toks[out_stage_token],
                "cannot use compute stage for varying",
            );
            return None;
        }
        *i += 1;
        if !skip_whitespace(output, tokens, i) {
            return None;
        }
        if toks[*i].value != "," {
            token_error(
                output,
                tokens,
                &toks[*i],
                format!("unexpected token: '{}', expected ','", toks[*i].value),
            );
            return None;
        }
        *i += 1;
        if !skip_whitespace(output, tokens, i) {
            return None;
        }
        let in_stage_token = *i;
        let in_stage = stage_from_token(output, tokens, &toks[*i])?;
        if in_stage == Stage::Compute {
            token_error(
                output,
                tokens,
                &toks[in_stage_token],
                "cannot use compute stage for varying",
            );
            return None;
        }
        if out_stage >= in_stage {
            token_error(
                output,
                tokens,
                &toks[varying_idx],
                format!(
                    "varying output stage '{}' not before input stage '{}'",
                    out_stage.name(),
                    in_stage.name()
                ),
            );
            return None;
        }
        *i += 1;
        if !skip_whitespace(output, tokens, i) {
            return None;
        }
        if toks[*i].value != ")" {
            token_error(
                output,
                tokens,
                &toks[*i],
                format!("unexpected token: '{}', expected ')'", toks[*i].value),
            );
            return None;
        }
        *i += 1;
        if !skip_whitespace(output, tokens, i) {
            return None;
        }
        if toks[*i].value != "{" {
            token_error(
                output,
                tokens,
                &toks[*i],
                format!("unexpected token: '{}', expected '{{'", toks[*i].value),
            );
            return None;
        }
        *i += 1;

        let in_prepend = if input_is_array(in_stage) {
            Prepend::InArray
        } else {
            Prepend::In
        };
        let mut decls = Vec::new();
        loop {
            if !skip_whitespace(output, tokens, i) {
                return None;
            }
            if toks[*i].value == "}" {
                *i += 1;
                return Some(decls);
            }

            let start = *i;
            loop {
                if *i >= toks.len() {
                    eof_error(output, tokens);
                    return None;
                }
                let token = &toks[*i];
                if token.value == ";" {
                    break;
                }
                if token.value == "}" {
                    token_error(
                        output,
                        tokens,
                        token,
                        format!("unexpected token: '{}', expected ';'", token.value),
                    );
                    return None;
                }
                *i += 1;
            }
            let count = *i + 1 - start;
            decls.push((
                out_stage,
                TokenRange {
                    prepend: Prepend::Out,
                    start,
                    count,
                },
            ));
            decls.push((
                in_stage,
                TokenRange {
                    prepend: in_prepend,
                    start,
                    count,
                },
            ));
            *i += 1;
        }
    }

    fn read_fragment_inputs(
        output: &mut Output,
        tokens: &TokenList,
        existing: &[FragmentInputGroup],
        i: &mut usize,
    ) -> Option<FragmentInputGroup> {
        let toks = tokens.tokens();
        if !skip_whitespace(output, tokens, i) {
            return None;
        }
        if toks[*i].kind != TokenKind::Identifier {
            token_error(
                output,
                tokens,
                &toks[*i],
                format!("unexpected token: '{}', expected identifier", toks[*i].value),
            );
            return None;
        }
        let type_token = *i;
        *i += 1;
        if !skip_whitespace(output, tokens, i) {
            return None;
        }
        if toks[*i].value != "{" {
            token_error(
                output,
                tokens,
                &toks[*i],
                format!("unexpected token: '{}', expected '{{'", toks[*i].value),
            );
            return None;
        }
        *i += 1;

        let mut inputs: Vec<FragmentInput> = Vec::new();
        loop {
            if !skip_whitespace(output, tokens, i) {
                return None;
            }
            if toks[*i].value == "}" {
                *i += 1;
                break;
            }

            let layout_idx = *i;
            if toks[*i].value != "layout" {
                token_error(
                    output,
                    tokens,
                    &toks[*i],
                    format!("unexpected token: '{}', expected 'layout'", toks[*i].value),
                );
                return None;
            }
            *i += 1;
            if !skip_whitespace(output, tokens, i) {
                return None;
            }
            if toks[*i].value != "(" {
                token_error(
                    output,
                    tokens,
                    &toks[*i],
                    format!("unexpected token: '{}', expected '('", toks[*i].value),
                );
                return None;
            }
            *i += 1;

            let mut attachment_index: Option<(u32, usize)> = None;
            let mut fragment_group: Option<(u32, usize)> = None;
            loop {
                if !skip_whitespace(output, tokens, i) {
                    return None;
                }
                if toks[*i].value == ")" {
                    *i += 1;
                    break;
                }

                let qual_idx = *i;
                let qual = &toks[qual_idx];
                let target = match qual.value.as_str() {
                    "location" => &mut attachment_index,
                    "fragment_group" => &mut fragment_group,
                    _ => {
                        token_error(
                            output,
                            tokens,
                            qual,
                            format!("unexpected layout specifier: '{}'", qual.value),
                        );
                        return None;
                    }
                };
                if let Some((_, prev_idx)) = *target {
                    token_error(
                        output,
                        tokens,
                        qual,
                        format!("fragment input layout '{}' already declared", qual.value),
                    );
                    token_note(
                        output,
                        tokens,
                        &toks[prev_idx],
                        format!("see other declaration of layout '{}'", qual.value),
                    );
                    return None;
                }
                *i += 1;
                if !skip_whitespace(output, tokens, i) {
                    return None;
                }
                if toks[*i].value != "=" {
                    token_error(
                        output,
                        tokens,
                        &toks[*i],
                        format!("unexpected token: '{}', expected '='", toks[*i].value),
                    );
                    return None;
                }
                *i += 1;
                let (text, first) = values::read_layout_value(output, tokens, i)?;
                let value = match values::parse_int_value(&text) {
                    Some(value) => value,
                    None => {
                        let first_token = &toks[first];
                        token_error(
                            output,
                            tokens,
                            first_token,
                            format!("invalid int value: '{}'", text),
                        );
                        return None;
                    }
                };
                *target = Some((value, qual_idx));

                if !skip_whitespace(output, tokens, i) {
                    return None;
                }
                match toks[*i].value.as_str() {
                    "," => {
                        *i += 1;
                    }
                    ")" => {
                        *i += 1;
                        break;
                    }
                    _ => {
                        token_error(
                            output,
                            tokens,
                            &toks[*i],
                            format!(
                                "unexpected token: '{}', expected ',' or ')'",
                                toks[*i].value
                            ),
                        );
                        return None;
                    }
                }
            }

            let (attachment_index, fragment_group) = match (attachment_index, fragment_group) {
                (Some((attachment, _)), Some((group, _))) => (attachment, group),
                _ => {
                    token_error(
                        output,
                        tokens,
                        &toks[layout_idx],
                        "fragment input layout must contain 'layout' and 'fragment_group' \
                         qualifiers",
                    );
                    return None;
                }
            };

            if !skip_whitespace(output, tokens, i) {
                return None;
            }
            if toks[*i].kind != TokenKind::Identifier {
                token_error(
                    output,
                    tokens,
                    &toks[*i],
                    format!("unexpected token: '{}', expected identifier", toks[*i].value),
                );
                return None;
            }
            let member_type_token = *i;
            *i += 1;
            if !skip_whitespace(output, tokens, i) {
                return None;
            }
            if toks[*i].kind != TokenKind::Identifier {
                token_error(
                    output,
                    tokens,
                    &toks[*i],
                    format!("unexpected token: '{}', expected identifier", toks[*i].value),
                );
                return None;
            }
            let member_name_token = *i;
            let member_name = &toks[member_name_token].value;

            let previous = inputs
                .iter()
                .map(|x| x.name_token)
                .chain(
                    existing
                        .iter()
                        .flat_map(|group| group.inputs.iter().map(|x| x.name_token)),
                )
                .find(|&idx| &toks[idx].value == member_name);
            if let Some(prev_idx) = previous {
                token_error(
                    output,
                    tokens,
                    &toks[member_name_token],
                    format!("fragment input member '{}' already declared", member_name),
                );
                token_note(
                    output,
                    tokens,
                    &toks[prev_idx],
                    format!(
                        "see other declaration of fragment input member '{}'",
                        member_name
                    ),
                );
                return None;
            }

            *i += 1;
            if !skip_whitespace(output, tokens, i) {
                return None;
            }
            if toks[*i].value != ";" {
                token_error(
                    output,
                    tokens,
                    &toks[*i],
                    format!("unexpected token: '{}', expected ';'", toks[*i].value),
                );
                return None;
            }
            *i += 1;

            inputs.push(FragmentInput {
                type_token: member_type_token,
                name_token: member_name_token,
                ty: toks[member_type_token].value.clone(),
                name: member_name.clone(),
                attachment_index,
                fragment_group,
                location: None,
            });
        }

        if !skip_whitespace(output, tokens, i) {
            return None;
        }
        if toks[*i].kind != TokenKind::Identifier {
            token_error(
                output,
                tokens,
                &toks[*i],
                format!("unexpected token: '{}', expected identifier", toks[*i].value),
            );
            return None;
        }
        let name_token = *i;
        *i += 1;
        if !skip_whitespace(output, tokens, i) {
            return None;
        }
        if toks[*i].value != ";" {
            token_error(
                output,
                tokens,
                &toks[*i],
                format!("unexpected token: '{}', expected ';'", toks[*i].value),
            );
            return None;
        }
        *i += 1;

        Some(FragmentInputGroup {
            type_token,
            name_token,
            type_name: toks[type_token].value.clone(),
            instance_name: toks[name_token].value.clone(),
            inputs,
        })
    }

    /// Assemble the GLSL for one (pipeline, stage) pair: precision and
    /// struct declarations first, then the synthetic push-constant block
    /// that aggregates free uniforms, then remaining uniform blocks and
    /// everything else. The pipeline's entry point for the stage is renamed
    /// to `main` at global scope.
    pub fn create_shader_string(
        &self,
        pipeline: &Pipeline,
        stage: Stage,
        ignore_entry_point: bool,
        early_fragment_tests: bool,
    ) -> (String, Vec<LineMapping>) {
        let mut out = String::new();
        let mut mappings = Vec::new();
        let si = stage.index();
        let entry = if ignore_entry_point {
            None
        } else {
            pipeline.entry_points[si].map(|idx| &self.tokens.tokens()[idx])
        };

        if early_fragment_tests && stage == Stage::Fragment {
            out.push_str("layout(early_fragment_tests) in;");
            mappings.push(LineMapping::internal());
        }

        let remove_uniform_blocks = self.options.contains(ParseOptions::REMOVE_UNIFORM_BLOCKS);
        let needs_push_constants = !self.elements[Element::FreeUniform as usize][si].is_empty()
            || (remove_uniform_blocks
                && !self.elements[Element::UniformBlock as usize][si].is_empty());

        // Type declarations come first so the push constant can refer to
        // them.
        for range in &self.elements[Element::Precision as usize][si] {
            self.add_element_string(&mut out, &mut mappings, range, entry, stage);
        }
        for range in &self.elements[Element::Struct as usize][si] {
            self.add_element_string(&mut out, &mut mappings, range, entry, stage);
        }

        if needs_push_constants {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str("layout(push_constant) uniform Uniforms\n{");
            mappings.push(LineMapping::internal());
            mappings.push(LineMapping::internal());

            for range in &self.elements[Element::FreeUniform as usize][si] {
                self.add_element_string(&mut out, &mut mappings, range, entry, stage);
            }
            if remove_uniform_blocks {
                for range in &self.elements[Element::UniformBlock as usize][si] {
                    self.add_element_string(&mut out, &mut mappings, range, entry, stage);
                }
            }

            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str("} uniforms;");
            mappings.push(LineMapping::internal());
        }

        if !remove_uniform_blocks {
            for range in &self.elements[Element::UniformBlock as usize][si] {
                self.add_element_string(&mut out, &mut mappings, range, entry, stage);
            }
        }

        for range in &self.elements[Element::Default as usize][si] {
            self.add_element_string(&mut out, &mut mappings, range, entry, stage);
        }

        (out, mappings)
    }

    fn add_element_string(
        &self,
        out: &mut String,
        mappings: &mut Vec<LineMapping>,
        range: &TokenRange,
        entry: Option<&Token>,
        stage: Stage,
    ) {
        if range.count == 0 {
            return;
        }
        if self.remove_uniform_block(out, mappings, range) {
            return;
        }

        let toks = self.tokens.tokens();
        let mut newline = true;
        let mut paren_count = 0usize;
        let mut brace_count = 0usize;
        let mut square_count = 0usize;

        let mut prefix = match range.prepend {
            Prepend::None => None,
            Prepend::In | Prepend::InArray => Some("in "),
            Prepend::Out => Some("out "),
        };
        // Tessellation control outputs are arrayed over vertices even though
        // the varying declaration itself isn't.
        let array_suffix = range.prepend == Prepend::InArray
            || (range.prepend == Prepend::Out && stage == Stage::TessellationControl);

        let end = (range.start + range.count).min(toks.len());
        for token in &toks[range.start..end] {
            if newline && token.kind == TokenKind::Newline {
                continue;
            }

            if newline {
                if !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
                mappings.push(LineMapping {
                    file: self.tokens.token_file(token).to_owned(),
                    line: token.line,
                });
                newline = false;
                if let Some(prefix) = prefix.take() {
                    out.push_str(prefix);
                }
            }

            match token.value.as_str() {
                "(" => paren_count += 1,
                ")" => paren_count = paren_count.saturating_sub(1),
                "{" => brace_count += 1,
                "}" => brace_count = brace_count.saturating_sub(1),
                "[" => square_count += 1,
                "]" => square_count = square_count.saturating_sub(1),
                _ => {}
            }
            if token.kind == TokenKind::Newline {
                newline = true;
            }

            let at_global_scope = paren_count == 0 && brace_count == 0 && square_count == 0;
            if at_global_scope && token.value == ";" && array_suffix {
                out.push_str("[]");
            }
            if at_global_scope && entry.map_or(false, |x| token.value == x.value) {
                out.push_str("main");
            } else {
                out.push_str(&token.value);
            }
        }
    }

    /// When folding uniform blocks into the push constant, emit only the
    /// members of the block, dropping the `uniform Name {` wrapper, the
    /// closing brace, and the trailing semicolon.
    fn remove_uniform_block(
        &self,
        out: &mut String,
        mappings: &mut Vec<LineMapping>,
        range: &TokenRange,
    ) -> bool {
        if !self.options.contains(ParseOptions::REMOVE_UNIFORM_BLOCKS) {
            return false;
        }

        let toks = self.tokens.tokens();
        let mut newline = true;
        let mut processed = false;
        let mut brace_count = 0usize;
        let mut is_uniform = false;
        let end = (range.start + range.count).min(toks.len());
        for token in &toks[range.start..end] {
            if processed {
                match token.value.as_str() {
                    "{" => brace_count += 1,
                    "}" => brace_count = brace_count.saturating_sub(1),
                    _ => {}
                }
                if brace_count == 0 {
                    continue;
                }

                if newline && token.kind == TokenKind::Newline {
                    continue;
                }
                if newline {
                    if !out.is_empty() && !out.ends_with('\n') {
                        out.push('\n');
                    }
                    mappings.push(LineMapping {
                        file: self.tokens.token_file(token).to_owned(),
                        line: token.line,
                    });
                    newline = false;
                }
                if token.kind == TokenKind::Newline {
                    newline = true;
                }
                out.push_str(&token.value);
            } else if token.value == "uniform" {
                is_uniform = true;
            } else if token.value == "{" {
                if !is_uniform {
                    return false;
                }
                processed = true;
                brace_count += 1;
            }
        }

        processed
    }
}
