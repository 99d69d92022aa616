//! SPIR-V re-emission after reflection and linking.
//!
//! The rewriter copies the module instruction by instruction. Inside the
//! debug and annotation sections it can strip debug ops and names, and at
//! the end of the annotation section it appends `Location`/`Component`
//! decorations for every auto-assigned interface variable plus optional
//! placeholder `DescriptorSet`/`Binding` pairs for uniforms that lack them.
//! Everything after the annotation section is copied verbatim.
use fnv::{FnvHashMap as HashMap, FnvHashSet as HashSet};
use num_traits::FromPrimitive;
use spirv::{Decoration, Op};

use mslc_core::error::{ensure, Result};
use mslc_core::parse::{InstructionBuilder, Instrs, HEADER_LEN};
use mslc_core::refl::InputOutput;

use crate::reflect::SpirvProcessor;

/// Placeholder written by `dummy_bindings` so downstream toolchains that
/// demand explicit bindings can proceed; the packager patches in real
/// values.
pub const DUMMY_BINDING: u32 = !0;

/// How much debug information survives the rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strip {
    /// Keep all debug instructions.
    None,
    /// Drop sources, lines, and all names.
    All,
    /// Drop debug info but keep the names reflection refers to.
    AllButReflection,
}

fn push_decoration(result: &mut Vec<u32>, id: u32, deco: Decoration, value: u32) {
    let words = InstructionBuilder::new(Op::Decorate)
        .push(id)
        .push(deco as u32)
        .push(value)
        .into_words();
    result.extend_from_slice(&words);
}

fn push_member_decoration(
    result: &mut Vec<u32>,
    id: u32,
    member: u32,
    deco: Decoration,
    value: u32,
) {
    let words = InstructionBuilder::new(Op::MemberDecorate)
        .push(id)
        .push(member)
        .push(deco as u32)
        .push(value)
        .into_words();
    result.extend_from_slice(&words);
}

/// Emit the location decorations of one auto-assigned interface variable,
/// skipping anything the module already declares.
fn add_io_locations(
    result: &mut Vec<u32>,
    ios: &[InputOutput],
    ids: &[u32],
    struct_ids: &[u32],
    existing_locations: &HashMap<u32, u32>,
    existing_member_locations: &HashMap<u32, Vec<Option<u32>>>,
) {
    for (io, &id) in ios.iter().zip(ids.iter()) {
        if !io.auto_assigned {
            continue;
        }

        if let Some(struct_index) = io.struct_index {
            let ty_id = struct_ids[struct_index as usize];
            let existing = existing_member_locations.get(&ty_id);
            for (member, &(location, component)) in io.member_locations.iter().enumerate() {
                let already_declared = existing
                    .and_then(|x| x.get(member))
                    .map_or(false, |x| x.is_some());
                if already_declared {
                    continue;
                }
                let location = match location {
                    Some(x) => x,
                    None => continue,
                };
                push_member_decoration(result, ty_id, member as u32, Decoration::Location, location);
                if component != 0 {
                    push_member_decoration(
                        result,
                        ty_id,
                        member as u32,
                        Decoration::Component,
                        component,
                    );
                }
            }
        } else if !existing_locations.contains_key(&id) {
            let location = match io.location {
                Some(x) => x,
                None => continue,
            };
            push_decoration(result, id, Decoration::Location, location);
            match io.component {
                Some(component) if component != 0 => {
                    push_decoration(result, id, Decoration::Component, component);
                }
                _ => {}
            }
        }
    }
}

impl<'a> SpirvProcessor<'a> {
    /// Re-emit the borrowed SPIR-V with the requested stripping and the
    /// decorations reflection computed.
    pub fn process(&self, strip: Strip, dummy_bindings: bool) -> Result<Vec<u32>> {
        let mut keep_names: HashSet<u32> = HashSet::default();
        if strip == Strip::AllButReflection {
            keep_names.extend(self.struct_ids.iter().copied());
            keep_names.extend(self.uniform_ids.iter().copied());
            keep_names.extend(self.input_ids.iter().copied());
            keep_names.extend(self.output_ids.iter().copied());
        }

        let mut result = Vec::with_capacity(self.spirv.len());
        result.extend_from_slice(&self.spirv[..HEADER_LEN]);

        let mut locations: HashMap<u32, u32> = HashMap::default();
        let mut member_locations: HashMap<u32, Vec<Option<u32>>> = HashMap::default();

        let mut end_of_annotations = false;
        let mut instrs = Instrs::new(&self.spirv[HEADER_LEN..])?;
        while let Some(instr) = instrs.next()? {
            if end_of_annotations {
                result.extend_from_slice(instr.words());
                continue;
            }

            match instr.op() {
                Some(Op::Source)
                | Some(Op::SourceContinued)
                | Some(Op::SourceExtension)
                | Some(Op::String)
                | Some(Op::Line) => {
                    if strip == Strip::None {
                        result.extend_from_slice(instr.words());
                    }
                }
                Some(Op::Name) | Some(Op::MemberName) => {
                    ensure!(instr.word_count() >= 3, "truncated name instruction");
                    let id = instr.words()[1];
                    if strip == Strip::None
                        || (strip == Strip::AllButReflection && keep_names.contains(&id))
                    {
                        result.extend_from_slice(instr.words());
                    }
                }
                Some(Op::Decorate) => {
                    let words = instr.words();
                    ensure!(words.len() >= 3, "truncated decoration");
                    if Decoration::from_u32(words[2]) == Some(Decoration::Location) {
                        ensure!(words.len() == 4, "truncated location decoration");
                        locations.insert(words[1], words[3]);
                    }
                    result.extend_from_slice(words);
                }
                Some(Op::MemberDecorate) => {
                    let words = instr.words();
                    ensure!(words.len() >= 4, "truncated member decoration");
                    if Decoration::from_u32(words[3]) == Some(Decoration::Location) {
                        ensure!(words.len() == 5, "truncated member location decoration");
                        let members = member_locations.entry(words[1]).or_default();
                        let member = words[2] as usize;
                        if members.len() <= member {
                            members.resize(member + 1, None);
                        }
                        members[member] = Some(words[4]);
                    }
                    result.extend_from_slice(words);
                }
                Some(Op::Capability)
                | Some(Op::Extension)
                | Some(Op::ExtInstImport)
                | Some(Op::MemoryModel)
                | Some(Op::EntryPoint)
                | Some(Op::ExecutionMode)
                | Some(Op::ExecutionModeId)
                | Some(Op::ModuleProcessed)
                | Some(Op::GroupDecorate)
                | Some(Op::GroupMemberDecorate)
                | Some(Op::DecorationGroup) => {
                    result.extend_from_slice(instr.words());
                }
                _ => {
                    // End of the annotation section: append our own
                    // decorations before copying the rest of the module.
                    add_io_locations(
                        &mut result,
                        &self.inputs,
                        &self.input_ids,
                        &self.struct_ids,
                        &locations,
                        &member_locations,
                    );
                    add_io_locations(
                        &mut result,
                        &self.outputs,
                        &self.output_ids,
                        &self.struct_ids,
                        &locations,
                        &member_locations,
                    );

                    if dummy_bindings {
                        for (uniform, &id) in self.uniforms.iter().zip(self.uniform_ids.iter()) {
                            if uniform.struct_index.is_some()
                                && uniform.struct_index == self.push_constant_struct
                            {
                                continue;
                            }
                            if uniform.descriptor_set.is_none() {
                                push_decoration(
                                    &mut result,
                                    id,
                                    Decoration::DescriptorSet,
                                    DUMMY_BINDING,
                                );
                            }
                            if uniform.binding.is_none() {
                                push_decoration(&mut result, id, Decoration::Binding, DUMMY_BINDING);
                            }
                        }
                    }

                    end_of_annotations = true;
                    result.extend_from_slice(instr.words());
                }
            }
        }

        Ok(result)
    }
}
