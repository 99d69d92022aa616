//! Interface location assignment and cross-stage linking.
//!
//! Locations are allocated against a bitmap of four-component slots. A stage
//! either declares every location explicitly or none of them; mixing the two
//! within one interface direction is a linker error.
use mslc_core::output::Output;
use mslc_core::refl::InputOutput;
use mslc_core::stage::{input_is_array, output_is_array, Stage};
use mslc_core::ty::Type;

use crate::reflect::{Origin, SpirvProcessor};

/// Claim `mask` components at `location`, failing on overlap with anything
/// already claimed there.
fn add_components(locations: &mut Vec<u8>, location: usize, mask: u8) -> bool {
    if locations.len() <= location {
        locations.resize(location + 1, 0);
    }
    if locations[location] & mask != 0 {
        return false;
    }
    locations[location] |= mask;
    true
}

/// Claim the location footprint of one interface element starting at
/// `cur_location`, advancing it past the element. Matrices consume one
/// location per column, arrays multiply the footprint, and doubles take two
/// components each.
fn fill_location(
    locations: &mut Vec<u8>,
    cur_location: &mut usize,
    component: u32,
    ty: Type,
    array_elements: &[Option<u32>],
    remove_first_array: bool,
) -> bool {
    if component >= 4 {
        return false;
    }

    let skip = if remove_first_array { 1 } else { 0 };
    let mut element_count = 1u32;
    for length in &array_elements[skip.min(array_elements.len())..] {
        match length {
            Some(length) if *length > 0 => element_count *= length,
            _ => return false,
        }
    }

    // A matrix is laid out as its column vectors.
    let ty = match ty.column_vector() {
        Some(column) => {
            element_count *= ty.column_count();
            column
        }
        None => ty,
    };

    match ty {
        Type::Float | Type::Int | Type::UInt | Type::Bool => {
            for _ in 0..element_count {
                if !add_components(locations, *cur_location, 1 << component) {
                    return false;
                }
                *cur_location += 1;
            }
        }
        Type::Vec2 | Type::IVec2 | Type::UVec2 | Type::BVec2 => {
            if component > 2 {
                return false;
            }
            for _ in 0..element_count {
                if !add_components(locations, *cur_location, 0x3 << component) {
                    return false;
                }
                *cur_location += 1;
            }
        }
        Type::Vec3 | Type::IVec3 | Type::UVec3 | Type::BVec3 => {
            if component > 1 {
                return false;
            }
            for _ in 0..element_count {
                if !add_components(locations, *cur_location, 0x7 << component) {
                    return false;
                }
                *cur_location += 1;
            }
        }
        Type::Vec4 | Type::IVec4 | Type::UVec4 | Type::BVec4 => {
            if component != 0 {
                return false;
            }
            for _ in 0..element_count {
                if !add_components(locations, *cur_location, 0xF) {
                    return false;
                }
                *cur_location += 1;
            }
        }
        Type::Double => {
            if component != 0 && component != 2 {
                return false;
            }
            for _ in 0..element_count {
                if !add_components(locations, *cur_location, 0x3 << component) {
                    return false;
                }
                *cur_location += 1;
            }
        }
        Type::DVec2 => {
            if component != 0 {
                return false;
            }
            for _ in 0..element_count {
                if !add_components(locations, *cur_location, 0xF) {
                    return false;
                }
                *cur_location += 1;
            }
        }
        Type::DVec3 => {
            if component != 0 {
                return false;
            }
            for _ in 0..element_count {
                if !add_components(locations, *cur_location, 0xF) {
                    return false;
                }
                *cur_location += 1;
                if !add_components(locations, *cur_location, 0x3) {
                    return false;
                }
                *cur_location += 1;
            }
        }
        Type::DVec4 => {
            if component != 0 {
                return false;
            }
            for _ in 0..element_count {
                if !add_components(locations, *cur_location, 0xF) {
                    return false;
                }
                *cur_location += 1;
                if !add_components(locations, *cur_location, 0xF) {
                    return false;
                }
                *cur_location += 1;
            }
        }
        _ => return false,
    }

    true
}

fn assign_io(
    output: &mut Output,
    origin: &Origin,
    stage: Stage,
    structs: &[mslc_core::refl::Struct],
    ios: &mut [InputOutput],
    io_name: &str,
    remove_first_array: bool,
) -> bool {
    let mut cur_location = 0usize;
    let mut locations: Vec<u8> = Vec::new();
    let mut has_explicit = false;
    let mut has_implicit = false;

    for io in ios.iter_mut() {
        if let Some(struct_index) = io.struct_index {
            let io_struct = &structs[struct_index as usize];
            let first_explicit = io
                .member_locations
                .first()
                .map_or(false, |x| x.0.is_some());
            if first_explicit {
                has_explicit = true;
            } else if let Some(location) = io.location {
                cur_location = location as usize;
                has_explicit = true;
            } else {
                has_implicit = true;
            }

            for (i, member) in io_struct.members.iter().enumerate() {
                let component;
                if let (Some(location), comp) = io.member_locations[i] {
                    cur_location = location as usize;
                    component = comp;
                } else {
                    component = 0;
                    io.member_locations[i] = (Some(cur_location as u32), component);
                }

                let lengths: Vec<Option<u32>> =
                    member.array_elements.iter().map(|x| x.length).collect();
                if !fill_location(
                    &mut locations,
                    &mut cur_location,
                    component,
                    member.ty,
                    &lengths,
                    false,
                ) {
                    output.error(
                        &origin.file,
                        origin.line,
                        origin.column,
                        format!(
                            "linker error: cannot assign location for {} block element {}.{}",
                            io_name, io_struct.name, member.name
                        ),
                    );
                    return false;
                }
            }
        } else {
            let component;
            if let Some(location) = io.location {
                cur_location = location as usize;
                component = io.component.unwrap_or(0);
                has_explicit = true;
            } else {
                component = 0;
                io.location = Some(cur_location as u32);
                io.component = Some(component);
                has_implicit = true;
            }

            if !fill_location(
                &mut locations,
                &mut cur_location,
                component,
                io.ty,
                &io.array_elements,
                remove_first_array,
            ) {
                output.error(
                    &origin.file,
                    origin.line,
                    origin.column,
                    format!(
                        "linker error: cannot assign location for {} {}",
                        io_name, io.name
                    ),
                );
                return false;
            }
        }
    }

    if has_implicit && has_explicit {
        output.error(
            &origin.file,
            origin.line,
            origin.column,
            format!(
                "linker error: {} declarations mix implicit and explicit locations in stage {}",
                io_name,
                stage.name()
            ),
        );
        return false;
    }

    true
}

/// Array shapes match once each side's stage-arraying dimension is removed.
fn io_arrays_equal(
    output_array: &[Option<u32>],
    remove_first_output: bool,
    input_array: &[Option<u32>],
    remove_first_input: bool,
) -> bool {
    if remove_first_output && output_array.is_empty() {
        return false;
    }
    if remove_first_input && input_array.is_empty() {
        return false;
    }
    let out_skip = if remove_first_output { 1 } else { 0 };
    let in_skip = if remove_first_input { 1 } else { 0 };
    output_array[out_skip..] == input_array[in_skip..]
}

/// Locate the previous stage's output interface-block member carrying
/// `name`. Exactly one member across all output blocks must match.
fn find_linked_member(
    output: &mut Output,
    prev: &SpirvProcessor,
    name: &str,
) -> Option<(usize, usize)> {
    let mut found: Option<(usize, usize)> = None;
    for (i, out) in prev.outputs.iter().enumerate() {
        let struct_index = match out.struct_index {
            Some(x) => x,
            None => continue,
        };
        let out_struct = &prev.structs[struct_index as usize];
        for (j, member) in out_struct.members.iter().enumerate() {
            if member.name == name {
                if found.is_some() {
                    output.error(
                        &prev.origin.file,
                        prev.origin.line,
                        prev.origin.column,
                        format!(
                            "linker error: multiple members from output interface blocks match \
                             the name {} in stage {}",
                            name,
                            prev.stage.name()
                        ),
                    );
                    return None;
                }
                found = Some((i, j));
            }
        }
    }

    if found.is_none() {
        output.error(
            &prev.origin.file,
            prev.origin.line,
            prev.origin.column,
            format!(
                "linker error: cannot find output interface block member with name {} in stage {}",
                name,
                prev.stage.name()
            ),
        );
    }
    found
}

impl<'a> SpirvProcessor<'a> {
    /// Assign implicit locations to the stage's inputs. Only meaningful for
    /// the first stage of a pipeline; later stages take their locations from
    /// [`SpirvProcessor::link_inputs`].
    pub fn assign_inputs(&mut self, output: &mut Output) -> bool {
        let remove_first = input_is_array(self.stage);
        let SpirvProcessor {
            ref origin,
            stage,
            ref structs,
            ref mut inputs,
            ..
        } = *self;
        assign_io(output, origin, stage, structs, inputs, "input", remove_first)
    }

    /// Assign implicit locations to the stage's outputs.
    pub fn assign_outputs(&mut self, output: &mut Output) -> bool {
        let remove_first = output_is_array(self.stage);
        let SpirvProcessor {
            ref origin,
            stage,
            ref structs,
            ref mut outputs,
            ..
        } = *self;
        assign_io(output, origin, stage, structs, outputs, "output", remove_first)
    }

    /// Copy locations from the previous stage's outputs onto this stage's
    /// unassigned inputs, matching scalars by name and interface blocks by
    /// member name, and validating type, patch, and array agreement.
    pub fn link_inputs(&mut self, output: &mut Output, prev: &SpirvProcessor) -> bool {
        let mut success = true;
        let input_arrays = input_is_array(self.stage);
        let output_arrays = output_is_array(prev.stage);

        for input in self.inputs.iter_mut() {
            if let Some(struct_index) = input.struct_index {
                let input_struct = &self.structs[struct_index as usize];
                debug_assert_eq!(input_struct.members.len(), input.member_locations.len());
                for i in 0..input_struct.members.len() {
                    if input.member_locations[i].0.is_some() {
                        continue;
                    }

                    let member = &input_struct.members[i];
                    let (out_index, out_member_index) =
                        match find_linked_member(output, prev, &member.name) {
                            Some(x) => x,
                            None => {
                                success = false;
                                continue;
                            }
                        };

                    let out = &prev.outputs[out_index];
                    let out_struct = &prev.structs[out.struct_index.unwrap() as usize];
                    let out_member = &out_struct.members[out_member_index];
                    let member_lengths: Vec<Option<u32>> =
                        member.array_elements.iter().map(|x| x.length).collect();
                    let out_member_lengths: Vec<Option<u32>> =
                        out_member.array_elements.iter().map(|x| x.length).collect();
                    if member.ty != out_member.ty
                        || input.patch != out.patch
                        || !io_arrays_equal(&out_member_lengths, false, &member_lengths, false)
                    {
                        output.error(
                            &self.origin.file,
                            self.origin.line,
                            self.origin.column,
                            format!(
                                "linker error: type mismatch when linking input member {}.{} \
                                 in stage {}",
                                input_struct.name,
                                member.name,
                                self.stage.name()
                            ),
                        );
                        success = false;
                        continue;
                    }

                    input.member_locations[i] = out.member_locations[out_member_index];
                }
            } else {
                if input.location.is_some() {
                    continue;
                }

                let mut found = false;
                for out in &prev.outputs {
                    if input.name != out.name {
                        continue;
                    }

                    found = true;
                    if input.ty != out.ty
                        || input.patch != out.patch
                        || !io_arrays_equal(
                            &out.array_elements,
                            output_arrays && !out.patch,
                            &input.array_elements,
                            input_arrays && !input.patch,
                        )
                    {
                        output.error(
                            &self.origin.file,
                            self.origin.line,
                            self.origin.column,
                            format!(
                                "linker error: type mismatch when linking input {} in stage {}",
                                input.name,
                                self.stage.name()
                            ),
                        );
                        success = false;
                        break;
                    }

                    input.location = out.location;
                    input.component = out.component;
                    break;
                }

                if !found {
                    output.error(
                        &self.origin.file,
                        self.origin.line,
                        self.origin.column,
                        format!(
                            "linker error: cannot find output with name {} in stage {}",
                            input.name,
                            prev.stage.name()
                        ),
                    );
                    success = false;
                }
            }
        }

        success
    }

    /// Cross-stage uniform and struct compatibility. Uniforms and structs
    /// sharing a name must agree field for field between stages.
    pub fn uniforms_compatible(&self, output: &mut Output, other: &SpirvProcessor) -> bool {
        let mut success = true;

        for uniform in &self.uniforms {
            for other_uniform in &other.uniforms {
                if uniform.name != other_uniform.name {
                    continue;
                }

                let struct_name_mismatch = match (uniform.struct_index, other_uniform.struct_index)
                {
                    (Some(a), Some(b)) => {
                        self.structs[a as usize].name != other.structs[b as usize].name
                    }
                    (None, None) => false,
                    _ => true,
                };
                if uniform.uniform_type != other_uniform.uniform_type
                    || uniform.ty != other_uniform.ty
                    || uniform.array_elements != other_uniform.array_elements
                    || uniform.descriptor_set != other_uniform.descriptor_set
                    || uniform.binding != other_uniform.binding
                    || struct_name_mismatch
                {
                    output.error(
                        &self.origin.file,
                        self.origin.line,
                        self.origin.column,
                        format!(
                            "linker error: uniform {} has different declarations between stages",
                            uniform.name
                        ),
                    );
                    success = false;
                }
                break;
            }
        }

        for entry in &self.structs {
            for other_entry in &other.structs {
                if entry.name != other_entry.name {
                    continue;
                }

                let mut compatible = entry.size == other_entry.size
                    && entry.members.len() == other_entry.members.len();
                if compatible {
                    for (member, other_member) in
                        entry.members.iter().zip(other_entry.members.iter())
                    {
                        let struct_name_mismatch =
                            match (member.struct_index, other_member.struct_index) {
                                (Some(a), Some(b)) => {
                                    self.structs[a as usize].name
                                        != other.structs[b as usize].name
                                }
                                (None, None) => false,
                                _ => true,
                            };
                        if member.name != other_member.name
                            || member.offset != other_member.offset
                            || member.size != other_member.size
                            || member.ty != other_member.ty
                            || member.array_elements != other_member.array_elements
                            || struct_name_mismatch
                        {
                            compatible = false;
                            break;
                        }
                    }
                }

                if !compatible {
                    output.error(
                        &self.origin.file,
                        self.origin.line,
                        self.origin.column,
                        format!(
                            "linker error: struct {} has different declarations between stages",
                            entry.name
                        ),
                    );
                    success = false;
                }
                break;
            }
        }

        success
    }
}
