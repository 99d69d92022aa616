//! SPIR-V reflection: rebuilds the shader interface of one compiled stage.
//!
//! The reflector is a single forward scan over the instruction stream up to
//! the first function definition. It first gathers names, decorations, types,
//! and variables into id-keyed tables, then flattens them into the public
//! reflection model. Struct indices are assigned by first mention, so nested
//! structs always precede the structs that reference them.
use std::collections::BTreeMap;
use std::convert::TryFrom;

use fnv::{FnvHashMap as HashMap, FnvHashSet as HashSet};
use num_traits::FromPrimitive;
use spirv::{Decoration, Dim, Op, StorageClass};

use mslc_core::error::{anyhow, bail, ensure, Result};
use mslc_core::output::Output;
use mslc_core::parse::{Instrs, HEADER_LEN};
use mslc_core::refl::{ArrayInfo, InputOutput, Struct, StructMember, Uniform, UniformType};
use mslc_core::stage::{input_is_array, output_is_array, Stage};
use mslc_core::ty::Type;

use crate::consts::BUILTIN_PREFIX;
use crate::instr::*;

/// Lowest SPIR-V version the processor accepts.
pub const MIN_SPIRV_VERSION: u32 = 0x0001_0000;

/// Source position a stage's linker errors are reported against, typically
/// the pipeline declaration that referenced the stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl Origin {
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Origin {
        Origin {
            file: file.into(),
            line,
            column,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SpirvArrayInfo {
    element_ty_id: u32,
    length: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default)]
struct MemberInfo {
    offset: Option<u32>,
    matrix_stride: Option<u32>,
    row_major: bool,
    builtin: Option<u32>,
    location: Option<u32>,
    component: Option<u32>,
}

/// Everything pulled out of the instruction stream, keyed by result id.
/// Variable tables are ordered maps so reflection output is deterministic
/// across runs.
#[derive(Default)]
struct Intermediate {
    names: HashMap<u32, String>,
    member_names: HashMap<u32, Vec<String>>,

    struct_types: HashMap<u32, Vec<u32>>,
    types: HashMap<u32, Type>,
    members: HashMap<u32, Vec<MemberInfo>>,
    int_constants: HashMap<u32, u32>,
    array_types: HashMap<u32, SpirvArrayInfo>,
    array_strides: HashMap<u32, u32>,
    blocks: HashSet<u32>,
    uniform_buffers: HashSet<u32>,

    descriptor_sets: HashMap<u32, u32>,
    bindings: HashMap<u32, u32>,
    input_attachment_indices: HashMap<u32, u32>,
    locations: HashMap<u32, u32>,
    components: HashMap<u32, u32>,

    pointers: HashMap<u32, u32>,
    patch_vars: HashSet<u32>,
    builtin_vars: HashMap<u32, u32>,
    uniform_vars: BTreeMap<u32, u32>,
    input_vars: BTreeMap<u32, u32>,
    output_vars: BTreeMap<u32, u32>,
    image_vars: BTreeMap<u32, u32>,
    push_constant: Option<(u32, u32)>,
}

/// Reflection view of one stage's SPIR-V. Borrows the word array so the
/// rewriter can re-emit it after locations have been assigned and linked.
#[derive(Debug)]
pub struct SpirvProcessor<'a> {
    pub stage: Stage,
    pub origin: Origin,
    pub spirv: &'a [u32],

    pub structs: Vec<Struct>,
    pub struct_ids: Vec<u32>,
    pub uniforms: Vec<Uniform>,
    pub uniform_ids: Vec<u32>,
    pub inputs: Vec<InputOutput>,
    pub input_ids: Vec<u32>,
    pub outputs: Vec<InputOutput>,
    pub output_ids: Vec<u32>,
    pub push_constant_struct: Option<u32>,
    pub compute_local_size: [u32; 3],
    pub clip_distance_count: u32,
    pub cull_distance_count: u32,
}

fn vector_type(scalar: Type, count: u32) -> Result<Type> {
    let ty = match (scalar, count) {
        (Type::Bool, 2) => Type::BVec2,
        (Type::Bool, 3) => Type::BVec3,
        (Type::Bool, 4) => Type::BVec4,
        (Type::Int, 2) => Type::IVec2,
        (Type::Int, 3) => Type::IVec3,
        (Type::Int, 4) => Type::IVec4,
        (Type::UInt, 2) => Type::UVec2,
        (Type::UInt, 3) => Type::UVec3,
        (Type::UInt, 4) => Type::UVec4,
        (Type::Float, 2) => Type::Vec2,
        (Type::Float, 3) => Type::Vec3,
        (Type::Float, 4) => Type::Vec4,
        (Type::Double, 2) => Type::DVec2,
        (Type::Double, 3) => Type::DVec3,
        (Type::Double, 4) => Type::DVec4,
        _ => bail!("unsupported vector type"),
    };
    Ok(ty)
}

fn matrix_type(column: Type, count: u32) -> Result<Type> {
    let ty = match (column, count) {
        (Type::Vec2, 2) => Type::Mat2,
        (Type::Vec2, 3) => Type::Mat3x2,
        (Type::Vec2, 4) => Type::Mat4x2,
        (Type::Vec3, 2) => Type::Mat2x3,
        (Type::Vec3, 3) => Type::Mat3,
        (Type::Vec3, 4) => Type::Mat4x3,
        (Type::Vec4, 2) => Type::Mat2x4,
        (Type::Vec4, 3) => Type::Mat3x4,
        (Type::Vec4, 4) => Type::Mat4,
        (Type::DVec2, 2) => Type::DMat2,
        (Type::DVec2, 3) => Type::DMat3x2,
        (Type::DVec2, 4) => Type::DMat4x2,
        (Type::DVec3, 2) => Type::DMat2x3,
        (Type::DVec3, 3) => Type::DMat3,
        (Type::DVec3, 4) => Type::DMat4x3,
        (Type::DVec4, 2) => Type::DMat2x4,
        (Type::DVec4, 3) => Type::DMat3x4,
        (Type::DVec4, 4) => Type::DMat4,
        _ => bail!("unsupported matrix type"),
    };
    Ok(ty)
}

/// Map an `OpTypeImage` to the reflection type. `sampled == 2` selects the
/// storage image family, a depth hint of 1 the shadow sampler family.
fn image_type(
    scalar: Type,
    dim: Dim,
    depth: u32,
    arrayed: bool,
    ms: bool,
    sampled: u32,
) -> Result<Type> {
    use Type::*;
    let storage = sampled == 2;
    let ty = match dim {
        Dim::Dim1D => match scalar {
            Float if !storage && depth == 1 => {
                if arrayed {
                    Sampler1DArrayShadow
                } else {
                    Sampler1DShadow
                }
            }
            Float if !storage => {
                if arrayed {
                    Sampler1DArray
                } else {
                    Sampler1D
                }
            }
            Float => {
                if arrayed {
                    Image1DArray
                } else {
                    Image1D
                }
            }
            Int if !storage => {
                if arrayed {
                    ISampler1DArray
                } else {
                    ISampler1D
                }
            }
            Int => {
                if arrayed {
                    IImage1DArray
                } else {
                    IImage1D
                }
            }
            UInt if !storage => {
                if arrayed {
                    USampler1DArray
                } else {
                    USampler1D
                }
            }
            UInt => {
                if arrayed {
                    UImage1DArray
                } else {
                    UImage1D
                }
            }
            _ => bail!("unsupported 1D image type"),
        },
        Dim::Dim2D => match scalar {
            Float if !storage && depth == 1 => {
                if arrayed {
                    Sampler2DArrayShadow
                } else {
                    Sampler2DShadow
                }
            }
            Float if !storage => match (ms, arrayed) {
                (true, true) => Sampler2DMSArray,
                (true, false) => Sampler2DMS,
                (false, true) => Sampler2DArray,
                (false, false) => Sampler2D,
            },
            Float => match (ms, arrayed) {
                (true, true) => Image2DMSArray,
                (true, false) => Image2DMS,
                (false, true) => Image2DArray,
                (false, false) => Image2D,
            },
            Int if !storage => match (ms, arrayed) {
                (true, true) => ISampler2DMSArray,
                (true, false) => ISampler2DMS,
                (false, true) => ISampler2DArray,
                (false, false) => ISampler2D,
            },
            Int => match (ms, arrayed) {
                (true, true) => IImage2DMSArray,
                (true, false) => IImage2DMS,
                (false, true) => IImage2DArray,
                (false, false) => IImage2D,
            },
            UInt if !storage => match (ms, arrayed) {
                (true, true) => USampler2DMSArray,
                (true, false) => USampler2DMS,
                (false, true) => USampler2DArray,
                (false, false) => USampler2D,
            },
            UInt => match (ms, arrayed) {
                (true, true) => UImage2DMSArray,
                (true, false) => UImage2DMS,
                (false, true) => UImage2DArray,
                (false, false) => UImage2D,
            },
            _ => bail!("unsupported 2D image type"),
        },
        Dim::Dim3D => match (scalar, storage) {
            (Float, false) => Sampler3D,
            (Float, true) => Image3D,
            (Int, false) => ISampler3D,
            (Int, true) => IImage3D,
            (UInt, false) => USampler3D,
            (UInt, true) => UImage3D,
            _ => bail!("unsupported 3D image type"),
        },
        Dim::DimCube => match (scalar, storage) {
            (Float, false) => {
                if depth == 1 {
                    SamplerCubeShadow
                } else {
                    SamplerCube
                }
            }
            (Float, true) => ImageCube,
            (Int, false) => ISamplerCube,
            (Int, true) => IImageCube,
            (UInt, false) => USamplerCube,
            (UInt, true) => UImageCube,
            _ => bail!("unsupported cube image type"),
        },
        Dim::DimRect => match (scalar, storage) {
            (Float, false) => {
                if depth == 1 {
                    Sampler2DRectShadow
                } else {
                    Sampler2DRect
                }
            }
            (Float, true) => Image2DRect,
            (Int, false) => ISampler2DRect,
            (Int, true) => IImage2DRect,
            (UInt, false) => USampler2DRect,
            (UInt, true) => UImage2DRect,
            _ => bail!("unsupported rect image type"),
        },
        Dim::DimBuffer => {
            if storage {
                ImageBuffer
            } else {
                SamplerBuffer
            }
        }
        Dim::DimSubpassData => {
            ensure!(storage && !arrayed, "malformed subpass input type");
            match (scalar, ms) {
                (Float, false) => SubpassInput,
                (Float, true) => SubpassInputMS,
                (Int, false) => ISubpassInput,
                (Int, true) => ISubpassInputMS,
                (UInt, false) => USubpassInput,
                (UInt, true) => USubpassInputMS,
                _ => bail!("unsupported subpass input type"),
            }
        }
    };
    Ok(ty)
}

/// Strip array wrappers from a type id.
fn underlying_type_id(data: &Intermediate, mut ty_id: u32) -> u32 {
    while let Some(info) = data.array_types.get(&ty_id) {
        ty_id = info.element_ty_id;
    }
    ty_id
}

fn array_lengths(array_elements: &[ArrayInfo]) -> Vec<Option<u32>> {
    array_elements.iter().map(|x| x.length).collect()
}

/// Resolve a type id to a reflection type, peeling array dimensions
/// outermost-first and materializing structs on first mention.
fn resolve_type(
    structs: &mut Vec<Struct>,
    struct_ids: &mut Vec<u32>,
    data: &Intermediate,
    mut ty_id: u32,
    array_elements: &mut Vec<ArrayInfo>,
) -> Result<(Type, Option<u32>)> {
    array_elements.clear();
    while let Some(info) = data.array_types.get(&ty_id) {
        array_elements.push(ArrayInfo {
            length: info.length,
            stride: data.array_strides.get(&ty_id).copied(),
        });
        ty_id = info.element_ty_id;
    }

    let member_ty_ids = match data.struct_types.get(&ty_id) {
        Some(member_ty_ids) => member_ty_ids,
        None => {
            let ty = data
                .types
                .get(&ty_id)
                .copied()
                .ok_or_else(|| anyhow!("unresolved type id {}", ty_id))?;
            return Ok((ty, None));
        }
    };

    if let Some(index) = struct_ids.iter().position(|&x| x == ty_id) {
        return Ok((Type::Struct, Some(index as u32)));
    }

    // First mention of this struct; build it.
    let name = data
        .names
        .get(&ty_id)
        .cloned()
        .ok_or_else(|| anyhow!("struct {} has no name", ty_id))?;
    let member_names = data
        .member_names
        .get(&ty_id)
        .ok_or_else(|| anyhow!("struct {} has no member names", name))?;
    ensure!(
        member_names.len() == member_ty_ids.len(),
        "struct {} member names are incomplete",
        name
    );
    let member_infos = data.members.get(&ty_id);

    let mut members = Vec::with_capacity(member_ty_ids.len());
    for (i, &member_ty_id) in member_ty_ids.iter().enumerate() {
        let info = member_infos.and_then(|x| x.get(i)).copied().unwrap_or_default();
        let mut member_arrays = Vec::new();
        let (ty, struct_index) =
            resolve_type(structs, struct_ids, data, member_ty_id, &mut member_arrays)?;

        let mut member = StructMember {
            name: member_names[i].clone(),
            offset: info.offset,
            size: None,
            ty,
            struct_index,
            array_elements: member_arrays,
            row_major: false,
        };
        if !member.array_elements.is_empty() {
            // Outermost dimension's stride times its length.
            let outer = data
                .array_types
                .get(&member_ty_id)
                .ok_or_else(|| anyhow!("broken array member in struct {}", name))?;
            member.size = match (outer.length, data.array_strides.get(&member_ty_id)) {
                (Some(length), Some(&stride)) => Some(stride * length),
                _ => None,
            };
        } else if member.ty.is_matrix() {
            member.row_major = info.row_major;
            let vectors = if info.row_major {
                member.ty.row_count()
            } else {
                member.ty.column_count()
            };
            member.size = info.matrix_stride.map(|x| x * vectors);
        } else if member.ty == Type::Struct {
            member.size = structs[member.struct_index.unwrap() as usize].size;
        } else {
            member.size = member.ty.fixed_size();
        }
        members.push(member);
    }

    // Size is derived from the last member, 16-byte aligned; a runtime array
    // at the end leaves the size unknown.
    let size = match members.last() {
        None => Some(0),
        Some(last) => match (last.offset, last.size) {
            (Some(offset), Some(size)) => Some((offset + size + 15) / 16 * 16),
            _ => None,
        },
    };

    structs.push(Struct {
        name,
        size,
        members,
    });
    struct_ids.push(ty_id);
    Ok((Type::Struct, Some(struct_ids.len() as u32 - 1)))
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum IoRole {
    Input,
    Output,
}

impl IoRole {
    fn name(self) -> &'static str {
        match self {
            IoRole::Input => "input",
            IoRole::Output => "output",
        }
    }
}

impl<'a> SpirvProcessor<'a> {
    /// Build the reflection view of a compiled stage. Corrupted SPIR-V is an
    /// `Err`; interface violations also report a linker error to `output`.
    /// No partial reflection is exposed on failure.
    pub fn extract(
        output: &mut Output,
        origin: Origin,
        spirv: &'a [u32],
        stage: Stage,
    ) -> Result<SpirvProcessor<'a>> {
        ensure!(spirv.len() > HEADER_LEN, "spirv module is truncated");
        ensure!(spirv[0] == spirv::MAGIC_NUMBER, "spirv magic number mismatch");
        let max_version =
            ((spirv::MAJOR_VERSION as u32) << 16) | ((spirv::MINOR_VERSION as u32) << 8);
        ensure!(
            spirv[1] >= MIN_SPIRV_VERSION && spirv[1] <= max_version,
            "unsupported spirv version {:#x}",
            spirv[1]
        );

        let mut processor = SpirvProcessor {
            stage,
            origin,
            spirv,
            structs: Vec::new(),
            struct_ids: Vec::new(),
            uniforms: Vec::new(),
            uniform_ids: Vec::new(),
            inputs: Vec::new(),
            input_ids: Vec::new(),
            outputs: Vec::new(),
            output_ids: Vec::new(),
            push_constant_struct: None,
            compute_local_size: [1, 1, 1],
            clip_distance_count: 0,
            cull_distance_count: 0,
        };

        let mut data = Intermediate::default();
        processor.scan(&mut data)?;

        processor.add_uniforms(&data)?;
        let mut io_structs = HashSet::default();
        processor.add_inputs_outputs(output, &data, &mut io_structs, IoRole::Input)?;
        processor.add_inputs_outputs(output, &data, &mut io_structs, IoRole::Output)?;
        processor.add_push_constants(&data)?;
        processor.check_names(output)?;
        Ok(processor)
    }

    /// Forward scan of the instruction stream, stopping at the first
    /// function definition.
    fn scan(&mut self, data: &mut Intermediate) -> Result<()> {
        let words = self.spirv;
        let mut instrs = Instrs::new(&words[HEADER_LEN..])?;
        while let Some(instr) = instrs.next()? {
            let op = match instr.op() {
                Some(op) => op,
                None => continue,
            };
            match op {
                Op::Name => {
                    let op = OpName::try_from(&instr)?;
                    data.names.insert(op.target_id, op.name);
                }
                Op::MemberName => {
                    let op = OpMemberName::try_from(&instr)?;
                    let names = data.member_names.entry(op.target_id).or_default();
                    if names.len() <= op.member_idx as usize {
                        names.resize(op.member_idx as usize + 1, String::new());
                    }
                    names[op.member_idx as usize] = op.name;
                }
                Op::Decorate => {
                    let op = OpDecorate::try_from(&instr)?;
                    let id = op.target_id;
                    let param = op.params.first().copied();
                    match Decoration::from_u32(op.deco) {
                        Some(Decoration::DescriptorSet) => {
                            data.descriptor_sets
                                .insert(id, param.ok_or_else(missing_operand)?);
                        }
                        Some(Decoration::Binding) => {
                            data.bindings.insert(id, param.ok_or_else(missing_operand)?);
                        }
                        Some(Decoration::InputAttachmentIndex) => {
                            data.input_attachment_indices
                                .insert(id, param.ok_or_else(missing_operand)?);
                        }
                        Some(Decoration::Location) => {
                            data.locations.insert(id, param.ok_or_else(missing_operand)?);
                        }
                        Some(Decoration::Component) => {
                            data.components
                                .insert(id, param.ok_or_else(missing_operand)?);
                        }
                        Some(Decoration::ArrayStride) => {
                            data.array_strides
                                .insert(id, param.ok_or_else(missing_operand)?);
                        }
                        Some(Decoration::Block) => {
                            data.blocks.insert(id);
                        }
                        Some(Decoration::BufferBlock) => {
                            data.uniform_buffers.insert(id);
                        }
                        Some(Decoration::Patch) => {
                            data.patch_vars.insert(id);
                        }
                        Some(Decoration::BuiltIn) => {
                            data.builtin_vars
                                .insert(id, param.ok_or_else(missing_operand)?);
                        }
                        _ => {}
                    }
                }
                Op::MemberDecorate => {
                    let op = OpMemberDecorate::try_from(&instr)?;
                    let members = data.members.entry(op.target_id).or_default();
                    if members.len() <= op.member_idx as usize {
                        members.resize(op.member_idx as usize + 1, MemberInfo::default());
                    }
                    let member = &mut members[op.member_idx as usize];
                    let param = op.params.first().copied();
                    match Decoration::from_u32(op.deco) {
                        Some(Decoration::Offset) => {
                            member.offset = Some(param.ok_or_else(missing_operand)?);
                        }
                        Some(Decoration::MatrixStride) => {
                            member.matrix_stride = Some(param.ok_or_else(missing_operand)?);
                        }
                        Some(Decoration::Location) => {
                            member.location = Some(param.ok_or_else(missing_operand)?);
                        }
                        Some(Decoration::Component) => {
                            member.component = Some(param.ok_or_else(missing_operand)?);
                        }
                        Some(Decoration::RowMajor) => member.row_major = true,
                        Some(Decoration::ColMajor) => member.row_major = false,
                        Some(Decoration::BuiltIn) => {
                            member.builtin = Some(param.ok_or_else(missing_operand)?);
                        }
                        _ => {}
                    }
                }
                Op::Constant => {
                    let op = OpConstant::try_from(&instr)?;
                    match data.types.get(&op.ty_id) {
                        Some(Type::Int) | Some(Type::UInt) => {
                            let value = op.value.first().ok_or_else(missing_operand)?;
                            data.int_constants.insert(op.const_id, *value);
                        }
                        _ => {}
                    }
                }
                Op::TypeBool => {
                    let op = OpTypeBool::try_from(&instr)?;
                    data.types.insert(op.ty_id, Type::Bool);
                }
                Op::TypeInt => {
                    let op = OpTypeInt::try_from(&instr)?;
                    ensure!(op.bits == 32, "unsupported integer width {}", op.bits);
                    let ty = if op.is_signed { Type::Int } else { Type::UInt };
                    data.types.insert(op.ty_id, ty);
                }
                Op::TypeFloat => {
                    let op = OpTypeFloat::try_from(&instr)?;
                    let ty = match op.bits {
                        32 => Type::Float,
                        64 => Type::Double,
                        bits => bail!("unsupported float width {}", bits),
                    };
                    data.types.insert(op.ty_id, ty);
                }
                Op::TypeVector => {
                    let op = OpTypeVector::try_from(&instr)?;
                    let scalar = data
                        .types
                        .get(&op.scalar_ty_id)
                        .copied()
                        .ok_or_else(|| anyhow!("broken vector type"))?;
                    data.types
                        .insert(op.ty_id, vector_type(scalar, op.nscalar)?);
                }
                Op::TypeMatrix => {
                    let op = OpTypeMatrix::try_from(&instr)?;
                    let column = data
                        .types
                        .get(&op.vector_ty_id)
                        .copied()
                        .ok_or_else(|| anyhow!("broken matrix type"))?;
                    data.types
                        .insert(op.ty_id, matrix_type(column, op.nvector)?);
                }
                Op::TypeImage => {
                    let op = OpTypeImage::try_from(&instr)?;
                    let scalar = data
                        .types
                        .get(&op.scalar_ty_id)
                        .copied()
                        .ok_or_else(|| anyhow!("broken image type"))?;
                    let ty = image_type(
                        scalar,
                        op.dim,
                        op.is_depth,
                        op.is_array,
                        op.is_multisampled,
                        op.is_sampled,
                    )?;
                    data.types.insert(op.ty_id, ty);
                }
                Op::TypeSampledImage => {
                    let op = OpTypeSampledImage::try_from(&instr)?;
                    let ty = data
                        .types
                        .get(&op.image_ty_id)
                        .copied()
                        .ok_or_else(|| anyhow!("broken sampled image type"))?;
                    data.types.insert(op.ty_id, ty);
                }
                Op::TypeArray => {
                    let op = OpTypeArray::try_from(&instr)?;
                    let length = data
                        .int_constants
                        .get(&op.nelement_const_id)
                        .copied()
                        .ok_or_else(|| anyhow!("array length is not an integer constant"))?;
                    data.array_types.insert(
                        op.ty_id,
                        SpirvArrayInfo {
                            element_ty_id: op.element_ty_id,
                            length: Some(length),
                        },
                    );
                }
                Op::TypeRuntimeArray => {
                    let op = OpTypeRuntimeArray::try_from(&instr)?;
                    data.array_types.insert(
                        op.ty_id,
                        SpirvArrayInfo {
                            element_ty_id: op.element_ty_id,
                            length: None,
                        },
                    );
                }
                Op::TypeStruct => {
                    let op = OpTypeStruct::try_from(&instr)?;
                    data.struct_types
                        .insert(op.ty_id, op.member_ty_ids.to_vec());
                }
                Op::TypePointer => {
                    let op = OpTypePointer::try_from(&instr)?;
                    match StorageClass::from_u32(op.store_cls) {
                        Some(StorageClass::Input)
                        | Some(StorageClass::Output)
                        | Some(StorageClass::Uniform)
                        | Some(StorageClass::Image)
                        | Some(StorageClass::UniformConstant)
                        | Some(StorageClass::PushConstant) => {
                            let known = data.types.contains_key(&op.target_ty_id)
                                || data.array_types.contains_key(&op.target_ty_id)
                                || data.struct_types.contains_key(&op.target_ty_id);
                            if known {
                                data.pointers.insert(op.ty_id, op.target_ty_id);
                            }
                        }
                        _ => {}
                    }
                }
                Op::Variable => {
                    let op = OpVariable::try_from(&instr)?;
                    let store_cls = match StorageClass::from_u32(op.store_cls) {
                        Some(x) => x,
                        None => continue,
                    };
                    match store_cls {
                        StorageClass::Input
                        | StorageClass::Output
                        | StorageClass::Uniform
                        | StorageClass::Image
                        | StorageClass::UniformConstant
                        | StorageClass::PushConstant => {}
                        _ => continue,
                    }
                    let pointee = data
                        .pointers
                        .get(&op.ty_id)
                        .copied()
                        .ok_or_else(|| anyhow!("variable has no pointer type"))?;
                    match store_cls {
                        StorageClass::Input => {
                            data.input_vars.insert(op.var_id, pointee);
                        }
                        StorageClass::Output => {
                            data.output_vars.insert(op.var_id, pointee);
                        }
                        StorageClass::Uniform => {
                            data.uniform_vars.insert(op.var_id, pointee);
                        }
                        StorageClass::Image => {
                            data.image_vars.insert(op.var_id, pointee);
                        }
                        StorageClass::UniformConstant => {
                            let underlying = underlying_type_id(data, pointee);
                            let opaque = data
                                .types
                                .get(&underlying)
                                .map_or(false, |x| x.is_opaque());
                            if opaque {
                                data.image_vars.insert(op.var_id, pointee);
                            }
                        }
                        StorageClass::PushConstant => {
                            ensure!(
                                data.push_constant.is_none(),
                                "multiple push constant blocks declared"
                            );
                            data.push_constant = Some((op.var_id, pointee));
                        }
                        _ => unreachable!(),
                    }
                }
                Op::ExecutionMode => {
                    let op = OpExecutionMode::try_from(&instr)?;
                    if op.mode == spirv::ExecutionMode::LocalSize as u32 {
                        ensure!(op.params.len() == 3, "malformed LocalSize execution mode");
                        self.compute_local_size = [op.params[0], op.params[1], op.params[2]];
                    }
                }
                Op::Function => break,
                _ => {}
            }
        }
        Ok(())
    }

    fn add_uniforms(&mut self, data: &Intermediate) -> Result<()> {
        let mut array_elements = Vec::new();

        if let Some((var_id, ty_id)) = data.push_constant {
            let (ty, struct_index) = resolve_type(
                &mut self.structs,
                &mut self.struct_ids,
                data,
                ty_id,
                &mut array_elements,
            )?;
            ensure!(ty == Type::Struct, "push constant is not a struct");
            let struct_index = struct_index.unwrap();
            self.uniform_ids.push(var_id);
            self.uniforms.push(Uniform {
                name: self.structs[struct_index as usize].name.clone(),
                uniform_type: UniformType::PushConstant,
                ty,
                struct_index: Some(struct_index),
                array_elements: array_elements.clone(),
                descriptor_set: None,
                binding: None,
                input_attachment_index: None,
                sampler_index: None,
            });
        }

        for (&var_id, &ty_id) in &data.uniform_vars {
            let underlying = underlying_type_id(data, ty_id);
            let (ty, struct_index) = resolve_type(
                &mut self.structs,
                &mut self.struct_ids,
                data,
                ty_id,
                &mut array_elements,
            )?;
            let name = if let Some(index) = struct_index {
                self.structs[index as usize].name.clone()
            } else {
                data.names
                    .get(&var_id)
                    .cloned()
                    .ok_or_else(|| anyhow!("uniform variable has no name"))?
            };
            let uniform_type = if data.blocks.contains(&underlying) {
                UniformType::Block
            } else if data.uniform_buffers.contains(&underlying) {
                UniformType::BlockBuffer
            } else {
                bail!("uniform {} is neither a block nor a buffer", name);
            };
            self.uniform_ids.push(var_id);
            self.uniforms.push(Uniform {
                name,
                uniform_type,
                ty,
                struct_index,
                array_elements: array_elements.clone(),
                descriptor_set: data.descriptor_sets.get(&var_id).copied(),
                binding: data.bindings.get(&var_id).copied(),
                input_attachment_index: None,
                sampler_index: None,
            });
        }

        for (&var_id, &ty_id) in &data.image_vars {
            let name = data
                .names
                .get(&var_id)
                .cloned()
                .ok_or_else(|| anyhow!("image variable has no name"))?;
            let (ty, struct_index) = resolve_type(
                &mut self.structs,
                &mut self.struct_ids,
                data,
                ty_id,
                &mut array_elements,
            )?;
            let uniform_type = if ty.is_sampled_image() {
                UniformType::SampledImage
            } else if ty.is_subpass_input() {
                UniformType::SubpassInput
            } else {
                UniformType::Image
            };
            self.uniform_ids.push(var_id);
            self.uniforms.push(Uniform {
                name,
                uniform_type,
                ty,
                struct_index,
                array_elements: array_elements.clone(),
                descriptor_set: data.descriptor_sets.get(&var_id).copied(),
                binding: data.bindings.get(&var_id).copied(),
                input_attachment_index: data.input_attachment_indices.get(&var_id).copied(),
                sampler_index: None,
            });
        }
        Ok(())
    }

    fn add_inputs_outputs(
        &mut self,
        output: &mut Output,
        data: &Intermediate,
        io_structs: &mut HashSet<u32>,
        role: IoRole,
    ) -> Result<()> {
        let vars = match role {
            IoRole::Input => &data.input_vars,
            IoRole::Output => &data.output_vars,
        };
        let should_be_array_stage = match role {
            IoRole::Input => input_is_array(self.stage),
            IoRole::Output => output_is_array(self.stage),
        };

        let mut ios = Vec::with_capacity(vars.len());
        let mut ids = Vec::with_capacity(vars.len());
        let mut array_elements = Vec::new();
        for (&var_id, &ty_id) in vars {
            let underlying = underlying_type_id(data, ty_id);
            let name = data
                .names
                .get(&var_id)
                .cloned()
                .ok_or_else(|| anyhow!("interface variable has no name"))?;
            let (ty, struct_index) = resolve_type(
                &mut self.structs,
                &mut self.struct_ids,
                data,
                ty_id,
                &mut array_elements,
            )?;
            let mut io = InputOutput {
                name,
                ty,
                struct_index,
                array_elements: array_lengths(&array_elements),
                member_locations: Vec::new(),
                patch: data.patch_vars.contains(&var_id),
                auto_assigned: true,
                location: None,
                component: None,
            };

            if let Some(struct_index) = struct_index {
                let struct_ty_id = self.struct_ids[struct_index as usize];
                let member_infos = data.members.get(&struct_ty_id);

                // Built-in interface blocks like gl_PerVertex are invisible
                // to reflection, but their clip/cull distance members still
                // size the pipeline's distance arrays.
                if let Some(infos) = member_infos {
                    if infos.first().and_then(|x| x.builtin).is_some() {
                        self.collect_builtin_block_distances(struct_index, infos);
                        continue;
                    }
                }

                let io_struct = &self.structs[struct_index as usize];
                if !io_structs.insert(underlying) {
                    output.error(
                        &self.origin.file,
                        self.origin.line,
                        self.origin.column,
                        format!(
                            "linker error: struct {} is used for multiple inputs and outputs",
                            io_struct.name
                        ),
                    );
                    bail!("invalid stage interface");
                }
                for member in &io_struct.members {
                    if member.ty == Type::Struct {
                        output.error(
                            &self.origin.file,
                            self.origin.line,
                            self.origin.column,
                            format!(
                                "linker error: {} member {}.{} is a struct",
                                role.name(),
                                io_struct.name,
                                member.name
                            ),
                        );
                        bail!("invalid stage interface");
                    }
                }

                let should_be_array = !io.patch && should_be_array_stage;
                if io.array_elements.is_empty() == should_be_array {
                    let requirement = if should_be_array {
                        "must be an array"
                    } else {
                        "must not be an array"
                    };
                    output.error(
                        &self.origin.file,
                        self.origin.line,
                        self.origin.column,
                        format!(
                            "linker error: {} interface block {} {}",
                            role.name(),
                            io_struct.name,
                            requirement
                        ),
                    );
                    bail!("invalid stage interface");
                }

                io.member_locations = vec![(None, 0); io_struct.members.len()];
                if let Some(infos) = member_infos {
                    ensure!(
                        infos.len() <= io.member_locations.len(),
                        "malformed interface block decorations"
                    );
                    for (j, info) in infos.iter().enumerate() {
                        if let Some(location) = info.location {
                            io.auto_assigned = false;
                            io.member_locations[j] =
                                (Some(location), info.component.unwrap_or(0));
                        }
                    }
                }
                if let Some(&location) = data.locations.get(&var_id) {
                    io.location = Some(location);
                    io.auto_assigned = false;
                }
            } else {
                if let Some(&builtin) = data.builtin_vars.get(&var_id) {
                    self.collect_builtin_distances(builtin, ty, &io.array_elements);
                    continue;
                }
                io.component = Some(0);
                if let Some(&location) = data.locations.get(&var_id) {
                    io.auto_assigned = false;
                    io.location = Some(location);
                    if let Some(&component) = data.components.get(&var_id) {
                        io.component = Some(component);
                    }
                }
            }

            ios.push(io);
            ids.push(var_id);
        }

        match role {
            IoRole::Input => {
                self.inputs = ios;
                self.input_ids = ids;
            }
            IoRole::Output => {
                self.outputs = ios;
                self.output_ids = ids;
            }
        }
        Ok(())
    }

    fn collect_builtin_distances(&mut self, builtin: u32, ty: Type, arrays: &[Option<u32>]) {
        if ty != Type::Float {
            return;
        }
        let count = match arrays.first() {
            Some(&Some(count)) => count,
            _ => return,
        };
        if builtin == spirv::BuiltIn::ClipDistance as u32 {
            self.clip_distance_count = count;
        } else if builtin == spirv::BuiltIn::CullDistance as u32 {
            self.cull_distance_count = count;
        }
    }

    fn collect_builtin_block_distances(&mut self, struct_index: u32, infos: &[MemberInfo]) {
        let members = self.structs[struct_index as usize].members.clone();
        for (member, info) in members.iter().zip(infos.iter()) {
            if let Some(builtin) = info.builtin {
                let lengths: Vec<Option<u32>> =
                    member.array_elements.iter().map(|x| x.length).collect();
                self.collect_builtin_distances(builtin, member.ty, &lengths);
            }
        }
    }

    fn add_push_constants(&mut self, data: &Intermediate) -> Result<()> {
        let ty_id = match data.push_constant {
            Some((_, ty_id)) => ty_id,
            None => return Ok(()),
        };
        let mut array_elements = Vec::new();
        let (ty, struct_index) = resolve_type(
            &mut self.structs,
            &mut self.struct_ids,
            data,
            ty_id,
            &mut array_elements,
        )?;
        ensure!(
            ty == Type::Struct && array_elements.is_empty(),
            "push constant is not a plain struct"
        );
        self.push_constant_struct = struct_index;
        Ok(())
    }

    /// Per-category name uniqueness, excluding `gl_` built-ins and interface
    /// blocks (those are matched member by member).
    fn check_names(&self, output: &mut Output) -> Result<()> {
        let mut seen = HashSet::default();
        for entry in &self.structs {
            if entry.name.starts_with(BUILTIN_PREFIX) {
                continue;
            }
            if !seen.insert(entry.name.as_str()) {
                output.error(
                    &self.origin.file,
                    self.origin.line,
                    self.origin.column,
                    format!(
                        "linker error: multiple structs of name {} declared; this could be due \
                         to using the same struct in different contexts, such as a uniform \
                         block and uniform buffer",
                        entry.name
                    ),
                );
                bail!("invalid stage interface");
            }
        }

        seen.clear();
        for uniform in &self.uniforms {
            if !seen.insert(uniform.name.as_str()) {
                output.error(
                    &self.origin.file,
                    self.origin.line,
                    self.origin.column,
                    format!(
                        "linker error: multiple uniforms of name {} declared",
                        uniform.name
                    ),
                );
                bail!("invalid stage interface");
            }
        }

        for (ios, role) in [(&self.inputs, IoRole::Input), (&self.outputs, IoRole::Output)].iter() {
            let mut seen = HashSet::default();
            for io in ios.iter() {
                if io.ty == Type::Struct {
                    continue;
                }
                if !seen.insert(io.name.as_str()) {
                    output.error(
                        &self.origin.file,
                        self.origin.line,
                        self.origin.column,
                        format!(
                            "linker error: multiple {}s of name {} in stage {}",
                            role.name(),
                            io.name,
                            self.stage.name()
                        ),
                    );
                    bail!("invalid stage interface");
                }
            }
        }
        Ok(())
    }
}

fn missing_operand() -> mslc_core::error::Error {
    anyhow!("decoration is missing an operand")
}
