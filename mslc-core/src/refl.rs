//! Public reflection records describing a compiled shader's interface.
//!
//! Fields that SPIR-V may leave undeclared (offsets, strides, bindings,
//! locations) are `Option`s; `None` is the unknown sentinel the module
//! packager later serializes as all-bits-set.
use crate::ty::Type;

/// One array dimension of a struct member or uniform. Runtime-sized arrays
/// have no length, data arrays outside a block have no stride.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayInfo {
    pub length: Option<u32>,
    pub stride: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructMember {
    pub name: String,
    pub offset: Option<u32>,
    pub size: Option<u32>,
    pub ty: Type,
    /// Index into the owning processor's struct list when `ty` is `Struct`.
    pub struct_index: Option<u32>,
    /// Array dimensions, outermost first.
    pub array_elements: Vec<ArrayInfo>,
    pub row_major: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Struct {
    pub name: String,
    /// Size rounded up to 16-byte alignment, or `None` when the last member
    /// is a runtime-sized array.
    pub size: Option<u32>,
    pub members: Vec<StructMember>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformType {
    PushConstant,
    Block,
    BlockBuffer,
    Image,
    SampledImage,
    SubpassInput,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uniform {
    pub name: String,
    pub uniform_type: UniformType,
    pub ty: Type,
    pub struct_index: Option<u32>,
    pub array_elements: Vec<ArrayInfo>,
    pub descriptor_set: Option<u32>,
    pub binding: Option<u32>,
    pub input_attachment_index: Option<u32>,
    /// Index of the sampler state applied to this uniform, filled in by the
    /// packager once sampler states are matched up by name.
    pub sampler_index: Option<u32>,
}

/// A stage input or output: a scalar, vector, matrix, or interface block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputOutput {
    pub name: String,
    pub ty: Type,
    pub struct_index: Option<u32>,
    /// Array dimensions, outermost first. Lengths only; interface arrays
    /// carry no strides.
    pub array_elements: Vec<Option<u32>>,
    /// Per-member `(location, component)` when `ty` is `Struct`. The
    /// component defaults to 0 when the location is still unassigned.
    pub member_locations: Vec<(Option<u32>, u32)>,
    pub patch: bool,
    /// Whether the location was computed by the assigner rather than
    /// declared in source. Auto-assigned interfaces get explicit decorations
    /// written back into the SPIR-V.
    pub auto_assigned: bool,
    pub location: Option<u32>,
    pub component: Option<u32>,
}
