//! The closed set of types visible in shader reflection.
//!
//! Unlike general SPIR-V consumers this compiler only deals with the types
//! GLSL can declare at an interface, so the representation is a flat enum
//! rather than a recursive type graph. Aggregates reference a struct index on
//! the owning processor, arrays are carried next to the type as explicit
//! dimension lists.

/// Reflection type. Matrix variants are named column-count by row-count,
/// matching GLSL (`Mat2x3` is two columns of `Vec3`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Type {
    // Scalars and vectors.
    Float,
    Vec2,
    Vec3,
    Vec4,
    Double,
    DVec2,
    DVec3,
    DVec4,
    Int,
    IVec2,
    IVec3,
    IVec4,
    UInt,
    UVec2,
    UVec3,
    UVec4,
    Bool,
    BVec2,
    BVec3,
    BVec4,

    // Matrices.
    Mat2,
    Mat3,
    Mat4,
    Mat2x3,
    Mat2x4,
    Mat3x2,
    Mat3x4,
    Mat4x2,
    Mat4x3,
    DMat2,
    DMat3,
    DMat4,
    DMat2x3,
    DMat2x4,
    DMat3x2,
    DMat3x4,
    DMat4x2,
    DMat4x3,

    // Samplers.
    Sampler1D,
    Sampler2D,
    Sampler3D,
    SamplerCube,
    Sampler1DShadow,
    Sampler2DShadow,
    Sampler1DArray,
    Sampler2DArray,
    Sampler1DArrayShadow,
    Sampler2DArrayShadow,
    Sampler2DMS,
    Sampler2DMSArray,
    SamplerCubeShadow,
    SamplerBuffer,
    Sampler2DRect,
    Sampler2DRectShadow,
    ISampler1D,
    ISampler2D,
    ISampler3D,
    ISamplerCube,
    ISampler1DArray,
    ISampler2DArray,
    ISampler2DMS,
    ISampler2DMSArray,
    ISampler2DRect,
    USampler1D,
    USampler2D,
    USampler3D,
    USamplerCube,
    USampler1DArray,
    USampler2DArray,
    USampler2DMS,
    USampler2DMSArray,
    USampler2DRect,

    // Storage images.
    Image1D,
    Image2D,
    Image3D,
    ImageCube,
    Image1DArray,
    Image2DArray,
    Image2DMS,
    Image2DMSArray,
    ImageBuffer,
    Image2DRect,
    IImage1D,
    IImage2D,
    IImage3D,
    IImageCube,
    IImage1DArray,
    IImage2DArray,
    IImage2DMS,
    IImage2DMSArray,
    IImage2DRect,
    UImage1D,
    UImage2D,
    UImage3D,
    UImageCube,
    UImage1DArray,
    UImage2DArray,
    UImage2DMS,
    UImage2DMSArray,
    UImage2DRect,

    // Subpass inputs.
    SubpassInput,
    SubpassInputMS,
    ISubpassInput,
    ISubpassInputMS,
    USubpassInput,
    USubpassInputMS,

    // Aggregates.
    Struct,
}

impl Type {
    /// Fixed byte footprint of a non-aggregate type under std140-style
    /// layout, with matrix columns padded to 16-byte alignment. Opaque types
    /// and `Struct` have no fixed footprint. Booleans are reflected as
    /// 32-bit uints, matching what glslang emits for interface blocks.
    pub fn fixed_size(self) -> Option<u32> {
        use Type::*;
        let size = match self {
            Float | Int | UInt | Bool => 4,
            Vec2 | IVec2 | UVec2 | BVec2 => 8,
            Vec3 | IVec3 | UVec3 | BVec3 => 12,
            Vec4 | IVec4 | UVec4 | BVec4 => 16,
            Double => 8,
            DVec2 => 16,
            DVec3 => 24,
            DVec4 => 32,
            Mat2 | Mat2x3 | Mat2x4 => 2 * 16,
            Mat3 | Mat3x2 | Mat3x4 => 3 * 16,
            Mat4 | Mat4x2 | Mat4x3 => 4 * 16,
            DMat2 => 2 * 16,
            DMat3x2 => 3 * 16,
            DMat4x2 => 4 * 16,
            DMat2x3 | DMat2x4 => 2 * 32,
            DMat3 | DMat3x4 => 3 * 32,
            DMat4 | DMat4x3 => 4 * 32,
            _ => return None,
        };
        Some(size)
    }

    pub fn is_matrix(self) -> bool {
        self.matrix_shape().is_some()
    }

    /// `(columns, rows)` for matrix types.
    pub fn matrix_shape(self) -> Option<(u32, u32)> {
        use Type::*;
        let shape = match self {
            Mat2 | DMat2 => (2, 2),
            Mat3 | DMat3 => (3, 3),
            Mat4 | DMat4 => (4, 4),
            Mat2x3 | DMat2x3 => (2, 3),
            Mat2x4 | DMat2x4 => (2, 4),
            Mat3x2 | DMat3x2 => (3, 2),
            Mat3x4 | DMat3x4 => (3, 4),
            Mat4x2 | DMat4x2 => (4, 2),
            Mat4x3 | DMat4x3 => (4, 3),
            _ => return None,
        };
        Some(shape)
    }

    pub fn row_count(self) -> u32 {
        self.matrix_shape().map(|x| x.1).unwrap_or(0)
    }

    pub fn column_count(self) -> u32 {
        self.matrix_shape().map(|x| x.0).unwrap_or(0)
    }

    /// Column vector type of a matrix, used when a matrix occupies interface
    /// locations column by column.
    pub fn column_vector(self) -> Option<Type> {
        use Type::*;
        let vector = match self {
            Mat2 | Mat3x2 | Mat4x2 => Vec2,
            Mat2x3 | Mat3 | Mat4x3 => Vec3,
            Mat2x4 | Mat3x4 | Mat4 => Vec4,
            DMat2 | DMat3x2 | DMat4x2 => DVec2,
            DMat2x3 | DMat3 | DMat4x3 => DVec3,
            DMat2x4 | DMat3x4 | DMat4 => DVec4,
            _ => return None,
        };
        Some(vector)
    }

    pub fn is_sampled_image(self) -> bool {
        use Type::*;
        match self {
            Sampler1D | Sampler2D | Sampler3D | SamplerCube | Sampler1DShadow
            | Sampler2DShadow | Sampler1DArray | Sampler2DArray | Sampler1DArrayShadow
            | Sampler2DArrayShadow | Sampler2DMS | Sampler2DMSArray | SamplerCubeShadow
            | SamplerBuffer | Sampler2DRect | Sampler2DRectShadow | ISampler1D | ISampler2D
            | ISampler3D | ISamplerCube | ISampler1DArray | ISampler2DArray | ISampler2DMS
            | ISampler2DMSArray | ISampler2DRect | USampler1D | USampler2D | USampler3D
            | USamplerCube | USampler1DArray | USampler2DArray | USampler2DMS
            | USampler2DMSArray | USampler2DRect => true,
            _ => false,
        }
    }

    pub fn is_image(self) -> bool {
        use Type::*;
        match self {
            Image1D | Image2D | Image3D | ImageCube | Image1DArray | Image2DArray | Image2DMS
            | Image2DMSArray | ImageBuffer | Image2DRect | IImage1D | IImage2D | IImage3D
            | IImageCube | IImage1DArray | IImage2DArray | IImage2DMS | IImage2DMSArray
            | IImage2DRect | UImage1D | UImage2D | UImage3D | UImageCube | UImage1DArray
            | UImage2DArray | UImage2DMS | UImage2DMSArray | UImage2DRect => true,
            _ => false,
        }
    }

    pub fn is_subpass_input(self) -> bool {
        use Type::*;
        match self {
            SubpassInput | SubpassInputMS | ISubpassInput | ISubpassInputMS | USubpassInput
            | USubpassInputMS => true,
            _ => false,
        }
    }

    pub fn is_opaque(self) -> bool {
        self.is_sampled_image() || self.is_image() || self.is_subpass_input()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_sizes() {
        assert_eq!(Type::Float.fixed_size(), Some(4));
        assert_eq!(Type::Vec3.fixed_size(), Some(12));
        assert_eq!(Type::DVec4.fixed_size(), Some(32));
        assert_eq!(Type::Bool.fixed_size(), Some(4));
        assert_eq!(Type::Mat4x3.fixed_size(), Some(64));
        assert_eq!(Type::DMat3.fixed_size(), Some(96));
        assert_eq!(Type::Sampler2D.fixed_size(), None);
        assert_eq!(Type::Struct.fixed_size(), None);
    }

    #[test]
    fn matrix_shapes() {
        assert_eq!(Type::Mat2x3.matrix_shape(), Some((2, 3)));
        assert_eq!(Type::Mat2x3.column_vector(), Some(Type::Vec3));
        assert_eq!(Type::DMat4x2.column_vector(), Some(Type::DVec2));
        assert_eq!(Type::Vec4.matrix_shape(), None);
    }

    #[test]
    fn classification() {
        assert!(Type::Sampler2DArrayShadow.is_sampled_image());
        assert!(Type::UImage2DMSArray.is_image());
        assert!(Type::ISubpassInputMS.is_subpass_input());
        assert!(!Type::Vec4.is_opaque());
    }
}
