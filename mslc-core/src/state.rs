//! Render state and sampler state records attached to pipelines.
//!
//! Every field starts out unset (`None`) and is only written when the
//! corresponding key appears in a `pipeline` or `sampler_state` block, so the
//! packager can tell an explicit default apart from an omitted one.
use bitflags::bitflags;

/// Number of color attachments a blend state can address.
pub const MAX_ATTACHMENTS: usize = 16;

macro_rules! named_enum {
    ($(#[$attr:meta])* $name:ident { $($variant:ident = $str:literal,)+ }) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)+
        }
        impl $name {
            /// Source-level spelling of the value.
            pub fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $str,)+
                }
            }
            pub fn from_name(name: &str) -> Option<$name> {
                match name {
                    $($str => Some($name::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

named_enum! {
    PolygonMode {
        Fill = "fill",
        Line = "line",
        Point = "point",
    }
}

named_enum! {
    CullMode {
        None = "none",
        Front = "front",
        Back = "back",
        FrontAndBack = "front_and_back",
    }
}

named_enum! {
    FrontFace {
        CounterClockwise = "counter_clockwise",
        Clockwise = "clockwise",
    }
}

named_enum! {
    StencilOp {
        Keep = "keep",
        Zero = "zero",
        Replace = "replace",
        IncrementAndClamp = "increment_and_clamp",
        DecrementAndClamp = "decrement_and_clamp",
        Invert = "invert",
        IncrementAndWrap = "increment_and_wrap",
        DecrementAndWrap = "decrement_and_wrap",
    }
}

named_enum! {
    /// Comparison for depth, stencil, and shadow sampler tests.
    CompareOp {
        Never = "never",
        Less = "less",
        Equal = "equal",
        LessOrEqual = "less_or_equal",
        Greater = "greater",
        NotEqual = "not_equal",
        GreaterOrEqual = "greater_or_equal",
        Always = "always",
    }
}

named_enum! {
    BlendFactor {
        Zero = "zero",
        One = "one",
        SrcColor = "src_color",
        OneMinusSrcColor = "one_minus_src_color",
        DstColor = "dst_color",
        OneMinusDstColor = "one_minus_dst_color",
        SrcAlpha = "src_alpha",
        OneMinusSrcAlpha = "one_minus_src_alpha",
        DstAlpha = "dst_alpha",
        OneMinusDstAlpha = "one_minus_dst_alpha",
        ConstColor = "const_color",
        OneMinusConstColor = "one_minus_const_color",
        ConstAlpha = "const_alpha",
        OneMinusConstAlpha = "one_minus_const_alpha",
        SrcAlphaSaturate = "src_alpha_saturate",
        Src1Color = "src1_color",
        OneMinusSrc1Color = "one_minus_src1_color",
        Src1Alpha = "src1_alpha",
        OneMinusSrc1Alpha = "one_minus_src1_alpha",
    }
}

named_enum! {
    BlendOp {
        Add = "add",
        Subtract = "subtract",
        ReverseSubtract = "reverse_subtract",
        Min = "min",
        Max = "max",
    }
}

named_enum! {
    LogicOp {
        Clear = "clear",
        And = "and",
        AndReverse = "and_reverse",
        Copy = "copy",
        AndInverted = "and_inverted",
        NoOp = "no_op",
        Xor = "xor",
        Or = "or",
        Nor = "nor",
        Equivalent = "equivalent",
        Invert = "invert",
        OrReverse = "or_reverse",
        CopyInverted = "copy_inverted",
        OrInverted = "or_inverted",
        Nand = "nand",
        Set = "set",
    }
}

named_enum! {
    Filter {
        Nearest = "nearest",
        Linear = "linear",
    }
}

named_enum! {
    MipFilter {
        None = "none",
        Nearest = "nearest",
        Linear = "linear",
        Anisotropic = "anisotropic",
    }
}

named_enum! {
    AddressMode {
        Repeat = "repeat",
        MirroredRepeat = "mirrored_repeat",
        ClampToEdge = "clamp_to_edge",
        ClampToBorder = "clamp_to_border",
        MirrorOnce = "mirror_once",
    }
}

named_enum! {
    BorderColor {
        TransparentBlack = "transparent_black",
        TransparentIntZero = "transparent_int_zero",
        OpaqueBlack = "opaque_black",
        OpaqueIntZero = "opaque_int_zero",
        OpaqueWhite = "opaque_white",
        OpaqueIntOne = "opaque_int_one",
    }
}

bitflags! {
    /// Channels written by an attachment. An empty set (source value `0`)
    /// masks off all channels; the unset state is `None` on the field.
    pub struct ColorMask: u32 {
        const RED = 0x1;
        const GREEN = 0x2;
        const BLUE = 0x4;
        const ALPHA = 0x8;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RasterizationState {
    pub depth_clamp_enable: Option<bool>,
    pub rasterizer_discard_enable: Option<bool>,
    pub polygon_mode: Option<PolygonMode>,
    pub cull_mode: Option<CullMode>,
    pub front_face: Option<FrontFace>,
    pub depth_bias_enable: Option<bool>,
    pub depth_bias_constant_factor: Option<f32>,
    pub depth_bias_clamp: Option<f32>,
    pub depth_bias_slope_factor: Option<f32>,
    pub line_width: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MultisampleState {
    pub sample_shading_enable: Option<bool>,
    pub min_sample_shading: Option<f32>,
    pub sample_mask: Option<u32>,
    pub alpha_to_coverage_enable: Option<bool>,
    pub alpha_to_one_enable: Option<bool>,
}

/// Stencil behavior for one face.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StencilOpState {
    pub fail_op: Option<StencilOp>,
    pub pass_op: Option<StencilOp>,
    pub depth_fail_op: Option<StencilOp>,
    pub compare_op: Option<CompareOp>,
    pub compare_mask: Option<u32>,
    pub write_mask: Option<u32>,
    pub reference: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DepthStencilState {
    pub depth_test_enable: Option<bool>,
    pub depth_write_enable: Option<bool>,
    pub depth_compare_op: Option<CompareOp>,
    pub depth_bounds_test_enable: Option<bool>,
    pub stencil_test_enable: Option<bool>,
    pub front_stencil: StencilOpState,
    pub back_stencil: StencilOpState,
    pub min_depth_bounds: Option<f32>,
    pub max_depth_bounds: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BlendAttachmentState {
    pub blend_enable: Option<bool>,
    pub src_color_blend_factor: Option<BlendFactor>,
    pub dst_color_blend_factor: Option<BlendFactor>,
    pub color_blend_op: Option<BlendOp>,
    pub src_alpha_blend_factor: Option<BlendFactor>,
    pub dst_alpha_blend_factor: Option<BlendFactor>,
    pub alpha_blend_op: Option<BlendOp>,
    pub color_write_mask: Option<ColorMask>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BlendState {
    pub logical_op_enable: Option<bool>,
    pub logical_op: Option<LogicOp>,
    pub separate_attachment_blending_enable: Option<bool>,
    pub blend_attachments: [BlendAttachmentState; MAX_ATTACHMENTS],
    pub blend_constants: Option<[f32; 4]>,
}

/// All fixed-function state a pipeline block can carry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderState {
    pub rasterization: RasterizationState,
    pub multisample: MultisampleState,
    pub depth_stencil: DepthStencilState,
    pub blend: BlendState,
    pub patch_control_points: Option<u32>,
    pub early_fragment_tests: Option<bool>,
    pub fragment_group: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SamplerState {
    pub min_filter: Option<Filter>,
    pub mag_filter: Option<Filter>,
    pub mip_filter: Option<MipFilter>,
    pub address_mode_u: Option<AddressMode>,
    pub address_mode_v: Option<AddressMode>,
    pub address_mode_w: Option<AddressMode>,
    pub mip_lod_bias: Option<f32>,
    pub max_anisotropy: Option<f32>,
    pub min_lod: Option<f32>,
    pub max_lod: Option<f32>,
    pub border_color: Option<BorderColor>,
    pub compare_op: Option<CompareOp>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_names_round_trip() {
        assert_eq!(AddressMode::from_name("mirrored_repeat"), Some(AddressMode::MirroredRepeat));
        assert_eq!(BlendFactor::from_name("one_minus_src1_alpha"), Some(BlendFactor::OneMinusSrc1Alpha));
        assert_eq!(LogicOp::from_name("no_op"), Some(LogicOp::NoOp));
        assert_eq!(CompareOp::from_name("asdf"), None);
        assert_eq!(StencilOp::DecrementAndWrap.name(), "decrement_and_wrap");
    }

    #[test]
    fn states_start_unset() {
        let state = RenderState::default();
        assert_eq!(state.rasterization.polygon_mode, None);
        assert_eq!(state.blend.blend_attachments[3].blend_enable, None);
        assert_eq!(state.early_fragment_tests, None);
        let sampler = SamplerState::default();
        assert_eq!(sampler.min_filter, None);
        assert_eq!(sampler.compare_op, None);
    }
}
