//! Value decoders for `pipeline` and `sampler_state` block entries.
//!
//! Grammar-wise every entry is `key = value ;`. The value text is the
//! concatenation of the non-whitespace tokens up to the terminator, so
//! multi-token values like `vec4(1.2,3.4,5.6,7.8)` and signed numbers decode
//! the same way regardless of spacing. Decode errors always report against
//! the first value token.
use mslc_core::output::Output;
use mslc_core::state::{
    AddressMode, BlendFactor, BlendOp, BorderColor, ColorMask, CompareOp, CullMode, DepthStencilState,
    Filter, FrontFace, LogicOp, MipFilter, PolygonMode, RenderState, SamplerState, StencilOp,
    MAX_ATTACHMENTS,
};
use mslc_core::token::{Token, TokenList};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StencilFace {
    Front,
    Back,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RenderStateKey<'a> {
    Plain(&'a str),
    Stencil(StencilFace, &'a str),
    Attachment(usize, &'a str),
}

static PLAIN_RENDER_STATE_KEYS: &[&str] = &[
    // Rasterization.
    "depth_clamp_enable",
    "rasterizer_discard_enable",
    "polygon_mode",
    "cull_mode",
    "front_face",
    "depth_bias_enable",
    "depth_bias_constant_factor",
    "depth_bias_clamp",
    "depth_bias_slope_factor",
    "line_width",
    // Multisampling.
    "sample_shading_enable",
    "min_sample_shading",
    "sample_mask",
    "alpha_to_coverage_enable",
    "alpha_to_one_enable",
    // Depth/stencil.
    "depth_test_enable",
    "depth_write_enable",
    "depth_compare_op",
    "depth_bounds_test_enable",
    "stencil_test_enable",
    "min_depth_bounds",
    "max_depth_bounds",
    // Blending.
    "logical_op_enable",
    "logical_op",
    "separate_attachment_blending_enable",
    "blend_constant",
    // Pipeline-wide.
    "patch_control_points",
    "early_fragment_tests",
    "fragment_group",
];

static STENCIL_FIELDS: &[&str] = &[
    "fail_op",
    "pass_op",
    "depth_fail_op",
    "compare_op",
    "compare_mask",
    "write_mask",
    "reference",
];

static ATTACHMENT_FIELDS: &[&str] = &[
    "blend_enable",
    "src_color_blend_factor",
    "dst_color_blend_factor",
    "color_blend_op",
    "src_alpha_blend_factor",
    "dst_alpha_blend_factor",
    "alpha_blend_op",
    "src_blend_factor",
    "dst_blend_factor",
    "blend_op",
    "color_write_mask",
];

static SAMPLER_STATE_KEYS: &[&str] = &[
    "min_filter",
    "mag_filter",
    "mip_filter",
    "address_mode_u",
    "address_mode_v",
    "address_mode_w",
    "mip_lod_bias",
    "max_anisotropy",
    "min_lod",
    "max_lod",
    "border_color",
    "compare_op",
];

fn stencil_field(key: &str) -> Option<(StencilFace, &str)> {
    let (face, field) = if let Some(rest) = key.strip_prefix("front_stencil_") {
        (StencilFace::Front, rest)
    } else if let Some(rest) = key.strip_prefix("back_stencil_") {
        (StencilFace::Back, rest)
    } else if let Some(rest) = key.strip_prefix("stencil_") {
        (StencilFace::Both, rest)
    } else {
        return None;
    };
    if STENCIL_FIELDS.contains(&field) {
        Some((face, field))
    } else {
        None
    }
}

fn attachment_field(key: &str) -> Option<(usize, &str)> {
    if let Some(rest) = key.strip_prefix("attachment") {
        let underscore = rest.find('_')?;
        let digits = &rest[..underscore];
        if digits.is_empty() || !digits.bytes().all(|x| x.is_ascii_digit()) {
            return None;
        }
        let index: usize = digits.parse().ok()?;
        let field = &rest[underscore + 1..];
        if index < MAX_ATTACHMENTS && ATTACHMENT_FIELDS.contains(&field) {
            return Some((index, field));
        }
        None
    } else if ATTACHMENT_FIELDS.contains(&key) {
        Some((0, key))
    } else {
        None
    }
}

fn render_state_key(key: &str) -> Option<RenderStateKey> {
    if PLAIN_RENDER_STATE_KEYS.contains(&key) {
        Some(RenderStateKey::Plain(key))
    } else if let Some((face, field)) = stencil_field(key) {
        Some(RenderStateKey::Stencil(face, field))
    } else if let Some((index, field)) = attachment_field(key) {
        Some(RenderStateKey::Attachment(index, field))
    } else {
        None
    }
}

pub fn is_render_state_key(key: &str) -> bool {
    render_state_key(key).is_some()
}

pub fn is_sampler_state_key(key: &str) -> bool {
    SAMPLER_STATE_KEYS.contains(&key)
}

/// Collect the value text following `key =`, consuming through the `;`.
/// Returns the joined text and the index of its first token.
pub(crate) fn read_value(
    output: &mut Output,
    tokens: &TokenList,
    i: &mut usize,
) -> Option<(String, usize)> {
    let toks = tokens.tokens();
    let mut text = String::new();
    let mut first = None;
    loop {
        if *i >= toks.len() {
            let last = toks.last().unwrap();
            output.error(
                tokens.token_file(last),
                last.line,
                last.column,
                "unexpected end of file",
            );
            return None;
        }
        let token = &toks[*i];
        if token.is_whitespace() {
            *i += 1;
            continue;
        }
        if token.value == ";" {
            if first.is_none() {
                output.error(
                    tokens.token_file(token),
                    token.line,
                    token.column,
                    "unexpected token: ';'",
                );
                return None;
            }
            *i += 1;
            return Some((text, first.unwrap()));
        }
        if token.value == "}" {
            output.error(
                tokens.token_file(token),
                token.line,
                token.column,
                "unexpected token: '}'",
            );
            return None;
        }
        if first.is_none() {
            first = Some(*i);
        }
        text.push_str(&token.value);
        *i += 1;
    }
}

/// Collect a value inside a `layout(...)` list, stopping before `,` or `)`.
pub(crate) fn read_layout_value(
    output: &mut Output,
    tokens: &TokenList,
    i: &mut usize,
) -> Option<(String, usize)> {
    let toks = tokens.tokens();
    let mut text = String::new();
    let mut first = None;
    loop {
        if *i >= toks.len() {
            let last = toks.last().unwrap();
            output.error(
                tokens.token_file(last),
                last.line,
                last.column,
                "unexpected end of file",
            );
            return None;
        }
        let token = &toks[*i];
        if token.is_whitespace() {
            *i += 1;
            continue;
        }
        if token.value == "," || token.value == ")" || token.value == ";" || token.value == "}" {
            if first.is_none() {
                output.error(
                    tokens.token_file(token),
                    token.line,
                    token.column,
                    format!("unexpected token: '{}'", token.value),
                );
                return None;
            }
            return Some((text, first.unwrap()));
        }
        if first.is_none() {
            first = Some(*i);
        }
        text.push_str(&token.value);
        *i += 1;
    }
}

pub(crate) fn parse_bool_value(text: &str) -> Option<bool> {
    match text {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

/// Decimal, octal (leading `0`), or hex (`0x`) unsigned integer.
pub(crate) fn parse_int_value(text: &str) -> Option<u32> {
    if let Some(hex) = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        u32::from_str_radix(hex, 16).ok()
    } else if text.len() > 1 && text.starts_with('0') {
        u32::from_str_radix(&text[1..], 8).ok()
    } else {
        text.parse().ok()
    }
}

pub(crate) fn parse_float_value(text: &str) -> Option<f32> {
    text.parse().ok()
}

/// `0` for no channels, otherwise a subset of `RGBA`.
fn parse_color_mask(text: &str) -> Option<ColorMask> {
    if text == "0" {
        return Some(ColorMask::empty());
    }
    if text.is_empty() {
        return None;
    }
    let mut mask = ColorMask::empty();
    for c in text.chars() {
        mask |= match c {
            'R' => ColorMask::RED,
            'G' => ColorMask::GREEN,
            'B' => ColorMask::BLUE,
            'A' => ColorMask::ALPHA,
            _ => return None,
        };
    }
    Some(mask)
}

/// `vec4(f)` splat or `vec4(f,f,f,f)`.
fn parse_vec4(text: &str) -> Option<[f32; 4]> {
    let inner = text.strip_prefix("vec4(")?.strip_suffix(')')?;
    let parts: Vec<&str> = inner.split(',').collect();
    match parts.len() {
        1 => {
            let value: f32 = parts[0].parse().ok()?;
            Some([value; 4])
        }
        4 => Some([
            parts[0].parse().ok()?,
            parts[1].parse().ok()?,
            parts[2].parse().ok()?,
            parts[3].parse().ok()?,
        ]),
        _ => None,
    }
}

fn invalid_value(
    output: &mut Output,
    tokens: &TokenList,
    first: usize,
    kind: &str,
    text: &str,
) -> bool {
    let token = &tokens.tokens()[first];
    output.error(
        tokens.token_file(token),
        token.line,
        token.column,
        format!("invalid {} value: '{}'", kind, text),
    );
    false
}

/// Decode and apply one render-state entry. `i` points just past the `=`;
/// on success the `;` has been consumed. The key must already have been
/// checked with [`is_render_state_key`].
pub(crate) fn decode_render_state(
    output: &mut Output,
    tokens: &TokenList,
    i: &mut usize,
    key: &Token,
    state: &mut RenderState,
) -> bool {
    let (text, first) = match read_value(output, tokens, i) {
        Some(x) => x,
        None => return false,
    };

    macro_rules! set {
        ($field:expr, $parse:expr, $kind:literal) => {
            match $parse {
                Some(value) => {
                    $field = Some(value);
                    true
                }
                None => invalid_value(output, tokens, first, $kind, &text),
            }
        };
    }

    let raster = &mut state.rasterization;
    let multi = &mut state.multisample;
    let depth = &mut state.depth_stencil;
    let blend = &mut state.blend;
    match render_state_key(&key.value) {
        Some(RenderStateKey::Plain(name)) => match name {
            "depth_clamp_enable" => {
                set!(raster.depth_clamp_enable, parse_bool_value(&text), "boolean")
            }
            "rasterizer_discard_enable" => set!(
                raster.rasterizer_discard_enable,
                parse_bool_value(&text),
                "boolean"
            ),
            "polygon_mode" => set!(
                raster.polygon_mode,
                PolygonMode::from_name(&text),
                "polygon mode"
            ),
            "cull_mode" => set!(raster.cull_mode, CullMode::from_name(&text), "cull mode"),
            "front_face" => set!(raster.front_face, FrontFace::from_name(&text), "front face"),
            "depth_bias_enable" => {
                set!(raster.depth_bias_enable, parse_bool_value(&text), "boolean")
            }
            "depth_bias_constant_factor" => set!(
                raster.depth_bias_constant_factor,
                parse_float_value(&text),
                "float"
            ),
            "depth_bias_clamp" => set!(raster.depth_bias_clamp, parse_float_value(&text), "float"),
            "depth_bias_slope_factor" => set!(
                raster.depth_bias_slope_factor,
                parse_float_value(&text),
                "float"
            ),
            "line_width" => set!(raster.line_width, parse_float_value(&text), "float"),
            "sample_shading_enable" => {
                set!(multi.sample_shading_enable, parse_bool_value(&text), "boolean")
            }
            "min_sample_shading" => {
                set!(multi.min_sample_shading, parse_float_value(&text), "float")
            }
            "sample_mask" => set!(multi.sample_mask, parse_int_value(&text), "int"),
            "alpha_to_coverage_enable" => set!(
                multi.alpha_to_coverage_enable,
                parse_bool_value(&text),
                "boolean"
            ),
            "alpha_to_one_enable" => {
                set!(multi.alpha_to_one_enable, parse_bool_value(&text), "boolean")
            }
            "depth_test_enable" => set!(depth.depth_test_enable, parse_bool_value(&text), "boolean"),
            "depth_write_enable" => {
                set!(depth.depth_write_enable, parse_bool_value(&text), "boolean")
            }
            "depth_compare_op" => set!(
                depth.depth_compare_op,
                CompareOp::from_name(&text),
                "compare op"
            ),
            "depth_bounds_test_enable" => set!(
                depth.depth_bounds_test_enable,
                parse_bool_value(&text),
                "boolean"
            ),
            "stencil_test_enable" => {
                set!(depth.stencil_test_enable, parse_bool_value(&text), "boolean")
            }
            "min_depth_bounds" => set!(depth.min_depth_bounds, parse_float_value(&text), "float"),
            "max_depth_bounds" => set!(depth.max_depth_bounds, parse_float_value(&text), "float"),
            "logical_op_enable" => set!(blend.logical_op_enable, parse_bool_value(&text), "boolean"),
            "logical_op" => set!(blend.logical_op, LogicOp::from_name(&text), "logic op"),
            "separate_attachment_blending_enable" => set!(
                blend.separate_attachment_blending_enable,
                parse_bool_value(&text),
                "boolean"
            ),
            "blend_constant" => set!(blend.blend_constants, parse_vec4(&text), "vec4"),
            "patch_control_points" => {
                set!(state.patch_control_points, parse_int_value(&text), "int")
            }
            "early_fragment_tests" => {
                set!(state.early_fragment_tests, parse_bool_value(&text), "boolean")
            }
            "fragment_group" => set!(state.fragment_group, parse_int_value(&text), "int"),
            _ => unreachable!("unclassified render state key"),
        },
        Some(RenderStateKey::Stencil(face, field)) => {
            decode_stencil(output, tokens, first, &text, depth, face, field)
        }
        Some(RenderStateKey::Attachment(index, field)) => {
            let attachment = &mut blend.blend_attachments[index];
            match field {
                "blend_enable" => {
                    set!(attachment.blend_enable, parse_bool_value(&text), "boolean")
                }
                "src_color_blend_factor" => set!(
                    attachment.src_color_blend_factor,
                    BlendFactor::from_name(&text),
                    "blend factor"
                ),
                "dst_color_blend_factor" => set!(
                    attachment.dst_color_blend_factor,
                    BlendFactor::from_name(&text),
                    "blend factor"
                ),
                "color_blend_op" => {
                    set!(attachment.color_blend_op, BlendOp::from_name(&text), "blend op")
                }
                "src_alpha_blend_factor" => set!(
                    attachment.src_alpha_blend_factor,
                    BlendFactor::from_name(&text),
                    "blend factor"
                ),
                "dst_alpha_blend_factor" => set!(
                    attachment.dst_alpha_blend_factor,
                    BlendFactor::from_name(&text),
                    "blend factor"
                ),
                "alpha_blend_op" => {
                    set!(attachment.alpha_blend_op, BlendOp::from_name(&text), "blend op")
                }
                // The unsuffixed forms set color and alpha together.
                "src_blend_factor" => match BlendFactor::from_name(&text) {
                    Some(value) => {
                        attachment.src_color_blend_factor = Some(value);
                        attachment.src_alpha_blend_factor = Some(value);
                        true
                    }
                    None => invalid_value(output, tokens, first, "blend factor", &text),
                },
                "dst_blend_factor" => match BlendFactor::from_name(&text) {
                    Some(value) => {
                        attachment.dst_color_blend_factor = Some(value);
                        attachment.dst_alpha_blend_factor = Some(value);
                        true
                    }
                    None => invalid_value(output, tokens, first, "blend factor", &text),
                },
                "blend_op" => match BlendOp::from_name(&text) {
                    Some(value) => {
                        attachment.color_blend_op = Some(value);
                        attachment.alpha_blend_op = Some(value);
                        true
                    }
                    None => invalid_value(output, tokens, first, "blend op", &text),
                },
                "color_write_mask" => {
                    set!(attachment.color_write_mask, parse_color_mask(&text), "color mask")
                }
                _ => unreachable!("unclassified blend attachment key"),
            }
        }
        None => unreachable!("decode_render_state called with unknown key"),
    }
}

fn decode_stencil(
    output: &mut Output,
    tokens: &TokenList,
    first: usize,
    text: &str,
    depth: &mut DepthStencilState,
    face: StencilFace,
    field: &str,
) -> bool {
    macro_rules! set_faces {
        ($field:ident, $parse:expr, $kind:literal) => {
            match $parse {
                Some(value) => {
                    if face != StencilFace::Back {
                        depth.front_stencil.$field = Some(value);
                    }
                    if face != StencilFace::Front {
                        depth.back_stencil.$field = Some(value);
                    }
                    true
                }
                None => invalid_value(output, tokens, first, $kind, text),
            }
        };
    }

    match field {
        "fail_op" => set_faces!(fail_op, StencilOp::from_name(text), "stencil op"),
        "pass_op" => set_faces!(pass_op, StencilOp::from_name(text), "stencil op"),
        "depth_fail_op" => set_faces!(depth_fail_op, StencilOp::from_name(text), "stencil op"),
        "compare_op" => set_faces!(compare_op, CompareOp::from_name(text), "compare op"),
        "compare_mask" => set_faces!(compare_mask, parse_int_value(text), "int"),
        "write_mask" => set_faces!(write_mask, parse_int_value(text), "int"),
        "reference" => set_faces!(reference, parse_int_value(text), "int"),
        _ => unreachable!("unclassified stencil key"),
    }
}

/// Decode and apply one sampler-state entry; same calling convention as
/// [`decode_render_state`].
pub(crate) fn decode_sampler_state(
    output: &mut Output,
    tokens: &TokenList,
    i: &mut usize,
    key: &Token,
    state: &mut SamplerState,
) -> bool {
    let (text, first) = match read_value(output, tokens, i) {
        Some(x) => x,
        None => return false,
    };

    macro_rules! set {
        ($field:expr, $parse:expr, $kind:literal) => {
            match $parse {
                Some(value) => {
                    $field = Some(value);
                    true
                }
                None => invalid_value(output, tokens, first, $kind, &text),
            }
        };
    }

    match key.value.as_str() {
        "min_filter" => set!(state.min_filter, Filter::from_name(&text), "filter"),
        "mag_filter" => set!(state.mag_filter, Filter::from_name(&text), "filter"),
        "mip_filter" => set!(state.mip_filter, MipFilter::from_name(&text), "mip filter"),
        "address_mode_u" => set!(
            state.address_mode_u,
            AddressMode::from_name(&text),
            "address mode"
        ),
        "address_mode_v" => set!(
            state.address_mode_v,
            AddressMode::from_name(&text),
            "address mode"
        ),
        "address_mode_w" => set!(
            state.address_mode_w,
            AddressMode::from_name(&text),
            "address mode"
        ),
        "mip_lod_bias" => set!(state.mip_lod_bias, parse_float_value(&text), "float"),
        "max_anisotropy" => set!(state.max_anisotropy, parse_float_value(&text), "float"),
        "min_lod" => set!(state.min_lod, parse_float_value(&text), "float"),
        "max_lod" => set!(state.max_lod, parse_float_value(&text), "float"),
        "border_color" => set!(
            state.border_color,
            BorderColor::from_name(&text),
            "border color"
        ),
        "compare_op" => set!(state.compare_op, CompareOp::from_name(&text), "compare op"),
        _ => unreachable!("decode_sampler_state called with unknown key"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_values() {
        assert_eq!(parse_int_value("123"), Some(123));
        assert_eq!(parse_int_value("0xAbCd"), Some(0xABCD));
        assert_eq!(parse_int_value("0123"), Some(0o123));
        assert_eq!(parse_int_value("0"), Some(0));
        assert_eq!(parse_int_value("089"), None);
        assert_eq!(parse_int_value("asdf"), None);
    }

    #[test]
    fn bool_values() {
        assert_eq!(parse_bool_value("true"), Some(true));
        assert_eq!(parse_bool_value("1"), Some(true));
        assert_eq!(parse_bool_value("false"), Some(false));
        assert_eq!(parse_bool_value("0"), Some(false));
        assert_eq!(parse_bool_value("asdf"), None);
    }

    #[test]
    fn color_mask_values() {
        assert_eq!(parse_color_mask("0"), Some(ColorMask::empty()));
        assert_eq!(
            parse_color_mask("RG"),
            Some(ColorMask::RED | ColorMask::GREEN)
        );
        assert_eq!(parse_color_mask("RGBA"), Some(ColorMask::all()));
        assert_eq!(parse_color_mask("rgba"), None);
        assert_eq!(parse_color_mask("asdf"), None);
    }

    #[test]
    fn vec4_values() {
        assert_eq!(parse_vec4("vec4(1.5)"), Some([1.5; 4]));
        assert_eq!(
            parse_vec4("vec4(1.2,3.4,5.6,7.8)"),
            Some([1.2, 3.4, 5.6, 7.8])
        );
        assert_eq!(parse_vec4("vec3(1.2,3.4,5.6)"), None);
        assert_eq!(parse_vec4("vec4(1.2,3.4,5.6)"), None);
        assert_eq!(parse_vec4("vec4(1.2,3.4,5.6,7.8"), None);
        assert_eq!(parse_vec4("vec4(1.2,3.4,5.6,7.8,9.0)"), None);
    }

    #[test]
    fn key_classification() {
        assert!(is_render_state_key("depth_test_enable"));
        assert!(is_render_state_key("stencil_fail_op"));
        assert!(is_render_state_key("front_stencil_compare_mask"));
        assert!(is_render_state_key("blend_enable"));
        assert!(is_render_state_key("attachment3_blend_enable"));
        assert!(is_render_state_key("src_blend_factor"));
        assert!(!is_render_state_key("attachment_blend_enable"));
        assert!(!is_render_state_key("attachment99_blend_enable"));
        assert!(!is_render_state_key("asdf"));
        assert!(is_sampler_state_key("address_mode_u"));
        assert!(!is_sampler_state_key("asdf"));
    }
}
