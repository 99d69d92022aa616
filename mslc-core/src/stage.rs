//! Graphics pipeline stages.

pub const STAGE_COUNT: usize = 6;

/// One slot in the traditional graphics pipeline. The discriminant order is
/// the pipeline order, which `varying` declarations and cross-stage linking
/// rely on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Vertex,
    TessellationControl,
    TessellationEvaluation,
    Geometry,
    Fragment,
    Compute,
}

impl Stage {
    pub const ALL: [Stage; STAGE_COUNT] = [
        Stage::Vertex,
        Stage::TessellationControl,
        Stage::TessellationEvaluation,
        Stage::Geometry,
        Stage::Fragment,
        Stage::Compute,
    ];

    /// Source-level stage name, as used in stage filters, pipeline bodies,
    /// and diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Stage::Vertex => "vertex",
            Stage::TessellationControl => "tessellation_control",
            Stage::TessellationEvaluation => "tessellation_evaluation",
            Stage::Geometry => "geometry",
            Stage::Fragment => "fragment",
            Stage::Compute => "compute",
        }
    }

    pub fn from_name(name: &str) -> Option<Stage> {
        Stage::ALL.iter().copied().find(|x| x.name() == name)
    }

    /// Conventional per-stage file extension for synthesized GLSL.
    pub fn extension(self) -> &'static str {
        match self {
            Stage::Vertex => ".vert",
            Stage::TessellationControl => ".tesc",
            Stage::TessellationEvaluation => ".tese",
            Stage::Geometry => ".geom",
            Stage::Fragment => ".frag",
            Stage::Compute => ".comp",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Whether a stage's inputs are arrayed over vertices.
pub fn input_is_array(stage: Stage) -> bool {
    stage == Stage::TessellationControl
        || stage == Stage::TessellationEvaluation
        || stage == Stage::Geometry
}

/// Whether a stage's outputs are arrayed over vertices.
pub fn output_is_array(stage: Stage) -> bool {
    stage == Stage::TessellationControl
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for stage in Stage::ALL.iter() {
            assert_eq!(Stage::from_name(stage.name()), Some(*stage));
        }
        assert_eq!(Stage::from_name("asdf"), None);
    }

    #[test]
    fn interface_arraying() {
        assert!(!input_is_array(Stage::Vertex));
        assert!(input_is_array(Stage::TessellationControl));
        assert!(input_is_array(Stage::TessellationEvaluation));
        assert!(input_is_array(Stage::Geometry));
        assert!(!input_is_array(Stage::Fragment));
        assert!(output_is_array(Stage::TessellationControl));
        assert!(!output_is_array(Stage::Vertex));
    }
}
