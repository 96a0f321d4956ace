/// Scheduling bucket of a stage.
///
/// Phases execute in declaration order. Within a phase, stages run in the order they were added
/// to the graph.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(u8)]
pub enum Phase {
    /// Work recorded before the scene render pass (ray tracing, uploads). No render pass framing.
    PrePass = 0,
    /// Geometry drawn into the scene render target (HDR color + depth).
    ScenePass = 1,
    /// Compute and transfer work between the scene and the composite pass. No render pass framing.
    Intermediate = 2,
    /// Final composition into the output (swapchain) image.
    CompositePass = 3,
}

impl Phase {
    /// All phases, in execution order.
    pub const ALL: [Phase; 4] = [Phase::PrePass, Phase::ScenePass, Phase::Intermediate, Phase::CompositePass];

    pub const COUNT: usize = Self::ALL.len();

    pub const fn index(self) -> usize {
        self as usize
    }

    /// Whether the graph opens a render pass around the stages of this phase.
    pub const fn has_framing(self) -> bool {
        matches!(self, Phase::ScenePass | Phase::CompositePass)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Phase::PrePass => "PrePass",
            Phase::ScenePass => "ScenePass",
            Phase::Intermediate => "Intermediate",
            Phase::CompositePass => "CompositePass",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_are_totally_ordered() {
        assert!(Phase::PrePass < Phase::ScenePass);
        assert!(Phase::ScenePass < Phase::Intermediate);
        assert!(Phase::Intermediate < Phase::CompositePass);
        let mut sorted = Phase::ALL;
        sorted.sort();
        assert_eq!(sorted, Phase::ALL);
    }

    #[test]
    fn only_scene_and_composite_are_framed() {
        let framed: Vec<_> = Phase::ALL.iter().filter(|p| p.has_framing()).collect();
        assert_eq!(framed, [&Phase::ScenePass, &Phase::CompositePass]);
    }
}
