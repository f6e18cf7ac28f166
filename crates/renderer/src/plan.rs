//! Static description of which pass reads and writes which buffer.

/// Storage a pass reads from or writes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// Offscreen buffer A: raw scene colour.
    Scene,
    /// Offscreen buffer B: structure tensor `(Jxx, Jyy, Jxy, luminance)`.
    Tensor,
    /// Offscreen buffer C: Kuwahara output.
    Filtered,
    /// Static paper grain texture.
    Paper,
    /// The visible surface (or the export target).
    Surface,
}

impl Slot {
    /// Offscreen slots that must track the surface size.
    pub const OFFSCREEN: [Slot; 3] = [Slot::Scene, Slot::Tensor, Slot::Filtered];

    pub fn is_offscreen(self) -> bool {
        Self::OFFSCREEN.contains(&self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pass {
    Scene,
    Tensor,
    Kuwahara,
    Composite,
}

impl Pass {
    pub fn label(self) -> &'static str {
        match self {
            Pass::Scene => "scene",
            Pass::Tensor => "structure tensor",
            Pass::Kuwahara => "anisotropic kuwahara",
            Pass::Composite => "composition",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassStep {
    pub pass: Pass,
    /// Inputs in binding order.
    pub inputs: &'static [Slot],
    pub output: Slot,
}

const STYLIZED: [PassStep; 4] = [
    PassStep {
        pass: Pass::Scene,
        inputs: &[],
        output: Slot::Scene,
    },
    PassStep {
        pass: Pass::Tensor,
        inputs: &[Slot::Scene],
        output: Slot::Tensor,
    },
    PassStep {
        pass: Pass::Kuwahara,
        inputs: &[Slot::Tensor, Slot::Scene],
        output: Slot::Filtered,
    },
    PassStep {
        pass: Pass::Composite,
        inputs: &[Slot::Filtered, Slot::Paper],
        output: Slot::Surface,
    },
];

const DIRECT: [PassStep; 1] = [PassStep {
    pass: Pass::Scene,
    inputs: &[],
    output: Slot::Surface,
}];

/// Pass sequence for one frame.
pub fn frame_plan(stylize: bool) -> &'static [PassStep] {
    if stylize {
        &STYLIZED
    } else {
        &DIRECT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stylized_plan_chains_buffers() {
        let plan = frame_plan(true);
        let passes: Vec<Pass> = plan.iter().map(|step| step.pass).collect();
        assert_eq!(
            passes,
            vec![Pass::Scene, Pass::Tensor, Pass::Kuwahara, Pass::Composite]
        );
        // Each pass only reads what an earlier pass wrote (or the static paper).
        let mut written = vec![Slot::Paper];
        for step in plan {
            for input in step.inputs {
                assert!(written.contains(input), "{:?} read before write", input);
                assert_ne!(*input, step.output, "{:?} reads its own output", step.pass);
            }
            written.push(step.output);
        }
        assert_eq!(plan.last().map(|step| step.output), Some(Slot::Surface));
    }

    #[test]
    fn direct_plan_draws_scene_to_surface() {
        let plan = frame_plan(false);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].pass, Pass::Scene);
        assert_eq!(plan[0].output, Slot::Surface);
    }

    #[test]
    fn only_buffers_abc_are_offscreen() {
        assert!(Slot::Scene.is_offscreen());
        assert!(Slot::Filtered.is_offscreen());
        assert!(!Slot::Paper.is_offscreen());
        assert!(!Slot::Surface.is_offscreen());
    }
}
