use bytemuck::{Pod, Zeroable};

use crate::types::FrameInputs;

/// CPU mirror of the `PassParams` uniform block (std140, 48 bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub(crate) struct PassUniforms {
    /// `(width, height, 1/width, 1/height)`.
    pub resolution: [f32; 4],
    /// `(x, y)` in bottom-left pixels, then the same point in NDC.
    pub pointer: [f32; 4],
    pub time: f32,
    pub radius: f32,
    pub alpha: f32,
    pub _padding: f32,
}

impl PassUniforms {
    pub fn from_inputs(inputs: &FrameInputs) -> Self {
        let size = inputs.size.as_vec2();
        let ndc = inputs.pointer.to_ndc(inputs.size);
        Self {
            resolution: [size.x, size.y, 1.0 / size.x, 1.0 / size.y],
            pointer: [inputs.pointer.x, inputs.pointer.y, ndc.x, ndc.y],
            time: inputs.time,
            radius: inputs.filter.radius() as f32,
            alpha: inputs.filter.alpha(),
            _padding: 0.0,
        }
    }
}
