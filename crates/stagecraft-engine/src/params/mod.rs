//! Per-stage constant parameter blocks.
//!
//! One [`ParameterBlock`] exists per (stage, update frequency) pair. The only
//! way to obtain a bindable buffer from a block is `apply_changes`, which
//! returns an [`AppliedBlock`] token; mutate → apply → bind is therefore the
//! only order the orchestrator can express.

mod block;
mod layouts;

pub use block::{
    aligned_size, AppliedBlock, ParameterBlock, StageBlock, UploadPolicy, CONSTANT_ALIGNMENT,
};
pub use layouts::{
    inverse_transpose, shader_matrix, DirectionalLight, DomainFrameParams, HullFrameParams,
    Material, PixelFrameParams, PixelObjectParams, VertexObjectParams,
};
