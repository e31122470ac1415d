//! Per-frame bind and draw orchestration.
//!
//! [`FrameOrchestrator`] owns the fixed draw sequence; [`StandardBlocks`]
//! fills the four standard parameter blocks and builds the draw items the
//! demos issue.

mod orchestrator;
mod standard;

pub use orchestrator::{
    ComputeItem, DrawItem, DrawStep, FrameError, FrameOrchestrator, FrameStats,
    OrchestratorConfig, StageBinding, PATCH_CONTROL_POINTS,
};
pub use standard::{SceneInputs, StandardBlocks, TerrainTextures};
