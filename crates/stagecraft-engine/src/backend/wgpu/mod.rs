//! wgpu implementation of the device seam.
//!
//! wgpu has no immediate context: pipelines are immutable objects and resources
//! reach shaders through bind groups. This backend records slot state the way
//! a stage-slot API would and resolves it on every draw:
//! - the bound input layout, shaders, rasterizer and blend state select a
//!   cached `wgpu::RenderPipeline`
//! - the bound constant buffers, textures and samplers of each stage become
//!   one bind group per stage
//!
//! Binding numbers in WGSL follow a fixed convention, see [`binding_index`].

mod context;
mod convert;
mod device;

pub use context::{RenderTarget, WgpuContext};
pub use device::{TargetFormats, WgpuDevice};

use super::Stage;

/// First binding number of each slot kind inside a stage's bind group.
pub const CONSTANT_BINDING_BASE: u32 = 0;
pub const TEXTURE_BINDING_BASE: u32 = 32;
pub const SAMPLER_BINDING_BASE: u32 = 160;
pub const STORAGE_BINDING_BASE: u32 = 192;

/// Slots available per kind; mirrors the usual stage-slot limits.
pub const MAX_CONSTANT_SLOTS: u32 = 14;
pub const MAX_TEXTURE_SLOTS: u32 = 128;
pub const MAX_SAMPLER_SLOTS: u32 = 16;
pub const MAX_STORAGE_SLOTS: u32 = 8;
pub const MAX_VERTEX_SLOTS: u32 = 8;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SlotKind {
    Constant,
    Texture,
    Sampler,
    Storage,
}

impl SlotKind {
    pub const fn base(self) -> u32 {
        match self {
            SlotKind::Constant => CONSTANT_BINDING_BASE,
            SlotKind::Texture => TEXTURE_BINDING_BASE,
            SlotKind::Sampler => SAMPLER_BINDING_BASE,
            SlotKind::Storage => STORAGE_BINDING_BASE,
        }
    }

    pub const fn max_slots(self) -> u32 {
        match self {
            SlotKind::Constant => MAX_CONSTANT_SLOTS,
            SlotKind::Texture => MAX_TEXTURE_SLOTS,
            SlotKind::Sampler => MAX_SAMPLER_SLOTS,
            SlotKind::Storage => MAX_STORAGE_SLOTS,
        }
    }
}

/// WGSL `@binding` for `slot` of the given kind.
///
/// ```
/// use stagecraft_engine::backend::wgpu::{binding_index, SlotKind};
/// assert_eq!(binding_index(SlotKind::Constant, 1), Some(1));
/// assert_eq!(binding_index(SlotKind::Texture, 0), Some(32));
/// assert_eq!(binding_index(SlotKind::Sampler, 2), Some(162));
/// assert_eq!(binding_index(SlotKind::Sampler, 16), None);
/// ```
pub const fn binding_index(kind: SlotKind, slot: u32) -> Option<u32> {
    if slot < kind.max_slots() {
        Some(kind.base() + slot)
    } else {
        None
    }
}

/// WGSL `@group` a stage's resources live in.
///
/// Render pipelines put the vertex stage in group 0 and the pixel stage in
/// group 1. Compute pipelines have a single group 0. Tessellation stages have
/// no wgpu counterpart.
pub const fn bind_group_index(stage: Stage) -> Option<u32> {
    match stage {
        Stage::Vertex | Stage::Compute => Some(0),
        Stage::Pixel => Some(1),
        Stage::Hull | Stage::Domain => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_ranges_do_not_overlap() {
        let kinds = [SlotKind::Constant, SlotKind::Texture, SlotKind::Sampler, SlotKind::Storage];
        for pair in kinds.windows(2) {
            let last = binding_index(pair[0], pair[0].max_slots() - 1).unwrap();
            assert!(last < pair[1].base(), "{:?} runs into {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn out_of_range_slots_have_no_binding() {
        assert_eq!(binding_index(SlotKind::Constant, 13), Some(13));
        assert_eq!(binding_index(SlotKind::Constant, 14), None);
        assert_eq!(binding_index(SlotKind::Storage, 7), Some(199));
        assert_eq!(binding_index(SlotKind::Storage, 8), None);
    }

    #[test]
    fn tessellation_stages_have_no_group() {
        assert_eq!(bind_group_index(Stage::Vertex), Some(0));
        assert_eq!(bind_group_index(Stage::Pixel), Some(1));
        assert_eq!(bind_group_index(Stage::Compute), Some(0));
        assert_eq!(bind_group_index(Stage::Hull), None);
        assert_eq!(bind_group_index(Stage::Domain), None);
    }
}
