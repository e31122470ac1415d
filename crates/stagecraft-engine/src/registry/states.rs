use std::rc::Rc;

use crate::backend::{
    AddressMode, BlendDesc, BlendFactor, BlendOp, BlendStateId, BlendTarget, COLOR_WRITE_ALL,
    CullMode, Device, FillMode, Filter, OwnedSet, RasterizerDesc, RasterizerStateId, SamplerDesc,
    SamplerId,
};

use super::error::{create_err, RegistryError};

const NAME: &str = "pipeline state";

/// Fixed catalogue of fixed-function state objects.
///
/// Nothing here is mutated after `init_all`. Modes are switched by choosing a
/// different handle, see [`rasterizer_for`](Self::rasterizer_for).
pub struct PipelineStateRegistry {
    linear_sampler: SamplerId,
    anisotropic_sampler: SamplerId,
    wireframe_rasterizer: RasterizerStateId,
    alpha_to_coverage_blend: BlendStateId,
    transparent_blend: BlendStateId,
    owned: OwnedSet,
}

impl PipelineStateRegistry {
    pub fn init_all(device: &Rc<dyn Device>) -> Result<Self, RegistryError> {
        let mut owned = OwnedSet::new(device.clone());

        let linear_sampler = owned.track(
            device
                .create_sampler(&SamplerDesc {
                    label: "linear sampler",
                    filter: Filter::Linear,
                    address: AddressMode::Wrap,
                    max_anisotropy: 1,
                })
                .map_err(create_err(NAME, "linear sampler".into()))?,
        );

        let anisotropic_sampler = owned.track(
            device
                .create_sampler(&SamplerDesc {
                    label: "anisotropic sampler",
                    filter: Filter::Anisotropic,
                    address: AddressMode::Wrap,
                    max_anisotropy: 4,
                })
                .map_err(create_err(NAME, "anisotropic sampler".into()))?,
        );

        let wireframe_rasterizer = owned.track(
            device
                .create_rasterizer_state(&RasterizerDesc {
                    label: "wireframe rasterizer",
                    fill: FillMode::Wireframe,
                    cull: CullMode::Back,
                    front_counter_clockwise: false,
                    depth_clip: true,
                })
                .map_err(create_err(NAME, "wireframe rasterizer".into()))?,
        );

        let alpha_to_coverage_blend = owned.track(
            device
                .create_blend_state(&BlendDesc {
                    label: "alpha-to-coverage blend",
                    alpha_to_coverage: true,
                    target: None,
                    write_mask: COLOR_WRITE_ALL,
                })
                .map_err(create_err(NAME, "alpha-to-coverage blend".into()))?,
        );

        let transparent_blend = owned.track(
            device
                .create_blend_state(&BlendDesc {
                    label: "transparent blend",
                    alpha_to_coverage: false,
                    target: Some(BlendTarget {
                        src: BlendFactor::SrcAlpha,
                        dst: BlendFactor::InvSrcAlpha,
                        op: BlendOp::Add,
                        src_alpha: BlendFactor::One,
                        dst_alpha: BlendFactor::Zero,
                        op_alpha: BlendOp::Add,
                    }),
                    write_mask: COLOR_WRITE_ALL,
                })
                .map_err(create_err(NAME, "transparent blend".into()))?,
        );

        log::info!("{NAME} registry ready: {} objects", owned.len());

        Ok(Self {
            linear_sampler,
            anisotropic_sampler,
            wireframe_rasterizer,
            alpha_to_coverage_blend,
            transparent_blend,
            owned,
        })
    }

    pub fn destroy_all(mut self) -> Result<(), RegistryError> {
        let count = self.owned.len();
        self.owned
            .release_all()
            .map_err(|source| RegistryError::Release {
                registry: NAME,
                source,
            })?;
        log::info!("{NAME} registry destroyed: {count} objects");
        Ok(())
    }

    #[inline]
    pub fn linear_sampler(&self) -> SamplerId {
        self.linear_sampler
    }

    #[inline]
    pub fn anisotropic_sampler(&self) -> SamplerId {
        self.anisotropic_sampler
    }

    #[inline]
    pub fn wireframe_rasterizer(&self) -> RasterizerStateId {
        self.wireframe_rasterizer
    }

    #[inline]
    pub fn alpha_to_coverage_blend(&self) -> BlendStateId {
        self.alpha_to_coverage_blend
    }

    #[inline]
    pub fn transparent_blend(&self) -> BlendStateId {
        self.transparent_blend
    }

    /// Rasterizer to bind for the given mode; `None` is the backend default.
    #[inline]
    pub fn rasterizer_for(&self, wireframe: bool) -> Option<RasterizerStateId> {
        wireframe.then_some(self.wireframe_rasterizer)
    }

    pub fn object_count(&self) -> usize {
        self.owned.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockDevice;
    use crate::backend::ResultCode;

    fn setup() -> (Rc<MockDevice>, Rc<dyn Device>) {
        let mock = Rc::new(MockDevice::new());
        let device: Rc<dyn Device> = mock.clone();
        (mock, device)
    }

    #[test]
    fn creates_the_catalogue() {
        let (mock, device) = setup();
        let states = PipelineStateRegistry::init_all(&device).unwrap();
        assert_eq!(states.object_count(), 5);
        assert_eq!(mock.live_count(), 5);
        assert_eq!(
            mock.label_of(states.wireframe_rasterizer()).as_deref(),
            Some("wireframe rasterizer")
        );
    }

    #[test]
    fn rasterizer_selection() {
        let (_mock, device) = setup();
        let states = PipelineStateRegistry::init_all(&device).unwrap();
        assert_eq!(states.rasterizer_for(true), Some(states.wireframe_rasterizer()));
        assert_eq!(states.rasterizer_for(false), None);
    }

    #[test]
    fn round_trip_leaves_nothing_behind() {
        let (mock, device) = setup();
        let first = PipelineStateRegistry::init_all(&device).unwrap();
        let live_once = mock.live_count();
        first.destroy_all().unwrap();
        assert_eq!(mock.live_count(), 0);

        let second = PipelineStateRegistry::init_all(&device).unwrap();
        assert_eq!(mock.live_count(), live_once);
        assert_eq!(second.object_count(), live_once);
        assert_eq!(mock.released_count(), live_once as u64);
    }

    #[test]
    fn failure_releases_partial_catalogue() {
        let (mock, device) = setup();
        mock.fail_label("create_blend_state", "transparent blend", ResultCode::OutOfMemory);

        let err = PipelineStateRegistry::init_all(&device).err().unwrap();
        assert_eq!(err.code(), Some(ResultCode::OutOfMemory));
        assert!(err.to_string().contains("transparent blend"));
        assert_eq!(mock.created_count(), 4);
        assert_eq!(mock.live_count(), 0);
    }
}
