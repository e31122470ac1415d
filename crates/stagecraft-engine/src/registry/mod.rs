//! Explicit GPU object registries.
//!
//! Each registry is a plain value built by `init_all` and torn down by
//! `destroy_all(self)`. Objects are tracked in an [`OwnedSet`], so a failed
//! `init_all` or a dropped registry releases what it created in reverse order.
//!
//! [`RenderResources`] strings the four registries together in dependency
//! order: states, shaders, resources, geometry.
//!
//! [`OwnedSet`]: crate::backend::OwnedSet

mod context;
mod error;
mod geometry;
mod resources;
mod shaders;
mod states;

pub use context::{Pairing, RenderManifest, RenderResources};
pub use error::RegistryError;
pub use geometry::{DrawRange, GeometryRegistry, GeometrySpec, MeshDescriptor};
pub use resources::{
    DecodedImage, ImageFileLoader, LoadError, ResourceRegistry, TextureEntry, TextureLoader,
    TextureOrigin, TextureSpec,
};
pub use shaders::{ComputeSpec, ProgramSpec, ShaderProgram, ShaderRegistry};
pub use states::PipelineStateRegistry;

/// Key type a demo uses to name its registry entries, usually a fieldless enum.
pub trait RegistryKey: Copy + Eq + std::fmt::Debug {}

impl<T: Copy + Eq + std::fmt::Debug> RegistryKey for T {}

/// Rejects a manifest that lists a key twice. Runs before anything is created.
pub(crate) fn ensure_unique<K: RegistryKey>(
    registry: &'static str,
    keys: impl IntoIterator<Item = K>,
) -> Result<(), RegistryError> {
    let mut seen: Vec<K> = Vec::new();
    for key in keys {
        if seen.contains(&key) {
            return Err(RegistryError::DuplicateKey {
                registry,
                item: format!("{key:?}"),
            });
        }
        seen.push(key);
    }
    Ok(())
}

pub(crate) fn find<K: PartialEq + Copy, V>(entries: &[(K, V)], key: K) -> Option<&V> {
    entries.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
}
