use std::path::Path;
use std::rc::Rc;

use crate::backend::{
    Device, OwnedSet, ResultCode, TextureDesc, TextureFormat, TextureId, TextureViewId,
};

use super::error::{create_err, RegistryError};
use super::{ensure_unique, find, RegistryKey};

const NAME: &str = "resource";

/// Where a texture's texels come from.
#[derive(Debug, Clone, Copy)]
pub enum TextureOrigin<'a> {
    /// Decoded by the registry's [`TextureLoader`].
    File(&'a Path),
    /// Tightly packed RGBA8 texels.
    Rgba8 {
        width: u32,
        height: u32,
        pixels: &'a [u8],
    },
    /// A single texel.
    Solid([u8; 4]),
}

#[derive(Debug, Clone, Copy)]
pub struct TextureSpec<'a, K> {
    pub key: K,
    pub label: &'a str,
    pub origin: TextureOrigin<'a>,
    /// Sample as sRGB (color maps) or linear (height and normal maps).
    pub srgb: bool,
}

/// RGBA8 image produced by a [`TextureLoader`].
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{detail}")]
pub struct LoadError {
    pub code: ResultCode,
    pub detail: String,
}

/// Turns a file path into texels.
pub trait TextureLoader {
    fn decode(&self, path: &Path) -> Result<DecodedImage, LoadError>;
}

/// Decodes image files with the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageFileLoader;

impl TextureLoader for ImageFileLoader {
    fn decode(&self, path: &Path) -> Result<DecodedImage, LoadError> {
        let img = image::open(path).map_err(|e| {
            let code = match &e {
                image::ImageError::IoError(io) if io.kind() == std::io::ErrorKind::NotFound => {
                    ResultCode::NotFound
                }
                image::ImageError::Unsupported(_) => ResultCode::Unsupported,
                image::ImageError::Limits(_) => ResultCode::LimitExceeded,
                _ => ResultCode::InvalidArgument,
            };
            LoadError {
                code,
                detail: format!("{}: {e}", path.display()),
            }
        })?;

        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(DecodedImage {
            width,
            height,
            pixels: rgba.into_raw(),
        })
    }
}

/// A loaded texture and the view shaders read it through.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TextureEntry {
    pub texture: TextureId,
    pub view: TextureViewId,
    pub width: u32,
    pub height: u32,
}

/// Owns every read-only texture the demo declares.
pub struct ResourceRegistry<K: RegistryKey> {
    entries: Vec<(K, TextureEntry)>,
    owned: OwnedSet,
}

impl<K: RegistryKey> ResourceRegistry<K> {
    /// Loads every entry of `manifest`. Any failure aborts and releases what
    /// was already created.
    pub fn init_all(
        device: &Rc<dyn Device>,
        loader: &dyn TextureLoader,
        manifest: &[TextureSpec<'_, K>],
    ) -> Result<Self, RegistryError> {
        ensure_unique(NAME, manifest.iter().map(|t| t.key))?;

        let mut owned = OwnedSet::new(device.clone());
        let mut entries = Vec::with_capacity(manifest.len());

        for spec in manifest {
            let decoded;
            let (width, height, pixels): (u32, u32, &[u8]) = match spec.origin {
                TextureOrigin::File(path) => {
                    decoded = loader.decode(path).map_err(|e| RegistryError::Load {
                        item: spec.label.to_string(),
                        code: e.code,
                        detail: e.detail,
                    })?;
                    (decoded.width, decoded.height, &decoded.pixels)
                }
                TextureOrigin::Rgba8 {
                    width,
                    height,
                    pixels,
                } => (width, height, pixels),
                TextureOrigin::Solid(ref texel) => (1, 1, texel),
            };

            let format = if spec.srgb {
                TextureFormat::Rgba8UnormSrgb
            } else {
                TextureFormat::Rgba8Unorm
            };

            let texture = owned.track(
                device
                    .create_texture(
                        &TextureDesc {
                            label: spec.label,
                            width,
                            height,
                            format,
                        },
                        pixels,
                    )
                    .map_err(create_err(NAME, spec.label.to_string()))?,
            );
            let view = owned.track(
                device
                    .create_texture_view(texture)
                    .map_err(create_err(NAME, format!("{} view", spec.label)))?,
            );

            log::debug!("texture `{}`: {width}x{height} {format:?}", spec.label);
            entries.push((
                spec.key,
                TextureEntry {
                    texture,
                    view,
                    width,
                    height,
                },
            ));
        }

        log::info!("{NAME} registry ready: {} texture(s)", entries.len());

        Ok(Self { entries, owned })
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

    pub fn entry(&self, key: K) -> Result<&TextureEntry, RegistryError> {
        find(&self.entries, key).ok_or_else(|| RegistryError::Missing {
            registry: NAME,
            item: format!("{key:?}"),
        })
    }

    /// Shader-resource view for `key`.
    pub fn view(&self, key: K) -> Result<TextureViewId, RegistryError> {
        self.entry(key).map(|e| e.view)
    }

    pub fn try_view(&self, key: K) -> Option<TextureViewId> {
        find(&self.entries, key).map(|e| e.view)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn object_count(&self) -> usize {
        self.owned.len()
    }
}
