use crate::backend::{DeviceError, ResultCode};
use crate::vertex::VertexFormatError;

/// Initialization or teardown failure of a registry.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    /// A backend creation call failed.
    #[error("{registry} registry: failed to create `{item}`")]
    Create {
        registry: &'static str,
        item: String,
        #[source]
        source: DeviceError,
    },

    /// An external texture could not be loaded.
    #[error("resource registry: failed to load `{item}` ({code}): {detail}")]
    Load {
        item: String,
        code: ResultCode,
        detail: String,
    },

    #[error("geometry registry: mesh `{item}` is out of bounds: {detail}")]
    InvalidMesh { item: String, detail: String },

    #[error("invalid vertex format for `{item}`")]
    InvalidVertexFormat {
        item: String,
        #[source]
        source: VertexFormatError,
    },

    /// A program and a mesh drawn together disagree on the vertex layout.
    #[error(
        "vertex format mismatch: program `{program}` expects {expected}, mesh `{mesh}` uses {actual}"
    )]
    VertexFormatMismatch {
        program: String,
        mesh: String,
        expected: String,
        actual: String,
    },

    #[error("{registry} registry lists `{item}` more than once")]
    DuplicateKey { registry: &'static str, item: String },

    #[error("{registry} registry has no entry `{item}`")]
    Missing { registry: &'static str, item: String },

    #[error("{registry} registry: release failed")]
    Release {
        registry: &'static str,
        #[source]
        source: DeviceError,
    },
}

impl RegistryError {
    /// Backend result code behind this error, when there is one.
    pub fn code(&self) -> Option<ResultCode> {
        match self {
            RegistryError::Create { source, .. } | RegistryError::Release { source, .. } => {
                source.code()
            }
            RegistryError::Load { code, .. } => Some(*code),
            _ => None,
        }
    }
}

pub(crate) fn create_err(
    registry: &'static str,
    item: String,
) -> impl FnOnce(DeviceError) -> RegistryError {
    move |source| RegistryError::Create {
        registry,
        item,
        source,
    }
}
