use std::fmt;

use super::handle::GpuObject;

/// Backend result code attached to a failed call.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ResultCode {
    /// A descriptor or argument was rejected.
    InvalidArgument,
    OutOfMemory,
    /// The backend cannot express the request (e.g. tessellation stages on wgpu).
    Unsupported,
    /// A device limit (buffer size, texture dimension, anisotropy) was exceeded.
    LimitExceeded,
    DeviceLost,
    /// An external asset could not be found or decoded.
    NotFound,
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResultCode::InvalidArgument => "invalid argument",
            ResultCode::OutOfMemory => "out of memory",
            ResultCode::Unsupported => "unsupported",
            ResultCode::LimitExceeded => "limit exceeded",
            ResultCode::DeviceLost => "device lost",
            ResultCode::NotFound => "not found",
        };
        f.write_str(s)
    }
}

/// Failure reported by a `Device` or `CommandContext` entry point.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeviceError {
    #[error("{call} failed ({code}): {detail}")]
    Call {
        call: &'static str,
        code: ResultCode,
        detail: String,
    },

    #[error("{0} is not a live object")]
    UnknownObject(GpuObject),

    #[error("{0} was already released")]
    AlreadyReleased(GpuObject),

    #[error("{object} is still referenced by {} live object(s)", dependents.len())]
    StillReferenced {
        object: GpuObject,
        dependents: Vec<GpuObject>,
    },
}

impl DeviceError {
    pub fn call(call: &'static str, code: ResultCode, detail: impl Into<String>) -> Self {
        DeviceError::Call {
            call,
            code,
            detail: detail.into(),
        }
    }

    /// Result code of a failed backend call, if this error came from one.
    pub fn code(&self) -> Option<ResultCode> {
        match self {
            DeviceError::Call { code, .. } => Some(*code),
            _ => None,
        }
    }
}
