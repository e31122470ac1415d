//! Core engine-facing contracts.
//!
//! This module defines the interface between the runtime (platform loop) and
//! applications: GPU readiness, window events, per-frame rendering and
//! teardown. It avoids leaking runtime internals into user code.

mod app;
mod ctx;

pub use app::{App, AppControl};
pub use ctx::{FrameCtx, WindowCtx};
