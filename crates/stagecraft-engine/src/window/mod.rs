//! Window + runtime loop.
//!
//! Owns the `winit` EventLoop and Window, and wires them to the GPU layer and
//! the application callbacks in `core`.

mod runtime;

pub use runtime::{Runtime, RuntimeConfig, RuntimeCtx};
