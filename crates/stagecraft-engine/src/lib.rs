//! Stagecraft engine crate.
//!
//! GPU resource lifecycle and multi-stage parameter binding:
//! - `backend`: the device seam, a recording mock and the wgpu backend
//! - `vertex`, `geometry`: shared vertex formats and CPU mesh generation
//! - `params`: per-stage constant parameter blocks
//! - `registry`: pipeline states, shaders, textures and meshes with explicit
//!   `init_all` / `destroy_all`
//! - `frame`: the per-draw binding orchestrator
//!
//! plus the platform pieces a demo needs (`device`, `window`, `core`, `time`,
//! `logging`).

pub mod backend;
pub mod frame;
pub mod geometry;
pub mod params;
pub mod registry;
pub mod vertex;

pub mod core;
pub mod device;
pub mod time;
pub mod window;

pub mod logging;
