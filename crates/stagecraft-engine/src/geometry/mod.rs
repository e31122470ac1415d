//! CPU mesh generation.

pub mod generator;

pub use generator::{cylinder, grid, MeshData};
