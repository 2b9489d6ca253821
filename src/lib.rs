//! # volrend-rs: Volume Rendering Acceleration Primitives in Rust
//!
//! This crate implements the spatial-acceleration and volumetric-integration
//! primitives behind NeRF-style volume renderers: a Morton-order occupancy
//! grid over multiple cascades, adaptive ray marching that skips empty space,
//! and differentiable front-to-back volume integration.
//!
//! ## Architecture
//!
//! The crate is organized into several modules:
//!
//! - `core`: Morton codec, occupancy grid, rays, sample compaction
//! - `render`: Forward kernels (marching, integration) on the CPU
//! - `diff`: Differentiable operations (backward passes)
//! - `ops`: C-ABI entry points driven by byte-serialized descriptors
//! - `gpu`: GPU acceleration (feature-gated)
//!
//! The CPU kernels carry the reference semantics; the GPU path mirrors them
//! and is validated against them. Training frameworks hook in through `ops`,
//! which adds no semantics of its own.

// Morton codec, occupancy grid, rays, sample compaction
pub mod core;

// Forward kernels (CPU)
pub mod render;

// Differentiable operations (backward passes)
pub mod diff;

// C-ABI entry points (descriptor-driven raw ops)
pub mod ops;

// GPU acceleration (optional; a stub that errors at runtime is compiled
// without the feature)
pub mod gpu;

// Re-export commonly used types at crate root for convenience
pub use crate::core::{GridView, OccupancyGrid};
pub use crate::render::MarchConfig;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
