//! Volume rendering kernels (CPU implementation).
//!
//! This module implements the sampling half of the pipeline:
//! - Occupancy-grid ray marching (adaptive step, empty-space skipping)
//! - Front-to-back integration of the marched samples
//!
//! No gradients computed here - see `diff` module for backward passes.

pub mod integrate;
pub mod march;

// Re-export
pub use integrate::{integrate_rays, integrate_rays_inference, TRANSMITTANCE_EPSILON};
pub use march::{march_rays, march_rays_capped, MarchConfig};
