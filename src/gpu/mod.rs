//! GPU acceleration (feature-gated).
//!
//! This module provides GPU implementations of the acceleration and
//! integration kernels using wgpu. Only available when compiled with
//! --features gpu
//!
//! Architecture:
//! - `context` - wgpu device/queue initialization
//! - `buffers` - GPU buffer management, upload and readback
//! - `types` - uniform parameter blocks
//! - `shaders` - WGSL shader modules
//! - `kernels` - one compute pipeline per kernel, dispatch and readback

#[cfg(feature = "gpu")]
mod context;
#[cfg(feature = "gpu")]
mod buffers;
#[cfg(feature = "gpu")]
mod types;
#[cfg(feature = "gpu")]
mod shaders;
#[cfg(feature = "gpu")]
mod kernels;

#[cfg(feature = "gpu")]
pub use context::{GpuContext, GpuError};
#[cfg(feature = "gpu")]
pub use kernels::{GpuKernels, GpuMarchOutput};
#[cfg(feature = "gpu")]
pub use types::{IntegrateParamsGPU, MarchParamsGPU, MortonParamsGPU, PackbitsParamsGPU};

#[cfg(not(feature = "gpu"))]
pub struct GpuKernels;

#[cfg(not(feature = "gpu"))]
impl GpuKernels {
    pub fn new() -> Result<Self, String> {
        Err("GPU support not enabled. Compile with --features gpu".to_string())
    }
}
