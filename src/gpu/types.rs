//! GPU-side parameter blocks.
//!
//! Uniform mirrors of the op descriptors:
//! - Flat memory layout, sized to a 16-byte multiple as WGSL requires
//! - bytemuck Pod + Zeroable traits
//! - Marching additionally carries the precomputed step-size clamp range
//!   so the shader never recomputes it per thread

use crate::ops::{IntegratingDescriptor, MarchingDescriptor};
use crate::render::march::{MARCH_DIAGONAL_STEPS, SQRT3};

/// Marching batch parameters.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MarchParamsGPU {
    pub n_rays: u32,
    pub max_n_samples: u32,
    pub k: u32,
    pub g: u32,
    pub bound: f32,
    pub stepsize_portion: f32,
    /// Step clamp range, max-then-min (upper limit wins for bound < 0.5).
    pub dt_min: f32,
    pub dt_max: f32,
}

impl From<MarchingDescriptor> for MarchParamsGPU {
    fn from(d: MarchingDescriptor) -> Self {
        Self {
            n_rays: d.n_rays,
            max_n_samples: d.max_n_samples,
            k: d.k,
            g: d.g,
            bound: d.bound,
            stepsize_portion: d.stepsize_portion,
            dt_min: SQRT3 / MARCH_DIAGONAL_STEPS,
            dt_max: 2.0 * d.bound * SQRT3 / MARCH_DIAGONAL_STEPS,
        }
    }
}

/// Integration batch parameters (forward and backward).
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct IntegrateParamsGPU {
    pub n_rays: u32,
    pub total_samples: u32,
    pub _pad: [u32; 2],
}

impl From<IntegratingDescriptor> for IntegrateParamsGPU {
    fn from(d: IntegratingDescriptor) -> Self {
        Self {
            n_rays: d.n_rays,
            total_samples: d.total_samples,
            _pad: [0; 2],
        }
    }
}

/// Morton encode/decode batch parameters.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MortonParamsGPU {
    pub length: u32,
    pub _pad: [u32; 3],
}

/// Density-packing batch parameters. One thread packs one 32-cell word;
/// `n_cells` guards the tail of the last word.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PackbitsParamsGPU {
    pub n_words: u32,
    pub n_cells: u32,
    pub density_threshold: f32,
    pub _pad: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_block_sizes() {
        // WGSL uniform blocks round up to 16-byte multiples.
        assert_eq!(std::mem::size_of::<MarchParamsGPU>() % 16, 0);
        assert_eq!(std::mem::size_of::<IntegrateParamsGPU>() % 16, 0);
        assert_eq!(std::mem::size_of::<MortonParamsGPU>() % 16, 0);
        assert_eq!(std::mem::size_of::<PackbitsParamsGPU>() % 16, 0);
    }

    #[test]
    fn test_march_params_precompute_step_clamp() {
        let params = MarchParamsGPU::from(MarchingDescriptor {
            n_rays: 1,
            max_n_samples: 16,
            k: 1,
            g: 128,
            bound: 1.0,
            stepsize_portion: 0.0,
        });
        assert!((params.dt_min - SQRT3 / 1024.0).abs() < 1e-9);
        assert!((params.dt_max - 2.0 * SQRT3 / 1024.0).abs() < 1e-9);
    }
}
