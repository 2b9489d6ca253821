//! WGSL shader modules.
//!
//! This module contains compute shaders for:
//! - Morton (Z-order) encoding and decoding
//! - Density-to-bitfield packing
//! - Occupancy-grid ray marching
//! - Volume integration (forward and backward)

use wgpu::{Device, ShaderModule};

/// WGSL shader for the Morton codec.
///
/// Two entry points over the same bindings: `morton3d_encode` reads coordinate
/// triplets from `src` and writes codes to `dst`, `morton3d_decode` the
/// reverse. The bit tricks match the CPU codec in `core::morton`.
pub const MORTON_SHADER: &str = r#"
struct MortonParams {
    length: u32,
    pad0: u32,
    pad1: u32,
    pad2: u32,
}

@group(0) @binding(0) var<uniform> params: MortonParams;
@group(0) @binding(1) var<storage, read> src: array<u32>;
@group(0) @binding(2) var<storage, read_write> dst: array<u32>;

fn spread_bits(v_in: u32) -> u32 {
    var v = v_in & 0x3FFu;
    v = (v * 0x10001u) & 0xFF0000FFu;
    v = (v * 0x101u) & 0x0F00F00Fu;
    v = (v * 0x11u) & 0xC30C30C3u;
    v = (v * 0x5u) & 0x49249249u;
    return v;
}

fn compact_bits(v_in: u32) -> u32 {
    var v = v_in & 0x49249249u;
    v = (v | (v >> 2u)) & 0xC30C30C3u;
    v = (v | (v >> 4u)) & 0x0F00F00Fu;
    v = (v | (v >> 8u)) & 0xFF0000FFu;
    v = (v | (v >> 16u)) & 0x3FFu;
    return v;
}

@compute @workgroup_size(256)
fn morton3d_encode(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let i = global_id.x;
    if (i >= params.length) {
        return;
    }
    dst[i] = spread_bits(src[i * 3u])
        | (spread_bits(src[i * 3u + 1u]) << 1u)
        | (spread_bits(src[i * 3u + 2u]) << 2u);
}

@compute @workgroup_size(256)
fn morton3d_decode(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let i = global_id.x;
    if (i >= params.length) {
        return;
    }
    let code = src[i];
    dst[i * 3u] = compact_bits(code);
    dst[i * 3u + 1u] = compact_bits(code >> 1u);
    dst[i * 3u + 2u] = compact_bits(code >> 2u);
}
"#;

pub fn create_morton_shader(device: &Device) -> ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Morton Codec Shader"),
        source: wgpu::ShaderSource::Wgsl(MORTON_SHADER.into()),
    })
}

/// WGSL shader for packing a density grid into an occupancy bitfield.
pub const PACKBITS_SHADER: &str = include_str!("packbits.wgsl");

pub fn create_packbits_shader(device: &Device) -> ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Packbits Shader"),
        source: wgpu::ShaderSource::Wgsl(PACKBITS_SHADER.into()),
    })
}

/// WGSL shader for occupancy-grid ray marching.
pub const MARCH_SHADER: &str = include_str!("march.wgsl");

pub fn create_march_shader(device: &Device) -> ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Ray Marching Shader"),
        source: wgpu::ShaderSource::Wgsl(MARCH_SHADER.into()),
    })
}

/// WGSL shader for volume integration (forward and backward entry points).
pub const INTEGRATE_SHADER: &str = include_str!("integrate.wgsl");

pub fn create_integrate_shader(device: &Device) -> ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Volume Integration Shader"),
        source: wgpu::ShaderSource::Wgsl(INTEGRATE_SHADER.into()),
    })
}
