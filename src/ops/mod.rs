//! Raw kernel entry points.
//!
//! Every op shares the uniform C signature
//!
//! ```text
//! fn op(stream, buffers, opaque, opaque_len)
//! ```
//!
//! where `buffers` is an array of buffer pointers (inputs first, then
//! outputs, in the order each op documents) and `opaque` is an encoded
//! descriptor from [`descriptor`] carrying the batch shapes. The CPU build
//! ignores `stream`.
//!
//! A malformed descriptor aborts the process: this boundary has no error
//! channel, and continuing with wrong shapes would read out of bounds.

pub mod descriptor;

pub use descriptor::{
    DescriptorError, IntegratingDescriptor, MarchingDescriptor, Morton3dDescriptor,
    PackbitsDescriptor,
};

use std::ffi::c_void;
use std::slice;

use crate::core::GridView;
use crate::render::MarchConfig;

fn decode_or_abort<T>(op: &'static str, decoded: Result<T, DescriptorError>) -> T {
    match decoded {
        Ok(desc) => desc,
        Err(err) => panic!("{op}: {err}"),
    }
}

/// Compress a density grid into the occupancy bitfield.
///
/// Buffers: `[density f32 x n_bytes*8] -> [bits u8 x n_bytes]`.
///
/// # Safety
///
/// `buffers` must point to 2 valid, non-overlapping buffers of the sizes
/// implied by the descriptor; `opaque` must point to `opaque_len` readable
/// bytes.
#[no_mangle]
pub unsafe extern "C" fn pack_density_into_bits(
    _stream: *mut c_void,
    buffers: *mut *mut c_void,
    opaque: *const u8,
    opaque_len: usize,
) {
    let desc = decode_or_abort(
        "pack_density_into_bits",
        PackbitsDescriptor::from_bytes(slice::from_raw_parts(opaque, opaque_len)),
    );
    let n_bytes = desc.n_bytes as usize;
    let buffers = slice::from_raw_parts(buffers, 2);

    let density = slice::from_raw_parts(buffers[0] as *const f32, n_bytes * 8);
    let bits = slice::from_raw_parts_mut(buffers[1] as *mut u8, n_bytes);
    crate::core::pack_density_into_bits(density, desc.density_threshold, bits);
}

/// Encode cell coordinates into Morton codes.
///
/// Buffers: `[coords u32 x length*3] -> [codes u32 x length]`.
///
/// # Safety
///
/// `buffers` must point to 2 valid, non-overlapping buffers of the sizes
/// implied by the descriptor; `opaque` must point to `opaque_len` readable
/// bytes.
#[no_mangle]
pub unsafe extern "C" fn morton3d(
    _stream: *mut c_void,
    buffers: *mut *mut c_void,
    opaque: *const u8,
    opaque_len: usize,
) {
    let desc = decode_or_abort(
        "morton3d",
        Morton3dDescriptor::from_bytes(slice::from_raw_parts(opaque, opaque_len)),
    );
    let length = desc.length as usize;
    let buffers = slice::from_raw_parts(buffers, 2);

    let coords = slice::from_raw_parts(buffers[0] as *const u32, length * 3);
    let codes = slice::from_raw_parts_mut(buffers[1] as *mut u32, length);
    crate::core::morton3d_batch(coords, codes);
}

/// Decode Morton codes back into cell coordinates.
///
/// Buffers: `[codes u32 x length] -> [coords u32 x length*3]`.
///
/// # Safety
///
/// `buffers` must point to 2 valid, non-overlapping buffers of the sizes
/// implied by the descriptor; `opaque` must point to `opaque_len` readable
/// bytes.
#[no_mangle]
pub unsafe extern "C" fn morton3d_invert(
    _stream: *mut c_void,
    buffers: *mut *mut c_void,
    opaque: *const u8,
    opaque_len: usize,
) {
    let desc = decode_or_abort(
        "morton3d_invert",
        Morton3dDescriptor::from_bytes(slice::from_raw_parts(opaque, opaque_len)),
    );
    let length = desc.length as usize;
    let buffers = slice::from_raw_parts(buffers, 2);

    let codes = slice::from_raw_parts(buffers[0] as *const u32, length);
    let coords = slice::from_raw_parts_mut(buffers[1] as *mut u32, length * 3);
    crate::core::morton3d_invert_batch(codes, coords);
}

/// March rays through an occupancy grid.
///
/// Buffers:
/// `[bits u8 x k*g^3/8, origins f32 x n*3, directions f32 x n*3,
///   t_starts f32 x n, t_ends f32 x n, noises f32 x n] ->
/// [positions f32 x n*max*3, dss f32 x n*max, ts f32 x n*max, counts u32 x n]`.
///
/// # Safety
///
/// `buffers` must point to 10 valid buffers of the sizes implied by the
/// descriptor, outputs non-overlapping with everything else; `opaque` must
/// point to `opaque_len` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn march_rays(
    _stream: *mut c_void,
    buffers: *mut *mut c_void,
    opaque: *const u8,
    opaque_len: usize,
) {
    let desc = decode_or_abort(
        "march_rays",
        MarchingDescriptor::from_bytes(slice::from_raw_parts(opaque, opaque_len)),
    );
    let n = desc.n_rays as usize;
    let max = desc.max_n_samples as usize;
    let n_cells = desc.k as usize * (desc.g as usize).pow(3);
    let buffers = slice::from_raw_parts(buffers, 10);

    let bits = slice::from_raw_parts(buffers[0] as *const u8, n_cells / 8);
    let origins = slice::from_raw_parts(buffers[1] as *const f32, n * 3);
    let directions = slice::from_raw_parts(buffers[2] as *const f32, n * 3);
    let t_starts = slice::from_raw_parts(buffers[3] as *const f32, n);
    let t_ends = slice::from_raw_parts(buffers[4] as *const f32, n);
    let noises = slice::from_raw_parts(buffers[5] as *const f32, n);
    let out_positions = slice::from_raw_parts_mut(buffers[6] as *mut f32, n * max * 3);
    let out_dss = slice::from_raw_parts_mut(buffers[7] as *mut f32, n * max);
    let out_ts = slice::from_raw_parts_mut(buffers[8] as *mut f32, n * max);
    let out_counts = slice::from_raw_parts_mut(buffers[9] as *mut u32, n);

    let grid = GridView::new(desc.k, desc.g, desc.bound, bits);
    let config = MarchConfig {
        max_n_samples: desc.max_n_samples,
        stepsize_portion: desc.stepsize_portion,
    };
    // Cascade levels have no slot in this contract; kept as scratch.
    let mut cascades = vec![0u32; n * max];
    crate::render::march_rays(
        grid,
        &config,
        origins,
        directions,
        t_starts,
        t_ends,
        noises,
        out_positions,
        out_dss,
        out_ts,
        &mut cascades,
        out_counts,
    );

    let total: u32 = out_counts.iter().sum();
    log::trace!("march_rays: {} rays emitted {} samples", n, total);
}

/// Integrate marched samples into per-ray color, depth and opacity.
///
/// Buffers:
/// `[starts u32 x n, counts u32 x n, dss f32 x s, ts f32 x s,
///   sigmas f32 x s, rgbs f32 x s*3] ->
/// [color f32 x n*3, depth f32 x n, opacity f32 x n]`.
///
/// # Safety
///
/// `buffers` must point to 9 valid buffers of the sizes implied by the
/// descriptor, outputs non-overlapping with everything else; `opaque` must
/// point to `opaque_len` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn integrate_rays(
    _stream: *mut c_void,
    buffers: *mut *mut c_void,
    opaque: *const u8,
    opaque_len: usize,
) {
    let desc = decode_or_abort(
        "integrate_rays",
        IntegratingDescriptor::from_bytes(slice::from_raw_parts(opaque, opaque_len)),
    );
    let n = desc.n_rays as usize;
    let total = desc.total_samples as usize;
    let buffers = slice::from_raw_parts(buffers, 9);

    let starts = slice::from_raw_parts(buffers[0] as *const u32, n);
    let counts = slice::from_raw_parts(buffers[1] as *const u32, n);
    let dss = slice::from_raw_parts(buffers[2] as *const f32, total);
    let ts = slice::from_raw_parts(buffers[3] as *const f32, total);
    let sigmas = slice::from_raw_parts(buffers[4] as *const f32, total);
    let rgbs = slice::from_raw_parts(buffers[5] as *const f32, total * 3);
    let out_color = slice::from_raw_parts_mut(buffers[6] as *mut f32, n * 3);
    let out_depth = slice::from_raw_parts_mut(buffers[7] as *mut f32, n);
    let out_opacity = slice::from_raw_parts_mut(buffers[8] as *mut f32, n);

    let measured = crate::render::integrate_rays(
        starts, counts, dss, ts, sigmas, rgbs, out_color, out_depth, out_opacity,
    );
    log::trace!("integrate_rays: composited {} of {} samples", measured, total);
}

/// Backward pass of [`integrate_rays`].
///
/// Buffers:
/// `[starts u32 x n, counts u32 x n, dss f32 x s, ts f32 x s,
///   sigmas f32 x s, rgbs f32 x s*3, d_color f32 x n*3, d_depth f32 x n,
///   d_opacity f32 x n] -> [d_sigmas f32 x s, d_rgbs f32 x s*3]`.
///
/// # Safety
///
/// `buffers` must point to 11 valid buffers of the sizes implied by the
/// descriptor, outputs non-overlapping with everything else; `opaque` must
/// point to `opaque_len` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn integrate_rays_backward(
    _stream: *mut c_void,
    buffers: *mut *mut c_void,
    opaque: *const u8,
    opaque_len: usize,
) {
    let desc = decode_or_abort(
        "integrate_rays_backward",
        IntegratingDescriptor::from_bytes(slice::from_raw_parts(opaque, opaque_len)),
    );
    let n = desc.n_rays as usize;
    let total = desc.total_samples as usize;
    let buffers = slice::from_raw_parts(buffers, 11);

    let starts = slice::from_raw_parts(buffers[0] as *const u32, n);
    let counts = slice::from_raw_parts(buffers[1] as *const u32, n);
    let dss = slice::from_raw_parts(buffers[2] as *const f32, total);
    let ts = slice::from_raw_parts(buffers[3] as *const f32, total);
    let sigmas = slice::from_raw_parts(buffers[4] as *const f32, total);
    let rgbs = slice::from_raw_parts(buffers[5] as *const f32, total * 3);
    let d_color = slice::from_raw_parts(buffers[6] as *const f32, n * 3);
    let d_depth = slice::from_raw_parts(buffers[7] as *const f32, n);
    let d_opacity = slice::from_raw_parts(buffers[8] as *const f32, n);
    let out_d_sigmas = slice::from_raw_parts_mut(buffers[9] as *mut f32, total);
    let out_d_rgbs = slice::from_raw_parts_mut(buffers[10] as *mut f32, total * 3);

    crate::diff::integrate_rays_backward(
        starts,
        counts,
        dss,
        ts,
        sigmas,
        rgbs,
        d_color,
        d_depth,
        d_opacity,
        out_d_sigmas,
        out_d_rgbs,
    );
}
