//! Gradients for front-to-back volume integration.
//!
//! Forward (scalar, per-ray):
//!   T_0 = 1
//!   for i in 0..N:
//!     alpha_i = 1 - exp(-sigma_i * ds_i)
//!     w_i     = T_i * alpha_i
//!     color  += w_i * c_i;  depth += w_i * t_i;  opacity += w_i
//!     T_{i+1} = T_i * (1 - alpha_i)
//!   stop once T_i < epsilon
//!
//! The differentiable inputs are `sigma_i` and `c_i`; `ds_i` and `t_i` are
//! treated as constants of the sampling. Upstream gradients arrive per ray
//! for color, depth and opacity.

use nalgebra::Vector3;
use rayon::prelude::*;

use crate::render::integrate::TRANSMITTANCE_EPSILON;

/// Backward pass for one ray, writing into its own slice of the per-sample
/// gradient buffers (relative indexing).
///
/// Every ray output is a weighted sum over samples, so the whole upstream
/// signal collapses to a per-sample scalar:
///
///   r_i = d_color . c_i + d_depth * t_i + d_opacity    (dL/dw_i)
///
/// `w_i = T_i * alpha_i` depends on `sigma_i` directly and on every earlier
/// sample through `T_i`. Differentiating the cumulative product gives the
/// division-free form
///
///   dL/dc_i     = w_i * d_color
///   dL/dsigma_i = ds_i * (T_{i+1} * r_i - S_i),   S_i = sum_{j>i} w_j * r_j
///
/// which the reverse scan accumulates in `suffix`.
#[allow(clippy::too_many_arguments)]
fn integrate_single_ray_backward(
    dss: &[f32],
    ts: &[f32],
    sigmas: &[f32],
    rgbs: &[f32],
    start: usize,
    count: usize,
    d_color: Vector3<f32>,
    d_depth: f32,
    d_opacity: f32,
    out_d_sigmas: &mut [f32],
    out_d_rgbs: &mut [f32],
) {
    // Forward scan: recompute the transmittances the forward pass saw,
    // honoring its early-termination point.
    let mut transmittance = Vec::with_capacity(count + 1);
    let mut t_acc = 1.0f32;
    transmittance.push(t_acc);
    let mut composited = 0usize;
    for i in start..start + count {
        if t_acc < TRANSMITTANCE_EPSILON {
            break;
        }
        let alpha = 1.0 - (-sigmas[i] * dss[i]).exp();
        t_acc *= 1.0 - alpha;
        transmittance.push(t_acc);
        composited += 1;
    }

    // Reverse scan. Samples past the termination point keep zero gradients,
    // matching the forward (they contributed nothing).
    let mut suffix = 0.0f32;
    for rel in (0..composited).rev() {
        let i = start + rel;
        let alpha = 1.0 - (-sigmas[i] * dss[i]).exp();
        let weight = transmittance[rel] * alpha;
        let c_i = Vector3::new(rgbs[i * 3], rgbs[i * 3 + 1], rgbs[i * 3 + 2]);
        let r_i = d_color.dot(&c_i) + d_depth * ts[i] + d_opacity;

        out_d_rgbs[rel * 3] = weight * d_color.x;
        out_d_rgbs[rel * 3 + 1] = weight * d_color.y;
        out_d_rgbs[rel * 3 + 2] = weight * d_color.z;
        out_d_sigmas[rel] = dss[i] * (transmittance[rel + 1] * r_i - suffix);

        suffix += weight * r_i;
    }
}

/// Backward pass for a batch of rays.
///
/// Inputs mirror [`crate::render::integrate_rays`] plus the upstream
/// gradients `d_color` `[n_rays*3]`, `d_depth` `[n_rays]`, `d_opacity`
/// `[n_rays]`. Outputs are per-sample: `out_d_sigmas` `[total_samples]`,
/// `out_d_rgbs` `[total_samples*3]`; slots past `sum(counts)` are zeroed.
///
/// `starts` must be the exclusive prefix sum of `counts` (the layout the
/// marcher emits); the backward relies on it to carve disjoint per-ray
/// output ranges.
#[allow(clippy::too_many_arguments)]
pub fn integrate_rays_backward(
    starts: &[u32],
    counts: &[u32],
    dss: &[f32],
    ts: &[f32],
    sigmas: &[f32],
    rgbs: &[f32],
    d_color: &[f32],
    d_depth: &[f32],
    d_opacity: &[f32],
    out_d_sigmas: &mut [f32],
    out_d_rgbs: &mut [f32],
) {
    let n_rays = counts.len();
    let total = dss.len();
    assert_eq!(starts.len(), n_rays, "starts/counts length mismatch");
    assert_eq!(ts.len(), total, "ts length mismatch");
    assert_eq!(sigmas.len(), total, "sigmas length mismatch");
    assert_eq!(rgbs.len(), total * 3, "rgbs length mismatch");
    assert_eq!(d_color.len(), n_rays * 3, "d_color length mismatch");
    assert_eq!(d_depth.len(), n_rays, "d_depth length mismatch");
    assert_eq!(d_opacity.len(), n_rays, "d_opacity length mismatch");
    assert_eq!(out_d_sigmas.len(), total, "d_sigmas output length mismatch");
    assert_eq!(out_d_rgbs.len(), total * 3, "d_rgbs output length mismatch");

    out_d_sigmas.fill(0.0);
    out_d_rgbs.fill(0.0);

    // Carve the gradient buffers into per-ray chunks so rayon can hand each
    // ray mutable access to its own range.
    let mut sigma_chunks: Vec<&mut [f32]> = Vec::with_capacity(n_rays);
    let mut rgb_chunks: Vec<&mut [f32]> = Vec::with_capacity(n_rays);
    let mut sigma_rest: &mut [f32] = out_d_sigmas;
    let mut rgb_rest: &mut [f32] = out_d_rgbs;
    let mut offset = 0u32;
    for (i, &count) in counts.iter().enumerate() {
        assert_eq!(
            starts[i], offset,
            "ray {} start {} is not the exclusive prefix sum of counts",
            i, starts[i]
        );
        assert!(
            offset as usize + count as usize <= total,
            "ray {} sample range exceeds total_samples {}",
            i,
            total
        );
        let (head, tail) = sigma_rest.split_at_mut(count as usize);
        sigma_chunks.push(head);
        sigma_rest = tail;
        let (head, tail) = rgb_rest.split_at_mut(count as usize * 3);
        rgb_chunks.push(head);
        rgb_rest = tail;
        offset += count;
    }

    (
        starts.par_iter(),
        counts.par_iter(),
        d_color.par_chunks(3),
        d_depth.par_iter(),
        d_opacity.par_iter(),
        sigma_chunks.into_par_iter(),
        rgb_chunks.into_par_iter(),
    )
        .into_par_iter()
        .for_each(|(&start, &count, dc, &dd, &dop, d_sigma, d_rgb)| {
            integrate_single_ray_backward(
                dss,
                ts,
                sigmas,
                rgbs,
                start as usize,
                count as usize,
                Vector3::new(dc[0], dc[1], dc[2]),
                dd,
                dop,
                d_sigma,
                d_rgb,
            );
        });
}
