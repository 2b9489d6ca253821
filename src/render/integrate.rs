//! Front-to-back volume integration.
//!
//! Per ray, in sample order:
//!
//! ```text
//! alpha_i = 1 - exp(-sigma_i * ds_i)
//! w_i     = T_i * alpha_i          T_0 = 1,  T_{i+1} = T_i * (1 - alpha_i)
//! color   = sum w_i * c_i
//! depth   = sum w_i * t_i
//! opacity = sum w_i                (== 1 - T_final, always <= 1)
//! ```
//!
//! Samples are addressed through the compacted `(start, count)` layout. The
//! loop is strictly sequential within a ray (the transmittance recurrence)
//! and embarrassingly parallel across rays.

use rayon::prelude::*;

/// Compositing stops once transmittance drops below this; the remaining
/// samples of the ray contribute nothing (forward and backward agree on the
/// cutoff).
pub const TRANSMITTANCE_EPSILON: f32 = 1e-4;

fn check_sample_layout(starts: &[u32], counts: &[u32], total: usize) {
    assert_eq!(starts.len(), counts.len(), "starts/counts length mismatch");
    for (i, (&start, &count)) in starts.iter().zip(counts.iter()).enumerate() {
        assert!(
            start as usize + count as usize <= total,
            "ray {} sample range {}..{} exceeds total_samples {}",
            i,
            start,
            start + count,
            total
        );
    }
}

#[allow(clippy::too_many_arguments)]
fn integrate_single_ray(
    dss: &[f32],
    ts: &[f32],
    sigmas: &[f32],
    rgbs: &[f32],
    start: usize,
    count: usize,
    out_color: &mut [f32],
    out_depth: &mut f32,
    out_opacity: &mut f32,
) -> u32 {
    let mut transmittance = 1.0f32;
    let mut color = [0.0f32; 3];
    let mut depth = 0.0f32;
    let mut weight_sum = 0.0f32;
    let mut composited = 0u32;

    for i in start..start + count {
        if transmittance < TRANSMITTANCE_EPSILON {
            break;
        }
        let alpha = 1.0 - (-sigmas[i] * dss[i]).exp();
        let weight = transmittance * alpha;
        color[0] += weight * rgbs[i * 3];
        color[1] += weight * rgbs[i * 3 + 1];
        color[2] += weight * rgbs[i * 3 + 2];
        depth += weight * ts[i];
        weight_sum += weight;
        transmittance *= 1.0 - alpha;
        composited += 1;
    }

    out_color[0] = color[0];
    out_color[1] = color[1];
    out_color[2] = color[2];
    *out_depth = depth;
    *out_opacity = weight_sum;
    composited
}

/// Integrate a batch of rays; returns the number of samples actually
/// composited (the effective batch size under early termination).
///
/// Sample buffers are `[total_samples]`-shaped (`rgbs` with a trailing rgb
/// dimension); per-ray outputs are `[n_rays]`-shaped (`out_color` with a
/// trailing rgb dimension). Rays with `counts[i] == 0` produce zeroed
/// outputs.
#[allow(clippy::too_many_arguments)]
pub fn integrate_rays(
    starts: &[u32],
    counts: &[u32],
    dss: &[f32],
    ts: &[f32],
    sigmas: &[f32],
    rgbs: &[f32],
    out_color: &mut [f32],
    out_depth: &mut [f32],
    out_opacity: &mut [f32],
) -> u32 {
    let n_rays = counts.len();
    let total = dss.len();
    check_sample_layout(starts, counts, total);
    assert_eq!(ts.len(), total, "ts length mismatch");
    assert_eq!(sigmas.len(), total, "sigmas length mismatch");
    assert_eq!(rgbs.len(), total * 3, "rgbs length mismatch");
    assert_eq!(out_color.len(), n_rays * 3, "color output length mismatch");
    assert_eq!(out_depth.len(), n_rays, "depth output length mismatch");
    assert_eq!(out_opacity.len(), n_rays, "opacity output length mismatch");

    (
        starts.par_iter(),
        counts.par_iter(),
        out_color.par_chunks_mut(3),
        out_depth.par_iter_mut(),
        out_opacity.par_iter_mut(),
    )
        .into_par_iter()
        .map(|(&start, &count, color, depth, opacity)| {
            integrate_single_ray(
                dss,
                ts,
                sigmas,
                rgbs,
                start as usize,
                count as usize,
                color,
                depth,
                opacity,
            )
        })
        .sum()
}

/// Fold one marched chunk into per-ray running accumulators (render loops).
///
/// Chunk buffers are `[n_rays * steps_cap]`-shaped with `n_samples[i]` valid
/// slots per ray; `accum_color`/`accum_depth`/`accum_transmittance` persist
/// across calls (transmittance starts at 1). A ray terminates when its chunk
/// came up short (the marcher ran out of scene) or its transmittance falls
/// below [`TRANSMITTANCE_EPSILON`]; `terminated` rays are skipped on later
/// calls. Returns the number of rays that terminated during this call.
#[allow(clippy::too_many_arguments)]
pub fn integrate_rays_inference(
    steps_cap: u32,
    n_samples: &[u32],
    dss: &[f32],
    ts: &[f32],
    sigmas: &[f32],
    rgbs: &[f32],
    accum_color: &mut [f32],
    accum_depth: &mut [f32],
    accum_transmittance: &mut [f32],
    terminated: &mut [bool],
) -> u32 {
    let n_rays = n_samples.len();
    let cap = steps_cap as usize;
    assert!(cap > 0, "steps_cap must be positive");
    assert_eq!(dss.len(), n_rays * cap, "dss length mismatch");
    assert_eq!(ts.len(), n_rays * cap, "ts length mismatch");
    assert_eq!(sigmas.len(), n_rays * cap, "sigmas length mismatch");
    assert_eq!(rgbs.len(), n_rays * cap * 3, "rgbs length mismatch");
    assert_eq!(accum_color.len(), n_rays * 3, "color accumulator length mismatch");
    assert_eq!(accum_depth.len(), n_rays, "depth accumulator length mismatch");
    assert_eq!(accum_transmittance.len(), n_rays, "transmittance accumulator length mismatch");
    assert_eq!(terminated.len(), n_rays, "terminated length mismatch");

    (
        n_samples.par_iter(),
        accum_color.par_chunks_mut(3),
        accum_depth.par_iter_mut(),
        accum_transmittance.par_iter_mut(),
        terminated.par_iter_mut(),
    )
        .into_par_iter()
        .enumerate()
        .map(|(i, (&count, color, depth, transmittance, done))| {
            if *done {
                return 0u32;
            }

            let base = i * cap;
            let mut t_acc = *transmittance;
            for s in base..base + count as usize {
                if t_acc < TRANSMITTANCE_EPSILON {
                    break;
                }
                let alpha = 1.0 - (-sigmas[s] * dss[s]).exp();
                let weight = t_acc * alpha;
                color[0] += weight * rgbs[s * 3];
                color[1] += weight * rgbs[s * 3 + 1];
                color[2] += weight * rgbs[s * 3 + 2];
                *depth += weight * ts[s];
                t_acc *= 1.0 - alpha;
            }
            *transmittance = t_acc;

            // A short chunk means the marcher exhausted the scene.
            if count < steps_cap || t_acc < TRANSMITTANCE_EPSILON {
                *done = true;
                1
            } else {
                0
            }
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_zero_sample_ray_produces_zeros() {
        let mut color = [9.0f32; 3];
        let mut depth = [9.0f32; 1];
        let mut opacity = [9.0f32; 1];
        let measured = integrate_rays(
            &[0],
            &[0],
            &[],
            &[],
            &[],
            &[],
            &mut color,
            &mut depth,
            &mut opacity,
        );
        assert_eq!(measured, 0);
        assert_eq!(color, [0.0; 3]);
        assert_eq!(depth[0], 0.0);
        assert_eq!(opacity[0], 0.0);
    }

    #[test]
    fn test_single_sample_closed_form() {
        // sigma=1, ds=0.5: w = 1 - exp(-0.5) ~= 0.39347
        let mut color = [0.0f32; 3];
        let mut depth = [0.0f32; 1];
        let mut opacity = [0.0f32; 1];
        let measured = integrate_rays(
            &[0],
            &[1],
            &[0.5],
            &[3.25],
            &[1.0],
            &[1.0, 0.0, 0.0],
            &mut color,
            &mut depth,
            &mut opacity,
        );
        let w = 1.0 - (-0.5f32).exp();
        assert_eq!(measured, 1);
        assert_relative_eq!(color[0], w, epsilon = 1e-6);
        assert_eq!(color[1], 0.0);
        assert_eq!(color[2], 0.0);
        assert_relative_eq!(depth[0], w * 3.25, epsilon = 1e-6);
        assert_relative_eq!(opacity[0], w, epsilon = 1e-6);
    }

    #[test]
    fn test_two_samples_hand_computed() {
        let (s0, s1) = (0.8f32, 1.4f32);
        let (d0, d1) = (0.1f32, 0.2f32);
        let a0 = 1.0 - (-s0 * d0).exp();
        let a1 = 1.0 - (-s1 * d1).exp();
        let w0 = a0;
        let w1 = (1.0 - a0) * a1;

        let mut color = [0.0f32; 3];
        let mut depth = [0.0f32; 1];
        let mut opacity = [0.0f32; 1];
        integrate_rays(
            &[0],
            &[2],
            &[d0, d1],
            &[1.0, 1.1],
            &[s0, s1],
            &[0.2, 0.4, 0.6, 0.8, 1.0, 0.5],
            &mut color,
            &mut depth,
            &mut opacity,
        );

        assert_relative_eq!(color[0], w0 * 0.2 + w1 * 0.8, epsilon = 1e-6);
        assert_relative_eq!(color[1], w0 * 0.4 + w1 * 1.0, epsilon = 1e-6);
        assert_relative_eq!(color[2], w0 * 0.6 + w1 * 0.5, epsilon = 1e-6);
        assert_relative_eq!(depth[0], w0 * 1.0 + w1 * 1.1, epsilon = 1e-6);
        assert_relative_eq!(opacity[0], w0 + w1, epsilon = 1e-6);
    }

    #[test]
    fn test_opacity_never_exceeds_one() {
        // A dense ray saturates but stays <= 1.
        let n = 64;
        let dss = vec![0.1f32; n];
        let ts: Vec<f32> = (0..n).map(|i| 1.0 + i as f32 * 0.1).collect();
        let sigmas = vec![5.0f32; n];
        let rgbs = vec![1.0f32; n * 3];
        let mut color = [0.0f32; 3];
        let mut depth = [0.0f32; 1];
        let mut opacity = [0.0f32; 1];
        integrate_rays(
            &[0],
            &[n as u32],
            &dss,
            &ts,
            &sigmas,
            &rgbs,
            &mut color,
            &mut depth,
            &mut opacity,
        );
        assert!(opacity[0] <= 1.0);
        assert!(opacity[0] > 0.99);
    }

    #[test]
    fn test_early_termination_ignores_tail() {
        // First sample is nearly opaque; the tail must not contribute.
        let dss = [1.0f32, 1.0, 1.0];
        let ts = [1.0f32, 2.0, 3.0];
        let sigmas = [20.0f32, 100.0, 100.0];
        let rgbs = [0.5f32, 0.5, 0.5, 9.0, 9.0, 9.0, 9.0, 9.0, 9.0];
        let mut color = [0.0f32; 3];
        let mut depth = [0.0f32; 1];
        let mut opacity = [0.0f32; 1];
        let measured = integrate_rays(
            &[0],
            &[3],
            &dss,
            &ts,
            &sigmas,
            &rgbs,
            &mut color,
            &mut depth,
            &mut opacity,
        );

        // alpha_0 = 1 - e^-20, T_1 ~= 2e-9 < epsilon: only sample 0 composites.
        assert_eq!(measured, 1);
        let w = 1.0 - (-20.0f32).exp();
        assert_relative_eq!(color[0], w * 0.5, epsilon = 1e-6);
        assert_relative_eq!(depth[0], w * 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_sample_order_matters() {
        let run = |sigmas: [f32; 2], rgbs: [f32; 6]| -> f32 {
            let mut color = [0.0f32; 3];
            let mut depth = [0.0f32; 1];
            let mut opacity = [0.0f32; 1];
            integrate_rays(
                &[0],
                &[2],
                &[0.5, 0.5],
                &[1.0, 1.5],
                &sigmas,
                &rgbs,
                &mut color,
                &mut depth,
                &mut opacity,
            );
            color[0]
        };

        let front_heavy = run([2.0, 0.1], [1.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let back_heavy = run([0.1, 2.0], [0.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
        assert!(front_heavy > back_heavy);
    }

    #[test]
    fn test_multi_ray_layout() {
        // Ray 0: one sample; ray 1: empty; ray 2: one sample.
        let starts = [0u32, 1, 1];
        let counts = [1u32, 0, 1];
        let dss = [0.5f32, 0.25];
        let ts = [1.0f32, 2.0];
        let sigmas = [1.0f32, 2.0];
        let rgbs = [1.0f32, 0.0, 0.0, 0.0, 1.0, 0.0];
        let mut color = [0.0f32; 9];
        let mut depth = [0.0f32; 3];
        let mut opacity = [0.0f32; 3];
        let measured = integrate_rays(
            &starts,
            &counts,
            &dss,
            &ts,
            &sigmas,
            &rgbs,
            &mut color,
            &mut depth,
            &mut opacity,
        );

        assert_eq!(measured, 2);
        assert!(color[0] > 0.0 && color[1] == 0.0);
        assert_eq!(&color[3..6], &[0.0, 0.0, 0.0]);
        assert_eq!(opacity[1], 0.0);
        assert!(color[7] > 0.0 && color[6] == 0.0);
    }

    #[test]
    fn test_inference_chunks_match_one_shot() {
        // 1 ray, 4 samples split into two chunks of 2.
        let dss = [0.3f32, 0.2, 0.25, 0.15];
        let ts = [1.0f32, 1.3, 1.5, 1.75];
        let sigmas = [0.9f32, 1.2, 0.7, 1.5];
        let rgbs: Vec<f32> = (0..12).map(|i| 0.1 * i as f32).collect();

        let mut color = [0.0f32; 3];
        let mut depth = [0.0f32; 1];
        let mut opacity = [0.0f32; 1];
        integrate_rays(
            &[0],
            &[4],
            &dss,
            &ts,
            &sigmas,
            &rgbs,
            &mut color,
            &mut depth,
            &mut opacity,
        );

        let mut acc_color = [0.0f32; 3];
        let mut acc_depth = [0.0f32; 1];
        let mut acc_t = [1.0f32; 1];
        let mut done = [false; 1];
        for chunk in 0..2 {
            let r = chunk * 2;
            let terminated = integrate_rays_inference(
                2,
                &[2],
                &dss[r..r + 2],
                &ts[r..r + 2],
                &sigmas[r..r + 2],
                &rgbs[r * 3..(r + 2) * 3],
                &mut acc_color,
                &mut acc_depth,
                &mut acc_t,
                &mut done,
            );
            assert_eq!(terminated, 0);
            assert!(!done[0]);
        }

        assert_relative_eq!(acc_color[0], color[0], epsilon = 1e-6);
        assert_relative_eq!(acc_color[1], color[1], epsilon = 1e-6);
        assert_relative_eq!(acc_color[2], color[2], epsilon = 1e-6);
        assert_relative_eq!(acc_depth[0], depth[0], epsilon = 1e-6);
        assert_relative_eq!(1.0 - acc_t[0], opacity[0], epsilon = 1e-6);
    }

    #[test]
    fn test_inference_short_chunk_terminates() {
        let mut acc_color = [0.0f32; 3];
        let mut acc_depth = [0.0f32; 1];
        let mut acc_t = [1.0f32; 1];
        let mut done = [false; 1];
        let terminated = integrate_rays_inference(
            4,
            &[1], // short chunk: marcher exhausted
            &[0.5, 0.0, 0.0, 0.0],
            &[1.0, 0.0, 0.0, 0.0],
            &[1.0, 0.0, 0.0, 0.0],
            &vec![0.5f32; 12],
            &mut acc_color,
            &mut acc_depth,
            &mut acc_t,
            &mut done,
        );
        assert_eq!(terminated, 1);
        assert!(done[0]);

        // Terminated rays are skipped afterwards.
        let again = integrate_rays_inference(
            4,
            &[4],
            &[0.5; 4],
            &[1.0; 4],
            &[1.0; 4],
            &vec![0.5f32; 12],
            &mut acc_color,
            &mut acc_depth,
            &mut acc_t,
            &mut done,
        );
        assert_eq!(again, 0);
    }
}
