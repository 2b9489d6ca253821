//! Occupancy-grid ray marching.
//!
//! Each ray walks from its near to its far bound in adaptive steps:
//!
//! ```text
//! dt(t) = clamp(t * stepsize_portion, sqrt(3)/1024, 2 * bound * sqrt(3)/1024)
//! ```
//!
//! (the intercept-theorem rule from NGP appendix E.1, with 1024 steps across
//! the unit-cube diagonal). At every step the occupancy grid is consulted at
//! the cascade selected for the sample's position and step size: occupied
//! cells emit a sample, empty cells are skipped by advancing to the cell's
//! exit boundary in dt-sized increments so the t sequence stays quantized.
//!
//! Rays are fully independent; the batch runs one rayon task per ray writing
//! into disjoint `max_n_samples`-sized slices.

use nalgebra::Vector3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::{GridView, Ray};

/// sqrt(3): length of the unit-cube diagonal.
pub const SQRT3: f32 = 1.732_050_8;

/// Minimal steps across the scene diagonal (NGP appendix E.1).
pub const MARCH_DIAGONAL_STEPS: f32 = 1024.0;

/// Batch-wide marching parameters; grid geometry travels with [`GridView`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct MarchConfig {
    /// Per-ray output slots; marching stops once a ray has emitted this many.
    pub max_n_samples: u32,
    /// Step-size growth factor, `dt = t * stepsize_portion` before clamping.
    /// The paper uses 1/256.
    pub stepsize_portion: f32,
}

#[inline]
fn dt_limits(bound: f32) -> (f32, f32) {
    let dt_min = SQRT3 / MARCH_DIAGONAL_STEPS;
    let dt_max = 2.0 * bound * SQRT3 / MARCH_DIAGONAL_STEPS;
    (dt_min, dt_max)
}

/// `clamp` written as max-then-min: for `bound < 0.5` the upper limit wins,
/// matching the grid-cell scale rather than panicking on an inverted range.
#[inline]
fn step_size(t: f32, portion: f32, dt_min: f32, dt_max: f32) -> f32 {
    (t * portion).max(dt_min).min(dt_max)
}

/// March one ray starting at `*t` until its far bound or the output slots run
/// out. Emits into the per-ray output slices and returns the sample count;
/// `*t` is left at the resume position (first un-marched step).
#[allow(clippy::too_many_arguments)]
fn march_single_ray(
    grid: GridView<'_>,
    ray: &Ray,
    t: &mut f32,
    t_end: f32,
    portion: f32,
    out_positions: &mut [f32],
    out_dss: &mut [f32],
    out_ts: &mut [f32],
    out_cascades: &mut [u32],
) -> u32 {
    debug_assert!((ray.direction.norm() - 1.0).abs() < 1e-3, "ray direction must be unit length");

    let max = out_dss.len();
    let (dt_min, dt_max) = dt_limits(grid.bound());
    let g = grid.resolution() as f32;
    let mut n = 0usize;

    while *t < t_end && n < max {
        let pos = ray.at(*t);
        let dt = step_size(*t, portion, dt_min, dt_max);
        let cascade = grid.cascade_at(&pos, dt);
        let (cx, cy, cz) = grid.cell_coords(cascade, &pos);

        if grid.occupied(grid.cell_index(cascade, cx, cy, cz)) {
            out_positions[n * 3] = pos.x;
            out_positions[n * 3 + 1] = pos.y;
            out_positions[n * 3 + 2] = pos.z;
            out_dss[n] = dt;
            out_ts[n] = *t;
            out_cascades[n] = cascade;
            n += 1;
            *t += dt;
        } else {
            // Distance to the cell's exit boundary along each axis. A zero
            // direction component yields inf (or NaN when the position sits
            // exactly on that boundary); `min` discards both.
            let extent = grid.cascade_extent(cascade);
            let cell = [cx as f32, cy as f32, cz as f32];
            let mut nearest = f32::INFINITY;
            for axis in 0..3 {
                let d = ray.direction[axis];
                let boundary = ((cell[axis] + 0.5 + 0.5 * d.signum()) / g * 2.0 - 1.0) * extent;
                nearest = nearest.min((boundary - pos[axis]) / d);
            }
            let t_exit = *t + nearest.max(0.0);
            // Always take at least one step so a boundary-aligned position
            // cannot stall the walk.
            loop {
                *t += step_size(*t, portion, dt_min, dt_max);
                if *t >= t_exit {
                    break;
                }
            }
        }
    }

    n as u32
}

/// March a batch of rays through the occupancy grid.
///
/// Inputs are flat: `origins`/`directions` are `[n_rays * 3]`,
/// `t_starts`/`t_ends`/`noises` are `[n_rays]`. `noises` in [0, 1) jitter
/// each ray's first step (pass zeros for deterministic marching).
///
/// Outputs are padded per ray to `max_n_samples` slots (`out_positions` with
/// a trailing xyz dimension); unused slots are zeroed. `out_counts[i]` is the
/// number of valid samples of ray `i`; rays that never hit occupied space get
/// count 0.
#[allow(clippy::too_many_arguments)]
pub fn march_rays(
    grid: GridView<'_>,
    config: &MarchConfig,
    origins: &[f32],
    directions: &[f32],
    t_starts: &[f32],
    t_ends: &[f32],
    noises: &[f32],
    out_positions: &mut [f32],
    out_dss: &mut [f32],
    out_ts: &mut [f32],
    out_cascades: &mut [u32],
    out_counts: &mut [u32],
) {
    let n_rays = out_counts.len();
    let max = config.max_n_samples as usize;
    assert!(max > 0, "max_n_samples must be positive");
    assert!(config.stepsize_portion >= 0.0, "stepsize_portion must be non-negative");
    assert_eq!(origins.len(), n_rays * 3, "origins length mismatch");
    assert_eq!(directions.len(), n_rays * 3, "directions length mismatch");
    assert_eq!(t_starts.len(), n_rays, "t_starts length mismatch");
    assert_eq!(t_ends.len(), n_rays, "t_ends length mismatch");
    assert_eq!(noises.len(), n_rays, "noises length mismatch");
    assert_eq!(out_positions.len(), n_rays * max * 3, "positions length mismatch");
    assert_eq!(out_dss.len(), n_rays * max, "step sizes length mismatch");
    assert_eq!(out_ts.len(), n_rays * max, "ts length mismatch");
    assert_eq!(out_cascades.len(), n_rays * max, "cascades length mismatch");

    let (dt_min, dt_max) = dt_limits(grid.bound());

    (
        out_counts.par_iter_mut(),
        out_positions.par_chunks_mut(max * 3),
        out_dss.par_chunks_mut(max),
        out_ts.par_chunks_mut(max),
        out_cascades.par_chunks_mut(max),
    )
        .into_par_iter()
        .enumerate()
        .for_each(|(i, (count, positions, dss, ts, cascades))| {
            positions.fill(0.0);
            dss.fill(0.0);
            ts.fill(0.0);
            cascades.fill(0);

            let ray = Ray::new(
                Vector3::new(origins[i * 3], origins[i * 3 + 1], origins[i * 3 + 2]),
                Vector3::new(directions[i * 3], directions[i * 3 + 1], directions[i * 3 + 2]),
            );
            let t_start = t_starts[i];
            let mut t = t_start
                + step_size(t_start, config.stepsize_portion, dt_min, dt_max) * noises[i];
            *count = march_single_ray(
                grid,
                &ray,
                &mut t,
                t_ends[i],
                config.stepsize_portion,
                positions,
                dss,
                ts,
                cascades,
            );
        });
}

/// Resumable marching for render loops: emit at most `steps_cap` samples per
/// ray, then stop.
///
/// `t_currs` carries each ray's marching position across calls and is updated
/// in place; rays with `t_currs[i] >= t_ends[i]` are finished and emit
/// nothing. A live ray returning count 0 has exhausted the grid and can be
/// dropped by the caller. No start-point jitter here.
#[allow(clippy::too_many_arguments)]
pub fn march_rays_capped(
    grid: GridView<'_>,
    steps_cap: u32,
    stepsize_portion: f32,
    origins: &[f32],
    directions: &[f32],
    t_currs: &mut [f32],
    t_ends: &[f32],
    out_positions: &mut [f32],
    out_dss: &mut [f32],
    out_ts: &mut [f32],
    out_cascades: &mut [u32],
    out_counts: &mut [u32],
) {
    let n_rays = out_counts.len();
    let cap = steps_cap as usize;
    assert!(cap > 0, "steps_cap must be positive");
    assert_eq!(origins.len(), n_rays * 3, "origins length mismatch");
    assert_eq!(directions.len(), n_rays * 3, "directions length mismatch");
    assert_eq!(t_currs.len(), n_rays, "t_currs length mismatch");
    assert_eq!(t_ends.len(), n_rays, "t_ends length mismatch");
    assert_eq!(out_positions.len(), n_rays * cap * 3, "positions length mismatch");
    assert_eq!(out_dss.len(), n_rays * cap, "step sizes length mismatch");
    assert_eq!(out_ts.len(), n_rays * cap, "ts length mismatch");
    assert_eq!(out_cascades.len(), n_rays * cap, "cascades length mismatch");

    (
        out_counts.par_iter_mut(),
        t_currs.par_iter_mut(),
        out_positions.par_chunks_mut(cap * 3),
        out_dss.par_chunks_mut(cap),
        out_ts.par_chunks_mut(cap),
        out_cascades.par_chunks_mut(cap),
    )
        .into_par_iter()
        .enumerate()
        .for_each(|(i, (count, t, positions, dss, ts, cascades))| {
            positions.fill(0.0);
            dss.fill(0.0);
            ts.fill(0.0);
            cascades.fill(0);

            let ray = Ray::new(
                Vector3::new(origins[i * 3], origins[i * 3 + 1], origins[i * 3 + 2]),
                Vector3::new(directions[i * 3], directions[i * 3 + 1], directions[i * 3 + 2]),
            );
            *count = march_single_ray(
                grid,
                &ray,
                t,
                t_ends[i],
                stepsize_portion,
                positions,
                dss,
                ts,
                cascades,
            );
        });
}
