//! End-to-end pipeline tests: density grid -> occupancy bits -> ray marching
//! -> sample compaction -> volume integration -> background compositing.
//!
//! These run the CPU kernels the way a training loop would drive them, on
//! scenes small enough to reason about by hand.

use approx::assert_relative_eq;
use nalgebra::Vector3;

use volrend_rs::core::{
    compact_samples, make_near_far_from_bound, morton3d_encode, OccupancyGrid,
};
use volrend_rs::diff::composite_background;
use volrend_rs::render::{integrate_rays, march_rays, MarchConfig};

const PORTION: f32 = 1.0 / 256.0;

/// Occupancy grid for a centered sphere of the given radius, one cascade.
fn sphere_grid(g: u32, bound: f32, radius: f32) -> OccupancyGrid {
    let cells = (g as usize).pow(3);
    let mut density = vec![0.0f32; cells];
    for cx in 0..g {
        for cy in 0..g {
            for cz in 0..g {
                let center = Vector3::new(
                    ((cx as f32 + 0.5) / g as f32) * 2.0 - 1.0,
                    ((cy as f32 + 0.5) / g as f32) * 2.0 - 1.0,
                    ((cz as f32 + 0.5) / g as f32) * 2.0 - 1.0,
                ) * bound;
                if center.norm() < radius {
                    density[morton3d_encode(cx, cy, cz) as usize] = 1.0;
                }
            }
        }
    }
    let mut grid = OccupancyGrid::new(1, g, bound);
    grid.pack_from_density(&density, 0.5);
    grid
}

#[test]
fn test_sphere_scene_pipeline() {
    let grid = sphere_grid(16, 1.0, 0.5);
    let config = MarchConfig { max_n_samples: 512, stepsize_portion: PORTION };
    let max = config.max_n_samples as usize;

    // One ray through the sphere center, one through empty corner space.
    let origins = [0.0f32, 0.0, -3.0, 0.8, 0.8, -3.0];
    let directions = [0.0f32, 0.0, 1.0, 0.0, 0.0, 1.0];
    let n_rays = 2;

    let mut t_starts = vec![0.0f32; n_rays];
    let mut t_ends = vec![0.0f32; n_rays];
    make_near_far_from_bound(1.0, &origins, &directions, &mut t_starts, &mut t_ends);
    assert_relative_eq!(t_starts[0], 2.0, epsilon = 1e-5);
    assert_relative_eq!(t_ends[0], 4.0, epsilon = 1e-5);

    let mut positions = vec![0.0f32; n_rays * max * 3];
    let mut dss = vec![0.0f32; n_rays * max];
    let mut ts = vec![0.0f32; n_rays * max];
    let mut cascades = vec![0u32; n_rays * max];
    let mut counts = vec![0u32; n_rays];
    march_rays(
        grid.view(),
        &config,
        &origins,
        &directions,
        &t_starts,
        &t_ends,
        &[0.0, 0.0],
        &mut positions,
        &mut dss,
        &mut ts,
        &mut cascades,
        &mut counts,
    );

    assert!(counts[0] > 0, "central ray must sample the sphere");
    assert_eq!(counts[1], 0, "corner ray must miss it");

    let samples =
        compact_samples(max, &counts, &directions, &positions, &dss, &ts, &cascades);
    assert_eq!(samples.total_samples(), counts.iter().sum::<u32>());

    // Every sample lies inside the (cell-quantized) sphere.
    for i in 0..samples.len() {
        let s = samples.sample(i);
        assert!(s.position.norm() < 0.5 + 0.125 * 3f32.sqrt(), "sample outside sphere shell");
    }

    // Constant medium inside the sphere.
    let total = samples.len();
    let sigmas = vec![2.0f32; total];
    let mut rgbs = Vec::with_capacity(total * 3);
    for _ in 0..total {
        rgbs.extend_from_slice(&[0.9, 0.3, 0.2]);
    }

    let mut color = vec![0.0f32; n_rays * 3];
    let mut depth = vec![0.0f32; n_rays];
    let mut opacity = vec![0.0f32; n_rays];
    let measured = integrate_rays(
        &samples.starts,
        &samples.counts,
        &samples.dss,
        &samples.ts,
        &sigmas,
        &rgbs,
        &mut color,
        &mut depth,
        &mut opacity,
    );

    // Transmittance stays far above the cutoff here, so every sample lands.
    assert_eq!(measured, samples.total_samples());

    // Central ray: solid hit, depth near the sphere, color proportional to
    // the medium color.
    assert!(opacity[0] > 0.5 && opacity[0] <= 1.0 + 1e-5, "opacity {}", opacity[0]);
    let mean_depth = depth[0] / opacity[0];
    assert!(mean_depth > 2.4 && mean_depth < 3.6, "mean depth {mean_depth}");
    assert_relative_eq!(color[0] / opacity[0], 0.9, epsilon = 1e-4);
    assert_relative_eq!(color[1] / opacity[0], 0.3, epsilon = 1e-4);

    // Miss ray composites nothing.
    assert_eq!(opacity[1], 0.0);
    assert_eq!(depth[1], 0.0);
    assert_eq!(&color[3..6], &[0.0, 0.0, 0.0]);

    // Background compositing fills the miss ray with pure background.
    let bg = Vector3::new(0.1, 0.2, 0.3);
    let mut final_color = vec![0.0f32; n_rays * 3];
    composite_background(&color, &opacity, &bg, &mut final_color);
    assert_relative_eq!(final_color[3], 0.1, epsilon = 1e-6);
    assert_relative_eq!(final_color[4], 0.2, epsilon = 1e-6);
    assert_relative_eq!(final_color[5], 0.3, epsilon = 1e-6);
    // The hit ray gains only the leftover transmittance.
    assert_relative_eq!(final_color[0], color[0] + (1.0 - opacity[0]) * 0.1, epsilon = 1e-6);
}

#[test]
fn test_single_sample_closed_form() {
    // One occupied cell, one output slot: the composited weight has the
    // closed form w = 1 - exp(-sigma * ds).
    let mut grid = OccupancyGrid::new(1, 2, 1.0);
    grid.set_occupied(0, 1, 1, 1, true);
    let config = MarchConfig { max_n_samples: 1, stepsize_portion: PORTION };

    let origins = [-3.0f32, 0.5, 0.5];
    let directions = [1.0f32, 0.0, 0.0];
    let mut positions = vec![0.0f32; 3];
    let mut dss = vec![0.0f32; 1];
    let mut ts = vec![0.0f32; 1];
    let mut cascades = vec![0u32; 1];
    let mut counts = vec![0u32; 1];
    march_rays(
        grid.view(),
        &config,
        &origins,
        &directions,
        &[2.0],
        &[4.0],
        &[0.0],
        &mut positions,
        &mut dss,
        &mut ts,
        &mut cascades,
        &mut counts,
    );
    assert_eq!(counts[0], 1);

    let samples = compact_samples(1, &counts, &directions, &positions, &dss, &ts, &cascades);
    let mut color = vec![0.0f32; 3];
    let mut depth = vec![0.0f32; 1];
    let mut opacity = vec![0.0f32; 1];
    let measured = integrate_rays(
        &samples.starts,
        &samples.counts,
        &samples.dss,
        &samples.ts,
        &[1.0],
        &[1.0, 0.0, 0.0],
        &mut color,
        &mut depth,
        &mut opacity,
    );

    assert_eq!(measured, 1);
    let w = 1.0 - (-samples.dss[0]).exp();
    assert_relative_eq!(opacity[0], w, epsilon = 1e-6);
    assert_relative_eq!(color[0], w, epsilon = 1e-6);
    assert_eq!(color[1], 0.0);
    assert_relative_eq!(depth[0], w * samples.ts[0], epsilon = 1e-6);
}

#[test]
fn test_raw_surface_matches_safe_api() {
    // Drive marching and integration through the C entry points and compare
    // bitwise against the safe API on the same inputs.
    use std::ffi::c_void;
    use std::ptr;

    use volrend_rs::ops::{IntegratingDescriptor, MarchingDescriptor};

    let grid = sphere_grid(8, 1.0, 0.6);
    let config = MarchConfig { max_n_samples: 16, stepsize_portion: PORTION };
    let (n_rays, max) = (2usize, 16usize);

    let origins = [0.0f32, 0.0, -3.0, 0.25, 0.25, -3.0];
    let directions = [0.0f32, 0.0, 1.0, 0.0, 0.0, 1.0];
    let t_starts = [2.0f32, 2.0];
    let t_ends = [4.0f32, 4.0];
    let noises = [0.0f32, 0.0];

    // Safe API reference.
    let mut ref_positions = vec![0.0f32; n_rays * max * 3];
    let mut ref_dss = vec![0.0f32; n_rays * max];
    let mut ref_ts = vec![0.0f32; n_rays * max];
    let mut ref_cascades = vec![0u32; n_rays * max];
    let mut ref_counts = vec![0u32; n_rays];
    march_rays(
        grid.view(),
        &config,
        &origins,
        &directions,
        &t_starts,
        &t_ends,
        &noises,
        &mut ref_positions,
        &mut ref_dss,
        &mut ref_ts,
        &mut ref_cascades,
        &mut ref_counts,
    );
    assert!(ref_counts[0] > 0);

    // Raw surface.
    let desc = MarchingDescriptor {
        n_rays: n_rays as u32,
        max_n_samples: max as u32,
        k: 1,
        g: 8,
        bound: 1.0,
        stepsize_portion: PORTION,
    }
    .to_bytes();

    let mut raw_positions = vec![0.0f32; n_rays * max * 3];
    let mut raw_dss = vec![0.0f32; n_rays * max];
    let mut raw_ts = vec![0.0f32; n_rays * max];
    let mut raw_counts = vec![0u32; n_rays];
    let mut buffers: Vec<*mut c_void> = vec![
        grid.bits().as_ptr() as *mut c_void,
        origins.as_ptr() as *mut c_void,
        directions.as_ptr() as *mut c_void,
        t_starts.as_ptr() as *mut c_void,
        t_ends.as_ptr() as *mut c_void,
        noises.as_ptr() as *mut c_void,
        raw_positions.as_mut_ptr() as *mut c_void,
        raw_dss.as_mut_ptr() as *mut c_void,
        raw_ts.as_mut_ptr() as *mut c_void,
        raw_counts.as_mut_ptr() as *mut c_void,
    ];
    unsafe {
        volrend_rs::ops::march_rays(
            ptr::null_mut(),
            buffers.as_mut_ptr(),
            desc.as_ptr(),
            desc.len(),
        );
    }

    assert_eq!(raw_counts, ref_counts);
    assert_eq!(raw_positions, ref_positions);
    assert_eq!(raw_dss, ref_dss);
    assert_eq!(raw_ts, ref_ts);

    // Integration through both surfaces on the compacted batch.
    let samples =
        compact_samples(max, &ref_counts, &directions, &ref_positions, &ref_dss, &ref_ts, &ref_cascades);
    let total = samples.len();
    let sigmas = vec![1.5f32; total];
    let rgbs = vec![0.5f32; total * 3];

    let mut ref_color = vec![0.0f32; n_rays * 3];
    let mut ref_depth = vec![0.0f32; n_rays];
    let mut ref_opacity = vec![0.0f32; n_rays];
    integrate_rays(
        &samples.starts,
        &samples.counts,
        &samples.dss,
        &samples.ts,
        &sigmas,
        &rgbs,
        &mut ref_color,
        &mut ref_depth,
        &mut ref_opacity,
    );

    let desc = IntegratingDescriptor { n_rays: n_rays as u32, total_samples: total as u32 }
        .to_bytes();
    let mut raw_color = vec![0.0f32; n_rays * 3];
    let mut raw_depth = vec![0.0f32; n_rays];
    let mut raw_opacity = vec![0.0f32; n_rays];
    let mut buffers: Vec<*mut c_void> = vec![
        samples.starts.as_ptr() as *mut c_void,
        samples.counts.as_ptr() as *mut c_void,
        samples.dss.as_ptr() as *mut c_void,
        samples.ts.as_ptr() as *mut c_void,
        sigmas.as_ptr() as *mut c_void,
        rgbs.as_ptr() as *mut c_void,
        raw_color.as_mut_ptr() as *mut c_void,
        raw_depth.as_mut_ptr() as *mut c_void,
        raw_opacity.as_mut_ptr() as *mut c_void,
    ];
    unsafe {
        volrend_rs::ops::integrate_rays(
            ptr::null_mut(),
            buffers.as_mut_ptr(),
            desc.as_ptr(),
            desc.len(),
        );
    }

    assert_eq!(raw_color, ref_color);
    assert_eq!(raw_depth, ref_depth);
    assert_eq!(raw_opacity, ref_opacity);
}
