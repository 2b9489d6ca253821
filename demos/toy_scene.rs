//! Toy scene demo: march and integrate an analytic density field.
//!
//! Builds a fuzzy sphere, packs its occupancy grid, marches an orthographic
//! ray bundle through it, integrates the samples, and prints the composited
//! opacity as ASCII.
//!
//! Usage:
//!   cargo run --example toy_scene

use nalgebra::Vector3;

use volrend_rs::core::{
    compact_samples, make_near_far_from_bound, morton3d_encode, OccupancyGrid,
};
use volrend_rs::diff::composite_background;
use volrend_rs::render::{integrate_rays, march_rays, MarchConfig};

const GRID_RESOLUTION: u32 = 32;
const IMAGE_SIZE: usize = 24;

/// Fuzzy sphere: dense core, linear falloff to zero at r = 0.6.
fn density_at(p: &Vector3<f32>) -> f32 {
    4.0 * (1.0 - p.norm() / 0.6).max(0.0)
}

/// Position-keyed albedo so the image has some structure.
fn color_at(p: &Vector3<f32>) -> [f32; 3] {
    [
        (0.5 + 0.5 * p.x).clamp(0.0, 1.0),
        (0.5 + 0.5 * p.y).clamp(0.0, 1.0),
        0.7,
    ]
}

fn main() {
    env_logger::init();
    println!("volrend toy scene v{}", volrend_rs::VERSION);

    // Density grid in Morton order, then occupancy bits.
    let g = GRID_RESOLUTION;
    let cells = (g as usize).pow(3);
    let mut density = vec![0.0f32; cells];
    for cx in 0..g {
        for cy in 0..g {
            for cz in 0..g {
                let center = Vector3::new(
                    ((cx as f32 + 0.5) / g as f32) * 2.0 - 1.0,
                    ((cy as f32 + 0.5) / g as f32) * 2.0 - 1.0,
                    ((cz as f32 + 0.5) / g as f32) * 2.0 - 1.0,
                );
                density[morton3d_encode(cx, cy, cz) as usize] = density_at(&center);
            }
        }
    }
    let mut grid = OccupancyGrid::new(1, g, 1.0);
    grid.pack_from_density(&density, 0.01);
    let occupied = grid.bits().iter().map(|b| b.count_ones()).sum::<u32>();
    log::info!("grid: {} of {} cells occupied", occupied, cells);

    // Orthographic bundle looking down +z.
    let n_rays = IMAGE_SIZE * IMAGE_SIZE;
    let mut origins = Vec::with_capacity(n_rays * 3);
    let mut directions = Vec::with_capacity(n_rays * 3);
    for row in 0..IMAGE_SIZE {
        for col in 0..IMAGE_SIZE {
            let x = (col as f32 + 0.5) / IMAGE_SIZE as f32 * 1.6 - 0.8;
            let y = 0.8 - (row as f32 + 0.5) / IMAGE_SIZE as f32 * 1.6;
            origins.extend_from_slice(&[x, y, -3.0]);
            directions.extend_from_slice(&[0.0, 0.0, 1.0]);
        }
    }

    let mut t_starts = vec![0.0f32; n_rays];
    let mut t_ends = vec![0.0f32; n_rays];
    make_near_far_from_bound(1.0, &origins, &directions, &mut t_starts, &mut t_ends);
    let noises = vec![0.0f32; n_rays];

    // March.
    let config = MarchConfig { max_n_samples: 128, stepsize_portion: 1.0 / 256.0 };
    let max = config.max_n_samples as usize;
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
        &noises,
        &mut positions,
        &mut dss,
        &mut ts,
        &mut cascades,
        &mut counts,
    );

    let samples = compact_samples(max, &counts, &directions, &positions, &dss, &ts, &cascades);
    let total = samples.len();
    log::info!("marched {} rays into {} samples", n_rays, total);

    // Query the analytic field at the sample positions.
    let mut sigmas = Vec::with_capacity(total);
    let mut rgbs = Vec::with_capacity(total * 3);
    for i in 0..total {
        let s = samples.sample(i);
        sigmas.push(density_at(&s.position));
        rgbs.extend_from_slice(&color_at(&s.position));
    }

    // Integrate and composite over a dim blue background.
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

    let bg = Vector3::new(0.02, 0.02, 0.1);
    let mut final_color = vec![0.0f32; n_rays * 3];
    composite_background(&color, &opacity, &bg, &mut final_color);

    println!(
        "samples: {} emitted, {} composited ({} rays hit)",
        total,
        measured,
        counts.iter().filter(|&&c| c > 0).count()
    );

    // Opacity as ASCII, dark to dense.
    let ramp: &[u8] = b" .:-=+*#%@";
    for row in 0..IMAGE_SIZE {
        let mut line = String::with_capacity(IMAGE_SIZE);
        for col in 0..IMAGE_SIZE {
            let o = opacity[row * IMAGE_SIZE + col].clamp(0.0, 1.0);
            let idx = (o * (ramp.len() - 1) as f32).round() as usize;
            line.push(ramp[idx] as char);
        }
        println!("{line}");
    }

    let center = IMAGE_SIZE / 2 * IMAGE_SIZE + IMAGE_SIZE / 2;
    println!(
        "center pixel: rgb=({:.3}, {:.3}, {:.3}) opacity={:.3} mean depth={:.3}",
        final_color[center * 3],
        final_color[center * 3 + 1],
        final_color[center * 3 + 2],
        opacity[center],
        depth[center] / opacity[center].max(1e-6),
    );
}
