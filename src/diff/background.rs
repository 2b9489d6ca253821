//! Background compositing and its gradients.
//!
//! Integration leaves each ray with a premultiplied color and a total weight
//! (opacity); whatever transmittance remains is filled with a background
//! color:
//!
//!   final = color + (1 - opacity) * bg
//!
//! Kept outside the integration kernel so its `d_opacity` output chains
//! straight into the integrator backward.

use nalgebra::Vector3;
use rayon::prelude::*;

/// Blend `bg` into integrated colors. `colors` and `out_final` are
/// `[n_rays*3]`, `opacities` is `[n_rays]`.
pub fn composite_background(
    colors: &[f32],
    opacities: &[f32],
    bg: &Vector3<f32>,
    out_final: &mut [f32],
) {
    let n_rays = opacities.len();
    assert_eq!(colors.len(), n_rays * 3, "colors length mismatch");
    assert_eq!(out_final.len(), n_rays * 3, "output length mismatch");

    (
        colors.par_chunks(3),
        opacities.par_iter(),
        out_final.par_chunks_mut(3),
    )
        .into_par_iter()
        .for_each(|(color, &opacity, out)| {
            let rest = 1.0 - opacity;
            out[0] = color[0] + rest * bg.x;
            out[1] = color[1] + rest * bg.y;
            out[2] = color[2] + rest * bg.z;
        });
}

/// Backward pass for [`composite_background`].
///
/// Writes dL/d(color) and dL/d(opacity) per ray and returns dL/d(bg) summed
/// over the batch (one background color serves the whole batch).
pub fn composite_background_backward(
    opacities: &[f32],
    bg: &Vector3<f32>,
    d_final: &[f32],
    out_d_color: &mut [f32],
    out_d_opacity: &mut [f32],
) -> Vector3<f32> {
    let n_rays = opacities.len();
    assert_eq!(d_final.len(), n_rays * 3, "d_final length mismatch");
    assert_eq!(out_d_color.len(), n_rays * 3, "d_color output length mismatch");
    assert_eq!(out_d_opacity.len(), n_rays, "d_opacity output length mismatch");

    (
        opacities.par_iter(),
        d_final.par_chunks(3),
        out_d_color.par_chunks_mut(3),
        out_d_opacity.par_iter_mut(),
    )
        .into_par_iter()
        .map(|(&opacity, df, d_color, d_opacity)| {
            // final = color + (1 - opacity) * bg, differentiated termwise.
            d_color.copy_from_slice(df);
            *d_opacity = -(df[0] * bg.x + df[1] * bg.y + df[2] * bg.z);
            Vector3::new(df[0], df[1], df[2]) * (1.0 - opacity)
        })
        .reduce(Vector3::zeros, |a, b| a + b)
}
