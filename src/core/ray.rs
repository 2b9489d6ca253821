//! Ray representation and scene-bound intersection.

use nalgebra::Vector3;

/// A ray with unit direction.
///
/// Directions are assumed normalized by the caller; marching step sizes are
/// distances along the ray, which only line up with world units for unit
/// directions.
#[derive(Clone, Copy, Debug)]
pub struct Ray {
    pub origin: Vector3<f32>,
    pub direction: Vector3<f32>,
}

impl Ray {
    pub fn new(origin: Vector3<f32>, direction: Vector3<f32>) -> Self {
        Self { origin, direction }
    }

    /// Point at parameter `t`.
    #[inline]
    pub fn at(&self, t: f32) -> Vector3<f32> {
        self.origin + self.direction * t
    }

    /// Intersect with the axis-aligned cube `[-bound, bound]^3`.
    ///
    /// Returns `(t_near, t_far)` clamped so that `t_near >= 0` (segments
    /// behind the origin are cut off). A miss returns an empty interval with
    /// `t_near >= t_far`; callers treat such rays as producing no samples.
    pub fn intersect_bound(&self, bound: f32) -> (f32, f32) {
        let mut t_near = 0.0f32;
        let mut t_far = f32::INFINITY;

        for axis in 0..3 {
            let o = self.origin[axis];
            let d = self.direction[axis];
            // Slab test per axis; IEEE infinities handle parallel rays.
            let inv = 1.0 / d;
            let t0 = (-bound - o) * inv;
            let t1 = (bound - o) * inv;
            let (lo, hi) = if t0 <= t1 { (t0, t1) } else { (t1, t0) };
            t_near = t_near.max(lo);
            t_far = t_far.min(hi);
        }

        (t_near, t_far)
    }
}

/// Compute near/far bounds for a flat batch of rays against `[-bound, bound]^3`.
///
/// `origins` and `directions` are `[n_rays * 3]`; `t_starts`/`t_ends` are
/// `[n_rays]`. Rays that miss the cube get `t_start >= t_end`.
pub fn make_near_far_from_bound(
    bound: f32,
    origins: &[f32],
    directions: &[f32],
    t_starts: &mut [f32],
    t_ends: &mut [f32],
) {
    let n_rays = t_starts.len();
    assert_eq!(origins.len(), n_rays * 3, "origins length mismatch");
    assert_eq!(directions.len(), n_rays * 3, "directions length mismatch");
    assert_eq!(t_ends.len(), n_rays, "t_ends length mismatch");
    assert!(bound > 0.0, "bound must be positive");

    for i in 0..n_rays {
        let ray = Ray::new(
            Vector3::new(origins[i * 3], origins[i * 3 + 1], origins[i * 3 + 2]),
            Vector3::new(directions[i * 3], directions[i * 3 + 1], directions[i * 3 + 2]),
        );
        let (near, far) = ray.intersect_bound(bound);
        t_starts[i] = near;
        t_ends[i] = far;
    }
}
