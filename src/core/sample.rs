//! Sample buffer layout: padded marching output -> compacted per-sample arrays.
//!
//! The marcher writes fixed-size per-ray slices (`max_n_samples` slots each)
//! plus a count per ray. Downstream consumers want one contiguous array over
//! all valid samples, addressed per ray by `(start, count)`. The start indices
//! are the exclusive prefix sum of the counts; their total is the
//! `total_samples` that sizes every integration buffer.

use nalgebra::Vector3;

/// One marched sample, as stored across the flat buffers.
#[derive(Clone, Copy, Debug)]
pub struct Sample {
    pub ray_index: u32,
    pub position: Vector3<f32>,
    /// Marching step this sample covers (the `ds` of the integral).
    pub step: f32,
    /// Distance from the ray origin.
    pub t: f32,
    pub cascade: u32,
}

/// Exclusive prefix sum of `counts` into `starts`; returns the total.
pub fn exclusive_prefix_sum(counts: &[u32], starts: &mut [u32]) -> u32 {
    assert_eq!(counts.len(), starts.len(), "counts/starts length mismatch");

    let mut running = 0u32;
    for (start, &count) in starts.iter_mut().zip(counts.iter()) {
        *start = running;
        running += count;
    }
    running
}

/// Contiguous per-sample arrays gathered from the padded marching output.
#[derive(Clone, Debug, Default)]
pub struct CompactedSamples {
    /// First-sample index per ray (exclusive prefix sum of counts).
    pub starts: Vec<u32>,
    /// Samples per ray, copied from the marcher.
    pub counts: Vec<u32>,
    /// Ray index per sample.
    pub ray_indices: Vec<u32>,
    /// `[total * 3]` sample positions.
    pub positions: Vec<f32>,
    /// `[total * 3]` ray direction per sample (constant along a ray).
    pub directions: Vec<f32>,
    /// `[total]` step sizes.
    pub dss: Vec<f32>,
    /// `[total]` ray parameters.
    pub ts: Vec<f32>,
    /// `[total]` cascade levels.
    pub cascades: Vec<u32>,
}

impl CompactedSamples {
    pub fn len(&self) -> usize {
        self.ts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ts.is_empty()
    }

    pub fn total_samples(&self) -> u32 {
        self.len() as u32
    }

    /// Reassemble the record for sample `i`.
    pub fn sample(&self, i: usize) -> Sample {
        Sample {
            ray_index: self.ray_indices[i],
            position: Vector3::new(
                self.positions[i * 3],
                self.positions[i * 3 + 1],
                self.positions[i * 3 + 2],
            ),
            step: self.dss[i],
            t: self.ts[i],
            cascade: self.cascades[i],
        }
    }
}

/// Gather padded marching output into contiguous per-sample arrays.
///
/// Padded inputs are `[n_rays * max_n_samples]`-shaped (positions with a
/// trailing xyz dimension); `directions` is the per-ray `[n_rays * 3]` array.
/// Only the first `counts[i]` slots of each ray are copied.
pub fn compact_samples(
    max_n_samples: usize,
    counts: &[u32],
    directions: &[f32],
    padded_positions: &[f32],
    padded_dss: &[f32],
    padded_ts: &[f32],
    padded_cascades: &[u32],
) -> CompactedSamples {
    let n_rays = counts.len();
    assert_eq!(directions.len(), n_rays * 3, "directions length mismatch");
    assert_eq!(padded_positions.len(), n_rays * max_n_samples * 3, "positions length mismatch");
    assert_eq!(padded_dss.len(), n_rays * max_n_samples, "step sizes length mismatch");
    assert_eq!(padded_ts.len(), n_rays * max_n_samples, "ts length mismatch");
    assert_eq!(padded_cascades.len(), n_rays * max_n_samples, "cascades length mismatch");

    let mut starts = vec![0u32; n_rays];
    let total = exclusive_prefix_sum(counts, &mut starts) as usize;

    let mut out = CompactedSamples {
        starts,
        counts: counts.to_vec(),
        ray_indices: Vec::with_capacity(total),
        positions: Vec::with_capacity(total * 3),
        directions: Vec::with_capacity(total * 3),
        dss: Vec::with_capacity(total),
        ts: Vec::with_capacity(total),
        cascades: Vec::with_capacity(total),
    };

    for ray in 0..n_rays {
        let n = counts[ray] as usize;
        debug_assert!(n <= max_n_samples);
        let base = ray * max_n_samples;
        let dir = &directions[ray * 3..ray * 3 + 3];

        out.positions.extend_from_slice(&padded_positions[base * 3..(base + n) * 3]);
        out.dss.extend_from_slice(&padded_dss[base..base + n]);
        out.ts.extend_from_slice(&padded_ts[base..base + n]);
        out.cascades.extend_from_slice(&padded_cascades[base..base + n]);
        for _ in 0..n {
            out.ray_indices.push(ray as u32);
            out.directions.extend_from_slice(dir);
        }
    }

    debug_assert_eq!(out.len(), total);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclusive_prefix_sum() {
        let counts = [3u32, 0, 5, 1];
        let mut starts = [0u32; 4];
        let total = exclusive_prefix_sum(&counts, &mut starts);
        assert_eq!(starts, [0, 3, 3, 8]);
        assert_eq!(total, 9);
    }

    #[test]
    fn test_compact_gathers_valid_slots_only() {
        // 2 rays, 3 slots each; ray 0 has 2 samples, ray 1 has 1.
        let counts = [2u32, 1];
        let directions = [1.0f32, 0.0, 0.0, 0.0, 1.0, 0.0];
        let positions = [
            0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 9.0, 9.0, 9.0, // ray 0 (slot 2 is padding)
            0.7, 0.8, 0.9, 9.0, 9.0, 9.0, 9.0, 9.0, 9.0, // ray 1
        ];
        let dss = [0.01, 0.02, 9.0, 0.03, 9.0, 9.0];
        let ts = [1.0, 1.1, 9.0, 2.0, 9.0, 9.0];
        let cascades = [0u32, 0, 7, 1, 7, 7];

        let compacted = compact_samples(3, &counts, &directions, &positions, &dss, &ts, &cascades);

        assert_eq!(compacted.total_samples(), 3);
        assert_eq!(compacted.starts, vec![0, 2]);
        assert_eq!(compacted.ray_indices, vec![0, 0, 1]);
        assert_eq!(compacted.positions, vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9]);
        assert_eq!(compacted.dss, vec![0.01, 0.02, 0.03]);
        assert_eq!(compacted.ts, vec![1.0, 1.1, 2.0]);
        assert_eq!(compacted.cascades, vec![0, 0, 1]);
        assert_eq!(compacted.directions, vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);

        let s = compacted.sample(2);
        assert_eq!(s.ray_index, 1);
        assert_eq!(s.cascade, 1);
        assert_eq!(s.t, 2.0);
    }

    #[test]
    fn test_zero_count_rays_contribute_nothing() {
        let counts = [0u32, 0, 2];
        let directions = [0.0f32; 9];
        let positions = vec![0.0f32; 3 * 2 * 3];
        let dss = vec![0.0f32; 6];
        let ts = vec![0.0f32; 6];
        let cascades = vec![0u32; 6];

        let compacted = compact_samples(2, &counts, &directions, &positions, &dss, &ts, &cascades);
        assert_eq!(compacted.total_samples(), 2);
        assert_eq!(compacted.starts, vec![0, 0, 0]);
        assert_eq!(compacted.ray_indices, vec![2, 2]);
    }
}
