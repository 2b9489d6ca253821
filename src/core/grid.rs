//! Multiscale occupancy grid: bit-packed cascades over the scene volume.
//!
//! The grid keeps K cascades of G^3 cells each, one bit per cell, with cells
//! laid out in Morton order inside each cascade. Cascade `l` covers the cube
//! of half-extent `min(2^l, bound)`, so with `K = 1 + ceil(log2(bound))` the
//! outermost cascade covers exactly the scene bounding box.
//!
//! Bits are packed little-endian within each byte: cell index `i` maps to
//! byte `i / 8`, bit `i % 8`.
//!
//! [`OccupancyGrid`] owns its bitfield; [`GridView`] borrows one (the kernel
//! entry points march over caller-owned memory without copying).

use nalgebra::Vector3;
use rayon::prelude::*;

use crate::core::morton::morton3d_encode;

/// Mark cells whose density exceeds `threshold` (strictly) in a bit array.
///
/// `density` has one value per grid cell in Morton order, `bits` one bit per
/// cell: `density.len() == bits.len() * 8`. Runs one task per output byte, so
/// no two tasks touch the same byte.
pub fn pack_density_into_bits(density: &[f32], threshold: f32, bits: &mut [u8]) {
    assert_eq!(
        density.len(),
        bits.len() * 8,
        "density length must be 8x the bitfield byte length"
    );

    bits.par_iter_mut().enumerate().for_each(|(byte_idx, byte)| {
        let cells = &density[byte_idx * 8..byte_idx * 8 + 8];
        let mut packed = 0u8;
        for (bit, &d) in cells.iter().enumerate() {
            if d > threshold {
                packed |= 1 << bit;
            }
        }
        *byte = packed;
    });
}

/// Expand a bit array back into 0.0/1.0 cell values.
///
/// Inverse of [`pack_density_into_bits`] up to thresholding; mainly used by
/// tests and grid maintenance code.
pub fn unpack_bits_into_density(bits: &[u8], density: &mut [f32]) {
    assert_eq!(density.len(), bits.len() * 8, "density/bitfield length mismatch");

    density.par_chunks_mut(8).zip(bits.par_iter()).for_each(|(cells, &byte)| {
        for (bit, cell) in cells.iter_mut().enumerate() {
            *cell = ((byte >> bit) & 1) as f32;
        }
    });
}

/// Pick the cascade for a sample: the finest level whose cube contains the
/// position and whose cells are at least as large as the step.
///
/// `m` is `max(|x|, |y|, |z|, dt * G / 2)`; the result is the smallest `l`
/// with `m < 2^l`, clamped to `[0, k)`. Monotone in `m`: farther from the
/// origin (or larger steps) selects coarser cascades.
#[inline]
pub fn cascade_for(m: f32, k: u32) -> u32 {
    let mut cascade = 0u32;
    while cascade + 1 < k && m >= (1u32 << cascade) as f32 {
        cascade += 1;
    }
    cascade
}

/// Number of cascades needed so the outermost one covers `bound`.
pub fn cascades_for_bound(bound: f32) -> u32 {
    assert!(bound > 0.0, "bound must be positive");
    let k = 1 + bound.log2().ceil() as i32;
    k.max(1) as u32
}

/// Borrowed view of an occupancy bitfield plus its geometry.
///
/// All cell queries live here so kernels can run directly over caller-owned
/// buffers; [`OccupancyGrid`] delegates to this.
#[derive(Clone, Copy, Debug)]
pub struct GridView<'a> {
    k: u32,
    g: u32,
    bound: f32,
    bits: &'a [u8],
}

impl<'a> GridView<'a> {
    /// Wrap a bitfield of `k * g^3 / 8` bytes.
    ///
    /// `g` must be a power of two no larger than 1024 (the Morton coordinate
    /// range); the paper value is 128.
    pub fn new(k: u32, g: u32, bound: f32, bits: &'a [u8]) -> Self {
        assert!(k >= 1, "need at least one cascade");
        assert!(g.is_power_of_two() && g <= 1024, "grid resolution must be a power of two <= 1024");
        assert!(bound > 0.0, "bound must be positive");
        assert_eq!(
            bits.len(),
            k as usize * (g as usize).pow(3) / 8,
            "bitfield byte length mismatch"
        );
        Self { k, g, bound, bits }
    }

    pub fn cascades(&self) -> u32 {
        self.k
    }

    pub fn resolution(&self) -> u32 {
        self.g
    }

    pub fn bound(&self) -> f32 {
        self.bound
    }

    pub fn cells_per_cascade(&self) -> usize {
        (self.g as usize).pow(3)
    }

    pub fn bits(&self) -> &'a [u8] {
        self.bits
    }

    /// Half-extent of the cube covered by `cascade`.
    #[inline]
    pub fn cascade_extent(&self, cascade: u32) -> f32 {
        ((1u32 << cascade) as f32).min(self.bound)
    }

    /// Cascade for a sample at `position` marched with step `dt`.
    #[inline]
    pub fn cascade_at(&self, position: &Vector3<f32>, dt: f32) -> u32 {
        let m = position.x.abs()
            .max(position.y.abs())
            .max(position.z.abs())
            .max(dt * self.g as f32 * 0.5);
        cascade_for(m, self.k)
    }

    /// Integer cell coordinates of `position` within `cascade`, clamped to the
    /// grid so positions on (or just past) the boundary stay addressable.
    #[inline]
    pub fn cell_coords(&self, cascade: u32, position: &Vector3<f32>) -> (u32, u32, u32) {
        let inv_extent = 0.5 / self.cascade_extent(cascade);
        let g = self.g as f32;
        let max_coord = (self.g - 1) as i32;
        let to_cell = |p: f32| -> u32 {
            (((p * inv_extent + 0.5) * g).floor() as i32).clamp(0, max_coord) as u32
        };
        (to_cell(position.x), to_cell(position.y), to_cell(position.z))
    }

    /// Flat bit index of a cell: `cascade * G^3 + morton(cx, cy, cz)`.
    #[inline]
    pub fn cell_index(&self, cascade: u32, cx: u32, cy: u32, cz: u32) -> usize {
        debug_assert!(cascade < self.k);
        debug_assert!(cx < self.g && cy < self.g && cz < self.g);
        cascade as usize * self.cells_per_cascade() + morton3d_encode(cx, cy, cz) as usize
    }

    #[inline]
    pub fn occupied(&self, bit_index: usize) -> bool {
        (self.bits[bit_index / 8] >> (bit_index % 8)) & 1 == 1
    }

    /// Whether the cell containing `position` at the level selected for step
    /// `dt` is occupied.
    #[inline]
    pub fn occupied_at(&self, position: &Vector3<f32>, dt: f32) -> bool {
        let cascade = self.cascade_at(position, dt);
        let (cx, cy, cz) = self.cell_coords(cascade, position);
        self.occupied(self.cell_index(cascade, cx, cy, cz))
    }
}

/// Bit-packed multiscale occupancy grid (owning).
#[derive(Clone, Debug)]
pub struct OccupancyGrid {
    k: u32,
    g: u32,
    bound: f32,
    bits: Vec<u8>,
}

impl OccupancyGrid {
    /// Create an all-empty grid with `k` cascades of resolution `g`.
    pub fn new(k: u32, g: u32, bound: f32) -> Self {
        assert!(k >= 1, "need at least one cascade");
        assert!(g.is_power_of_two() && g <= 1024, "grid resolution must be a power of two <= 1024");
        assert!(bound > 0.0, "bound must be positive");
        let n_bytes = (k as usize) * (g as usize).pow(3) / 8;
        Self { k, g, bound, bits: vec![0u8; n_bytes] }
    }

    /// Take ownership of an existing bitfield (`k * g^3 / 8` bytes).
    pub fn from_bits(k: u32, g: u32, bound: f32, bits: Vec<u8>) -> Self {
        let grid = Self::new(k, g, bound);
        assert_eq!(bits.len(), grid.bits.len(), "bitfield byte length mismatch");
        Self { bits, ..grid }
    }

    pub fn view(&self) -> GridView<'_> {
        GridView { k: self.k, g: self.g, bound: self.bound, bits: &self.bits }
    }

    pub fn cascades(&self) -> u32 {
        self.k
    }

    pub fn resolution(&self) -> u32 {
        self.g
    }

    pub fn bound(&self) -> f32 {
        self.bound
    }

    pub fn bits(&self) -> &[u8] {
        &self.bits
    }

    #[inline]
    pub fn cascade_extent(&self, cascade: u32) -> f32 {
        self.view().cascade_extent(cascade)
    }

    #[inline]
    pub fn cascade_at(&self, position: &Vector3<f32>, dt: f32) -> u32 {
        self.view().cascade_at(position, dt)
    }

    #[inline]
    pub fn cell_coords(&self, cascade: u32, position: &Vector3<f32>) -> (u32, u32, u32) {
        self.view().cell_coords(cascade, position)
    }

    #[inline]
    pub fn cell_index(&self, cascade: u32, cx: u32, cy: u32, cz: u32) -> usize {
        self.view().cell_index(cascade, cx, cy, cz)
    }

    #[inline]
    pub fn occupied(&self, bit_index: usize) -> bool {
        self.view().occupied(bit_index)
    }

    #[inline]
    pub fn occupied_at(&self, position: &Vector3<f32>, dt: f32) -> bool {
        self.view().occupied_at(position, dt)
    }

    /// Set a single cell bit; used when building grids from analytic fields.
    pub fn set_occupied(&mut self, cascade: u32, cx: u32, cy: u32, cz: u32, value: bool) {
        let idx = self.view().cell_index(cascade, cx, cy, cz);
        if value {
            self.bits[idx / 8] |= 1 << (idx % 8);
        } else {
            self.bits[idx / 8] &= !(1 << (idx % 8));
        }
    }

    /// Re-pack the whole grid from a density array (one value per cell over
    /// all cascades, Morton order within each cascade).
    pub fn pack_from_density(&mut self, density: &[f32], threshold: f32) {
        pack_density_into_bits(density, threshold, &mut self.bits);
    }
}
