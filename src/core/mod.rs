//! Core data structures and spatial indexing.
//!
//! This module contains the fundamental types used throughout the system:
//! - `Ray`: origin + unit direction, with scene-bound intersection
//! - `OccupancyGrid`: bit-packed multiscale occupancy cascades
//! - Morton codec: Z-order cell addressing
//! - Sample layout: padded-to-compacted buffer bookkeeping
//!
//! All types here are "pure data" - no GPU plumbing, no kernel entry points.

mod grid;
mod morton;
mod ray;
mod sample;

// Re-export public types
pub use grid::{
    cascade_for, cascades_for_bound, pack_density_into_bits, unpack_bits_into_density, GridView,
    OccupancyGrid,
};
pub use morton::{
    morton3d_batch, morton3d_decode, morton3d_encode, morton3d_invert_batch, MORTON_COORD_BITS,
    MORTON_COORD_MAX,
};
pub use ray::{make_near_far_from_bound, Ray};
pub use sample::{compact_samples, exclusive_prefix_sum, CompactedSamples, Sample};
