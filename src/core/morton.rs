//! Morton (Z-order) encoding for 3D grid cells.
//!
//! Occupancy grid cells are laid out in Morton order so that spatially
//! adjacent cells land on nearby bit indices. Codes interleave three 10-bit
//! coordinates into a 30-bit index:
//!
//! ```text
//! code = x₀ y₀ z₀ x₁ y₁ z₁ ... x₉ y₉ z₉   (x at bit 0)
//! ```
//!
//! Encoding uses the "magic bits" multiply/mask sequence; decoding is the
//! mirrored compaction. Both are exact inverses on [0, 1024)³.

/// Coordinates per axis are 10 bits: [0, 1024).
pub const MORTON_COORD_BITS: u32 = 10;

/// Upper bound (exclusive) for each coordinate.
pub const MORTON_COORD_MAX: u32 = 1 << MORTON_COORD_BITS;

/// Spread the low 10 bits of `v` so bit i lands at bit 3i.
#[inline(always)]
fn spread_bits(v: u32) -> u32 {
    let mut v = v & 0x0000_03FF;
    v = v.wrapping_mul(0x0001_0001) & 0xFF00_00FF;
    v = v.wrapping_mul(0x0000_0101) & 0x0F00_F00F;
    v = v.wrapping_mul(0x0000_0011) & 0xC30C_30C3;
    v = v.wrapping_mul(0x0000_0005) & 0x4924_9249;
    v
}

/// Collect every 3rd bit of `v` back into the low 10 bits.
#[inline(always)]
fn compact_bits(v: u32) -> u32 {
    let mut v = v & 0x4924_9249;
    v = (v | (v >> 2)) & 0xC30C_30C3;
    v = (v | (v >> 4)) & 0x0F00_F00F;
    v = (v | (v >> 8)) & 0xFF00_00FF;
    v = (v | (v >> 16)) & 0x0000_03FF;
    v
}

/// Encode three 10-bit coordinates into a 30-bit Morton code.
///
/// Coordinates outside [0, 1024) are a caller contract violation.
#[inline(always)]
pub fn morton3d_encode(x: u32, y: u32, z: u32) -> u32 {
    debug_assert!(x < MORTON_COORD_MAX, "x coordinate {} out of Morton range", x);
    debug_assert!(y < MORTON_COORD_MAX, "y coordinate {} out of Morton range", y);
    debug_assert!(z < MORTON_COORD_MAX, "z coordinate {} out of Morton range", z);

    spread_bits(x) | (spread_bits(y) << 1) | (spread_bits(z) << 2)
}

/// Decode a 30-bit Morton code back into (x, y, z).
#[inline(always)]
pub fn morton3d_decode(code: u32) -> (u32, u32, u32) {
    (
        compact_bits(code),
        compact_bits(code >> 1),
        compact_bits(code >> 2),
    )
}

/// Batch encode: `coords` is `[length * 3]` (xyz interleaved), `codes` is `[length]`.
pub fn morton3d_batch(coords: &[u32], codes: &mut [u32]) {
    assert_eq!(coords.len(), codes.len() * 3, "coords/codes length mismatch");

    for (code, xyz) in codes.iter_mut().zip(coords.chunks_exact(3)) {
        *code = morton3d_encode(xyz[0], xyz[1], xyz[2]);
    }
}

/// Batch decode: `codes` is `[length]`, `coords` is `[length * 3]` (xyz interleaved).
pub fn morton3d_invert_batch(codes: &[u32], coords: &mut [u32]) {
    assert_eq!(coords.len(), codes.len() * 3, "codes/coords length mismatch");

    for (xyz, code) in coords.chunks_exact_mut(3).zip(codes.iter().copied()) {
        let (x, y, z) = morton3d_decode(code);
        xyz[0] = x;
        xyz[1] = y;
        xyz[2] = z;
    }
}
