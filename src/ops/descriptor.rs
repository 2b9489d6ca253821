//! Opaque kernel descriptors.
//!
//! Every raw op receives a small binary blob carrying the batch shapes that
//! cannot be recovered from the buffer pointers alone. Layouts are fixed and
//! little-endian; a blob of the wrong size is rejected outright, never
//! partially read. The serde derives serve host-side configuration only; the
//! wire blob is always the hand-written layout documented per struct.

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when decoding a descriptor blob.
#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("{kind} descriptor expects {expected} bytes, got {got}")]
    WrongLength {
        kind: &'static str,
        expected: usize,
        got: usize,
    },
}

fn check_len(kind: &'static str, expected: usize, bytes: &[u8]) -> Result<(), DescriptorError> {
    if bytes.len() != expected {
        return Err(DescriptorError::WrongLength {
            kind,
            expected,
            got: bytes.len(),
        });
    }
    Ok(())
}

/// Shape of a density-packing batch.
///
/// Binary layout (little-endian):
/// - n_bytes: u32 (output bitfield size; input density has n_bytes*8 cells)
/// - density_threshold: f32
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PackbitsDescriptor {
    pub n_bytes: u32,
    pub density_threshold: f32,
}

impl PackbitsDescriptor {
    pub const SIZE: usize = 8;

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DescriptorError> {
        check_len("packbits", Self::SIZE, bytes)?;
        Ok(Self {
            n_bytes: LittleEndian::read_u32(&bytes[0..4]),
            density_threshold: LittleEndian::read_f32(&bytes[4..8]),
        })
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        LittleEndian::write_u32(&mut buf[0..4], self.n_bytes);
        LittleEndian::write_f32(&mut buf[4..8], self.density_threshold);
        buf
    }
}

/// Shape of a Morton encode/decode batch.
///
/// Binary layout (little-endian):
/// - length: u32 (number of coordinate triples / codes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Morton3dDescriptor {
    pub length: u32,
}

impl Morton3dDescriptor {
    pub const SIZE: usize = 4;

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DescriptorError> {
        check_len("morton3d", Self::SIZE, bytes)?;
        Ok(Self {
            length: LittleEndian::read_u32(&bytes[0..4]),
        })
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        LittleEndian::write_u32(&mut buf[0..4], self.length);
        buf
    }
}

/// Shape and grid geometry of a marching batch.
///
/// Binary layout (little-endian):
/// - n_rays: u32
/// - max_n_samples: u32
/// - k: u32 (cascade count)
/// - g: u32 (cells per cascade axis)
/// - bound: f32 (scene half-extent)
/// - stepsize_portion: f32
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarchingDescriptor {
    pub n_rays: u32,
    pub max_n_samples: u32,
    pub k: u32,
    pub g: u32,
    pub bound: f32,
    pub stepsize_portion: f32,
}

impl MarchingDescriptor {
    pub const SIZE: usize = 24;

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DescriptorError> {
        check_len("marching", Self::SIZE, bytes)?;
        Ok(Self {
            n_rays: LittleEndian::read_u32(&bytes[0..4]),
            max_n_samples: LittleEndian::read_u32(&bytes[4..8]),
            k: LittleEndian::read_u32(&bytes[8..12]),
            g: LittleEndian::read_u32(&bytes[12..16]),
            bound: LittleEndian::read_f32(&bytes[16..20]),
            stepsize_portion: LittleEndian::read_f32(&bytes[20..24]),
        })
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        LittleEndian::write_u32(&mut buf[0..4], self.n_rays);
        LittleEndian::write_u32(&mut buf[4..8], self.max_n_samples);
        LittleEndian::write_u32(&mut buf[8..12], self.k);
        LittleEndian::write_u32(&mut buf[12..16], self.g);
        LittleEndian::write_f32(&mut buf[16..20], self.bound);
        LittleEndian::write_f32(&mut buf[20..24], self.stepsize_portion);
        buf
    }
}

/// Shape of an integration batch (forward and backward).
///
/// Binary layout (little-endian):
/// - n_rays: u32
/// - total_samples: u32
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegratingDescriptor {
    pub n_rays: u32,
    pub total_samples: u32,
}

impl IntegratingDescriptor {
    pub const SIZE: usize = 8;

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DescriptorError> {
        check_len("integrating", Self::SIZE, bytes)?;
        Ok(Self {
            n_rays: LittleEndian::read_u32(&bytes[0..4]),
            total_samples: LittleEndian::read_u32(&bytes[4..8]),
        })
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        LittleEndian::write_u32(&mut buf[0..4], self.n_rays);
        LittleEndian::write_u32(&mut buf[4..8], self.total_samples);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marching_descriptor_roundtrip() {
        let desc = MarchingDescriptor {
            n_rays: 4096,
            max_n_samples: 1024,
            k: 3,
            g: 128,
            bound: 4.0,
            stepsize_portion: 1.0 / 256.0,
        };
        assert_eq!(MarchingDescriptor::from_bytes(&desc.to_bytes()).unwrap(), desc);
    }

    #[test]
    fn test_integrating_descriptor_roundtrip() {
        let desc = IntegratingDescriptor { n_rays: 7, total_samples: 1234 };
        assert_eq!(IntegratingDescriptor::from_bytes(&desc.to_bytes()).unwrap(), desc);
    }

    #[test]
    fn test_morton_and_packbits_roundtrip() {
        let m = Morton3dDescriptor { length: 99 };
        assert_eq!(Morton3dDescriptor::from_bytes(&m.to_bytes()).unwrap(), m);

        let p = PackbitsDescriptor { n_bytes: 262144, density_threshold: 0.01 };
        assert_eq!(PackbitsDescriptor::from_bytes(&p.to_bytes()).unwrap(), p);
    }

    #[test]
    fn test_known_byte_layout() {
        // Field order and endianness are part of the wire contract.
        let bytes = [2, 0, 0, 0, 16, 0, 0, 0, 1, 0, 0, 0, 64, 0, 0, 0, 0, 0, 128, 63, 0, 0, 0, 60];
        let desc = MarchingDescriptor::from_bytes(&bytes).unwrap();
        assert_eq!(desc.n_rays, 2);
        assert_eq!(desc.max_n_samples, 16);
        assert_eq!(desc.k, 1);
        assert_eq!(desc.g, 64);
        assert_eq!(desc.bound, 1.0);
        assert_eq!(desc.stepsize_portion, 0.0078125); // 1/128
    }

    #[test]
    fn test_wrong_length_rejected() {
        let bytes = [0u8; 23];
        let err = MarchingDescriptor::from_bytes(&bytes).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("expects 24 bytes"), "unexpected message: {}", msg);
        assert!(Morton3dDescriptor::from_bytes(&[]).is_err());
        assert!(IntegratingDescriptor::from_bytes(&[0u8; 9]).is_err());
        assert!(PackbitsDescriptor::from_bytes(&[0u8; 4]).is_err());
    }

    #[test]
    fn test_descriptor_serde_json_roundtrip() {
        // Host-side config serialization; the opaque wire blob never goes
        // through serde.
        let m = MarchingDescriptor {
            n_rays: 4096,
            max_n_samples: 1024,
            k: 2,
            g: 128,
            bound: 2.0,
            stepsize_portion: 1.0 / 256.0,
        };
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(serde_json::from_str::<MarchingDescriptor>(&json).unwrap(), m);

        let i: IntegratingDescriptor =
            serde_json::from_str(r#"{"n_rays":3,"total_samples":10}"#).unwrap();
        assert_eq!(i, IntegratingDescriptor { n_rays: 3, total_samples: 10 });

        let p = PackbitsDescriptor { n_bytes: 262144, density_threshold: 0.01 };
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(serde_json::from_str::<PackbitsDescriptor>(&json).unwrap(), p);

        let d = Morton3dDescriptor { length: 99 };
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(serde_json::from_str::<Morton3dDescriptor>(&json).unwrap(), d);
    }
}
