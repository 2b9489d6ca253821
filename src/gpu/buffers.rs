//! GPU buffer management, upload and readback.
//!
//! Storage buffers hold plain `u32`/`f32` arrays; the occupancy bitfield is
//! the one byte-granular input and gets widened to `u32` words for upload
//! (see [`bitfield_words`]).

use wgpu::{Buffer, BufferUsages, Device, Queue};

use crate::gpu::context::GpuError;

/// Upload data to a GPU buffer.
///
/// Creates a buffer with the given usage flags and copies data from CPU to GPU.
pub fn create_buffer_init<T: bytemuck::Pod>(
    device: &Device,
    label: &str,
    data: &[T],
    usage: BufferUsages,
) -> Buffer {
    use wgpu::util::DeviceExt;

    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::cast_slice(data),
        usage,
    })
}

/// Create an empty (zero-initialized) buffer for output.
pub fn create_buffer(device: &Device, label: &str, size: u64, usage: BufferUsages) -> Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage,
        mapped_at_creation: false,
    })
}

/// Widen a byte bitfield to `u32` words, zero-padding the tail.
///
/// Little-endian words preserve the bit addressing: bit `i` of the byte
/// array is bit `i % 32` of word `i / 32`, so shaders can test cells with
/// word loads against the same indices the CPU uses.
pub fn bitfield_words(bits: &[u8]) -> Vec<u32> {
    let n_words = bits.len().div_ceil(4);
    let mut words = vec![0u32; n_words];
    for (i, &byte) in bits.iter().enumerate() {
        words[i / 4] |= (byte as u32) << ((i % 4) * 8);
    }
    words
}

/// Truncate readback words back into the byte bitfield layout.
pub fn words_to_bitfield(words: &[u32], n_bytes: usize) -> Vec<u8> {
    assert!(n_bytes <= words.len() * 4, "bitfield longer than word buffer");
    let mut bits = Vec::with_capacity(n_bytes);
    for &word in words {
        bits.extend_from_slice(&word.to_le_bytes());
    }
    bits.truncate(n_bytes);
    bits
}

/// Read data back from a GPU buffer to the CPU.
pub async fn read_buffer<T: bytemuck::Pod>(
    device: &Device,
    queue: &Queue,
    buffer: &Buffer,
    len: usize,
) -> Result<Vec<T>, GpuError> {
    let byte_len = (len * std::mem::size_of::<T>()) as u64;
    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Staging Buffer"),
        size: byte_len,
        usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Readback Encoder"),
    });
    encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, byte_len);
    queue.submit(Some(encoder.finish()));

    let (tx, rx) = futures::channel::oneshot::channel();
    staging.slice(..).map_async(wgpu::MapMode::Read, move |result| {
        tx.send(result).ok();
    });
    device.poll(wgpu::Maintain::Wait);

    rx.await
        .map_err(|_| GpuError::Readback("map_async callback dropped".to_string()))?
        .map_err(|e| GpuError::Readback(format!("buffer mapping failed: {e:?}")))?;

    let data = staging.slice(..).get_mapped_range();
    let result: Vec<T> = bytemuck::cast_slice(&data).to_vec();
    drop(data);
    staging.unmap();

    Ok(result)
}

/// Blocking wrapper for [`read_buffer`].
pub fn read_buffer_blocking<T: bytemuck::Pod>(
    device: &Device,
    queue: &Queue,
    buffer: &Buffer,
    len: usize,
) -> Result<Vec<T>, GpuError> {
    pollster::block_on(read_buffer(device, queue, buffer, len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitfield_word_packing_preserves_bit_indices() {
        // Bit i of the byte array must equal bit i%32 of word i/32.
        let bits: Vec<u8> = vec![0b1000_0001, 0xFF, 0x00, 0x5A, 0x03];
        let words = bitfield_words(&bits);
        assert_eq!(words.len(), 2);

        for i in 0..bits.len() * 8 {
            let byte_bit = (bits[i / 8] >> (i % 8)) & 1;
            let word_bit = ((words[i / 32] >> (i % 32)) & 1) as u8;
            assert_eq!(byte_bit, word_bit, "bit {} differs", i);
        }

        // Padding bits stay zero.
        assert_eq!(words[1] >> 8, 0);
        assert_eq!(words_to_bitfield(&words, bits.len()), bits);
    }
}
