//! Copy GPU buffers and textures back to the CPU.
//!
//! Only used by tests and the CLI; the frame path never blocks on the GPU.

use crate::{Error, Result};

/// Map `buffer` for reading and copy out its contents. The buffer must have
/// been created with `MAP_READ`.
pub fn read_buffer(device: &wgpu::Device, buffer: &wgpu::Buffer) -> Result<Vec<u8>> {
    let slice = buffer.slice(..);
    let (sender, receiver) = futures_intrusive::channel::shared::oneshot_channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        // The receiver only goes away if the caller already gave up.
        let _ = sender.send(result);
    });

    device.poll(wgpu::Maintain::Wait);
    pollster::block_on(receiver.receive()).unwrap_or(Err(wgpu::BufferAsyncError))?;

    let data = slice.get_mapped_range().to_vec();
    buffer.unmap();
    Ok(data)
}

/// Copy `size` bytes of `source` through a staging buffer. `source` needs `COPY_SRC`.
pub fn read_buffer_copy(device: &wgpu::Device, queue: &wgpu::Queue, source: &wgpu::Buffer, size: u64) -> Result<Vec<u8>> {
    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Readback Staging Buffer"),
        size,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Buffer Readback Encoder"),
    });
    encoder.copy_buffer_to_buffer(source, 0, &staging, 0, size);
    queue.submit(std::iter::once(encoder.finish()));

    read_buffer(device, &staging)
}

/// Read every texel of mip 0, returning tightly packed rows.
pub fn read_texture(device: &wgpu::Device, queue: &wgpu::Queue, texture: &wgpu::Texture) -> Result<Vec<u8>> {
    let format = texture.format();
    let texel_size = format
        .block_copy_size(Some(wgpu::TextureAspect::All))
        .ok_or(Error::UnsupportedFormat(format))?;

    let wgpu::Extent3d { width, height, .. } = texture.size();
    let unpadded_bytes_per_row = width * texel_size;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;

    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Texture Readback Buffer"),
        size: padded_bytes_per_row as u64 * height as u64,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Texture Readback Encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::ImageCopyTexture {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::ImageCopyBuffer {
            buffer: &buffer,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(padded_bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        texture.size(),
    );
    queue.submit(std::iter::once(encoder.finish()));

    let padded = read_buffer(device, &buffer)?;
    Ok(unpad_rows(&padded, padded_bytes_per_row as usize, unpadded_bytes_per_row as usize))
}

fn unpad_rows(padded: &[u8], padded_row: usize, row: usize) -> Vec<u8> {
    padded
        .chunks_exact(padded_row)
        .flat_map(|chunk| &chunk[..row])
        .copied()
        .collect()
}
