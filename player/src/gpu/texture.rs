use crate::gl::TextureFilter;
use anyhow::{Context, Result};

/// One RGBA8 GPU texture with its current sampling filter
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub width: u32,
    pub height: u32,
    pub filter: TextureFilter,
}

impl GpuTexture {
    /// Allocate zero-initialized storage of `width` x `height`
    pub fn allocate(
        device: &wgpu::Device,
        width: u32,
        height: u32,
        filter: TextureFilter,
    ) -> Result<Self> {
        let max = device.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max || height > max {
            anyhow::bail!(
                "Invalid texture size {}x{} (device maximum {}x{})",
                width,
                height,
                max,
                max
            );
        }

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Movie Texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });

        Ok(Self {
            texture,
            width,
            height,
            filter,
        })
    }

    /// Upload tightly packed RGBA rows into a sub-rectangle
    pub fn write_region(
        &self,
        queue: &wgpu::Queue,
        origin: (u32, u32),
        size: (u32, u32),
        data: &[u8],
    ) -> Result<()> {
        let (x, y) = origin;
        let (width, height) = size;
        if x + width > self.width || y + height > self.height {
            anyhow::bail!(
                "Region {}x{} at ({}, {}) exceeds texture {}x{}",
                width,
                height,
                x,
                y,
                self.width,
                self.height
            );
        }

        // Validate data size
        let expected_size = (width * height * 4) as usize;
        if data.len() < expected_size {
            anyhow::bail!(
                "Invalid region data size: expected {} bytes ({}x{} RGBA), got {} bytes",
                expected_size,
                width,
                height,
                data.len()
            );
        }
        if width == 0 || height == 0 {
            return Ok(());
        }

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x, y, z: 0 },
                aspect: wgpu::TextureAspect::All,
            },
            &data[..expected_size],
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    /// Copy the whole texture back to the CPU as tightly packed RGBA
    pub fn read_rgba(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<Vec<u8>> {
        // Note: bytes_per_row must be aligned to COPY_BYTES_PER_ROW_ALIGNMENT (256)
        let bytes_per_row = self.width * 4;
        let alignment = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let aligned_bytes_per_row = bytes_per_row.div_ceil(alignment) * alignment;
        let buffer_size = u64::from(aligned_bytes_per_row) * u64::from(self.height);

        let output_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Movie Texture Readback"),
            size: buffer_size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Movie Texture Readback Encoder"),
        });
        encoder.copy_texture_to_buffer(
            self.texture.as_image_copy(),
            wgpu::TexelCopyBufferInfo {
                buffer: &output_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(aligned_bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        queue.submit(std::iter::once(encoder.finish()));

        // Map buffer and read data
        let buffer_slice = output_buffer.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });

        // Wait for mapping to complete
        device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map_err(|e| anyhow::anyhow!("GPU poll failed: {}", e))?;
        receiver
            .recv()
            .context("Readback callback never ran")?
            .context("Failed to map readback buffer")?;

        // Strip the row padding
        let mut pixels = Vec::with_capacity((bytes_per_row * self.height) as usize);
        {
            let data = buffer_slice.get_mapped_range();
            for row in data.chunks(aligned_bytes_per_row as usize) {
                pixels.extend_from_slice(&row[..bytes_per_row as usize]);
            }
        }
        output_buffer.unmap();

        log::debug!("Read back {}x{} texture, {} bytes", self.width, self.height, pixels.len());
        Ok(pixels)
    }
}

impl std::fmt::Debug for GpuTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuTexture")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("filter", &self.filter)
            .finish()
    }
}
