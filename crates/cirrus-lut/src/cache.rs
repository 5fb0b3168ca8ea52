//! Durable and scratch LUT storage.

use cirrus_core::{LutDimensions, SkyError};

use crate::TEXEL_SIZE;

/// The three durable lookup tables.
///
/// Each table is backed by two resources: an `f32` storage buffer that the
/// precomputation kernels read and write, and a filterable texture the frame
/// renderer samples. Regeneration runs entirely against the buffers and is
/// finished by a buffer-to-texture copy, so a regeneration that never
/// submits leaves both halves untouched.
///
/// Exclusively owned and mutated by [`crate::PrecomputePipeline`]; consumers
/// only read the texture views.
pub struct LutCache {
    dims: LutDimensions,

    transmittance_buffer: wgpu::Buffer,
    irradiance_buffer: wgpu::Buffer,
    scattering_buffer: wgpu::Buffer,

    transmittance_texture: wgpu::Texture,
    irradiance_texture: wgpu::Texture,
    scattering_texture: wgpu::Texture,

    transmittance_view: wgpu::TextureView,
    irradiance_view: wgpu::TextureView,
    scattering_view: wgpu::TextureView,
}

/// 32-bit float channels; half floats show visible banding in the
/// transmittance table near the horizon.
pub const LUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

fn storage_buffer(device: &wgpu::Device, label: &str, texels: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: texels * TEXEL_SIZE,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    })
}

fn lut_texture(
    device: &wgpu::Device,
    label: &str,
    width: u32,
    height: u32,
    depth: u32,
) -> (wgpu::Texture, wgpu::TextureView) {
    let dimension = if depth > 1 {
        wgpu::TextureDimension::D3
    } else {
        wgpu::TextureDimension::D2
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: depth,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension,
        format: LUT_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

fn copy_buffer_to_lut(
    encoder: &mut wgpu::CommandEncoder,
    buffer: &wgpu::Buffer,
    texture: &wgpu::Texture,
    width: u32,
    height: u32,
    depth: u32,
) {
    encoder.copy_buffer_to_texture(
        wgpu::TexelCopyBufferInfo {
            buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * TEXEL_SIZE as u32),
                rows_per_image: Some(height),
            },
        },
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: depth,
        },
    );
}

impl LutCache {
    /// Allocate all durable tables. Widths must be multiples of 16 texels so
    /// the buffer-to-texture copies meet the 256-byte row alignment.
    pub fn new(device: &wgpu::Device, dims: LutDimensions) -> Result<Self, SkyError> {
        for (name, width) in [
            ("transmittance", dims.transmittance_width),
            ("irradiance", dims.irradiance_width),
            ("scattering", dims.scattering_width()),
        ] {
            if width == 0 || width % 16 != 0 {
                return Err(SkyError::UnsupportedDimensions(format!(
                    "{name} width {width} is not a positive multiple of 16"
                )));
            }
        }

        log::info!(
            "LutCache: transmittance {}x{}, irradiance {}x{}, scattering {}x{}x{}",
            dims.transmittance_width,
            dims.transmittance_height,
            dims.irradiance_width,
            dims.irradiance_height,
            dims.scattering_width(),
            dims.scattering_height(),
            dims.scattering_depth(),
        );

        let transmittance_buffer = storage_buffer(
            device,
            "transmittance-lut-buffer",
            dims.transmittance_texel_count(),
        );
        let irradiance_buffer =
            storage_buffer(device, "irradiance-lut-buffer", dims.irradiance_texel_count());
        let scattering_buffer =
            storage_buffer(device, "scattering-lut-buffer", dims.scattering_texel_count());

        let (transmittance_texture, transmittance_view) = lut_texture(
            device,
            "transmittance-lut",
            dims.transmittance_width,
            dims.transmittance_height,
            1,
        );
        let (irradiance_texture, irradiance_view) = lut_texture(
            device,
            "irradiance-lut",
            dims.irradiance_width,
            dims.irradiance_height,
            1,
        );
        let (scattering_texture, scattering_view) = lut_texture(
            device,
            "scattering-lut",
            dims.scattering_width(),
            dims.scattering_height(),
            dims.scattering_depth(),
        );

        Ok(Self {
            dims,
            transmittance_buffer,
            irradiance_buffer,
            scattering_buffer,
            transmittance_texture,
            irradiance_texture,
            scattering_texture,
            transmittance_view,
            irradiance_view,
            scattering_view,
        })
    }

    pub fn dims(&self) -> &LutDimensions {
        &self.dims
    }

    pub fn transmittance_buffer(&self) -> &wgpu::Buffer {
        &self.transmittance_buffer
    }

    pub fn irradiance_buffer(&self) -> &wgpu::Buffer {
        &self.irradiance_buffer
    }

    pub fn scattering_buffer(&self) -> &wgpu::Buffer {
        &self.scattering_buffer
    }

    /// Texture views for the frame renderer. Read-only by contract.
    pub fn transmittance_view(&self) -> &wgpu::TextureView {
        &self.transmittance_view
    }

    pub fn irradiance_view(&self) -> &wgpu::TextureView {
        &self.irradiance_view
    }

    pub fn scattering_view(&self) -> &wgpu::TextureView {
        &self.scattering_view
    }

    /// Publish the accumulation buffers into the sample textures. Encoded as
    /// the final stage of a regeneration.
    pub fn copy_to_textures(&self, encoder: &mut wgpu::CommandEncoder) {
        copy_buffer_to_lut(
            encoder,
            &self.transmittance_buffer,
            &self.transmittance_texture,
            self.dims.transmittance_width,
            self.dims.transmittance_height,
            1,
        );
        copy_buffer_to_lut(
            encoder,
            &self.irradiance_buffer,
            &self.irradiance_texture,
            self.dims.irradiance_width,
            self.dims.irradiance_height,
            1,
        );
        copy_buffer_to_lut(
            encoder,
            &self.scattering_buffer,
            &self.scattering_texture,
            self.dims.scattering_width(),
            self.dims.scattering_height(),
            self.dims.scattering_depth(),
        );
    }

    pub fn read_transmittance(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Vec<[f32; 4]> {
        read_vec4_buffer(
            device,
            queue,
            &self.transmittance_buffer,
            self.dims.transmittance_texel_count(),
        )
    }

    pub fn read_irradiance(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Vec<[f32; 4]> {
        read_vec4_buffer(
            device,
            queue,
            &self.irradiance_buffer,
            self.dims.irradiance_texel_count(),
        )
    }

    pub fn read_scattering(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Vec<[f32; 4]> {
        read_vec4_buffer(
            device,
            queue,
            &self.scattering_buffer,
            self.dims.scattering_texel_count(),
        )
    }
}

/// Scratch tables that live only inside one regeneration. Each is fully
/// overwritten before it is read; the delta-Rayleigh buffer is reused as the
/// delta-multiple-scattering target from order 2 on.
pub struct TempLutSet {
    delta_irradiance: wgpu::Buffer,
    delta_rayleigh: wgpu::Buffer,
    delta_mie: wgpu::Buffer,
    delta_scattering_density: wgpu::Buffer,
}

impl TempLutSet {
    pub fn new(device: &wgpu::Device, dims: &LutDimensions) -> Self {
        Self {
            delta_irradiance: storage_buffer(
                device,
                "delta-irradiance-buffer",
                dims.irradiance_texel_count(),
            ),
            delta_rayleigh: storage_buffer(
                device,
                "delta-rayleigh-buffer",
                dims.scattering_texel_count(),
            ),
            delta_mie: storage_buffer(device, "delta-mie-buffer", dims.scattering_texel_count()),
            delta_scattering_density: storage_buffer(
                device,
                "delta-scattering-density-buffer",
                dims.scattering_texel_count(),
            ),
        }
    }

    pub fn delta_irradiance(&self) -> &wgpu::Buffer {
        &self.delta_irradiance
    }

    pub fn delta_rayleigh(&self) -> &wgpu::Buffer {
        &self.delta_rayleigh
    }

    pub fn delta_mie(&self) -> &wgpu::Buffer {
        &self.delta_mie
    }

    pub fn delta_scattering_density(&self) -> &wgpu::Buffer {
        &self.delta_scattering_density
    }

    pub fn read_delta_rayleigh(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        dims: &LutDimensions,
    ) -> Vec<[f32; 4]> {
        read_vec4_buffer(device, queue, &self.delta_rayleigh, dims.scattering_texel_count())
    }

    pub fn read_delta_irradiance(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        dims: &LutDimensions,
    ) -> Vec<[f32; 4]> {
        read_vec4_buffer(device, queue, &self.delta_irradiance, dims.irradiance_texel_count())
    }
}

/// Synchronous readback of a vec4 buffer through a staging copy. Test and
/// diagnostic use only; stalls the queue.
pub fn read_vec4_buffer(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    buffer: &wgpu::Buffer,
    texels: u64,
) -> Vec<[f32; 4]> {
    let size = texels * TEXEL_SIZE;
    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("lut-readback-staging"),
        size,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("lut-readback-encoder"),
    });
    encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
    queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..);
    let (sender, receiver) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    device.poll(wgpu::Maintain::Wait);
    receiver
        .recv()
        .expect("map_async callback dropped")
        .expect("LUT readback mapping failed");

    let data = slice.get_mapped_range();
    let out: Vec<[f32; 4]> = bytemuck::cast_slice(&data).to_vec();
    drop(data);
    staging.unmap();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texel_size() {
        assert_eq!(TEXEL_SIZE, 16);
    }

    #[test]
    fn test_default_dims_meet_row_alignment() {
        let dims = LutDimensions::default();
        assert_eq!(dims.transmittance_width % 16, 0);
        assert_eq!(dims.irradiance_width % 16, 0);
        assert_eq!(dims.scattering_width() % 16, 0);
    }
}
