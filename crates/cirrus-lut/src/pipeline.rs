//! The multi-pass LUT precomputation pipeline.

use std::num::NonZeroU64;

use cirrus_core::SkyError;

use crate::cache::{LutCache, TempLutSet};
use crate::uniforms::{AtmosphereUniforms, OrderUniforms};

/// Upper bound on the scattering-order slot table. The UI range tops out at
/// 50 orders.
pub const MAX_SCATTERING_ORDERS: u32 = 50;

/// Uniform slots are strided to the worst-case dynamic-offset alignment.
const ORDER_SLOT_STRIDE: u64 = 256;

const WORKGROUP_SIZE: u32 = 8;

/// The six precomputation kernels, in stage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    Transmittance,
    DirectIrradiance,
    SingleScattering,
    ScatteringDensity,
    IndirectIrradiance,
    MultipleScattering,
}

impl PassKind {
    pub fn label(self) -> &'static str {
        match self {
            PassKind::Transmittance => "transmittance",
            PassKind::DirectIrradiance => "direct-irradiance",
            PassKind::SingleScattering => "single-scattering",
            PassKind::ScatteringDensity => "scattering-density",
            PassKind::IndirectIrradiance => "indirect-irradiance",
            PassKind::MultipleScattering => "multiple-scattering",
        }
    }
}

/// Owns the kernels, uniform buffers, and the shared bind group over the
/// cache and scratch tables, and encodes the ordered stage sequence.
///
/// All stages of one regeneration are encoded into a single command buffer
/// and submitted once. Any stage that fails to encode aborts the whole run
/// before submission, so the durable tables keep their previous contents and
/// the caller's cache-valid snapshot stays uncommitted.
pub struct PrecomputePipeline {
    atmosphere_buffer: wgpu::Buffer,
    order_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,

    transmittance: wgpu::ComputePipeline,
    direct_irradiance: wgpu::ComputePipeline,
    single_scattering: wgpu::ComputePipeline,
    scattering_density: wgpu::ComputePipeline,
    indirect_irradiance: wgpu::ComputePipeline,
    multiple_scattering: wgpu::ComputePipeline,

    #[cfg(feature = "gpu-tests")]
    fault: Option<PassKind>,
}

fn kernel_module(device: &wgpu::Device, label: &str, kernel: &str) -> wgpu::ShaderModule {
    let atmosphere_wgsl = include_str!("../../../shaders/common/atmosphere.wgsl");
    let bindings_wgsl = include_str!("../../../shaders/common/lut_bindings.wgsl");
    let source = format!("{atmosphere_wgsl}\n{bindings_wgsl}\n{kernel}");
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    })
}

fn storage_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: false },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl PrecomputePipeline {
    pub fn new(device: &wgpu::Device, cache: &LutCache, temp: &TempLutSet) -> Self {
        let atmosphere_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("atmosphere-uniforms"),
            size: std::mem::size_of::<AtmosphereUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        // One slot per scattering order, bound through a dynamic offset so a
        // whole regeneration can be encoded into a single submission.
        let order_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("scattering-order-uniforms"),
            size: MAX_SCATTERING_ORDERS as u64 * ORDER_SLOT_STRIDE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("lut-bind-group-layout"),
            entries: &[
                // binding 0: atmosphere constants
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // binding 1: scattering-order slot (dynamic offset)
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: NonZeroU64::new(
                            std::mem::size_of::<OrderUniforms>() as u64
                        ),
                    },
                    count: None,
                },
                // bindings 2-4: durable tables
                storage_entry(2),
                storage_entry(3),
                storage_entry(4),
                // bindings 5-8: scratch tables
                storage_entry(5),
                storage_entry(6),
                storage_entry(7),
                storage_entry(8),
            ],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("lut-bind-group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: atmosphere_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &order_buffer,
                        offset: 0,
                        size: NonZeroU64::new(std::mem::size_of::<OrderUniforms>() as u64),
                    }),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: cache.transmittance_buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: cache.irradiance_buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: cache.scattering_buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: temp.delta_irradiance().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: temp.delta_rayleigh().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 7,
                    resource: temp.delta_mie().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 8,
                    resource: temp.delta_scattering_density().as_entire_binding(),
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("lut-pipeline-layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let make_pipeline = |label: &str, kernel: &str| {
            let module = kernel_module(device, label, kernel);
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: Some("main"),
                compilation_options: Default::default(),
                cache: None,
            })
        };

        let transmittance = make_pipeline(
            "transmittance-lut-pass",
            include_str!("../../../shaders/lut/transmittance.wgsl"),
        );
        let direct_irradiance = make_pipeline(
            "direct-irradiance-lut-pass",
            include_str!("../../../shaders/lut/direct_irradiance.wgsl"),
        );
        let single_scattering = make_pipeline(
            "single-scattering-lut-pass",
            include_str!("../../../shaders/lut/single_scattering.wgsl"),
        );
        let scattering_density = make_pipeline(
            "scattering-density-lut-pass",
            include_str!("../../../shaders/lut/scattering_density.wgsl"),
        );
        let indirect_irradiance = make_pipeline(
            "indirect-irradiance-lut-pass",
            include_str!("../../../shaders/lut/indirect_irradiance.wgsl"),
        );
        let multiple_scattering = make_pipeline(
            "multiple-scattering-lut-pass",
            include_str!("../../../shaders/lut/multiple_scattering.wgsl"),
        );

        Self {
            atmosphere_buffer,
            order_buffer,
            bind_group,
            transmittance,
            direct_irradiance,
            single_scattering,
            scattering_density,
            indirect_irradiance,
            multiple_scattering,
            #[cfg(feature = "gpu-tests")]
            fault: None,
        }
    }

    /// Force the named stage to fail on the next regeneration, or clear the
    /// fault with `None`. Exercises the abort-before-submit path.
    #[cfg(feature = "gpu-tests")]
    pub fn inject_fault(&mut self, fault: Option<PassKind>) {
        self.fault = fault;
    }

    fn check_stage(&self, stage: PassKind) -> Result<(), SkyError> {
        #[cfg(feature = "gpu-tests")]
        {
            if self.fault == Some(stage) {
                return Err(SkyError::PassUnavailable(stage.label()));
            }
        }
        let _ = stage;
        Ok(())
    }

    fn order_offset(order: u32) -> u32 {
        debug_assert!(order >= 1);
        ((order - 1) as u64 * ORDER_SLOT_STRIDE) as u32
    }

    fn encode_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &wgpu::ComputePipeline,
        label: &'static str,
        order: u32,
        extent: (u32, u32, u32),
    ) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(label),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &self.bind_group, &[Self::order_offset(order)]);
        pass.dispatch_workgroups(
            extent.0.div_ceil(WORKGROUP_SIZE),
            extent.1.div_ceil(WORKGROUP_SIZE),
            extent.2,
        );
    }

    /// Run the full precomputation: transmittance, direct irradiance, single
    /// scattering, then the multi-order loop, then publish the buffers into
    /// the sample textures. Encoded into one command buffer and submitted
    /// once; returns without submitting anything if a stage is unavailable.
    pub fn regenerate(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        cache: &LutCache,
        uniforms: &AtmosphereUniforms,
        scattering_orders: u32,
    ) -> Result<(), SkyError> {
        let orders = scattering_orders.clamp(1, MAX_SCATTERING_ORDERS);
        let dims = cache.dims();
        let transmittance_extent = (dims.transmittance_width, dims.transmittance_height, 1);
        let irradiance_extent = (dims.irradiance_width, dims.irradiance_height, 1);
        let scattering_extent = (
            dims.scattering_width(),
            dims.scattering_height(),
            dims.scattering_depth(),
        );

        queue.write_buffer(&self.atmosphere_buffer, 0, bytemuck::bytes_of(uniforms));
        for order in 1..=orders {
            queue.write_buffer(
                &self.order_buffer,
                Self::order_offset(order) as u64,
                bytemuck::bytes_of(&OrderUniforms::new(order as i32)),
            );
        }

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("lut-regeneration"),
        });

        self.check_stage(PassKind::Transmittance)?;
        self.encode_pass(
            &mut encoder,
            &self.transmittance,
            "transmittance-pass",
            1,
            transmittance_extent,
        );

        self.check_stage(PassKind::DirectIrradiance)?;
        self.encode_pass(
            &mut encoder,
            &self.direct_irradiance,
            "direct-irradiance-pass",
            1,
            irradiance_extent,
        );

        self.check_stage(PassKind::SingleScattering)?;
        self.encode_pass(
            &mut encoder,
            &self.single_scattering,
            "single-scattering-pass",
            1,
            scattering_extent,
        );

        // Orders 2..=n, three sub-passes each. The indirect-irradiance
        // sub-pass runs with `order - 1`: it integrates the previous order's
        // scattering before this order's density overwrites the deltas.
        for order in 2..=orders {
            self.check_stage(PassKind::ScatteringDensity)?;
            self.encode_pass(
                &mut encoder,
                &self.scattering_density,
                "scattering-density-pass",
                order,
                scattering_extent,
            );

            self.check_stage(PassKind::IndirectIrradiance)?;
            self.encode_pass(
                &mut encoder,
                &self.indirect_irradiance,
                "indirect-irradiance-pass",
                order - 1,
                irradiance_extent,
            );

            self.check_stage(PassKind::MultipleScattering)?;
            self.encode_pass(
                &mut encoder,
                &self.multiple_scattering,
                "multiple-scattering-pass",
                order,
                scattering_extent,
            );
        }

        cache.copy_to_textures(&mut encoder);
        queue.submit(std::iter::once(encoder.finish()));

        log::debug!("LUT regeneration submitted ({orders} scattering orders)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_offsets_are_aligned() {
        assert_eq!(PrecomputePipeline::order_offset(1), 0);
        assert_eq!(PrecomputePipeline::order_offset(2), 256);
        assert_eq!(PrecomputePipeline::order_offset(50) % 256, 0);
    }

    #[test]
    fn test_pass_labels() {
        assert_eq!(PassKind::Transmittance.label(), "transmittance");
        assert_eq!(PassKind::MultipleScattering.label(), "multiple-scattering");
    }
}
