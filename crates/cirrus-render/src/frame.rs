//! Per-frame technique resources.
//!
//! The ray-marching and path-tracing techniques do not consume the durable
//! scattering tables directly; they use a small set of per-frame LUTs that
//! are cheap enough to rebuild every frame: a transmittance table, the
//! 32x32 multiple-scattering transfer, the sky-view table and the camera
//! froxel volumes.

use cirrus_lut::LutCache;

use crate::selector::VariantSelector;
use crate::shader_lib::ShaderLibrary;

/// Per-frame LUTs are half floats; only the durable tables need full
/// precision.
pub const FRAME_LUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

pub const MULTI_SCATTERING_LUT_RES: u32 = 32;
pub const SKY_VIEW_WIDTH: u32 = 192;
pub const SKY_VIEW_HEIGHT: u32 = 108;
pub const CAMERA_VOLUME_RES: u32 = 32;

const VOLUME_WORKGROUP: u32 = 4;

fn frame_texture(
    device: &wgpu::Device,
    label: &str,
    width: u32,
    height: u32,
    depth: u32,
    storage: bool,
) -> (wgpu::Texture, wgpu::TextureView) {
    let mut usage = wgpu::TextureUsages::TEXTURE_BINDING;
    if storage {
        usage |= wgpu::TextureUsages::STORAGE_BINDING;
    } else {
        usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
    }
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: depth,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: if depth > 1 {
            wgpu::TextureDimension::D3
        } else {
            wgpu::TextureDimension::D2
        },
        format: FRAME_LUT_FORMAT,
        usage,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

/// Owns the per-frame LUT textures, the fixed (un-keyed) programs that fill
/// some of them, and the texture bind groups for every pass.
///
/// Passes that render into one of these textures get a bind group where that
/// texture's slot holds a dummy, since a texture can not be sampled and
/// written in the same pass.
pub struct FrameResources {
    transmittance_view: wgpu::TextureView,
    multi_scatt_view: wgpu::TextureView,
    sky_view_view: wgpu::TextureView,
    camera_scattering_view: wgpu::TextureView,
    camera_transmittance_view: wgpu::TextureView,

    transmittance_pipeline: wgpu::RenderPipeline,
    multi_scatt_pipeline: wgpu::ComputePipeline,
    camera_volumes_lut_pipeline: wgpu::ComputePipeline,

    bg_main: wgpu::BindGroup,
    bg_lut_main: wgpu::BindGroup,
    bg_transmittance_pass: wgpu::BindGroup,
    bg_multi_scatt_pass: wgpu::BindGroup,
    bg_sky_view_pass: wgpu::BindGroup,
    bg_camera_volume_pass: wgpu::BindGroup,
    bg_lut_camera_volume_pass: wgpu::BindGroup,

    volume_out_bg: wgpu::BindGroup,
    multi_scatt_out_bg: wgpu::BindGroup,
}

impl FrameResources {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        selector: &VariantSelector,
        cache: &LutCache,
    ) -> Result<Self, cirrus_core::SkyError> {
        let (_, transmittance_view) = frame_texture(
            device,
            "frame-transmittance-lut",
            cache.dims().transmittance_width,
            cache.dims().transmittance_height,
            1,
            false,
        );
        let (_, multi_scatt_view) = frame_texture(
            device,
            "multi-scattering-lut",
            MULTI_SCATTERING_LUT_RES,
            MULTI_SCATTERING_LUT_RES,
            1,
            true,
        );
        let (_, sky_view_view) = frame_texture(
            device,
            "sky-view-lut",
            SKY_VIEW_WIDTH,
            SKY_VIEW_HEIGHT,
            1,
            false,
        );
        let (_, camera_scattering_view) = frame_texture(
            device,
            "camera-scattering-volume",
            CAMERA_VOLUME_RES,
            CAMERA_VOLUME_RES,
            CAMERA_VOLUME_RES,
            true,
        );
        let (_, camera_transmittance_view) = frame_texture(
            device,
            "camera-transmittance-volume",
            CAMERA_VOLUME_RES,
            CAMERA_VOLUME_RES,
            CAMERA_VOLUME_RES,
            true,
        );

        // Dummies stand in for a pass's own render target in its bind group.
        let (_, dummy_2d) = frame_texture(device, "dummy-2d", 1, 1, 1, false);
        let (_, dummy_3d) = frame_texture(device, "dummy-3d", 1, 1, 2, true);

        let shadow_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("shadow-map"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Depth32Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let shadow_view = shadow_texture.create_view(&wgpu::TextureViewDescriptor::default());

        // Clear the shadow map to the far plane once so the shadow compare
        // passes everywhere until a real caster is rendered into it.
        {
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("shadow-clear"),
            });
            encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("shadow-clear-pass"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &shadow_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            queue.submit(std::iter::once(encoder.finish()));
        }

        let lut_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("lut-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let shadow_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("shadow-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });

        // One bind group per pass family; the entries differ only where a
        // pass would otherwise sample its own target.
        let make_texture_bg = |label: &str,
                               transmittance: &wgpu::TextureView,
                               multi_scatt: &wgpu::TextureView,
                               sky_view: &wgpu::TextureView,
                               cam_scat: &wgpu::TextureView,
                               cam_trans: &wgpu::TextureView| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: selector.texture_layout(),
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::Sampler(&lut_sampler),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(transmittance),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::TextureView(cache.irradiance_view()),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: wgpu::BindingResource::TextureView(cache.scattering_view()),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: wgpu::BindingResource::TextureView(multi_scatt),
                    },
                    wgpu::BindGroupEntry {
                        binding: 5,
                        resource: wgpu::BindingResource::TextureView(sky_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 6,
                        resource: wgpu::BindingResource::TextureView(cam_scat),
                    },
                    wgpu::BindGroupEntry {
                        binding: 7,
                        resource: wgpu::BindingResource::TextureView(cam_trans),
                    },
                    wgpu::BindGroupEntry {
                        binding: 8,
                        resource: wgpu::BindingResource::TextureView(&shadow_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 9,
                        resource: wgpu::BindingResource::Sampler(&shadow_sampler),
                    },
                ],
            })
        };

        let bg_main = make_texture_bg(
            "sky-textures",
            &transmittance_view,
            &multi_scatt_view,
            &sky_view_view,
            &camera_scattering_view,
            &camera_transmittance_view,
        );
        // The precomputed-LUT technique samples the durable transmittance
        // table instead of the per-frame one.
        let bg_lut_main = make_texture_bg(
            "sky-textures-lut",
            cache.transmittance_view(),
            &multi_scatt_view,
            &sky_view_view,
            &camera_scattering_view,
            &camera_transmittance_view,
        );
        let bg_transmittance_pass = make_texture_bg(
            "sky-textures-transmittance-pass",
            &dummy_2d,
            &multi_scatt_view,
            &sky_view_view,
            &camera_scattering_view,
            &camera_transmittance_view,
        );
        let bg_multi_scatt_pass = make_texture_bg(
            "sky-textures-multi-scatt-pass",
            &transmittance_view,
            &dummy_2d,
            &sky_view_view,
            &camera_scattering_view,
            &camera_transmittance_view,
        );
        let bg_sky_view_pass = make_texture_bg(
            "sky-textures-sky-view-pass",
            &transmittance_view,
            &multi_scatt_view,
            &dummy_2d,
            &camera_scattering_view,
            &camera_transmittance_view,
        );
        let bg_camera_volume_pass = make_texture_bg(
            "sky-textures-camera-volume-pass",
            &transmittance_view,
            &multi_scatt_view,
            &sky_view_view,
            &dummy_3d,
            &dummy_3d,
        );
        let bg_lut_camera_volume_pass = make_texture_bg(
            "sky-textures-lut-camera-volume-pass",
            cache.transmittance_view(),
            &multi_scatt_view,
            &sky_view_view,
            &dummy_3d,
            &dummy_3d,
        );

        let volume_out_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("camera-volume-out"),
            layout: selector.volume_out_layout(),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&camera_scattering_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&camera_transmittance_view),
                },
            ],
        });

        let multi_scatt_out_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("multi-scatt-out-bgl"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: FRAME_LUT_FORMAT,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                }],
            });
        let multi_scatt_out_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("multi-scatt-out"),
            layout: &multi_scatt_out_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::TextureView(&multi_scatt_view),
            }],
        });

        // Fixed (un-keyed) programs: the per-frame transmittance table, the
        // multiple-scattering transfer and the LUT-technique camera volumes.
        let (transmittance_pipeline, multi_scatt_pipeline, camera_volumes_lut_pipeline) =
            Self::create_fixed_pipelines(device, selector, &multi_scatt_out_layout)?;

        Ok(Self {
            transmittance_view,
            multi_scatt_view,
            sky_view_view,
            camera_scattering_view,
            camera_transmittance_view,
            transmittance_pipeline,
            multi_scatt_pipeline,
            camera_volumes_lut_pipeline,
            bg_main,
            bg_lut_main,
            bg_transmittance_pass,
            bg_multi_scatt_pass,
            bg_sky_view_pass,
            bg_camera_volume_pass,
            bg_lut_camera_volume_pass,
            volume_out_bg,
            multi_scatt_out_bg,
        })
    }

    fn create_fixed_pipelines(
        device: &wgpu::Device,
        selector: &VariantSelector,
        multi_scatt_out_layout: &wgpu::BindGroupLayout,
    ) -> Result<
        (
            wgpu::RenderPipeline,
            wgpu::ComputePipeline,
            wgpu::ComputePipeline,
        ),
        cirrus_core::SkyError,
    > {
        let shaders: &ShaderLibrary = selector.shaders();
        let defines: Vec<(&'static str, u32)> = vec![
            ("TRANSMITTANCE_METHOD", 2),
            ("GROUND_GI_ENABLED", 0),
            ("SHADOWMAP_ENABLED", 0),
            ("MULTISCATAPPROX_ENABLED", 0),
            ("FASTSKY_ENABLED", 0),
            ("COLORED_TRANSMITTANCE_ENABLED", 0),
            ("FASTAERIALPERSPECTIVE_ENABLED", 0),
        ];

        let ray_march_source = shaders.compose_sky("ray_march.wgsl", &defines)?;
        let ray_march_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("ray-march-fixed"),
            source: wgpu::ShaderSource::Wgsl(ray_march_source.into()),
        });

        let raster_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("frame-transmittance-layout"),
            bind_group_layouts: &[selector.uniform_layout(), selector.texture_layout()],
            push_constant_ranges: &[],
        });
        let transmittance_pipeline =
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("frame-transmittance-lut"),
                layout: Some(&raster_layout),
                vertex: wgpu::VertexState {
                    module: &ray_march_module,
                    entry_point: Some("vs_fullscreen"),
                    buffers: &[],
                    compilation_options: Default::default(),
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &ray_march_module,
                    entry_point: Some("fs_transmittance_lut"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: FRAME_LUT_FORMAT,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                multiview: None,
                cache: None,
            });

        let multi_scatt_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("multi-scatt-layout"),
            bind_group_layouts: &[
                selector.uniform_layout(),
                selector.texture_layout(),
                multi_scatt_out_layout,
            ],
            push_constant_ranges: &[],
        });
        let multi_scatt_pipeline =
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("multi-scatt-lut"),
                layout: Some(&multi_scatt_layout),
                module: &ray_march_module,
                entry_point: Some("cs_multi_scatt"),
                compilation_options: Default::default(),
                cache: None,
            });

        let lut_source = shaders.compose_sky("render_with_luts.wgsl", &defines)?;
        let lut_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("render-with-luts-fixed"),
            source: wgpu::ShaderSource::Wgsl(lut_source.into()),
        });
        let volume_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("camera-volume-lut-layout"),
            bind_group_layouts: &[
                selector.uniform_layout(),
                selector.texture_layout(),
                selector.volume_out_layout(),
            ],
            push_constant_ranges: &[],
        });
        let camera_volumes_lut_pipeline =
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("camera-volumes-lut"),
                layout: Some(&volume_layout),
                module: &lut_module,
                entry_point: Some("cs_camera_volumes_lut"),
                compilation_options: Default::default(),
                cache: None,
            });

        Ok((
            transmittance_pipeline,
            multi_scatt_pipeline,
            camera_volumes_lut_pipeline,
        ))
    }

    /// Bind group for the ray-marching and path-tracing composites.
    pub fn main_bind_group(&self) -> &wgpu::BindGroup {
        &self.bg_main
    }

    /// Bind group for the precomputed-LUT composite.
    pub fn lut_bind_group(&self) -> &wgpu::BindGroup {
        &self.bg_lut_main
    }

    pub fn multi_scatt_view(&self) -> &wgpu::TextureView {
        &self.multi_scatt_view
    }

    pub fn sky_view_view(&self) -> &wgpu::TextureView {
        &self.sky_view_view
    }

    pub fn camera_scattering_view(&self) -> &wgpu::TextureView {
        &self.camera_scattering_view
    }

    pub fn camera_transmittance_view(&self) -> &wgpu::TextureView {
        &self.camera_transmittance_view
    }

    pub fn render_transmittance_lut(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        uniform_bg: &wgpu::BindGroup,
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("frame-transmittance-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.transmittance_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.transmittance_pipeline);
        pass.set_bind_group(0, uniform_bg, &[]);
        pass.set_bind_group(1, &self.bg_transmittance_pass, &[]);
        pass.draw(0..3, 0..1);
    }

    pub fn dispatch_multi_scatt(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        uniform_bg: &wgpu::BindGroup,
    ) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("multi-scatt-pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.multi_scatt_pipeline);
        pass.set_bind_group(0, uniform_bg, &[]);
        pass.set_bind_group(1, &self.bg_multi_scatt_pass, &[]);
        pass.set_bind_group(2, &self.multi_scatt_out_bg, &[]);
        let groups = MULTI_SCATTERING_LUT_RES.div_ceil(8);
        pass.dispatch_workgroups(groups, groups, 1);
    }

    /// Render the sky-view LUT with a selector-resolved variant.
    pub fn render_sky_view(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        uniform_bg: &wgpu::BindGroup,
        pipeline: &wgpu::RenderPipeline,
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("sky-view-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.sky_view_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, uniform_bg, &[]);
        pass.set_bind_group(1, &self.bg_sky_view_pass, &[]);
        pass.draw(0..3, 0..1);
    }

    /// Fill the camera froxel volumes with a selector-resolved variant, or
    /// with the fixed LUT-technique program when `pipeline` is `None`.
    pub fn dispatch_camera_volumes(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        uniform_bg: &wgpu::BindGroup,
        pipeline: Option<&wgpu::ComputePipeline>,
    ) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("camera-volume-pass"),
            timestamp_writes: None,
        });
        let textures = match pipeline {
            Some(_) => &self.bg_camera_volume_pass,
            None => &self.bg_lut_camera_volume_pass,
        };
        pass.set_pipeline(pipeline.unwrap_or(&self.camera_volumes_lut_pipeline));
        pass.set_bind_group(0, uniform_bg, &[]);
        pass.set_bind_group(1, textures, &[]);
        pass.set_bind_group(2, &self.volume_out_bg, &[]);
        let groups = CAMERA_VOLUME_RES.div_ceil(VOLUME_WORKGROUP);
        pass.dispatch_workgroups(groups, groups, groups);
    }
}
