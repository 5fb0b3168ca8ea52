//! Variant compilation and resolution.

use std::collections::HashMap;

use cirrus_core::SkyError;

use crate::frame::FRAME_LUT_FORMAT;
use crate::shader_lib::ShaderLibrary;
use crate::variant::{ProgramKind, RenderVariantKey};

/// One compiled program.
pub enum Program {
    Render(wgpu::RenderPipeline),
    Compute(wgpu::ComputePipeline),
}

impl Program {
    pub fn render(&self) -> Option<&wgpu::RenderPipeline> {
        match self {
            Program::Render(pipeline) => Some(pipeline),
            Program::Compute(_) => None,
        }
    }

    pub fn compute(&self) -> Option<&wgpu::ComputePipeline> {
        match self {
            Program::Render(_) => None,
            Program::Compute(pipeline) => Some(pipeline),
        }
    }
}

/// Two-state variant lifecycle: a compiled program, plus a dirty mark that
/// schedules one recompilation attempt at the next resolve.
struct Variant {
    program: Program,
    dirty: bool,
}

/// Maps variant keys to compiled programs and owns the compilation policy.
///
/// Eager mode ([`VariantSelector::compile_all`] with `fail_fast`) is for
/// startup: a missing mandatory variant is fatal. The lazy mode is for live
/// reload: [`VariantSelector::mark_all_dirty`] only marks, and the next
/// [`VariantSelector::resolve`] of each key attempts one recompilation,
/// keeping the previous program on failure. Resolution never compiles a
/// clean entry.
pub struct VariantSelector {
    shaders: ShaderLibrary,
    hdr_format: wgpu::TextureFormat,

    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    volume_out_layout: wgpu::BindGroupLayout,

    raster_layout: wgpu::PipelineLayout,
    volume_pipeline_layout: wgpu::PipelineLayout,

    variants: HashMap<RenderVariantKey, Variant>,
}

fn texture_entry(
    binding: u32,
    dimension: wgpu::TextureViewDimension,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT | wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: dimension,
            multisampled: false,
        },
        count: None,
    }
}

impl VariantSelector {
    pub fn new(
        device: &wgpu::Device,
        shaders: ShaderLibrary,
        hdr_format: wgpu::TextureFormat,
    ) -> Self {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sky-uniform-bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT | wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT | wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sky-texture-bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT | wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                texture_entry(1, wgpu::TextureViewDimension::D2),
                texture_entry(2, wgpu::TextureViewDimension::D2),
                texture_entry(3, wgpu::TextureViewDimension::D3),
                texture_entry(4, wgpu::TextureViewDimension::D2),
                texture_entry(5, wgpu::TextureViewDimension::D2),
                texture_entry(6, wgpu::TextureViewDimension::D3),
                texture_entry(7, wgpu::TextureViewDimension::D3),
                wgpu::BindGroupLayoutEntry {
                    binding: 8,
                    visibility: wgpu::ShaderStages::FRAGMENT | wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 9,
                    visibility: wgpu::ShaderStages::FRAGMENT | wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                    count: None,
                },
            ],
        });

        let volume_out_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("camera-volume-out-bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: FRAME_LUT_FORMAT,
                        view_dimension: wgpu::TextureViewDimension::D3,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: FRAME_LUT_FORMAT,
                        view_dimension: wgpu::TextureViewDimension::D3,
                    },
                    count: None,
                },
            ],
        });

        let raster_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("sky-raster-pipeline-layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let volume_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("camera-volume-pipeline-layout"),
                bind_group_layouts: &[&uniform_layout, &texture_layout, &volume_out_layout],
                push_constant_ranges: &[],
            });

        Self {
            shaders,
            hdr_format,
            uniform_layout,
            texture_layout,
            volume_out_layout,
            raster_layout,
            volume_pipeline_layout,
            variants: HashMap::new(),
        }
    }

    pub fn uniform_layout(&self) -> &wgpu::BindGroupLayout {
        &self.uniform_layout
    }

    pub fn texture_layout(&self) -> &wgpu::BindGroupLayout {
        &self.texture_layout
    }

    pub fn volume_out_layout(&self) -> &wgpu::BindGroupLayout {
        &self.volume_out_layout
    }

    pub fn shaders(&self) -> &ShaderLibrary {
        &self.shaders
    }

    /// Target format and blend path per raster family. Sky techniques
    /// composite premultiplied over the HDR target; path tracing accumulates
    /// additively across frames; the sky-view pass overwrites its LUT.
    fn raster_target(&self, key: &RenderVariantKey) -> (wgpu::TextureFormat, Option<wgpu::BlendState>) {
        match key {
            RenderVariantKey::PrecomputedLut | RenderVariantKey::RayMarching { .. } => (
                self.hdr_format,
                Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
            ),
            RenderVariantKey::PathTracing { .. } => (
                self.hdr_format,
                Some(wgpu::BlendState {
                    color: wgpu::BlendComponent {
                        src_factor: wgpu::BlendFactor::One,
                        dst_factor: wgpu::BlendFactor::One,
                        operation: wgpu::BlendOperation::Add,
                    },
                    alpha: wgpu::BlendComponent {
                        src_factor: wgpu::BlendFactor::One,
                        dst_factor: wgpu::BlendFactor::One,
                        operation: wgpu::BlendOperation::Add,
                    },
                }),
            ),
            RenderVariantKey::SkyView { .. } => (FRAME_LUT_FORMAT, None),
            RenderVariantKey::CameraVolume { .. } => {
                unreachable!("camera volumes are compute programs")
            }
        }
    }

    fn try_compile(
        &self,
        device: &wgpu::Device,
        key: &RenderVariantKey,
    ) -> Result<Program, SkyError> {
        let source = self.shaders.compose_sky(key.source_file(), &key.defines())?;
        let label = key.label();

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(SkyError::ShaderCompilationFailed {
                source_id: format!("{} ({})", key.source_file(), label),
                message: error.to_string(),
            });
        }

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let program = match key.kind() {
            ProgramKind::Raster => {
                let (format, blend) = self.raster_target(key);
                Program::Render(device.create_render_pipeline(
                    &wgpu::RenderPipelineDescriptor {
                        label: Some(&label),
                        layout: Some(&self.raster_layout),
                        vertex: wgpu::VertexState {
                            module: &module,
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
                            module: &module,
                            entry_point: Some(key.entry_point()),
                            targets: &[Some(wgpu::ColorTargetState {
                                format,
                                blend,
                                write_mask: wgpu::ColorWrites::ALL,
                            })],
                            compilation_options: Default::default(),
                        }),
                        multiview: None,
                        cache: None,
                    },
                ))
            }
            ProgramKind::Compute => Program::Compute(device.create_compute_pipeline(
                &wgpu::ComputePipelineDescriptor {
                    label: Some(&label),
                    layout: Some(&self.volume_pipeline_layout),
                    module: &module,
                    entry_point: Some(key.entry_point()),
                    compilation_options: Default::default(),
                    cache: None,
                },
            )),
        };
        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(SkyError::PipelineCreationFailed(format!(
                "{label}: {error}"
            )));
        }

        Ok(program)
    }

    /// Eagerly compile the whole valid key space. With `fail_fast` any
    /// failure aborts (startup policy); otherwise failures are logged and
    /// previously compiled programs keep serving. Returns the number of
    /// freshly compiled variants.
    pub fn compile_all(
        &mut self,
        device: &wgpu::Device,
        fail_fast: bool,
    ) -> Result<usize, SkyError> {
        let mut compiled = 0;
        for key in RenderVariantKey::enumerate() {
            match self.try_compile(device, &key) {
                Ok(program) => {
                    self.variants.insert(
                        key,
                        Variant {
                            program,
                            dirty: false,
                        },
                    );
                    compiled += 1;
                }
                Err(error) => {
                    if fail_fast {
                        return Err(error);
                    }
                    match self.variants.get_mut(&key) {
                        Some(variant) => {
                            variant.dirty = false;
                            log::warn!(
                                "variant {} failed to recompile, keeping previous program: {error}",
                                key.label()
                            );
                        }
                        None => {
                            log::error!("variant {} failed to compile: {error}", key.label());
                        }
                    }
                }
            }
        }
        log::info!("compiled {compiled} sky program variants");
        Ok(compiled)
    }

    /// Schedule a lazy recompilation of one variant.
    pub fn invalidate(&mut self, key: &RenderVariantKey) {
        if let Some(variant) = self.variants.get_mut(key) {
            variant.dirty = true;
        }
    }

    /// Schedule a lazy recompilation of every variant. No compilation
    /// happens until each variant is next resolved.
    pub fn mark_all_dirty(&mut self) {
        for variant in self.variants.values_mut() {
            variant.dirty = true;
        }
    }

    /// Frame-time lookup. A dirty entry gets one recompilation attempt; on
    /// failure the previous program keeps serving and the error only reaches
    /// the log. A key that was never compiled is compiled on the spot, and
    /// its failure is returned since there is nothing older to serve.
    pub fn resolve(
        &mut self,
        device: &wgpu::Device,
        key: &RenderVariantKey,
    ) -> Result<&Program, SkyError> {
        let compiled = self.variants.contains_key(key);
        let dirty = self.variants.get(key).is_some_and(|v| v.dirty);

        if !compiled {
            let program = self.try_compile(device, key)?;
            self.variants.insert(
                *key,
                Variant {
                    program,
                    dirty: false,
                },
            );
        } else if dirty {
            let result = self.try_compile(device, key);
            if let Some(variant) = self.variants.get_mut(key) {
                match result {
                    Ok(program) => variant.program = program,
                    Err(error) => {
                        log::warn!(
                            "variant {} failed to recompile, keeping previous program: {error}",
                            key.label()
                        );
                    }
                }
                // Cleared either way, so a broken shader is not retried
                // every frame.
                variant.dirty = false;
            }
        }

        self.variants
            .get(key)
            .map(|variant| &variant.program)
            .ok_or_else(|| SkyError::InvalidVariant(key.label()))
    }

    /// Number of currently compiled variants.
    pub fn compiled_count(&self) -> usize {
        self.variants.len()
    }
}
