//! Frame-level sky rendering: uniforms, the composite draw, and the
//! per-frame control flow tying the dirty detector, the precomputation
//! pipeline and the variant selector together.

use glam::{Mat4, Vec3};

use cirrus_core::{
    AtmosphereParameters, DirtyStateDetector, LutDimensions, RenderSettings, RenderTechnique,
    SkyError,
};
use cirrus_lut::{AtmosphereUniforms, LutCache, PrecomputePipeline, TempLutSet};

use crate::frame::{FrameResources, MULTI_SCATTERING_LUT_RES};
use crate::selector::VariantSelector;
use crate::shader_lib::ShaderLibrary;
use crate::variant::RenderVariantKey;

/// Camera and sun state for one frame, supplied by the embedding
/// application. Positions are kilometers relative to the ground point below
/// the camera.
#[derive(Debug, Clone, Copy)]
pub struct ViewState {
    pub view_proj: Mat4,
    pub camera_position: Vec3,
    pub view_dir: Vec3,
    pub sun_direction: Vec3,
    pub resolution: [f32; 2],
}

/// Frame constants. Must match `SkyFrame` in
/// `shaders/sky/sky_bindings.wgsl` (272 bytes).
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SkyUniforms {
    pub sky_view_proj: [[f32; 4]; 4],
    pub sky_inv_view_proj: [[f32; 4]; 4],
    pub shadowmap_view_proj: [[f32; 4]; 4],

    pub camera: [f32; 3],
    pub frame_id: f32,

    pub sun_direction: [f32; 3],
    pub sun_illuminance_scale: f32,

    pub view_ray: [f32; 3],
    pub pad0: f32,

    pub sun_illuminance: [f32; 3],
    pub max_path_depth: f32,

    pub resolution: [f32; 2],
    pub ray_march_min_spp: f32,
    pub ray_march_max_spp: f32,
}

impl SkyUniforms {
    pub fn new(view: &ViewState, settings: &RenderSettings, frame_id: u32) -> Self {
        let (min_spp, max_spp) = settings.clamped_spp();
        // The sun shadow volume covers a 200 km box around the view origin.
        let shadow_view = Mat4::look_at_lh(Vec3::ZERO, -view.sun_direction, Vec3::Z);
        let shadow_proj = Mat4::orthographic_lh(-100.0, 100.0, -100.0, 100.0, -100.0, 100.0);

        Self {
            sky_view_proj: view.view_proj.to_cols_array_2d(),
            sky_inv_view_proj: view.view_proj.inverse().to_cols_array_2d(),
            shadowmap_view_proj: (shadow_proj * shadow_view).to_cols_array_2d(),
            camera: view.camera_position.to_array(),
            frame_id: frame_id as f32,
            sun_direction: view.sun_direction.to_array(),
            sun_illuminance_scale: settings.sun_illuminance_scale,
            view_ray: view.view_dir.to_array(),
            pad0: 0.0,
            sun_illuminance: [1.0, 1.0, 1.0],
            max_path_depth: settings.scattering_orders as f32,
            resolution: view.resolution,
            ray_march_min_spp: min_spp as f32,
            ray_march_max_spp: max_spp as f32,
        }
    }
}

/// Uniform buffers and the composite draw. The consumer boundary: given a
/// resolved program and the LUT bind group, draws the sky over the HDR
/// target.
pub struct SkyRenderer {
    atmosphere_buffer: wgpu::Buffer,
    frame_buffer: wgpu::Buffer,
    uniform_bg: wgpu::BindGroup,
}

impl SkyRenderer {
    pub fn new(device: &wgpu::Device, selector: &VariantSelector) -> Self {
        let atmosphere_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("sky-atmosphere-uniforms"),
            size: std::mem::size_of::<AtmosphereUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let frame_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("sky-frame-uniforms"),
            size: std::mem::size_of::<SkyUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("sky-uniform-bg"),
            layout: selector.uniform_layout(),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: atmosphere_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: frame_buffer.as_entire_binding(),
                },
            ],
        });
        Self {
            atmosphere_buffer,
            frame_buffer,
            uniform_bg,
        }
    }

    pub fn upload(
        &self,
        queue: &wgpu::Queue,
        atmosphere: &AtmosphereUniforms,
        sky: &SkyUniforms,
    ) {
        queue.write_buffer(&self.atmosphere_buffer, 0, bytemuck::bytes_of(atmosphere));
        queue.write_buffer(&self.frame_buffer, 0, bytemuck::bytes_of(sky));
    }

    pub fn uniform_bind_group(&self) -> &wgpu::BindGroup {
        &self.uniform_bg
    }

    /// Fullscreen composite with a resolved variant.
    pub fn composite(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        pipeline: &wgpu::RenderPipeline,
        textures: &wgpu::BindGroup,
        clear: bool,
    ) {
        let load = if clear {
            wgpu::LoadOp::Clear(wgpu::Color::BLACK)
        } else {
            wgpu::LoadOp::Load
        };
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("sky-composite-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &self.uniform_bg, &[]);
        pass.set_bind_group(1, textures, &[]);
        pass.draw(0..3, 0..1);
    }
}

/// Everything needed to draw the sky, plus the per-frame control flow:
/// detect dirty state, regenerate and commit, resolve the active variant,
/// run the technique's passes, composite.
pub struct SkyContext {
    pub params: AtmosphereParameters,
    pub settings: RenderSettings,

    detector: DirtyStateDetector,
    cache: LutCache,
    temp: TempLutSet,
    precompute: PrecomputePipeline,
    selector: VariantSelector,
    frame: FrameResources,
    renderer: SkyRenderer,
    frame_id: u32,
}

impl SkyContext {
    /// Build the full sky stack and eagerly compile every variant; a compile
    /// failure here is fatal by policy.
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        dims: LutDimensions,
        hdr_format: wgpu::TextureFormat,
        shaders: ShaderLibrary,
    ) -> Result<Self, SkyError> {
        let cache = LutCache::new(device, dims)?;
        let temp = TempLutSet::new(device, &dims);
        let precompute = PrecomputePipeline::new(device, &cache, &temp);

        let mut selector = VariantSelector::new(device, shaders, hdr_format);
        selector.compile_all(device, true)?;

        let frame = FrameResources::new(device, queue, &selector, &cache)?;
        let renderer = SkyRenderer::new(device, &selector);

        Ok(Self {
            params: AtmosphereParameters::earth(),
            settings: RenderSettings::default(),
            detector: DirtyStateDetector::new(),
            cache,
            temp,
            precompute,
            selector,
            frame,
            renderer,
            frame_id: 0,
        })
    }

    pub fn cache(&self) -> &LutCache {
        &self.cache
    }

    pub fn temp(&self) -> &TempLutSet {
        &self.temp
    }

    pub fn selector_mut(&mut self) -> &mut VariantSelector {
        &mut self.selector
    }

    /// Request an unconditional LUT regeneration (explicit reload, state
    /// restore).
    pub fn force_regeneration(&mut self) {
        self.detector.force();
    }

    /// Live-reload trigger: every variant recompiles lazily on next use.
    pub fn mark_shaders_dirty(&mut self) {
        self.selector.mark_all_dirty();
    }

    /// Render one frame of sky into `target`.
    pub fn render(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        target: &wgpu::TextureView,
        view: &ViewState,
    ) -> Result<(), SkyError> {
        let toggles = self.settings.lut_toggles(&self.params);
        let atmosphere_uniforms = AtmosphereUniforms::new(
            &self.params,
            self.cache.dims(),
            self.settings.multi_scattering_factor,
            MULTI_SCATTERING_LUT_RES,
        );

        if self.detector.is_dirty(&self.params, &toggles) {
            // Path-traced accumulation restarts whenever the state changes.
            self.frame_id = 0;

            if self.settings.technique == RenderTechnique::PrecomputedLut {
                match self.precompute.regenerate(
                    device,
                    queue,
                    &self.cache,
                    &atmosphere_uniforms,
                    self.settings.scattering_orders,
                ) {
                    // Snapshot committed only after the pipeline ran; a
                    // failure keeps serving the stale tables and retries on
                    // the next frame.
                    Ok(()) => self.detector.commit(&self.params, &toggles),
                    Err(error) => log::warn!("LUT regeneration failed: {error}"),
                }
            } else {
                // The per-frame techniques have no cached artifact to
                // rebuild; the snapshot just tracks the live state.
                self.detector.commit(&self.params, &toggles);
            }
        }

        let sky_uniforms = SkyUniforms::new(view, &self.settings, self.frame_id);
        self.renderer
            .upload(queue, &atmosphere_uniforms, &sky_uniforms);

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("sky-frame"),
        });

        match self.settings.technique {
            RenderTechnique::PrecomputedLut => {
                self.frame.dispatch_camera_volumes(
                    &mut encoder,
                    self.renderer.uniform_bind_group(),
                    None,
                );

                let program = self
                    .selector
                    .resolve(device, &RenderVariantKey::PrecomputedLut)?;
                let pipeline = program
                    .render()
                    .ok_or_else(|| SkyError::InvalidVariant("sky-lut".to_string()))?;
                self.renderer.composite(
                    &mut encoder,
                    target,
                    pipeline,
                    self.frame.lut_bind_group(),
                    true,
                );
            }
            RenderTechnique::RayMarching => {
                self.frame
                    .render_transmittance_lut(&mut encoder, self.renderer.uniform_bind_group());
                self.frame
                    .dispatch_multi_scatt(&mut encoder, self.renderer.uniform_bind_group());

                let multi_scat = self.settings.multi_scat_approx_enabled();
                if self.settings.fast_sky {
                    let key = RenderVariantKey::SkyView {
                        multi_scat_approx: multi_scat,
                    };
                    let program = self.selector.resolve(device, &key)?;
                    let pipeline = program
                        .render()
                        .ok_or_else(|| SkyError::InvalidVariant(key.label()))?;
                    self.frame.render_sky_view(
                        &mut encoder,
                        self.renderer.uniform_bind_group(),
                        pipeline,
                    );
                }

                let key = RenderVariantKey::CameraVolume {
                    multi_scat_approx: multi_scat,
                };
                let program = self.selector.resolve(device, &key)?;
                let pipeline = program
                    .compute()
                    .ok_or_else(|| SkyError::InvalidVariant(key.label()))?;
                self.frame.dispatch_camera_volumes(
                    &mut encoder,
                    self.renderer.uniform_bind_group(),
                    Some(pipeline),
                );

                let key = RenderVariantKey::from_settings(&self.settings);
                let program = self.selector.resolve(device, &key)?;
                let pipeline = program
                    .render()
                    .ok_or_else(|| SkyError::InvalidVariant(key.label()))?;
                self.renderer.composite(
                    &mut encoder,
                    target,
                    pipeline,
                    self.frame.main_bind_group(),
                    true,
                );
            }
            RenderTechnique::PathTracing => {
                self.frame
                    .render_transmittance_lut(&mut encoder, self.renderer.uniform_bind_group());
                if self.settings.multi_scat_approx_enabled() {
                    self.frame
                        .dispatch_multi_scatt(&mut encoder, self.renderer.uniform_bind_group());
                }

                let key = RenderVariantKey::from_settings_with_ground_gi(
                    &self.settings,
                    self.params.has_ground_albedo(),
                );
                let program = self.selector.resolve(device, &key)?;
                let pipeline = program
                    .render()
                    .ok_or_else(|| SkyError::InvalidVariant(key.label()))?;
                // Additive accumulation: clear only on the first sample.
                self.renderer.composite(
                    &mut encoder,
                    target,
                    pipeline,
                    self.frame.main_bind_group(),
                    self.frame_id == 0,
                );
            }
        }

        queue.submit(std::iter::once(encoder.finish()));
        self.frame_id = self.frame_id.wrapping_add(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sky_uniforms_size() {
        // 3 matrices + 5 rows of 16 bytes.
        assert_eq!(std::mem::size_of::<SkyUniforms>(), 272);
    }

    #[test]
    fn test_spp_range_in_uniforms() {
        let view = ViewState {
            view_proj: Mat4::IDENTITY,
            camera_position: Vec3::new(0.0, 0.0, 0.5),
            view_dir: Vec3::Y,
            sun_direction: Vec3::Z,
            resolution: [1920.0, 1080.0],
        };
        let mut settings = RenderSettings::default();
        settings.ray_march_min_spp = 10;
        settings.ray_march_max_spp = 5;
        let uniforms = SkyUniforms::new(&view, &settings, 7);
        assert_eq!(uniforms.ray_march_min_spp, 10.0);
        assert_eq!(uniforms.ray_march_max_spp, 11.0);
        assert_eq!(uniforms.frame_id, 7.0);
    }
}
