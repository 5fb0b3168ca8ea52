//! Native sky runner: brings up a GPU device, runs a full LUT regeneration,
//! probes the result, compiles the whole variant space and renders a few
//! frames with each technique. Exits nonzero on any failure, so it doubles
//! as a smoke check for the whole stack.

use std::process;
use std::time::Instant;

use glam::{Mat4, Vec3};

use cirrus_core::{LutDimensions, RenderTechnique};
use cirrus_lut::{AtmosphereUniforms, LutCache, PrecomputePipeline, TempLutSet};
use cirrus_render::{ShaderLibrary, SkyContext, ViewState};

const HDR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let mut orders = 4u32;
    let mut frames = 8u32;
    let mut shader_dir: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--orders" => {
                i += 1;
                orders = args[i].parse().expect("invalid --orders value");
            }
            "--frames" => {
                i += 1;
                frames = args[i].parse().expect("invalid --frames value");
            }
            "--shader-dir" => {
                i += 1;
                shader_dir = Some(args[i].clone());
            }
            "--help" | "-h" => {
                eprintln!("Usage: sky-runner [OPTIONS]");
                eprintln!("  --orders <n>        Scattering orders for the LUT regeneration (default: 4)");
                eprintln!("  --frames <n>        Frames to render per technique (default: 8)");
                eprintln!("  --shader-dir <dir>  Serve WGSL from disk instead of the embedded copies");
                process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                process::exit(1);
            }
        }
        i += 1;
    }

    log::info!("Initializing GPU...");
    let (device, queue) = create_device();

    // -- LUT regeneration + probe --
    let dims = LutDimensions::default();
    let cache = LutCache::new(&device, dims).expect("LUT cache allocation");
    let temp = TempLutSet::new(&device, &dims);
    let pipeline = PrecomputePipeline::new(&device, &cache, &temp);

    let params = cirrus_core::AtmosphereParameters::earth();
    let uniforms = AtmosphereUniforms::new(&params, &dims, 1.0, 32);

    let start = Instant::now();
    pipeline
        .regenerate(&device, &queue, &cache, &uniforms, orders)
        .expect("LUT regeneration");
    device.poll(wgpu::Maintain::Wait);
    log::info!(
        "Regenerated LUTs ({} orders) in {:.1} ms",
        orders,
        start.elapsed().as_secs_f64() * 1000.0
    );

    let transmittance = cache.read_transmittance(&device, &queue);
    let horizon = transmittance[(dims.transmittance_width - 1) as usize];
    log::info!(
        "Horizon transmittance: [{:.4}, {:.4}, {:.4}]",
        horizon[0],
        horizon[1],
        horizon[2]
    );
    if horizon.iter().take(3).any(|&c| c <= 0.0 || c >= 1.0) {
        log::error!("horizon transmittance outside (0, 1); LUT contents look wrong");
        process::exit(1);
    }

    // -- Full sky stack: eager variant compilation + a few frames of each
    //    technique --
    let shaders = match shader_dir {
        Some(dir) => ShaderLibrary::from_dir(dir),
        None => ShaderLibrary::embedded(),
    };
    let mut sky = SkyContext::new(&device, &queue, dims, HDR_FORMAT, shaders)
        .expect("sky stack initialization");
    sky.settings.scattering_orders = orders;

    let target = hdr_target(&device);
    let view = default_view();

    for technique in [
        RenderTechnique::PrecomputedLut,
        RenderTechnique::RayMarching,
        RenderTechnique::PathTracing,
    ] {
        sky.settings.technique = technique;
        let start = Instant::now();
        for _ in 0..frames {
            sky.render(&device, &queue, &target, &view)
                .expect("frame render");
        }
        device.poll(wgpu::Maintain::Wait);
        log::info!(
            "{:?}: {} frames in {:.1} ms",
            technique,
            frames,
            start.elapsed().as_secs_f64() * 1000.0
        );
    }

    log::info!("Sky runner complete.");
}

/// Initialize wgpu natively. Blocks on the async adapter request.
fn create_device() -> (wgpu::Device, wgpu::Queue) {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::PRIMARY,
        ..Default::default()
    });

    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
    }))
    .expect("no suitable GPU adapter found");

    log::info!("Adapter: {}", adapter.get_info().name);

    // The durable LUTs are 32-bit float and sampled with linear filtering.
    pollster::block_on(adapter.request_device(
        &wgpu::DeviceDescriptor {
            label: Some("sky-runner-device"),
            required_features: wgpu::Features::FLOAT32_FILTERABLE,
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
        },
        None,
    ))
    .expect("failed to create device")
}

fn hdr_target(device: &wgpu::Device) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("hdr-target"),
        size: wgpu::Extent3d {
            width: 1280,
            height: 720,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: HDR_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

fn default_view() -> ViewState {
    let camera = Vec3::new(0.0, 0.0, 0.5);
    let view_dir = Vec3::new(0.0, 1.0, 0.0);
    let view = Mat4::look_at_lh(camera, camera + view_dir, Vec3::Z);
    let proj = Mat4::perspective_lh(66.6f32.to_radians(), 1280.0 / 720.0, 0.1, 20000.0);

    ViewState {
        view_proj: proj * view,
        camera_position: camera,
        view_dir,
        sun_direction: Vec3::new(0.0, 0.9, 0.435).normalize(),
        resolution: [1280.0, 720.0],
    }
}
