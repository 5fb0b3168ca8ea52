//! GPU integration tests for variant compilation. These need a real
//! adapter: `cargo test -p cirrus-render --features gpu-tests`.
#![cfg(feature = "gpu-tests")]

use cirrus_render::{ProgramKind, RenderVariantKey, ShaderLibrary, VariantSelector};

fn create_device() -> Option<(wgpu::Device, wgpu::Queue)> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::PRIMARY,
        ..Default::default()
    });
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
    }))?;
    let (device, queue) = pollster::block_on(adapter.request_device(
        &wgpu::DeviceDescriptor {
            label: Some("variant-test-device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
        },
        None,
    ))
    .ok()?;
    Some((device, queue))
}

#[test]
fn test_eager_compilation_covers_the_whole_key_space() {
    let Some((device, _queue)) = create_device() else {
        eprintln!("no GPU adapter available, skipping");
        return;
    };

    let mut selector = VariantSelector::new(
        &device,
        ShaderLibrary::embedded(),
        wgpu::TextureFormat::Rgba16Float,
    );
    let compiled = selector
        .compile_all(&device, true)
        .expect("eager compilation of every variant");
    assert_eq!(compiled, RenderVariantKey::enumerate().len());
}

#[test]
fn test_resolve_returns_matching_program_kind() {
    let Some((device, _queue)) = create_device() else {
        eprintln!("no GPU adapter available, skipping");
        return;
    };

    let mut selector = VariantSelector::new(
        &device,
        ShaderLibrary::embedded(),
        wgpu::TextureFormat::Rgba16Float,
    );
    selector.compile_all(&device, true).expect("compile");

    for key in RenderVariantKey::enumerate() {
        let program = selector.resolve(&device, &key).expect("resolve");
        match key.kind() {
            ProgramKind::Raster => assert!(program.render().is_some(), "{}", key.label()),
            ProgramKind::Compute => assert!(program.compute().is_some(), "{}", key.label()),
        }
    }
}

#[test]
fn test_dirty_mark_recompiles_on_resolve() {
    let Some((device, _queue)) = create_device() else {
        eprintln!("no GPU adapter available, skipping");
        return;
    };

    let mut selector = VariantSelector::new(
        &device,
        ShaderLibrary::embedded(),
        wgpu::TextureFormat::Rgba16Float,
    );
    selector.compile_all(&device, true).expect("compile");

    selector.mark_all_dirty();
    let key = RenderVariantKey::PrecomputedLut;
    selector
        .resolve(&device, &key)
        .expect("resolve after dirty mark");

    selector.invalidate(&key);
    selector
        .resolve(&device, &key)
        .expect("resolve after single-key invalidate");
}

#[test]
fn test_lazy_first_use_compiles_on_demand() {
    let Some((device, _queue)) = create_device() else {
        eprintln!("no GPU adapter available, skipping");
        return;
    };

    let mut selector = VariantSelector::new(
        &device,
        ShaderLibrary::embedded(),
        wgpu::TextureFormat::Rgba16Float,
    );
    assert_eq!(selector.compiled_count(), 0);

    let key = RenderVariantKey::SkyView {
        multi_scat_approx: true,
    };
    selector.resolve(&device, &key).expect("on-demand compile");
    assert_eq!(selector.compiled_count(), 1);
}
