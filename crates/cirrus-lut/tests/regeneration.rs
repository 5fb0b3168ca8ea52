//! GPU integration tests for the precomputation pipeline. These need a real
//! adapter: `cargo test -p cirrus-lut --features gpu-tests`.
#![cfg(feature = "gpu-tests")]

use cirrus_core::{AtmosphereParameters, DirtyStateDetector, LutDimensions, RenderSettings};
use cirrus_lut::{AtmosphereUniforms, LutCache, PassKind, PrecomputePipeline, TempLutSet};

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
            label: Some("lut-test-device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
        },
        None,
    ))
    .ok()?;
    Some((device, queue))
}

struct Fixture {
    device: wgpu::Device,
    queue: wgpu::Queue,
    cache: LutCache,
    temp: TempLutSet,
    pipeline: PrecomputePipeline,
    dims: LutDimensions,
}

fn fixture() -> Option<Fixture> {
    let (device, queue) = match create_device() {
        Some(pair) => pair,
        None => {
            eprintln!("no GPU adapter available, skipping");
            return None;
        }
    };
    // Reduced extents keep each regeneration in the tens of milliseconds.
    let dims = LutDimensions {
        transmittance_width: 64,
        transmittance_height: 16,
        irradiance_width: 32,
        irradiance_height: 8,
        scattering_r_size: 8,
        scattering_mu_size: 32,
        scattering_mu_s_size: 8,
        scattering_nu_size: 4,
    };
    let cache = LutCache::new(&device, dims).expect("cache allocation");
    let temp = TempLutSet::new(&device, &dims);
    let pipeline = PrecomputePipeline::new(&device, &cache, &temp);
    Some(Fixture {
        device,
        queue,
        cache,
        temp,
        pipeline,
        dims,
    })
}

fn earth_uniforms(dims: &LutDimensions) -> AtmosphereUniforms {
    AtmosphereUniforms::new(&AtmosphereParameters::earth(), dims, 1.0, 32)
}

fn as_bytes(texels: &[[f32; 4]]) -> &[u8] {
    bytemuck::cast_slice(texels)
}

#[test]
fn test_regeneration_is_idempotent() {
    let Some(f) = fixture() else { return };
    let uniforms = earth_uniforms(&f.dims);

    f.pipeline
        .regenerate(&f.device, &f.queue, &f.cache, &uniforms, 4)
        .expect("first regeneration");
    let transmittance_a = f.cache.read_transmittance(&f.device, &f.queue);
    let irradiance_a = f.cache.read_irradiance(&f.device, &f.queue);
    let scattering_a = f.cache.read_scattering(&f.device, &f.queue);

    f.pipeline
        .regenerate(&f.device, &f.queue, &f.cache, &uniforms, 4)
        .expect("second regeneration");
    let transmittance_b = f.cache.read_transmittance(&f.device, &f.queue);
    let irradiance_b = f.cache.read_irradiance(&f.device, &f.queue);
    let scattering_b = f.cache.read_scattering(&f.device, &f.queue);

    assert_eq!(as_bytes(&transmittance_a), as_bytes(&transmittance_b));
    assert_eq!(as_bytes(&irradiance_a), as_bytes(&irradiance_b));
    assert_eq!(as_bytes(&scattering_a), as_bytes(&scattering_b));
}

#[test]
fn test_horizon_transmittance_for_earth_defaults() {
    let Some(f) = fixture() else { return };
    let uniforms = earth_uniforms(&f.dims);
    f.pipeline
        .regenerate(&f.device, &f.queue, &f.cache, &uniforms, 4)
        .expect("regeneration");

    let transmittance = f.cache.read_transmittance(&f.device, &f.queue);
    // Row 0 holds r = bottom radius; the last column is the grazing ray
    // (zenith angle 90 degrees).
    let horizon = transmittance[(f.dims.transmittance_width - 1) as usize];
    for c in 0..3 {
        assert!(
            horizon[c] > 0.0 && horizon[c] < 1.0,
            "horizon transmittance channel {c} out of range: {}",
            horizon[c]
        );
    }

    // A near-zenith ray passes through much less medium than the grazing ray.
    let zenith = transmittance[0];
    assert!(zenith[0] > horizon[0]);
}

#[test]
fn test_failed_stage_leaves_tables_stale_and_detector_dirty() {
    let Some(mut f) = fixture() else { return };
    let params = AtmosphereParameters::earth();
    let settings = RenderSettings::default();
    let uniforms = AtmosphereUniforms::new(&params, &f.dims, 1.0, 32);

    let mut detector = DirtyStateDetector::new();
    f.pipeline
        .regenerate(&f.device, &f.queue, &f.cache, &uniforms, 4)
        .expect("initial regeneration");
    detector.commit(&params, &settings.lut_toggles(&params));

    let transmittance_before = f.cache.read_transmittance(&f.device, &f.queue);
    let irradiance_before = f.cache.read_irradiance(&f.device, &f.queue);
    let scattering_before = f.cache.read_scattering(&f.device, &f.queue);

    // A parameter change makes the state dirty; every injected stage fault
    // must abort regeneration without touching the tables.
    let mut changed = params;
    changed.mie_phase_function_g = 0.5;
    let changed_uniforms = AtmosphereUniforms::new(&changed, &f.dims, 1.0, 32);
    let toggles = settings.lut_toggles(&changed);
    assert!(detector.is_dirty(&changed, &toggles));

    for stage in [
        PassKind::Transmittance,
        PassKind::DirectIrradiance,
        PassKind::SingleScattering,
        PassKind::ScatteringDensity,
        PassKind::IndirectIrradiance,
        PassKind::MultipleScattering,
    ] {
        f.pipeline.inject_fault(Some(stage));
        let result = f
            .pipeline
            .regenerate(&f.device, &f.queue, &f.cache, &changed_uniforms, 4);
        assert!(result.is_err(), "stage {stage:?} should abort regeneration");
        // Snapshot not committed: still dirty on the next frame.
        assert!(detector.is_dirty(&changed, &toggles));
    }
    f.pipeline.inject_fault(None);

    assert_eq!(
        as_bytes(&transmittance_before),
        as_bytes(&f.cache.read_transmittance(&f.device, &f.queue))
    );
    assert_eq!(
        as_bytes(&irradiance_before),
        as_bytes(&f.cache.read_irradiance(&f.device, &f.queue))
    );
    assert_eq!(
        as_bytes(&scattering_before),
        as_bytes(&f.cache.read_scattering(&f.device, &f.queue))
    );

    // The retry with all stages healthy succeeds and commits.
    f.pipeline
        .regenerate(&f.device, &f.queue, &f.cache, &changed_uniforms, 4)
        .expect("retry regeneration");
    detector.commit(&changed, &toggles);
    assert!(!detector.is_dirty(&changed, &toggles));
}

#[test]
fn test_orders_accumulate_monotonically() {
    let Some(f) = fixture() else { return };
    let uniforms = earth_uniforms(&f.dims);

    f.pipeline
        .regenerate(&f.device, &f.queue, &f.cache, &uniforms, 1)
        .expect("order-1 regeneration");
    let scattering_1 = f.cache.read_scattering(&f.device, &f.queue);
    let irradiance_1 = f.cache.read_irradiance(&f.device, &f.queue);

    // With a single order the durable irradiance table holds only the
    // (zeroed) direct-order initialization.
    assert!(irradiance_1.iter().all(|t| t[0] == 0.0 && t[1] == 0.0 && t[2] == 0.0));

    f.pipeline
        .regenerate(&f.device, &f.queue, &f.cache, &uniforms, 3)
        .expect("order-3 regeneration");
    let scattering_3 = f.cache.read_scattering(&f.device, &f.queue);
    let irradiance_3 = f.cache.read_irradiance(&f.device, &f.queue);

    // Higher orders only add non-negative contributions on top of the
    // single-scattering component.
    let mut grew = false;
    for (a, b) in scattering_1.iter().zip(scattering_3.iter()) {
        for c in 0..3 {
            assert!(
                b[c] >= a[c] - 1e-6,
                "accumulation decreased a texel: {} -> {}",
                a[c],
                b[c]
            );
            if b[c] > a[c] {
                grew = true;
            }
        }
        // The Mie channel carries only the single-scattering order.
        assert!((a[3] - b[3]).abs() < 1e-6);
    }
    assert!(grew, "orders 2..3 added no scattering at all");

    assert!(irradiance_3.iter().any(|t| t[0] > 0.0 || t[1] > 0.0 || t[2] > 0.0));
}

#[test]
fn test_scratch_tables_hold_final_order_after_full_run() {
    let Some(f) = fixture() else { return };
    let uniforms = earth_uniforms(&f.dims);

    f.pipeline
        .regenerate(&f.device, &f.queue, &f.cache, &uniforms, 1)
        .expect("order-1 regeneration");
    let delta_after_order_1 = f.temp.read_delta_rayleigh(&f.device, &f.queue, &f.dims);

    f.pipeline
        .regenerate(&f.device, &f.queue, &f.cache, &uniforms, 4)
        .expect("order-4 regeneration");
    let delta_after_order_4 = f.temp.read_delta_rayleigh(&f.device, &f.queue, &f.dims);

    // After the full run the buffer holds order-4 multiple scattering, not a
    // residue of the single-scattering pass.
    assert_ne!(
        as_bytes(&delta_after_order_1),
        as_bytes(&delta_after_order_4)
    );
}
