//! GPU-uploadable constants for the precomputation kernels.

use cirrus_core::{AtmosphereParameters, DensityProfile, LutDimensions};

/// Atmosphere constants. Must match `Atmosphere` in
/// `shaders/common/atmosphere.wgsl` (288 bytes).
///
/// Built fresh from the live parameters before every regeneration; the
/// physically invalid negatives (derived Mie absorption, ground albedo) are
/// floored to zero here, before any kernel can see them.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct AtmosphereUniforms {
    pub solar_irradiance: [f32; 3],
    pub sun_angular_radius: f32,

    pub absorption_extinction: [f32; 3],
    pub mu_s_min: f32,

    pub rayleigh_scattering: [f32; 3],
    pub mie_phase_g: f32,

    pub mie_scattering: [f32; 3],
    pub bottom_radius: f32,

    pub mie_extinction: [f32; 3],
    pub top_radius: f32,

    pub mie_absorption: [f32; 3],
    pub multi_scattering_factor: f32,

    pub ground_albedo: [f32; 3],
    pub multi_scattering_lut_res: f32,

    pub rayleigh_density: [[f32; 4]; 3],
    pub mie_density: [[f32; 4]; 3],
    pub absorption_density: [[f32; 4]; 3],

    /// transmittance w/h, irradiance w/h
    pub lut_size_a: [u32; 4],
    /// scattering r, mu, mu_s, nu
    pub lut_size_b: [u32; 4],
}

/// Two 5-float layers packed into three vec4 rows, trailing pad.
fn pack_profile(profile: &DensityProfile) -> [[f32; 4]; 3] {
    let l0 = &profile.layers[0];
    let l1 = &profile.layers[1];
    [
        [l0.width, l0.exp_term, l0.exp_scale, l0.linear_term],
        [l0.constant_term, l1.width, l1.exp_term, l1.exp_scale],
        [l1.linear_term, l1.constant_term, 0.0, 0.0],
    ]
}

impl AtmosphereUniforms {
    pub fn new(
        params: &AtmosphereParameters,
        dims: &LutDimensions,
        multi_scattering_factor: f32,
        multi_scattering_lut_res: u32,
    ) -> Self {
        Self {
            solar_irradiance: params.solar_irradiance,
            sun_angular_radius: params.sun_angular_radius,
            absorption_extinction: params.absorption_extinction,
            mu_s_min: params.mu_s_min,
            rayleigh_scattering: params.rayleigh_scattering,
            mie_phase_g: params.mie_phase_function_g,
            mie_scattering: params.mie_scattering,
            bottom_radius: params.bottom_radius,
            mie_extinction: params.mie_extinction,
            top_radius: params.top_radius,
            mie_absorption: params.mie_absorption(),
            multi_scattering_factor,
            ground_albedo: params.clamped_ground_albedo(),
            multi_scattering_lut_res: multi_scattering_lut_res as f32,
            rayleigh_density: pack_profile(&params.rayleigh_density),
            mie_density: pack_profile(&params.mie_density),
            absorption_density: pack_profile(&params.absorption_density),
            lut_size_a: [
                dims.transmittance_width,
                dims.transmittance_height,
                dims.irradiance_width,
                dims.irradiance_height,
            ],
            lut_size_b: [
                dims.scattering_r_size,
                dims.scattering_mu_size,
                dims.scattering_mu_s_size,
                dims.scattering_nu_size,
            ],
        }
    }
}

/// Per-sub-pass side constant carrying the current scattering order.
/// Must match `OrderUniforms` in `shaders/common/lut_bindings.wgsl`.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct OrderUniforms {
    pub scattering_order: i32,
    pub pad0: u32,
    pub pad1: u32,
    pub pad2: u32,
}

impl OrderUniforms {
    pub fn new(scattering_order: i32) -> Self {
        Self {
            scattering_order,
            pad0: 0,
            pad1: 0,
            pad2: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atmosphere_uniforms_size() {
        // 7 rows of 16 bytes + 3 profiles of 48 bytes + 2 size rows.
        assert_eq!(std::mem::size_of::<AtmosphereUniforms>(), 288);
    }

    #[test]
    fn test_order_uniforms_size() {
        assert_eq!(std::mem::size_of::<OrderUniforms>(), 16);
    }

    #[test]
    fn test_clamps_applied_at_conversion() {
        let mut params = AtmosphereParameters::earth();
        params.mie_scattering = [0.01, 0.01, 0.01];
        params.mie_extinction = [0.004, 0.004, 0.004];
        params.ground_albedo = [-1.0, 0.5, 0.0];
        let uniforms = AtmosphereUniforms::new(&params, &LutDimensions::default(), 1.0, 32);
        assert_eq!(uniforms.mie_absorption, [0.0, 0.0, 0.0]);
        assert_eq!(uniforms.ground_albedo, [0.0, 0.5, 0.0]);
    }

    #[test]
    fn test_profile_packing_order() {
        let params = AtmosphereParameters::earth();
        let uniforms = AtmosphereUniforms::new(&params, &LutDimensions::default(), 1.0, 32);
        // Ozone layer 0: width 25, linear 1/15, constant -2/3.
        assert_eq!(uniforms.absorption_density[0][0], 25.0);
        assert!((uniforms.absorption_density[0][3] - 1.0 / 15.0).abs() < 1e-6);
        assert!((uniforms.absorption_density[1][0] + 2.0 / 3.0).abs() < 1e-6);
        // Rayleigh layer 1 exponential scale in the second row.
        assert!((uniforms.rayleigh_density[1][3] + 1.0 / 8.0).abs() < 1e-6);
    }
}
