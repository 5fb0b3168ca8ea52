//! Physical description of the planetary atmosphere.
//!
//! All lengths are in kilometers, all scattering/extinction/absorption
//! coefficients in 1/km, per color channel. The struct layout is `repr(C)`
//! with only `f32` fields so a snapshot can be compared bytewise — see
//! [`crate::dirty::DirtyStateDetector`].

use bytemuck::{Pod, Zeroable};

/// One layer of a piecewise density profile.
///
/// Density at altitude `h` (km above ground) inside the layer is
/// `exp_term * exp(exp_scale * h) + linear_term * h + constant_term`,
/// clamped to [0, 1]. `width` is the altitude at which the next layer takes
/// over; the last layer extends to the top of the atmosphere.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct DensityProfileLayer {
    pub width: f32,
    pub exp_term: f32,
    pub exp_scale: f32,
    pub linear_term: f32,
    pub constant_term: f32,
}

impl DensityProfileLayer {
    pub const ZERO: Self = Self {
        width: 0.0,
        exp_term: 0.0,
        exp_scale: 0.0,
        linear_term: 0.0,
        constant_term: 0.0,
    };

    /// Pure exponential falloff with the given scale height (km).
    pub fn exponential(scale_height: f32) -> Self {
        Self {
            width: 0.0,
            exp_term: 1.0,
            exp_scale: -1.0 / scale_height,
            linear_term: 0.0,
            constant_term: 0.0,
        }
    }
}

/// Two-layer density profile. Rayleigh and Mie use a single exponential
/// layer (layer 0 zeroed); the ozone absorption profile uses both layers to
/// form a tent function peaking at 25 km.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct DensityProfile {
    pub layers: [DensityProfileLayer; 2],
}

impl DensityProfile {
    pub fn exponential(scale_height: f32) -> Self {
        Self {
            layers: [
                DensityProfileLayer::ZERO,
                DensityProfileLayer::exponential(scale_height),
            ],
        }
    }
}

/// Complete atmosphere medium description.
///
/// Two copies of this struct exist at runtime: the live one mutated by the
/// embedding application and the last-cached snapshot held by the dirty
/// detector. Equality between them is the LUT-validity invariant.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct AtmosphereParameters {
    /// Solar irradiance at the top of the atmosphere, per channel.
    pub solar_irradiance: [f32; 3],
    /// Sun angular radius in radians.
    pub sun_angular_radius: f32,

    pub rayleigh_scattering: [f32; 3],
    /// Cornette-Shanks phase asymmetry for Mie scattering.
    pub mie_phase_function_g: f32,

    pub mie_scattering: [f32; 3],
    /// Planet ground radius (km).
    pub bottom_radius: f32,

    pub mie_extinction: [f32; 3],
    /// Top-of-atmosphere radius (km).
    pub top_radius: f32,

    /// Ozone absorption extinction.
    pub absorption_extinction: [f32; 3],
    /// Cosine of the maximum sun zenith angle the scattering LUT covers.
    pub mu_s_min: f32,

    pub ground_albedo: [f32; 3],
    pub pad: f32,

    pub rayleigh_density: DensityProfile,
    pub mie_density: DensityProfile,
    pub absorption_density: DensityProfile,
}

impl AtmosphereParameters {
    /// Earth-like defaults. Coefficients are integrated over the visible
    /// wavelength power spectrum; solar irradiance is normalized to one so
    /// the LUTs act as a transfer factor for the runtime sun illuminance.
    pub fn earth() -> Self {
        const EARTH_BOTTOM_RADIUS: f32 = 6360.0;
        // 100 km atmosphere: contains 99.99% of the medium, little visible edge.
        const EARTH_TOP_RADIUS: f32 = 6460.0;
        const EARTH_RAYLEIGH_SCALE_HEIGHT: f32 = 8.0;
        const EARTH_MIE_SCALE_HEIGHT: f32 = 1.2;

        let max_sun_zenith_angle = std::f64::consts::PI * 120.0 / 180.0;

        Self {
            solar_irradiance: [1.0, 1.0, 1.0],
            sun_angular_radius: 0.004675,

            rayleigh_scattering: [0.005802, 0.013558, 0.033100],
            mie_phase_function_g: 0.8,

            mie_scattering: [0.003996, 0.003996, 0.003996],
            bottom_radius: EARTH_BOTTOM_RADIUS,

            mie_extinction: [0.004440, 0.004440, 0.004440],
            top_radius: EARTH_TOP_RADIUS,

            absorption_extinction: [0.000650, 0.001881, 0.000085],
            mu_s_min: max_sun_zenith_angle.cos() as f32,

            ground_albedo: [0.0, 0.0, 0.0],
            pad: 0.0,

            rayleigh_density: DensityProfile::exponential(EARTH_RAYLEIGH_SCALE_HEIGHT),
            mie_density: DensityProfile::exponential(EARTH_MIE_SCALE_HEIGHT),
            // Ozone tent: ramps up to 25 km, back down to zero at 40 km.
            absorption_density: DensityProfile {
                layers: [
                    DensityProfileLayer {
                        width: 25.0,
                        exp_term: 0.0,
                        exp_scale: 0.0,
                        linear_term: 1.0 / 15.0,
                        constant_term: -2.0 / 3.0,
                    },
                    DensityProfileLayer {
                        width: 0.0,
                        exp_term: 0.0,
                        exp_scale: 0.0,
                        linear_term: -1.0 / 15.0,
                        constant_term: 8.0 / 3.0,
                    },
                ],
            },
        }
    }

    /// Mie absorption derived as extinction minus scattering, floored at
    /// zero per channel. Negative absorption is physically invalid and must
    /// never reach a pass constant.
    pub fn mie_absorption(&self) -> [f32; 3] {
        let mut out = [0.0f32; 3];
        for c in 0..3 {
            out[c] = (self.mie_extinction[c] - self.mie_scattering[c]).max(0.0);
        }
        out
    }

    /// Ground albedo floored at zero per channel.
    pub fn clamped_ground_albedo(&self) -> [f32; 3] {
        [
            self.ground_albedo[0].max(0.0),
            self.ground_albedo[1].max(0.0),
            self.ground_albedo[2].max(0.0),
        ]
    }

    /// True when any albedo channel is positive; a nonzero albedo enables
    /// ground global illumination and invalidates cached LUTs when it flips.
    pub fn has_ground_albedo(&self) -> bool {
        self.clamped_ground_albedo().iter().any(|&c| c > 0.0)
    }

    /// Raw bytes of the snapshot, for memcmp-style comparison.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameters_size() {
        // 6 spectrum/scalar rows of 16 bytes + 3 profiles of 40 bytes.
        assert_eq!(std::mem::size_of::<AtmosphereParameters>(), 216);
        assert_eq!(std::mem::size_of::<DensityProfile>(), 40);
    }

    #[test]
    fn test_earth_defaults() {
        let earth = AtmosphereParameters::earth();
        assert_eq!(earth.bottom_radius, 6360.0);
        assert_eq!(earth.top_radius, 6460.0);
        assert_eq!(earth.rayleigh_density.layers[1].exp_scale, -1.0 / 8.0);
        assert_eq!(earth.mie_density.layers[1].exp_scale, -1.0 / 1.2);
        assert!(!earth.has_ground_albedo());
    }

    #[test]
    fn test_mie_absorption_floored() {
        let mut params = AtmosphereParameters::earth();
        params.mie_extinction = [0.001, 0.010, 0.001];
        params.mie_scattering = [0.004, 0.004, 0.004];
        let abs = params.mie_absorption();
        assert_eq!(abs[0], 0.0);
        assert!((abs[1] - 0.006).abs() < 1e-6);
        assert_eq!(abs[2], 0.0);
    }

    #[test]
    fn test_ground_albedo_clamped() {
        let mut params = AtmosphereParameters::earth();
        params.ground_albedo = [-0.2, 0.3, 0.0];
        assert_eq!(params.clamped_ground_albedo(), [0.0, 0.3, 0.0]);
        assert!(params.has_ground_albedo());
    }
}
