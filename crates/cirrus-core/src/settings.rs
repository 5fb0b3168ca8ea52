//! Live render technique and quality settings.

use crate::atmosphere::AtmosphereParameters;

/// Primary sky rendering technique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderTechnique {
    /// Evaluate the precomputed transmittance/irradiance/scattering LUTs.
    PrecomputedLut,
    /// Stochastic path tracing, accumulated over frames.
    PathTracing,
    /// Real-time ray marching with the fast-sky / aerial-perspective LUTs.
    RayMarching,
}

/// How the path tracer evaluates transmittance along a ray.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransmittanceMethod {
    DeltaTracking,
    RatioTracking,
    Lut,
}

impl TransmittanceMethod {
    pub const ALL: [TransmittanceMethod; 3] = [
        TransmittanceMethod::DeltaTracking,
        TransmittanceMethod::RatioTracking,
        TransmittanceMethod::Lut,
    ];
}

/// Technique and quality state mutated by the embedding application between
/// frames. Read by the dirty detector and the variant selector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSettings {
    pub technique: RenderTechnique,
    pub transmittance_method: TransmittanceMethod,
    pub shadowmap: bool,
    pub fast_sky: bool,
    pub fast_aerial_perspective: bool,
    pub colored_transmittance: bool,
    /// 0 disables the multi-scattering approximation; the path tracer then
    /// integrates all orders itself.
    pub multi_scattering_factor: f32,
    /// Number of scattering orders the precomputation accumulates.
    pub scattering_orders: u32,
    pub ray_march_min_spp: u32,
    pub ray_march_max_spp: u32,
    pub sun_illuminance_scale: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            technique: RenderTechnique::RayMarching,
            transmittance_method: TransmittanceMethod::Lut,
            shadowmap: false,
            fast_sky: true,
            fast_aerial_perspective: true,
            colored_transmittance: false,
            multi_scattering_factor: 1.0,
            scattering_orders: 4,
            ray_march_min_spp: 4,
            ray_march_max_spp: 14,
            sun_illuminance_scale: 1.0,
        }
    }
}

impl RenderSettings {
    pub fn multi_scat_approx_enabled(&self) -> bool {
        self.multi_scattering_factor > 0.0
    }

    /// SPP range with max forced above min.
    pub fn clamped_spp(&self) -> (u32, u32) {
        let min = self.ray_march_min_spp.max(1);
        let max = if min >= self.ray_march_max_spp {
            min + 1
        } else {
            self.ray_march_max_spp
        };
        (min, max)
    }

    /// The subset of settings whose change invalidates cached LUTs, plus the
    /// albedo-derived ground-GI flag from the live parameters.
    pub fn lut_toggles(&self, params: &AtmosphereParameters) -> LutToggles {
        LutToggles {
            technique: self.technique,
            transmittance_method: self.transmittance_method,
            shadowmap: self.shadowmap,
            scattering_orders: self.scattering_orders,
            multi_scattering_factor_bits: self.multi_scattering_factor.to_bits(),
            ground_gi: params.has_ground_albedo(),
        }
    }
}

/// Technique/quality toggles captured alongside the parameter snapshot.
/// The multi-scattering factor is compared by bit pattern so NaN can not
/// make two snapshots spuriously unequal forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LutToggles {
    pub technique: RenderTechnique,
    pub transmittance_method: TransmittanceMethod,
    pub shadowmap: bool,
    pub scattering_orders: u32,
    pub multi_scattering_factor_bits: u32,
    pub ground_gi: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spp_clamp() {
        let mut settings = RenderSettings::default();
        settings.ray_march_min_spp = 20;
        settings.ray_march_max_spp = 14;
        assert_eq!(settings.clamped_spp(), (20, 21));
    }

    #[test]
    fn test_ground_gi_follows_albedo() {
        let settings = RenderSettings::default();
        let mut params = AtmosphereParameters::earth();
        assert!(!settings.lut_toggles(&params).ground_gi);
        params.ground_albedo = [0.4, 0.4, 0.4];
        assert!(settings.lut_toggles(&params).ground_gi);
    }

    #[test]
    fn test_multi_scat_approx_threshold() {
        let mut settings = RenderSettings::default();
        assert!(settings.multi_scat_approx_enabled());
        settings.multi_scattering_factor = 0.0;
        assert!(!settings.multi_scat_approx_enabled());
    }
}
