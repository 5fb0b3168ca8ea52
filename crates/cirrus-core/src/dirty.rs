//! Cache-validity tracking for the precomputed LUT set.

use bytemuck::Zeroable;

use crate::atmosphere::AtmosphereParameters;
use crate::settings::LutToggles;

/// Decides whether the cached LUTs still match the live state.
///
/// Holds the parameter snapshot and toggles that produced the last valid
/// LUT set. Parameters are compared bytewise (the snapshot is plain-old-data,
/// so memcmp semantics are exact and NaN-safe); toggles are compared
/// field-wise.
///
/// The detector starts forced: the cached snapshot is zero-initialized and
/// must never be trusted before the first commit, so the first frame always
/// regenerates. Callers commit the snapshot only *after* a successful
/// regeneration — a failed run leaves the detector dirty and the previous
/// LUT contents stale but consistent.
#[derive(Debug)]
pub struct DirtyStateDetector {
    cached_params: AtmosphereParameters,
    cached_toggles: Option<LutToggles>,
    force: bool,
}

impl DirtyStateDetector {
    pub fn new() -> Self {
        Self {
            cached_params: AtmosphereParameters::zeroed(),
            cached_toggles: None,
            force: true,
        }
    }

    /// True when a regeneration is required before the cached LUTs may be
    /// used for the given live state.
    pub fn is_dirty(&self, live: &AtmosphereParameters, toggles: &LutToggles) -> bool {
        if self.force {
            return true;
        }
        if self.cached_params.as_bytes() != live.as_bytes() {
            return true;
        }
        self.cached_toggles.as_ref() != Some(toggles)
    }

    /// Record the state a successful regeneration was produced from. Single
    /// atomic snapshot copy; also clears any forced flag.
    pub fn commit(&mut self, live: &AtmosphereParameters, toggles: &LutToggles) {
        self.cached_params = *live;
        self.cached_toggles = Some(*toggles);
        self.force = false;
    }

    /// Request an unconditional regeneration on the next check. Used on
    /// explicit reloads and after restoring persisted state.
    pub fn force(&mut self) {
        self.force = true;
    }

    /// The last committed parameter snapshot. Zeroed until the first commit.
    pub fn snapshot(&self) -> &AtmosphereParameters {
        &self.cached_params
    }
}

impl Default for DirtyStateDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::RenderSettings;
    use crate::settings::RenderTechnique;

    fn toggles(params: &AtmosphereParameters) -> LutToggles {
        RenderSettings::default().lut_toggles(params)
    }

    #[test]
    fn test_first_frame_is_forced() {
        let detector = DirtyStateDetector::new();
        let params = AtmosphereParameters::earth();
        assert!(detector.is_dirty(&params, &toggles(&params)));
    }

    #[test]
    fn test_clean_after_commit() {
        let mut detector = DirtyStateDetector::new();
        let params = AtmosphereParameters::earth();
        let t = toggles(&params);
        detector.commit(&params, &t);
        assert!(!detector.is_dirty(&params, &t));
    }

    #[test]
    fn test_any_parameter_change_is_dirty() {
        let mut detector = DirtyStateDetector::new();
        let params = AtmosphereParameters::earth();
        let t = toggles(&params);
        detector.commit(&params, &t);

        let mut changed = params;
        changed.mie_phase_function_g = 0.76;
        assert!(detector.is_dirty(&changed, &t));

        let mut changed = params;
        changed.rayleigh_density.layers[1].exp_scale = -1.0 / 7.0;
        assert!(detector.is_dirty(&changed, &t));

        let mut changed = params;
        changed.ground_albedo[1] = 0.1;
        assert!(detector.is_dirty(&changed, &toggles(&changed)));
    }

    #[test]
    fn test_toggle_change_is_dirty() {
        let mut detector = DirtyStateDetector::new();
        let params = AtmosphereParameters::earth();
        let mut settings = RenderSettings::default();
        detector.commit(&params, &settings.lut_toggles(&params));

        settings.technique = RenderTechnique::PathTracing;
        assert!(detector.is_dirty(&params, &settings.lut_toggles(&params)));

        settings = RenderSettings::default();
        settings.scattering_orders = 5;
        assert!(detector.is_dirty(&params, &settings.lut_toggles(&params)));

        settings = RenderSettings::default();
        settings.shadowmap = true;
        assert!(detector.is_dirty(&params, &settings.lut_toggles(&params)));
    }

    #[test]
    fn test_nan_snapshot_compares_stable() {
        let mut detector = DirtyStateDetector::new();
        let mut params = AtmosphereParameters::earth();
        params.mie_phase_function_g = f32::NAN;
        let t = toggles(&params);
        detector.commit(&params, &t);
        // Same NaN bit pattern: still clean. Bytewise comparison never
        // reports an unchanged snapshot as dirty.
        assert!(!detector.is_dirty(&params, &t));
    }

    #[test]
    fn test_force_overrides_clean_state() {
        let mut detector = DirtyStateDetector::new();
        let params = AtmosphereParameters::earth();
        let t = toggles(&params);
        detector.commit(&params, &t);
        detector.force();
        assert!(detector.is_dirty(&params, &t));
        detector.commit(&params, &t);
        assert!(!detector.is_dirty(&params, &t));
    }
}
