//! The render-variant key space.
//!
//! A variant is one compiled program at one point of the technique ×
//! feature-flag space. Keys are validated at construction, so a pruned
//! combination is unrepresentable and call sites can not index a variant
//! that was never compiled.

use cirrus_core::{RenderSettings, RenderTechnique, SkyError, TransmittanceMethod};

/// Raster or compute program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramKind {
    Raster,
    Compute,
}

/// Key addressing one precompiled program variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderVariantKey {
    /// Precomputed-LUT evaluation; no sub-options.
    PrecomputedLut,
    PathTracing {
        transmittance: TransmittanceMethod,
        ground_gi: bool,
        shadowmap: bool,
        multi_scat_approx: bool,
    },
    RayMarching {
        multi_scat_approx: bool,
        fast_sky: bool,
        colored_transmittance: bool,
        fast_aerial_perspective: bool,
        shadowmap: bool,
    },
    /// Sky-view LUT generation (ray-marching fast-sky path).
    SkyView { multi_scat_approx: bool },
    /// Camera froxel volume generation.
    CameraVolume { multi_scat_approx: bool },
}

const BOOLS: [bool; 2] = [false, true];

impl RenderVariantKey {
    /// Ray-marching keys are validated: colored transmittance needs the
    /// per-channel blend path, which the fast-aerial-perspective composite
    /// can not also carry, so that combination is rejected.
    pub fn ray_marching(
        multi_scat_approx: bool,
        fast_sky: bool,
        colored_transmittance: bool,
        fast_aerial_perspective: bool,
        shadowmap: bool,
    ) -> Result<Self, SkyError> {
        if colored_transmittance && fast_aerial_perspective {
            return Err(SkyError::InvalidVariant(
                "colored transmittance and fast aerial perspective are mutually exclusive"
                    .to_string(),
            ));
        }
        Ok(Self::RayMarching {
            multi_scat_approx,
            fast_sky,
            colored_transmittance,
            fast_aerial_perspective,
            shadowmap,
        })
    }

    /// Every valid key, in deterministic order. This is the eager
    /// compilation set.
    pub fn enumerate() -> Vec<Self> {
        let mut keys = vec![Self::PrecomputedLut];

        for transmittance in TransmittanceMethod::ALL {
            for ground_gi in BOOLS {
                for shadowmap in BOOLS {
                    for multi_scat_approx in BOOLS {
                        keys.push(Self::PathTracing {
                            transmittance,
                            ground_gi,
                            shadowmap,
                            multi_scat_approx,
                        });
                    }
                }
            }
        }

        for multi_scat_approx in BOOLS {
            for fast_sky in BOOLS {
                for colored_transmittance in BOOLS {
                    for fast_aerial_perspective in BOOLS {
                        for shadowmap in BOOLS {
                            if let Ok(key) = Self::ray_marching(
                                multi_scat_approx,
                                fast_sky,
                                colored_transmittance,
                                fast_aerial_perspective,
                                shadowmap,
                            ) {
                                keys.push(key);
                            }
                        }
                    }
                }
            }
        }

        for multi_scat_approx in BOOLS {
            keys.push(Self::SkyView { multi_scat_approx });
        }
        for multi_scat_approx in BOOLS {
            keys.push(Self::CameraVolume { multi_scat_approx });
        }

        keys
    }

    /// The primary-technique key for the live settings. Never produces a
    /// pruned combination: colored transmittance is dropped while fast
    /// aerial perspective is active, mirroring how the UI hides the toggle.
    pub fn from_settings(settings: &RenderSettings) -> Self {
        match settings.technique {
            RenderTechnique::PrecomputedLut => Self::PrecomputedLut,
            RenderTechnique::PathTracing => Self::PathTracing {
                transmittance: settings.transmittance_method,
                ground_gi: false,
                shadowmap: settings.shadowmap,
                multi_scat_approx: settings.multi_scat_approx_enabled(),
            },
            RenderTechnique::RayMarching => Self::RayMarching {
                multi_scat_approx: settings.multi_scat_approx_enabled(),
                fast_sky: settings.fast_sky,
                colored_transmittance: settings.colored_transmittance
                    && !settings.fast_aerial_perspective,
                fast_aerial_perspective: settings.fast_aerial_perspective,
                shadowmap: settings.shadowmap,
            },
        }
    }

    /// Primary-technique key with the ground-GI axis derived from the live
    /// albedo (path tracing only).
    pub fn from_settings_with_ground_gi(settings: &RenderSettings, ground_gi: bool) -> Self {
        match Self::from_settings(settings) {
            Self::PathTracing {
                transmittance,
                shadowmap,
                multi_scat_approx,
                ..
            } => Self::PathTracing {
                transmittance,
                ground_gi,
                shadowmap,
                multi_scat_approx,
            },
            key => key,
        }
    }

    pub fn kind(&self) -> ProgramKind {
        match self {
            Self::CameraVolume { .. } => ProgramKind::Compute,
            _ => ProgramKind::Raster,
        }
    }

    /// WGSL source file under `shaders/sky/` this key compiles from.
    pub fn source_file(&self) -> &'static str {
        match self {
            Self::PrecomputedLut => "render_with_luts.wgsl",
            Self::PathTracing { .. } => "path_tracing.wgsl",
            Self::RayMarching { .. } | Self::SkyView { .. } | Self::CameraVolume { .. } => {
                "ray_march.wgsl"
            }
        }
    }

    pub fn entry_point(&self) -> &'static str {
        match self {
            Self::PrecomputedLut => "fs_render_with_luts",
            Self::PathTracing { .. } => "fs_path_tracing",
            Self::RayMarching { .. } => "fs_ray_march",
            Self::SkyView { .. } => "fs_sky_view_lut",
            Self::CameraVolume { .. } => "cs_camera_volumes",
        }
    }

    /// Named feature definitions rendered into the shader preamble. The full
    /// set is always emitted; axes outside this key default to zero.
    pub fn defines(&self) -> [(&'static str, u32); 7] {
        let mut transmittance_method = 2u32;
        let mut ground_gi = 0u32;
        let mut shadow = 0u32;
        let mut multi_scat = 0u32;
        let mut fast_sky = 0u32;
        let mut colored = 0u32;
        let mut fast_aerial = 0u32;

        match *self {
            Self::PrecomputedLut => {}
            Self::PathTracing {
                transmittance,
                ground_gi: gi,
                shadowmap,
                multi_scat_approx,
            } => {
                transmittance_method = match transmittance {
                    TransmittanceMethod::DeltaTracking => 0,
                    TransmittanceMethod::RatioTracking => 1,
                    TransmittanceMethod::Lut => 2,
                };
                ground_gi = gi as u32;
                shadow = shadowmap as u32;
                multi_scat = multi_scat_approx as u32;
            }
            Self::RayMarching {
                multi_scat_approx,
                fast_sky: fs,
                colored_transmittance,
                fast_aerial_perspective,
                shadowmap,
            } => {
                multi_scat = multi_scat_approx as u32;
                fast_sky = fs as u32;
                colored = colored_transmittance as u32;
                fast_aerial = fast_aerial_perspective as u32;
                shadow = shadowmap as u32;
            }
            Self::SkyView { multi_scat_approx } | Self::CameraVolume { multi_scat_approx } => {
                multi_scat = multi_scat_approx as u32;
            }
        }

        [
            ("TRANSMITTANCE_METHOD", transmittance_method),
            ("GROUND_GI_ENABLED", ground_gi),
            ("SHADOWMAP_ENABLED", shadow),
            ("MULTISCATAPPROX_ENABLED", multi_scat),
            ("FASTSKY_ENABLED", fast_sky),
            ("COLORED_TRANSMITTANCE_ENABLED", colored),
            ("FASTAERIALPERSPECTIVE_ENABLED", fast_aerial),
        ]
    }

    pub fn label(&self) -> String {
        match *self {
            Self::PrecomputedLut => "sky-lut".to_string(),
            Self::PathTracing {
                transmittance,
                ground_gi,
                shadowmap,
                multi_scat_approx,
            } => format!(
                "sky-path-tracing-t{}-gi{}-sm{}-ms{}",
                transmittance as u32, ground_gi as u32, shadowmap as u32, multi_scat_approx as u32
            ),
            Self::RayMarching {
                multi_scat_approx,
                fast_sky,
                colored_transmittance,
                fast_aerial_perspective,
                shadowmap,
            } => format!(
                "sky-ray-march-ms{}-fs{}-ct{}-fap{}-sm{}",
                multi_scat_approx as u32,
                fast_sky as u32,
                colored_transmittance as u32,
                fast_aerial_perspective as u32,
                shadowmap as u32
            ),
            Self::SkyView { multi_scat_approx } => {
                format!("sky-view-lut-ms{}", multi_scat_approx as u32)
            }
            Self::CameraVolume { multi_scat_approx } => {
                format!("camera-volume-ms{}", multi_scat_approx as u32)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_space_counts() {
        let keys = RenderVariantKey::enumerate();
        assert_eq!(keys.len(), 1 + 24 + 28 + 2 + 2);

        let path_tracing = keys
            .iter()
            .filter(|k| matches!(k, RenderVariantKey::PathTracing { .. }))
            .count();
        assert_eq!(path_tracing, 24);

        let ray_marching = keys
            .iter()
            .filter(|k| matches!(k, RenderVariantKey::RayMarching { .. }))
            .count();
        assert_eq!(ray_marching, 28);
    }

    #[test]
    fn test_pruned_combination_rejected() {
        let result = RenderVariantKey::ray_marching(false, false, true, true, false);
        assert!(matches!(result, Err(SkyError::InvalidVariant(_))));
    }

    #[test]
    fn test_enumerate_has_no_pruned_keys() {
        for key in RenderVariantKey::enumerate() {
            if let RenderVariantKey::RayMarching {
                colored_transmittance,
                fast_aerial_perspective,
                ..
            } = key
            {
                assert!(!(colored_transmittance && fast_aerial_perspective));
            }
        }
    }

    #[test]
    fn test_from_settings_never_prunes() {
        let mut settings = RenderSettings::default();
        settings.technique = RenderTechnique::RayMarching;
        settings.colored_transmittance = true;
        settings.fast_aerial_perspective = true;
        let key = RenderVariantKey::from_settings(&settings);
        match key {
            RenderVariantKey::RayMarching {
                colored_transmittance,
                fast_aerial_perspective,
                ..
            } => {
                assert!(fast_aerial_perspective);
                assert!(!colored_transmittance);
            }
            other => panic!("unexpected key {other:?}"),
        }

        // With fast aerial perspective off the colored path is allowed.
        settings.fast_aerial_perspective = false;
        match RenderVariantKey::from_settings(&settings) {
            RenderVariantKey::RayMarching {
                colored_transmittance,
                ..
            } => assert!(colored_transmittance),
            other => panic!("unexpected key {other:?}"),
        }
    }

    #[test]
    fn test_defines_cover_all_axes() {
        let key = RenderVariantKey::PathTracing {
            transmittance: TransmittanceMethod::RatioTracking,
            ground_gi: true,
            shadowmap: false,
            multi_scat_approx: true,
        };
        let defines = key.defines();
        assert!(defines.contains(&("TRANSMITTANCE_METHOD", 1)));
        assert!(defines.contains(&("GROUND_GI_ENABLED", 1)));
        assert!(defines.contains(&("SHADOWMAP_ENABLED", 0)));
        assert!(defines.contains(&("MULTISCATAPPROX_ENABLED", 1)));
        // Ray-marching-only axes still get a value.
        assert!(defines.contains(&("FASTSKY_ENABLED", 0)));
    }

    #[test]
    fn test_camera_volume_is_compute() {
        let key = RenderVariantKey::CameraVolume {
            multi_scat_approx: true,
        };
        assert_eq!(key.kind(), ProgramKind::Compute);
        assert_eq!(key.entry_point(), "cs_camera_volumes");
    }
}
