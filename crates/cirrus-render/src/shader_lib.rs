//! WGSL source resolution and composition.
//!
//! Programs are assembled by string concatenation: a generated feature
//! preamble, the shared atmosphere model, the sky bindings, the fullscreen
//! vertex stage and the technique source. By default sources are the ones
//! embedded at build time; pointing the library at a directory serves them
//! from disk instead, so shader edits can be picked up by a live reload
//! without rebuilding.

use std::borrow::Cow;
use std::path::PathBuf;

use cirrus_core::SkyError;

pub struct ShaderLibrary {
    root: Option<PathBuf>,
}

const EMBEDDED: &[(&str, &str)] = &[
    (
        "common/atmosphere.wgsl",
        include_str!("../../../shaders/common/atmosphere.wgsl"),
    ),
    (
        "sky/sky_bindings.wgsl",
        include_str!("../../../shaders/sky/sky_bindings.wgsl"),
    ),
    (
        "sky/fullscreen.wgsl",
        include_str!("../../../shaders/sky/fullscreen.wgsl"),
    ),
    (
        "sky/render_with_luts.wgsl",
        include_str!("../../../shaders/sky/render_with_luts.wgsl"),
    ),
    (
        "sky/ray_march.wgsl",
        include_str!("../../../shaders/sky/ray_march.wgsl"),
    ),
    (
        "sky/path_tracing.wgsl",
        include_str!("../../../shaders/sky/path_tracing.wgsl"),
    ),
];

impl ShaderLibrary {
    /// Serve the sources embedded at build time.
    pub fn embedded() -> Self {
        Self { root: None }
    }

    /// Serve sources from a shader directory on disk (live-editable).
    pub fn from_dir(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn source(&self, name: &str) -> Result<Cow<'static, str>, SkyError> {
        match &self.root {
            Some(root) => std::fs::read_to_string(root.join(name))
                .map(Cow::Owned)
                .map_err(|e| SkyError::ShaderSourceUnavailable(name.to_string(), e.to_string())),
            None => EMBEDDED
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, text)| Cow::Borrowed(*text))
                .ok_or_else(|| {
                    SkyError::ShaderSourceUnavailable(
                        name.to_string(),
                        "not embedded".to_string(),
                    )
                }),
        }
    }

    /// Assemble a complete sky program for one technique source and one set
    /// of feature definitions.
    pub fn compose_sky(
        &self,
        technique_file: &str,
        defines: &[(&'static str, u32)],
    ) -> Result<String, SkyError> {
        let mut preamble = String::new();
        for (name, value) in defines {
            preamble.push_str(&format!("const {name}: u32 = {value}u;\n"));
        }

        let atmosphere = self.source("common/atmosphere.wgsl")?;
        let bindings = self.source("sky/sky_bindings.wgsl")?;
        let fullscreen = self.source("sky/fullscreen.wgsl")?;
        let technique = self.source(&format!("sky/{technique_file}"))?;

        Ok(format!(
            "{preamble}\n{atmosphere}\n{bindings}\n{fullscreen}\n{technique}"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_sources_compose() {
        let lib = ShaderLibrary::embedded();
        let source = lib
            .compose_sky("ray_march.wgsl", &[("MULTISCATAPPROX_ENABLED", 1)])
            .expect("compose");
        assert!(source.starts_with("const MULTISCATAPPROX_ENABLED: u32 = 1u;"));
        assert!(source.contains("fn fs_ray_march"));
        assert!(source.contains("fn vs_fullscreen"));
    }

    #[test]
    fn test_unknown_source_is_an_error() {
        let lib = ShaderLibrary::embedded();
        let result = lib.compose_sky("no_such_file.wgsl", &[]);
        assert!(matches!(
            result,
            Err(SkyError::ShaderSourceUnavailable(_, _))
        ));
    }
}
