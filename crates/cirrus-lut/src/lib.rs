pub mod cache;
pub mod pipeline;
pub mod uniforms;

pub use cache::{LutCache, TempLutSet};
pub use pipeline::{PassKind, PrecomputePipeline};
pub use uniforms::{AtmosphereUniforms, OrderUniforms};

/// Bytes per LUT texel: one `vec4<f32>`.
pub const TEXEL_SIZE: u64 = 16;
