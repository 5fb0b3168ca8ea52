use thiserror::Error;

/// Errors that can occur during Cirrus initialization and regeneration.
#[derive(Debug, Error)]
pub enum SkyError {
    #[error("no suitable GPU adapter found: {0}")]
    AdapterNotFound(String),

    #[error("failed to request GPU device: {0}")]
    DeviceRequestFailed(String),

    #[error("shader source `{0}` unavailable: {1}")]
    ShaderSourceUnavailable(String, String),

    #[error("shader compilation failed for `{source_id}`: {message}")]
    ShaderCompilationFailed { source_id: String, message: String },

    #[error("pipeline creation failed: {0}")]
    PipelineCreationFailed(String),

    #[error("precomputation pass unavailable: {0}")]
    PassUnavailable(&'static str),

    #[error("invalid render variant: {0}")]
    InvalidVariant(String),

    #[error("unsupported LUT dimensions: {0}")]
    UnsupportedDimensions(String),
}
