pub mod atmosphere;
pub mod dimensions;
pub mod dirty;
pub mod error;
pub mod settings;

pub use atmosphere::{AtmosphereParameters, DensityProfile, DensityProfileLayer};
pub use dimensions::LutDimensions;
pub use dirty::DirtyStateDetector;
pub use error::SkyError;
pub use settings::{LutToggles, RenderSettings, RenderTechnique, TransmittanceMethod};
