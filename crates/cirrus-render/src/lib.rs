pub mod frame;
pub mod selector;
pub mod shader_lib;
pub mod sky;
pub mod variant;

pub use frame::{FrameResources, FRAME_LUT_FORMAT, MULTI_SCATTERING_LUT_RES};
pub use selector::{Program, VariantSelector};
pub use shader_lib::ShaderLibrary;
pub use sky::{SkyContext, SkyRenderer, SkyUniforms, ViewState};
pub use variant::{ProgramKind, RenderVariantKey};
