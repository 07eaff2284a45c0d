//! Hardware-accelerated path: a worker thread that owns the output surface and draws each frame
//! with a fragment shader.
//!
//! Error diffusion is never offered to this path; see [`crate::settings::GpuAlgorithm`].

pub mod protocol;
pub mod shader;
pub mod software;
#[cfg(feature = "gpu")]
pub mod wgpu_shader;
pub mod worker;

use std::sync::Arc;

pub use protocol::{WorkerCommand, WorkerEvent, WorkerState};
pub use shader::{DitherShader, ShaderParams, ShaderProvider};
pub use worker::GpuRenderer;

/// The platform's hardware shader provider, if this build has one.
///
/// Adapter availability is only known once the worker tries to create a device; a missing
/// adapter surfaces as an initialization failure at that point.
pub fn default_provider() -> Option<Arc<dyn ShaderProvider>> {
    #[cfg(feature = "gpu")]
    {
        Some(Arc::new(wgpu_shader::WgpuShaderProvider::default()))
    }
    #[cfg(not(feature = "gpu"))]
    {
        None
    }
}
