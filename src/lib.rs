#![forbid(unsafe_code)]

pub mod effects;
pub mod foundation;
pub mod preview;
pub mod render;
pub mod settings;
pub mod sink;
pub mod source;

pub use effects::RenderState;
pub use foundation::core::{Fps, Frame, FrameRGBA, Surface};
pub use foundation::error::{DitherError, DitherResult};
pub use preview::{PreviewOpts, render_preview};
pub use render::clock::{CancelToken, RefreshPacing};
pub use render::orchestrator::{Orchestrator, OrchestratorOpts, SessionReport};
pub use render::{BackendPreference, RenderPath};
pub use settings::{Algorithm, EffectSettings, SharedSettings};
pub use sink::{Completion, FrameSink, InMemorySink, SinkConfig};
pub use source::{FrameSource, IndexedSource, Stepped};
