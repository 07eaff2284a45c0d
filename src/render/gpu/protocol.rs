//! Messages exchanged between a session and its GPU worker thread.

use crate::{
    foundation::core::{Frame, FrameRGBA, Surface},
    settings::GpuEffect,
};

/// Main → worker.
#[derive(Debug)]
pub enum WorkerCommand {
    /// Take ownership of the output surface and build the shader program.
    Init {
        surface: Surface,
        width: u32,
        height: u32,
        effect: GpuEffect,
    },
    /// Draw one frame. The image is consumed by the worker.
    Frame {
        image: Frame,
        timestamp: f64,
        duration: f64,
    },
    /// Replace the effect settings used from the next frame on.
    UpdateOptions { effect: GpuEffect },
    /// Release resources and stop.
    Finish,
}

/// Worker → main.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    Ready,
    /// A frame was drawn. `presented` is a copy of the surface after the draw.
    FrameRendered {
        progress: f64,
        done: bool,
        presented: FrameRGBA,
    },
    Finished,
    Error { message: String },
}

/// Worker lifecycle. `Finished` and `Failed` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
    Uninitialized,
    Ready,
    Busy,
    Finished,
    Failed,
}

impl WorkerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }
}
