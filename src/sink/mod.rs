//! Downstream consumers of rendered frames.

pub mod ffmpeg;
pub mod png;

use crate::{
    foundation::core::{Fps, FrameRGBA},
    foundation::error::DitherResult,
};

/// Configuration provided to a [`FrameSink`] when a session starts.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkConfig {
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Nominal frame rate of the source, when it has one.
    pub fps: Option<Fps>,
}

/// How a session ended. Exactly one is delivered per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The source reached its end.
    Done,
    /// The session was stopped before the end.
    Cancelled,
    /// A fatal error stopped the session.
    Error(String),
}

impl Completion {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

/// Sink contract for a dither session.
///
/// `begin` is called once, then any number of `push_frame`/`progress` calls in presentation
/// order, then `finish` exactly once.
pub trait FrameSink {
    fn begin(&mut self, cfg: SinkConfig) -> DitherResult<()>;
    /// Called with the surface contents after each presented frame.
    fn push_frame(&mut self, frame: &FrameRGBA) -> DitherResult<()>;
    /// Session progress in `[0, 1]`, never decreasing.
    fn progress(&mut self, fraction: f64) {
        let _ = fraction;
    }
    fn finish(&mut self, completion: &Completion) -> DitherResult<()>;
}

/// In-memory sink for tests and debugging.
#[derive(Debug, Default)]
pub struct InMemorySink {
    cfg: Option<SinkConfig>,
    frames: Vec<FrameRGBA>,
    progress: Vec<f64>,
    completions: Vec<Completion>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The configuration captured in `begin`, if any.
    pub fn config(&self) -> Option<&SinkConfig> {
        self.cfg.as_ref()
    }

    pub fn frames(&self) -> &[FrameRGBA] {
        &self.frames
    }

    pub fn progress_reports(&self) -> &[f64] {
        &self.progress
    }

    pub fn completions(&self) -> &[Completion] {
        &self.completions
    }
}

impl FrameSink for InMemorySink {
    fn begin(&mut self, cfg: SinkConfig) -> DitherResult<()> {
        self.cfg = Some(cfg);
        self.frames.clear();
        self.progress.clear();
        self.completions.clear();
        Ok(())
    }

    fn push_frame(&mut self, frame: &FrameRGBA) -> DitherResult<()> {
        self.frames.push(frame.clone());
        Ok(())
    }

    fn progress(&mut self, fraction: f64) {
        self.progress.push(fraction);
    }

    fn finish(&mut self, completion: &Completion) -> DitherResult<()> {
        self.completions.push(completion.clone());
        Ok(())
    }
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &std::path::Path) -> DitherResult<()> {
    if let Some(parent) = path.parent() {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}
