//! Upstream frame sources.
//!
//! The pipeline only ever reads playback time and pause/ended state from a source, grabs the
//! current frame, and pauses the source at the end of a session.

pub mod ffmpeg;
pub mod images;
pub mod realtime;
pub mod synthetic;

use crate::{
    foundation::core::{Fps, Frame},
    foundation::error::{DitherError, DitherResult},
};

/// A sequential, timestamped frame source with its own playback clock.
pub trait FrameSource {
    /// Native frame size in pixels.
    fn dimensions(&self) -> (u32, u32);
    /// Nominal frame rate, when known.
    fn fps(&self) -> Option<Fps>;
    /// Total duration in seconds; 0 for a single static frame.
    fn duration(&self) -> f64;
    /// Current playback position in seconds.
    fn current_time(&self) -> f64;
    fn is_paused(&self) -> bool;
    fn is_ended(&self) -> bool;
    /// Return the frame at the current playback position and let playback move on.
    fn grab(&mut self) -> DitherResult<Frame>;
    fn pause(&mut self);
    /// Frames the source skipped because nobody grabbed them in time.
    fn dropped_frames(&self) -> u64 {
        0
    }
}

/// Random-access frames, the building block for [`Stepped`] and [`realtime::Realtime`].
pub trait IndexedSource {
    fn dimensions(&self) -> (u32, u32);
    fn fps(&self) -> Fps;
    fn frame_count(&self) -> u64;
    /// Decode frame `index`. Timestamps are filled in by the caller.
    fn frame_at(&mut self, index: u64) -> DitherResult<Frame>;

    fn duration(&self) -> f64 {
        self.fps().frames_to_secs(self.frame_count())
    }
}

/// Playback that advances exactly one frame per grab, so nothing is ever dropped. Used for
/// offline rendering and tests.
#[derive(Debug)]
pub struct Stepped<S> {
    inner: S,
    next: u64,
    paused: bool,
}

impl<S: IndexedSource> Stepped<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            next: 0,
            paused: false,
        }
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Index of the next frame [`FrameSource::grab`] returns.
    pub fn position(&self) -> u64 {
        self.next
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: IndexedSource> FrameSource for Stepped<S> {
    fn dimensions(&self) -> (u32, u32) {
        self.inner.dimensions()
    }

    fn fps(&self) -> Option<Fps> {
        Some(self.inner.fps())
    }

    fn duration(&self) -> f64 {
        self.inner.duration()
    }

    fn current_time(&self) -> f64 {
        self.inner.fps().frames_to_secs(self.next)
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn is_ended(&self) -> bool {
        self.next >= self.inner.frame_count()
    }

    fn grab(&mut self) -> DitherResult<Frame> {
        if self.is_ended() {
            return Err(DitherError::validation("cannot grab from an ended source"));
        }
        let timestamp = self.current_time();
        let mut frame = self.inner.frame_at(self.next)?;
        frame.timestamp = timestamp;
        frame.duration = self.inner.duration();
        self.next += 1;
        Ok(frame)
    }

    fn pause(&mut self) {
        self.paused = true;
    }
}
