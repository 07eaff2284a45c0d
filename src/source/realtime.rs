use std::time::{Duration, Instant};

use crate::{
    foundation::core::{Fps, Frame},
    foundation::error::{DitherError, DitherResult},
    source::{FrameSource, IndexedSource},
};

/// Wall-clock playback of an [`IndexedSource`].
///
/// Playback time advances whether or not anybody grabs frames, like a playing video element.
/// Frames that pass by ungrabbed are counted as dropped.
#[derive(Debug)]
pub struct Realtime<S> {
    inner: S,
    started: Instant,
    paused_at: Option<Duration>,
    last_index: Option<u64>,
    dropped: u64,
}

impl<S: IndexedSource> Realtime<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            started: Instant::now(),
            paused_at: None,
            last_index: None,
            dropped: 0,
        }
    }

    fn elapsed(&self) -> Duration {
        self.paused_at.unwrap_or_else(|| self.started.elapsed())
    }

    pub fn resume(&mut self) {
        if let Some(at) = self.paused_at.take() {
            self.started = Instant::now()
                .checked_sub(at)
                .unwrap_or_else(Instant::now);
        }
    }
}

impl<S: IndexedSource> FrameSource for Realtime<S> {
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
        self.elapsed().as_secs_f64().min(self.duration())
    }

    fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    fn is_ended(&self) -> bool {
        self.elapsed().as_secs_f64() >= self.duration()
    }

    fn grab(&mut self) -> DitherResult<Frame> {
        let count = self.inner.frame_count();
        if count == 0 {
            return Err(DitherError::validation("cannot grab from an empty source"));
        }
        let timestamp = self.current_time();
        let index = self
            .inner
            .fps()
            .secs_to_frames_floor(timestamp)
            .min(count - 1);
        match self.last_index {
            Some(last) if index > last + 1 => self.dropped += index - last - 1,
            None if index > 0 => self.dropped += index,
            _ => {}
        }
        self.last_index = Some(index);

        let mut frame = self.inner.frame_at(index)?;
        frame.timestamp = timestamp;
        frame.duration = self.duration();
        Ok(frame)
    }

    fn pause(&mut self) {
        if self.paused_at.is_none() {
            self.paused_at = Some(self.started.elapsed());
        }
    }

    fn dropped_frames(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::synthetic::SyntheticClip;

    #[test]
    fn pause_freezes_the_clock() {
        let mut src = Realtime::new(SyntheticClip::new(4, 4, Fps::new(30, 1).unwrap(), 300));
        src.pause();
        let t0 = src.current_time();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(src.current_time(), t0);
        assert!(src.is_paused());
        src.resume();
        assert!(!src.is_paused());
    }

    #[test]
    fn slow_consumers_drop_frames() {
        let mut src = Realtime::new(SyntheticClip::new(2, 2, Fps::new(100, 1).unwrap(), 1000));
        src.grab().unwrap();
        std::thread::sleep(Duration::from_millis(60));
        src.grab().unwrap();
        assert!(src.dropped_frames() > 0);
    }

    #[test]
    fn ends_after_duration() {
        let src = Realtime::new(SyntheticClip::new(2, 2, Fps::new(1000, 1).unwrap(), 5));
        std::thread::sleep(Duration::from_millis(10));
        assert!(src.is_ended());
        assert!((src.current_time() - 0.005).abs() < 1e-9);
    }
}
