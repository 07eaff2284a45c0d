use crate::{
    foundation::core::{Fps, Frame, rgba8_len},
    foundation::error::{DitherError, DitherResult},
    source::{IndexedSource, Stepped},
};

/// Procedural test clip: a diagonal luma gradient that scrolls one pixel per frame over a slow
/// hue drift. Every frame is a pure function of its index.
#[derive(Clone, Debug)]
pub struct SyntheticClip {
    width: u32,
    height: u32,
    fps: Fps,
    frames: u64,
}

/// A [`SyntheticClip`] played back one frame per grab.
pub type SyntheticSource = Stepped<SyntheticClip>;

impl SyntheticClip {
    pub fn new(width: u32, height: u32, fps: Fps, frames: u64) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            fps,
            frames,
        }
    }

    /// Shorthand for `Stepped::new(SyntheticClip::new(..))`.
    pub fn stepped(width: u32, height: u32, fps: Fps, frames: u64) -> SyntheticSource {
        Stepped::new(Self::new(width, height, fps, frames))
    }
}

impl IndexedSource for SyntheticClip {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn fps(&self) -> Fps {
        self.fps
    }

    fn frame_count(&self) -> u64 {
        self.frames
    }

    fn frame_at(&mut self, index: u64) -> DitherResult<Frame> {
        if index >= self.frames {
            return Err(DitherError::validation(format!(
                "synthetic frame {index} out of range (0..{})",
                self.frames
            )));
        }
        let (w, h) = (self.width as u64, self.height as u64);
        let span = (w + h).max(1);
        let mut data = Vec::with_capacity(rgba8_len(self.width, self.height)?);
        for y in 0..h {
            for x in 0..w {
                let v = (((x + y + index) % span) * 255 / span) as u8;
                let drift = ((index * 3) % 256) as u8;
                data.extend_from_slice(&[v, v.wrapping_add(drift / 4), v / 2 + drift / 2, 255]);
            }
        }
        Frame::new(self.width, self.height, data, 0.0, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_deterministic_and_move() {
        let mut clip = SyntheticClip::new(6, 4, Fps::new(30, 1).unwrap(), 4);
        let a = clip.frame_at(1).unwrap();
        let b = clip.frame_at(1).unwrap();
        let c = clip.frame_at(2).unwrap();
        assert_eq!(a, b);
        assert_ne!(a.data, c.data);
        assert!(a.data.chunks_exact(4).all(|p| p[3] == 255));
        assert!(clip.frame_at(4).is_err());
    }
}
