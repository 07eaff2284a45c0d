use crate::foundation::error::{DitherError, DitherResult};

/// Frames-per-second represented as a rational `num/den`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    pub num: u32,
    pub den: u32, // must be > 0
}

impl Fps {
    pub fn new(num: u32, den: u32) -> DitherResult<Self> {
        if den == 0 {
            return Err(DitherError::validation("Fps den must be > 0"));
        }
        if num == 0 {
            return Err(DitherError::validation("Fps num must be > 0"));
        }
        Ok(Self { num, den })
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    pub fn frame_duration_secs(self) -> f64 {
        f64::from(self.den) / f64::from(self.num)
    }

    pub fn frames_to_secs(self, frames: u64) -> f64 {
        (frames as f64) * self.frame_duration_secs()
    }

    pub fn secs_to_frames_floor(self, secs: f64) -> u64 {
        (secs * self.as_f64()).floor().max(0.0) as u64
    }
}

/// Byte length of a tightly packed RGBA8 buffer, with overflow checks.
pub fn rgba8_len(width: u32, height: u32) -> DitherResult<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(4))
        .ok_or_else(|| DitherError::validation("rgba8 buffer size overflow"))
}

/// A decoded source frame: straight-alpha RGBA8, row-major, tightly packed.
///
/// `timestamp` and `duration` are in seconds on the source's own playback clock. A `duration` of
/// zero marks a single static frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub timestamp: f64,
    pub duration: f64,
}

impl Frame {
    pub fn new(
        width: u32,
        height: u32,
        data: Vec<u8>,
        timestamp: f64,
        duration: f64,
    ) -> DitherResult<Self> {
        if width == 0 || height == 0 {
            return Err(DitherError::validation("frame width/height must be non-zero"));
        }
        if data.len() != rgba8_len(width, height)? {
            return Err(DitherError::validation(format!(
                "frame data length {} does not match {width}x{height}x4",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
            timestamp,
            duration,
        })
    }

    /// Uniformly colored frame, mostly useful for tests and synthetic sources.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> DitherResult<Self> {
        let len = rgba8_len(width, height)?;
        let data = rgba.repeat(len / 4);
        Self::new(width, height, data, 0.0, 0.0)
    }
}

/// RGBA8 pixels handed to a downstream sink.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameRGBA {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// The destination drawing surface of a session.
///
/// A surface is owned by exactly one renderer at a time. It is deliberately not `Clone`: handing
/// it to the GPU worker moves it across the thread boundary.
#[derive(Debug)]
pub struct Surface {
    pixels: FrameRGBA,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> DitherResult<Self> {
        if width == 0 || height == 0 {
            return Err(DitherError::validation(
                "surface width/height must be non-zero",
            ));
        }
        Ok(Self {
            pixels: FrameRGBA {
                width,
                height,
                data: vec![0u8; rgba8_len(width, height)?],
            },
        })
    }

    pub fn width(&self) -> u32 {
        self.pixels.width
    }

    pub fn height(&self) -> u32 {
        self.pixels.height
    }

    pub fn data(&self) -> &[u8] {
        &self.pixels.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.pixels.data
    }

    pub fn as_frame(&self) -> &FrameRGBA {
        &self.pixels
    }

    /// Copy out the currently presented pixels.
    pub fn snapshot(&self) -> FrameRGBA {
        self.pixels.clone()
    }
}
