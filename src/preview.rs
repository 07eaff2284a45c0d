//! One-shot still previews of the effect on a representative source frame.

use crate::{
    effects::RenderState,
    foundation::core::{Frame, FrameRGBA, Surface},
    foundation::error::DitherResult,
    settings::EffectSettings,
};

/// Widest preview rendered by default.
pub const PREVIEW_MAX_WIDTH: u32 = 360;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PreviewOpts {
    pub max_width: u32,
}

impl Default for PreviewOpts {
    fn default() -> Self {
        Self {
            max_width: PREVIEW_MAX_WIDTH,
        }
    }
}

/// Preview size for a `src_w × src_h` source: at most `max_width` wide, aspect ratio preserved.
///
/// An unknown (zero) source size is treated as a 16:9 frame `max_width` wide.
pub fn preview_size(src_w: u32, src_h: u32, max_width: u32) -> (u32, u32) {
    let max_width = max_width.max(1);
    let sw = if src_w == 0 { max_width } else { src_w };
    let sh = if src_h == 0 {
        (f64::from(max_width) * 9.0 / 16.0).round().max(1.0) as u32
    } else {
        src_h
    };
    let aspect = f64::from(sw) / f64::from(sh);
    let w = sw.min(max_width).max(1);
    let h = (f64::from(w) / aspect).round().max(1.0) as u32;
    (w, h)
}

/// Playback position sampled for a preview: 5% into the clip, but never at or past its end.
pub fn preview_sample_time(duration: f64) -> f64 {
    if duration.is_finite() && duration > 0.0 {
        (duration * 0.05).min(duration - 0.01).max(0.0)
    } else {
        0.0
    }
}

/// Render `frame` through the pipeline with the intensity settled at `mix`, no ramp.
#[tracing::instrument(skip_all, fields(src_w = frame.width, src_h = frame.height))]
pub fn render_preview(
    frame: &Frame,
    settings: &EffectSettings,
    opts: &PreviewOpts,
) -> DitherResult<FrameRGBA> {
    let (w, h) = preview_size(frame.width, frame.height, opts.max_width);
    let still = Frame {
        timestamp: 0.0,
        duration: 0.0,
        ..frame.clone()
    };
    let mut surface = Surface::new(w, h)?;
    let mut state = RenderState::new();
    let mix = state.process_still(&still, settings, &mut surface)?;
    tracing::debug!(w, h, mix, algorithm = settings.algorithm().name(), "rendered preview");
    Ok(surface.snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Algorithm;

    #[test]
    fn size_keeps_aspect_and_caps_width() {
        assert_eq!(preview_size(1920, 1080, 360), (360, 203));
        assert_eq!(preview_size(200, 100, 360), (200, 100));
        assert_eq!(preview_size(0, 0, 360), (360, 203));
        assert_eq!(preview_size(1, 5000, 360), (1, 5000));
    }

    #[test]
    fn sample_time() {
        assert!((preview_sample_time(10.0) - 0.5).abs() < 1e-12);
        assert!((preview_sample_time(0.1) - 0.005).abs() < 1e-12);
        assert!((preview_sample_time(0.005) - 0.0).abs() < 1e-12);
        assert_eq!(preview_sample_time(0.0), 0.0);
        assert_eq!(preview_sample_time(f64::NAN), 0.0);
    }

    #[test]
    fn preview_applies_full_mix_immediately() {
        let frame = Frame::solid(720, 360, [128, 128, 128, 255]).unwrap();
        let settings = EffectSettings::new(Algorithm::Ordered, 1.0, 1, 2.5).unwrap();
        let out = render_preview(&frame, &settings, &PreviewOpts::default()).unwrap();
        assert_eq!((out.width, out.height), (360, 180));
        assert!(
            out.data
                .chunks_exact(4)
                .all(|p| p[0] == 0 || p[0] == 255)
        );
    }

    #[test]
    fn zero_mix_preview_is_a_downscale() {
        let frame = Frame::solid(40, 20, [10, 200, 30, 255]).unwrap();
        let settings = EffectSettings::default().with_mix(0.0);
        let out = render_preview(&frame, &settings, &PreviewOpts { max_width: 20 }).unwrap();
        assert_eq!((out.width, out.height), (20, 10));
        assert!(out.data.chunks_exact(4).all(|p| p == [10, 200, 30, 255]));
    }
}
