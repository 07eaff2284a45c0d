use crate::settings::{EffectSettings, clamp01};

/// Shortest ramp accepted when computing the intensity target.
pub const MIN_RAMP_SECONDS: f64 = 0.1;

/// First-order low-pass easing of the effect intensity from session start.
///
/// The target rises linearly over `ramp_seconds` of *playback* time; the eased value follows it by
/// `smoothing` per processed frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MixRamp {
    eased: f32,
}

impl MixRamp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intensity target at `elapsed` seconds of playback.
    ///
    /// A source without a duration is a single static frame and gets the full `mix` at once.
    pub fn target(elapsed: f64, duration: f64, settings: &EffectSettings) -> f32 {
        let ramp = if duration > 0.0 {
            let ramp_seconds = settings.ramp_seconds().max(MIN_RAMP_SECONDS);
            (elapsed.max(0.0) / ramp_seconds).min(1.0)
        } else {
            1.0
        };
        clamp01(ramp as f32 * settings.mix())
    }

    /// Advance one frame and return the new eased intensity.
    pub fn update(&mut self, elapsed: f64, duration: f64, settings: &EffectSettings) -> f32 {
        let target = Self::target(elapsed, duration, settings);
        self.eased = clamp01(lerp(self.eased, target, settings.smoothing()));
        self.eased
    }

    pub fn eased(&self) -> f32 {
        self.eased
    }

    /// Jump straight to the target, used for single-frame previews.
    pub fn settle(&mut self, elapsed: f64, duration: f64, settings: &EffectSettings) -> f32 {
        self.eased = Self::target(elapsed, duration, settings);
        self.eased
    }

    pub fn reset(&mut self) {
        self.eased = 0.0;
    }
}

#[inline]
pub(crate) fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Algorithm;

    fn settings(mix: f32, ramp: f64) -> EffectSettings {
        EffectSettings::new(Algorithm::Ordered, mix, 1, ramp).unwrap()
    }

    #[test]
    fn target_ramps_linearly_then_holds() {
        let s = settings(0.8, 2.0);
        assert_eq!(MixRamp::target(0.0, 10.0, &s), 0.0);
        assert!((MixRamp::target(1.0, 10.0, &s) - 0.4).abs() < 1e-6);
        assert!((MixRamp::target(5.0, 10.0, &s) - 0.8).abs() < 1e-6);
    }

    #[test]
    fn tiny_ramp_is_floored() {
        let s = settings(1.0, 0.01);
        assert!((MixRamp::target(0.05, 10.0, &s) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn static_frame_gets_full_mix() {
        let s = settings(0.6, 2.5);
        assert!((MixRamp::target(0.0, 0.0, &s) - 0.6).abs() < 1e-6);
    }

    #[test]
    fn eased_is_monotonic_and_converges() {
        let s = settings(1.0, 0.1);
        let mut ramp = MixRamp::new();
        let mut prev = ramp.eased();
        let mut converged_at = None;
        for frame in 0..200 {
            let v = ramp.update(10.0, 20.0, &s);
            assert!(v >= prev);
            prev = v;
            if converged_at.is_none() && (1.0 - v).abs() < 1e-3 {
                converged_at = Some(frame + 1);
            }
        }
        let n = converged_at.expect("ramp never converged");
        assert!(n <= 100, "took {n} frames");
    }

    #[test]
    fn reset_returns_to_zero() {
        let s = settings(1.0, 1.0);
        let mut ramp = MixRamp::new();
        ramp.update(5.0, 10.0, &s);
        assert!(ramp.eased() > 0.0);
        ramp.reset();
        assert_eq!(ramp.eased(), 0.0);
        assert!((ramp.settle(0.0, 0.0, &s) - 1.0).abs() < 1e-6);
    }
}
