use crate::{
    effects::RenderState,
    foundation::core::Surface,
    foundation::error::DitherResult,
    render::frame_progress,
    settings::EffectSettings,
    source::FrameSource,
};

/// Result of one [`CpuRenderer::tick`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TickOutcome {
    /// The source is paused; nothing was drawn.
    Skipped,
    /// A frame was processed into the surface.
    Rendered { progress: f64, mix: f32 },
    /// The source ended. Reported once per session.
    Completed,
    /// Ticked again after completion; nothing happens.
    Idle,
}

/// Synchronous pixelate → brightness → ramp → dither pipeline.
///
/// Owns the session surface and pipeline state. The caller drives it from a refresh clock and
/// stops scheduling ticks once [`TickOutcome::Completed`] is returned.
#[derive(Debug)]
pub struct CpuRenderer {
    state: RenderState,
    surface: Surface,
    completed: bool,
}

impl CpuRenderer {
    pub fn new(surface: Surface) -> Self {
        Self {
            state: RenderState::new(),
            surface,
            completed: false,
        }
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn eased_mix(&self) -> f32 {
        self.state.eased_mix()
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Process the source's current frame with this frame's settings snapshot.
    pub fn tick(
        &mut self,
        source: &mut dyn FrameSource,
        settings: &EffectSettings,
    ) -> DitherResult<TickOutcome> {
        if self.completed {
            return Ok(TickOutcome::Idle);
        }
        if source.is_ended() {
            self.completed = true;
            return Ok(TickOutcome::Completed);
        }
        if source.is_paused() {
            return Ok(TickOutcome::Skipped);
        }

        let frame = source.grab()?;
        let mix = self.state.process(&frame, settings, &mut self.surface)?;
        let (progress, _) = frame_progress(frame.timestamp, frame.duration);
        Ok(TickOutcome::Rendered { progress, mix })
    }

    /// Drop cached buffers and hand the surface back.
    pub fn release(mut self) -> Surface {
        self.state.release();
        self.surface
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        foundation::core::Fps,
        settings::Algorithm,
        source::{Stepped, synthetic::SyntheticClip},
    };

    #[test]
    fn runs_to_completion_once() {
        let mut src = Stepped::new(SyntheticClip::new(8, 6, Fps::new(30, 1).unwrap(), 3));
        let settings = EffectSettings::new(Algorithm::Ordered, 0.85, 2, 2.5).unwrap();
        let mut r = CpuRenderer::new(Surface::new(8, 6).unwrap());

        let mut rendered = 0;
        let mut completions = 0;
        for _ in 0..10 {
            match r.tick(&mut src, &settings).unwrap() {
                TickOutcome::Rendered { progress, .. } => {
                    assert!((0.0..=1.0).contains(&progress));
                    rendered += 1;
                }
                TickOutcome::Completed => completions += 1,
                TickOutcome::Idle => {}
                TickOutcome::Skipped => unreachable!(),
            }
        }
        assert_eq!(rendered, 3);
        assert_eq!(completions, 1);
        assert!(r.is_completed());
    }

    #[test]
    fn paused_source_is_skipped() {
        let mut src = Stepped::new(SyntheticClip::new(4, 4, Fps::new(30, 1).unwrap(), 3));
        src.pause();
        let mut r = CpuRenderer::new(Surface::new(4, 4).unwrap());
        let settings = EffectSettings::default();
        assert_eq!(r.tick(&mut src, &settings).unwrap(), TickOutcome::Skipped);
        assert_eq!(src.position(), 0);
        assert!(r.surface().data().iter().all(|&b| b == 0));
    }

    #[test]
    fn settings_changes_apply_on_the_next_tick() {
        let mut src = Stepped::new(SyntheticClip::new(8, 8, Fps::new(30, 1).unwrap(), 4));
        let mut r = CpuRenderer::new(Surface::new(8, 8).unwrap());
        let base = EffectSettings::new(Algorithm::None, 0.0, 1, 1.0).unwrap();
        r.tick(&mut src, &base).unwrap();
        let blocky = base.with_pixel_block(4);
        r.tick(&mut src, &blocky).unwrap();
        let px = r.surface().data();
        assert_eq!(&px[0..4], &px[12..16]);
    }
}
