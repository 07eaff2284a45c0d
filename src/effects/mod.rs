//! Frame effect stages: pixelation, brightness, ramp and the two dither algorithms.

pub mod bayer;
pub mod dither;
pub mod pixelate;
pub mod ramp;

use crate::{
    foundation::core::{Frame, Surface},
    foundation::error::DitherResult,
    settings::EffectSettings,
};

use self::{dither::DitherStage, pixelate::PixelationStage, ramp::MixRamp};

/// Per-session pipeline state: the eased intensity and the cached stage buffers.
///
/// Owned by exactly one renderer; never reused across sessions.
#[derive(Debug, Default)]
pub struct RenderState {
    pixelation: PixelationStage,
    ramp: MixRamp,
    dither: DitherStage,
}

impl RenderState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eased_mix(&self) -> f32 {
        self.ramp.eased()
    }

    pub fn pixelation(&self) -> &PixelationStage {
        &self.pixelation
    }

    /// Pixelate → brightness → ramp update → dither, written into `surface`.
    ///
    /// `settings` is the snapshot for this frame. Returns the intensity the frame was dithered
    /// with.
    pub fn process(
        &mut self,
        frame: &Frame,
        settings: &EffectSettings,
        surface: &mut Surface,
    ) -> DitherResult<f32> {
        let (w, h) = (surface.width(), surface.height());
        self.pixelation
            .apply(frame, settings.pixel_block(), surface.data_mut(), w, h)?;
        if settings.brightness() != 1.0 {
            dither::apply_brightness(surface.data_mut(), settings.brightness());
        }
        let mix = self
            .ramp
            .update(frame.timestamp, frame.duration, settings);
        self.dither
            .apply(settings.algorithm(), surface.data_mut(), w, h, mix)?;
        Ok(mix)
    }

    /// Like [`RenderState::process`] but with the intensity settled at its target instead of
    /// eased, for one-shot previews.
    pub fn process_still(
        &mut self,
        frame: &Frame,
        settings: &EffectSettings,
        surface: &mut Surface,
    ) -> DitherResult<f32> {
        self.ramp.settle(frame.timestamp, frame.duration, settings);
        let (w, h) = (surface.width(), surface.height());
        self.pixelation
            .apply(frame, settings.pixel_block(), surface.data_mut(), w, h)?;
        if settings.brightness() != 1.0 {
            dither::apply_brightness(surface.data_mut(), settings.brightness());
        }
        let mix = self.ramp.eased();
        self.dither
            .apply(settings.algorithm(), surface.data_mut(), w, h, mix)?;
        Ok(mix)
    }

    /// Release cached buffers. The eased intensity is kept until the state is dropped.
    pub fn release(&mut self) {
        self.pixelation.release();
        self.dither.release();
    }
}
