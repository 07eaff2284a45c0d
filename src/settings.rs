use std::sync::{Arc, RwLock};

use crate::foundation::error::{DitherError, DitherResult};

pub const DEFAULT_MIX: f32 = 0.85;
pub const DEFAULT_PIXEL_BLOCK: u32 = 1;
pub const DEFAULT_RAMP_SECONDS: f64 = 2.5;
pub const DEFAULT_SMOOTHING: f32 = 0.08;

/// Quantization algorithm applied after pixelation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    /// Pixelation (and brightness) only.
    None,
    /// 4x4 Bayer threshold dithering.
    #[default]
    Ordered,
    /// Floyd-Steinberg error diffusion.
    #[serde(alias = "floyd", alias = "floyd-steinberg")]
    ErrorDiffusion,
}

impl Algorithm {
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Ordered => "ordered",
            Self::ErrorDiffusion => "error-diffusion",
        }
    }
}

impl std::str::FromStr for Algorithm {
    type Err = DitherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "ordered" | "bayer" => Ok(Self::Ordered),
            "error-diffusion" | "error_diffusion" | "floyd" | "floyd-steinberg" => {
                Ok(Self::ErrorDiffusion)
            }
            other => Err(DitherError::validation(format!(
                "unknown dither algorithm '{other}'"
            ))),
        }
    }
}

/// The subset of [`Algorithm`] the GPU shader implements.
///
/// Error diffusion has a strict raster-order data dependency and has no variant here, so it can
/// never reach the GPU worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GpuAlgorithm {
    None,
    Ordered,
}

impl TryFrom<Algorithm> for GpuAlgorithm {
    type Error = DitherError;

    fn try_from(value: Algorithm) -> Result<Self, Self::Error> {
        match value {
            Algorithm::None => Ok(Self::None),
            Algorithm::Ordered => Ok(Self::Ordered),
            Algorithm::ErrorDiffusion => Err(DitherError::validation(
                "error diffusion is not supported by the gpu path",
            )),
        }
    }
}

/// Immutable effect configuration.
///
/// Values are sanitized on construction: `mix` and `smoothing` are clamped to `[0,1]` (NaN maps to
/// 0), `pixel_block` is at least 1. A new record replaces the old one wholesale; there are no
/// in-place setters.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "EffectSettingsDef", into = "EffectSettingsDef")]
pub struct EffectSettings {
    algorithm: Algorithm,
    mix: f32,
    pixel_block: u32,
    ramp_seconds: f64,
    brightness: f32,
    smoothing: f32,
}

impl Default for EffectSettings {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Ordered,
            mix: DEFAULT_MIX,
            pixel_block: DEFAULT_PIXEL_BLOCK,
            ramp_seconds: DEFAULT_RAMP_SECONDS,
            brightness: 1.0,
            smoothing: DEFAULT_SMOOTHING,
        }
    }
}

impl EffectSettings {
    pub fn new(
        algorithm: Algorithm,
        mix: f32,
        pixel_block: u32,
        ramp_seconds: f64,
    ) -> DitherResult<Self> {
        Self::default()
            .with_algorithm(algorithm)
            .with_mix(mix)
            .with_pixel_block(pixel_block)
            .with_ramp_seconds(ramp_seconds)
    }

    pub fn with_algorithm(self, algorithm: Algorithm) -> Self {
        Self { algorithm, ..self }
    }

    pub fn with_mix(self, mix: f32) -> Self {
        Self {
            mix: clamp01(mix),
            ..self
        }
    }

    pub fn with_pixel_block(self, pixel_block: u32) -> Self {
        Self {
            pixel_block: pixel_block.max(1),
            ..self
        }
    }

    pub fn with_ramp_seconds(self, ramp_seconds: f64) -> DitherResult<Self> {
        if !ramp_seconds.is_finite() || ramp_seconds <= 0.0 {
            return Err(DitherError::validation(
                "ramp_seconds must be finite and > 0",
            ));
        }
        Ok(Self {
            ramp_seconds,
            ..self
        })
    }

    pub fn with_brightness(self, brightness: f32) -> DitherResult<Self> {
        if !brightness.is_finite() || brightness < 0.0 {
            return Err(DitherError::validation(
                "brightness must be finite and >= 0",
            ));
        }
        Ok(Self { brightness, ..self })
    }

    pub fn with_smoothing(self, smoothing: f32) -> Self {
        Self {
            smoothing: clamp01(smoothing),
            ..self
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn mix(&self) -> f32 {
        self.mix
    }

    pub fn pixel_block(&self) -> u32 {
        self.pixel_block
    }

    pub fn ramp_seconds(&self) -> f64 {
        self.ramp_seconds
    }

    pub fn brightness(&self) -> f32 {
        self.brightness
    }

    pub fn smoothing(&self) -> f32 {
        self.smoothing
    }

    /// GPU-eligible view of these settings, or `None` when the algorithm needs the CPU path.
    pub fn gpu_effect(&self) -> Option<GpuEffect> {
        let algorithm = GpuAlgorithm::try_from(self.algorithm).ok()?;
        Some(GpuEffect {
            algorithm,
            settings: *self,
        })
    }

    pub fn from_json_str(s: &str) -> DitherResult<Self> {
        serde_json::from_str(s)
            .map_err(|e| DitherError::validation(format!("invalid effect settings JSON: {e}")))
    }

    pub fn from_json_file(path: &std::path::Path) -> DitherResult<Self> {
        use anyhow::Context as _;
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read effect settings '{}'", path.display()))?;
        Self::from_json_str(&raw)
    }
}

/// Settings accepted by the GPU worker. Only constructible through
/// [`EffectSettings::gpu_effect`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GpuEffect {
    algorithm: GpuAlgorithm,
    settings: EffectSettings,
}

impl GpuEffect {
    pub fn algorithm(&self) -> GpuAlgorithm {
        self.algorithm
    }

    pub fn settings(&self) -> &EffectSettings {
        &self.settings
    }
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct EffectSettingsDef {
    algorithm: Algorithm,
    mix: f32,
    #[serde(alias = "pixel_size")]
    pixel_block: u32,
    #[serde(alias = "ramp_secs")]
    ramp_seconds: f64,
    brightness: f32,
    #[serde(alias = "smooth_factor")]
    smoothing: f32,
}

impl Default for EffectSettingsDef {
    fn default() -> Self {
        EffectSettings::default().into()
    }
}

impl TryFrom<EffectSettingsDef> for EffectSettings {
    type Error = DitherError;

    fn try_from(def: EffectSettingsDef) -> Result<Self, Self::Error> {
        EffectSettings::new(def.algorithm, def.mix, def.pixel_block, def.ramp_seconds)?
            .with_brightness(def.brightness)
            .map(|s| s.with_smoothing(def.smoothing))
    }
}

impl From<EffectSettings> for EffectSettingsDef {
    fn from(s: EffectSettings) -> Self {
        Self {
            algorithm: s.algorithm,
            mix: s.mix,
            pixel_block: s.pixel_block,
            ramp_seconds: s.ramp_seconds,
            brightness: s.brightness,
            smoothing: s.smoothing,
        }
    }
}

/// Settings cell shared between the settings provider and a running session.
///
/// Readers take a snapshot by value; writers replace the whole record. A frame therefore never
/// observes a half-updated configuration.
#[derive(Clone, Debug, Default)]
pub struct SharedSettings {
    inner: Arc<RwLock<EffectSettings>>,
}

impl SharedSettings {
    pub fn new(settings: EffectSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    pub fn snapshot(&self) -> EffectSettings {
        match self.inner.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn replace(&self, settings: EffectSettings) {
        match self.inner.write() {
            Ok(mut guard) => *guard = settings,
            Err(poisoned) => *poisoned.into_inner() = settings,
        }
    }
}

pub(crate) fn clamp01(v: f32) -> f32 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let s = EffectSettings::default();
        assert_eq!(s.algorithm(), Algorithm::Ordered);
        assert_eq!(s.mix(), 0.85);
        assert_eq!(s.pixel_block(), 1);
        assert_eq!(s.ramp_seconds(), 2.5);
        assert_eq!(s.brightness(), 1.0);
        assert_eq!(s.smoothing(), 0.08);
    }

    #[test]
    fn construction_sanitizes_values() {
        let s = EffectSettings::new(Algorithm::None, 1.7, 0, 1.0).unwrap();
        assert_eq!(s.mix(), 1.0);
        assert_eq!(s.pixel_block(), 1);
        assert_eq!(EffectSettings::default().with_mix(f32::NAN).mix(), 0.0);
        assert_eq!(EffectSettings::default().with_mix(-0.5).mix(), 0.0);
        assert!(EffectSettings::new(Algorithm::Ordered, 0.5, 1, 0.0).is_err());
        assert!(EffectSettings::new(Algorithm::Ordered, 0.5, 1, f64::NAN).is_err());
        assert!(EffectSettings::default().with_brightness(-1.0).is_err());
    }

    #[test]
    fn json_uses_defaults_and_aliases() {
        let s = EffectSettings::from_json_str(r#"{ "algorithm": "floyd", "pixel_size": 4 }"#)
            .unwrap();
        assert_eq!(s.algorithm(), Algorithm::ErrorDiffusion);
        assert_eq!(s.pixel_block(), 4);
        assert_eq!(s.mix(), DEFAULT_MIX);

        assert!(EffectSettings::from_json_str(r#"{ "ramp_seconds": -1 }"#).is_err());
        assert!(EffectSettings::from_json_str(r#"{ "colour": 1 }"#).is_err());
    }

    #[test]
    fn json_roundtrip_keeps_record() {
        let s = EffectSettings::new(Algorithm::ErrorDiffusion, 0.4, 3, 1.5)
            .unwrap()
            .with_smoothing(0.2);
        let text = serde_json::to_string(&s).unwrap();
        assert!(text.contains("\"error-diffusion\""));
        assert_eq!(EffectSettings::from_json_str(&text).unwrap(), s);
    }

    #[test]
    fn gpu_eligibility_excludes_error_diffusion() {
        assert!(
            EffectSettings::default()
                .with_algorithm(Algorithm::ErrorDiffusion)
                .gpu_effect()
                .is_none()
        );
        let fx = EffectSettings::default()
            .with_algorithm(Algorithm::None)
            .gpu_effect()
            .unwrap();
        assert_eq!(fx.algorithm(), GpuAlgorithm::None);
    }

    #[test]
    fn algorithm_parses_cli_names() {
        assert_eq!("Ordered".parse::<Algorithm>().unwrap(), Algorithm::Ordered);
        assert_eq!(
            "floyd-steinberg".parse::<Algorithm>().unwrap(),
            Algorithm::ErrorDiffusion
        );
        assert!("halftone".parse::<Algorithm>().is_err());
    }

    #[test]
    fn shared_settings_replace_whole_record() {
        let shared = SharedSettings::new(EffectSettings::default());
        let before = shared.snapshot();
        shared.replace(before.with_pixel_block(8).with_mix(0.1));
        let after = shared.snapshot();
        assert_eq!(after.pixel_block(), 8);
        assert_eq!(after.mix(), 0.1);
        assert_eq!(before.pixel_block(), 1);
    }
}
