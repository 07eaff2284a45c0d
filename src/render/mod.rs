pub mod clock;
pub mod cpu;
pub mod gpu;
pub mod orchestrator;

/// Rendering path chosen for (part of) a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderPath {
    Cpu,
    Gpu,
}

/// Which paths a session may use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    /// GPU when available and the algorithm allows it, CPU otherwise.
    #[default]
    Auto,
    /// Never start the GPU worker.
    Cpu,
}

impl std::str::FromStr for BackendPreference {
    type Err = crate::foundation::error::DitherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            other => Err(crate::foundation::error::DitherError::validation(format!(
                "unknown backend '{other}' (expected auto|cpu)"
            ))),
        }
    }
}

/// Progress and end-of-stream flag for a frame at `timestamp` of a `duration`-long source.
///
/// A source without a duration never reports progress on its own.
pub fn frame_progress(timestamp: f64, duration: f64) -> (f64, bool) {
    if duration > 0.0 {
        ((timestamp / duration).clamp(0.0, 1.0), timestamp >= duration)
    } else {
        (0.0, false)
    }
}

/// Forwards progress to a sink, clamped to `[0, 1]` and never decreasing.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    last: Option<f64>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<f64> {
        self.last
    }

    /// The value to report for `raw`, or `None` if it would not move progress forward.
    pub fn advance(&mut self, raw: f64) -> Option<f64> {
        let v = if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 1.0) };
        match self.last {
            Some(last) if v <= last => None,
            _ => {
                self.last = Some(v);
                Some(v)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_formula() {
        assert_eq!(frame_progress(1.0, 4.0), (0.25, false));
        assert_eq!(frame_progress(4.0, 4.0), (1.0, true));
        assert_eq!(frame_progress(5.0, 4.0), (1.0, true));
        assert_eq!(frame_progress(3.0, 0.0), (0.0, false));
    }

    #[test]
    fn tracker_is_monotonic_and_clamped() {
        let mut t = ProgressTracker::new();
        assert_eq!(t.advance(0.0), Some(0.0));
        assert_eq!(t.advance(0.5), Some(0.5));
        assert_eq!(t.advance(0.4), None);
        assert_eq!(t.advance(0.5), None);
        assert_eq!(t.advance(7.0), Some(1.0));
        assert_eq!(t.advance(f64::NAN), None);
        assert_eq!(t.last(), Some(1.0));
    }

    #[test]
    fn backend_names() {
        assert_eq!("CPU".parse::<BackendPreference>().unwrap(), BackendPreference::Cpu);
        assert!("metal".parse::<BackendPreference>().is_err());
    }
}
