use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

/// Default display refresh rate used to pace frame processing.
pub const DEFAULT_REFRESH_HZ: u32 = 60;

/// How a session paces its frame loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefreshPacing {
    /// One tick per display refresh at the given rate.
    Display { hz: u32 },
    /// Tick as fast as frames can be processed, for offline rendering.
    Unthrottled,
}

impl Default for RefreshPacing {
    fn default() -> Self {
        Self::Display {
            hz: DEFAULT_REFRESH_HZ,
        }
    }
}

/// Fixed-rate tick source. A late tick does not cause a burst of catch-up ticks.
#[derive(Debug)]
pub struct RefreshClock {
    interval: Option<Duration>,
    next: Option<Instant>,
}

impl RefreshClock {
    pub fn new(pacing: RefreshPacing) -> Self {
        let interval = match pacing {
            RefreshPacing::Display { hz } if hz > 0 => {
                Some(Duration::from_secs_f64(1.0 / f64::from(hz)))
            }
            _ => None,
        };
        Self {
            interval,
            next: None,
        }
    }

    pub fn unthrottled() -> Self {
        Self::new(RefreshPacing::Unthrottled)
    }

    /// Block until the next refresh. The first call returns immediately.
    pub fn wait_next(&mut self) {
        let Some(interval) = self.interval else {
            return;
        };
        let now = Instant::now();
        match self.next {
            None => self.next = Some(now + interval),
            Some(due) => {
                if due > now {
                    std::thread::sleep(due - now);
                    self.next = Some(due + interval);
                } else {
                    self.next = Some(now + interval);
                }
            }
        }
    }
}

/// Cooperative stop signal for a running session.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
