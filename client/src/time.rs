use std::{
    sync::Arc,
    time::{Instant, SystemTime, UNIX_EPOCH},
};

/// Local wall clock in fractional unix seconds.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> f64;
}

/// Wall clock that never runs backwards.
///
/// Reads the system time once and advances it with a monotonic [`Instant`],
/// so NTP steps on the host cannot make the countdown jump up.
#[derive(Clone, Debug)]
pub struct SystemClock {
    base_unix: f64,
    base_instant: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        let base_unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        Self {
            base_unix,
            base_instant: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemClock {
    fn now(&self) -> f64 {
        self.base_unix + self.base_instant.elapsed().as_secs_f64()
    }
}

/// Hand-driven clock for tests.
#[cfg(test)]
#[derive(Clone, Debug, Default)]
pub struct ManualClock(Arc<std::sync::Mutex<f64>>);

#[cfg(test)]
impl ManualClock {
    pub fn new(now: f64) -> Self {
        Self(Arc::new(std::sync::Mutex::new(now)))
    }

    pub fn set(&self, now: f64) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, secs: f64) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) += secs;
    }
}

#[cfg(test)]
impl TimeSource for ManualClock {
    fn now(&self) -> f64 {
        *self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<T: TimeSource + ?Sized> TimeSource for Arc<T> {
    fn now(&self) -> f64 {
        (**self).now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
        assert!(a > 1_600_000_000.0);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(970.0);
        clock.advance(10.0);
        assert_eq!(clock.now(), 980.0);
        clock.set(5.0);
        assert_eq!(clock.now(), 5.0);
    }
}
