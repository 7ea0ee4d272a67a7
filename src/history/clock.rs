use std::time::Instant;

/// Source of monotonic timestamps, in whole seconds.
pub trait Clock: Send + Sync {
    fn now_secs(&self) -> u32;
}

/// Uptime since the clock was created. Not wall-clock time.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_secs(&self) -> u32 {
        u32::try_from(self.start.elapsed().as_secs()).unwrap_or(u32::MAX)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Clock;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Hand-driven clock for deterministic timestamps.
    #[derive(Debug, Default)]
    pub struct ManualClock(AtomicU32);

    impl ManualClock {
        pub fn at(secs: u32) -> Self {
            Self(AtomicU32::new(secs))
        }

        pub fn advance(&self, secs: u32) {
            self.0.fetch_add(secs, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now_secs(&self) -> u32 {
            self.0.load(Ordering::SeqCst)
        }
    }
}
