use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use rand::Rng;
use log::debug;

const SLICE: Duration = Duration::from_millis(100);

/// Pause between two lookups: a fixed base plus an optional random jitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayPolicy {
    base: Duration,
    jitter: Duration,
}

impl DelayPolicy {
    pub fn new(base: Duration, jitter: Duration) -> Self {
        DelayPolicy { base, jitter }
    }

    pub fn next_delay(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.base;
        }
        let mut rng = rand::thread_rng();
        self.base + Duration::from_millis(rng.gen_range(0..=jitter_ms))
    }

    /// Blocks for the next delay, waking up early when `interrupt` is raised.
    /// Returns `false` if the pause was cut short.
    pub fn pause(&self, interrupt: &AtomicBool) -> bool {
        let delay = self.next_delay();
        if delay.is_zero() {
            return !interrupt.load(Ordering::SeqCst);
        }
        debug!("Waiting {:.1}s before next request", delay.as_secs_f64());

        let deadline = Instant::now() + delay;
        loop {
            if interrupt.load(Ordering::SeqCst) {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(SLICE.min(deadline - now));
        }
    }
}
