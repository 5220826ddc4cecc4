use std::time::{Duration, Instant};

/// Fires when the viewport gets close to the end of the list, at most once
/// per `interval` (leading edge: the first qualifying poll fires at once).
#[derive(Debug, Clone)]
pub struct ScrollTrigger {
    threshold: usize,
    interval: Duration,
    last_fired: Option<Instant>,
}

impl ScrollTrigger {
    pub fn new(threshold: usize, interval: Duration) -> Self {
        Self {
            threshold,
            interval,
            last_fired: None,
        }
    }

    /// `distance` is the number of rows between the cursor and the last row.
    pub fn poll(&mut self, distance: usize, now: Instant) -> bool {
        if distance >= self.threshold {
            return false;
        }
        if let Some(last) = self.last_fired {
            if now.saturating_duration_since(last) < self.interval {
                return false;
            }
        }
        self.last_fired = Some(now);
        true
    }
}
