/// Minimum spacing between counted events.
///
/// Every stage machine routes its rep increments through one of these, so a single session can
/// never count two reps closer together than `interval` seconds.
#[derive(Debug, Clone)]
pub struct Debounce {
    interval: f64,
    last: Option<f64>,
}

impl Debounce {
    pub fn new(interval_secs: f64) -> Self {
        Self {
            interval: interval_secs.max(0.0),
            last: None,
        }
    }

    /// Records an event at `now` and returns true, unless the previous one is too recent.
    pub fn try_fire(&mut self, now: f64) -> bool {
        if let Some(last) = self.last {
            if now - last < self.interval {
                return false;
            }
        }
        self.last = Some(now);
        true
    }

    pub fn last(&self) -> Option<f64> {
        self.last
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}
