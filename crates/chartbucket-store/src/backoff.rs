use std::time::Duration;

use rand::Rng;

/// Exponential backoff with jitter.
///
/// Each call to [`Backoff::next_delay`] returns a random delay in
/// `[cap / 2, cap]`, where `cap` starts at `initial` and doubles per call up
/// to `max`.
#[derive(Clone, Debug)]
pub struct Backoff {
    current: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            current: initial.min(max),
            max,
        }
    }

    /// Delay to sleep before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let cap = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);

        let cap_ms = cap.as_millis() as u64;
        if cap_ms == 0 {
            return cap;
        }
        let jittered = rand::thread_rng().gen_range(cap_ms / 2..=cap_ms);
        Duration::from_millis(jittered)
    }
}
