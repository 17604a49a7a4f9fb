use std::sync::Mutex;

use chrono::{DateTime, Utc};

/// Source of wall-clock time for index timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at a settable instant, for tests and reproducible output.
#[derive(Debug)]
pub struct FixedClock {
    instant: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self {
            instant: Mutex::new(instant),
        }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.instant.lock().expect("clock mutex poisoned") = instant;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.instant.lock().expect("clock mutex poisoned")
    }
}

/// The `generated` value for a mutation that follows `prior`.
///
/// Uses `now` when it is later than `prior`; otherwise (coarse clock, or a
/// publisher whose clock lags the previous one) advances `prior` by one
/// nanosecond, so the result is always strictly greater than `prior`.
pub fn next_generated(prior: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    if now > prior {
        now
    } else {
        prior + chrono::Duration::nanoseconds(1)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn uses_wall_clock_when_ahead() {
        let prior = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 5).unwrap();
        assert_eq!(next_generated(prior, now), now);
    }

    #[test]
    fn clamps_when_clock_ties_or_lags() {
        let prior = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let bumped = prior + chrono::Duration::nanoseconds(1);
        assert_eq!(next_generated(prior, prior), bumped);
        let behind = prior - chrono::Duration::hours(1);
        assert_eq!(next_generated(prior, behind), bumped);
    }

    #[test]
    fn fixed_clock_is_settable() {
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let clock = FixedClock::new(t0);
        assert_eq!(clock.now(), t0);
        let t1 = t0 + chrono::Duration::seconds(1);
        clock.set(t1);
        assert_eq!(clock.now(), t1);
    }
}
