use chrono::{DateTime, Duration, Utc};

/// Time source for the store, sequencer and tracker.
///
/// Services read the wall clock in production; tests pin it and move it by hand
/// so play time, phase timers and trend windows are deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    System,
    Fixed(DateTime<Utc>),
}

impl Clock {
    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Fixed(t) => *t,
        }
    }

    /// Move a pinned clock forward. The system clock ignores this.
    pub fn advance(&mut self, delta: Duration) {
        if let Clock::Fixed(t) = self {
            *t += delta;
        }
    }

    /// Milliseconds from `from` to now, see [`elapsed_millis`].
    #[must_use]
    pub fn millis_since(&self, from: DateTime<Utc>) -> u64 {
        elapsed_millis(from, self.now())
    }
}

/// Whole milliseconds elapsed from `from` to `to`, floored at zero.
///
/// Wall clocks can step backwards; accrued play time never does.
#[must_use]
pub fn elapsed_millis(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
    u64::try_from((to - from).num_milliseconds()).unwrap_or(0)
}

/// 2023-11-14T22:13:20Z
const FIXED_TEST_SECONDS: i64 = 1_700_000_000;

/// Pinned instant shared by tests and fixtures.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(FIXED_TEST_SECONDS, 0).unwrap_or_default()
}

#[must_use]
pub fn fixed_clock() -> Clock {
    Clock::fixed(fixed_now())
}
