use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;

/// Source of the current time, in milliseconds since the unix epoch.
///
/// Every store reads time exclusively through this trait, so swapping in a [`ManualClock`]
/// makes expiration fully deterministic.
pub trait TimeSource: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Wall clock. This is the default time source of every store.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now_millis(&self) -> i64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_millis() as i64,
            // clock set before 1970.
            Err(e) => -(e.duration().as_millis() as i64),
        }
    }
}

/// Wall clock sampled once per process and advanced by a monotonic [`Instant`] afterwards.
///
/// Unlike [`SystemClock`] it never jumps backwards when the system time is adjusted.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

static ANCHOR: Lazy<(Instant, i64)> = Lazy::new(|| (Instant::now(), SystemClock.now_millis()));

impl TimeSource for MonotonicClock {
    fn now_millis(&self) -> i64 {
        let (base, base_millis) = *ANCHOR;
        base_millis + base.elapsed().as_millis() as i64
    }
}

/// A clock that only moves when told to.
///
/// # Examples
///
/// ```
/// use expirable::clock::{ManualClock, TimeSource};
///
/// let clock = ManualClock::new(1_000);
/// clock.advance(250);
/// assert_eq!(clock.now_millis(), 1_250);
/// ```
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(now_millis),
        }
    }

    pub fn set(&self, now_millis: i64) {
        self.now.store(now_millis, Ordering::Release);
    }

    /// Moves the clock forward by `millis` and returns the new time, saturating at the bounds
    /// of `i64`.
    pub fn advance(&self, millis: i64) -> i64 {
        let prev = self
            .now
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |now| {
                Some(now.saturating_add(millis))
            })
            .unwrap_or_else(|now| now);

        prev.saturating_add(millis)
    }
}

impl TimeSource for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod test_clock {
    use super::*;

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(10);
        assert_eq!(clock.now_millis(), 10);

        assert_eq!(clock.advance(5), 15);
        assert_eq!(clock.now_millis(), 15);

        clock.set(3);
        assert_eq!(clock.now_millis(), 3);
    }

    #[test]
    fn test_manual_clock_saturates() {
        let clock = ManualClock::new(i64::MAX - 10);
        assert_eq!(clock.advance(100), i64::MAX);
        assert_eq!(clock.now_millis(), i64::MAX);

        clock.set(i64::MIN + 1);
        assert_eq!(clock.advance(-5), i64::MIN);
        assert_eq!(clock.now_millis(), i64::MIN);
    }

    #[test]
    fn test_monotonic_clock_never_goes_back() {
        let clock = MonotonicClock;

        let mut last = clock.now_millis();
        for _ in 0..1000 {
            let now = clock.now_millis();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn test_system_clock_is_after_epoch() {
        // 2017-07-11, well in the past of any machine running this.
        assert!(SystemClock.now_millis() > 1_499_731_200_000);
    }
}
