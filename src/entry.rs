use crate::clock::TimeSource;
use crate::error::{Error, Result};

use std::fmt;
use std::sync::Arc;

/// A value paired with the absolute instant it stops being visible.
///
/// Entries never change after construction. Only the clock they share with their store moves,
/// which is what flips [`TimedEntry::is_expired`] over time.
pub struct TimedEntry<V> {
    value: V,
    expires_at: i64,
    clock: Arc<dyn TimeSource>,
}

impl<V> TimedEntry<V> {
    /// Creates an entry expiring at `expires_at` (epoch millis).
    ///
    /// Fails if `expires_at` is not strictly positive.
    pub fn new(value: V, expires_at: i64, clock: Arc<dyn TimeSource>) -> Result<Self> {
        if expires_at <= 0 {
            return Err(Error::invalid(format!(
                "expiration timestamp must be positive, got {}",
                expires_at
            )));
        }

        Ok(Self {
            value,
            expires_at,
            clock,
        })
    }

    /// Creates an entry living `ttl_millis` from the current time of `clock`.
    pub fn with_ttl(value: V, ttl_millis: i64, clock: Arc<dyn TimeSource>) -> Result<Self> {
        let now = clock.now_millis();
        let expires_at = now.checked_add(ttl_millis).ok_or_else(|| {
            Error::invalid(format!("ttl of {}ms overflows from {}", ttl_millis, now))
        })?;

        Self::new(value, expires_at, clock)
    }

    /// Returns the value whether or not the entry has expired.
    #[inline]
    pub fn value(&self) -> &V {
        &self.value
    }

    #[inline]
    pub fn into_value(self) -> V {
        self.value
    }

    #[inline]
    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    /// An entry is still alive at the exact instant it expires.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(self.clock.now_millis())
    }

    #[inline]
    pub fn is_expired_at(&self, now: i64) -> bool {
        now > self.expires_at
    }

    pub fn remaining_millis(&self) -> i64 {
        self.expires_at.saturating_sub(self.clock.now_millis()).max(0)
    }
}

impl<V: fmt::Debug> fmt::Debug for TimedEntry<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimedEntry")
            .field("value", &self.value)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod test_entry {
    use super::TimedEntry;
    use crate::clock::{ManualClock, TimeSource};
    use crate::Error;

    use std::sync::Arc;

    fn clock_at(now: i64) -> (Arc<ManualClock>, Arc<dyn TimeSource>) {
        let clock = Arc::new(ManualClock::new(now));
        let shared: Arc<dyn TimeSource> = clock.clone();
        (clock, shared)
    }

    #[test]
    fn test_ttl_boundary() {
        let (clock, shared) = clock_at(100);
        let entry = TimedEntry::with_ttl("v", 10, shared).unwrap();

        assert_eq!(entry.expires_at(), 110);
        assert!(!entry.is_expired());

        clock.set(110);
        assert!(!entry.is_expired());

        clock.set(111);
        assert!(entry.is_expired());
    }

    #[test]
    fn test_value_is_readable_after_expiration() {
        let (clock, shared) = clock_at(1);
        let entry = TimedEntry::with_ttl(7, 1, shared).unwrap();

        clock.advance(100);
        assert!(entry.is_expired());
        assert_eq!(*entry.value(), 7);
        assert_eq!(entry.into_value(), 7);
    }

    #[test]
    fn test_rejects_non_positive_expiration() {
        let (_, shared) = clock_at(0);

        assert!(matches!(
            TimedEntry::new((), 0, shared.clone()),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            TimedEntry::new((), -5, shared.clone()),
            Err(Error::InvalidArgument(_))
        ));
        assert!(TimedEntry::with_ttl((), 0, shared.clone()).is_err());
        assert!(TimedEntry::with_ttl((), 1, shared).is_ok());
    }

    #[test]
    fn test_rejects_overflowing_ttl() {
        let (_, shared) = clock_at(10);
        assert!(TimedEntry::with_ttl((), i64::MAX, shared).is_err());
    }

    #[test]
    fn test_remaining_millis() {
        let (clock, shared) = clock_at(1_000);
        let entry = TimedEntry::with_ttl((), 500, shared).unwrap();

        assert_eq!(entry.remaining_millis(), 500);
        clock.advance(200);
        assert_eq!(entry.remaining_millis(), 300);
        clock.advance(1_000);
        assert_eq!(entry.remaining_millis(), 0);
    }
}
