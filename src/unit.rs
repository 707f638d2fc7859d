/// Granularity of a time-to-live amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// Converts `amount` of this unit to milliseconds.
    ///
    /// Sub-millisecond units truncate toward zero, larger units saturate at `i64::MIN`/`i64::MAX`.
    ///
    /// # Examples
    ///
    /// ```
    /// use expirable::TimeUnit;
    ///
    /// assert_eq!(TimeUnit::Seconds.to_millis(3), 3_000);
    /// assert_eq!(TimeUnit::Microseconds.to_millis(1_999), 1);
    /// assert_eq!(TimeUnit::Days.to_millis(i64::MAX), i64::MAX);
    /// ```
    pub fn to_millis(self, amount: i64) -> i64 {
        match self {
            TimeUnit::Nanoseconds => amount / 1_000_000,
            TimeUnit::Microseconds => amount / 1_000,
            TimeUnit::Milliseconds => amount,
            TimeUnit::Seconds => amount.saturating_mul(1_000),
            TimeUnit::Minutes => amount.saturating_mul(60_000),
            TimeUnit::Hours => amount.saturating_mul(3_600_000),
            TimeUnit::Days => amount.saturating_mul(86_400_000),
        }
    }
}

impl Default for TimeUnit {
    fn default() -> Self {
        TimeUnit::Milliseconds
    }
}

#[cfg(test)]
mod test_unit {
    use super::TimeUnit;

    #[test]
    fn test_to_millis() {
        assert_eq!(TimeUnit::Nanoseconds.to_millis(5_000_000), 5);
        assert_eq!(TimeUnit::Microseconds.to_millis(7_000), 7);
        assert_eq!(TimeUnit::Milliseconds.to_millis(42), 42);
        assert_eq!(TimeUnit::Seconds.to_millis(2), 2_000);
        assert_eq!(TimeUnit::Minutes.to_millis(2), 120_000);
        assert_eq!(TimeUnit::Hours.to_millis(1), 3_600_000);
        assert_eq!(TimeUnit::Days.to_millis(1), 86_400_000);
    }

    #[test]
    fn test_to_millis_truncates_and_saturates() {
        assert_eq!(TimeUnit::Nanoseconds.to_millis(999_999), 0);
        assert_eq!(TimeUnit::Microseconds.to_millis(-1_500), -1);
        assert_eq!(TimeUnit::Hours.to_millis(i64::MAX / 2), i64::MAX);
        assert_eq!(TimeUnit::Minutes.to_millis(i64::MIN), i64::MIN);
    }

    #[test]
    fn test_default_is_millis() {
        assert_eq!(TimeUnit::default(), TimeUnit::Milliseconds);
    }
}
