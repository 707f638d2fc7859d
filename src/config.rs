use crate::clock::{SystemClock, TimeSource};
use crate::error::{Error, Result};
use crate::{ExpiringMap, ExpiringSet, TimeUnit};

use hashbrown::hash_map::DefaultHashBuilder;
use hashbrown::HashMap;
use tracing::warn;

use std::hash::BuildHasher;
use std::sync::Arc;

/// Construction surface shared by [`ExpiringMap`] and [`ExpiringSet`].
///
/// Only the default time-to-live is mandatory. The time source defaults to [`SystemClock`],
/// the hasher to `hashbrown`'s default and the initial capacity to zero.
///
/// # Examples
///
/// ```
/// use expirable::clock::ManualClock;
/// use expirable::{Builder, ExpiringMap, TimeUnit};
///
/// use std::sync::Arc;
///
/// let clock = Arc::new(ManualClock::new(1));
/// let cache: ExpiringMap<&str, u32> = Builder::new()
///     .default_ttl(30, TimeUnit::Seconds)
///     .clock(clock)
///     .capacity(64)
///     .build()
///     .unwrap();
///
/// assert_eq!(cache.default_ttl_millis(), 30_000);
/// ```
pub struct Builder<H = DefaultHashBuilder> {
    ttl: Option<(i64, TimeUnit)>,
    clock: Option<Arc<dyn TimeSource>>,
    capacity: usize,
    hasher: H,
}

impl Builder<DefaultHashBuilder> {
    pub fn new() -> Self {
        Self {
            ttl: None,
            clock: None,
            capacity: 0,
            hasher: DefaultHashBuilder::default(),
        }
    }
}

impl Default for Builder<DefaultHashBuilder> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> Builder<H> {
    pub fn default_ttl(mut self, amount: i64, unit: TimeUnit) -> Self {
        self.ttl = Some((amount, unit));
        self
    }

    pub fn default_ttl_millis(self, millis: i64) -> Self {
        self.default_ttl(millis, TimeUnit::Milliseconds)
    }

    pub fn clock(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn hasher<S>(self, hasher: S) -> Builder<S> {
        Builder {
            ttl: self.ttl,
            clock: self.clock,
            capacity: self.capacity,
            hasher,
        }
    }

    pub fn build<K, V>(self) -> Result<ExpiringMap<K, V, H>>
    where
        H: BuildHasher,
    {
        let (amount, unit) = match self.ttl {
            Some(ttl) => ttl,
            None => {
                warn!("expiring map built without a default ttl");
                return Err(Error::invalid("default time-to-live is required"));
            }
        };

        let default_ttl_millis = validate_ttl(amount, unit)?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let table = HashMap::with_capacity_and_hasher(self.capacity, self.hasher);

        Ok(ExpiringMap::from_parts(table, default_ttl_millis, clock))
    }

    pub fn build_set<T>(self) -> Result<ExpiringSet<T, H>>
    where
        H: BuildHasher,
    {
        self.build().map(ExpiringSet::from_map)
    }
}

/// Converts a default time-to-live to milliseconds, rejecting anything that is not positive
/// once converted.
pub(crate) fn validate_ttl(amount: i64, unit: TimeUnit) -> Result<i64> {
    if amount <= 0 {
        warn!(amount, ?unit, "rejected non-positive default ttl");
        return Err(Error::invalid(format!(
            "default time-to-live must be positive, got {} {:?}",
            amount, unit
        )));
    }

    let millis = unit.to_millis(amount);
    if millis <= 0 {
        warn!(amount, ?unit, "default ttl truncates to zero milliseconds");
        return Err(Error::invalid(format!(
            "default time-to-live of {} {:?} is shorter than a millisecond",
            amount, unit
        )));
    }

    Ok(millis)
}

#[cfg(test)]
mod test_config {
    use super::*;
    use crate::clock::ManualClock;

    use std::collections::hash_map::RandomState;

    #[test]
    fn test_build_requires_ttl() {
        let built = Builder::new().build::<u32, u32>();
        assert!(matches!(built, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_build_rejects_non_positive_ttl() {
        assert!(Builder::new().default_ttl_millis(0).build::<u32, u32>().is_err());
        assert!(Builder::new().default_ttl_millis(-10).build::<u32, u32>().is_err());
        assert!(Builder::new()
            .default_ttl(999, TimeUnit::Microseconds)
            .build::<u32, u32>()
            .is_err());
    }

    #[test]
    fn test_build_converts_unit() {
        let map = Builder::new()
            .default_ttl(2, TimeUnit::Minutes)
            .build::<u32, u32>()
            .unwrap();
        assert_eq!(map.default_ttl_millis(), 120_000);
    }

    #[test]
    fn test_build_with_clock_and_hasher() {
        let clock = Arc::new(ManualClock::new(50));
        let map = Builder::new()
            .default_ttl_millis(10)
            .clock(clock.clone())
            .hasher(RandomState::new())
            .capacity(16)
            .build::<u32, u32>()
            .unwrap();

        map.put(1, 1).unwrap();
        assert_eq!(map.ttl(&1), Some(10));

        clock.advance(11);
        assert_eq!(map.get(&1), None);
    }

    #[test]
    fn test_build_set() {
        let set = Builder::new().default_ttl_millis(10).build_set::<u32>().unwrap();
        assert!(set.is_empty());
    }
}
