use crate::clock::TimeSource;
use crate::error::Result;
use crate::{Builder, ExpiringMap, TimeUnit};

use hashbrown::hash_map::DefaultHashBuilder;

use std::borrow::Borrow;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

/// A set whose members expire after a time-to-live, backed by an [`ExpiringMap`].
///
/// # Examples
///
/// ```
/// use expirable::clock::ManualClock;
/// use expirable::{ExpiringSet, TimeUnit};
///
/// use std::sync::Arc;
///
/// let clock = Arc::new(ManualClock::new(1));
/// let seen = ExpiringSet::with_clock(10, TimeUnit::Milliseconds, clock.clone()).unwrap();
///
/// seen.insert("request-1").unwrap();
/// assert!(seen.contains(&"request-1"));
///
/// clock.advance(11);
/// assert!(!seen.contains(&"request-1"));
/// ```
pub struct ExpiringSet<T, H = DefaultHashBuilder> {
    map: ExpiringMap<T, (), H>,
}

impl<T: fmt::Debug, H> fmt::Debug for ExpiringSet<T, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpiringSet").field("map", &self.map).finish()
    }
}

impl<T> ExpiringSet<T, DefaultHashBuilder> {
    pub fn new(ttl_millis: i64) -> Result<Self> {
        ExpiringMap::new(ttl_millis).map(Self::from_map)
    }

    pub fn with_clock(ttl: i64, unit: TimeUnit, clock: Arc<dyn TimeSource>) -> Result<Self> {
        ExpiringMap::with_clock(ttl, unit, clock).map(Self::from_map)
    }

    pub fn builder() -> Builder {
        Builder::new()
    }
}

impl<T, H> ExpiringSet<T, H> {
    pub(crate) fn from_map(map: ExpiringMap<T, (), H>) -> Self {
        Self { map }
    }

    pub fn clear(&self) {
        self.map.clear();
    }
}

impl<T, H> ExpiringSet<T, H>
where
    T: Hash + Eq,
    H: BuildHasher,
{
    /// Adds `value` with the default time-to-live, restarting it if `value` is already present.
    ///
    /// Returns `true` if `value` was not a live member before.
    #[inline]
    pub fn insert(&self, value: T) -> Result<bool> {
        self.insert_with_ttl(value, self.map.default_ttl_millis())
    }

    pub fn insert_with_ttl(&self, value: T, ttl_millis: i64) -> Result<bool> {
        let was_live = self.map.put_reporting_live(value, (), ttl_millis)?;
        Ok(!was_live)
    }

    #[inline]
    pub fn contains<Q: ?Sized>(&self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq,
    {
        self.map.contains_key(value)
    }

    /// Removes `value`, returning whether it was stored at all (expired or not).
    #[inline]
    pub fn remove<Q: ?Sized>(&self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq,
    {
        self.map.remove(value).is_some()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Snapshot of every live member, in arbitrary order.
    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.map.keys()
    }
}

#[cfg(test)]
mod test_set {
    use super::ExpiringSet;
    use crate::clock::ManualClock;
    use crate::TimeUnit;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_insert_contains() {
        let clock = Arc::new(ManualClock::new(100));
        let set = ExpiringSet::with_clock(10, TimeUnit::Milliseconds, clock.clone()).unwrap();

        assert!(set.insert(1).unwrap());
        assert!(!set.insert(1).unwrap());
        assert!(set.contains(&1));
        assert!(!set.contains(&2));

        clock.advance(11);
        assert!(!set.contains(&1));
        assert!(set.insert(1).unwrap());
    }

    #[test]
    fn test_insert_with_ttl() {
        let clock = Arc::new(ManualClock::new(100));
        let set = ExpiringSet::with_clock(10, TimeUnit::Milliseconds, clock.clone()).unwrap();

        set.insert_with_ttl("long", 1_000).unwrap();
        set.insert("short").unwrap();
        assert!(set.insert_with_ttl("bad", -200).is_err());

        clock.advance(11);
        assert_eq!(set.len(), 1);
        assert_eq!(set.to_vec(), vec!["long"]);
    }

    #[test]
    fn test_remove_and_clear() {
        let set = ExpiringSet::new(1_000).unwrap();

        set.insert(1).unwrap();
        set.insert(2).unwrap();
        assert!(set.remove(&1));
        assert!(!set.remove(&1));
        assert_eq!(set.len(), 1);

        set.clear();
        assert!(set.is_empty());
    }

    #[test]
    fn test_concurrent_insert_reports_one_fresh() {
        for round in 0..50u32 {
            let set = ExpiringSet::new(60_000).unwrap();
            let fresh = AtomicUsize::new(0);

            crossbeam::thread::scope(|s| {
                for _ in 0..8 {
                    let set = &set;
                    let fresh = &fresh;
                    s.spawn(move |_| {
                        if set.insert(round).unwrap() {
                            fresh.fetch_add(1, Ordering::Relaxed);
                        }
                    });
                }
            })
            .unwrap();

            assert_eq!(fresh.load(Ordering::Relaxed), 1);
            assert_eq!(set.len(), 1);
        }
    }

    #[test]
    fn test_debug() {
        let set = ExpiringSet::new(1_000).unwrap();
        set.insert("member").unwrap();

        let printed = format!("{:?}", set);
        assert!(printed.starts_with("ExpiringSet"));
        assert!(printed.contains("\"member\""));
    }
}
