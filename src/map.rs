use crate::clock::{SystemClock, TimeSource};
use crate::config::{validate_ttl, Builder};
use crate::entry::TimedEntry;
use crate::error::Result;
use crate::TimeUnit;

use hashbrown::hash_map::DefaultHashBuilder;
use hashbrown::HashMap;
use parking_lot::RwLock;
use tracing::{debug, trace};

use std::borrow::Borrow;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::mem;
use std::sync::Arc;

type Table<K, V, H> = HashMap<K, TimedEntry<V>, H>;

/// A concurrent hash map whose entries expire after a time-to-live.
///
/// Expiration is lazy. Nothing runs in the background; an expired entry stays in the table
/// until an operation touching it (or a full sweep by [`ExpiringMap::len`]) evicts it, and it is
/// never handed back to a caller in the meantime.
///
/// Every operation goes through a single readers-writer lock. Lookups take the shared side,
/// anything that inserts or removes takes the exclusive side.
pub struct ExpiringMap<K, V, H = DefaultHashBuilder> {
    entries: RwLock<Table<K, V, H>>,
    default_ttl_millis: i64,
    clock: Arc<dyn TimeSource>,
}

impl<K: fmt::Debug, V: fmt::Debug, H> fmt::Debug for ExpiringMap<K, V, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.read();
        f.debug_struct("ExpiringMap")
            .field("default_ttl_millis", &self.default_ttl_millis)
            .field("entries", &*entries)
            .finish()
    }
}

impl<K, V> ExpiringMap<K, V, DefaultHashBuilder> {
    /// Creates an empty `ExpiringMap` whose entries live `ttl_millis` unless told otherwise.
    ///
    /// Fails if `ttl_millis` is not positive.
    ///
    /// # Examples
    ///
    /// ```
    /// use expirable::ExpiringMap;
    ///
    /// let cache = ExpiringMap::<u32, u32>::new(30_000).unwrap();
    /// assert!(ExpiringMap::<u32, u32>::new(0).is_err());
    /// ```
    pub fn new(ttl_millis: i64) -> Result<Self> {
        Self::with_unit(ttl_millis, TimeUnit::Milliseconds)
    }

    pub fn with_unit(ttl: i64, unit: TimeUnit) -> Result<Self> {
        Self::with_clock(ttl, unit, Arc::new(SystemClock))
    }

    /// Creates an empty `ExpiringMap` reading time from `clock`.
    ///
    /// # Examples
    ///
    /// ```
    /// use expirable::clock::ManualClock;
    /// use expirable::{ExpiringMap, TimeUnit};
    ///
    /// use std::sync::Arc;
    ///
    /// let clock = Arc::new(ManualClock::new(1_000));
    /// let cache = ExpiringMap::with_clock(1, TimeUnit::Seconds, clock.clone()).unwrap();
    ///
    /// cache.put("key", "value").unwrap();
    /// clock.advance(1_000);
    /// assert_eq!(cache.get(&"key"), Some("value"));
    /// clock.advance(1);
    /// assert_eq!(cache.get(&"key"), None);
    /// ```
    pub fn with_clock(ttl: i64, unit: TimeUnit, clock: Arc<dyn TimeSource>) -> Result<Self> {
        Self::builder().default_ttl(ttl, unit).clock(clock).build()
    }

    pub fn with_capacity(capacity: usize, ttl_millis: i64) -> Result<Self> {
        Self::builder()
            .default_ttl_millis(ttl_millis)
            .capacity(capacity)
            .build()
    }

    pub fn builder() -> Builder {
        Builder::new()
    }
}

impl<K, V, H> ExpiringMap<K, V, H> {
    pub(crate) fn from_parts(
        table: Table<K, V, H>,
        default_ttl_millis: i64,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            entries: RwLock::new(table),
            default_ttl_millis,
            clock,
        }
    }

    pub fn with_hasher(ttl_millis: i64, hasher: H) -> Result<Self> {
        let default_ttl_millis = validate_ttl(ttl_millis, TimeUnit::Milliseconds)?;
        Ok(Self::from_parts(
            HashMap::with_hasher(hasher),
            default_ttl_millis,
            Arc::new(SystemClock),
        ))
    }

    #[inline]
    pub fn default_ttl_millis(&self) -> i64 {
        self.default_ttl_millis
    }

    /// Returns the number of slots in the backing table, expired ones included.
    ///
    /// Cheaper than [`ExpiringMap::len`] since it neither sweeps nor takes the exclusive lock.
    #[inline]
    pub fn len_approx(&self) -> usize {
        self.entries.read().len()
    }

    /// Removes every entry, live or not.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    fn make_entry(&self, value: V, ttl_millis: i64) -> Result<TimedEntry<V>> {
        TimedEntry::with_ttl(value, ttl_millis, self.clock.clone())
    }
}

impl<K, V, H> ExpiringMap<K, V, H>
where
    K: Hash + Eq,
    H: BuildHasher,
{
    /// Drops every expired entry. The caller holds the write lock.
    fn sweep(entries: &mut Table<K, V, H>, now: i64) -> usize {
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));

        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(evicted, remaining = entries.len(), "swept expired entries");
        }

        evicted
    }

    /// Looks `k` up under the write lock, evicting it first if it has expired.
    fn live_slot_mut<'a, Q: ?Sized>(
        entries: &'a mut Table<K, V, H>,
        k: &Q,
        now: i64,
    ) -> Option<&'a mut TimedEntry<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        if entries.get(k)?.is_expired_at(now) {
            entries.remove(k);
            trace!("evicted expired entry");
            return None;
        }

        entries.get_mut(k)
    }

    /// Second half of a read that found an expired entry. The read lock has been released by now,
    /// so the slot is checked again; whatever another writer put there in between is left alone.
    fn evict_if_expired<Q: ?Sized>(&self, k: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        let mut entries = self.entries.write();
        let now = self.clock.now_millis();

        let expired = entries.get(k).map_or(false, |e| e.is_expired_at(now));
        if expired {
            entries.remove(k);
            trace!("evicted expired entry");
        }

        expired
    }

    /// Runs `f` on the live entry for `k`. An expired entry is evicted and `f` is not called.
    fn with_live_entry<Q: ?Sized, R, F>(&self, k: &Q, f: F) -> Option<R>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
        F: FnOnce(&TimedEntry<V>) -> R,
    {
        let found_expired = match self.entries.read().get(k) {
            Some(entry) if !entry.is_expired() => return Some(f(entry)),
            Some(_) => true,
            None => false,
        };

        if found_expired {
            self.evict_if_expired(k);
        }

        None
    }

    /// Returns the number of live entries, evicting every expired one on the way.
    ///
    /// # Examples
    ///
    /// ```
    /// use expirable::clock::ManualClock;
    /// use expirable::{ExpiringMap, TimeUnit};
    ///
    /// use std::sync::Arc;
    ///
    /// let clock = Arc::new(ManualClock::new(1));
    /// let cache = ExpiringMap::with_clock(100, TimeUnit::Milliseconds, clock.clone()).unwrap();
    ///
    /// cache.put_with_ttl(0, "short", 10).unwrap();
    /// cache.put(1, "long").unwrap();
    /// assert_eq!(cache.len(), 2);
    ///
    /// clock.advance(11);
    /// assert_eq!(cache.len_approx(), 2);
    /// assert_eq!(cache.len(), 1);
    /// assert_eq!(cache.len_approx(), 1);
    /// ```
    pub fn len(&self) -> usize {
        let mut entries = self.entries.write();
        Self::sweep(&mut entries, self.clock.now_millis());
        entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evicts every expired entry and returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write();
        Self::sweep(&mut entries, self.clock.now_millis())
    }

    /// Returns `true` if `k` maps to a live entry.
    ///
    /// Finding an expired entry evicts it.
    #[inline]
    pub fn contains_key<Q: ?Sized>(&self, k: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        self.with_live_entry(k, |_| ()).is_some()
    }

    /// Returns whether the first entry holding `value` is still alive.
    ///
    /// Entries are visited in table order and only the first match is considered, even if it has
    /// expired and a later one has not. Nothing is evicted.
    pub fn contains_value(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        self.entries
            .read()
            .values()
            .find(|entry| entry.value() == value)
            .map_or(false, |entry| !entry.is_expired())
    }

    /// Returns a copy of the value for `k`, or `None` if it is absent or expired.
    ///
    /// Finding an expired entry evicts it.
    ///
    /// # Examples
    ///
    /// ```
    /// use expirable::clock::ManualClock;
    /// use expirable::{ExpiringMap, TimeUnit};
    ///
    /// use std::sync::Arc;
    ///
    /// let clock = Arc::new(ManualClock::new(1));
    /// let cache = ExpiringMap::with_clock(10, TimeUnit::Milliseconds, clock.clone()).unwrap();
    ///
    /// cache.put("k", 42).unwrap();
    /// assert_eq!(cache.get(&"k"), Some(42));
    /// assert_eq!(cache.get(&"other"), None);
    ///
    /// clock.advance(11);
    /// assert_eq!(cache.get(&"k"), None);
    /// assert_eq!(cache.len_approx(), 0);
    /// ```
    #[inline]
    pub fn get<Q: ?Sized>(&self, k: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
        V: Clone,
    {
        self.get_with(k, V::clone)
    }

    /// Like [`ExpiringMap::get`], but hands a reference to the value to `f` while the read lock
    /// is held instead of cloning it.
    ///
    /// `f` must not call back into the same map.
    pub fn get_with<Q: ?Sized, R, F>(&self, k: &Q, f: F) -> Option<R>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
        F: FnOnce(&V) -> R,
    {
        self.with_live_entry(k, |entry| f(entry.value()))
    }

    /// Returns the remaining lifetime of `k` in milliseconds.
    pub fn ttl<Q: ?Sized>(&self, k: &Q) -> Option<i64>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        self.with_live_entry(k, TimedEntry::remaining_millis)
    }

    /// Inserts `value` under `k` with the default time-to-live and returns the inserted value.
    ///
    /// An existing entry is overwritten whether or not it has expired, and its expiration is
    /// replaced by the new one.
    #[inline]
    pub fn put(&self, k: K, value: V) -> Result<V>
    where
        V: Clone,
    {
        self.put_with_ttl(k, value, self.default_ttl_millis)
    }

    #[inline]
    pub fn put_with_ttl(&self, k: K, value: V, ttl_millis: i64) -> Result<V>
    where
        V: Clone,
    {
        self.put_with_ttl_unit(k, value, ttl_millis, TimeUnit::Milliseconds)
    }

    /// Inserts `value` under `k`, living `ttl` of `unit`.
    ///
    /// Fails without touching the map if the resulting expiration timestamp is not positive.
    ///
    /// # Examples
    ///
    /// ```
    /// use expirable::clock::ManualClock;
    /// use expirable::{ExpiringMap, TimeUnit};
    ///
    /// use std::sync::Arc;
    ///
    /// let clock = Arc::new(ManualClock::new(1));
    /// let cache = ExpiringMap::with_clock(10, TimeUnit::Milliseconds, clock.clone()).unwrap();
    ///
    /// assert_eq!(cache.put_with_ttl_unit("k", 1, 2, TimeUnit::Seconds), Ok(1));
    /// clock.advance(1_500);
    /// assert!(cache.contains_key(&"k"));
    ///
    /// assert!(cache.put_with_ttl_unit("k", 2, -1, TimeUnit::Minutes).is_err());
    /// assert_eq!(cache.get(&"k"), Some(1));
    /// ```
    pub fn put_with_ttl_unit(&self, k: K, value: V, ttl: i64, unit: TimeUnit) -> Result<V>
    where
        V: Clone,
    {
        let entry = self.make_entry(value, unit.to_millis(ttl))?;
        let inserted = entry.value().clone();

        self.entries.write().insert(k, entry);
        Ok(inserted)
    }

    /// Inserts every pair with the default time-to-live in a single critical section.
    ///
    /// All entries are built before the lock is taken; if any of them is invalid nothing is
    /// inserted.
    pub fn put_all<I>(&self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let batch = pairs
            .into_iter()
            .map(|(k, v)| Ok((k, self.make_entry(v, self.default_ttl_millis)?)))
            .collect::<Result<Vec<_>>>()?;

        let count = batch.len();
        let mut entries = self.entries.write();
        entries.reserve(count);
        entries.extend(batch);

        debug!(count, "inserted batch");
        Ok(())
    }

    /// Inserts `value` with the default time-to-live unless `k` already maps to a live entry, in
    /// which case the current value is returned and nothing changes.
    pub fn put_if_absent(&self, k: K, value: V) -> Result<Option<V>>
    where
        V: Clone,
    {
        let entry = self.make_entry(value, self.default_ttl_millis)?;

        let mut entries = self.entries.write();
        let now = self.clock.now_millis();
        if let Some(current) = Self::live_slot_mut(&mut entries, &k, now) {
            return Ok(Some(current.value().clone()));
        }

        entries.insert(k, entry);
        Ok(None)
    }

    /// Overwrites `k` like [`ExpiringMap::put_with_ttl`] and reports whether the displaced entry
    /// was still alive, all under one write lock.
    pub(crate) fn put_reporting_live(&self, k: K, value: V, ttl_millis: i64) -> Result<bool> {
        let entry = self.make_entry(value, ttl_millis)?;

        let mut entries = self.entries.write();
        let now = self.clock.now_millis();
        let was_live = entries.get(&k).map_or(false, |e| !e.is_expired_at(now));

        entries.insert(k, entry);
        Ok(was_live)
    }

    /// Removes `k` and returns its value, expired or not.
    ///
    /// # Examples
    ///
    /// ```
    /// use expirable::ExpiringMap;
    ///
    /// let cache = ExpiringMap::new(1_000).unwrap();
    /// cache.put(1, "a").unwrap();
    ///
    /// assert_eq!(cache.remove(&1), Some("a"));
    /// assert_eq!(cache.remove(&1), None);
    /// ```
    pub fn remove<Q: ?Sized>(&self, k: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        self.entries.write().remove(k).map(TimedEntry::into_value)
    }

    /// Removes `k` only if it maps to a live entry equal to `value`.
    ///
    /// An expired entry is evicted regardless and the call returns `false`.
    pub fn remove_if<Q: ?Sized>(&self, k: &Q, value: &V) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
        V: PartialEq,
    {
        let mut entries = self.entries.write();
        let now = self.clock.now_millis();

        let matches = match Self::live_slot_mut(&mut entries, k, now) {
            Some(current) => current.value() == value,
            None => return false,
        };

        if matches {
            entries.remove(k);
        }

        matches
    }

    /// Replaces the value of a live entry, restarting its time-to-live at the default, and
    /// returns the previous value.
    pub fn replace<Q: ?Sized>(&self, k: &Q, value: V) -> Result<Option<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        let entry = self.make_entry(value, self.default_ttl_millis)?;

        let mut entries = self.entries.write();
        let now = self.clock.now_millis();
        Ok(Self::live_slot_mut(&mut entries, k, now)
            .map(|slot| mem::replace(slot, entry).into_value()))
    }

    /// Replaces the value of a live entry only if it currently equals `old`.
    pub fn replace_if<Q: ?Sized>(&self, k: &Q, old: &V, new: V) -> Result<bool>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
        V: PartialEq,
    {
        let entry = self.make_entry(new, self.default_ttl_millis)?;

        let mut entries = self.entries.write();
        let now = self.clock.now_millis();
        match Self::live_slot_mut(&mut entries, k, now) {
            Some(slot) if slot.value() == old => {
                *slot = entry;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Snapshot of the keys of every live entry, in arbitrary order.
    pub fn keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.snapshot(|k, _| k.clone())
    }

    /// Snapshot of the values of every live entry, in arbitrary order.
    pub fn values(&self) -> Vec<V>
    where
        V: Clone,
    {
        self.snapshot(|_, v| v.clone())
    }

    /// Snapshot of every live key-value pair, in arbitrary order.
    ///
    /// # Examples
    ///
    /// ```
    /// use expirable::clock::ManualClock;
    /// use expirable::{ExpiringMap, TimeUnit};
    ///
    /// use std::sync::Arc;
    ///
    /// let clock = Arc::new(ManualClock::new(1));
    /// let cache = ExpiringMap::with_clock(100, TimeUnit::Milliseconds, clock.clone()).unwrap();
    /// cache.put_with_ttl(0, "a", 5).unwrap();
    /// cache.put(1, "b").unwrap();
    ///
    /// clock.advance(6);
    /// assert_eq!(cache.entries(), vec![(1, "b")]);
    /// ```
    pub fn entries(&self) -> Vec<(K, V)>
    where
        K: Clone,
        V: Clone,
    {
        self.snapshot(|k, v| (k.clone(), v.clone()))
    }

    fn snapshot<T, F>(&self, mut f: F) -> Vec<T>
    where
        F: FnMut(&K, &V) -> T,
    {
        let entries = self.entries.read();
        let now = self.clock.now_millis();

        entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .map(|(k, entry)| f(k, entry.value()))
            .collect()
    }
}
