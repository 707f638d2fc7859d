//! Expirable is a concurrent in-memory key-value store whose entries expire after a time-to-live.
//!
//! Expiration is lazy: there is no background thread. Expired entries are treated as absent by
//! every operation and get evicted the next time an operation touches them, or all at once when
//! [`ExpiringMap::len`] sweeps the table.
//!
//! Time is read through an injectable [`TimeSource`], so tests can drive expiration with a
//! [`ManualClock`] instead of sleeping.
//!
//! # Examples
//! ```
//! use std::sync::Arc;
//!
//! use expirable::clock::ManualClock;
//! use expirable::{ExpiringMap, TimeUnit};
//!
//! fn main() {
//!     let clock = Arc::new(ManualClock::new(1_000));
//!     let cache = ExpiringMap::with_clock(3, TimeUnit::Seconds, clock.clone()).unwrap();
//!
//!     cache.put("Still", "Alive").unwrap();
//!     cache.put_with_ttl("Gonna", "Die", 1_000).unwrap();
//!
//!     clock.advance(1_001);
//!
//!     assert_eq!(cache.get(&"Still"), Some("Alive"));
//!     assert_eq!(cache.get(&"Gonna"), None);
//! }
//! ```
//!
//! [`ManualClock`]: clock::ManualClock

/// Time sources a store can read from.
pub mod clock;

/// A concurrent hash map with per-entry time-to-live.
pub mod map;

/// A concurrent hash set with per-member time-to-live.
pub mod set;

mod config;
mod entry;
mod error;
mod unit;

#[doc(inline)]
pub use crate::map::ExpiringMap;
#[doc(inline)]
pub use crate::set::ExpiringSet;

pub use crate::clock::TimeSource;
pub use crate::config::Builder;
pub use crate::entry::TimedEntry;
pub use crate::error::{Error, Result};
pub use crate::unit::TimeUnit;
