//! Query throttling.
//!
//! Identifiers are not re-queried while a previous query is still fresh;
//! a query records its expiry and later attempts inside the window are
//! suppressed.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;

/// Seconds before a dispatched query may be repeated.
pub const QUERY_EXPIRES: f64 = 120.0;

/// Tracks per-key expiry times for duplicate-query suppression.
pub struct FrequencyChecker<K> {
    expires: f64,
    records: Mutex<HashMap<K, f64>>,
}

impl<K: Eq + Hash + Clone> FrequencyChecker<K> {
    pub fn new(expires: f64) -> Self {
        Self {
            expires,
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` when the key is due (and stamps it); `false` while a
    /// previous stamp is still fresh. `force` restamps unconditionally.
    pub fn is_expired(&self, key: &K, now: f64, force: bool) -> bool {
        let mut records = match self.records.lock() {
            Ok(records) => records,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !force {
            if let Some(expired) = records.get(key) {
                if *expired > now {
                    return false;
                }
            }
        }
        records.insert(key.clone(), now + self.expires);
        true
    }
}

/// Remembers the newest known time per key; stale updates are detectable.
pub struct RecentTimeChecker<K> {
    times: Mutex<HashMap<K, f64>>,
}

impl<K: Eq + Hash + Clone> RecentTimeChecker<K> {
    pub fn new() -> Self {
        Self {
            times: Mutex::new(HashMap::new()),
        }
    }

    /// Record `time` if it is newer than what we hold.
    pub fn set_last_time(&self, key: &K, time: f64) -> bool {
        let mut times = match self.times.lock() {
            Ok(times) => times,
            Err(poisoned) => poisoned.into_inner(),
        };
        match times.get(key) {
            Some(last) if *last >= time => false,
            _ => {
                times.insert(key.clone(), time);
                true
            }
        }
    }

    /// Is `time` older than the newest we have seen for this key?
    pub fn is_expired(&self, key: &K, time: f64) -> bool {
        let times = match self.times.lock() {
            Ok(times) => times,
            Err(poisoned) => poisoned.into_inner(),
        };
        matches!(times.get(key), Some(last) if *last > time)
    }
}

impl<K: Eq + Hash + Clone> Default for RecentTimeChecker<K> {
    fn default() -> Self {
        Self::new()
    }
}
