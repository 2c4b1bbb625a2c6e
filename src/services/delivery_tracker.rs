//! In-flight broadcast and reminder jobs, keyed by a caller-chosen string.
//!
//! Each coordinator or reminder service owns (a clone of) its tracker, so separate
//! instances never share state unless they are handed the same tracker.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone, Default)]
pub struct DeliveryTracker {
    active: Arc<Mutex<HashMap<String, DateTime<Utc>>>>,
}

impl DeliveryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, DateTime<Utc>>> {
        // The map stays consistent even if a holder panicked
        match self.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Marks `key` as in flight. Returns `None` if it already is; otherwise the key
    /// stays registered until the returned guard is dropped.
    pub fn try_begin(&self, key: impl Into<String>) -> Option<DeliveryGuard> {
        let key = key.into();
        let mut active = self.lock();
        if active.contains_key(&key) {
            return None;
        }
        active.insert(key.clone(), Utc::now());
        Some(DeliveryGuard {
            tracker: self.clone(),
            key,
        })
    }

    pub fn is_active(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn active_count(&self) -> usize {
        self.lock().len()
    }

    /// In-flight keys with the time they started, oldest first.
    pub fn snapshot(&self) -> Vec<(String, DateTime<Utc>)> {
        let mut entries: Vec<_> = self
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        entries.sort_by_key(|(_, started)| *started);
        entries
    }
}

pub struct DeliveryGuard {
    tracker: DeliveryTracker,
    key: String,
}

impl Drop for DeliveryGuard {
    fn drop(&mut self) {
        self.tracker.lock().remove(&self.key);
    }
}
