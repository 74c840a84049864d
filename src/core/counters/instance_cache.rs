use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::Result;

struct Entry {
    names: Arc<[String]>,
    fetched_at: Instant,
}

/// Instance-name lists keyed by lookup key, each reused for `ttl`
pub struct InstanceNameCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl InstanceNameCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Cached names for `key`, calling `fetch` only when absent or expired
    ///
    /// The lock is not held while fetching; two callers racing on the same
    /// expired key may both fetch.
    pub fn get_or_fetch<F>(&self, key: &str, fetch: F) -> Result<Arc<[String]>>
    where
        F: FnOnce() -> Result<Vec<String>>,
    {
        if let Some(entry) = self.entries.lock().get(key) {
            if entry.fetched_at.elapsed() < self.ttl {
                return Ok(Arc::clone(&entry.names));
            }
        }

        let names: Arc<[String]> = fetch()?.into();
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                names: Arc::clone(&names),
                fetched_at: Instant::now(),
            },
        );
        Ok(names)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
