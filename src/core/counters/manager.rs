use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{
    instance_matches_process, pid_tag, CounterBackend, CounterPath, CounterReader, CounterSpec,
    InstanceBinding, InstanceNameCache, ID_PROCESS_COUNTER,
};
use crate::error::{Result, TelemetryError};

/// Idle eviction runs once every this many collection cycles
pub const EVICTION_CYCLE: u64 = 10;

struct BoundCounters {
    readers: Vec<Box<dyn CounterReader>>,
    last_good_at: Instant,
}

/// Live counter handles for one [`CounterSpec`], keyed by process ID
pub struct ProcessCounterManager {
    backend: Arc<dyn CounterBackend>,
    spec: CounterSpec,
    instances: InstanceNameCache,
    bound: DashMap<u32, BoundCounters>,
    cycles: AtomicU64,
}

impl ProcessCounterManager {
    pub fn new(backend: Arc<dyn CounterBackend>, spec: CounterSpec, instance_ttl: Duration) -> Self {
        Self {
            backend,
            spec,
            instances: InstanceNameCache::new(instance_ttl),
            bound: DashMap::new(),
            cycles: AtomicU64::new(0),
        }
    }

    pub fn spec(&self) -> CounterSpec {
        self.spec
    }

    pub fn is_supported(&self) -> bool {
        self.backend.category_exists(self.spec.category)
    }

    /// Current value for `pid`, summed over its bound instances
    ///
    /// A pid-tagged counter with no live instance reads as 0 and is probed
    /// again on the next call. Any read failure purges the binding and
    /// surfaces as `NotFound`.
    pub fn read(&self, pid: u32, process_name: &str) -> Result<f64> {
        let cached = self.bound.get_mut(&pid).map(|mut entry| {
            let result = read_all(&mut entry.readers, self.spec.raw);
            if result.is_ok() {
                entry.last_good_at = Instant::now();
            }
            result
        });

        match cached {
            Some(Ok(value)) => return Ok(value),
            Some(Err(e)) => {
                self.bound.remove(&pid);
                log::debug!(
                    "Dropped {} counter for pid {}: {}",
                    self.spec.counter,
                    pid,
                    e
                );
                return Err(TelemetryError::not_found(format!(
                    "{} counter for pid {} is no longer readable",
                    self.spec.counter, pid
                )));
            }
            None => {}
        }

        let Some(mut readers) = self.bind(pid, process_name)? else {
            return Ok(0.0);
        };

        let value = read_all(&mut readers, self.spec.raw)?;
        self.bound.entry(pid).or_insert(BoundCounters {
            readers,
            last_good_at: Instant::now(),
        });
        Ok(value)
    }

    fn bind(&self, pid: u32, process_name: &str) -> Result<Option<Vec<Box<dyn CounterReader>>>> {
        match self.spec.binding {
            InstanceBinding::ProcessName => self.bind_by_process_id(pid, process_name).map(Some),
            InstanceBinding::PidTagged => self.bind_pid_tagged(pid),
        }
    }

    fn bind_by_process_id(&self, pid: u32, process_name: &str) -> Result<Vec<Box<dyn CounterReader>>> {
        let category = self.spec.category;
        let candidates = self.instances.get_or_fetch(process_name, || {
            Ok(self
                .backend
                .instance_names(category)?
                .into_iter()
                .filter(|name| instance_matches_process(name, process_name))
                .collect())
        })?;

        for instance in candidates.iter() {
            let id_path = CounterPath::new(category, Some(instance), ID_PROCESS_COUNTER);
            let owner = self
                .backend
                .open(&id_path)
                .and_then(|mut reader| reader.raw_value());

            match owner {
                Ok(id) if id == pid as i64 => {
                    let path = CounterPath::new(category, Some(instance), self.spec.counter);
                    log::debug!("Bound pid {} to {}", pid, path);
                    return Ok(vec![self.backend.open(&path)?]);
                }
                Ok(_) => {}
                Err(e) => log::debug!("Reading {} failed: {}", id_path, e),
            }
        }

        // A process newer than the cached list is found once the TTL lapses
        Err(TelemetryError::not_found(format!(
            "No {} instance for pid {} ({})",
            category, pid, process_name
        )))
    }

    fn bind_pid_tagged(&self, pid: u32) -> Result<Option<Vec<Box<dyn CounterReader>>>> {
        let category = self.spec.category;
        let names = self
            .instances
            .get_or_fetch(category, || self.backend.instance_names(category))?;

        let tag = pid_tag(pid);
        let mut readers = Vec::new();
        for instance in names.iter().filter(|name| name.contains(&tag)) {
            let path = CounterPath::new(category, Some(instance), self.spec.counter);
            match self.backend.open(&path) {
                Ok(reader) => readers.push(reader),
                Err(e) => log::debug!("Could not open {}: {}", path, e),
            }
        }

        if readers.is_empty() {
            Ok(None)
        } else {
            Ok(Some(readers))
        }
    }

    pub fn is_bound(&self, pid: u32) -> bool {
        self.bound.contains_key(&pid)
    }

    pub fn bound_count(&self) -> usize {
        self.bound.len()
    }

    /// Drops bindings with no successful read within `max_idle`
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let before = self.bound.len();
        self.bound
            .retain(|_, entry| entry.last_good_at.elapsed() < max_idle);
        before.saturating_sub(self.bound.len())
    }

    /// Counts a collection cycle and evicts idle bindings every [`EVICTION_CYCLE`] cycles
    pub fn end_cycle(&self, max_idle: Duration) {
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        if cycle % EVICTION_CYCLE == 0 {
            let evicted = self.evict_idle(max_idle);
            if evicted > 0 {
                log::debug!("Evicted {} idle {} counter(s)", evicted, self.spec.counter);
            }
        }
    }

    pub fn clear(&self) {
        self.bound.clear();
    }
}

fn read_all(readers: &mut [Box<dyn CounterReader>], raw: bool) -> Result<f64> {
    let mut total = 0.0;
    for reader in readers.iter_mut() {
        total += if raw {
            reader.raw_value()? as f64
        } else {
            reader.next_value()?
        };
    }
    Ok(total)
}
