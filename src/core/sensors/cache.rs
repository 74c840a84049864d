use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{HardwareTree, HardwareType, SensorReading, SensorType};

/// Immutable list of readings published by one refresh
#[derive(Debug, Default)]
pub struct SensorSnapshot {
    pub readings: Vec<SensorReading>,
    pub taken_at: Option<Instant>,
}

impl SensorSnapshot {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.taken_at.is_some_and(|at| at.elapsed() < ttl)
    }
}

/// Stale-while-revalidate cache over a [`HardwareTree`]
///
/// One caller refreshes at a time; anyone arriving during a refresh gets the
/// previous snapshot instead of waiting. Snapshots are replaced whole.
pub struct SensorCache {
    tree: Mutex<Box<dyn HardwareTree>>,
    available: OnceCell<bool>,
    closed: AtomicBool,
    snapshot: RwLock<Arc<SensorSnapshot>>,
    ttl: Duration,
}

impl SensorCache {
    pub fn new(tree: Box<dyn HardwareTree>, ttl: Duration) -> Self {
        Self {
            tree: Mutex::new(tree),
            available: OnceCell::new(),
            closed: AtomicBool::new(false),
            snapshot: RwLock::new(Arc::new(SensorSnapshot::default())),
            ttl,
        }
    }

    /// Opens the tree on first call. A failure is final for this cache.
    pub fn initialize(&self) -> bool {
        *self.available.get_or_init(|| match self.tree.lock().open() {
            Ok(()) => {
                log::info!("Hardware sensor tree opened");
                true
            }
            Err(e) => {
                log::warn!("Hardware sensor tree unavailable: {}", e);
                false
            }
        })
    }

    pub fn is_available(&self) -> bool {
        self.available.get().copied().unwrap_or(false) && !self.closed.load(Ordering::Acquire)
    }

    /// Current snapshot, refreshed first if it is older than the TTL
    pub fn snapshot(&self) -> Arc<SensorSnapshot> {
        if !self.initialize() || self.closed.load(Ordering::Acquire) {
            return Arc::new(SensorSnapshot::default());
        }

        let current = Arc::clone(&self.snapshot.read());
        if current.is_fresh(self.ttl) {
            return current;
        }

        let Some(mut tree) = self.tree.try_lock() else {
            return current;
        };

        // Another caller may have refreshed while we waited for the gate
        let current = Arc::clone(&self.snapshot.read());
        if current.is_fresh(self.ttl) {
            return current;
        }

        tree.update();
        let mut readings = Vec::new();
        for hardware in tree.hardware() {
            hardware.collect_readings(&mut readings);
        }

        let fresh = Arc::new(SensorSnapshot {
            readings,
            taken_at: Some(Instant::now()),
        });
        *self.snapshot.write() = Arc::clone(&fresh);
        fresh
    }

    /// First reading of the given kind
    pub fn get_sensor_value(&self, hardware: HardwareType, sensor: SensorType) -> Option<f32> {
        self.snapshot()
            .readings
            .iter()
            .find(|r| r.hardware_type == hardware && r.sensor_type == sensor)
            .map(|r| r.value)
    }

    pub fn get_all_sensor_values(&self, hardware: HardwareType, sensor: SensorType) -> Vec<f32> {
        self.snapshot()
            .readings
            .iter()
            .filter(|r| r.hardware_type == hardware && r.sensor_type == sensor)
            .map(|r| r.value)
            .collect()
    }

    pub fn get_sensor_values(
        &self,
        hardware: &[HardwareType],
        sensor: SensorType,
    ) -> Vec<SensorReading> {
        self.snapshot()
            .readings
            .iter()
            .filter(|r| hardware.contains(&r.hardware_type) && r.sensor_type == sensor)
            .cloned()
            .collect()
    }

    /// First reading whose sensor name contains `pattern`, ignoring case
    pub fn get_sensor_value_by_name(
        &self,
        hardware: HardwareType,
        sensor: SensorType,
        pattern: &str,
    ) -> Option<f32> {
        let pattern = pattern.to_lowercase();
        self.snapshot()
            .readings
            .iter()
            .find(|r| {
                r.hardware_type == hardware
                    && r.sensor_type == sensor
                    && r.sensor_name.to_lowercase().contains(&pattern)
            })
            .map(|r| r.value)
    }

    /// Closes the tree if it was opened. Later queries return nothing.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.available.get().copied().unwrap_or(false) {
            self.tree.lock().close();
            log::debug!("Hardware sensor tree closed");
        }
        *self.snapshot.write() = Arc::new(SensorSnapshot::default());
    }
}

impl Drop for SensorCache {
    fn drop(&mut self) {
        self.close();
    }
}
