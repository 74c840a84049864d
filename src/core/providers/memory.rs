use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use sysinfo::{MemoryRefreshKind, RefreshKind, System};

use super::{
    blocking, read_process_counter, to_metric_value, CounterSettings, MetricProvider,
    ProcessTarget,
};
use crate::core::counters::{CounterBackend, ProcessCounterManager, PROCESS_PRIVATE_MEMORY};
use crate::core::metrics::{round1, MetricType, MetricValue, BYTES_PER_MB};

/// Private working set per process, used physical memory system-wide (MB)
pub struct MemoryMetricProvider {
    counters: Arc<ProcessCounterManager>,
    system: Arc<Mutex<System>>,
    settings: CounterSettings,
}

impl MemoryMetricProvider {
    pub fn new(backend: Arc<dyn CounterBackend>, settings: CounterSettings) -> Self {
        let system = System::new_with_specifics(
            RefreshKind::nothing().with_memory(MemoryRefreshKind::nothing().with_ram()),
        );
        Self {
            counters: Arc::new(ProcessCounterManager::new(
                backend,
                PROCESS_PRIVATE_MEMORY,
                settings.instance_ttl,
            )),
            system: Arc::new(Mutex::new(system)),
            settings,
        }
    }
}

#[async_trait]
impl MetricProvider for MemoryMetricProvider {
    fn metric_id(&self) -> &str {
        "memory"
    }

    fn display_name(&self) -> &str {
        "Memory Usage"
    }

    fn unit(&self) -> &str {
        "MB"
    }

    fn metric_type(&self) -> MetricType {
        MetricType::Size
    }

    fn is_supported(&self) -> bool {
        self.counters.is_supported()
    }

    async fn collect(&self, target: &ProcessTarget) -> MetricValue {
        if !self.is_supported() {
            return MetricValue::error("Not supported");
        }
        let result = read_process_counter(&self.counters, self.settings, target)
            .await
            .map(|bytes| round1(bytes.max(0.0) / BYTES_PER_MB));
        to_metric_value(result, self.unit(), self.display_name(), self.metric_id(), target.pid)
    }

    async fn get_system_total(&self) -> f64 {
        let system = Arc::clone(&self.system);
        let result = blocking(move || {
            let mut system = system.lock();
            system.refresh_memory();
            Ok(round1(system.used_memory() as f64 / BYTES_PER_MB))
        })
        .await;

        result.unwrap_or_else(|e| {
            log::debug!("System memory read failed: {}", e);
            0.0
        })
    }
}
