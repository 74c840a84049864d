use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use super::{
    blocking, read_process_counter, to_metric_value, CounterSettings, MetricProvider,
    ProcessTarget,
};
use crate::core::counters::{CounterBackend, CounterPath, CounterReader, ProcessCounterManager, PROCESS_CPU};
use crate::core::metrics::{round1, MetricType, MetricValue};

/// A rate counter's first value needs a second sample this far after the first
const WARMUP: Duration = Duration::from_millis(100);

/// Per-process CPU from `Process\% Processor Time`, system CPU from `Processor(_Total)`
pub struct CpuMetricProvider {
    backend: Arc<dyn CounterBackend>,
    counters: Arc<ProcessCounterManager>,
    total: Arc<Mutex<Option<Box<dyn CounterReader>>>>,
    logical_cpus: f64,
    settings: CounterSettings,
}

impl CpuMetricProvider {
    pub fn new(backend: Arc<dyn CounterBackend>, settings: CounterSettings) -> Self {
        let logical_cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1) as f64;
        Self::with_cpu_count(backend, settings, logical_cpus)
    }

    pub fn with_cpu_count(
        backend: Arc<dyn CounterBackend>,
        settings: CounterSettings,
        logical_cpus: f64,
    ) -> Self {
        Self {
            counters: Arc::new(ProcessCounterManager::new(
                Arc::clone(&backend),
                PROCESS_CPU,
                settings.instance_ttl,
            )),
            backend,
            total: Arc::new(Mutex::new(None)),
            logical_cpus: logical_cpus.max(1.0),
            settings,
        }
    }
}

/// `% Processor Time` is per core; scale to the whole machine
pub fn process_cpu_percent(raw: f64, logical_cpus: f64) -> f64 {
    round1((raw / logical_cpus.max(1.0)).clamp(0.0, 100.0))
}

#[async_trait]
impl MetricProvider for CpuMetricProvider {
    fn metric_id(&self) -> &str {
        "cpu"
    }

    fn display_name(&self) -> &str {
        "CPU Usage"
    }

    fn unit(&self) -> &str {
        "%"
    }

    fn metric_type(&self) -> MetricType {
        MetricType::Percentage
    }

    fn is_supported(&self) -> bool {
        self.counters.is_supported()
    }

    async fn collect(&self, target: &ProcessTarget) -> MetricValue {
        if !self.is_supported() {
            return MetricValue::error("Not supported");
        }
        let cpus = self.logical_cpus;
        let result = read_process_counter(&self.counters, self.settings, target)
            .await
            .map(|raw| process_cpu_percent(raw, cpus));
        to_metric_value(result, self.unit(), self.display_name(), self.metric_id(), target.pid)
    }

    async fn get_system_total(&self) -> f64 {
        let backend = Arc::clone(&self.backend);
        let total = Arc::clone(&self.total);
        let result = blocking(move || {
            let mut slot = total.lock();
            if slot.is_none() {
                let path = CounterPath::new("Processor", Some("_Total"), "% Processor Time");
                *slot = Some(backend.open(&path)?);
                std::thread::sleep(WARMUP);
            }
            match slot.as_mut() {
                Some(reader) => match reader.next_value() {
                    Ok(value) => Ok(value),
                    Err(e) => {
                        // Reopen on the next call
                        *slot = None;
                        Err(e)
                    }
                },
                None => Ok(0.0),
            }
        })
        .await;

        match result {
            Ok(value) => round1(value.clamp(0.0, 100.0)),
            Err(e) => {
                log::debug!("System CPU read failed: {}", e);
                0.0
            }
        }
    }
}
