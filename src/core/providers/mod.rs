//! Metric providers consumed by the polling layer
//!
//! Every provider answers the same contract: a per-process reading and a
//! system-level total. Neither call ever fails; faults become
//! [`MetricValue::error`] or `0.0`.
//!
//! Hybrid providers (`sensor` module) take system totals from the hardware
//! sensor cache and hand per-process collection to a counter-based provider,
//! so the two paths degrade independently.

pub mod cpu;
pub mod gpu;
pub mod memory;
pub mod sensor;
pub mod system;
pub mod vram;

pub use cpu::CpuMetricProvider;
pub use gpu::GpuMetricProvider;
pub use memory::MemoryMetricProvider;
pub use sensor::{HybridSensorProvider, SensorMetric};
pub use system::{MetricRegistry, SystemMetricAggregator};
pub use vram::{CounterVramProvider, DxgiVramProvider};

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::core::counters::{counter_process_name, CounterBackend, ProcessCounterManager};
use crate::core::gpu::GpuTelemetryEngine;
use crate::core::metrics::{MetricType, MetricValue, VramMetrics};
use crate::core::sensors::SensorCache;
use crate::error::Result;

/// The process a per-process reading is for
///
/// Counter instances are named after the executable, so the name is needed
/// alongside the PID to find them. A trailing `.exe` is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessTarget {
    pub pid: u32,
    pub name: String,
}

impl ProcessTarget {
    pub fn new(pid: u32, name: &str) -> Self {
        Self {
            pid,
            name: counter_process_name(name.trim()).to_string(),
        }
    }
}

#[async_trait]
pub trait MetricProvider: Send + Sync {
    /// Stable identifier such as `cpu` or `vram`
    fn metric_id(&self) -> &str;
    fn display_name(&self) -> &str;
    fn unit(&self) -> &str;
    fn metric_type(&self) -> MetricType;
    fn is_supported(&self) -> bool;

    /// Per-process reading. Never fails; faults come back as an error value.
    async fn collect(&self, target: &ProcessTarget) -> MetricValue;

    /// System-wide usage (percentages) or capacity/usage (sizes). 0 on fault.
    async fn get_system_total(&self) -> f64;

    /// VRAM breakdown, for providers that have one
    fn as_vram(&self) -> Option<&dyn VramCapable> {
        None
    }
}

/// Optional capability of providers that can report used and total VRAM
#[async_trait]
pub trait VramCapable: Send + Sync {
    /// `None` when no source knows the capacity
    async fn get_vram_metrics(&self) -> Option<VramMetrics>;
}

/// Runs blocking native work on the blocking pool
pub(crate) async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

/// Turns a per-process read into the contract's value or error sentinel
pub(crate) fn to_metric_value(
    result: Result<f64>,
    unit: &str,
    display_name: &str,
    metric_id: &str,
    pid: u32,
) -> MetricValue {
    match result {
        Ok(value) => MetricValue::new(value, unit, display_name),
        Err(e) => {
            log::debug!("{} collection for pid {} failed: {}", metric_id, pid, e);
            MetricValue::error(e.to_string())
        }
    }
}

/// Shared tuning for the counter-based providers
#[derive(Debug, Clone, Copy)]
pub struct CounterSettings {
    pub instance_ttl: Duration,
    pub idle_eviction: Duration,
}

impl CounterSettings {
    pub fn from_config(config: &crate::core::config::MonitorConfig) -> Self {
        Self {
            instance_ttl: config.instance_cache_ttl(),
            idle_eviction: config.counter_idle_eviction(),
        }
    }
}

impl Default for CounterSettings {
    fn default() -> Self {
        Self {
            instance_ttl: Duration::from_secs(5),
            idle_eviction: Duration::from_secs(60),
        }
    }
}

/// Reads one per-process counter off the async runtime and closes the cycle
pub(crate) async fn read_process_counter(
    counters: &Arc<ProcessCounterManager>,
    settings: CounterSettings,
    target: &ProcessTarget,
) -> Result<f64> {
    let counters = Arc::clone(counters);
    let pid = target.pid;
    let name = target.name.clone();
    blocking(move || {
        let result = counters.read(pid, &name);
        counters.end_cycle(settings.idle_eviction);
        result
    })
    .await
}

/// Every provider this machine can back, wired the way the polling layer uses them
///
/// Hybrid sensor providers are chosen for CPU, GPU and memory when the
/// sensor tree opened. VRAM always goes through DXGI with the counter chain
/// behind it.
pub fn default_providers(
    backend: Arc<dyn CounterBackend>,
    engine: Arc<GpuTelemetryEngine>,
    sensors: Option<Arc<SensorCache>>,
    config: &crate::core::config::MonitorConfig,
) -> Vec<Arc<dyn MetricProvider>> {
    let settings = CounterSettings::from_config(config);

    let cpu: Arc<dyn MetricProvider> =
        Arc::new(CpuMetricProvider::new(Arc::clone(&backend), settings));
    let memory: Arc<dyn MetricProvider> =
        Arc::new(MemoryMetricProvider::new(Arc::clone(&backend), settings));
    let gpu: Arc<dyn MetricProvider> = Arc::new(GpuMetricProvider::new(
        Arc::clone(&backend),
        Arc::clone(&engine),
        settings,
    ));
    let vram: Arc<dyn MetricProvider> = Arc::new(DxgiVramProvider::new(
        engine,
        CounterVramProvider::new(backend, settings, config.vram_capacity_override_mb),
    ));

    match sensors.filter(|cache| cache.initialize()) {
        Some(cache) => vec![
            Arc::new(HybridSensorProvider::new(SensorMetric::Cpu, Arc::clone(&cache), cpu)),
            Arc::new(HybridSensorProvider::new(
                SensorMetric::Memory,
                Arc::clone(&cache),
                memory,
            )),
            Arc::new(HybridSensorProvider::new(SensorMetric::Gpu, cache, gpu)),
            vram,
        ],
        None => vec![cpu, memory, gpu, vram],
    }
}
