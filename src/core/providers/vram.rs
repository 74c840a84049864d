use async_trait::async_trait;
use once_cell::sync::OnceCell;
use std::sync::Arc;

use super::{
    blocking, read_process_counter, to_metric_value, CounterSettings, MetricProvider,
    ProcessTarget, VramCapable,
};
use crate::core::counters::{
    CounterBackend, CounterPath, ProcessCounterManager, GPU_PROCESS_DEDICATED,
};
use crate::core::gpu::GpuTelemetryEngine;
use crate::core::metrics::{bytes_to_mb, round1, MetricType, MetricValue, VramMetrics, BYTES_PER_MB};
use crate::error::Result;

const ADAPTER_MEMORY_CATEGORY: &str = "GPU Adapter Memory";
const DEDICATED_USAGE: &str = "Dedicated Usage";

/// VRAM from performance counters with capacity from the registry or WMI
///
/// Per-process usage sums `GPU Process Memory` instances tagged with the
/// PID. System usage sums `GPU Adapter Memory` over all adapters.
pub struct CounterVramProvider {
    backend: Arc<dyn CounterBackend>,
    counters: Arc<ProcessCounterManager>,
    settings: CounterSettings,
    capacity_override_mb: Option<f64>,
    capacity_mb: Arc<OnceCell<f64>>,
}

impl CounterVramProvider {
    pub fn new(
        backend: Arc<dyn CounterBackend>,
        settings: CounterSettings,
        capacity_override_mb: Option<f64>,
    ) -> Self {
        Self {
            counters: Arc::new(ProcessCounterManager::new(
                Arc::clone(&backend),
                GPU_PROCESS_DEDICATED,
                settings.instance_ttl,
            )),
            backend,
            settings,
            capacity_override_mb: capacity_override_mb.filter(|mb| *mb > 0.0),
            capacity_mb: Arc::new(OnceCell::new()),
        }
    }

    /// Installed VRAM in MB; a lookup that finds nothing is retried next time
    pub async fn capacity_mb(&self) -> f64 {
        if let Some(mb) = self.capacity_override_mb {
            return mb;
        }
        if let Some(mb) = self.capacity_mb.get() {
            return *mb;
        }

        let found = blocking(|| Ok(crate::platform::total_vram_mb()))
            .await
            .unwrap_or(0.0);
        if found > 0.0 {
            let _ = self.capacity_mb.set(found);
        }
        found
    }

    async fn adapter_dedicated_mb(&self) -> Result<f64> {
        let backend = Arc::clone(&self.backend);
        blocking(move || {
            let mut total = 0i64;
            for instance in backend.instance_names(ADAPTER_MEMORY_CATEGORY)? {
                let path = CounterPath::new(ADAPTER_MEMORY_CATEGORY, Some(&instance), DEDICATED_USAGE);
                match backend.open(&path).and_then(|mut reader| reader.raw_value()) {
                    Ok(bytes) => total += bytes.max(0),
                    Err(e) => log::debug!("Skipping {}: {}", path, e),
                }
            }
            Ok(round1(total as f64 / BYTES_PER_MB))
        })
        .await
    }
}

#[async_trait]
impl MetricProvider for CounterVramProvider {
    fn metric_id(&self) -> &str {
        "vram"
    }

    fn display_name(&self) -> &str {
        "VRAM Usage"
    }

    fn unit(&self) -> &str {
        "MB"
    }

    fn metric_type(&self) -> MetricType {
        MetricType::Size
    }

    fn is_supported(&self) -> bool {
        self.backend.category_exists(ADAPTER_MEMORY_CATEGORY) || self.counters.is_supported()
    }

    async fn collect(&self, target: &ProcessTarget) -> MetricValue {
        if !self.counters.is_supported() {
            return MetricValue::error("Not supported");
        }
        let result = read_process_counter(&self.counters, self.settings, target)
            .await
            .map(|bytes| round1(bytes.max(0.0) / BYTES_PER_MB));
        to_metric_value(result, self.unit(), self.display_name(), self.metric_id(), target.pid)
    }

    /// Dedicated VRAM in use across adapters, in MB
    async fn get_system_total(&self) -> f64 {
        if !self.backend.category_exists(ADAPTER_MEMORY_CATEGORY) {
            return 0.0;
        }
        self.adapter_dedicated_mb().await.unwrap_or_else(|e| {
            log::debug!("Adapter memory counters failed: {}", e);
            0.0
        })
    }

    fn as_vram(&self) -> Option<&dyn VramCapable> {
        Some(self)
    }
}

#[async_trait]
impl VramCapable for CounterVramProvider {
    async fn get_vram_metrics(&self) -> Option<VramMetrics> {
        let total = self.capacity_mb().await;
        if total <= 0.0 {
            return None;
        }
        let used = self.get_system_total().await;
        Some(VramMetrics::new(used, total))
    }
}

/// VRAM from the native GPU layer, falling back to [`CounterVramProvider`]
///
/// The native budget is used whenever it is positive. Per-process
/// collection always goes through the counters.
pub struct DxgiVramProvider {
    engine: Arc<GpuTelemetryEngine>,
    fallback: CounterVramProvider,
}

impl DxgiVramProvider {
    pub fn new(engine: Arc<GpuTelemetryEngine>, fallback: CounterVramProvider) -> Self {
        if !engine.is_available() {
            log::warn!("DXGI GPU monitoring not available, falling back to performance counters");
        }
        Self { engine, fallback }
    }

    async fn native_usage(&self) -> Option<crate::core::gpu::VramUsage> {
        if !self.engine.is_available() {
            return None;
        }
        let engine = Arc::clone(&self.engine);
        blocking(move || Ok(engine.vram_usage_bytes()))
            .await
            .ok()
            .flatten()
            .filter(|usage| usage.budget > 0)
    }
}

#[async_trait]
impl MetricProvider for DxgiVramProvider {
    fn metric_id(&self) -> &str {
        "vram"
    }

    fn display_name(&self) -> &str {
        "VRAM Usage"
    }

    fn unit(&self) -> &str {
        "MB"
    }

    fn metric_type(&self) -> MetricType {
        MetricType::Size
    }

    fn is_supported(&self) -> bool {
        self.engine.is_available() || self.fallback.is_supported()
    }

    async fn collect(&self, target: &ProcessTarget) -> MetricValue {
        self.fallback.collect(target).await
    }

    /// VRAM capacity in MB
    async fn get_system_total(&self) -> f64 {
        if let Some(usage) = self.native_usage().await {
            return bytes_to_mb(usage.budget);
        }
        self.fallback
            .get_vram_metrics()
            .await
            .map_or(0.0, |metrics| metrics.total)
    }

    fn as_vram(&self) -> Option<&dyn VramCapable> {
        Some(self)
    }
}

#[async_trait]
impl VramCapable for DxgiVramProvider {
    async fn get_vram_metrics(&self) -> Option<VramMetrics> {
        if let Some(usage) = self.native_usage().await {
            return Some(usage.to_metrics());
        }
        self.fallback.get_vram_metrics().await
    }
}
