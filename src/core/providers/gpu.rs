use async_trait::async_trait;
use std::sync::Arc;

use super::{
    blocking, read_process_counter, to_metric_value, CounterSettings, MetricProvider,
    ProcessTarget,
};
use crate::core::counters::{CounterBackend, ProcessCounterManager, GPU_ENGINE_UTILIZATION};
use crate::core::gpu::GpuTelemetryEngine;
use crate::core::metrics::{round1, MetricType, MetricValue};

/// Per-process GPU from `GPU Engine` counters, system GPU from node sampling
pub struct GpuMetricProvider {
    counters: Arc<ProcessCounterManager>,
    engine: Arc<GpuTelemetryEngine>,
    settings: CounterSettings,
}

impl GpuMetricProvider {
    pub fn new(
        backend: Arc<dyn CounterBackend>,
        engine: Arc<GpuTelemetryEngine>,
        settings: CounterSettings,
    ) -> Self {
        Self {
            counters: Arc::new(ProcessCounterManager::new(
                backend,
                GPU_ENGINE_UTILIZATION,
                settings.instance_ttl,
            )),
            engine,
            settings,
        }
    }
}

#[async_trait]
impl MetricProvider for GpuMetricProvider {
    fn metric_id(&self) -> &str {
        "gpu"
    }

    fn display_name(&self) -> &str {
        "GPU Usage"
    }

    fn unit(&self) -> &str {
        "%"
    }

    fn metric_type(&self) -> MetricType {
        MetricType::Percentage
    }

    fn is_supported(&self) -> bool {
        self.engine.is_available() || self.counters.is_supported()
    }

    async fn collect(&self, target: &ProcessTarget) -> MetricValue {
        if !self.counters.is_supported() {
            return MetricValue::error("Not supported");
        }
        // Engine utilizations add up across engine types
        let result = read_process_counter(&self.counters, self.settings, target)
            .await
            .map(|sum| round1(sum.clamp(0.0, 100.0)));
        to_metric_value(result, self.unit(), self.display_name(), self.metric_id(), target.pid)
    }

    async fn get_system_total(&self) -> f64 {
        if !self.engine.is_available() {
            return 0.0;
        }
        let engine = Arc::clone(&self.engine);
        match blocking(move || engine.get_gpu_usage()).await {
            Ok(usage) => round1(usage),
            Err(e) => {
                log::debug!("System GPU sampling failed: {}", e);
                0.0
            }
        }
    }
}
