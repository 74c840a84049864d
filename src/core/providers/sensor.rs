//! Hybrid providers: system totals from the hardware sensor cache,
//! per-process readings from a counter-based delegate

use async_trait::async_trait;
use std::sync::Arc;

use super::{blocking, MetricProvider, ProcessTarget, VramCapable};
use crate::core::metrics::{round1, MetricType, MetricValue, VramMetrics};
use crate::core::sensors::{HardwareType, SensorCache, SensorReading, SensorType};

/// Per-engine load sensor names, checked before whole-GPU ones
pub const GPU_ENGINE_SENSORS: [&str; 8] = [
    "D3D 3D",
    "D3D Compute",
    "D3D Copy",
    "D3D Video",
    "Graphics",
    "Compute",
    "Copy",
    "Video",
];

pub const GPU_CORE_SENSORS: [&str; 3] = ["GPU Core", "GPU Usage", "GPU Load"];

const VRAM_USED_SENSORS: [&str; 3] = ["Memory Used", "GPU Memory Used", "D3D Memory Dedicated"];
const VRAM_TOTAL_SENSORS: [&str; 2] = ["Memory Total", "GPU Memory Total"];

fn contains_any(name: &str, patterns: &[&str]) -> bool {
    let name = name.to_lowercase();
    patterns.iter().any(|p| name.contains(&p.to_lowercase()))
}

fn max_positive<'a, I>(readings: I) -> Option<f32>
where
    I: Iterator<Item = &'a SensorReading>,
{
    readings
        .map(|r| r.value)
        .filter(|v| *v > 0.0)
        .fold(None, |max, v| Some(max.map_or(v, |m: f32| m.max(v))))
}

/// GPU load: busiest engine sensor, then busiest core sensor, then any load sensor
pub fn pick_gpu_load(readings: &[SensorReading]) -> Option<f32> {
    max_positive(
        readings
            .iter()
            .filter(|r| contains_any(&r.sensor_name, &GPU_ENGINE_SENSORS)),
    )
    .or_else(|| {
        max_positive(
            readings
                .iter()
                .filter(|r| contains_any(&r.sensor_name, &GPU_CORE_SENSORS)),
        )
    })
    .or_else(|| max_positive(readings.iter()))
}

/// Used and total VRAM in MB from named GPU memory sensors
pub fn pick_vram(cache: &SensorCache) -> VramMetrics {
    let find = |patterns: &[&str], sensor: SensorType| {
        HardwareType::GPUS.iter().find_map(|hw| {
            patterns.iter().find_map(|pattern| {
                cache
                    .get_sensor_value_by_name(*hw, sensor, pattern)
                    .filter(|v| *v > 0.0)
            })
        })
    };
    let any = |sensor: SensorType| {
        HardwareType::GPUS
            .iter()
            .find_map(|hw| cache.get_sensor_value(*hw, sensor).filter(|v| *v > 0.0))
    };

    let used = find(&VRAM_USED_SENSORS, SensorType::SmallData).or_else(|| any(SensorType::SmallData));
    let total = find(&VRAM_TOTAL_SENSORS, SensorType::SmallData).or_else(|| any(SensorType::Data));

    VramMetrics::new(
        round1(used.unwrap_or(0.0) as f64),
        round1(total.unwrap_or(0.0) as f64),
    )
}

/// Which system total a [`HybridSensorProvider`] reads from the sensor cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorMetric {
    /// CPU load, percent
    Cpu,
    /// Memory load, percent
    Memory,
    /// Busiest GPU load sensor, percent
    Gpu,
    /// VRAM in use, MB
    Vram,
}

impl SensorMetric {
    fn display_name(self) -> &'static str {
        match self {
            SensorMetric::Cpu => "CPU Usage (sensors)",
            SensorMetric::Memory => "Memory Usage (sensors)",
            SensorMetric::Gpu => "GPU Usage (sensors)",
            SensorMetric::Vram => "VRAM Usage (sensors)",
        }
    }

    fn read(self, cache: &SensorCache) -> Option<f32> {
        match self {
            SensorMetric::Cpu => cache
                .get_sensor_value(HardwareType::Cpu, SensorType::Load)
                .map(|v| v.clamp(0.0, 100.0)),
            SensorMetric::Memory => {
                cache.get_sensor_value_by_name(HardwareType::Memory, SensorType::Load, "Memory")
            }
            SensorMetric::Gpu => {
                let loads = cache.get_sensor_values(&HardwareType::GPUS, SensorType::Load);
                pick_gpu_load(&loads)
            }
            SensorMetric::Vram => {
                let used = pick_vram(cache).used as f32;
                (used > 0.0).then_some(used)
            }
        }
    }
}

/// System total from the sensor cache, per-process readings from `process`
///
/// Identity (id, unit, type) is the delegate's, so a hybrid provider can
/// replace its counter-based counterpart in a registry.
pub struct HybridSensorProvider {
    metric: SensorMetric,
    sensors: Arc<SensorCache>,
    process: Arc<dyn MetricProvider>,
}

impl HybridSensorProvider {
    pub fn new(
        metric: SensorMetric,
        sensors: Arc<SensorCache>,
        process: Arc<dyn MetricProvider>,
    ) -> Self {
        Self {
            metric,
            sensors,
            process,
        }
    }

    pub fn metric(&self) -> SensorMetric {
        self.metric
    }
}

#[async_trait]
impl MetricProvider for HybridSensorProvider {
    fn metric_id(&self) -> &str {
        self.process.metric_id()
    }

    fn display_name(&self) -> &str {
        self.metric.display_name()
    }

    fn unit(&self) -> &str {
        self.process.unit()
    }

    fn metric_type(&self) -> MetricType {
        self.process.metric_type()
    }

    fn is_supported(&self) -> bool {
        self.sensors.is_available()
    }

    async fn collect(&self, target: &ProcessTarget) -> MetricValue {
        self.process.collect(target).await
    }

    async fn get_system_total(&self) -> f64 {
        if !self.sensors.is_available() {
            return 0.0;
        }
        let sensors = Arc::clone(&self.sensors);
        let metric = self.metric;
        blocking(move || Ok(metric.read(&sensors)))
            .await
            .ok()
            .flatten()
            .map_or(0.0, |v| round1(v as f64))
    }

    fn as_vram(&self) -> Option<&dyn VramCapable> {
        (self.metric == SensorMetric::Vram).then_some(self as &dyn VramCapable)
    }
}

#[async_trait]
impl VramCapable for HybridSensorProvider {
    async fn get_vram_metrics(&self) -> Option<VramMetrics> {
        if self.metric != SensorMetric::Vram || !self.sensors.is_available() {
            return None;
        }
        let sensors = Arc::clone(&self.sensors);
        blocking(move || Ok(pick_vram(&sensors)))
            .await
            .ok()
            .filter(|metrics| metrics.total > 0.0)
    }
}
