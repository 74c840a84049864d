// Command handlers module
pub mod config;
pub mod gpu;
pub mod power;
pub mod process;
pub mod sensors;
pub mod snapshot;

use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;

use crate::core::counters::CounterBackend;
use crate::core::gpu::GpuTelemetryEngine;
use crate::core::power::{CommandRyzenAdj, NullPowerProvider, PowerProvider, RyzenAdjPowerProvider};
use crate::core::providers::{default_providers, MetricProvider};
use crate::core::sensors::SensorCache;
use crate::core::MonitorConfig;

/// Runs a command body on a fresh multi-threaded runtime
pub fn block_on<F, T>(future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .thread_name("xhmonitor-worker")
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(future)
}

/// Everything a command needs, built once from the config
pub struct Telemetry {
    pub config: MonitorConfig,
    pub backend: Arc<dyn CounterBackend>,
    pub engine: Arc<GpuTelemetryEngine>,
    pub sensors: Arc<SensorCache>,
}

impl Telemetry {
    pub fn open(config: MonitorConfig) -> Self {
        let mut engine = GpuTelemetryEngine::new(config.gpu_sample_interval());
        if !engine.initialize() {
            log::warn!("GPU telemetry unavailable; GPU and VRAM fall back to counters");
        }

        let sensors = SensorCache::new(
            crate::platform::sensor_tree(),
            config.sensor_snapshot_ttl(),
        );

        Self {
            backend: crate::platform::counter_backend(),
            engine: Arc::new(engine),
            sensors: Arc::new(sensors),
            config,
        }
    }

    pub fn providers(&self) -> Vec<Arc<dyn MetricProvider>> {
        default_providers(
            Arc::clone(&self.backend),
            Arc::clone(&self.engine),
            Some(Arc::clone(&self.sensors)),
            &self.config,
        )
    }

    /// RyzenAdj when the executable is found, the null provider otherwise
    pub fn power(&self) -> Arc<dyn PowerProvider> {
        let cli = CommandRyzenAdj::from_config(&self.config.power);
        if cli.executable().is_none() {
            return Arc::new(NullPowerProvider);
        }
        Arc::new(RyzenAdjPowerProvider::from_config(
            Arc::new(cli),
            &self.config.power,
        ))
    }
}
