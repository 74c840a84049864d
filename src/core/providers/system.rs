//! System-wide view over the registered providers

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use sysinfo::{MemoryRefreshKind, Networks, RefreshKind, System};

use super::{blocking, MetricProvider};
use crate::core::metrics::{round1, HardwareLimits, SystemUsage, VramMetrics, BYTES_PER_MB};
use crate::core::power::PowerProvider;

/// Adapter names that never carry physical traffic
const VIRTUAL_ADAPTER_KEYWORDS: [&str; 12] = [
    "vethernet",
    "hyper-v",
    "virtualbox",
    "vmware",
    "tap-",
    "vpn",
    "loopback",
    "pseudo",
    "wireguard",
    "docker",
    "veth",
    "lo",
];

pub fn is_virtual_adapter(name: &str) -> bool {
    let name = name.to_lowercase();
    VIRTUAL_ADAPTER_KEYWORDS.iter().any(|keyword| {
        if *keyword == "lo" {
            name == "lo"
        } else {
            name.contains(keyword)
        }
    })
}

/// Providers keyed case-insensitively by metric id, in registration order
#[derive(Default)]
pub struct MetricRegistry {
    providers: Vec<Arc<dyn MetricProvider>>,
    index: HashMap<String, usize>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first provider registered for an id wins
    pub fn register(&mut self, provider: Arc<dyn MetricProvider>) -> bool {
        let id = provider.metric_id().trim().to_lowercase();
        if id.is_empty() {
            log::warn!("Provider '{}' has an empty metric id", provider.display_name());
            return false;
        }
        if self.index.contains_key(&id) {
            log::warn!("Duplicate metric id ignored: {}", id);
            return false;
        }
        self.index.insert(id, self.providers.len());
        self.providers.push(provider);
        true
    }

    pub fn from_providers<I>(providers: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn MetricProvider>>,
    {
        let mut registry = Self::new();
        for provider in providers {
            registry.register(provider);
        }
        registry
    }

    pub fn get(&self, metric_id: &str) -> Option<&Arc<dyn MetricProvider>> {
        self.index
            .get(&metric_id.trim().to_lowercase())
            .map(|&i| &self.providers[i])
    }

    pub fn providers(&self) -> &[Arc<dyn MetricProvider>] {
        &self.providers
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[derive(Default)]
struct NetworkSampler {
    networks: Option<Networks>,
    last: HashMap<String, (u64, u64)>,
    last_at: Option<Instant>,
}

impl NetworkSampler {
    /// (upload, download) in bytes per second since the previous call; zero on the first
    fn sample(&mut self) -> (f64, f64) {
        let networks = self
            .networks
            .get_or_insert_with(Networks::new_with_refreshed_list);
        networks.refresh(true);

        let now = Instant::now();
        let elapsed = self
            .last_at
            .map(|t| now.duration_since(t).as_secs_f64())
            .filter(|secs| *secs > 0.0);

        let mut upload = 0u64;
        let mut download = 0u64;
        let mut current = HashMap::new();
        for (name, data) in networks.iter() {
            if is_virtual_adapter(name) {
                continue;
            }
            let totals = (data.total_transmitted(), data.total_received());
            if let Some((prev_tx, prev_rx)) = self.last.get(name) {
                upload += totals.0.saturating_sub(*prev_tx);
                download += totals.1.saturating_sub(*prev_rx);
            }
            current.insert(name.to_string(), totals);
        }

        self.last = current;
        self.last_at = Some(now);
        match elapsed {
            Some(secs) => (upload as f64 / secs, download as f64 / secs),
            None => (0.0, 0.0),
        }
    }
}

/// Combines registered providers into hardware limits and system usage
pub struct SystemMetricAggregator {
    registry: MetricRegistry,
    power: Option<Arc<dyn PowerProvider>>,
    system: Arc<Mutex<System>>,
    network: Arc<Mutex<NetworkSampler>>,
}

impl SystemMetricAggregator {
    pub fn new(registry: MetricRegistry, power: Option<Arc<dyn PowerProvider>>) -> Self {
        let system = System::new_with_specifics(
            RefreshKind::nothing().with_memory(MemoryRefreshKind::nothing().with_ram()),
        );
        Self {
            registry,
            power,
            system: Arc::new(Mutex::new(system)),
            network: Arc::new(Mutex::new(NetworkSampler::default())),
        }
    }

    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    /// (total, used) physical memory in MB
    async fn memory_mb(&self) -> (f64, f64) {
        let system = Arc::clone(&self.system);
        blocking(move || {
            let mut system = system.lock();
            system.refresh_memory();
            Ok((
                round1(system.total_memory() as f64 / BYTES_PER_MB),
                round1(system.used_memory() as f64 / BYTES_PER_MB),
            ))
        })
        .await
        .unwrap_or((0.0, 0.0))
    }

    async fn vram_metrics(&self) -> Option<VramMetrics> {
        let provider = self.registry.get("vram")?;
        provider.as_vram()?.get_vram_metrics().await
    }

    pub async fn hardware_limits(&self) -> HardwareLimits {
        let (max_memory, _) = self.memory_mb().await;
        let max_vram = match self.vram_metrics().await {
            Some(metrics) if metrics.total > 0.0 => metrics.total,
            _ => match self.registry.get("vram") {
                Some(provider) => provider.get_system_total().await,
                None => 0.0,
            },
        };
        HardwareLimits {
            max_memory,
            max_vram,
        }
    }

    async fn total_of(&self, metric_id: &str) -> f64 {
        match self.registry.get(metric_id) {
            Some(provider) => provider.get_system_total().await,
            None => 0.0,
        }
    }

    async fn vram_used(&self) -> f64 {
        match self.vram_metrics().await {
            Some(metrics) => metrics.used,
            None => self.total_of("vram").await,
        }
    }

    async fn power_status(&self) -> Option<crate::core::power::PowerStatus> {
        match &self.power {
            Some(power) if power.is_supported() => power.get_status().await,
            _ => None,
        }
    }

    /// Polls every source concurrently; missing sources read as 0
    pub async fn system_usage(&self) -> SystemUsage {
        let (total_cpu, total_gpu, total_vram, (_, total_memory), power) = tokio::join!(
            self.total_of("cpu"),
            self.total_of("gpu"),
            self.vram_used(),
            self.memory_mb(),
            self.power_status(),
        );

        let network = Arc::clone(&self.network);
        let (upload_speed, download_speed) = blocking(move || Ok(network.lock().sample()))
            .await
            .unwrap_or((0.0, 0.0));

        SystemUsage {
            total_cpu,
            total_gpu,
            total_memory,
            total_vram,
            upload_speed: upload_speed.round(),
            download_speed: download_speed.round(),
            power,
            timestamp: Utc::now(),
        }
    }
}
