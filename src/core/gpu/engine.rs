use std::time::{Duration, Instant};

use super::node_usage::{NodeKey, NodeSample, NodeUsageTracker};
use super::{AdapterDescriptor, GpuQuery, Luid, SegmentGroup};
use crate::core::metrics::{bytes_to_mb, VramMetrics};
use crate::error::{Result, TelemetryError};

/// Summed local-segment VRAM across adapters, in bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VramUsage {
    pub used: u64,
    pub budget: u64,
}

impl VramUsage {
    /// MB conversion happens here and nowhere earlier
    pub fn to_metrics(self) -> VramMetrics {
        VramMetrics::new(bytes_to_mb(self.used), bytes_to_mb(self.budget))
    }
}

/// Derives GPU utilization and VRAM totals from a [`GpuQuery`] backend
///
/// Usage is the busiest scheduler node across all hardware adapters. Each
/// pass reads every node twice, `sample_interval` apart.
pub struct GpuTelemetryEngine {
    query: Option<Box<dyn GpuQuery>>,
    tracker: NodeUsageTracker,
    sample_interval: Duration,
}

impl GpuTelemetryEngine {
    pub fn new(sample_interval: Duration) -> Self {
        Self {
            query: None,
            tracker: NodeUsageTracker::new(),
            sample_interval,
        }
    }

    pub fn with_query(query: Box<dyn GpuQuery>, sample_interval: Duration) -> Self {
        Self {
            query: Some(query),
            tracker: NodeUsageTracker::new(),
            sample_interval,
        }
    }

    /// Opens the native layer. Failure leaves the engine unavailable.
    pub fn initialize(&mut self) -> bool {
        if self.query.is_some() {
            return true;
        }

        match crate::platform::open_gpu_query() {
            Ok(query) => {
                log::info!(
                    "GPU query layer ready with {} adapter(s)",
                    query.adapters().len()
                );
                self.query = Some(query);
                true
            }
            Err(e) => {
                log::warn!("GPU query layer unavailable: {}", e);
                false
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.query.is_some()
    }

    pub fn adapters(&self) -> &[AdapterDescriptor] {
        self.query.as_ref().map(|q| q.adapters()).unwrap_or(&[])
    }

    fn query(&self) -> Result<&dyn GpuQuery> {
        self.query
            .as_deref()
            .ok_or_else(|| TelemetryError::not_supported("GPU query layer not initialized"))
    }

    /// Local-segment usage summed over adapters; `None` when no adapter reports a budget
    pub fn get_vram_usage(&self) -> Option<VramMetrics> {
        self.vram_usage_bytes().map(VramUsage::to_metrics)
    }

    pub fn vram_usage_bytes(&self) -> Option<VramUsage> {
        let query = self.query().ok()?;

        let mut total = VramUsage::default();
        for adapter in query.adapters() {
            match query.query_video_memory(adapter.index, SegmentGroup::Local) {
                Ok(info) => {
                    total.used += info.current_usage;
                    total.budget += info.budget;
                }
                Err(e) => log::debug!("VRAM query failed for {}: {}", adapter.name, e),
            }
        }

        if total.budget == 0 {
            None
        } else {
            Some(total)
        }
    }

    /// Busiest node's utilization across hardware adapters
    ///
    /// Blocks for `sample_interval`. A node that fails to read is left out of
    /// the maximum; if nothing could be sampled the result is 0.
    pub fn get_gpu_usage(&self) -> Result<f64> {
        let query = self.query()?;
        let nodes = self.sampled_nodes(query);
        if nodes.is_empty() {
            return Ok(0.0);
        }

        let t0 = Instant::now();
        let mut first: Vec<Option<NodeSample>> = Vec::with_capacity(nodes.len());
        for key in &nodes {
            first.push(
                query
                    .node_running_time(key.luid, key.node)
                    .map(|ticks| self.tracker.observe(*key, ticks, t0))
                    .map_err(|e| log::debug!("Node {} T0 read failed: {}", key.node, e))
                    .ok(),
            );
        }

        std::thread::sleep(self.sample_interval);

        let t1 = Instant::now();
        let mut busiest: Option<f64> = None;
        for (key, before) in nodes.iter().zip(first) {
            let after = match query.node_running_time(key.luid, key.node) {
                Ok(ticks) => self.tracker.observe(*key, ticks, t1),
                Err(e) => {
                    log::debug!("Node {} T1 read failed: {}", key.node, e);
                    continue;
                }
            };

            // A node that was only just baselined has no delta this pass
            let percent = match before {
                Some(NodeSample::Baseline) => Some(0.0),
                _ => after.percent(),
            };

            if let Some(percent) = percent {
                busiest = Some(busiest.map_or(percent, |max| max.max(percent)));
            }
        }

        Ok(busiest.unwrap_or(0.0))
    }

    fn sampled_nodes(&self, query: &dyn GpuQuery) -> Vec<NodeKey> {
        let mut nodes = Vec::new();

        for adapter in query.adapters() {
            if adapter.is_fallback_device() {
                continue;
            }

            let luid = match query.resolve_luid(adapter.index) {
                Ok(luid) if !luid.is_zero() => luid,
                Ok(_) => continue,
                Err(e) => {
                    log::debug!("Skipping {}: LUID lookup failed: {}", adapter.name, e);
                    continue;
                }
            };

            let node_count = match query.node_count(luid) {
                Ok(count) => count,
                Err(e) => {
                    log::debug!("Skipping {}: node count failed: {}", adapter.name, e);
                    continue;
                }
            };

            nodes.extend((0..node_count).map(|node| NodeKey::new(luid, node)));
        }

        nodes
    }

    /// Largest per-adapter sum of bytes resident in local segments
    pub fn get_dedicated_resident_bytes(&self) -> Option<u64> {
        let query = self.query().ok()?;

        query
            .adapters()
            .iter()
            .filter(|adapter| !adapter.is_fallback_device())
            .filter_map(|adapter| {
                let luid: Luid = query.resolve_luid(adapter.index).ok()?;
                let segments = query.segment_usage(luid).ok()?;
                Some(
                    segments
                        .iter()
                        .filter(|s| s.group == SegmentGroup::Local)
                        .map(|s| s.bytes_resident)
                        .sum::<u64>(),
                )
            })
            .max()
    }

    /// Releases the native layer. Idempotent.
    pub fn shutdown(&mut self) {
        if self.query.take().is_some() {
            self.tracker.clear();
            log::debug!("GPU query layer released");
        }
    }
}
