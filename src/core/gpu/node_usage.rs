//! Running-time baselines for GPU scheduler nodes

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::Luid;

/// Node running time is reported in 100ns ticks
pub const TICKS_PER_MS: f64 = 10_000.0;

/// Deltas over shorter wall-clock spans are too noisy to report
pub const MIN_SAMPLE_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeKey {
    pub luid: Luid,
    pub node: u32,
}

impl NodeKey {
    pub fn new(luid: Luid, node: u32) -> Self {
        Self { luid, node }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeSample {
    /// No previous reading, or the counter went backwards
    Baseline,
    Usage(f64),
    /// Not enough wall time since the previous reading; baseline kept
    TooSoon,
}

impl NodeSample {
    /// Percentage to report for this sample, if any
    pub fn percent(&self) -> Option<f64> {
        match self {
            NodeSample::Baseline => Some(0.0),
            NodeSample::Usage(value) => Some(*value),
            NodeSample::TooSoon => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct NodeUsageTracker {
    last: Mutex<HashMap<NodeKey, (u64, Instant)>>,
}

impl NodeUsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, key: NodeKey, ticks: u64, at: Instant) -> NodeSample {
        let mut last = self.last.lock();

        let Some(&(prev_ticks, prev_at)) = last.get(&key) else {
            last.insert(key, (ticks, at));
            return NodeSample::Baseline;
        };

        if ticks < prev_ticks {
            log::debug!(
                "GPU node {} on {} reset ({} -> {}), re-baselining",
                key.node,
                key.luid,
                prev_ticks,
                ticks
            );
            last.insert(key, (ticks, at));
            return NodeSample::Baseline;
        }

        let elapsed = at.saturating_duration_since(prev_at);
        if elapsed < MIN_SAMPLE_INTERVAL {
            return NodeSample::TooSoon;
        }

        last.insert(key, (ticks, at));
        NodeSample::Usage(usage_percent(ticks - prev_ticks, elapsed))
    }

    pub fn len(&self) -> usize {
        self.last.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.last.lock().is_empty()
    }

    pub fn clear(&self) {
        self.last.lock().clear();
    }
}

/// Busy share of a wall-clock span, clamped to 0..=100
pub fn usage_percent(delta_ticks: u64, wall: Duration) -> f64 {
    let wall_ms = wall.as_secs_f64() * 1000.0;
    if wall_ms <= 0.0 {
        return 0.0;
    }
    let busy_ms = delta_ticks as f64 / TICKS_PER_MS;
    (busy_ms * 100.0 / wall_ms).clamp(0.0, 100.0)
}
