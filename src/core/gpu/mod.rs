//! GPU telemetry: adapter-level VRAM budget and engine-node utilization
//!
//! The native side (DXGI and the kernel scheduler statistics) lives in
//! `platform::windows`; this module only sees it through [`GpuQuery`].

pub mod engine;
pub mod node_usage;

pub use engine::{GpuTelemetryEngine, VramUsage};
pub use node_usage::{NodeKey, NodeSample, NodeUsageTracker};

use serde::Serialize;
use std::fmt;

use crate::error::Result;

/// Locally unique adapter identifier assigned by the OS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Luid {
    pub low: u32,
    pub high: i32,
}

impl Luid {
    pub fn new(low: u32, high: i32) -> Self {
        Self { low, high }
    }

    pub fn is_zero(&self) -> bool {
        self.low == 0 && self.high == 0
    }
}

impl fmt::Display for Luid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}_0x{:08X}", self.high as u32, self.low)
    }
}

/// Local = dedicated VRAM, non-local = shared system memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SegmentGroup {
    Local,
    NonLocal,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdapterDescriptor {
    pub index: usize,
    pub name: String,
    pub luid: Luid,
    pub is_software: bool,
    pub dedicated_video_memory: u64,
}

/// Name DXGI gives the WARP fallback device
pub const BASIC_RENDER_DRIVER: &str = "Microsoft Basic Render Driver";

impl AdapterDescriptor {
    /// Software and basic-render fallback devices never carry real load
    pub fn is_fallback_device(&self) -> bool {
        self.is_software || self.name.eq_ignore_ascii_case(BASIC_RENDER_DRIVER)
    }
}

/// Budget and current usage of one memory segment group, in bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VideoMemoryInfo {
    pub budget: u64,
    pub current_usage: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentUsage {
    pub segment_id: u32,
    pub group: SegmentGroup,
    pub bytes_resident: u64,
}

/// Typed queries answered by the native GPU layer
///
/// Implementations own every native reference they hand out results for;
/// callers only see plain values.
pub trait GpuQuery: Send + Sync {
    fn adapters(&self) -> &[AdapterDescriptor];

    /// Re-reads the adapter description to confirm its LUID
    fn resolve_luid(&self, adapter: usize) -> Result<Luid>;

    fn query_video_memory(&self, adapter: usize, group: SegmentGroup) -> Result<VideoMemoryInfo>;

    fn node_count(&self, luid: Luid) -> Result<u32>;

    /// Monotonic running time of one scheduler node, in 100ns ticks
    fn node_running_time(&self, luid: Luid, node: u32) -> Result<u64>;

    fn segment_usage(&self, luid: Luid) -> Result<Vec<SegmentUsage>>;
}
