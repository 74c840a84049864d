// Fakes for the native seams: GPU queries, sensor trees, performance counters, RyzenAdj

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use xhmonitor::core::counters::{CounterBackend, CounterPath, CounterReader};
use xhmonitor::core::gpu::{
    AdapterDescriptor, GpuQuery, Luid, SegmentGroup, SegmentUsage, VideoMemoryInfo,
};
use xhmonitor::core::power::{PowerScheme, RyzenAdjCli, RyzenAdjSnapshot};
use xhmonitor::core::sensors::{HardwareNode, HardwareTree, HardwareType, Sensor, SensorType};
use xhmonitor::error::{Result, TelemetryError};

// ---------------------------------------------------------------------------
// GPU

pub struct FakeNode {
    pub ticks: u64,
    /// Added to `ticks` on every read
    pub step: u64,
    pub failing: bool,
}

#[derive(Default)]
pub struct FakeGpu {
    pub adapters: Vec<AdapterDescriptor>,
    pub memory: HashMap<usize, VideoMemoryInfo>,
    pub nodes: Mutex<HashMap<(Luid, u32), FakeNode>>,
    pub node_counts: HashMap<Luid, u32>,
    pub segments: HashMap<Luid, Vec<SegmentUsage>>,
    pub running_time_reads: Mutex<HashMap<Luid, usize>>,
}

impl FakeGpu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn adapter(mut self, name: &str, luid: Luid, is_software: bool) -> Self {
        let index = self.adapters.len();
        self.adapters.push(AdapterDescriptor {
            index,
            name: name.to_string(),
            luid,
            is_software,
            dedicated_video_memory: 0,
        });
        self
    }

    pub fn memory(mut self, index: usize, budget: u64, current_usage: u64) -> Self {
        self.memory.insert(
            index,
            VideoMemoryInfo {
                budget,
                current_usage,
            },
        );
        self
    }

    pub fn node(self, luid: Luid, node: u32, start: u64, step: u64) -> Self {
        self.nodes.lock().insert(
            (luid, node),
            FakeNode {
                ticks: start,
                step,
                failing: false,
            },
        );
        let mut this = self;
        let count = this.node_counts.entry(luid).or_insert(0);
        *count = (*count).max(node + 1);
        this
    }

    pub fn failing_node(self, luid: Luid, node: u32) -> Self {
        let this = self.node(luid, node, 0, 0);
        if let Some(n) = this.nodes.lock().get_mut(&(luid, node)) {
            n.failing = true;
        }
        this
    }

    pub fn segments(mut self, luid: Luid, segments: Vec<SegmentUsage>) -> Self {
        self.segments.insert(luid, segments);
        self
    }

    pub fn set_ticks(&self, luid: Luid, node: u32, ticks: u64) {
        if let Some(n) = self.nodes.lock().get_mut(&(luid, node)) {
            n.ticks = ticks;
        }
    }

    pub fn reads_for(&self, luid: Luid) -> usize {
        self.running_time_reads.lock().get(&luid).copied().unwrap_or(0)
    }
}

/// Lets a test keep a handle on the fake after handing it to the engine
pub struct SharedGpu(pub Arc<FakeGpu>);

impl GpuQuery for SharedGpu {
    fn adapters(&self) -> &[AdapterDescriptor] {
        &self.0.adapters
    }

    fn resolve_luid(&self, adapter: usize) -> Result<Luid> {
        self.0
            .adapters
            .get(adapter)
            .map(|a| a.luid)
            .ok_or_else(|| TelemetryError::not_found("no such adapter"))
    }

    fn query_video_memory(&self, adapter: usize, group: SegmentGroup) -> Result<VideoMemoryInfo> {
        if group != SegmentGroup::Local {
            return Ok(VideoMemoryInfo::default());
        }
        self.0
            .memory
            .get(&adapter)
            .copied()
            .ok_or_else(|| TelemetryError::native("QueryVideoMemoryInfo", 0x887A0001))
    }

    fn node_count(&self, luid: Luid) -> Result<u32> {
        self.0
            .node_counts
            .get(&luid)
            .copied()
            .ok_or_else(|| TelemetryError::native("D3DKMTQueryStatistics", 0xC000000D))
    }

    fn node_running_time(&self, luid: Luid, node: u32) -> Result<u64> {
        *self.0.running_time_reads.lock().entry(luid).or_insert(0) += 1;
        let mut nodes = self.0.nodes.lock();
        let n = nodes
            .get_mut(&(luid, node))
            .ok_or_else(|| TelemetryError::not_found("no such node"))?;
        if n.failing {
            return Err(TelemetryError::native("D3DKMTQueryStatistics", 0xC0000001));
        }
        n.ticks += n.step;
        Ok(n.ticks)
    }

    fn segment_usage(&self, luid: Luid) -> Result<Vec<SegmentUsage>> {
        Ok(self.0.segments.get(&luid).cloned().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Sensor tree

pub struct FakeTree {
    pub opens: Arc<AtomicUsize>,
    pub updates: Arc<AtomicUsize>,
    pub fail_open: bool,
    pub update_delay: Duration,
    pub nodes: Vec<HardwareNode>,
    hardware: Vec<HardwareNode>,
}

impl FakeTree {
    pub fn new(nodes: Vec<HardwareNode>) -> Self {
        Self {
            opens: Arc::new(AtomicUsize::new(0)),
            updates: Arc::new(AtomicUsize::new(0)),
            fail_open: false,
            update_delay: Duration::ZERO,
            nodes,
            hardware: Vec::new(),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::new(Vec::new())
        }
    }
}

impl HardwareTree for FakeTree {
    fn open(&mut self) -> Result<()> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail_open {
            Err(TelemetryError::not_supported("driver missing"))
        } else {
            Ok(())
        }
    }

    fn update(&mut self) {
        if !self.update_delay.is_zero() {
            std::thread::sleep(self.update_delay);
        }
        let n = self.updates.fetch_add(1, Ordering::SeqCst) + 1;
        // Every update bumps the CPU load so refreshes are observable
        self.hardware = self
            .nodes
            .iter()
            .cloned()
            .map(|mut node| {
                if node.hardware_type == HardwareType::Cpu {
                    node.sensors
                        .push(Sensor::new(SensorType::Clock, "Update Count", Some(n as f32)));
                }
                node
            })
            .collect();
    }

    fn hardware(&self) -> &[HardwareNode] {
        &self.hardware
    }

    fn close(&mut self) {
        self.hardware.clear();
    }
}

pub fn sample_hardware() -> Vec<HardwareNode> {
    vec![
        HardwareNode::new(HardwareType::Cpu, "AMD Ryzen 7 7840HS")
            .with_sensor(Sensor::new(SensorType::Load, "CPU Total", Some(37.46)))
            .with_sensor(Sensor::new(SensorType::Temperature, "Core (Tctl/Tdie)", Some(61.0))),
        HardwareNode::new(HardwareType::Memory, "Generic Memory")
            .with_sensor(Sensor::new(SensorType::Load, "Memory", Some(52.3)))
            .with_sensor(Sensor::new(SensorType::Data, "Memory Used", Some(16.4))),
        HardwareNode::new(HardwareType::GpuAmd, "AMD Radeon 780M")
            .with_sensor(Sensor::new(SensorType::Load, "GPU Core", Some(12.0)))
            .with_sensor(Sensor::new(SensorType::Load, "D3D 3D", Some(44.0)))
            .with_sensor(Sensor::new(SensorType::Load, "D3D Video Decode", Some(8.0)))
            .with_sensor(Sensor::new(SensorType::SmallData, "GPU Memory Used", Some(1536.0)))
            .with_sensor(Sensor::new(SensorType::SmallData, "GPU Memory Total", Some(4096.0)))
            .with_sensor(Sensor::new(SensorType::Power, "GPU Package", None)),
    ]
}

// ---------------------------------------------------------------------------
// Performance counters

#[derive(Default)]
pub struct CounterState {
    pub instances: HashMap<String, Vec<String>>,
    /// Keyed by the counter path's display form
    pub values: HashMap<String, f64>,
    pub missing_categories: HashSet<String>,
}

#[derive(Default)]
pub struct FakeCounters {
    pub state: Arc<Mutex<CounterState>>,
    pub enumerations: AtomicUsize,
    pub opens: AtomicUsize,
}

impl FakeCounters {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_instances(&self, category: &str, names: &[&str]) {
        self.state.lock().instances.insert(
            category.to_string(),
            names.iter().map(|n| n.to_string()).collect(),
        );
    }

    pub fn set_value(&self, category: &str, instance: &str, counter: &str, value: f64) {
        let path = CounterPath::new(category, Some(instance), counter);
        self.state.lock().values.insert(path.to_string(), value);
    }

    pub fn remove_value(&self, category: &str, instance: &str, counter: &str) {
        let path = CounterPath::new(category, Some(instance), counter);
        self.state.lock().values.remove(&path.to_string());
    }

    /// A process instance with its `ID Process` companion
    pub fn add_process(&self, instance: &str, pid: u32, counter: &str, value: f64) {
        self.set_value("Process", instance, "ID Process", pid as f64);
        self.set_value("Process", instance, counter, value);
    }

    pub fn enumerations(&self) -> usize {
        self.enumerations.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

struct FakeReader {
    key: String,
    state: Arc<Mutex<CounterState>>,
}

impl FakeReader {
    fn current(&self) -> Result<f64> {
        self.state
            .lock()
            .values
            .get(&self.key)
            .copied()
            .ok_or_else(|| TelemetryError::not_found(format!("{} vanished", self.key)))
    }
}

impl CounterReader for FakeReader {
    fn next_value(&mut self) -> Result<f64> {
        self.current()
    }

    fn raw_value(&mut self) -> Result<i64> {
        self.current().map(|v| v as i64)
    }
}

impl CounterBackend for FakeCounters {
    fn category_exists(&self, category: &str) -> bool {
        !self.state.lock().missing_categories.contains(category)
    }

    fn instance_names(&self, category: &str) -> Result<Vec<String>> {
        self.enumerations.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .state
            .lock()
            .instances
            .get(category)
            .cloned()
            .unwrap_or_default())
    }

    fn open(&self, path: &CounterPath) -> Result<Box<dyn CounterReader>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let key = path.to_string();
        if !self.state.lock().values.contains_key(&key) {
            return Err(TelemetryError::not_found(format!("{} does not exist", key)));
        }
        Ok(Box::new(FakeReader {
            key,
            state: Arc::clone(&self.state),
        }))
    }
}

// ---------------------------------------------------------------------------
// RyzenAdj

pub fn snapshot(stapm_limit: f64, stapm_value: f64, fast_limit: f64, slow_limit: f64) -> RyzenAdjSnapshot {
    RyzenAdjSnapshot {
        stapm_limit,
        stapm_value,
        fast_limit,
        fast_value: 0.0,
        slow_limit,
        slow_value: 0.0,
    }
}

pub fn sample_snapshot() -> RyzenAdjSnapshot {
    RyzenAdjSnapshot {
        stapm_limit: 55000.0,
        stapm_value: 42000.0,
        fast_limit: 100000.0,
        fast_value: 80000.0,
        slow_limit: 55000.0,
        slow_value: 45000.0,
    }
}

/// Scripted CLI: snapshots are served from a queue, the last one repeating
pub struct FakeCli {
    pub available: bool,
    pub snapshots: Mutex<VecDeque<Result<RyzenAdjSnapshot>>>,
    pub last_snapshot: Mutex<Option<RyzenAdjSnapshot>>,
    pub apply_error: Mutex<Option<String>>,
    pub applied: Mutex<Vec<PowerScheme>>,
    pub snapshot_calls: AtomicUsize,
}

impl FakeCli {
    pub fn new(snapshots: Vec<Result<RyzenAdjSnapshot>>) -> Arc<Self> {
        Arc::new(Self {
            available: true,
            snapshots: Mutex::new(snapshots.into()),
            last_snapshot: Mutex::new(None),
            apply_error: Mutex::new(None),
            applied: Mutex::new(Vec::new()),
            snapshot_calls: AtomicUsize::new(0),
        })
    }

    pub fn always(snapshot: RyzenAdjSnapshot) -> Arc<Self> {
        Self::new(vec![Ok(snapshot)])
    }

    pub fn failing() -> Arc<Self> {
        Self::new(Vec::new())
    }

    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            available: false,
            snapshots: Mutex::new(VecDeque::new()),
            last_snapshot: Mutex::new(None),
            apply_error: Mutex::new(None),
            applied: Mutex::new(Vec::new()),
            snapshot_calls: AtomicUsize::new(0),
        })
    }

    pub fn fail_apply(&self, message: &str) {
        *self.apply_error.lock() = Some(message.to_string());
    }

    pub fn calls(&self) -> usize {
        self.snapshot_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RyzenAdjCli for FakeCli {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn get_snapshot(&self) -> Result<RyzenAdjSnapshot> {
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        let mut queue = self.snapshots.lock();
        let next = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().map(|r| match r {
                Ok(s) => Ok(*s),
                Err(e) => Err(TelemetryError::transient(e.to_string())),
            })
        };
        match next {
            Some(Ok(s)) => {
                *self.last_snapshot.lock() = Some(s);
                Ok(s)
            }
            Some(Err(e)) => Err(e),
            None => Err(TelemetryError::transient("ryzenadj.exe exited with code 1")),
        }
    }

    async fn apply_limits(&self, scheme: PowerScheme) -> Result<()> {
        self.applied.lock().push(scheme);
        match self.apply_error.lock().clone() {
            Some(message) => Err(TelemetryError::transient(message)),
            None => Ok(()),
        }
    }
}
