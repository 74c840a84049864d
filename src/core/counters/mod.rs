//! Per-process performance counters
//!
//! Counter instance names are not process IDs. [`ProcessCounterManager`]
//! resolves instances to a PID, keeps the bound counters alive across polls
//! and drops them on the first failed read.

pub mod instance_cache;
pub mod manager;

pub use instance_cache::InstanceNameCache;
pub use manager::ProcessCounterManager;

use std::fmt;

use crate::error::Result;

/// Companion counter every `Process` instance carries
pub const ID_PROCESS_COUNTER: &str = "ID Process";

/// How instances of a category are tied to a process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceBinding {
    /// Instances are named after the executable (`chrome`, `chrome#1`, ...)
    /// and confirmed through the `ID Process` counter. Exactly one binds.
    ProcessName,
    /// Instance names embed `pid_<pid>_`; every matching instance is summed.
    PidTagged,
}

/// One per-process counter: where it lives and how its instances map to PIDs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSpec {
    pub category: &'static str,
    pub counter: &'static str,
    pub binding: InstanceBinding,
    /// Read the raw value instead of the formatted (rate) value
    pub raw: bool,
}

pub const PROCESS_CPU: CounterSpec = CounterSpec {
    category: "Process",
    counter: "% Processor Time",
    binding: InstanceBinding::ProcessName,
    raw: false,
};

pub const PROCESS_PRIVATE_MEMORY: CounterSpec = CounterSpec {
    category: "Process",
    counter: "Working Set - Private",
    binding: InstanceBinding::ProcessName,
    raw: true,
};

pub const GPU_ENGINE_UTILIZATION: CounterSpec = CounterSpec {
    category: "GPU Engine",
    counter: "Utilization Percentage",
    binding: InstanceBinding::PidTagged,
    raw: false,
};

pub const GPU_PROCESS_DEDICATED: CounterSpec = CounterSpec {
    category: "GPU Process Memory",
    counter: "Dedicated Usage",
    binding: InstanceBinding::PidTagged,
    raw: true,
};

/// Full counter path: `\Category(Instance)\Counter`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterPath {
    pub category: String,
    pub instance: Option<String>,
    pub counter: String,
}

impl CounterPath {
    pub fn new(category: &str, instance: Option<&str>, counter: &str) -> Self {
        Self {
            category: category.to_string(),
            instance: instance.map(str::to_string),
            counter: counter.to_string(),
        }
    }
}

impl fmt::Display for CounterPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.instance {
            Some(instance) => write!(f, "\\{}({})\\{}", self.category, instance, self.counter),
            None => write!(f, "\\{}\\{}", self.category, self.counter),
        }
    }
}

/// An open counter handle. Dropping it releases the native resources.
pub trait CounterReader: Send + Sync {
    /// Formatted value; rate counters report relative to the previous call
    fn next_value(&mut self) -> Result<f64>;

    /// Raw first value (instantaneous counters, `ID Process`)
    fn raw_value(&mut self) -> Result<i64>;
}

/// Source of performance counters
pub trait CounterBackend: Send + Sync {
    fn category_exists(&self, category: &str) -> bool;

    /// Current instance names of a category, with `#n` suffixes on duplicates
    fn instance_names(&self, category: &str) -> Result<Vec<String>>;

    fn open(&self, path: &CounterPath) -> Result<Box<dyn CounterReader>>;
}

/// Whether `instance` is one of the instances named after `process_name`
pub fn instance_matches_process(instance: &str, process_name: &str) -> bool {
    if process_name.is_empty() {
        return false;
    }
    match instance.strip_prefix(process_name) {
        Some("") => true,
        Some(rest) => rest
            .strip_prefix('#')
            .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit())),
        None => false,
    }
}

/// Marker embedded in pid-tagged GPU instance names
pub fn pid_tag(pid: u32) -> String {
    format!("pid_{}_", pid)
}

/// Process counters use the executable name without its extension
pub fn counter_process_name(name: &str) -> &str {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".exe") {
        &name[..name.len() - 4]
    } else {
        name
    }
}
