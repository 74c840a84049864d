//! Hardware sensor tree and its cached snapshot

pub mod cache;

pub use cache::{SensorCache, SensorSnapshot};

use serde::Serialize;
use std::fmt;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum HardwareType {
    Cpu,
    Memory,
    GpuNvidia,
    GpuAmd,
    GpuIntel,
    Motherboard,
    Storage,
    Network,
}

impl HardwareType {
    pub const GPUS: [HardwareType; 3] = [
        HardwareType::GpuNvidia,
        HardwareType::GpuAmd,
        HardwareType::GpuIntel,
    ];

    pub fn is_gpu(&self) -> bool {
        Self::GPUS.contains(self)
    }
}

/// Sensor kinds and the unit each reports in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SensorType {
    /// Percent
    Load,
    /// MHz
    Clock,
    /// Celsius
    Temperature,
    /// Watts
    Power,
    /// GB
    Data,
    /// MB
    SmallData,
    /// RPM
    Fan,
}

impl SensorType {
    pub fn unit(&self) -> &'static str {
        match self {
            SensorType::Load => "%",
            SensorType::Clock => "MHz",
            SensorType::Temperature => "°C",
            SensorType::Power => "W",
            SensorType::Data => "GB",
            SensorType::SmallData => "MB",
            SensorType::Fan => "RPM",
        }
    }
}

/// One sensor value captured in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
    pub hardware_type: HardwareType,
    pub hardware_name: String,
    pub sensor_type: SensorType,
    pub sensor_name: String,
    pub value: f32,
}

impl fmt::Display for SensorReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} / {} [{:?}]: {:.1} {}",
            self.hardware_name,
            self.sensor_name,
            self.sensor_type,
            self.value,
            self.sensor_type.unit()
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sensor {
    pub sensor_type: SensorType,
    pub name: String,
    /// `None` when the hardware has no current reading
    pub value: Option<f32>,
}

impl Sensor {
    pub fn new(sensor_type: SensorType, name: &str, value: Option<f32>) -> Self {
        Self {
            sensor_type,
            name: name.to_string(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HardwareNode {
    pub hardware_type: HardwareType,
    pub name: String,
    pub sensors: Vec<Sensor>,
    pub sub_hardware: Vec<HardwareNode>,
}

impl HardwareNode {
    pub fn new(hardware_type: HardwareType, name: &str) -> Self {
        Self {
            hardware_type,
            name: name.to_string(),
            sensors: Vec::new(),
            sub_hardware: Vec::new(),
        }
    }

    pub fn with_sensor(mut self, sensor: Sensor) -> Self {
        self.sensors.push(sensor);
        self
    }

    /// Present-valued sensors of this node and all sub-nodes, depth first
    pub fn collect_readings(&self, out: &mut Vec<SensorReading>) {
        out.extend(self.sensors.iter().filter_map(|sensor| {
            sensor.value.map(|value| SensorReading {
                hardware_type: self.hardware_type,
                hardware_name: self.name.clone(),
                sensor_type: sensor.sensor_type,
                sensor_name: sensor.name.clone(),
                value,
            })
        }));
        for sub in &self.sub_hardware {
            sub.collect_readings(out);
        }
    }
}

/// An expensive-to-refresh sensor enumeration
pub trait HardwareTree: Send {
    fn open(&mut self) -> Result<()>;

    /// Re-reads every sensor of every node
    fn update(&mut self);

    fn hardware(&self) -> &[HardwareNode];

    fn close(&mut self);
}
