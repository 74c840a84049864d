#[cfg(feature = "nvml")]
use nvml_wrapper::{enum_wrappers::device::TemperatureSensor, Device, Nvml};

use crate::core::sensors::{HardwareNode, HardwareType, Sensor, SensorType};

/// NVIDIA GPU sensors read through NVML
///
/// Without the `nvml` feature, or without an NVIDIA driver, this yields no
/// hardware nodes.
#[derive(Default)]
pub struct NvidiaSensors {
    #[cfg(feature = "nvml")]
    nvml: Option<Nvml>,
}

impl NvidiaSensors {
    pub fn open() -> Self {
        #[cfg(feature = "nvml")]
        {
            let nvml = match Nvml::init() {
                Ok(nvml) => Some(nvml),
                Err(e) => {
                    log::debug!("NVML not available: {}", e);
                    None
                }
            };
            Self { nvml }
        }
        #[cfg(not(feature = "nvml"))]
        {
            Self {}
        }
    }

    pub fn is_available(&self) -> bool {
        #[cfg(feature = "nvml")]
        {
            self.nvml.is_some()
        }
        #[cfg(not(feature = "nvml"))]
        {
            false
        }
    }

    pub fn read_nodes(&self) -> Vec<HardwareNode> {
        #[cfg(feature = "nvml")]
        {
            let Some(nvml) = self.nvml.as_ref() else {
                return Vec::new();
            };

            let count = nvml.device_count().unwrap_or(0);
            (0..count)
                .filter_map(|index| match nvml.device_by_index(index) {
                    Ok(device) => Some(device_node(&device)),
                    Err(e) => {
                        log::debug!("Failed to get NVIDIA device {}: {}", index, e);
                        None
                    }
                })
                .collect()
        }
        #[cfg(not(feature = "nvml"))]
        {
            Vec::new()
        }
    }

    pub fn close(&mut self) {
        #[cfg(feature = "nvml")]
        {
            self.nvml = None;
        }
    }
}

#[cfg(feature = "nvml")]
fn device_node(device: &Device<'_>) -> HardwareNode {
    const MB: f32 = 1024.0 * 1024.0;

    let name = device
        .name()
        .unwrap_or_else(|_| "Unknown NVIDIA GPU".to_string());
    let utilization = device.utilization_rates().ok();
    let memory = device.memory_info().ok();

    HardwareNode::new(HardwareType::GpuNvidia, &name)
        .with_sensor(Sensor::new(
            SensorType::Load,
            "GPU Core",
            utilization.as_ref().map(|u| u.gpu as f32),
        ))
        .with_sensor(Sensor::new(
            SensorType::Load,
            "GPU Memory Controller",
            utilization.as_ref().map(|u| u.memory as f32),
        ))
        .with_sensor(Sensor::new(
            SensorType::SmallData,
            "GPU Memory Used",
            memory.as_ref().map(|m| m.used as f32 / MB),
        ))
        .with_sensor(Sensor::new(
            SensorType::SmallData,
            "GPU Memory Total",
            memory.as_ref().map(|m| m.total as f32 / MB),
        ))
        .with_sensor(Sensor::new(
            SensorType::SmallData,
            "GPU Memory Free",
            memory.as_ref().map(|m| m.free as f32 / MB),
        ))
        .with_sensor(Sensor::new(
            SensorType::Temperature,
            "GPU Core",
            device.temperature(TemperatureSensor::Gpu).ok().map(|t| t as f32),
        ))
        .with_sensor(Sensor::new(
            SensorType::Power,
            "GPU Package",
            // mW to W
            device.power_usage().ok().map(|p| p as f32 / 1000.0),
        ))
}
