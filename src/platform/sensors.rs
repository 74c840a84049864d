//! Sensor tree over sysinfo (CPU, memory, thermal components) and NVML (NVIDIA GPUs)

use sysinfo::{Components, CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};

use super::nvidia::NvidiaSensors;
use crate::core::sensors::{HardwareNode, HardwareTree, HardwareType, Sensor, SensorType};
use crate::error::{Result, TelemetryError};

const GB: f32 = 1024.0 * 1024.0 * 1024.0;

/// Component labels that belong to the CPU package
const CPU_THERMAL_LABELS: [&str; 4] = ["cpu", "package", "tctl", "core"];

#[derive(Default)]
pub struct SystemSensorTree {
    system: Option<System>,
    components: Option<Components>,
    nvidia: NvidiaSensors,
    hardware: Vec<HardwareNode>,
}

impl SystemSensorTree {
    pub fn new() -> Self {
        Self::default()
    }

    fn cpu_node(system: &System, components: Option<&Components>) -> HardwareNode {
        let brand = system
            .cpus()
            .first()
            .map(|cpu| cpu.brand().trim().to_string())
            .filter(|brand| !brand.is_empty())
            .unwrap_or_else(|| "Generic CPU".to_string());

        let mut node = HardwareNode::new(HardwareType::Cpu, &brand).with_sensor(Sensor::new(
            SensorType::Load,
            "CPU Total",
            Some(system.global_cpu_usage()),
        ));

        for (i, cpu) in system.cpus().iter().enumerate() {
            let core = format!("CPU Core #{}", i + 1);
            node.sensors
                .push(Sensor::new(SensorType::Load, &core, Some(cpu.cpu_usage())));
            node.sensors.push(Sensor::new(
                SensorType::Clock,
                &core,
                Some(cpu.frequency() as f32),
            ));
        }

        if let Some(components) = components {
            for component in components.iter() {
                let label = component.label().to_lowercase();
                if CPU_THERMAL_LABELS.iter().any(|l| label.contains(l)) {
                    node.sensors.push(Sensor::new(
                        SensorType::Temperature,
                        component.label(),
                        component.temperature(),
                    ));
                }
            }
        }

        node
    }

    fn memory_node(system: &System) -> HardwareNode {
        let total = system.total_memory();
        let used = system.used_memory();
        let load = if total > 0 {
            Some(used as f32 / total as f32 * 100.0)
        } else {
            None
        };

        HardwareNode::new(HardwareType::Memory, "Generic Memory")
            .with_sensor(Sensor::new(SensorType::Load, "Memory", load))
            .with_sensor(Sensor::new(
                SensorType::Data,
                "Memory Used",
                Some(used as f32 / GB),
            ))
            .with_sensor(Sensor::new(
                SensorType::Data,
                "Memory Available",
                Some(system.available_memory() as f32 / GB),
            ))
    }
}

impl HardwareTree for SystemSensorTree {
    fn open(&mut self) -> Result<()> {
        let refresh_kind = RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::everything())
            .with_memory(MemoryRefreshKind::everything());
        let system = System::new_with_specifics(refresh_kind);

        if system.cpus().is_empty() {
            return Err(TelemetryError::not_supported("No CPU information available"));
        }

        self.system = Some(system);
        self.components = Some(Components::new_with_refreshed_list());
        self.nvidia = NvidiaSensors::open();
        log::debug!(
            "Sensor tree opened (NVML: {})",
            if self.nvidia.is_available() { "yes" } else { "no" }
        );
        Ok(())
    }

    fn update(&mut self) {
        let Some(system) = self.system.as_mut() else {
            return;
        };
        system.refresh_cpu_all();
        system.refresh_memory();
        if let Some(components) = self.components.as_mut() {
            components.refresh(true);
        }

        let mut hardware = vec![
            Self::cpu_node(system, self.components.as_ref()),
            Self::memory_node(system),
        ];
        hardware.extend(self.nvidia.read_nodes());
        self.hardware = hardware;
    }

    fn hardware(&self) -> &[HardwareNode] {
        &self.hardware
    }

    fn close(&mut self) {
        self.nvidia.close();
        self.system = None;
        self.components = None;
        self.hardware.clear();
    }
}
