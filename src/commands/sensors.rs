use anyhow::Result;
use colored::*;
use std::collections::BTreeMap;
use std::time::Duration;

use super::Telemetry;
use crate::core::sensors::SensorReading;
use crate::core::MonitorConfig;
use crate::ui::print_section_header;

pub fn execute() -> Result<()> {
    let telemetry = Telemetry::open(MonitorConfig::load()?);
    let cache = &telemetry.sensors;

    if !cache.initialize() {
        println!("{}", "Hardware sensors are not available on this machine.".yellow());
        return Ok(());
    }

    // Load sensors need two refreshes to report anything
    let _ = cache.snapshot();
    std::thread::sleep(telemetry.config.sensor_snapshot_ttl() + Duration::from_millis(50));
    let snapshot = cache.snapshot();

    let mut by_hardware: BTreeMap<String, Vec<&SensorReading>> = BTreeMap::new();
    for reading in &snapshot.readings {
        by_hardware
            .entry(format!("{:?}: {}", reading.hardware_type, reading.hardware_name))
            .or_default()
            .push(reading);
    }

    for (hardware, readings) in by_hardware {
        print_section_header(&hardware);
        for reading in readings {
            println!(
                "  {:<12} {:<28} {:>10.1} {}",
                format!("{:?}", reading.sensor_type),
                reading.sensor_name,
                reading.value,
                reading.sensor_type.unit()
            );
        }
    }
    println!();
    Ok(())
}
