use anyhow::Result;
use clap::ArgMatches;
use colored::*;
use std::time::Duration;

use super::{block_on, Telemetry};
use crate::core::metrics::{HardwareLimits, SystemUsage};
use crate::core::providers::{MetricRegistry, SystemMetricAggregator};
use crate::core::MonitorConfig;
use crate::ui::{format_mb, format_percent, format_rate, format_timestamp, print_section_header};

/// Network rates need two samples this far apart
const RATE_WINDOW: Duration = Duration::from_secs(1);

pub fn execute(matches: &ArgMatches) -> Result<()> {
    let as_json = matches.get_flag("json");
    let telemetry = Telemetry::open(MonitorConfig::load()?);

    let (limits, usage) = block_on(async {
        let registry = MetricRegistry::from_providers(telemetry.providers());
        let aggregator = SystemMetricAggregator::new(registry, Some(telemetry.power()));

        let limits = aggregator.hardware_limits().await;
        // Prime rate counters and network totals, then take the real reading
        let _ = aggregator.system_usage().await;
        tokio::time::sleep(RATE_WINDOW).await;
        let usage = aggregator.system_usage().await;
        Ok((limits, usage))
    })?;

    if as_json {
        let value = serde_json::json!({ "limits": limits, "usage": usage });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print_snapshot(&limits, &usage);
    }
    Ok(())
}

fn print_snapshot(limits: &HardwareLimits, usage: &SystemUsage) {
    println!(
        "\n{} {}",
        "SYSTEM SNAPSHOT".bold().bright_cyan(),
        format_timestamp(usage.timestamp).dimmed()
    );
    println!("{}", "=".repeat(60));

    print_section_header("Usage");
    println!("  CPU:      {}", format_percent(usage.total_cpu));
    println!("  GPU:      {}", format_percent(usage.total_gpu));
    println!(
        "  Memory:   {} / {}",
        format_mb(usage.total_memory),
        format_mb(limits.max_memory)
    );
    if limits.max_vram > 0.0 {
        println!(
            "  VRAM:     {} / {}",
            format_mb(usage.total_vram),
            format_mb(limits.max_vram)
        );
    } else {
        println!("  VRAM:     {}", "unavailable".dimmed());
    }

    print_section_header("Network");
    println!("  Upload:   {}", format_rate(usage.upload_speed));
    println!("  Download: {}", format_rate(usage.download_speed));

    print_section_header("Power");
    match &usage.power {
        Some(power) => {
            println!(
                "  Package:  {:.1} W / {:.1} W limit",
                power.current_watts, power.limit_watts
            );
            match power.scheme_index {
                Some(index) => println!("  Scheme:   #{}", index),
                None => println!("  Scheme:   {}", "custom".yellow()),
            }
        }
        None => println!("  {}", "not available".dimmed()),
    }
    println!();
}
