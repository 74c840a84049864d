use anyhow::Result;
use colored::*;
use std::sync::Arc;

use super::{block_on, Telemetry};
use crate::core::MonitorConfig;
use crate::ui::{format_mb, format_percent, format_size, print_section_header};

pub fn execute() -> Result<()> {
    let telemetry = Telemetry::open(MonitorConfig::load()?);
    let engine = Arc::clone(&telemetry.engine);

    if !engine.is_available() {
        println!("{}", "GPU adapter queries are not available on this machine.".yellow());
        return Ok(());
    }

    print_section_header("Adapters");
    for adapter in engine.adapters() {
        let kind = if adapter.is_fallback_device() {
            "software".dimmed()
        } else {
            "hardware".normal()
        };
        println!(
            "  #{} {} [{}] LUID {} dedicated {}",
            adapter.index,
            adapter.name.bold(),
            kind,
            adapter.luid,
            format_size(adapter.dedicated_video_memory)
        );
    }

    let (usage, vram, resident) = block_on(async move {
        tokio::task::spawn_blocking(move || {
            let usage = engine.get_gpu_usage();
            (usage, engine.get_vram_usage(), engine.get_dedicated_resident_bytes())
        })
        .await
        .map_err(anyhow::Error::from)
    })?;

    print_section_header("Usage");
    match usage {
        Ok(percent) => println!("  Busiest engine: {}", format_percent(percent)),
        Err(e) => println!("  Busiest engine: {}", e.to_string().red()),
    }
    match vram {
        Some(metrics) => println!(
            "  VRAM:           {} / {} ({:.1}%)",
            format_mb(metrics.used),
            format_mb(metrics.total),
            metrics.usage_percent()
        ),
        None => println!("  VRAM:           {}", "unavailable".dimmed()),
    }
    if let Some(bytes) = resident {
        println!("  Resident local: {}", format_size(bytes));
    }
    println!();
    Ok(())
}
