use anyhow::{Context, Result};
use clap::ArgMatches;
use colored::*;
use std::time::Duration;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

use super::{block_on, Telemetry};
use crate::core::providers::ProcessTarget;
use crate::core::MonitorConfig;
use crate::ui::print_section_header;

/// Rate counters report from their second sample on
const SAMPLE_GAP: Duration = Duration::from_secs(1);

/// Executable name for a live PID
pub fn resolve_process_name(pid: u32) -> Option<String> {
    let mut system = System::new();
    let pid = Pid::from_u32(pid);
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::nothing(),
    );
    system
        .process(pid)
        .map(|process| process.name().to_string_lossy().into_owned())
}

pub fn execute(matches: &ArgMatches) -> Result<()> {
    let pid = *matches
        .get_one::<u32>("pid")
        .context("PID argument is required")?;

    let name = match matches.get_one::<String>("name") {
        Some(name) => name.clone(),
        None => resolve_process_name(pid)
            .with_context(|| format!("No running process with PID {}", pid))?,
    };
    let target = ProcessTarget::new(pid, &name);

    let telemetry = Telemetry::open(MonitorConfig::load()?);
    let providers = telemetry.providers();

    let values = block_on(async {
        for provider in &providers {
            let _ = provider.collect(&target).await;
        }
        tokio::time::sleep(SAMPLE_GAP).await;

        let mut values = Vec::with_capacity(providers.len());
        for provider in &providers {
            values.push((
                provider.display_name().to_string(),
                provider.collect(&target).await,
            ));
        }
        Ok(values)
    })?;

    print_section_header(&format!("{} (PID {})", name, pid));
    for (label, value) in values {
        match value.ok_value() {
            Some(v) => println!("  {:<24} {:.1} {}", label, v, value.unit),
            None => println!(
                "  {:<24} {}",
                label,
                value.error_message.unwrap_or_default().red()
            ),
        }
    }
    println!();
    Ok(())
}
