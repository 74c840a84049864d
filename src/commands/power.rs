use anyhow::Result;
use clap::ArgMatches;
use colored::*;

use super::{block_on, Telemetry};
use crate::core::power::{PowerScheme, PowerStatus};
use crate::core::MonitorConfig;
use crate::ui::print_section_header;

pub fn execute(matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("status", _)) => execute_status(),
        Some(("next", _)) => execute_next(),
        _ => {
            println!("Use 'xhmonitor power --help' for more information.");
            Ok(())
        }
    }
}

fn format_scheme(scheme: &PowerScheme) -> String {
    format!(
        "STAPM {} W / fast {} W / slow {} W",
        scheme.stapm_watts, scheme.fast_watts, scheme.slow_watts
    )
}

fn print_status(status: &PowerStatus, schemes: &[PowerScheme]) {
    print_section_header("Power");
    println!("  Current: {:.1} W", status.current_watts);
    println!("  Limit:   {:.1} W", status.limit_watts);
    println!("  Limits:  {}", format_scheme(&status.limits));
    for (i, scheme) in schemes.iter().enumerate() {
        let line = format!("  [{}] {}", i, format_scheme(scheme));
        if status.scheme_index == Some(i) {
            println!("{} {}", line.green().bold(), "(active)".green());
        } else {
            println!("{}", line);
        }
    }
    if status.scheme_index.is_none() {
        println!("  {}", "Current limits match no configured scheme".yellow());
    }
    println!();
}

fn execute_status() -> Result<()> {
    let config = MonitorConfig::load()?;
    let schemes = config.power.schemes.clone();
    let telemetry = Telemetry::open(config);
    let power = telemetry.power();

    if !power.is_supported() {
        println!("{}", "Power control is not available (ryzenadj.exe not found).".yellow());
        return Ok(());
    }

    match block_on(async { Ok(power.get_status().await) })? {
        Some(status) => print_status(&status, &schemes),
        None => println!("{}", "Failed to read power status".red()),
    }
    Ok(())
}

fn execute_next() -> Result<()> {
    let telemetry = Telemetry::open(MonitorConfig::load()?);
    let power = telemetry.power();

    let result = block_on(async { Ok(power.switch_to_next_scheme().await) })?;
    if result.success {
        let scheme = result
            .new_scheme
            .map(|s| format_scheme(&s))
            .unwrap_or_default();
        let previous = result
            .previous_index
            .map_or_else(|| "custom".to_string(), |i| format!("#{}", i));
        println!(
            "{} {} -> #{} ({})",
            "Switched scheme:".green().bold(),
            previous,
            result.new_index,
            scheme
        );
    } else {
        println!("{} {}", "Switch failed:".red().bold(), result.message);
    }
    Ok(())
}
