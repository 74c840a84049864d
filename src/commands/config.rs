use anyhow::Result;
use clap::ArgMatches;
use colored::Colorize;

use crate::core::MonitorConfig;

pub fn execute(matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("show", _)) => show(),
        Some(("path", _)) => path(),
        _ => {
            println!("Use 'xhmonitor config --help' for more information.");
            Ok(())
        }
    }
}

fn show() -> Result<()> {
    let config = MonitorConfig::load()?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn path() -> Result<()> {
    let path = MonitorConfig::config_path()?;
    let state = if path.exists() {
        "exists".green()
    } else {
        "not created yet, defaults in use".yellow()
    };
    println!("{} ({})", path.display(), state);
    Ok(())
}
