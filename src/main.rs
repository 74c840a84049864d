use anyhow::Result;
use clap::{Arg, ArgAction, Command};

use xhmonitor::commands;

fn build_cli() -> Command {
    Command::new("xhmonitor")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Windows hardware telemetry: CPU, GPU, memory, VRAM and power limits")
        .subcommand(
            Command::new("snapshot")
                .about("Show system usage and hardware limits")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help("Print as JSON")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("process")
                .about("Show per-process metrics")
                .arg(
                    Arg::new("pid")
                        .help("Process ID")
                        .required(true)
                        .index(1)
                        .value_parser(clap::value_parser!(u32)),
                )
                .arg(
                    Arg::new("name")
                        .short('n')
                        .long("name")
                        .value_name("NAME")
                        .help("Executable name (looked up from the PID when omitted)"),
                ),
        )
        .subcommand(Command::new("sensors").about("Dump the hardware sensor snapshot"))
        .subcommand(Command::new("gpu").about("Show GPU adapters, utilization and VRAM"))
        .subcommand(
            Command::new("power")
                .about("RyzenAdj power limits (use 'xhmonitor power --help' for subcommands)")
                .subcommand_required(true)
                .arg_required_else_help(true)
                .subcommand(Command::new("status").about("Show current power status"))
                .subcommand(Command::new("next").about("Switch to the next power scheme")),
        )
        .subcommand(
            Command::new("config")
                .about("Inspect configuration (use 'xhmonitor config --help' for subcommands)")
                .subcommand_required(true)
                .arg_required_else_help(true)
                .subcommand(Command::new("show").about("Print the effective configuration"))
                .subcommand(Command::new("path").about("Print the config file location")),
        )
}

fn main() -> Result<()> {
    xhmonitor::init_logging();

    let matches = build_cli().get_matches();

    match matches.subcommand() {
        Some(("snapshot", sub_matches)) => commands::snapshot::execute(sub_matches),
        Some(("process", sub_matches)) => commands::process::execute(sub_matches),
        Some(("sensors", _)) => commands::sensors::execute(),
        Some(("gpu", _)) => commands::gpu::execute(),
        Some(("power", sub_matches)) => commands::power::execute(sub_matches),
        Some(("config", sub_matches)) => commands::config::execute(sub_matches),
        _ => {
            println!("Welcome to xhmonitor!");
            println!("Use 'xhmonitor --help' for more information.");
            Ok(())
        }
    }
}
