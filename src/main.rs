use std::io::Write as _;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use colored::*;

use upmon::config::MonitorConfig;
use upmon::plugin::{Discovery, PluginState};
use upmon::runtime::{self, Monitor};

fn main() -> Result<()> {
    upmon::init_logging();

    let matches = Command::new("upmon")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Pluggable system metrics collector")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .global(true)
                .help("Config file (default: ~/.config/upmon/config.json)"),
        )
        .subcommand(
            Command::new("run")
                .about("Collect continuously and stream formatted snapshots to stdout")
                .arg(format_arg()),
        )
        .subcommand(
            Command::new("once")
                .about("Run one collection pass and print the snapshot")
                .arg(format_arg()),
        )
        .subcommand(Command::new("plugins").about("List discovered plugins and their state"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .get_matches();

    let config = load_config(&matches)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build async runtime")?;

    match matches.subcommand() {
        Some(("run", sub_matches)) => runtime.block_on(execute_run(config, sub_matches)),
        Some(("once", sub_matches)) => runtime.block_on(execute_once(config, sub_matches)),
        Some(("plugins", _)) => execute_plugins(config),
        _ => unreachable!(),
    }
}

fn format_arg() -> Arg {
    Arg::new("format")
        .short('f')
        .long("format")
        .value_name("NAME")
        .value_parser(["json", "prometheus"])
        .default_value("json")
        .help("Output formatter plugin")
}

fn load_config(matches: &ArgMatches) -> Result<MonitorConfig> {
    match matches.get_one::<String>("config") {
        Some(path) => MonitorConfig::load_from(&PathBuf::from(path)),
        None => MonitorConfig::load(),
    }
}

async fn execute_run(config: MonitorConfig, matches: &ArgMatches) -> Result<()> {
    let format = matches
        .get_one::<String>("format")
        .map(String::as_str)
        .unwrap_or("json");

    let monitor = Monitor::start(config).await?;
    report_rejections(monitor.report());
    let mut payloads = monitor.subscribe_push(format)?;

    let (stop_tx, mut stop_rx) = tokio::sync::mpsc::channel::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.blocking_send(());
    })
    .context("Failed to install Ctrl-C handler")?;

    let mut stdout = std::io::stdout();
    loop {
        tokio::select! {
            payload = payloads.recv() => {
                match payload {
                    Some(bytes) => {
                        stdout.write_all(&bytes)?;
                        stdout.write_all(b"\n")?;
                        stdout.flush()?;
                    }
                    None => break,
                }
            }
            _ = stop_rx.recv() => {
                log::info!("shutting down");
                break;
            }
        }
    }

    monitor.shutdown(Duration::from_secs(2)).await;
    Ok(())
}

async fn execute_once(config: MonitorConfig, matches: &ArgMatches) -> Result<()> {
    let format = matches
        .get_one::<String>("format")
        .map(String::as_str)
        .unwrap_or("json");

    let (snapshot, registry, report) = runtime::collect_once(&config).await?;
    report_rejections(&report);

    let mut formatter = runtime::formatter_instance(&registry, format)?;
    let bytes = formatter.on_snapshot(&snapshot)?;
    let mut stdout = std::io::stdout();
    stdout.write_all(&bytes)?;
    stdout.write_all(b"\n")?;
    Ok(())
}

fn execute_plugins(config: MonitorConfig) -> Result<()> {
    let (registry, report) = Discovery::from_config(&config).run(&config);

    println!("{}", "Discovered plugins:".bold());
    println!();
    println!(
        "  {:<12} {:<10} {:<6} {:<10} {:<9} {}",
        "NAME".bold(),
        "KIND".bold(),
        "API".bold(),
        "INTERVAL".bold(),
        "STATE".bold(),
        "DESCRIPTION".bold()
    );

    for record in registry.records() {
        let d = &record.descriptor;
        let state = match record.state {
            PluginState::Loaded => record.state.as_str().green(),
            PluginState::Failed => record.state.as_str().yellow(),
            PluginState::Disabled => record.state.as_str().red(),
        };
        let interval = if d.kind.is_sampling() {
            format!("{:?}", d.default_interval)
        } else {
            "-".to_string()
        };
        println!(
            "  {:<12} {:<10} {:<6} {:<10} {:<9} {}",
            d.name.cyan(),
            d.kind.to_string(),
            d.api_version.to_string(),
            interval,
            state,
            d.description
        );
    }

    if !report.is_clean() {
        println!();
        println!("{}", "Rejected:".bold());
        for (name, error) in &report.rejected {
            println!("  {} {}", name.red(), error);
        }
    }
    Ok(())
}

fn report_rejections(report: &upmon::plugin::DiscoveryReport) {
    for (name, error) in &report.rejected {
        log::warn!("plugin rejected: {}: {}", name, error);
    }
}
