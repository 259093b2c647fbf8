// src/main.rs
//! MT3339 GPS - read fixes from an MT3339 receiver on a serial port

use clap::{error::ErrorKind, CommandFactory, Parser, ValueEnum};
use mt3339_gps::{
    config::GpsConfig,
    gps::link::list_serial_ports,
    CommitPolicy, GpsMonitor, Result,
};
use std::sync::{atomic::Ordering, Arc};
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Policy {
    /// Commit date and time from every valid RMC
    TimeOnly,
    /// Commit only when RMC and GGA agree on the sampling instant
    Quorum,
}

#[derive(Debug, Parser)]
#[command(name = "mt3339-gps", version, about = "Read fixes from an MT3339 GPS receiver")]
struct Cli {
    /// Serial port the receiver is attached to
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// Commit policy
    #[arg(long, value_enum)]
    policy: Option<Policy>,

    /// Minimum satellites for the quorum policy; implies --policy quorum
    #[arg(long)]
    min_satellites: Option<u8>,

    /// Print each fix as a JSON line
    #[arg(long)]
    json: bool,

    /// List serial ports and exit
    #[arg(long)]
    list_ports: bool,
}

/// Apply the policy flags on top of the loaded configuration
fn apply_policy(
    config: &mut GpsConfig,
    policy: Option<Policy>,
    min_satellites: Option<u8>,
) -> std::result::Result<(), clap::Error> {
    match (policy, min_satellites) {
        (Some(Policy::TimeOnly), Some(_)) => {
            return Err(Cli::command().error(
                ErrorKind::ArgumentConflict,
                "--min-satellites cannot be used with --policy time-only",
            ))
        }
        (Some(Policy::TimeOnly), None) => config.use_time_only(),
        (Some(Policy::Quorum), None) => {
            let min = match config.commit_policy {
                CommitPolicy::Quorum { min_satellites } => min_satellites,
                CommitPolicy::TimeOnly => 4,
            };
            config.use_quorum(min);
        }
        (_, Some(min)) => config.use_quorum(min),
        (None, None) => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let directive: tracing_subscriber::filter::Directive =
        "mt3339_gps=info".parse().map_err(anyhow::Error::from)?;
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(directive))
        .init();

    let cli = Cli::parse();

    if cli.list_ports {
        let ports = list_serial_ports()?;
        if ports.is_empty() {
            println!("No serial ports found.");
        } else {
            println!("Available serial ports:");
            for port in ports {
                println!("  {}", port);
            }
        }
        return Ok(());
    }

    // Load configuration, command line wins
    let mut config = GpsConfig::load().unwrap_or_default();
    if let Some(port) = cli.port {
        let baud = cli.baud.unwrap_or(config.serial_baudrate);
        config.update_serial(port, baud);
    } else if let Some(baud) = cli.baud {
        config.serial_baudrate = baud;
    }
    if let Err(e) = apply_policy(&mut config, cli.policy, cli.min_satellites) {
        e.exit();
    }

    let monitor = Arc::new(GpsMonitor::new(config));

    // Ctrl+C puts the receiver in standby before exiting
    let running = monitor.running_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received");
            running.store(false, Ordering::Relaxed);
        }
    });

    let mut fixes = monitor.subscribe();
    let json = cli.json;
    tokio::spawn(async move {
        while fixes.changed().await.is_ok() {
            let fix = fixes.borrow_and_update().clone();
            if json {
                match serde_json::to_string(&fix) {
                    Ok(line) => println!("{}", line),
                    Err(e) => error!("Failed to encode fix: {}", e),
                }
            } else {
                println!("{}", fix);
            }
        }
    });

    monitor.run().await
}
