//! Packet Loss Monitor
//!
//! Pings a target once per interval, tracks loss, latency and jitter,
//! and prints an overall and hourly report when interrupted.
//!
//! ## Usage
//!
//! ```bash
//! # Monitor 8.8.8.8 until Ctrl+C
//! sudo ./loss-monitor
//!
//! # Monitor a hostname every 500ms with a 2s timeout
//! sudo ./loss-monitor example.com --interval-ms 500 --timeout-ms 2000
//!
//! # Keep logs elsewhere and export the final report as JSON
//! sudo ./loss-monitor 1.1.1.1 --log-dir /var/log/ping --json-output report.json
//! ```

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use log::info;
use loss_monitor::{listen_for_interrupt, stop_channel, Driver, IcmpProber, MonitorConfig};
use probe_common::{DEFAULT_INTERVAL_MS, DEFAULT_TARGET, DEFAULT_TIMEOUT_MS, DEFAULT_WINDOW_SIZE};
use std::{path::PathBuf, time::Duration};

/// Continuous ICMP packet loss and latency monitor
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Host to probe (IP address or hostname)
    #[clap(default_value = DEFAULT_TARGET)]
    target: String,

    /// Time between probes in milliseconds
    #[clap(long, default_value_t = DEFAULT_INTERVAL_MS)]
    interval_ms: u64,

    /// Per-probe reply timeout in milliseconds
    #[clap(long, default_value_t = DEFAULT_TIMEOUT_MS)]
    timeout_ms: u64,

    /// Directory for the per-run log file
    #[clap(long, default_value = ".")]
    log_dir: PathBuf,

    /// Probes per rolling window report (0 = disabled)
    #[clap(long, default_value_t = DEFAULT_WINDOW_SIZE)]
    window: u64,

    /// Also write the final report as JSON to this file
    #[clap(long)]
    json_output: Option<PathBuf>,

    /// Only print window reports and the final report
    #[clap(short, long)]
    quiet: bool,

    /// Verbose logging
    #[clap(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> MonitorConfig {
        let config = MonitorConfig::new(self.target)
            .with_interval(Duration::from_millis(self.interval_ms))
            .with_timeout(Duration::from_millis(self.timeout_ms))
            .with_log_dir(self.log_dir)
            .with_window_size(self.window)
            .with_quiet(self.quiet);

        match self.json_output {
            Some(path) => config.with_json_output(path),
            None => config,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    let config = args.into_config();
    config.validate()?;

    print_banner();

    info!("Starting packet loss monitor...");
    info!("   Target: {}", config.target);
    info!("   Interval: {:?}", config.interval);
    info!("   Timeout: {:?}", config.timeout);
    info!(
        "   Window: {}",
        if config.window_size == 0 {
            "disabled".to_string()
        } else {
            format!("{} probes", config.window_size)
        }
    );

    // Catch Ctrl+C from here on, even while the transport is opening
    let (stop_handle, stop_signal) = stop_channel();
    listen_for_interrupt(stop_handle).context("Failed to install Ctrl+C handler")?;

    // Open the transport before ticking; failure here is fatal
    let prober = IcmpProber::connect(&config.target, config.timeout)
        .await
        .with_context(|| format!("Failed to start probing {}", config.target))?;

    println!("Starting packet loss monitor... (Press Ctrl+C to stop)");
    println!("Target: {} ({})", config.target, prober.addr());

    let mut driver = Driver::new(prober, config, Local::now());
    match driver.log_path() {
        Some(path) => println!("Logging to: {}\n", path.display()),
        None => println!("Logging to: console only\n"),
    }

    let report = driver.run(stop_signal).await;

    info!(
        "Monitor stopped after {} probes ({:.2}% loss)",
        report.overall.probe_count, report.overall.loss_percent
    );

    Ok(())
}

fn print_banner() {
    println!(
        r#"
╔═══════════════════════════════════════════════════╗
║              Packet Loss Monitor                  ║
║        ICMP loss, latency and jitter              ║
╚═══════════════════════════════════════════════════╝
    "#
    );
}
