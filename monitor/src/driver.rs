//! Measurement loop
//!
//! Ticks at a fixed interval, probes the target, feeds the aggregator and
//! runs the shutdown-and-report sequence once a stop is requested.

use crate::{
    collector::StatsAggregator,
    config::MonitorConfig,
    exporter::{render_report_text, render_window_text, JsonExporter, ReportExporter, RunLog, TextExporter},
    prober::Prober,
    types::{format_latency, FinalReport},
};
use chrono::{DateTime, Local};
use log::{debug, info, warn};
use probe_common::ProbeOutcome;
use std::io;
use tokio::{
    signal,
    sync::watch,
    time::{interval, MissedTickBehavior},
};

/// Lifecycle of the measurement loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Probing on every tick
    Running,
    /// Stop requested, rendering the final report
    Stopping,
    /// Report written, loop finished
    Stopped,
}

/// Requests a graceful stop of the measurement loop
///
/// Only flips a flag; the loop performs every state transition itself.
#[derive(Debug)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    /// Ask the loop to stop after the probe currently in flight
    pub fn request_stop(&self) {
        self.tx.send_replace(true);
    }
}

/// Loop-side view of stop requests
///
/// Dropping the `StopHandle` counts as a stop request.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    /// Whether a stop has been requested or the handle is gone
    pub fn is_requested(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolve once a stop has been requested
    pub async fn requested(&mut self) {
        if self.rx.wait_for(|stop| *stop).await.is_err() {
            debug!("Stop handle dropped, treating as stop request");
        }
    }
}

/// Create a connected stop handle and signal
pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx }, StopSignal { rx })
}

/// Install the interrupt handler and turn the first Ctrl+C into a stop request
///
/// The handler is registered before this returns, so an interrupt that
/// arrives while the transport is still being opened is not lost.
pub fn listen_for_interrupt(handle: StopHandle) -> io::Result<()> {
    #[cfg(unix)]
    let mut interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    #[cfg(windows)]
    let mut interrupt = signal::windows::ctrl_c()?;

    tokio::spawn(async move {
        interrupt.recv().await;
        info!("Interrupt received");
        handle.request_stop();
    });

    Ok(())
}

/// Drives one monitoring run
pub struct Driver<P: Prober> {
    prober: P,
    aggregator: StatsAggregator,
    config: MonitorConfig,
    run_log: RunLog,
    state: DriverState,
}

impl<P: Prober> Driver<P> {
    /// Create a driver and its log file
    ///
    /// Failing to create the log file is reported and the run continues
    /// with console output only.
    ///
    /// # Arguments
    ///
    /// * `prober` - Transport used once per tick
    /// * `config` - Run settings
    /// * `started_at` - Start of the run (embedded in the log file name)
    pub fn new(prober: P, config: MonitorConfig, started_at: DateTime<Local>) -> Self {
        let log_path = config.log_file_path(&started_at);
        let run_log = match RunLog::create(log_path.clone()) {
            Ok(run_log) => run_log,
            Err(e) => {
                warn!("{:#}; continuing without a log file", e);
                RunLog::disabled(log_path)
            }
        };

        let mut driver = Self {
            prober,
            aggregator: StatsAggregator::new(started_at, config.window_size),
            config,
            run_log,
            state: DriverState::Running,
        };
        driver.write_header(started_at);
        driver
    }

    /// Current lifecycle state
    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Log file of this run, if it could be created
    pub fn log_path(&self) -> Option<&std::path::Path> {
        self.run_log.is_enabled().then(|| self.run_log.path())
    }

    fn write_header(&mut self, started_at: DateTime<Local>) {
        let rule = "=".repeat(probe_common::REPORT_RULE_WIDTH);
        self.run_log.append(&rule);
        self.run_log.append(&format!(
            "Packet Loss Monitor - Started {}",
            started_at.format("%Y-%m-%d %H:%M:%S")
        ));
        self.run_log.append(&format!("Target: {}", self.prober.target()));
        self.run_log.append(&format!("{}\n", rule));
    }

    /// Run until a stop is requested, then emit and return the final report
    ///
    /// The stop request is only observed between ticks, so the probe in
    /// flight always completes and is recorded.
    pub async fn run(&mut self, mut stop: StopSignal) -> FinalReport {
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if stop.is_requested() {
                info!("Stop requested, shutting down...");
                self.state = DriverState::Stopping;
                break;
            }

            tokio::select! {
                biased;
                _ = stop.requested() => {}
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }

        self.shutdown()
    }

    async fn tick(&mut self) {
        let at = Local::now();
        let outcome = self.prober.probe().await;
        let window = self.aggregator.record(outcome, at);

        let line = self.status_line(outcome, at);
        if !self.config.quiet {
            println!("{}", line);
        }
        self.run_log.append(&line);

        if let Some(window) = window {
            let text = render_window_text(&window);
            println!("{}", text);
            self.run_log.append(&text);
        }
    }

    fn status_line(&self, outcome: ProbeOutcome, at: DateTime<Local>) -> String {
        let running = &self.aggregator.running().stats;
        let result = match outcome {
            ProbeOutcome::Success { latency } => format!("time={}", format_latency(Some(latency))),
            ProbeOutcome::Failure { reason } => reason.to_string(),
        };

        format!(
            "{} - seq={} {} | loss {:.2}% ({}/{}) avg {}",
            at.format("%Y-%m-%d %H:%M:%S"),
            running.total_probes,
            result,
            running.loss_percent(),
            running.lost_probes,
            running.total_probes,
            format_latency(running.avg_latency())
        )
    }

    fn shutdown(&mut self) -> FinalReport {
        let mut report = self.aggregator.final_report(self.prober.target(), Local::now());
        report.log_path = self.log_path().map(|path| path.to_path_buf());

        let text = render_report_text(&report);
        println!("{}", text);

        if let Some(path) = &report.log_path {
            if let Err(e) = TextExporter::new(path.clone()).export(&report) {
                warn!("{:#}", e);
            }
        }

        if let Some(path) = &self.config.json_output {
            match JsonExporter::new(path.clone(), true).export(&report) {
                Ok(()) => info!("JSON report written to {:?}", path),
                Err(e) => warn!("{:#}", e),
            }
        }

        self.state = DriverState::Stopped;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use probe_common::FailureReason;
    use std::{collections::VecDeque, time::Duration};

    /// Prober replaying a fixed script, requesting a stop once it runs dry
    struct ScriptedProber {
        outcomes: VecDeque<ProbeOutcome>,
        stop: Option<StopHandle>,
        calls: u64,
    }

    impl ScriptedProber {
        fn new(outcomes: Vec<ProbeOutcome>, stop: StopHandle) -> Self {
            Self {
                outcomes: outcomes.into(),
                stop: Some(stop),
                calls: 0,
            }
        }
    }

    #[async_trait]
    impl Prober for ScriptedProber {
        fn target(&self) -> &str {
            "192.0.2.1"
        }

        async fn probe(&mut self) -> ProbeOutcome {
            self.calls += 1;
            let outcome = self
                .outcomes
                .pop_front()
                .unwrap_or(ProbeOutcome::failure(FailureReason::Error));

            if self.outcomes.is_empty() {
                if let Some(stop) = &self.stop {
                    stop.request_stop();
                }
            }
            outcome
        }
    }

    fn test_config(dir: &std::path::Path) -> MonitorConfig {
        MonitorConfig::new("192.0.2.1")
            .with_interval(Duration::from_millis(5))
            .with_log_dir(dir)
            .with_window_size(2)
            .with_quiet(true)
    }

    fn script() -> Vec<ProbeOutcome> {
        vec![
            ProbeOutcome::success(Duration::from_millis(10)),
            ProbeOutcome::success(Duration::from_millis(20)),
            ProbeOutcome::failure(FailureReason::Timeout),
            ProbeOutcome::success(Duration::from_millis(30)),
        ]
    }

    #[tokio::test]
    async fn test_stop_signal() {
        let (handle, signal) = stop_channel();
        assert!(!signal.is_requested());

        handle.request_stop();
        assert!(signal.is_requested());
    }

    #[tokio::test]
    async fn test_interrupt_listener_installs_without_stopping() {
        let (handle, signal) = stop_channel();

        listen_for_interrupt(handle).unwrap();
        tokio::task::yield_now().await;

        assert!(!signal.is_requested());
    }

    #[tokio::test]
    async fn test_dropped_handle_stops() {
        let (handle, mut signal) = stop_channel();
        drop(handle);
        assert!(signal.is_requested());

        tokio::time::timeout(Duration::from_secs(1), signal.requested())
            .await
            .expect("dropped handle should resolve the stop signal");
    }

    #[tokio::test]
    async fn test_run_records_every_probe_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, signal) = stop_channel();
        let prober = ScriptedProber::new(script(), handle);

        let mut driver = Driver::new(prober, test_config(dir.path()), Local::now());
        assert_eq!(driver.state(), DriverState::Running);

        let report = driver.run(signal).await;

        assert_eq!(driver.state(), DriverState::Stopped);
        assert_eq!(driver.prober.calls, 4);
        assert_eq!(report.overall.probe_count, 4);
        assert_eq!(report.overall.loss_count, 1);
        assert_eq!(report.overall.loss_percent, 25.0);
        assert_eq!(report.overall.avg_latency, Some(Duration::from_millis(20)));
        assert_eq!(report.overall.jitter, Some(Duration::from_millis(10)));
        assert_eq!(report.max_window_loss_percent, 50.0);

        let hour_total: u64 = report.hours.iter().map(|h| h.probe_count).sum();
        assert_eq!(hour_total, 4);
    }

    #[tokio::test]
    async fn test_run_writes_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, signal) = stop_channel();
        let prober = ScriptedProber::new(script(), handle);

        let mut driver = Driver::new(prober, test_config(dir.path()), Local::now());
        let report = driver.run(signal).await;

        let path = report.log_path.clone().expect("log file created");
        assert!(path.starts_with(dir.path()));

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("Packet Loss Monitor - Started"));
        assert!(contents.contains("Target: 192.0.2.1"));
        assert!(contents.contains("seq=3 timeout"));
        assert!(contents.contains("--- Statistics for packets 1 to 2 ---"));
        assert!(contents.contains("OVERALL SUMMARY"));
        assert!(contents.contains("Packet loss: 25.00%"));
        assert!(contents.contains("HOURLY BREAKDOWN"));
    }

    #[tokio::test]
    async fn test_run_without_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let (handle, signal) = stop_channel();
        let prober = ScriptedProber::new(script(), handle);

        let mut driver = Driver::new(prober, test_config(&missing), Local::now());
        assert!(driver.log_path().is_none());

        let report = driver.run(signal).await;

        assert_eq!(driver.state(), DriverState::Stopped);
        assert_eq!(report.overall.probe_count, 4);
        assert!(report.log_path.is_none());
    }

    #[tokio::test]
    async fn test_stop_before_first_tick() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, signal) = stop_channel();
        let prober = ScriptedProber::new(script(), stop_channel().0);
        handle.request_stop();

        let mut driver = Driver::new(prober, test_config(dir.path()), Local::now());
        let report = driver.run(signal).await;

        assert_eq!(driver.state(), DriverState::Stopped);
        assert_eq!(report.overall.probe_count, 0);
        assert_eq!(report.overall.loss_percent, 0.0);
        assert!(report.hours.is_empty());
    }

    #[tokio::test]
    async fn test_json_output() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("report.json");
        let (handle, signal) = stop_channel();
        let prober = ScriptedProber::new(script(), handle);

        let config = test_config(dir.path()).with_json_output(&json_path);
        let mut driver = Driver::new(prober, config, Local::now());
        driver.run(signal).await;

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(json["overall"]["loss_count"], 1);
    }
}
