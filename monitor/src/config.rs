//! Monitor configuration
//!
//! Runtime settings with defaults shared through `probe_common`.

use anyhow::{bail, Result};
use chrono::{DateTime, Local};
use probe_common::{
    DEFAULT_INTERVAL_MS, DEFAULT_TARGET, DEFAULT_TIMEOUT_MS, DEFAULT_WINDOW_SIZE,
    LOG_FILE_EXTENSION, LOG_FILE_PREFIX, LOG_FILE_TIME_FORMAT,
};
use std::{path::PathBuf, time::Duration};

/// Settings for one monitoring run
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Host to probe (IP address or hostname)
    pub target: String,
    /// Time between two probes
    pub interval: Duration,
    /// How long a probe waits for its reply
    pub timeout: Duration,
    /// Directory receiving the per-run log file
    pub log_dir: PathBuf,
    /// Probes per window report (0 disables windows)
    pub window_size: u64,
    /// Optional JSON copy of the final report
    pub json_output: Option<PathBuf>,
    /// Suppress per-probe console lines
    pub quiet: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            target: DEFAULT_TARGET.to_string(),
            interval: Duration::from_millis(DEFAULT_INTERVAL_MS),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            log_dir: PathBuf::from("."),
            window_size: DEFAULT_WINDOW_SIZE,
            json_output: None,
            quiet: false,
        }
    }
}

impl MonitorConfig {
    /// Create a configuration for `target` with default settings
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Self::default()
        }
    }

    /// Set the probe interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the probe timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the log directory.
    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = log_dir.into();
        self
    }

    /// Set the window size.
    pub fn with_window_size(mut self, window_size: u64) -> Self {
        self.window_size = window_size;
        self
    }

    /// Set the JSON report path.
    pub fn with_json_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.json_output = Some(path.into());
        self
    }

    /// Set quiet mode.
    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.target.trim().is_empty() {
            bail!("Target must not be empty");
        }
        if self.interval.is_zero() {
            bail!("Interval must be greater than zero");
        }
        if self.timeout.is_zero() {
            bail!("Timeout must be greater than zero");
        }
        Ok(())
    }

    /// Path of the log file for a run started at `started_at`
    ///
    /// The name embeds the start time and the target, with characters that
    /// are awkward in file names replaced by `_`.
    pub fn log_file_path(&self, started_at: &DateTime<Local>) -> PathBuf {
        let target: String = self
            .target
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();

        self.log_dir.join(format!(
            "{}_{}_{}.{}",
            LOG_FILE_PREFIX,
            started_at.format(LOG_FILE_TIME_FORMAT),
            target,
            LOG_FILE_EXTENSION
        ))
    }
}
