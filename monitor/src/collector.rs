//! Statistics aggregation
//!
//! Folds probe outcomes into running, hourly and windowed statistics.

use crate::types::*;
use chrono::{DateTime, DurationRound, Local, TimeDelta};
use log::debug;
use probe_common::{ProbeOutcome, BUCKET_SECONDS};
use std::collections::BTreeMap;

/// Fixed-size run of consecutive probes
#[derive(Debug, Clone)]
struct ProbeWindow {
    size: u64,
    first_probe: u64,
    stats: LatencyStats,
}

/// Statistics aggregator for probe outcomes
///
/// Owns the running tally and the hour buckets. `record` is the only
/// method that mutates it; everything else renders the current state.
#[derive(Debug, Clone)]
pub struct StatsAggregator {
    /// Statistics over the whole run
    running: RunningStats,
    /// Hour buckets keyed by the start of their hour
    buckets: BTreeMap<DateTime<Local>, HourBucket>,
    /// Current probe window
    window: ProbeWindow,
    /// Worst loss percentage of any completed window
    max_window_loss_percent: f64,
}

impl StatsAggregator {
    /// Create a new aggregator
    ///
    /// # Arguments
    ///
    /// * `start_time` - Start of the run, used to label the overall summary
    /// * `window_size` - Probes per window report (0 disables windows)
    pub fn new(start_time: DateTime<Local>, window_size: u64) -> Self {
        Self {
            running: RunningStats::new(start_time),
            buckets: BTreeMap::new(),
            window: ProbeWindow {
                size: window_size,
                first_probe: 1,
                stats: LatencyStats::default(),
            },
            max_window_loss_percent: 0.0,
        }
    }

    /// Record one probe outcome
    ///
    /// # Arguments
    ///
    /// * `outcome` - Result of the probe
    /// * `at` - When the probe was issued
    ///
    /// # Returns
    ///
    /// The window report if this probe completed a window
    pub fn record(&mut self, outcome: ProbeOutcome, at: DateTime<Local>) -> Option<WindowReport> {
        self.running.stats.add(&outcome);

        let hour_key = hour_start(at);
        self.buckets
            .entry(hour_key)
            .or_insert_with(|| {
                debug!("Opening hour bucket {}", hour_key.format("%Y-%m-%d %H:00"));
                HourBucket::new(hour_key)
            })
            .stats
            .add(&outcome);

        self.record_window(&outcome)
    }

    fn record_window(&mut self, outcome: &ProbeOutcome) -> Option<WindowReport> {
        if self.window.size == 0 {
            return None;
        }

        self.window.stats.add(outcome);
        if self.window.stats.total_probes < self.window.size {
            return None;
        }

        let first_probe = self.window.first_probe;
        let last_probe = self.running.stats.total_probes;
        let summary = SummaryReport::from_stats(
            format!("packets {} to {}", first_probe, last_probe),
            &self.window.stats,
        );

        self.max_window_loss_percent = self.max_window_loss_percent.max(summary.loss_percent);
        self.window.first_probe = last_probe + 1;
        self.window.stats = LatencyStats::default();

        Some(WindowReport {
            first_probe,
            last_probe,
            summary,
        })
    }

    /// Render a summary of any accumulation scope
    pub fn render<S: StatsScope>(&self, scope: &S) -> SummaryReport {
        SummaryReport::from_stats(scope.period_label(), scope.stats())
    }

    /// Render the summary over the whole run
    pub fn overall_summary(&self) -> SummaryReport {
        self.render(&self.running)
    }

    /// Render every hour bucket in chronological order
    ///
    /// Includes the current, still accumulating hour.
    pub fn all_hour_summaries(&self) -> Vec<SummaryReport> {
        self.buckets.values().map(|bucket| self.render(bucket)).collect()
    }

    /// Generate the shutdown report
    ///
    /// # Arguments
    ///
    /// * `target` - Probed host
    /// * `finished_at` - When the run stopped
    pub fn final_report(&self, target: &str, finished_at: DateTime<Local>) -> FinalReport {
        FinalReport {
            target: target.to_string(),
            started_at: self.running.start_time,
            finished_at,
            overall: self.overall_summary(),
            max_window_loss_percent: self.max_window_loss_percent,
            hours: self.all_hour_summaries(),
            log_path: None,
        }
    }

    /// Get the running statistics
    pub fn running(&self) -> &RunningStats {
        &self.running
    }

    /// Iterate over hour buckets in chronological order
    pub fn buckets(&self) -> impl Iterator<Item = &HourBucket> {
        self.buckets.values()
    }

    /// Get the bucket covering the hour of `at`, if any probe landed there
    pub fn bucket_at(&self, at: DateTime<Local>) -> Option<&HourBucket> {
        self.buckets.get(&hour_start(at))
    }

    /// Get number of hour buckets
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Get current probe count
    pub fn probe_count(&self) -> u64 {
        self.running.stats.total_probes
    }

    /// Worst loss percentage of any completed window
    pub fn max_window_loss_percent(&self) -> f64 {
        self.max_window_loss_percent
    }
}

/// Truncate a timestamp to the start of its local wall-clock hour
pub fn hour_start(at: DateTime<Local>) -> DateTime<Local> {
    at.duration_trunc(TimeDelta::seconds(BUCKET_SECONDS))
        .unwrap_or(at)
}
