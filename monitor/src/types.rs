//! Accumulator and report type definitions
//!
//! Defines the incremental statistics accumulators owned by the
//! aggregator and the report structures rendered from them.
//!
//! ## Organization
//!
//! - **Accumulators**: `LatencyStats` and the two scopes wrapping it
//!   (`RunningStats` for the whole run, `HourBucket` for one clock hour)
//! - **Reports**: `SummaryReport`, `WindowReport` and `FinalReport`, always
//!   recomputed from the accumulators and never stored by them

use chrono::{DateTime, Local};
use probe_common::{FailureReason, ProbeOutcome};
use serde::Serialize;
use std::{path::PathBuf, time::Duration};

// ============================================================================
// Accumulators
// ============================================================================

/// Count of lost probes per failure reason
#[derive(Serialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FailureBreakdown {
    /// Probes that saw no reply before the timeout
    pub timeout: u64,
    /// Probes rejected as unreachable by the transport
    pub unreachable: u64,
    /// Probes that hit any other transport fault
    pub error: u64,
}

impl FailureBreakdown {
    fn add(&mut self, reason: FailureReason) {
        match reason {
            FailureReason::Timeout => self.timeout += 1,
            FailureReason::Unreachable => self.unreachable += 1,
            FailureReason::Error => self.error += 1,
        }
    }

    /// Total failures across all reasons
    pub fn total(&self) -> u64 {
        self.timeout + self.unreachable + self.error
    }
}

/// Incremental latency and loss accumulator
///
/// Latency fields only ever accumulate over successful probes, so every
/// derived value can be computed in O(1) at render time.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LatencyStats {
    /// Number of probes folded in
    pub total_probes: u64,
    /// Number of probes that got no timely reply
    pub lost_probes: u64,
    /// Sum of successful latencies
    pub latency_sum: Duration,
    /// Sum of squared successful latencies (ms²)
    pub latency_sum_sq: f64,
    /// Smallest successful latency
    pub min_latency: Option<Duration>,
    /// Largest successful latency
    pub max_latency: Option<Duration>,
    /// Latency of the most recent successful probe
    pub previous_latency: Option<Duration>,
    /// Sum of absolute differences between consecutive successful latencies
    pub jitter_sum: Duration,
    /// Lost probes by reason
    pub failures: FailureBreakdown,
}

impl LatencyStats {
    /// Fold one probe outcome into the accumulator
    pub fn add(&mut self, outcome: &ProbeOutcome) {
        self.total_probes += 1;

        match *outcome {
            ProbeOutcome::Success { latency } => {
                self.latency_sum += latency;

                let ms = duration_ms(latency);
                self.latency_sum_sq += ms * ms;

                self.min_latency = Some(self.min_latency.map_or(latency, |min| min.min(latency)));
                self.max_latency = Some(self.max_latency.map_or(latency, |max| max.max(latency)));

                if let Some(previous) = self.previous_latency {
                    self.jitter_sum += abs_diff(previous, latency);
                }
                self.previous_latency = Some(latency);
            }
            ProbeOutcome::Failure { reason } => {
                self.lost_probes += 1;
                self.failures.add(reason);
            }
        }
    }

    /// Number of probes answered in time
    pub fn received_probes(&self) -> u64 {
        self.total_probes - self.lost_probes
    }

    /// Lost probes as a percentage of all probes, 0 when nothing was sent
    pub fn loss_percent(&self) -> f64 {
        calculate_loss_percent(self.lost_probes, self.total_probes)
    }

    /// Mean successful latency, `None` without successful probes
    pub fn avg_latency(&self) -> Option<Duration> {
        divide_duration(self.latency_sum, self.received_probes())
    }

    /// Mean absolute difference between consecutive successful latencies
    ///
    /// `None` with fewer than two successful probes.
    pub fn jitter(&self) -> Option<Duration> {
        let pairs = self.received_probes().checked_sub(1)?;
        divide_duration(self.jitter_sum, pairs)
    }

    /// Population standard deviation of successful latencies
    ///
    /// `None` with fewer than two successful probes.
    pub fn std_dev(&self) -> Option<Duration> {
        let n = self.received_probes();
        if n < 2 {
            return None;
        }

        let n = n as f64;
        let mean = duration_ms(self.latency_sum) / n;
        let variance = (self.latency_sum_sq / n - mean * mean).max(0.0);
        Some(Duration::from_secs_f64(variance.sqrt() / 1000.0))
    }
}

/// Accumulation scope the aggregator can render
pub trait StatsScope {
    /// Human-readable label of the period covered
    fn period_label(&self) -> String;

    /// Accumulated statistics of the scope
    fn stats(&self) -> &LatencyStats;
}

/// Statistics over the whole lifetime of the process
#[derive(Debug, Clone, PartialEq)]
pub struct RunningStats {
    /// When the run started
    pub start_time: DateTime<Local>,
    /// Accumulated statistics
    pub stats: LatencyStats,
}

impl RunningStats {
    pub fn new(start_time: DateTime<Local>) -> Self {
        Self {
            start_time,
            stats: LatencyStats::default(),
        }
    }
}

impl StatsScope for RunningStats {
    fn period_label(&self) -> String {
        format!("Overall since {}", self.start_time.format("%Y-%m-%d %H:%M:%S"))
    }

    fn stats(&self) -> &LatencyStats {
        &self.stats
    }
}

/// Statistics for one wall-clock hour
#[derive(Debug, Clone, PartialEq)]
pub struct HourBucket {
    /// Start of the hour (minutes, seconds and sub-seconds are zero)
    pub bucket_start: DateTime<Local>,
    /// Accumulated statistics
    pub stats: LatencyStats,
}

impl HourBucket {
    pub fn new(bucket_start: DateTime<Local>) -> Self {
        Self {
            bucket_start,
            stats: LatencyStats::default(),
        }
    }
}

impl StatsScope for HourBucket {
    // The offset tells apart the two buckets of a repeated DST hour.
    fn period_label(&self) -> String {
        self.bucket_start.format("%Y-%m-%d %H:00 %:z").to_string()
    }

    fn stats(&self) -> &LatencyStats {
        &self.stats
    }
}

// ============================================================================
// Reports
// ============================================================================

/// Summary of one accumulation scope
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SummaryReport {
    /// Label of the period covered
    pub period_label: String,
    /// Probes sent
    pub probe_count: u64,
    /// Probes lost
    pub loss_count: u64,
    /// Probes answered
    pub received_count: u64,
    /// Loss percentage (0-100)
    pub loss_percent: f64,
    /// Mean latency in milliseconds
    #[serde(rename = "avg_latency_ms", serialize_with = "serialize_opt_ms")]
    pub avg_latency: Option<Duration>,
    /// Mean consecutive latency difference in milliseconds
    #[serde(rename = "jitter_ms", serialize_with = "serialize_opt_ms")]
    pub jitter: Option<Duration>,
    /// Latency standard deviation in milliseconds
    #[serde(rename = "std_dev_ms", serialize_with = "serialize_opt_ms")]
    pub std_dev: Option<Duration>,
    /// Minimum latency in milliseconds
    #[serde(rename = "min_latency_ms", serialize_with = "serialize_opt_ms")]
    pub min_latency: Option<Duration>,
    /// Maximum latency in milliseconds
    #[serde(rename = "max_latency_ms", serialize_with = "serialize_opt_ms")]
    pub max_latency: Option<Duration>,
    /// Lost probes by reason
    pub failures: FailureBreakdown,
}

impl SummaryReport {
    /// Compute a report from the current state of an accumulator
    pub fn from_stats(period_label: impl Into<String>, stats: &LatencyStats) -> Self {
        Self {
            period_label: period_label.into(),
            probe_count: stats.total_probes,
            loss_count: stats.lost_probes,
            received_count: stats.received_probes(),
            loss_percent: stats.loss_percent(),
            avg_latency: stats.avg_latency(),
            jitter: stats.jitter(),
            std_dev: stats.std_dev(),
            min_latency: stats.min_latency,
            max_latency: stats.max_latency,
            failures: stats.failures,
        }
    }
}

/// Summary of a fixed-size run of consecutive probes
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct WindowReport {
    /// Sequence number of the first probe in the window (1-based)
    pub first_probe: u64,
    /// Sequence number of the last probe in the window
    pub last_probe: u64,
    /// Statistics of the window
    pub summary: SummaryReport,
}

/// Everything emitted when the monitor shuts down
#[derive(Serialize, Debug, Clone)]
pub struct FinalReport {
    /// Probed host
    pub target: String,
    /// When the run started
    pub started_at: DateTime<Local>,
    /// When the report was rendered
    pub finished_at: DateTime<Local>,
    /// Statistics over the whole run
    pub overall: SummaryReport,
    /// Worst loss percentage of any completed probe window
    pub max_window_loss_percent: f64,
    /// Hourly breakdown in chronological order, including the current hour
    pub hours: Vec<SummaryReport>,
    /// Log artifact of this run, if one could be created
    pub log_path: Option<PathBuf>,
}

// ============================================================================
// Helpers
// ============================================================================

/// Calculate a loss percentage, defined as 0 when nothing was sent
///
/// # Arguments
///
/// * `lost` - Lost probes
/// * `total` - Probes sent
pub fn calculate_loss_percent(lost: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }

    lost as f64 / total as f64 * 100.0
}

/// Duration in fractional milliseconds
pub fn duration_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// Format an optional latency as `12.34 ms`, or `n/a`
pub fn format_latency(latency: Option<Duration>) -> String {
    match latency {
        Some(latency) => format!("{:.2} ms", duration_ms(latency)),
        None => "n/a".to_string(),
    }
}

fn abs_diff(a: Duration, b: Duration) -> Duration {
    if a > b {
        a - b
    } else {
        b - a
    }
}

// Integer division on nanoseconds keeps averages of exact samples exact.
fn divide_duration(sum: Duration, count: u64) -> Option<Duration> {
    if count == 0 {
        return None;
    }

    let nanos = sum.as_nanos() / u128::from(count);
    Some(Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX)))
}

fn serialize_opt_ms<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match value {
        Some(duration) => serializer.serialize_some(&duration_ms(*duration)),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn test_stats_empty() {
        let stats = LatencyStats::default();

        assert_eq!(stats.loss_percent(), 0.0);
        assert_eq!(stats.avg_latency(), None);
        assert_eq!(stats.jitter(), None);
        assert_eq!(stats.std_dev(), None);
    }

    #[test]
    fn test_stats_mixed_outcomes() {
        let mut stats = LatencyStats::default();
        stats.add(&ProbeOutcome::success(ms(10)));
        stats.add(&ProbeOutcome::success(ms(20)));
        stats.add(&ProbeOutcome::failure(FailureReason::Timeout));
        stats.add(&ProbeOutcome::success(ms(30)));

        assert_eq!(stats.total_probes, 4);
        assert_eq!(stats.lost_probes, 1);
        assert_eq!(stats.received_probes(), 3);
        assert_eq!(stats.loss_percent(), 25.0);
        assert_eq!(stats.avg_latency(), Some(ms(20)));
        assert_eq!(stats.jitter(), Some(ms(10)));
        assert_eq!(stats.min_latency, Some(ms(10)));
        assert_eq!(stats.max_latency, Some(ms(30)));
        assert_eq!(stats.failures.timeout, 1);

        // Population std dev of 10, 20, 30 is sqrt(200/3)
        let std_dev = duration_ms(stats.std_dev().unwrap());
        assert!((std_dev - (200.0f64 / 3.0).sqrt()).abs() < 1e-3);
    }

    #[test]
    fn test_jitter_needs_two_samples() {
        let mut stats = LatencyStats::default();
        stats.add(&ProbeOutcome::success(ms(15)));
        stats.add(&ProbeOutcome::failure(FailureReason::Error));

        assert_eq!(stats.avg_latency(), Some(ms(15)));
        assert_eq!(stats.jitter(), None);
        assert_eq!(stats.std_dev(), None);
    }

    #[test]
    fn test_jitter_skips_failures_between_successes() {
        let mut stats = LatencyStats::default();
        stats.add(&ProbeOutcome::success(ms(40)));
        stats.add(&ProbeOutcome::failure(FailureReason::Unreachable));
        stats.add(&ProbeOutcome::success(ms(10)));

        assert_eq!(stats.jitter(), Some(ms(30)));
        assert_eq!(stats.failures.unreachable, 1);
    }

    #[test]
    fn test_all_lost() {
        let mut stats = LatencyStats::default();
        for _ in 0..3 {
            stats.add(&ProbeOutcome::failure(FailureReason::Timeout));
        }

        assert_eq!(stats.loss_percent(), 100.0);
        assert_eq!(stats.avg_latency(), None);
        assert_eq!(stats.min_latency, None);
    }

    #[test]
    fn test_repeated_dst_hour_labels_differ() {
        use chrono::{FixedOffset, NaiveDate};

        // 02:00 local occurs twice when clocks fall back from +02:00 to +01:00
        let two_am = NaiveDate::from_ymd_opt(2025, 10, 26)
            .and_then(|d| d.and_hms_opt(2, 0, 0))
            .unwrap();
        let summer = FixedOffset::east_opt(2 * 3600).unwrap();
        let winter = FixedOffset::east_opt(3600).unwrap();

        let first = HourBucket::new(DateTime::<Local>::from_naive_utc_and_offset(two_am - summer, summer));
        let second = HourBucket::new(DateTime::<Local>::from_naive_utc_and_offset(two_am - winter, winter));

        assert_eq!(first.period_label(), "2025-10-26 02:00 +02:00");
        assert_eq!(second.period_label(), "2025-10-26 02:00 +01:00");
        assert!(first.bucket_start < second.bucket_start);
    }

    #[test]
    fn test_format_latency() {
        assert_eq!(format_latency(Some(Duration::from_micros(12_346))), "12.35 ms");
        assert_eq!(format_latency(None), "n/a");
    }

    #[test]
    fn test_summary_serializes_milliseconds() {
        let mut stats = LatencyStats::default();
        stats.add(&ProbeOutcome::success(ms(5)));
        let summary = SummaryReport::from_stats("test", &stats);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["avg_latency_ms"], 5.0);
        assert!(json["jitter_ms"].is_null());
        assert_eq!(json["probe_count"], 1);
    }
}
