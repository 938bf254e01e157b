//! Report exporters
//!
//! Renders reports as human-readable text and writes them to the per-run
//! log file or to a JSON file.

use crate::types::{format_latency, FinalReport, SummaryReport, WindowReport};
use anyhow::{Context, Result};
use log::warn;
use probe_common::REPORT_RULE_WIDTH;
use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

/// Trait for report exporters
pub trait ReportExporter {
    /// Export the final report
    ///
    /// # Arguments
    ///
    /// * `report` - Report rendered at shutdown
    ///
    /// # Returns
    ///
    /// Result indicating success or failure
    fn export(&self, report: &FinalReport) -> Result<()>;
}

/// Appends the text report to a file
pub struct TextExporter {
    output_path: PathBuf,
}

impl TextExporter {
    /// Create a new text exporter
    ///
    /// # Arguments
    ///
    /// * `output_path` - File to append to (created if missing)
    pub fn new(output_path: PathBuf) -> Self {
        Self { output_path }
    }
}

impl ReportExporter for TextExporter {
    fn export(&self, report: &FinalReport) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.output_path)
            .with_context(|| format!("Failed to open log file: {:?}", self.output_path))?;

        file.write_all(render_report_text(report).as_bytes())
            .with_context(|| format!("Failed to write to log file: {:?}", self.output_path))?;

        Ok(())
    }
}

/// JSON exporter
pub struct JsonExporter {
    output_path: PathBuf,
    pretty: bool,
}

impl JsonExporter {
    /// Create a new JSON exporter
    ///
    /// # Arguments
    ///
    /// * `output_path` - Path to output file
    /// * `pretty` - Enable pretty-printing
    pub fn new(output_path: PathBuf, pretty: bool) -> Self {
        Self {
            output_path,
            pretty,
        }
    }
}

impl ReportExporter for JsonExporter {
    fn export(&self, report: &FinalReport) -> Result<()> {
        let json = if self.pretty {
            serde_json::to_string_pretty(report)?
        } else {
            serde_json::to_string(report)?
        };

        let mut file = File::create(&self.output_path)
            .with_context(|| format!("Failed to create output file: {:?}", self.output_path))?;

        file.write_all(json.as_bytes())
            .with_context(|| format!("Failed to write to output file: {:?}", self.output_path))?;

        Ok(())
    }
}

/// Live log file of one run
///
/// Receives the header and one line per probe while the monitor runs.
/// Write failures are reported once and then disable the log, so the
/// console output always continues.
pub struct RunLog {
    path: PathBuf,
    file: Option<File>,
}

impl RunLog {
    /// Create (or truncate) the log file
    pub fn create(path: PathBuf) -> Result<Self> {
        let file = File::create(&path)
            .with_context(|| format!("Failed to create log file: {:?}", path))?;

        Ok(Self {
            path,
            file: Some(file),
        })
    }

    /// Log that drops every line, used when the file cannot be created
    pub fn disabled(path: PathBuf) -> Self {
        Self { path, file: None }
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether lines are still being written
    pub fn is_enabled(&self) -> bool {
        self.file.is_some()
    }

    /// Append a line (or a block of lines) to the log
    pub fn append(&mut self, text: &str) {
        let Some(file) = self.file.as_mut() else {
            return;
        };

        let result = file
            .write_all(text.as_bytes())
            .and_then(|_| file.write_all(b"\n"))
            .and_then(|_| file.flush());

        if let Err(e) = result {
            warn!("Failed to write to log file {:?}, disabling it: {}", self.path, e);
            self.file = None;
        }
    }
}

fn rule() -> String {
    "=".repeat(REPORT_RULE_WIDTH)
}

/// Render the per-scope block shared by hourly and window summaries
fn render_summary_block(summary: &SummaryReport, out: &mut String) {
    out.push_str(&format!(
        "  Packets: {}/{} received, {} lost (loss: {:.2}%)\n",
        summary.received_count, summary.probe_count, summary.loss_count, summary.loss_percent
    ));
    out.push_str(&format!(
        "  Latency: {} avg, {} jitter, {} min, {} max\n",
        format_latency(summary.avg_latency),
        format_latency(summary.jitter),
        format_latency(summary.min_latency),
        format_latency(summary.max_latency)
    ));
}

/// Render a completed probe window
pub fn render_window_text(window: &WindowReport) -> String {
    let mut out = format!("\n--- Statistics for {} ---\n", window.summary.period_label);
    render_summary_block(&window.summary, &mut out);
    out
}

/// Render the shutdown report
///
/// The same text is printed to the console and appended to the log file.
pub fn render_report_text(report: &FinalReport) -> String {
    let overall = &report.overall;
    let mut out = String::new();

    out.push_str(&format!("\n{}\nOVERALL SUMMARY\n{}\n", rule(), rule()));
    out.push_str(&format!("Target: {}\n", report.target));
    out.push_str(&format!("Period: {}\n", overall.period_label));
    out.push_str(&format!(
        "Finished: {}\n",
        report.finished_at.format("%Y-%m-%d %H:%M:%S")
    ));
    out.push_str(&format!("Total packets sent: {}\n", overall.probe_count));
    out.push_str(&format!("Total packets received: {}\n", overall.received_count));
    out.push_str(&format!("Total packets lost: {}\n", overall.loss_count));
    out.push_str(&format!("Packet loss: {:.2}%\n", overall.loss_percent));
    out.push_str(&format!(
        "  Timeouts: {}, unreachable: {}, errors: {}\n",
        overall.failures.timeout, overall.failures.unreachable, overall.failures.error
    ));
    out.push_str(&format!(
        "Max packet loss (any window): {:.2}%\n",
        report.max_window_loss_percent
    ));
    out.push_str("\nLatency statistics:\n");
    out.push_str(&format!("  Average: {}\n", format_latency(overall.avg_latency)));
    out.push_str(&format!("  Minimum: {}\n", format_latency(overall.min_latency)));
    out.push_str(&format!("  Maximum: {}\n", format_latency(overall.max_latency)));
    out.push_str(&format!("  Jitter: {}\n", format_latency(overall.jitter)));
    out.push_str(&format!("  Std dev: {}\n", format_latency(overall.std_dev)));

    if !report.hours.is_empty() {
        out.push_str(&format!("\n{}\nHOURLY BREAKDOWN\n{}\n", rule(), rule()));
        for hour in &report.hours {
            out.push_str(&format!("\n{}\n", hour.period_label));
            render_summary_block(hour, &mut out);
        }
    }

    out.push_str(&format!("\n{}\n", rule()));
    if let Some(path) = &report.log_path {
        out.push_str(&format!("Log file: {}\n", path.display()));
        out.push_str(&format!("{}\n", rule()));
    }

    out
}
