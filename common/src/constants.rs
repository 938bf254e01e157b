//! Shared constants for the packet loss monitor
//!
//! Defaults used by both the library configuration and the CLI.

// ============================================================================
// Probing
// ============================================================================

/// Target probed when none is given on the command line
pub const DEFAULT_TARGET: &str = "8.8.8.8";

/// Time between two consecutive probes (milliseconds)
pub const DEFAULT_INTERVAL_MS: u64 = 1_000;

/// How long a single probe waits for its echo reply (milliseconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 1_000;

/// Payload carried by every echo request
pub const ECHO_PAYLOAD_SIZE: usize = 56;

// ============================================================================
// Aggregation
// ============================================================================

/// Number of consecutive probes summarised in one window report
pub const DEFAULT_WINDOW_SIZE: u64 = 100;

/// Length of one statistics bucket (seconds)
pub const BUCKET_SECONDS: i64 = 3_600;

// ============================================================================
// Log artifact
// ============================================================================

/// Prefix of the per-run log file name
pub const LOG_FILE_PREFIX: &str = "ping_log";

/// Extension of the per-run log file
pub const LOG_FILE_EXTENSION: &str = "txt";

/// strftime pattern embedded in the log file name
pub const LOG_FILE_TIME_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Width of the `=` rules framing report sections
pub const REPORT_RULE_WIDTH: usize = 60;
