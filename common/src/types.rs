//! Probe outcome types
//!
//! One `ProbeOutcome` is produced per tick by the transport and consumed
//! exactly once by the statistics engine.

use std::fmt;
use std::time::Duration;

/// Why a probe did not produce a latency sample
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureReason {
    /// No reply arrived before the probe timeout
    Timeout,
    /// The transport reported that the target cannot be routed to
    Unreachable,
    /// Any other transport-level fault
    Error,
}

impl FailureReason {
    /// Short lowercase name used in status lines and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::Timeout => "timeout",
            FailureReason::Unreachable => "unreachable",
            FailureReason::Error => "error",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one latency measurement
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Echo reply received within the timeout
    Success {
        /// Measured round-trip time
        latency: Duration,
    },
    /// Probe counted as lost
    Failure {
        /// Classification of the loss
        reason: FailureReason,
    },
}

impl ProbeOutcome {
    /// Successful outcome with the given round-trip time
    pub fn success(latency: Duration) -> Self {
        ProbeOutcome::Success { latency }
    }

    /// Lost outcome with the given reason
    pub fn failure(reason: FailureReason) -> Self {
        ProbeOutcome::Failure { reason }
    }

    /// Whether the probe was answered in time
    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Success { .. })
    }

    /// Round-trip time, if the probe succeeded
    pub fn latency(&self) -> Option<Duration> {
        match self {
            ProbeOutcome::Success { latency } => Some(*latency),
            ProbeOutcome::Failure { .. } => None,
        }
    }
}
